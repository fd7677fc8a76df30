use std::time::Duration;

use serde::{Deserialize, Serialize};

/// TCP-side settings, used by [`crate::posix::tcp`] for both dialing out
/// (client) and listening (server).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub bind_addr: String,
    pub bind_port: u16,

    /// Per-read deadline; a read that misses it surfaces as
    /// [`crate::error::Error::Timeout`].
    #[serde(with = "humantime_serde")]
    pub read_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1".to_string(),
            bind_port: 502,
            read_timeout: Duration::from_secs(1),
        }
    }
}
