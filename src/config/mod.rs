mod cli_config;
mod logging;
mod serial;
mod tcp;
pub mod types;

pub use cli_config::Config as CliConfig;
pub use logging::Config as LoggingConfig;
pub use serial::Config as SerialConfig;
pub use tcp::Config as TcpConfig;
pub use types::{DataBits, Parity, StopBits};
