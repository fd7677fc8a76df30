//! `tracing-subscriber` wiring for `tinymodbus-cli`.
//!
//! Grounded on the teacher's `setup_logging`: an `OffsetTime` timer, an
//! `EnvFilter` seeded from the configured level, and an optional extra
//! directive that turns on `trace` logging for frame contents.

use time::UtcOffset;
use tracing_subscriber::{fmt::time::OffsetTime, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

use crate::config::LoggingConfig;

pub fn setup_logging(config: &LoggingConfig) -> Result<(), String> {
    config.validate()?;

    let timer = OffsetTime::new(
        UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC),
        time::format_description::well_known::Rfc3339,
    );

    let mut env_filter = EnvFilter::default().add_directive(config.get_level_filter().into());
    if config.trace_frames {
        env_filter = env_filter
            .add_directive("tinymodbus::client=trace".parse().expect("valid directive"))
            .add_directive("tinymodbus::server=trace".parse().expect("valid directive"));
    }

    let layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(config.thread_ids)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_level(true)
        .with_timer(timer)
        .with_filter(env_filter);

    Registry::default()
        .with(layer)
        .try_init()
        .map_err(|e| format!("failed to initialize logging: {e}"))
}
