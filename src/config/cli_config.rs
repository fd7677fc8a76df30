use std::path::PathBuf;

use config::{Config as ConfigBuilder, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use super::{LoggingConfig, SerialConfig, TcpConfig};

/// Top-level configuration for `tinymodbus-cli`.
#[derive(Default, Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub tcp: TcpConfig,
    pub serial: SerialConfig,
    pub logging: LoggingConfig,
}

impl Config {
    pub const CONFIG_DIR: &'static str = "config";
    const ENV_PREFIX: &'static str = "TINYMODBUS";

    /// Builds configuration from (highest to lowest priority): environment
    /// variables (`TINYMODBUS_*`), `config/local.yaml`, `config/default.yaml`,
    /// then the built-in [`Default`].
    pub fn new() -> Result<Self, ConfigError> {
        let defaults = Config::default();

        let config = ConfigBuilder::builder()
            .set_default("tcp.bind_addr", defaults.tcp.bind_addr)?
            .set_default("tcp.bind_port", defaults.tcp.bind_port)?
            .set_default("tcp.read_timeout", format!("{}s", defaults.tcp.read_timeout.as_secs()))?
            .set_default("serial.device", defaults.serial.device)?
            .set_default("serial.baud_rate", defaults.serial.baud_rate)?
            .set_default("serial.data_bits", defaults.serial.data_bits.to_string())?
            .set_default("serial.parity", defaults.serial.parity.to_string())?
            .set_default("serial.stop_bits", defaults.serial.stop_bits.to_string())?
            .set_default("serial.flush_after_write", defaults.serial.flush_after_write)?
            .set_default("serial.read_timeout", format!("{}s", defaults.serial.read_timeout.as_secs()))?
            .set_default("logging.trace_frames", defaults.logging.trace_frames)?
            .set_default("logging.level", defaults.logging.level)?
            .set_default("logging.include_location", defaults.logging.include_location)?
            .set_default("logging.thread_ids", defaults.logging.thread_ids)?
            .add_source(File::new(&format!("{}/default", Self::CONFIG_DIR), FileFormat::Yaml).required(false))
            .add_source(File::new(&format!("{}/local", Self::CONFIG_DIR), FileFormat::Yaml).required(false))
            .add_source(
                Environment::with_prefix(Self::ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = config.try_deserialize()?;
        Self::validate(&config)?;
        Ok(config)
    }

    pub fn from_file(path: PathBuf) -> Result<Self, ConfigError> {
        let config = ConfigBuilder::builder()
            .add_source(File::from(path))
            .add_source(Environment::with_prefix(Self::ENV_PREFIX).separator("_").try_parsing(true))
            .build()?;

        let config: Self = config.try_deserialize()?;
        Self::validate(&config)?;
        Ok(config)
    }

    pub fn validate(config: &Self) -> Result<(), ConfigError> {
        fn validation_error(msg: &str) -> ConfigError {
            ConfigError::Message(msg.to_string())
        }

        if config.tcp.bind_addr.is_empty() {
            return Err(validation_error("TCP bind address must not be empty"));
        }
        if config.tcp.bind_port == 0 {
            return Err(validation_error("TCP port must be non-zero"));
        }
        if config.tcp.read_timeout.is_zero() {
            return Err(validation_error("TCP read timeout must be non-zero"));
        }
        if config.serial.device.is_empty() {
            return Err(validation_error("serial device must not be empty"));
        }
        if config.serial.baud_rate == 0 {
            return Err(validation_error("serial baud rate must be non-zero"));
        }
        if config.serial.read_timeout.is_zero() {
            return Err(validation_error("serial read timeout must be non-zero"));
        }
        config.logging.validate().map_err(|e| validation_error(&e))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::{DataBits, Parity, StopBits};
    use std::{fs, time::Duration};
    use tempfile::tempdir;

    #[test]
    #[serial_test::serial]
    fn default_config_has_sane_ports() {
        let config = Config::new().unwrap();
        assert_eq!(config.tcp.bind_port, 502);
        assert_eq!(config.tcp.bind_addr, "127.0.0.1");
    }

    #[test]
    #[serial_test::serial]
    fn env_override_takes_priority() {
        std::env::set_var("TINYMODBUS_TCP__BIND_PORT", "5000");
        let config = Config::new().unwrap();
        assert_eq!(config.tcp.bind_port, 5000);
        std::env::remove_var("TINYMODBUS_TCP__BIND_PORT");
    }

    #[test]
    #[serial_test::serial]
    fn file_config_is_loaded() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.yaml");
        fs::write(
            &config_path,
            r#"
            tcp:
              bind_port: 9000
              bind_addr: "192.168.1.100"
              read_timeout: "2s"
            serial:
              device: "/dev/ttyAMA0"
              baud_rate: 19200
              data_bits: 8
              parity: "even"
              stop_bits: "two"
              flush_after_write: false
              read_timeout: "500ms"
            logging:
              trace_frames: true
              level: "debug"
              include_location: true
              thread_ids: true
            "#,
        )
        .unwrap();

        let config = Config::from_file(config_path).unwrap();
        assert_eq!(config.tcp.bind_port, 9000);
        assert_eq!(config.tcp.bind_addr, "192.168.1.100");
        assert_eq!(config.tcp.read_timeout, Duration::from_secs(2));
        assert_eq!(config.serial.device, "/dev/ttyAMA0");
        assert_eq!(config.serial.baud_rate, 19200);
        assert_eq!(config.serial.data_bits, DataBits::new(8).unwrap());
        assert_eq!(config.serial.parity, Parity::Even);
        assert_eq!(config.serial.stop_bits, StopBits::Two);
        assert!(!config.serial.flush_after_write);
        assert_eq!(config.serial.read_timeout, Duration::from_millis(500));
        assert!(config.logging.trace_frames);
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.include_location);
        assert!(config.logging.thread_ids);
    }

    #[test]
    #[serial_test::serial]
    fn zero_port_fails_validation() {
        std::env::set_var("TINYMODBUS_TCP__BIND_PORT", "0");
        assert!(Config::new().is_err());
        std::env::remove_var("TINYMODBUS_TCP__BIND_PORT");
    }
}
