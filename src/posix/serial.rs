//! Serial port [`Transport`], for RTU/ASCII encapsulations.
//!
//! Grounded on the teacher's `rtu_transport.rs`, dropped from async
//! (`tokio::sync::Mutex` + `tokio::time::timeout`) to plain blocking I/O:
//! spec §6 models the transport as synchronous.

use std::io::{Read, Write};
use std::time::Duration;

use serialport::SerialPort;

use crate::config::SerialConfig;
use crate::error::{Error, Result};
use crate::transport::Transport;

pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    flush_after_write: bool,
}

impl SerialTransport {
    pub fn open(config: &SerialConfig) -> Result<Self> {
        let port = serialport::new(&config.device, config.baud_rate)
            .data_bits(config.data_bits.into())
            .parity(config.parity.into())
            .stop_bits(config.stop_bits.into())
            .timeout(config.read_timeout)
            .open()
            .map_err(|e| Error::OpenSerial(e.to_string()))?;

        Ok(Self {
            port,
            flush_after_write: config.flush_after_write,
        })
    }

    pub fn set_read_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.port.set_timeout(timeout).map_err(|e| Error::SerialConfig(e.to_string()))
    }
}

impl Transport for SerialTransport {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Err(Error::Timeout),
            Err(e) => Err(Error::Transport(e.to_string())),
        }
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let n = self.port.write(buf).map_err(|e| Error::Transport(e.to_string()))?;
        if self.flush_after_write {
            self.port.flush().map_err(|e| Error::Transport(e.to_string()))?;
        }
        Ok(n)
    }
}
