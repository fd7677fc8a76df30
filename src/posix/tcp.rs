//! TCP socket [`Transport`], for the MBAP encapsulation.
//!
//! Grounded on the teacher's `modbus_relay.rs` accept loop (bind + per-socket
//! `set_nodelay`) and `relay_config.rs`'s use of `socket2` for low-level
//! socket options, dropped from `tokio::net` to blocking `std::net` per §6.

use std::net::{TcpListener, TcpStream};
use std::time::Duration;

use socket2::{SockRef, TcpKeepalive};

use crate::config::TcpConfig;
use crate::error::{Error, Result};
use crate::transport::Transport;

pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    /// Dials out to `config.bind_addr:bind_port` as a Modbus client would.
    pub fn connect(config: &TcpConfig) -> Result<Self> {
        let stream = TcpStream::connect((config.bind_addr.as_str(), config.bind_port))
            .map_err(|e| Error::OpenSocket(e.to_string()))?;
        Self::configure(&stream, config.read_timeout)?;
        Ok(Self { stream })
    }

    /// Wraps an already-accepted connection, as a Modbus server would after
    /// `TcpListener::accept`.
    pub fn from_stream(stream: TcpStream, read_timeout: Duration) -> Result<Self> {
        Self::configure(&stream, read_timeout)?;
        Ok(Self { stream })
    }

    pub fn bind(config: &TcpConfig) -> Result<TcpListener> {
        TcpListener::bind((config.bind_addr.as_str(), config.bind_port)).map_err(|e| Error::OpenSocket(e.to_string()))
    }

    fn configure(stream: &TcpStream, read_timeout: Duration) -> Result<()> {
        stream.set_nodelay(true).map_err(|e| Error::OpenSocket(e.to_string()))?;
        stream
            .set_read_timeout(Some(read_timeout))
            .map_err(|e| Error::OpenSocket(e.to_string()))?;
        SockRef::from(stream)
            .set_tcp_keepalive(&TcpKeepalive::new().with_time(Duration::from_secs(60)))
            .map_err(|e| Error::OpenSocket(e.to_string()))?;
        Ok(())
    }
}

impl Transport for TcpTransport {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        use std::io::Read;
        match self.stream.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if matches!(e.kind(), std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock) => Err(Error::Timeout),
            Err(e) => Err(Error::Transport(e.to_string())),
        }
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        use std::io::Write;
        self.stream.write(buf).map_err(|e| Error::Transport(e.to_string()))
    }
}
