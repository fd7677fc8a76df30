//! A small Modbus protocol engine: RTU/ASCII/TCP framing, a blocking
//! client state machine, and a callback-dispatching server, over any
//! byte-oriented [`Transport`].

pub mod adu;
pub mod checksum;
pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod pdu;
pub mod posix;
pub mod server;
pub mod transport;
pub mod validate;

pub use adu::Encapsulation;
pub use client::ModbusClient;
pub use config::{CliConfig, DataBits, LoggingConfig, Parity, SerialConfig, StopBits, TcpConfig};
pub use error::{CallbackStatus, Error, ExceptionCode, Result};
pub use pdu::{FunctionCode, ParsedRequest, Request, Response};
pub use server::{ModbusServer, ServerCallbacks};
pub use transport::Transport;
