use thiserror::Error;

/// One of the eleven standard Modbus exception codes, returned by a peer in
/// an exception response (function code ORed with 0x80).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionCode {
    IllegalFunction,
    IllegalDataAddress,
    IllegalDataValue,
    ServerDeviceFailure,
    Acknowledge,
    ServerDeviceBusy,
    MemoryParityError,
    GatewayPathUnavailable,
    GatewayTargetDeviceFailedToRespond,
}

impl ExceptionCode {
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            1 => Self::IllegalFunction,
            2 => Self::IllegalDataAddress,
            3 => Self::IllegalDataValue,
            4 => Self::ServerDeviceFailure,
            5 => Self::Acknowledge,
            6 => Self::ServerDeviceBusy,
            8 => Self::MemoryParityError,
            10 => Self::GatewayPathUnavailable,
            11 => Self::GatewayTargetDeviceFailedToRespond,
            _ => return None,
        })
    }

    pub fn code(&self) -> u8 {
        match self {
            Self::IllegalFunction => 1,
            Self::IllegalDataAddress => 2,
            Self::IllegalDataValue => 3,
            Self::ServerDeviceFailure => 4,
            Self::Acknowledge => 5,
            Self::ServerDeviceBusy => 6,
            Self::MemoryParityError => 8,
            Self::GatewayPathUnavailable => 10,
            Self::GatewayTargetDeviceFailedToRespond => 11,
        }
    }
}

impl std::fmt::Display for ExceptionCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            Self::IllegalFunction => "illegal function",
            Self::IllegalDataAddress => "illegal data address",
            Self::IllegalDataValue => "illegal data value",
            Self::ServerDeviceFailure => "server device failure",
            Self::Acknowledge => "acknowledge",
            Self::ServerDeviceBusy => "server device busy",
            Self::MemoryParityError => "memory parity error",
            Self::GatewayPathUnavailable => "gateway path unavailable",
            Self::GatewayTargetDeviceFailedToRespond => "gateway target device failed to respond",
        };
        write!(f, "{msg}")
    }
}

/// Status a server callback returns for one unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackStatus {
    Ok,
    Ignore,
    Exception(ExceptionCode),
}

/// The closed set of local errors the engine can raise, per spec §7.
///
/// Modbus exception codes returned by a peer surface as [`Error::Exception`]
/// rather than being folded into this set — a caller must be able to tell
/// "the peer replied with a legal refusal" apart from "the exchange itself
/// is broken".
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("peer returned exception: {0}")]
    Exception(ExceptionCode),

    #[error("generic exception (code 0) from peer")]
    Generic,

    #[error("transport timed out")]
    Timeout,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("handle not in the required mode for this operation")]
    InvalidMode,

    #[error("operation not implemented")]
    NotImplemented,

    #[error("server callback table is full")]
    Capacity,

    #[error("scratch buffer too small: needed {needed}, capacity {capacity}")]
    BufferCapacity { needed: usize, capacity: usize },

    #[error("transport I/O failed: {0}")]
    Transport(String),

    #[error("host resolution failed: {0}")]
    HostResolution(String),

    #[error("connection refused")]
    ConnectionRefused,

    #[error("failed to open socket: {0}")]
    OpenSocket(String),

    #[error("failed to open serial port: {0}")]
    OpenSerial(String),

    #[error("serial port configuration rejected: {0}")]
    SerialConfig(String),

    #[error("checksum mismatch: calculated={calculated:#06x}, received={received:#06x}")]
    BadChecksum { calculated: u16, received: u16 },

    #[error("illegal function code {0:#04x}")]
    IllegalFunction(u8),

    #[error("illegal data value: {0}")]
    IllegalDataValue(String),

    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("transport closed mid-frame")]
    ShortRead,
}

pub type Result<T> = std::result::Result<T, Error>;
