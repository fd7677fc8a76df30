//! Protocol Data Unit encoding: function code, typed request/response values,
//! and the response-size oracle that drives bounded-lookahead reads.
//!
//! All multi-byte fields are big-endian on the wire (the RTU CRC trailer is
//! the one exception, handled in [`crate::adu`]).

use crate::error::{Error, ExceptionCode};

/// Maximum PDU payload, per the Modbus Application Protocol.
pub const MAX_PDU_SIZE: usize = 253;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionCode {
    ReadCoils,
    ReadDiscreteInputs,
    ReadHoldingRegisters,
    ReadInputRegisters,
    WriteSingleCoil,
    WriteSingleRegister,
    WriteMultipleCoils,
    WriteMultipleRegisters,
}

impl FunctionCode {
    pub fn code(&self) -> u8 {
        match self {
            Self::ReadCoils => 1,
            Self::ReadDiscreteInputs => 2,
            Self::ReadHoldingRegisters => 3,
            Self::ReadInputRegisters => 4,
            Self::WriteSingleCoil => 5,
            Self::WriteSingleRegister => 6,
            Self::WriteMultipleCoils => 15,
            Self::WriteMultipleRegisters => 16,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            1 => Self::ReadCoils,
            2 => Self::ReadDiscreteInputs,
            3 => Self::ReadHoldingRegisters,
            4 => Self::ReadInputRegisters,
            5 => Self::WriteSingleCoil,
            6 => Self::WriteSingleRegister,
            15 => Self::WriteMultipleCoils,
            16 => Self::WriteMultipleRegisters,
            _ => return None,
        })
    }

    pub fn is_exception(code: u8) -> bool {
        code & 0x80 != 0
    }
}

/// A request PDU, tagged by function code. Wire layout is documented per
/// variant in spec §3.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request<'a> {
    ReadCoils { start_address: u16, quantity: u16 },
    ReadDiscreteInputs { start_address: u16, quantity: u16 },
    ReadHoldingRegisters { start_address: u16, quantity: u16 },
    ReadInputRegisters { start_address: u16, quantity: u16 },
    WriteSingleCoil { address: u16, value: u16 },
    WriteSingleRegister { address: u16, value: u16 },
    WriteMultipleCoils {
        start_address: u16,
        quantity: u16,
        values: &'a [u8],
    },
    WriteMultipleRegisters {
        start_address: u16,
        quantity: u16,
        values: &'a [u16],
    },
}

impl<'a> Request<'a> {
    pub fn function_code(&self) -> FunctionCode {
        match self {
            Self::ReadCoils { .. } => FunctionCode::ReadCoils,
            Self::ReadDiscreteInputs { .. } => FunctionCode::ReadDiscreteInputs,
            Self::ReadHoldingRegisters { .. } => FunctionCode::ReadHoldingRegisters,
            Self::ReadInputRegisters { .. } => FunctionCode::ReadInputRegisters,
            Self::WriteSingleCoil { .. } => FunctionCode::WriteSingleCoil,
            Self::WriteSingleRegister { .. } => FunctionCode::WriteSingleRegister,
            Self::WriteMultipleCoils { .. } => FunctionCode::WriteMultipleCoils,
            Self::WriteMultipleRegisters { .. } => FunctionCode::WriteMultipleRegisters,
        }
    }

    /// Serializes this request into `out`, appending bytes (does not clear
    /// `out` first). Returns the number of bytes written.
    pub fn serialize(&self, out: &mut Vec<u8>) -> crate::error::Result<usize> {
        let start = out.len();
        out.push(self.function_code().code());

        match *self {
            Self::ReadCoils { start_address, quantity }
            | Self::ReadDiscreteInputs { start_address, quantity }
            | Self::ReadHoldingRegisters { start_address, quantity }
            | Self::ReadInputRegisters { start_address, quantity } => {
                out.extend_from_slice(&start_address.to_be_bytes());
                out.extend_from_slice(&quantity.to_be_bytes());
            }
            Self::WriteSingleCoil { address, value } | Self::WriteSingleRegister { address, value } => {
                out.extend_from_slice(&address.to_be_bytes());
                out.extend_from_slice(&value.to_be_bytes());
            }
            Self::WriteMultipleCoils { start_address, quantity, values } => {
                let byte_count = values.len();
                let expected = quantity.div_ceil(8) as usize;
                if byte_count != expected {
                    return Err(Error::IllegalDataValue(format!(
                        "write_multiple_coils byte_count {byte_count} does not match ceil(quantity/8) {expected}"
                    )));
                }
                out.extend_from_slice(&start_address.to_be_bytes());
                out.extend_from_slice(&quantity.to_be_bytes());
                out.push(byte_count as u8);
                out.extend_from_slice(values);
            }
            Self::WriteMultipleRegisters { start_address, quantity, values } => {
                if values.len() != quantity as usize {
                    return Err(Error::IllegalDataValue(format!(
                        "write_multiple_registers got {} values for quantity {}",
                        values.len(),
                        quantity
                    )));
                }
                let byte_count = 2 * values.len();
                out.extend_from_slice(&start_address.to_be_bytes());
                out.extend_from_slice(&quantity.to_be_bytes());
                out.push(byte_count as u8);
                for v in values {
                    out.extend_from_slice(&v.to_be_bytes());
                }
            }
        }

        Ok(out.len() - start)
    }
}

/// A response PDU, tagged by function code, borrowing its payload from the
/// caller's scratch buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response<'a> {
    ReadCoils { values: &'a [u8] },
    ReadDiscreteInputs { values: &'a [u8] },
    ReadHoldingRegisters { values: Vec<u16> },
    ReadInputRegisters { values: Vec<u16> },
    WriteSingleCoil { address: u16, value: u16 },
    WriteSingleRegister { address: u16, value: u16 },
    WriteMultipleCoils { start_address: u16, quantity: u16 },
    WriteMultipleRegisters { start_address: u16, quantity: u16 },
}

impl<'a> Response<'a> {
    pub fn function_code(&self) -> FunctionCode {
        match self {
            Self::ReadCoils { .. } => FunctionCode::ReadCoils,
            Self::ReadDiscreteInputs { .. } => FunctionCode::ReadDiscreteInputs,
            Self::ReadHoldingRegisters { .. } => FunctionCode::ReadHoldingRegisters,
            Self::ReadInputRegisters { .. } => FunctionCode::ReadInputRegisters,
            Self::WriteSingleCoil { .. } => FunctionCode::WriteSingleCoil,
            Self::WriteSingleRegister { .. } => FunctionCode::WriteSingleRegister,
            Self::WriteMultipleCoils { .. } => FunctionCode::WriteMultipleCoils,
            Self::WriteMultipleRegisters { .. } => FunctionCode::WriteMultipleRegisters,
        }
    }

    /// Serializes a reply PDU (the server side's counterpart to
    /// [`Request::serialize`]).
    pub fn serialize(&self, out: &mut Vec<u8>) {
        out.push(self.function_code().code());
        match self {
            Self::ReadCoils { values } | Self::ReadDiscreteInputs { values } => {
                out.push(values.len() as u8);
                out.extend_from_slice(values);
            }
            Self::ReadHoldingRegisters { values } | Self::ReadInputRegisters { values } => {
                out.push((values.len() * 2) as u8);
                for v in values {
                    out.extend_from_slice(&v.to_be_bytes());
                }
            }
            Self::WriteSingleCoil { address, value } | Self::WriteSingleRegister { address, value } => {
                out.extend_from_slice(&address.to_be_bytes());
                out.extend_from_slice(&value.to_be_bytes());
            }
            Self::WriteMultipleCoils { start_address, quantity }
            | Self::WriteMultipleRegisters { start_address, quantity } => {
                out.extend_from_slice(&start_address.to_be_bytes());
                out.extend_from_slice(&quantity.to_be_bytes());
            }
        }
    }
}

/// Serializes a 1-byte exception reply for `original_function_code`.
pub fn serialize_exception(original_function_code: u8, exception: ExceptionCode, out: &mut Vec<u8>) {
    out.push(original_function_code | 0x80);
    out.push(exception.code());
}

/// Owned counterpart to [`Request`], decoded off the wire by a server.
/// Owned (rather than borrowing the inbound buffer, as [`Request`] does for
/// the client's outbound side) because the dispatcher in [`crate::server`]
/// needs to walk `values` register-by-register while also mutably holding
/// the handle's receive buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedRequest {
    ReadCoils { start_address: u16, quantity: u16 },
    ReadDiscreteInputs { start_address: u16, quantity: u16 },
    ReadHoldingRegisters { start_address: u16, quantity: u16 },
    ReadInputRegisters { start_address: u16, quantity: u16 },
    WriteSingleCoil { address: u16, value: u16 },
    WriteSingleRegister { address: u16, value: u16 },
    WriteMultipleCoils { start_address: u16, quantity: u16, values: Vec<u8> },
    WriteMultipleRegisters { start_address: u16, quantity: u16, values: Vec<u16> },
}

impl ParsedRequest {
    pub fn function_code(&self) -> FunctionCode {
        match self {
            Self::ReadCoils { .. } => FunctionCode::ReadCoils,
            Self::ReadDiscreteInputs { .. } => FunctionCode::ReadDiscreteInputs,
            Self::ReadHoldingRegisters { .. } => FunctionCode::ReadHoldingRegisters,
            Self::ReadInputRegisters { .. } => FunctionCode::ReadInputRegisters,
            Self::WriteSingleCoil { .. } => FunctionCode::WriteSingleCoil,
            Self::WriteSingleRegister { .. } => FunctionCode::WriteSingleRegister,
            Self::WriteMultipleCoils { .. } => FunctionCode::WriteMultipleCoils,
            Self::WriteMultipleRegisters { .. } => FunctionCode::WriteMultipleRegisters,
        }
    }
}

/// Parses a request PDU, the server-side counterpart to [`Request::serialize`].
/// `pdu` must hold exactly one request (no trailing bytes).
pub fn parse_request(pdu: &[u8]) -> crate::error::Result<ParsedRequest> {
    let function_code = *pdu.first().ok_or_else(|| Error::MalformedFrame("empty PDU".into()))?;
    let function_code = FunctionCode::from_code(function_code).ok_or(Error::IllegalFunction(function_code))?;
    let body = &pdu[1..];

    let read_fields = |body: &[u8]| -> crate::error::Result<(u16, u16)> {
        if body.len() != 4 {
            return Err(Error::MalformedFrame("read request must carry 4 bytes".into()));
        }
        Ok((u16::from_be_bytes([body[0], body[1]]), u16::from_be_bytes([body[2], body[3]])))
    };

    match function_code {
        FunctionCode::ReadCoils | FunctionCode::ReadDiscreteInputs | FunctionCode::ReadHoldingRegisters | FunctionCode::ReadInputRegisters => {
            let (start_address, quantity) = read_fields(body)?;
            Ok(match function_code {
                FunctionCode::ReadCoils => ParsedRequest::ReadCoils { start_address, quantity },
                FunctionCode::ReadDiscreteInputs => ParsedRequest::ReadDiscreteInputs { start_address, quantity },
                FunctionCode::ReadHoldingRegisters => ParsedRequest::ReadHoldingRegisters { start_address, quantity },
                _ => ParsedRequest::ReadInputRegisters { start_address, quantity },
            })
        }
        FunctionCode::WriteSingleCoil | FunctionCode::WriteSingleRegister => {
            let (address, value) = read_fields(body)?;
            Ok(if function_code == FunctionCode::WriteSingleCoil {
                ParsedRequest::WriteSingleCoil { address, value }
            } else {
                ParsedRequest::WriteSingleRegister { address, value }
            })
        }
        FunctionCode::WriteMultipleCoils => {
            if body.len() < 5 {
                return Err(Error::MalformedFrame("write_multiple_coils header truncated".into()));
            }
            let start_address = u16::from_be_bytes([body[0], body[1]]);
            let quantity = u16::from_be_bytes([body[2], body[3]]);
            let byte_count = body[4] as usize;
            let values = body.get(5..).ok_or_else(|| Error::MalformedFrame("truncated payload".into()))?;
            if values.len() != byte_count {
                return Err(Error::MalformedFrame("byte_count inconsistent with payload length".into()));
            }
            Ok(ParsedRequest::WriteMultipleCoils { start_address, quantity, values: values.to_vec() })
        }
        FunctionCode::WriteMultipleRegisters => {
            if body.len() < 5 {
                return Err(Error::MalformedFrame("write_multiple_registers header truncated".into()));
            }
            let start_address = u16::from_be_bytes([body[0], body[1]]);
            let quantity = u16::from_be_bytes([body[2], body[3]]);
            let byte_count = body[4] as usize;
            let payload = body.get(5..).ok_or_else(|| Error::MalformedFrame("truncated payload".into()))?;
            if payload.len() != byte_count || byte_count != quantity as usize * 2 {
                return Err(Error::MalformedFrame("byte_count inconsistent with quantity/payload".into()));
            }
            let values = payload.chunks_exact(2).map(|c| u16::from_be_bytes([c[0], c[1]])).collect();
            Ok(ParsedRequest::WriteMultipleRegisters { start_address, quantity, values })
        }
    }
}

/// Given the first two bytes of a PDU (function code, then `byte_count` for
/// reads / high byte of address for writes), returns the *total* PDU length
/// so the caller can read exactly the remainder in one shot.
pub fn response_size_oracle(function_code: u8, second_byte: u8) -> crate::error::Result<usize> {
    if FunctionCode::is_exception(function_code) {
        return Ok(2);
    }
    match FunctionCode::from_code(function_code) {
        Some(
            FunctionCode::ReadCoils
            | FunctionCode::ReadDiscreteInputs
            | FunctionCode::ReadHoldingRegisters
            | FunctionCode::ReadInputRegisters,
        ) => Ok(2 + second_byte as usize),
        Some(
            FunctionCode::WriteSingleCoil
            | FunctionCode::WriteSingleRegister
            | FunctionCode::WriteMultipleCoils
            | FunctionCode::WriteMultipleRegisters,
        ) => Ok(5),
        None => Err(Error::IllegalFunction(function_code)),
    }
}

/// Parses a response PDU of the given request's function code out of
/// `pdu`. `pdu` must be exactly the length reported by
/// [`response_size_oracle`] (sans any exception handling, which callers
/// detect before calling this).
pub fn parse_response<'a>(function_code: FunctionCode, pdu: &'a [u8]) -> crate::error::Result<Response<'a>> {
    if pdu.is_empty() || pdu[0] != function_code.code() {
        return Err(Error::MalformedFrame("response function code mismatch".into()));
    }
    let body = &pdu[1..];

    match function_code {
        FunctionCode::ReadCoils | FunctionCode::ReadDiscreteInputs => {
            let byte_count = *body.first().ok_or_else(|| Error::MalformedFrame("missing byte count".into()))? as usize;
            let values = body.get(1..).ok_or_else(|| Error::MalformedFrame("truncated payload".into()))?;
            if values.len() != byte_count {
                return Err(Error::MalformedFrame(format!(
                    "byte_count {byte_count} inconsistent with payload length {}",
                    values.len()
                )));
            }
            Ok(if function_code == FunctionCode::ReadCoils {
                Response::ReadCoils { values }
            } else {
                Response::ReadDiscreteInputs { values }
            })
        }
        FunctionCode::ReadHoldingRegisters | FunctionCode::ReadInputRegisters => {
            let byte_count = *body.first().ok_or_else(|| Error::MalformedFrame("missing byte count".into()))? as usize;
            let payload = body.get(1..).ok_or_else(|| Error::MalformedFrame("truncated payload".into()))?;
            if payload.len() != byte_count || byte_count % 2 != 0 {
                return Err(Error::MalformedFrame(format!(
                    "byte_count {byte_count} inconsistent with payload length {}",
                    payload.len()
                )));
            }
            let values: Vec<u16> = payload
                .chunks_exact(2)
                .map(|c| u16::from_be_bytes([c[0], c[1]]))
                .collect();
            Ok(if function_code == FunctionCode::ReadHoldingRegisters {
                Response::ReadHoldingRegisters { values }
            } else {
                Response::ReadInputRegisters { values }
            })
        }
        FunctionCode::WriteSingleCoil | FunctionCode::WriteSingleRegister => {
            if body.len() != 4 {
                return Err(Error::MalformedFrame("write-single echo must be 4 bytes".into()));
            }
            let address = u16::from_be_bytes([body[0], body[1]]);
            let value = u16::from_be_bytes([body[2], body[3]]);
            Ok(if function_code == FunctionCode::WriteSingleCoil {
                Response::WriteSingleCoil { address, value }
            } else {
                Response::WriteSingleRegister { address, value }
            })
        }
        FunctionCode::WriteMultipleCoils | FunctionCode::WriteMultipleRegisters => {
            if body.len() != 4 {
                return Err(Error::MalformedFrame("write-multiple echo must be 4 bytes".into()));
            }
            let start_address = u16::from_be_bytes([body[0], body[1]]);
            let quantity = u16::from_be_bytes([body[2], body[3]]);
            Ok(if function_code == FunctionCode::WriteMultipleCoils {
                Response::WriteMultipleCoils { start_address, quantity }
            } else {
                Response::WriteMultipleRegisters { start_address, quantity }
            })
        }
    }
}

/// Parses a 1-byte exception code out of a `function_code | 0x80` reply.
pub fn parse_exception(exception_code_byte: u8) -> crate::error::Result<ExceptionCode> {
    if exception_code_byte == 0 {
        return Err(Error::Generic);
    }
    ExceptionCode::from_code(exception_code_byte)
        .ok_or_else(|| Error::MalformedFrame(format!("unknown exception code {exception_code_byte:#04x}")))
}
