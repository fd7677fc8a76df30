//! Application Data Unit framing: RTU, ASCII, and TCP/MBAP encapsulation
//! around an inner PDU.
//!
//! Grounded on the teacher's `ModbusProcessor::process_request` (RTU framing
//! + CRC placement) generalized to all three encapsulations and to a
//! frame/unframe pair usable by both the client and the server.

use crate::checksum::{crc16, lrc};
use crate::error::{Error, Result};

/// Maximum ADU sizes per spec §3/§6.
pub const MAX_ADU_TCP: usize = 260;
pub const MAX_ADU_RTU: usize = 256;
pub const MAX_ADU_ASCII: usize = 513;

/// Worst case across encapsulations; the size of the scratch buffer a
/// [`crate::client::ModbusClient`] or [`crate::server::ModbusServer`] owns.
pub const MAX_ADU_SIZE: usize = MAX_ADU_ASCII;

pub const PROTOCOL_ID: u16 = 0;
pub const BROADCAST_ADDRESS: u8 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encapsulation {
    Rtu,
    Ascii,
    Tcp,
}

impl Encapsulation {
    /// Byte offset of the first inner-PDU byte within a framed ADU.
    pub fn pdu_offset(&self) -> usize {
        match self {
            Self::Rtu => 1,
            Self::Ascii => 1,
            Self::Tcp => 7,
        }
    }

    /// Trailer length appended after the PDU (0 for TCP, which has none).
    pub fn trailer_len(&self) -> usize {
        match self {
            Self::Rtu => 2,
            Self::Ascii => 4,
            Self::Tcp => 0,
        }
    }

    pub fn max_adu_size(&self) -> usize {
        match self {
            Self::Rtu => MAX_ADU_RTU,
            Self::Ascii => MAX_ADU_ASCII,
            Self::Tcp => MAX_ADU_TCP,
        }
    }
}

/// Decodes `bytes` (ASCII hex digits) into `out`, appending. `out` is not
/// cleared first, so the caller decides whether this is a fresh buffer or a
/// continuation.
fn hex_decode_into(bytes: &[u8], out: &mut Vec<u8>) -> Result<()> {
    if bytes.len() % 2 != 0 {
        return Err(Error::MalformedFrame("odd number of ASCII hex digits".into()));
    }
    let start = out.len();
    out.resize(start + bytes.len() / 2, 0);
    hex::decode_to_slice(bytes, &mut out[start..]).map_err(|_| Error::MalformedFrame("bad hex digit".into()))
}

/// Frames `address` (device/unit id) + `pdu` into `out` per `kind`,
/// appending the trailer. `out` is not cleared first. For TCP, `unit_id`
/// takes the place of the RTU/ASCII device address and `transaction_id`
/// must be supplied.
pub fn frame(kind: Encapsulation, address: u8, transaction_id: u16, pdu: &[u8], out: &mut Vec<u8>) -> Result<()> {
    let max = kind.max_adu_size();
    match kind {
        Encapsulation::Rtu => {
            let needed = 1 + pdu.len() + 2;
            if needed > max {
                return Err(Error::BufferCapacity { needed, capacity: max });
            }
            let start = out.len();
            out.push(address);
            out.extend_from_slice(pdu);
            let crc = crc16(&out[start..]);
            out.extend_from_slice(&crc.to_le_bytes());
        }
        Encapsulation::Ascii => {
            let binary_len = 1 + pdu.len();
            let needed = 1 + 2 * binary_len + 2 + 2 + 2;
            if needed > max {
                return Err(Error::BufferCapacity { needed, capacity: max });
            }
            let mut binary = Vec::with_capacity(binary_len + 1);
            binary.push(address);
            binary.extend_from_slice(pdu);
            let checksum = lrc(&binary);
            binary.push(checksum);

            out.push(b':');
            out.extend_from_slice(hex::encode_upper(&binary).as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        Encapsulation::Tcp => {
            let needed = 7 + pdu.len();
            if needed > max {
                return Err(Error::BufferCapacity { needed, capacity: max });
            }
            let len = (1 + pdu.len()) as u16; // unit_id + pdu
            out.extend_from_slice(&transaction_id.to_be_bytes());
            out.extend_from_slice(&PROTOCOL_ID.to_be_bytes());
            out.extend_from_slice(&len.to_be_bytes());
            out.push(address);
            out.extend_from_slice(pdu);
        }
    }
    Ok(())
}

/// A decoded ADU: the framing metadata plus a borrowed view of the inner
/// PDU. For RTU/TCP, `pdu` borrows directly from the caller's `raw` buffer;
/// for ASCII, which must hex-decode before the PDU bytes exist at all,
/// `pdu` borrows from the caller-owned `ascii_scratch` buffer instead. No
/// variant allocates — see [`crate::client::ModbusClient`] and
/// [`crate::server::ModbusServer`] for the buffers that back this.
pub struct Unframed<'a> {
    pub address: u8,
    pub transaction_id: u16,
    pub pdu: &'a [u8],
}

/// Verifies framing/checksum on a complete raw ADU (`raw` holds exactly one
/// frame's bytes, trailer included) and extracts a view of the inner PDU.
///
/// `ascii_scratch` is only written to for [`Encapsulation::Ascii`] (cleared,
/// then filled with the hex-decoded bytes); RTU and TCP ignore it and borrow
/// straight from `raw`.
pub fn unframe<'a>(kind: Encapsulation, raw: &'a [u8], ascii_scratch: &'a mut Vec<u8>) -> Result<Unframed<'a>> {
    match kind {
        Encapsulation::Rtu => {
            if raw.len() < 4 {
                return Err(Error::ShortRead);
            }
            let (body, trailer) = raw.split_at(raw.len() - 2);
            let calculated = crc16(body);
            let received = u16::from_le_bytes([trailer[0], trailer[1]]);
            if calculated != received {
                return Err(Error::BadChecksum { calculated, received });
            }
            Ok(Unframed { address: body[0], transaction_id: 0, pdu: &body[1..] })
        }
        Encapsulation::Ascii => {
            if raw.len() < 1 + 2 + 2 || raw[0] != b':' || !raw.ends_with(b"\r\n") {
                return Err(Error::MalformedFrame("missing ASCII framing bytes".into()));
            }
            let hex_part = &raw[1..raw.len() - 2];
            ascii_scratch.clear();
            hex_decode_into(hex_part, ascii_scratch)?;
            if ascii_scratch.len() < 2 {
                return Err(Error::ShortRead);
            }
            let body_len = ascii_scratch.len() - 1;
            let calculated = lrc(&ascii_scratch[..body_len]);
            let received = ascii_scratch[body_len];
            if calculated != received {
                return Err(Error::BadChecksum { calculated: calculated as u16, received: received as u16 });
            }
            Ok(Unframed { address: ascii_scratch[0], transaction_id: 0, pdu: &ascii_scratch[1..body_len] })
        }
        Encapsulation::Tcp => {
            if raw.len() < 8 {
                return Err(Error::ShortRead);
            }
            let transaction_id = u16::from_be_bytes([raw[0], raw[1]]);
            let protocol_id = u16::from_be_bytes([raw[2], raw[3]]);
            if protocol_id != PROTOCOL_ID {
                return Err(Error::MalformedFrame(format!("non-zero protocol id {protocol_id}")));
            }
            let len = u16::from_be_bytes([raw[4], raw[5]]) as usize;
            if raw.len() != 6 + len {
                return Err(Error::MalformedFrame(format!(
                    "MBAP length {len} does not match received bytes {}",
                    raw.len() - 6
                )));
            }
            Ok(Unframed { address: raw[6], transaction_id, pdu: &raw[7..] })
        }
    }
}
