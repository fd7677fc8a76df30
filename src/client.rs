//! Client engine: drives one request/response exchange per call.
//!
//! Implements the state machine of spec §4.5 (`Idle -> BuildingAdu ->
//! Sending -> AwaitingHeader -> AwaitingBody -> Parsing -> Idle`). There is
//! no concurrency within a handle: `call` borrows `&mut self` for its whole
//! duration and the returned [`Response`] borrows the handle's receive
//! buffer, so nothing else can touch the handle until the response is
//! dropped.
//!
//! Grounded on the teacher's `ModbusProcessor::process_request`, generalized
//! from "always RTU" to the three encapsulations and reusing [`crate::adu`]
//! for framing instead of reimplementing CRC handling inline.

use tracing::{debug, trace};

use crate::adu::{self, Encapsulation, MAX_ADU_SIZE};
use crate::error::{Error, Result};
use crate::pdu::{self, FunctionCode, Request, Response};
use crate::transport::{read_exact, read_until_crlf, write_all, Transport};
use crate::validate;

/// A Modbus client handle: one transport, one encapsulation, one scratch
/// buffer pair, for one outstanding request at a time.
pub struct ModbusClient<T: Transport> {
    transport: T,
    kind: Encapsulation,
    device_address: u8,
    transaction_id: u16,
    tx: Vec<u8>,
    /// Holds the outgoing request PDU while it's being framed into `tx`,
    /// then doubles as the ASCII hex-decode target for [`adu::unframe`] on
    /// the way back in (unused by RTU/TCP responses, which borrow `rx`
    /// directly) — no allocation happens on either side of a call.
    pdu_scratch: Vec<u8>,
    rx: Vec<u8>,
}

impl<T: Transport> ModbusClient<T> {
    /// Builds a client handle. `device_address` is the RTU/ASCII slave id or
    /// TCP unit id used until [`Self::set_device_address`] changes it.
    pub fn new(transport: T, kind: Encapsulation, device_address: u8) -> Self {
        Self {
            transport,
            kind,
            device_address,
            transaction_id: 0,
            tx: Vec::with_capacity(MAX_ADU_SIZE),
            pdu_scratch: Vec::with_capacity(pdu::MAX_PDU_SIZE),
            rx: Vec::with_capacity(MAX_ADU_SIZE),
        }
    }

    pub fn set_device_address(&mut self, address: u8) {
        self.device_address = address;
    }

    pub fn device_address(&self) -> u8 {
        self.device_address
    }

    /// Runs the full validate -> serialize -> frame -> send -> receive ->
    /// verify -> parse cycle for `request`, per spec §4.5.
    pub fn call(&mut self, request: &Request) -> Result<Response<'_>> {
        validate::validate(request)?;

        self.pdu_scratch.clear();
        request.serialize(&mut self.pdu_scratch)?;

        self.tx.clear();
        let sent_transaction_id = self.transaction_id;
        self.transaction_id = self.transaction_id.wrapping_add(1);
        adu::frame(self.kind, self.device_address, sent_transaction_id, &self.pdu_scratch, &mut self.tx)?;

        trace!(kind = ?self.kind, bytes = ?self.tx, "sending request ADU");
        write_all(&mut self.transport, &self.tx)?;

        self.receive_response()?;

        let unframed = adu::unframe(self.kind, &self.rx, &mut self.pdu_scratch)?;
        if self.kind == Encapsulation::Tcp && unframed.transaction_id != sent_transaction_id {
            return Err(Error::MalformedFrame(format!(
                "transaction id mismatch: sent {sent_transaction_id}, received {}",
                unframed.transaction_id
            )));
        }
        if self.kind != Encapsulation::Tcp && unframed.address != self.device_address {
            return Err(Error::MalformedFrame(format!(
                "device address mismatch: sent {}, received {}",
                self.device_address, unframed.address
            )));
        }

        let function_code_byte = *unframed.pdu.first().ok_or_else(|| Error::MalformedFrame("empty response PDU".into()))?;
        if FunctionCode::is_exception(function_code_byte) {
            let exception_byte = *unframed.pdu.get(1).ok_or_else(|| Error::MalformedFrame("truncated exception".into()))?;
            let exception = pdu::parse_exception(exception_byte)?;
            debug!(?exception, "peer returned exception");
            return Err(Error::Exception(exception));
        }

        let response = pdu::parse_response(request.function_code(), unframed.pdu)?;
        debug!(?response, "parsed response");
        Ok(response)
    }

    fn receive_response(&mut self) -> Result<()> {
        self.rx.clear();
        match self.kind {
            Encapsulation::Ascii => self.receive_ascii(),
            _ => self.receive_binary(),
        }
    }

    /// Bounded-lookahead read for RTU/TCP: read the framing prefix plus the
    /// first two PDU bytes, use the size oracle to learn the remainder, read
    /// exactly that much more. Never reads more than the frame needs.
    fn receive_binary(&mut self) -> Result<()> {
        let prefix = self.kind.pdu_offset();
        self.rx.resize(prefix + 2, 0);
        read_exact(&mut self.transport, &mut self.rx)?;

        let function_code = self.rx[prefix];
        let second_byte = self.rx[prefix + 1];
        let pdu_total_len = if FunctionCode::is_exception(function_code) {
            2
        } else {
            pdu::response_size_oracle(function_code, second_byte)?
        };

        let trailer_len = self.kind.trailer_len();
        let remaining = (pdu_total_len - 2) + trailer_len;
        let total_len = prefix + 2 + remaining;
        if total_len > self.kind.max_adu_size() {
            return Err(Error::BufferCapacity { needed: total_len, capacity: self.kind.max_adu_size() });
        }

        let old_len = self.rx.len();
        self.rx.resize(old_len + remaining, 0);
        read_exact(&mut self.transport, &mut self.rx[old_len..])?;
        Ok(())
    }

    /// ASCII framing is self-delimiting (terminated by CRLF), so rather than
    /// doing PDU-length arithmetic on hex-encoded bytes this reads one byte
    /// at a time until the CRLF terminator appears. Framing/LRC are still
    /// fully verified afterward by [`adu::unframe`].
    fn receive_ascii(&mut self) -> Result<()> {
        read_until_crlf(&mut self.transport, &mut self.rx, self.kind.max_adu_size())
    }
}

impl<T: Transport> std::fmt::Debug for ModbusClient<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModbusClient")
            .field("kind", &self.kind)
            .field("device_address", &self.device_address)
            .field("transaction_id", &self.transaction_id)
            .finish_non_exhaustive()
    }
}
