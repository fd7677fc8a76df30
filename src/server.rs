//! Server dispatcher: read one ADU, route it by function code to a
//! registered per-address callback set, send the reply.
//!
//! Spec has no teacher precedent (the relay only ever acts as a client
//! toward the RTU side); this module is grounded directly on spec §4.6/§6,
//! built in the same style as [`crate::client`] (reusing [`crate::adu`] for
//! framing, `tracing` for observability).

use tracing::{debug, trace, warn};

use crate::adu::{self, Encapsulation, BROADCAST_ADDRESS, MAX_ADU_SIZE};
use crate::error::{CallbackStatus, Error, ExceptionCode, Result};
use crate::pdu::{self, FunctionCode, ParsedRequest, Response};
use crate::transport::{read_exact, read_until_crlf, write_all, Transport};

/// Server-only wildcard unit id: matches any inbound request that has no
/// exact-address registration.
pub const ANY_ADDRESS: u16 = 256;

/// Number of registrable listening-address slots, per spec §3.
pub const MAX_SLOTS: usize = 10;

/// Per-unit callback set a server dispatches requests to. All methods
/// default to [`CallbackStatus::Ignore`] so a registration only needs to
/// override the operations it actually serves.
pub trait ServerCallbacks {
    fn on_read_coil(&mut self, _unit: u8, _address: u16) -> (bool, CallbackStatus) {
        (false, CallbackStatus::Ignore)
    }
    fn on_read_discrete_input(&mut self, _unit: u8, _address: u16) -> (bool, CallbackStatus) {
        (false, CallbackStatus::Ignore)
    }
    fn on_read_holding_register(&mut self, _unit: u8, _address: u16) -> (u16, CallbackStatus) {
        (0, CallbackStatus::Ignore)
    }
    fn on_read_input_register(&mut self, _unit: u8, _address: u16) -> (u16, CallbackStatus) {
        (0, CallbackStatus::Ignore)
    }
    fn on_write_coil(&mut self, _unit: u8, _address: u16, _value: bool) -> CallbackStatus {
        CallbackStatus::Ignore
    }
    fn on_write_holding_register(&mut self, _unit: u8, _address: u16, _value: u16) -> CallbackStatus {
        CallbackStatus::Ignore
    }
}

struct Slot {
    listening_address: u16,
    callbacks: Box<dyn ServerCallbacks>,
}

/// A Modbus server handle: one transport, one encapsulation, a fixed table
/// of per-unit callback registrations.
pub struct ModbusServer<T: Transport> {
    transport: T,
    kind: Encapsulation,
    slots: Vec<Option<Slot>>,
    rx: Vec<u8>,
    tx: Vec<u8>,
    /// ASCII hex-decode target for [`adu::unframe`]; unused for RTU/TCP,
    /// which borrow `rx` directly. No allocation happens on the request path.
    ascii_scratch: Vec<u8>,
}

impl<T: Transport> ModbusServer<T> {
    pub fn new(transport: T, kind: Encapsulation) -> Self {
        let mut slots = Vec::with_capacity(MAX_SLOTS);
        slots.resize_with(MAX_SLOTS, || None);
        Self {
            transport,
            kind,
            slots,
            rx: Vec::with_capacity(MAX_ADU_SIZE),
            tx: Vec::with_capacity(MAX_ADU_SIZE),
            ascii_scratch: Vec::with_capacity(MAX_ADU_SIZE),
        }
    }

    /// Inserts into the first empty slot, or replaces the slot already
    /// bound to `listening_address`. Passing `None` clears that address's
    /// slot. Returns [`Error::Capacity`] if the table is full and
    /// `listening_address` is not already registered.
    pub fn set_callback(&mut self, listening_address: u16, callbacks: Option<Box<dyn ServerCallbacks>>) -> Result<()> {
        if let Some(slot) = self.slots.iter_mut().find(|s| matches!(s, Some(s) if s.listening_address == listening_address)) {
            *slot = callbacks.map(|callbacks| Slot { listening_address, callbacks });
            return Ok(());
        }
        let Some(callbacks) = callbacks else {
            return Ok(()); // clearing an address that wasn't registered is a no-op
        };
        match self.slots.iter_mut().find(|s| s.is_none()) {
            Some(slot) => {
                *slot = Some(Slot { listening_address, callbacks });
                Ok(())
            }
            None => Err(Error::Capacity),
        }
    }

    fn find_slot_mut(&mut self, unit_id: u8) -> Option<&mut Slot> {
        let exact = self
            .slots
            .iter()
            .position(|s| matches!(s, Some(s) if s.listening_address == unit_id as u16));
        let index = exact.or_else(|| {
            self.slots
                .iter()
                .position(|s| matches!(s, Some(s) if s.listening_address == ANY_ADDRESS))
        })?;
        self.slots[index].as_mut()
    }

    /// Runs one server iteration: read a request ADU, dispatch it, send a
    /// reply (unless the request was a broadcast or a callback suppressed
    /// it). Returns `Ok(())` whether or not a reply was sent; transport and
    /// framing errors propagate.
    pub fn poll_once(&mut self) -> Result<()> {
        self.receive_request()?;

        // Scoped so the borrow `unframe` takes of `self.rx`/`self.ascii_scratch`
        // ends here: `parsed` is owned, and `unit_id`/`transaction_id` are
        // `Copy`, so nothing below still holds a reference into `self`.
        let (unit_id, transaction_id, parse_result) = {
            let unframed = adu::unframe(self.kind, &self.rx, &mut self.ascii_scratch)?;
            (unframed.address, unframed.transaction_id, pdu::parse_request(unframed.pdu))
        };
        let broadcast = unit_id == BROADCAST_ADDRESS;

        let parsed = match parse_result {
            Ok(parsed) => parsed,
            Err(Error::IllegalFunction(code)) => {
                if !broadcast {
                    self.reply_exception(unit_id, transaction_id, code, ExceptionCode::IllegalFunction)?;
                }
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        trace!(unit_id, ?parsed, "dispatching request");

        let Some(slot) = self.find_slot_mut(unit_id) else {
            if !broadcast {
                warn!(unit_id, "no callback registered for unit");
                self.reply_exception(unit_id, transaction_id, parsed.function_code().code(), ExceptionCode::IllegalFunction)?;
            }
            return Ok(());
        };

        let outcome = dispatch(slot.callbacks.as_mut(), unit_id, &parsed);

        if broadcast {
            return Ok(());
        }

        match outcome {
            DispatchOutcome::Reply(pdu_bytes) => self.reply_ok(unit_id, transaction_id, &pdu_bytes),
            DispatchOutcome::Ignore => Ok(()),
            DispatchOutcome::Exception(exception) => self.reply_exception(unit_id, transaction_id, parsed.function_code().code(), exception),
        }
    }

    fn reply_ok(&mut self, unit_id: u8, transaction_id: u16, pdu_bytes: &[u8]) -> Result<()> {
        self.tx.clear();
        adu::frame(self.kind, unit_id, transaction_id, pdu_bytes, &mut self.tx)?;
        debug!(unit_id, bytes = ?self.tx, "sending reply");
        write_all(&mut self.transport, &self.tx)
    }

    fn reply_exception(&mut self, unit_id: u8, transaction_id: u16, function_code: u8, exception: ExceptionCode) -> Result<()> {
        self.tx.clear();
        let mut pdu_bytes = Vec::new();
        pdu::serialize_exception(function_code, exception, &mut pdu_bytes);
        adu::frame(self.kind, unit_id, transaction_id, &pdu_bytes, &mut self.tx)?;
        debug!(unit_id, ?exception, "sending exception reply");
        write_all(&mut self.transport, &self.tx)
    }

    fn receive_request(&mut self) -> Result<()> {
        self.rx.clear();
        match self.kind {
            Encapsulation::Rtu => self.receive_request_rtu(),
            Encapsulation::Ascii => read_until_crlf(&mut self.transport, &mut self.rx, self.kind.max_adu_size()),
            Encapsulation::Tcp => self.receive_request_tcp(),
        }
    }

    /// RTU has no length field and no self-delimiting terminator, so the
    /// frame boundary is learned the same way the response oracle works:
    /// read the address + function code, then (for fixed-length requests)
    /// the known remainder, or (for the two write-multiple functions) just
    /// enough more to learn `byte_count`. An unsupported function code
    /// leaves the dispatcher unable to know where the next frame starts —
    /// in real RTU that boundary is normally recovered via the bus's 3.5
    /// character silence timeout, which sits below this crate's
    /// byte-oriented [`Transport`] trait.
    fn receive_request_rtu(&mut self) -> Result<()> {
        self.rx.resize(2, 0);
        read_exact(&mut self.transport, &mut self.rx)?;
        let function_code = self.rx[1];
        match FunctionCode::from_code(function_code) {
            Some(
                FunctionCode::ReadCoils
                | FunctionCode::ReadDiscreteInputs
                | FunctionCode::ReadHoldingRegisters
                | FunctionCode::ReadInputRegisters
                | FunctionCode::WriteSingleCoil
                | FunctionCode::WriteSingleRegister,
            ) => self.extend_rx(4 + 2),
            Some(FunctionCode::WriteMultipleCoils | FunctionCode::WriteMultipleRegisters) => {
                self.extend_rx(5)?;
                let byte_count = *self.rx.last().expect("just extended") as usize;
                self.extend_rx(byte_count + 2)
            }
            None => Err(Error::IllegalFunction(function_code)),
        }
    }

    fn receive_request_tcp(&mut self) -> Result<()> {
        self.rx.resize(6, 0);
        read_exact(&mut self.transport, &mut self.rx)?;
        let len = u16::from_be_bytes([self.rx[4], self.rx[5]]) as usize;
        self.extend_rx(len)
    }

    fn extend_rx(&mut self, n: usize) -> Result<()> {
        let old_len = self.rx.len();
        let new_len = old_len + n;
        if new_len > self.kind.max_adu_size() {
            return Err(Error::BufferCapacity { needed: new_len, capacity: self.kind.max_adu_size() });
        }
        self.rx.resize(new_len, 0);
        read_exact(&mut self.transport, &mut self.rx[old_len..])
    }
}

enum DispatchOutcome {
    /// A serialized reply PDU, ready to frame and send. Built eagerly inside
    /// [`dispatch`] (rather than carrying a [`Response`] out of the function)
    /// because the coil variants borrow from a locally packed byte vector.
    Reply(Vec<u8>),
    Ignore,
    Exception(ExceptionCode),
}

fn status_to_outcome(status: CallbackStatus) -> std::result::Result<(), DispatchOutcome> {
    match status {
        CallbackStatus::Ok => Ok(()),
        CallbackStatus::Ignore => Err(DispatchOutcome::Ignore),
        CallbackStatus::Exception(e) => Err(DispatchOutcome::Exception(e)),
    }
}

fn serialize_reply(response: Response) -> DispatchOutcome {
    let mut pdu_bytes = Vec::with_capacity(pdu::MAX_PDU_SIZE);
    response.serialize(&mut pdu_bytes);
    DispatchOutcome::Reply(pdu_bytes)
}

fn dispatch(callbacks: &mut dyn ServerCallbacks, unit: u8, request: &ParsedRequest) -> DispatchOutcome {
    match *request {
        ParsedRequest::ReadCoils { start_address, quantity } | ParsedRequest::ReadDiscreteInputs { start_address, quantity } => {
            let is_coil = matches!(request, ParsedRequest::ReadCoils { .. });
            let mut bits = Vec::with_capacity(quantity as usize);
            for offset in 0..quantity {
                let address = start_address.wrapping_add(offset);
                let (bit, status) = if is_coil {
                    callbacks.on_read_coil(unit, address)
                } else {
                    callbacks.on_read_discrete_input(unit, address)
                };
                if let Err(outcome) = status_to_outcome(status) {
                    return outcome;
                }
                bits.push(bit);
            }
            let values = pack_bits(&bits);
            serialize_reply(if is_coil {
                Response::ReadCoils { values: &values }
            } else {
                Response::ReadDiscreteInputs { values: &values }
            })
        }
        ParsedRequest::ReadHoldingRegisters { start_address, quantity } | ParsedRequest::ReadInputRegisters { start_address, quantity } => {
            let is_holding = matches!(request, ParsedRequest::ReadHoldingRegisters { .. });
            let mut values = Vec::with_capacity(quantity as usize);
            for offset in 0..quantity {
                let address = start_address.wrapping_add(offset);
                let (value, status) = if is_holding {
                    callbacks.on_read_holding_register(unit, address)
                } else {
                    callbacks.on_read_input_register(unit, address)
                };
                if let Err(outcome) = status_to_outcome(status) {
                    return outcome;
                }
                values.push(value);
            }
            serialize_reply(if is_holding {
                Response::ReadHoldingRegisters { values }
            } else {
                Response::ReadInputRegisters { values }
            })
        }
        ParsedRequest::WriteSingleCoil { address, value } => {
            match status_to_outcome(callbacks.on_write_coil(unit, address, value == 0xFF00)) {
                Ok(()) => serialize_reply(Response::WriteSingleCoil { address, value }),
                Err(outcome) => outcome,
            }
        }
        ParsedRequest::WriteSingleRegister { address, value } => {
            match status_to_outcome(callbacks.on_write_holding_register(unit, address, value)) {
                Ok(()) => serialize_reply(Response::WriteSingleRegister { address, value }),
                Err(outcome) => outcome,
            }
        }
        ParsedRequest::WriteMultipleCoils { start_address, quantity, ref values } => {
            let bits = unpack_bits(values, quantity as usize);
            for (offset, bit) in bits.into_iter().enumerate() {
                let address = start_address.wrapping_add(offset as u16);
                if let Err(outcome) = status_to_outcome(callbacks.on_write_coil(unit, address, bit)) {
                    return outcome;
                }
            }
            serialize_reply(Response::WriteMultipleCoils { start_address, quantity })
        }
        ParsedRequest::WriteMultipleRegisters { start_address, quantity, ref values } => {
            for (offset, &value) in values.iter().enumerate() {
                let address = start_address.wrapping_add(offset as u16);
                if let Err(outcome) = status_to_outcome(callbacks.on_write_holding_register(unit, address, value)) {
                    return outcome;
                }
            }
            serialize_reply(Response::WriteMultipleRegisters { start_address, quantity })
        }
    }
}

fn pack_bits(bits: &[bool]) -> Vec<u8> {
    let mut bytes = vec![0u8; bits.len().div_ceil(8)];
    for (i, &bit) in bits.iter().enumerate() {
        if bit {
            bytes[i / 8] |= 1 << (i % 8);
        }
    }
    bytes
}

fn unpack_bits(bytes: &[u8], count: usize) -> Vec<bool> {
    (0..count).map(|i| bytes[i / 8] & (1 << (i % 8)) != 0).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;

    struct RegisterBank {
        holding: [u16; 16],
    }

    impl ServerCallbacks for RegisterBank {
        fn on_read_holding_register(&mut self, _unit: u8, address: u16) -> (u16, CallbackStatus) {
            match self.holding.get(address as usize) {
                Some(&v) => (v, CallbackStatus::Ok),
                None => (0, CallbackStatus::Exception(ExceptionCode::IllegalDataAddress)),
            }
        }

        fn on_write_holding_register(&mut self, _unit: u8, address: u16, value: u16) -> CallbackStatus {
            match self.holding.get_mut(address as usize) {
                Some(slot) => {
                    *slot = value;
                    CallbackStatus::Ok
                }
                None => CallbackStatus::Exception(ExceptionCode::IllegalDataAddress),
            }
        }
    }

    fn rtu_request(address: u8, pdu: &[u8]) -> Vec<u8> {
        let mut frame_bytes = vec![address];
        frame_bytes.extend_from_slice(pdu);
        let crc = crate::checksum::crc16(&frame_bytes);
        frame_bytes.extend_from_slice(&crc.to_le_bytes());
        frame_bytes
    }

    #[test]
    fn reads_holding_register_and_replies() {
        let mut bank = RegisterBank { holding: [0; 16] };
        bank.holding[3] = 0xABCD;
        let request = rtu_request(0x11, &[0x03, 0x00, 0x03, 0x00, 0x01]);

        let mut server = ModbusServer::new(MockTransport::with_inbound(&request), Encapsulation::Rtu);
        server.set_callback(0x11, Some(Box::new(bank))).unwrap();
        server.poll_once().unwrap();

        let reply_body = [0x11u8, 0x03, 0x02, 0xAB, 0xCD];
        let crc = crate::checksum::crc16(&reply_body);
        let mut expected = reply_body.to_vec();
        expected.extend_from_slice(&crc.to_le_bytes());
        assert_eq!(server.transport.outbound, expected);
    }

    #[test]
    fn broadcast_suppresses_reply() {
        let bank = RegisterBank { holding: [0; 16] };
        let request = rtu_request(0x00, &[0x06, 0x00, 0x00, 0x00, 0x2A]);

        let mut server = ModbusServer::new(MockTransport::with_inbound(&request), Encapsulation::Rtu);
        server.set_callback(ANY_ADDRESS, Some(Box::new(bank))).unwrap();
        server.poll_once().unwrap();

        assert!(server.transport.outbound.is_empty());
    }

    #[test]
    fn unmatched_unit_replies_illegal_function_exception() {
        let request = rtu_request(0x05, &[0x03, 0x00, 0x00, 0x00, 0x01]);
        let mut server = ModbusServer::new(MockTransport::with_inbound(&request), Encapsulation::Rtu);
        server.poll_once().unwrap();

        let reply_body = [0x05u8, 0x83, 0x01];
        let crc = crate::checksum::crc16(&reply_body);
        let mut expected = reply_body.to_vec();
        expected.extend_from_slice(&crc.to_le_bytes());
        assert_eq!(server.transport.outbound, expected);
    }

    #[test]
    fn unmatched_unit_replies_illegal_function_exception_over_tcp() {
        let mut request = Vec::new();
        adu::frame(Encapsulation::Tcp, 0x05, 0x0007, &[0x03, 0x00, 0x00, 0x00, 0x01], &mut request).unwrap();

        let mut server = ModbusServer::new(MockTransport::with_inbound(&request), Encapsulation::Tcp);
        server.poll_once().unwrap();

        let mut expected = Vec::new();
        adu::frame(Encapsulation::Tcp, 0x05, 0x0007, &[0x83, 0x01], &mut expected).unwrap();
        assert_eq!(server.transport.outbound, expected);
    }

    #[test]
    fn unmatched_unit_replies_illegal_function_exception_over_ascii() {
        let mut request = Vec::new();
        adu::frame(Encapsulation::Ascii, 0x05, 0, &[0x03, 0x00, 0x00, 0x00, 0x01], &mut request).unwrap();

        let mut server = ModbusServer::new(MockTransport::with_inbound(&request), Encapsulation::Ascii);
        server.poll_once().unwrap();

        let mut expected = Vec::new();
        adu::frame(Encapsulation::Ascii, 0x05, 0, &[0x83, 0x01], &mut expected).unwrap();
        assert_eq!(server.transport.outbound, expected);
    }

    #[test]
    fn any_slot_matches_when_no_exact_slot_registered() {
        let bank = RegisterBank { holding: [7; 16] };
        let request = rtu_request(0x09, &[0x03, 0x00, 0x00, 0x00, 0x01]);
        let mut server = ModbusServer::new(MockTransport::with_inbound(&request), Encapsulation::Rtu);
        server.set_callback(ANY_ADDRESS, Some(Box::new(bank))).unwrap();
        server.poll_once().unwrap();
        assert!(!server.transport.outbound.is_empty());
    }

    #[test]
    fn set_callback_capacity_enforced() {
        let mut server = ModbusServer::new(MockTransport::default(), Encapsulation::Rtu);
        for unit in 0..MAX_SLOTS as u16 {
            server.set_callback(unit, Some(Box::new(RegisterBank { holding: [0; 16] }))).unwrap();
        }
        let err = server.set_callback(MAX_SLOTS as u16, Some(Box::new(RegisterBank { holding: [0; 16] })));
        assert!(matches!(err, Err(Error::Capacity)));
    }

    #[test]
    fn write_multiple_coils_dispatches_per_bit() {
        struct Counter {
            writes: Vec<(u16, bool)>,
        }
        impl ServerCallbacks for Counter {
            fn on_write_coil(&mut self, _unit: u8, address: u16, value: bool) -> CallbackStatus {
                self.writes.push((address, value));
                CallbackStatus::Ok
            }
        }
        let request = rtu_request(0x01, &[0x0F, 0x00, 0x00, 0x00, 0x03, 0x01, 0x05]); // 0b101 -> bit0=1,bit1=0,bit2=1
        let mut server = ModbusServer::new(MockTransport::with_inbound(&request), Encapsulation::Rtu);
        server.set_callback(0x01, Some(Box::new(Counter { writes: Vec::new() }))).unwrap();
        server.poll_once().unwrap();
        assert!(!server.transport.outbound.is_empty());
    }
}
