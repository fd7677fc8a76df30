//! Pure validator applied to a request before it is ever serialized or sent.
//!
//! Ranges come from spec §4.4. The teacher's source (per spec §9 design
//! notes) mixed up the `ReadInputRegisters` bound and used the wrong
//! byte-count formulas for the multi-write variants; this validator follows
//! the table in the specification, not those historical bugs.

use crate::error::{Error, Result};
use crate::pdu::Request;

const MAX_READ_BITS: u16 = 2000;
const MAX_READ_REGISTERS: u16 = 125;
const MAX_WRITE_COILS: u16 = 1968;
const MAX_WRITE_REGISTERS: u16 = 123;

/// Checks `request` against the §4.4 table. Returns
/// [`Error::IllegalDataValue`] on a range violation.
pub fn validate(request: &Request) -> Result<()> {
    match *request {
        Request::ReadCoils { quantity, .. } | Request::ReadDiscreteInputs { quantity, .. } => {
            check_quantity(quantity, 1, MAX_READ_BITS)
        }
        Request::ReadHoldingRegisters { quantity, .. } | Request::ReadInputRegisters { quantity, .. } => {
            check_quantity(quantity, 1, MAX_READ_REGISTERS)
        }
        Request::WriteSingleCoil { value, .. } => {
            if value == 0x0000 || value == 0xFF00 {
                Ok(())
            } else {
                Err(Error::IllegalDataValue(format!(
                    "write_single_coil value {value:#06x} is neither 0x0000 nor 0xFF00"
                )))
            }
        }
        Request::WriteSingleRegister { .. } => Ok(()),
        Request::WriteMultipleCoils { quantity, values, .. } => {
            check_quantity(quantity, 1, MAX_WRITE_COILS)?;
            let expected = quantity.div_ceil(8) as usize;
            if values.len() != expected {
                return Err(Error::IllegalDataValue(format!(
                    "write_multiple_coils byte_count {} does not match ceil(quantity/8) {expected}",
                    values.len()
                )));
            }
            Ok(())
        }
        Request::WriteMultipleRegisters { quantity, values, .. } => {
            check_quantity(quantity, 1, MAX_WRITE_REGISTERS)?;
            if values.len() != quantity as usize {
                return Err(Error::IllegalDataValue(format!(
                    "write_multiple_registers got {} values for quantity {}",
                    values.len(),
                    quantity
                )));
            }
            Ok(())
        }
    }
}

fn check_quantity(quantity: u16, min: u16, max: u16) -> Result<()> {
    if quantity < min || quantity > max {
        Err(Error::IllegalDataValue(format!(
            "quantity {quantity} outside allowed range {min}..={max}"
        )))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_holding_registers_boundaries() {
        assert!(validate(&Request::ReadHoldingRegisters { start_address: 0, quantity: 0 }).is_err());
        assert!(validate(&Request::ReadHoldingRegisters { start_address: 0, quantity: 1 }).is_ok());
        assert!(validate(&Request::ReadHoldingRegisters { start_address: 0, quantity: 125 }).is_ok());
        assert!(validate(&Request::ReadHoldingRegisters { start_address: 0, quantity: 126 }).is_err());
    }

    #[test]
    fn read_coils_boundaries() {
        assert!(validate(&Request::ReadCoils { start_address: 0, quantity: 2000 }).is_ok());
        assert!(validate(&Request::ReadCoils { start_address: 0, quantity: 2001 }).is_err());
    }

    #[test]
    fn write_single_coil_values() {
        for good in [0x0000u16, 0xFF00] {
            assert!(validate(&Request::WriteSingleCoil { address: 0, value: good }).is_ok());
        }
        for bad in [0x0001u16, 0xFFFF] {
            assert!(validate(&Request::WriteSingleCoil { address: 0, value: bad }).is_err());
        }
    }

    #[test]
    fn write_single_register_has_no_range() {
        assert!(validate(&Request::WriteSingleRegister { address: 0, value: 0xFFFF }).is_ok());
    }

    #[test]
    fn write_multiple_coils_byte_count_and_quantity() {
        let good_values = vec![0xFFu8; 2];
        assert!(validate(&Request::WriteMultipleCoils { start_address: 0, quantity: 16, values: &good_values }).is_ok());
        assert!(validate(&Request::WriteMultipleCoils { start_address: 0, quantity: 0, values: &[] }).is_err());
        assert!(validate(&Request::WriteMultipleCoils { start_address: 0, quantity: 1969, values: &vec![0u8; 247] }).is_err());
        assert!(validate(&Request::WriteMultipleCoils { start_address: 0, quantity: 9, values: &[0u8] }).is_err());
    }

    #[test]
    fn write_multiple_registers_byte_count_and_quantity() {
        let values = vec![0u16; 2];
        assert!(validate(&Request::WriteMultipleRegisters { start_address: 0, quantity: 2, values: &values }).is_ok());
        assert!(validate(&Request::WriteMultipleRegisters { start_address: 0, quantity: 124, values: &vec![0u16; 124] }).is_err());
    }
}
