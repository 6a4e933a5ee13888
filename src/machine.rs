//! Concrete machine state: 33 integer registers, byte-addressed memory, and
//! the stack bound (spec §3, §4.1).

use serde::{Deserialize, Serialize};

use crate::error::{Result, RiscvError};
use crate::operand::Operand;
use crate::registers::{self, NUM_REGISTERS, PC, RA, SP, ZERO};

/// Anything that can be resolved to a register index: an ABI name or a raw
/// index (spec §4.1: "`r` may be an ABI name ... or an index 0..32").
pub trait RegisterRef {
    fn resolve(&self) -> Result<usize>;
}

impl RegisterRef for &str {
    fn resolve(&self) -> Result<usize> {
        registers::abi_index(self)
            .ok_or_else(|| RiscvError::InvalidRegister((*self).to_string()))
    }
}

impl RegisterRef for String {
    fn resolve(&self) -> Result<usize> {
        self.as_str().resolve()
    }
}

impl RegisterRef for usize {
    fn resolve(&self) -> Result<usize> {
        if *self < NUM_REGISTERS {
            Ok(*self)
        } else {
            Err(RiscvError::InvalidRegister(self.to_string()))
        }
    }
}

/// The machine's concrete state: no truncation to 32 bits is performed —
/// the interpreter operates on unbounded integers (spec §3, §9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineState {
    registers: Vec<i64>,
    memory: Vec<i64>,
    pub mem_size: usize,
    pub stack_size: usize,
}

impl MachineState {
    /// Constructs a fresh machine: `sp` at `mem_size`, `pc` at `entry_point`,
    /// `ra` at the terminal sentinel `-1` (spec §3).
    pub fn new(mem_size: usize, stack_size: usize, entry_point: usize) -> Self {
        let mut state = Self {
            registers: vec![0; NUM_REGISTERS],
            memory: vec![0; mem_size],
            mem_size,
            stack_size,
        };

        state.registers[SP] = mem_size as i64;
        state.registers[PC] = entry_point as i64;
        state.registers[RA] = -1;

        state
    }

    pub fn get_reg(&self, r: impl RegisterRef) -> Result<i64> {
        let idx = r.resolve()?;
        Ok(self.registers[idx])
    }

    /// Writes to register `zero` (index 0) are dropped, per the §9 redesign
    /// recommendation — real RV32I requires it, the source prototype did
    /// not enforce it.
    pub fn set_reg(&mut self, r: impl RegisterRef, value: i64) -> Result<()> {
        let idx = r.resolve()?;
        if idx != ZERO {
            self.registers[idx] = value;
        }
        Ok(())
    }

    pub fn get_mem(&self, addr: i64) -> Result<i64> {
        let idx = self.checked_addr(addr)?;
        Ok(self.memory[idx])
    }

    pub fn set_mem(&mut self, addr: i64, value: i64) -> Result<()> {
        let idx = self.checked_addr(addr)?;
        self.memory[idx] = value;
        Ok(())
    }

    fn checked_addr(&self, addr: i64) -> Result<usize> {
        if addr >= 0 && (addr as usize) < self.mem_size {
            Ok(addr as usize)
        } else {
            Err(RiscvError::OutOfBounds {
                address: addr,
                size: self.mem_size,
            })
        }
    }

    fn effective_address(&self, offset: i64, base_reg: &str) -> Result<i64> {
        Ok(self.get_reg(base_reg)? + offset)
    }

    /// Resolves an operand to its concrete value (spec §4.1).
    pub fn operand_value(&self, op: &Operand) -> Result<i64> {
        match op {
            Operand::Register { idx, .. } => self.get_reg(*idx),
            Operand::Memory { offset, base_reg } => {
                let addr = self.effective_address(*offset, base_reg)?;
                self.get_mem(addr)
            }
            Operand::Constant { value } => Ok(*value),
            Operand::Label { .. } => Err(RiscvError::DecodeError(
                "label operand has no concrete value; use target_name() instead".to_string(),
            )),
            Operand::CallFunction { name, .. } => Err(RiscvError::DecodeError(format!(
                "call-function operand '{}' has no concrete value",
                name
            ))),
        }
    }

    /// Writes a concrete value through an operand (spec §4.1).
    pub fn write_operand(&mut self, op: &Operand, value: i64) -> Result<()> {
        match op {
            Operand::Register { idx, .. } => self.set_reg(*idx, value),
            Operand::Memory { offset, base_reg } => {
                let addr = self.effective_address(*offset, base_reg)?;
                self.set_mem(addr, value)
            }
            other => Err(RiscvError::DecodeError(format!(
                "cannot write through operand {:?}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sp_starts_at_mem_size_and_off_by_one_faults() {
        let mut state = MachineState::new(4096, 128, 0);
        assert_eq!(state.get_reg("sp").unwrap(), 4096);

        // sw 0(sp) immediately after construction is out of bounds (spec §8).
        let addr = state.get_reg("sp").unwrap();
        assert!(state.set_mem(addr, 1).is_err());
    }

    #[test]
    fn ra_sentinel_is_minus_one() {
        let state = MachineState::new(4096, 128, 0);
        assert_eq!(state.get_reg("ra").unwrap(), -1);
    }

    #[test]
    fn writes_to_zero_are_dropped() {
        let mut state = MachineState::new(4096, 128, 0);
        state.set_reg("zero", 1234).unwrap();
        assert_eq!(state.get_reg("zero").unwrap(), 0);
        state.set_reg(0usize, 5678).unwrap();
        assert_eq!(state.get_reg(0usize).unwrap(), 0);
    }

    #[test]
    fn invalid_register_errors() {
        let state = MachineState::new(4096, 128, 0);
        assert!(state.get_reg("not_a_reg").unwrap_err().to_string().contains("invalid register"));
        assert!(state.get_reg(99usize).is_err());
    }

    #[test]
    fn out_of_bounds_memory_errors() {
        let state = MachineState::new(16, 128, 0);
        assert!(state.get_mem(-1).is_err());
        assert!(state.get_mem(16).is_err());
        assert!(state.get_mem(15).is_ok());
    }
}
