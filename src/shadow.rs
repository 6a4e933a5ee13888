//! Shadow state (spec §3, §4.2) and the taint tracker built on top of it.
//!
//! Grounded on `original_source/taint.py::TaintTracker`: that class holds
//! `shadow_registers`, `shadow_memory`, and `taint_source` together. We
//! split the plain data (`ShadowState`) from the operations that mutate it
//! (`TaintTracker`) per the component table in spec §2, but the tracker
//! owns its shadow state directly rather than borrowing it, since the
//! `Interpreter` needs a single value to snapshot.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::machine::RegisterRef;
use crate::operand::Operand;
use crate::registers::{NUM_REGISTERS, ZERO};
use crate::taint::TaintMask;

/// Mirrors `MachineState`'s shape: one taint word per register, one taint
/// byte per memory byte (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShadowState {
    reg_taint: Vec<TaintMask>,
    mem_taint: Vec<TaintMask>,
}

impl ShadowState {
    pub fn new(mem_size: usize) -> Self {
        Self {
            reg_taint: vec![TaintMask::CLEAN; NUM_REGISTERS],
            mem_taint: vec![TaintMask::CLEAN; mem_size],
        }
    }

    pub fn mem_size(&self) -> usize {
        self.mem_taint.len()
    }
}

/// Reads/writes shadow state for any operand; exposes the OR/replace/add
/// primitives named in spec §4.2. Also holds `taint_source`, the pending
/// return-value taint of a simulated external call (spec §4.2, §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaintTracker {
    shadow: ShadowState,
    pub taint_source: TaintMask,
}

impl TaintTracker {
    pub fn new(mem_size: usize) -> Self {
        Self {
            shadow: ShadowState::new(mem_size),
            taint_source: TaintMask::CLEAN,
        }
    }

    pub fn shadow(&self) -> &ShadowState {
        &self.shadow
    }

    pub fn reg_taint(&self, r: impl RegisterRef) -> Result<TaintMask> {
        let idx = r.resolve()?;
        Ok(self.shadow.reg_taint[idx])
    }

    /// Writes to `zero`'s shadow are dropped, mirroring `MachineState`'s
    /// treatment of concrete writes to the same register (spec §9).
    pub fn replace_reg_taint(&mut self, r: impl RegisterRef, taint: TaintMask) -> Result<()> {
        let idx = r.resolve()?;
        if idx != ZERO {
            self.shadow.reg_taint[idx] = taint;
        }
        Ok(())
    }

    pub fn add_reg_taint(&mut self, r: impl RegisterRef, taint: TaintMask) -> Result<()> {
        let idx = r.resolve()?;
        if idx != ZERO {
            self.shadow.reg_taint[idx] = self.shadow.reg_taint[idx].or(taint);
        }
        Ok(())
    }

    pub fn mem_taint(&self, addr: i64) -> Result<TaintMask> {
        let idx = self.checked_addr(addr)?;
        Ok(self.shadow.mem_taint[idx])
    }

    pub fn replace_mem_taint(&mut self, addr: i64, taint: TaintMask) -> Result<()> {
        let idx = self.checked_addr(addr)?;
        self.shadow.mem_taint[idx] = taint;
        Ok(())
    }

    pub fn add_mem_taint(&mut self, addr: i64, taint: TaintMask) -> Result<()> {
        let idx = self.checked_addr(addr)?;
        self.shadow.mem_taint[idx] = self.shadow.mem_taint[idx].or(taint);
        Ok(())
    }

    fn checked_addr(&self, addr: i64) -> Result<usize> {
        if addr >= 0 && (addr as usize) < self.shadow.mem_size() {
            Ok(addr as usize)
        } else {
            Err(crate::error::RiscvError::OutOfBounds {
                address: addr,
                size: self.shadow.mem_size(),
            })
        }
    }

    fn effective_address(
        &self,
        offset: i64,
        base_reg: &str,
        machine: &crate::machine::MachineState,
    ) -> Result<i64> {
        Ok(machine.get_reg(base_reg)? + offset)
    }

    /// Resolves an operand's taint, mirroring `MachineState::operand_value`
    /// (spec §4.2): `Constant -> 0`, `Label -> error`.
    pub fn operand_taint(
        &self,
        op: &Operand,
        machine: &crate::machine::MachineState,
    ) -> Result<TaintMask> {
        match op {
            Operand::Register { idx, .. } => self.reg_taint(*idx),
            Operand::Memory { offset, base_reg } => {
                let addr = self.effective_address(*offset, base_reg, machine)?;
                self.mem_taint(addr)
            }
            Operand::Constant { .. } => Ok(TaintMask::CLEAN),
            Operand::Label { .. } => Err(crate::error::RiscvError::DecodeError(
                "label operand has no taint; use target_name() instead".to_string(),
            )),
            Operand::CallFunction { name, .. } => Err(crate::error::RiscvError::DecodeError(format!(
                "call-function operand '{}' has no taint",
                name
            ))),
        }
    }

    /// Replaces the taint of whatever the operand resolves to (register or
    /// memory cell) with `taint`.
    pub fn replace_operand_taint(
        &mut self,
        op: &Operand,
        taint: TaintMask,
        machine: &crate::machine::MachineState,
    ) -> Result<()> {
        match op {
            Operand::Register { idx, .. } => self.replace_reg_taint(*idx, taint),
            Operand::Memory { offset, base_reg } => {
                let addr = self.effective_address(*offset, base_reg, machine)?;
                self.replace_mem_taint(addr, taint)
            }
            other => Err(crate::error::RiscvError::DecodeError(format!(
                "cannot write taint through operand {:?}",
                other
            ))),
        }
    }

    /// The fraction of registers carrying non-zero taint (ported from
    /// `original_source/taint.py::percentage_tainted_registers`).
    pub fn percentage_tainted_registers(&self) -> f64 {
        let tainted = self.shadow.reg_taint.iter().filter(|t| !t.is_clean()).count();
        tainted as f64 / self.shadow.reg_taint.len() as f64
    }

    /// The fraction of memory bytes carrying non-zero taint (ported from
    /// `original_source/taint.py::percentage_tainted_memory`).
    pub fn percentage_tainted_memory(&self) -> f64 {
        let tainted = self.shadow.mem_taint.iter().filter(|t| !t.is_clean()).count();
        tainted as f64 / self.shadow.mem_taint.len() as f64
    }
}
