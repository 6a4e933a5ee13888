//! The interpreter loop: fetch, policy, execute, advance (spec §4.6).
//!
//! Grounded on `original_source/interpreter.py::Interpreter`, which holds
//! the same set of fields and the same `while True` loop; here the match
//! on the control token is exhaustive over [`ControlToken`] instead of a
//! dynamically-typed int-or-string.

use serde::{Deserialize, Serialize};

use crate::error::{Result, RiscvError};
use crate::executor::{self, ControlToken};
use crate::machine::MachineState;
use crate::policy::Policy;
use crate::program::Program;
use crate::registers::PC;
use crate::shadow::TaintTracker;

/// What happened after one call to [`Interpreter::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Continue,
    Terminal,
}

/// Owns Machine State, Shadow State, the decoded program, the policy, and
/// the loop's bookkeeping fields (spec §3).
pub struct Interpreter {
    pub state: MachineState,
    pub tracker: TaintTracker,
    pub program: Program,
    pub policy: Policy,
    pub current_block: String,
    pub current_function: String,
    pub snapshot_counter: u64,
}

impl Interpreter {
    /// Constructs an interpreter for `program`, entering at its `main`
    /// label, with `policy` injected by the caller (spec §9: explicit
    /// `Policy` value, not a global registry).
    pub fn new(program: Program, mem_size: usize, stack_size: usize, policy: Policy) -> Result<Self> {
        let entry = *program
            .labels
            .get("main")
            .ok_or_else(|| RiscvError::DecodeError("program has no 'main' label".to_string()))?;

        Ok(Self {
            state: MachineState::new(mem_size, stack_size, entry),
            tracker: TaintTracker::new(mem_size),
            program,
            policy,
            current_block: "main".to_string(),
            current_function: "main".to_string(),
            snapshot_counter: 0,
        })
    }

    /// Executes exactly one instruction: policy first, then concrete
    /// semantics, then PC/block bookkeeping (spec §4.6, §5).
    pub fn step(&mut self) -> Result<StepOutcome> {
        let pc = self.state.get_reg(PC)? as usize;
        if pc >= self.program.instructions.len() {
            return Err(RiscvError::OutOfBounds {
                address: pc as i64,
                size: self.program.instructions.len(),
            });
        }

        let instr = self.program.instructions[pc].clone();
        log::trace!("pc={} opcode={} operands={:?}", pc, instr.opcode, instr.operands);

        self.policy
            .apply(&instr.opcode, &mut self.tracker, &self.state, &instr.operands)?;
        let token = executor::execute(&instr, &mut self.state)?;

        match token {
            ControlToken::FallThrough => {
                self.state.set_reg(PC, pc as i64 + 1)?;
                Ok(StepOutcome::Continue)
            }
            ControlToken::Return => Ok(StepOutcome::Continue),
            ControlToken::Terminal => Ok(StepOutcome::Terminal),
            ControlToken::Jumped(name) => {
                if let Some(name) = name {
                    if instr.opcode == "call" {
                        self.current_function = name.clone();
                    }
                    self.current_block = name;
                }
                Ok(StepOutcome::Continue)
            }
        }
    }

    /// Drives the interpreter to the terminal return.
    pub fn run(&mut self) -> Result<()> {
        loop {
            if self.step()? == StepOutcome::Terminal {
                return Ok(());
            }
        }
    }

    /// The current program counter, exposed for snapshot slot naming
    /// (spec §4.8).
    pub fn pc(&self) -> i64 {
        self.state.get_reg(PC).unwrap_or(-1)
    }

    /// Captures everything the snapshot store must persist (spec §4.8),
    /// tagged with a `policy_id` rather than the policy value itself.
    pub fn to_payload(&self, policy_id: impl Into<String>) -> InterpreterPayload {
        InterpreterPayload {
            state: self.state.clone(),
            tracker: self.tracker.clone(),
            program: self.program.clone(),
            current_block: self.current_block.clone(),
            current_function: self.current_function.clone(),
            snapshot_counter: self.snapshot_counter,
            policy_id: policy_id.into(),
        }
    }

    /// Rebuilds an `Interpreter` from a restored payload, re-injecting
    /// `policy` rather than anything deserialized (spec §9).
    pub fn from_payload(payload: InterpreterPayload, policy: Policy) -> Self {
        Self {
            state: payload.state,
            tracker: payload.tracker,
            program: payload.program,
            policy,
            current_block: payload.current_block,
            current_function: payload.current_function,
            snapshot_counter: payload.snapshot_counter,
        }
    }
}

/// The serializable half of an [`Interpreter`]: everything except the
/// policy (spec §4.8, §9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterpreterPayload {
    pub state: MachineState,
    pub tracker: TaintTracker,
    pub program: Program,
    pub current_block: String,
    pub current_function: String,
    pub snapshot_counter: u64,
    pub policy_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::default_function_table;
    use crate::taint::TaintMask;

    fn build(source: &str) -> Interpreter {
        let program = crate::parser::parse(source, default_function_table()).unwrap();
        Interpreter::new(program, 4096, 128, Policy::default_policy()).unwrap()
    }

    #[test]
    fn scenario_taint_source_to_sink() {
        let mut interp = build("main:\n\tcall get_user_location\n\tmv a1, a0\n\tret\n");
        interp.run().unwrap();
        assert_eq!(interp.tracker.reg_taint("a1").unwrap(), TaintMask::LOC);
        assert_eq!(interp.tracker.reg_taint("a0").unwrap(), TaintMask::LOC);
        assert_eq!(interp.tracker.taint_source, TaintMask::CLEAN);
    }

    #[test]
    fn scenario_arithmetic_or() {
        let mut interp = build("main:\n\tadd a2, a0, a1\n\tret\n");
        interp.tracker.add_reg_taint("a0", TaintMask::LOC).unwrap();
        interp.tracker.add_reg_taint("a1", TaintMask::UID).unwrap();
        interp.run().unwrap();
        assert_eq!(interp.tracker.reg_taint("a2").unwrap(), TaintMask::LOC.or(TaintMask::UID));
    }

    #[test]
    fn scenario_branch_not_taken() {
        let mut interp = build(
            "main:\n\
             \taddi a0, zero, 1\n\
             \tbeq a0, zero, skip\n\
             \taddi a1, a0, 0\n\
             skip:\n\
             \tret\n",
        );
        interp.run().unwrap();
        assert_eq!(interp.state.get_reg("a1").unwrap(), 1);
        assert_eq!(
            interp.tracker.reg_taint("a1").unwrap(),
            interp.tracker.reg_taint("a0").unwrap()
        );
    }

    #[test]
    fn payload_round_trips_through_default_policy() {
        let mut interp = build("main:\n\taddi a0, zero, 5\n\tret\n");
        interp.step().unwrap();
        let payload = interp.to_payload("default");
        let serialized = serde_json::to_string(&payload).unwrap();
        let restored: InterpreterPayload = serde_json::from_str(&serialized).unwrap();
        let mut resumed = Interpreter::from_payload(restored, Policy::default_policy());
        resumed.run().unwrap();
        assert_eq!(resumed.state.get_reg("a0").unwrap(), 5);
    }
}
