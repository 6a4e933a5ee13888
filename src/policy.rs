//! The taint policy: `opcode -> handler(tracker, state, operands)` (spec
//! §4.7), mutating shadow state *before* the instruction executor runs.
//!
//! Grounded on `original_source/policy.py`, which keeps a process-wide
//! dict of handlers keyed by opcode name. Spec §9 flags that as a global
//! mutable registry and recommends an explicit value the `Interpreter`
//! holds and a constructor injects — so here a `Policy` is data (a
//! `HashMap` of boxed closures) owned by whoever builds the interpreter,
//! not a lazily-initialized global.

use std::collections::HashMap;

use crate::error::{Result, RiscvError};
use crate::machine::MachineState;
use crate::operand::Operand;
use crate::shadow::TaintTracker;

/// A single opcode's taint-propagation rule.
pub type Handler = Box<dyn Fn(&mut TaintTracker, &MachineState, &[Operand]) -> Result<()> + Send + Sync>;

fn require_operands(opcode: &str, operands: &[Operand], expected: usize) -> Result<()> {
    if operands.len() < expected {
        Err(RiscvError::InsufficientOperands {
            opcode: opcode.to_string(),
            expected,
            got: operands.len(),
        })
    } else {
        Ok(())
    }
}

/// `replace(op0, OR(taint(op1), taint(op2)))` — the rule shared by every
/// two-source arithmetic opcode (spec §4.7).
fn binary_or_handler(opcode: &'static str) -> Handler {
    Box::new(move |tracker, state, operands| {
        require_operands(opcode, operands, 3)?;
        let t1 = tracker.operand_taint(&operands[1], state)?;
        let t2 = tracker.operand_taint(&operands[2], state)?;
        let new = t1.or(t2);
        let old = tracker.operand_taint(&operands[0], state)?;
        if old != new {
            log::debug!("{}: {:?} -> {:?} on {:?}", opcode, old, new, operands[0]);
        }
        tracker.replace_operand_taint(&operands[0], new, state)
    })
}

/// `replace(op0, taint(op1))` — shared by `lui`, `mv`, and `lw` (spec §4.7).
fn copy_handler(opcode: &'static str) -> Handler {
    Box::new(move |tracker, state, operands| {
        require_operands(opcode, operands, 2)?;
        let t1 = tracker.operand_taint(&operands[1], state)?;
        let old = tracker.operand_taint(&operands[0], state)?;
        if old != t1 {
            log::debug!("{}: {:?} -> {:?} on {:?}", opcode, old, t1, operands[0]);
        }
        tracker.replace_operand_taint(&operands[0], t1, state)
    })
}

/// `replace(op1, taint(op0))` — `sw` (spec §4.7).
fn store_handler() -> Handler {
    Box::new(|tracker, state, operands| {
        require_operands("sw", operands, 2)?;
        let t0 = tracker.operand_taint(&operands[0], state)?;
        let old = tracker.operand_taint(&operands[1], state)?;
        if old != t0 {
            log::debug!("sw: {:?} -> {:?} on {:?}", old, t0, operands[1]);
        }
        tracker.replace_operand_taint(&operands[1], t0, state)
    })
}

/// `call` → set `tracker.taint_source` if the target is a known function;
/// no-op for a real label call (spec §4.5, §4.7).
///
/// A simulated call has no assembly body and so no later `ret` will ever
/// run to consume `taint_source` — the call-site completes the return in
/// this same step (spec §4.5, §9), writing `a0`'s taint immediately and
/// clearing `taint_source` right back to clean.
fn call_handler() -> Handler {
    Box::new(|tracker, _state, operands| {
        require_operands("call", operands, 1)?;
        if let Operand::CallFunction { name, taint } = &operands[0] {
            tracker.taint_source = *taint;
            let old = tracker.reg_taint("a0")?;
            if old != tracker.taint_source {
                log::debug!("call {}: a0 {:?} -> {:?}", name, old, tracker.taint_source);
            }
            tracker.replace_reg_taint("a0", tracker.taint_source)?;
            tracker.taint_source = crate::taint::TaintMask::CLEAN;
        }
        Ok(())
    })
}

/// `ret` → consume `taint_source` into `a0` if pending, then clear it
/// (spec §4.7).
fn ret_handler() -> Handler {
    Box::new(|tracker, _state, _operands| {
        if !tracker.taint_source.is_clean() {
            let old = tracker.reg_taint("a0")?;
            if old != tracker.taint_source {
                log::debug!("ret: a0 {:?} -> {:?}", old, tracker.taint_source);
            }
            tracker.replace_reg_taint("a0", tracker.taint_source)?;
        }
        tracker.taint_source = crate::taint::TaintMask::CLEAN;
        Ok(())
    })
}

fn noop_handler() -> Handler {
    Box::new(|_tracker, _state, _operands| Ok(()))
}

/// An opcode-keyed taint policy. `Policy::default_policy()` implements the
/// table in spec §4.7; hosts may register additional opcodes or wrap
/// existing ones (e.g. to trace certain PC ranges).
pub struct Policy {
    handlers: HashMap<String, Handler>,
}

impl Policy {
    pub fn new() -> Self {
        Self { handlers: HashMap::new() }
    }

    pub fn register(&mut self, opcode: impl Into<String>, handler: Handler) {
        self.handlers.insert(opcode.into(), handler);
    }

    /// Replaces `opcode`'s handler with one that wraps the existing
    /// handler, which `wrapper` must invoke exactly once (spec §4.7).
    /// No-ops if `opcode` has no registered handler.
    pub fn wrap<F>(&mut self, opcode: &str, wrapper: F)
    where
        F: Fn(&Handler, &mut TaintTracker, &MachineState, &[Operand]) -> Result<()> + Send + Sync + 'static,
    {
        if let Some(inner) = self.handlers.remove(opcode) {
            let wrapped: Handler = Box::new(move |tracker, state, operands| {
                wrapper(&inner, tracker, state, operands)
            });
            self.handlers.insert(opcode.to_string(), wrapped);
        }
    }

    /// Runs `opcode`'s handler, or `UnsupportedTaintOpcode` if none is
    /// registered (spec §7).
    pub fn apply(
        &self,
        opcode: &str,
        tracker: &mut TaintTracker,
        state: &MachineState,
        operands: &[Operand],
    ) -> Result<()> {
        match self.handlers.get(opcode) {
            Some(handler) => handler(tracker, state, operands),
            None => Err(RiscvError::UnsupportedTaintOpcode(opcode.to_string())),
        }
    }

    /// The policy named in spec §4.7.
    pub fn default_policy() -> Self {
        let mut policy = Self::new();

        for opcode in [
            "addi", "add", "subi", "sub", "andi", "and", "xori", "xor", "srli", "srl", "slli",
            "sll",
        ] {
            policy.register(opcode, binary_or_handler(opcode));
        }
        for opcode in ["lui", "mv", "lw"] {
            policy.register(opcode, copy_handler(opcode));
        }
        policy.register("sw", store_handler());
        policy.register("call", call_handler());
        policy.register("ret", ret_handler());
        for opcode in ["beq", "bne", "blt", "bnez", "j", "jalr"] {
            policy.register(opcode, noop_handler());
        }

        policy
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self::default_policy()
    }
}

/// Resolves a policy identifier to a concrete [`Policy`]. Snapshots pin the
/// identifier rather than the policy itself (spec §9: "serialize only
/// data ... on load, re-inject a Policy chosen by the host").
pub fn by_id(id: &str) -> Result<Policy> {
    match id {
        "default" => Ok(Policy::default_policy()),
        other => Err(RiscvError::SnapshotError(format!("unknown policy id '{}'", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::MachineState;
    use crate::taint::TaintMask;

    fn reg(name: &str, idx: usize) -> Operand {
        Operand::Register { name: name.to_string(), idx }
    }

    #[test]
    fn binary_or_replaces_with_union() {
        let policy = Policy::default_policy();
        let state = MachineState::new(64, 8, 0);
        let mut tracker = TaintTracker::new(64);
        tracker.add_reg_taint(10usize, TaintMask::LOC).unwrap();
        tracker.add_reg_taint(11usize, TaintMask::UID).unwrap();

        policy
            .apply("addi", &mut tracker, &state, &[reg("a2", 12), reg("a0", 10), reg("a1", 11)])
            .unwrap();

        assert_eq!(tracker.reg_taint(12usize).unwrap(), TaintMask::LOC.or(TaintMask::UID));
    }

    #[test]
    fn call_to_known_function_taints_a0_and_clears_taint_source() {
        let policy = Policy::default_policy();
        let state = MachineState::new(64, 8, 0);
        let mut tracker = TaintTracker::new(64);
        let target = Operand::CallFunction { name: "get_uid".to_string(), taint: TaintMask::UID };

        policy.apply("call", &mut tracker, &state, &[target]).unwrap();
        assert_eq!(tracker.reg_taint("a0").unwrap(), TaintMask::UID);
        assert_eq!(tracker.taint_source, TaintMask::CLEAN);
    }

    #[test]
    fn ret_consumes_and_clears_taint_source() {
        let policy = Policy::default_policy();
        let state = MachineState::new(64, 8, 0);
        let mut tracker = TaintTracker::new(64);
        tracker.taint_source = TaintMask::LOC;

        policy.apply("ret", &mut tracker, &state, &[]).unwrap();

        assert_eq!(tracker.reg_taint("a0").unwrap(), TaintMask::LOC);
        assert_eq!(tracker.taint_source, TaintMask::CLEAN);
    }

    #[test]
    fn branch_opcodes_are_noop() {
        let policy = Policy::default_policy();
        let state = MachineState::new(64, 8, 0);
        let mut tracker = TaintTracker::new(64);
        tracker.add_reg_taint(10usize, TaintMask::LOC).unwrap();

        policy
            .apply("beq", &mut tracker, &state, &[reg("a0", 10), reg("zero", 0)])
            .unwrap();
        assert_eq!(tracker.reg_taint(10usize).unwrap(), TaintMask::LOC);
    }

    #[test]
    fn unregistered_opcode_is_unsupported_taint_opcode() {
        let policy = Policy::new();
        let state = MachineState::new(64, 8, 0);
        let mut tracker = TaintTracker::new(64);
        let err = policy.apply("addi", &mut tracker, &state, &[]).unwrap_err();
        assert!(matches!(err, RiscvError::UnsupportedTaintOpcode(_)));
    }

    #[test]
    fn wrap_calls_inner_handler_exactly_once() {
        use std::cell::Cell;
        use std::rc::Rc;

        let mut policy = Policy::default_policy();
        let calls = Rc::new(Cell::new(0));
        let calls_clone = calls.clone();

        // Send+Sync isn't needed for this single-threaded test closure; we
        // only exercise `wrap`'s call-exactly-once contract.
        struct Counter(Rc<Cell<u32>>);
        unsafe impl Send for Counter {}
        unsafe impl Sync for Counter {}
        let counter = Counter(calls_clone);

        policy.wrap("mv", move |inner, tracker, state, operands| {
            counter.0.set(counter.0.get() + 1);
            inner(tracker, state, operands)
        });

        let state = MachineState::new(64, 8, 0);
        let mut tracker = TaintTracker::new(64);
        tracker.add_reg_taint(10usize, TaintMask::NAME).unwrap();
        policy.apply("mv", &mut tracker, &state, &[reg("a1", 11), reg("a0", 10)]).unwrap();

        assert_eq!(calls.get(), 1);
        assert_eq!(tracker.reg_taint(11usize).unwrap(), TaintMask::NAME);
    }
}
