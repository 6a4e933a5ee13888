//! End-to-end scenarios exercising the public interpreter API, one per
//! documented scenario in the spec.

use riscv_taint::interpreter::{Interpreter, StepOutcome};
use riscv_taint::policy::Policy;
use riscv_taint::program::default_function_table;
use riscv_taint::taint::TaintMask;
use riscv_taint::{parser, snapshot};

fn interpreter_for(source: &str) -> Interpreter {
    let program = parser::parse(source, default_function_table()).expect("parse");
    Interpreter::new(program, 4096, 128, Policy::default_policy()).expect("construct")
}

#[test]
fn taint_source_to_sink() {
    let mut interp = interpreter_for(
        "main:\n\
         \tcall get_user_location\n\
         \tmv a1, a0\n\
         \tret\n",
    );

    assert_eq!(interp.step().unwrap(), StepOutcome::Continue); // call
    assert_eq!(interp.step().unwrap(), StepOutcome::Continue); // mv
    assert_eq!(interp.tracker.reg_taint("a1").unwrap(), TaintMask::LOC);

    assert_eq!(interp.step().unwrap(), StepOutcome::Terminal); // ret
    assert_eq!(interp.tracker.reg_taint("a0").unwrap(), TaintMask::LOC);
    assert_eq!(interp.tracker.taint_source, TaintMask::CLEAN);
}

#[test]
fn arithmetic_or() {
    let mut interp = interpreter_for("main:\n\tadd a2, a0, a1\n\tret\n");
    interp.tracker.add_reg_taint("a0", TaintMask::LOC).unwrap();
    interp.tracker.add_reg_taint("a1", TaintMask::UID).unwrap();

    interp.run().unwrap();

    assert_eq!(interp.tracker.reg_taint("a2").unwrap(), TaintMask::LOC.or(TaintMask::UID));
}

#[test]
fn load_store_through_memory() {
    let mut interp = interpreter_for("main:\n\tsw t0, 0(sp)\n\tlw t1, 0(sp)\n\tret\n");
    interp.tracker.add_reg_taint("t0", TaintMask::PASSWORD).unwrap();
    interp.state.set_reg("sp", 100).unwrap();

    assert_eq!(interp.step().unwrap(), StepOutcome::Continue); // sw
    assert_eq!(interp.tracker.mem_taint(100).unwrap(), TaintMask::PASSWORD);

    assert_eq!(interp.step().unwrap(), StepOutcome::Continue); // lw
    assert_eq!(interp.tracker.reg_taint("t1").unwrap(), TaintMask::PASSWORD);
}

#[test]
fn branch_not_taken_no_taint_flow() {
    let mut interp = interpreter_for(
        "main:\n\
         \taddi a0, zero, 1\n\
         \tbeq a0, zero, skip\n\
         \taddi a1, a0, 0\n\
         skip:\n\
         \tret\n",
    );

    interp.run().unwrap();

    assert_eq!(interp.state.get_reg("a1").unwrap(), 1);
    assert_eq!(interp.tracker.reg_taint("a1").unwrap(), interp.tracker.reg_taint("a0").unwrap());
    assert_eq!(interp.tracker.reg_taint("a1").unwrap(), TaintMask::CLEAN);
}

#[test]
fn snapshot_backtrack_determinism() {
    let mut interp = interpreter_for(
        "main:\n\
         \taddi a0, zero, 1\n\
         \tcall get_uid\n\
         \tmv a2, a0\n\
         \taddi a3, a2, 1\n\
         \taddi a0, a0, 1\n\
         \tret\n",
    );

    interp.step().unwrap();
    interp.step().unwrap();

    let dir = tempfile::tempdir().unwrap();
    let snapshot_path = snapshot::write_snapshot(dir.path(), "scenario5.s", &mut interp, "default").unwrap();

    let mut original = interp;
    original.run().unwrap();

    let mut resumed = snapshot::load_snapshot(&snapshot_path).unwrap();
    resumed.run().unwrap();

    for name in ["a0", "a2", "a3"] {
        assert_eq!(original.state.get_reg(name).unwrap(), resumed.state.get_reg(name).unwrap());
        assert_eq!(original.tracker.reg_taint(name).unwrap(), resumed.tracker.reg_taint(name).unwrap());
    }
}

#[test]
fn taint_free_constant_addition() {
    let mut interp = interpreter_for(
        "main:\n\
         \taddi a0, zero, 42\n\
         \taddi a1, zero, 7\n\
         \tadd a2, a0, a1\n\
         \tret\n",
    );

    interp.run().unwrap();

    assert_eq!(interp.state.get_reg("a0").unwrap(), 42);
    assert_eq!(interp.state.get_reg("a1").unwrap(), 7);
    assert_eq!(interp.state.get_reg("a2").unwrap(), 49);
    for name in ["a0", "a1", "a2"] {
        assert_eq!(interp.tracker.reg_taint(name).unwrap(), TaintMask::CLEAN);
    }
}
