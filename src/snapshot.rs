//! The snapshot store: persist/restore a full interpreter to a named slot
//! under a snapshot directory, and enumerate slots in execution order
//! (spec §4.8).
//!
//! Grounded on `original_source/backtrack.py` and `analyze.py`, which walk
//! a `pickles/` directory of one-file-per-step dumps named so that sorting
//! the directory listing reproduces execution order.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, RiscvError};
use crate::interpreter::{Interpreter, InterpreterPayload};
use crate::policy;

/// Replaces anything that isn't ASCII alphanumeric with `_`, so a source
/// file's path can be embedded in a directory name (spec §6:
/// `jar_<sanitized_file>`).
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// The `pickles/` directory for a given cabinet root and source file
/// (spec §6: `pickle_cabinet/jar_<sanitized_file>/pickles`).
pub fn pickles_dir(cabinet: &Path, source_file: &str) -> PathBuf {
    cabinet.join(format!("jar_{}", sanitize_filename(source_file))).join("pickles")
}

/// The slot name for a given snapshot counter and program counter, chosen
/// so lexicographic order equals execution order (spec §4.8).
pub fn slot_name(snapshot_counter: u64, pc: i64) -> String {
    format!("state-instr{:06}-line{:06}", snapshot_counter, pc.max(0))
}

/// Serializes `interpreter`'s current state into a new slot under
/// `cabinet`/`jar_<source_file>`/pickles, then advances its snapshot
/// counter.
pub fn write_snapshot(
    cabinet: &Path,
    source_file: &str,
    interpreter: &mut Interpreter,
    policy_id: &str,
) -> Result<PathBuf> {
    let dir = pickles_dir(cabinet, source_file);
    fs::create_dir_all(&dir).map_err(|e| RiscvError::SnapshotError(e.to_string()))?;

    let name = slot_name(interpreter.snapshot_counter, interpreter.pc());
    let path = dir.join(name);

    if path.exists() {
        log::warn!("re-creating existing snapshot slot {}", path.display());
    }

    let payload = interpreter.to_payload(policy_id);
    let json = serde_json::to_string_pretty(&payload)
        .map_err(|e| RiscvError::SnapshotError(e.to_string()))?;
    fs::write(&path, json).map_err(|e| RiscvError::SnapshotError(e.to_string()))?;

    interpreter.snapshot_counter += 1;
    Ok(path)
}

/// Loads a single snapshot file and rebuilds an independent `Interpreter`,
/// resolving its pinned policy identifier (spec §9).
pub fn load_snapshot(path: &Path) -> Result<Interpreter> {
    let json = fs::read_to_string(path).map_err(|e| RiscvError::SnapshotError(e.to_string()))?;
    let payload: InterpreterPayload =
        serde_json::from_str(&json).map_err(|e| RiscvError::SnapshotError(e.to_string()))?;
    let policy = policy::by_id(&payload.policy_id)?;
    Ok(Interpreter::from_payload(payload, policy))
}

/// Lists a `pickles/` directory's snapshot files in execution order.
pub fn enumerate_slots(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(|e| RiscvError::SnapshotError(e.to_string()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    entries.sort();
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::Policy;
    use crate::program::default_function_table;
    use crate::taint::TaintMask;

    fn build(source: &str) -> Interpreter {
        let program = crate::parser::parse(source, default_function_table()).unwrap();
        Interpreter::new(program, 4096, 128, Policy::default_policy()).unwrap()
    }

    #[test]
    fn sanitizes_path_separators() {
        assert_eq!(sanitize_filename("foo/bar.s"), "foo_bar_s");
    }

    #[test]
    fn slot_names_sort_in_execution_order() {
        let mut names: Vec<String> = (0..12).map(|i| slot_name(i, i as i64)).collect();
        let sorted = {
            let mut s = names.clone();
            s.sort();
            s
        };
        assert_eq!(names.drain(..).collect::<Vec<_>>(), sorted);
    }

    #[test]
    fn write_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mut interp = build("main:\n\taddi a0, zero, 9\n\tret\n");
        interp.step().unwrap();

        let path = write_snapshot(dir.path(), "prog.s", &mut interp, "default").unwrap();
        assert!(path.exists());
        assert_eq!(interp.snapshot_counter, 1);

        let mut restored = load_snapshot(&path).unwrap();
        restored.run().unwrap();
        assert_eq!(restored.state.get_reg("a0").unwrap(), 9);
    }

    #[test]
    fn enumerate_slots_returns_sorted_paths() {
        let dir = tempfile::tempdir().unwrap();
        let mut interp = build("main:\n\taddi a0, zero, 1\n\taddi a0, a0, 1\n\tret\n");

        write_snapshot(dir.path(), "prog.s", &mut interp, "default").unwrap();
        interp.step().unwrap();
        write_snapshot(dir.path(), "prog.s", &mut interp, "default").unwrap();

        let jar = pickles_dir(dir.path(), "prog.s");
        let slots = enumerate_slots(&jar).unwrap();
        assert_eq!(slots.len(), 2);
        assert!(slots[0] < slots[1]);
    }

    #[test]
    fn backtrack_determinism() {
        let mut interp = build(
            "main:\n\
             \taddi a0, zero, 1\n\
             \tcall get_uid\n\
             \tmv a2, a0\n\
             \taddi a0, a0, 1\n\
             \tret\n",
        );
        interp.step().unwrap();
        interp.step().unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = write_snapshot(dir.path(), "prog.s", &mut interp, "default").unwrap();

        let mut original = interp;
        original.run().unwrap();

        let mut resumed = load_snapshot(&path).unwrap();
        resumed.run().unwrap();

        assert_eq!(original.state.get_reg("a0").unwrap(), resumed.state.get_reg("a0").unwrap());
        assert_eq!(original.state.get_reg("a2").unwrap(), resumed.state.get_reg("a2").unwrap());
        assert_eq!(
            original.tracker.reg_taint("a2").unwrap(),
            resumed.tracker.reg_taint("a2").unwrap()
        );
        assert_eq!(original.tracker.reg_taint("a2").unwrap(), TaintMask::UID);
    }
}
