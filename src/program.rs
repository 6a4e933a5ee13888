//! Decoded program tables: instructions, block labels, and the taint
//! function table (spec §3, §6).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::operand::Operand;
use crate::taint::TaintMask;

/// A single decoded instruction. Immutable once parsed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instruction {
    pub opcode: String,
    pub operands: Vec<Operand>,
    pub source_line: usize,
}

/// `function_name -> taint_label` (spec §3, §6). Calls to these names
/// synthesize a tainted return value instead of executing assembly.
pub type FunctionTable = HashMap<String, TaintMask>;

/// `label -> instruction_index` (spec §3).
pub type LabelTable = HashMap<String, usize>;

/// The minimum function table named in spec §6.
pub fn default_function_table() -> FunctionTable {
    let mut table = FunctionTable::new();
    table.insert("get_user_location".to_string(), TaintMask::LOC);
    table.insert("get_uid".to_string(), TaintMask::UID);
    table.insert("get_user_name".to_string(), TaintMask::NAME);
    table.insert("get_face".to_string(), TaintMask::FACE);
    table.insert("get_password".to_string(), TaintMask::PASSWORD);
    table
}

/// A fully decoded program: the instruction stream plus the tables needed
/// to resolve jump/call targets and simulated external calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Program {
    pub instructions: Vec<Instruction>,
    pub labels: LabelTable,
    pub functions: FunctionTable,
}
