//! The operand model (spec §3) and its classification (spec §4.3).
//!
//! Classification happens once, at decode time, in a single fixed-priority
//! pass — ported from `original_source/instruction.py::RiscvOperand`, but
//! re-architected per spec §9 as a closed tagged variant instead of a
//! dynamic `is_register()`/`is_memory()`/... dispatch.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RiscvError};
use crate::registers;
use crate::taint::TaintMask;

/// A decoded instruction operand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operand {
    Register {
        name: String,
        idx: usize,
    },
    Memory {
        offset: i64,
        base_reg: String,
    },
    Constant {
        value: i64,
    },
    Label {
        name: String,
        target_line: usize,
    },
    CallFunction {
        name: String,
        taint: TaintMask,
    },
}

impl Operand {
    /// Resolves a label operand to its taint-call function name; errors on
    /// any other variant.
    pub fn target_name(&self) -> Result<&str> {
        match self {
            Operand::Label { name, .. } => Ok(name),
            other => Err(RiscvError::DecodeError(format!(
                "operand {:?} is not a jump/call target",
                other
            ))),
        }
    }

    fn original_token(&self) -> String {
        match self {
            Operand::Register { name, .. } => name.clone(),
            Operand::Memory { offset, base_reg } => format!("{}({})", offset, base_reg),
            Operand::Constant { value } => value.to_string(),
            Operand::Label { name, .. } => name.clone(),
            Operand::CallFunction { name, .. } => name.clone(),
        }
    }
}

/// Attempts to split a token of the form `offset(base)` into its signed
/// decimal offset and lowercased base register name. Matches the pattern
/// `-?[A-Za-z0-9]+\([A-Za-z0-9]+\)` from spec §4.3.
fn parse_memory_ref(token: &str) -> Option<(i64, String)> {
    let open = token.find('(')?;
    if !token.ends_with(')') {
        return None;
    }

    let offset_str = &token[..open];
    let base_str = &token[open + 1..token.len() - 1];

    if offset_str.is_empty() || base_str.is_empty() {
        return None;
    }
    if !base_str.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    let (sign, digits) = match offset_str.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, offset_str),
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }

    let offset: i64 = digits.parse().ok()?;
    Some((sign * offset, base_str.to_lowercase()))
}

/// Classifies a single textual operand token (spec §4.3, stable priority
/// order: register, label, memory reference, call-function, constant).
pub fn classify(
    token: &str,
    label_table: &HashMap<String, usize>,
    function_table: &HashMap<String, crate::taint::TaintMask>,
) -> Result<Operand> {
    if let Some(idx) = registers::abi_index(token) {
        return Ok(Operand::Register {
            name: token.to_lowercase(),
            idx,
        });
    }

    if let Some(&target_line) = label_table.get(token) {
        return Ok(Operand::Label {
            name: token.to_string(),
            target_line,
        });
    }

    if let Some((offset, base_reg)) = parse_memory_ref(token) {
        return Ok(Operand::Memory { offset, base_reg });
    }

    if let Some(&taint) = function_table.get(token) {
        return Ok(Operand::CallFunction {
            name: token.to_string(),
            taint,
        });
    }

    token
        .parse::<i64>()
        .map(|value| Operand::Constant { value })
        .map_err(|_| RiscvError::DecodeError(format!("cannot classify operand token '{}'", token)))
}

/// Re-stringifies an operand and re-classifies it, for the round-trip
/// property in spec §8 ("decoding then re-stringifying an operand
/// preserves classification").
pub fn roundtrip(
    op: &Operand,
    label_table: &HashMap<String, usize>,
    function_table: &HashMap<String, crate::taint::TaintMask>,
) -> Result<Operand> {
    classify(&op.original_token(), label_table, function_table)
}
