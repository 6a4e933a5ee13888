//! The assembly parser (spec §6, SPEC_FULL §4.0): turns program text into
//! the `Instruction`/label tables the interpreter consumes. Grounded on
//! `original_source/parser.py`, but reworked into the two-pass (labels,
//! then instructions) shape a label table referencing forward jumps
//! requires.

use crate::error::{Result, RiscvError};
use crate::operand;
use crate::program::{FunctionTable, Instruction, LabelTable, Program};

/// Drops a trailing comma from a single operand token (spec §6).
fn strip_trailing_comma(token: &str) -> &str {
    token.strip_suffix(',').unwrap_or(token)
}

/// A line kept after comment/directive/blank filtering.
enum Line<'a> {
    Label(&'a str),
    Instruction(&'a str),
}

fn classify_line(raw: &str) -> Option<Line<'_>> {
    let line = raw.trim();

    if line.is_empty() {
        return None;
    }
    if line.starts_with('#') {
        return None;
    }
    if line.starts_with('.') && !line.contains(':') {
        return None;
    }
    if let Some(colon) = line.find(':') {
        return Some(Line::Label(line[..colon].trim()));
    }

    Some(Line::Instruction(line))
}

/// Parses program text into a [`Program`] using the given function table.
pub fn parse(source: &str, functions: FunctionTable) -> Result<Program> {
    let mut labels = LabelTable::new();
    let mut instruction_lines: Vec<(usize, &str)> = Vec::new();

    for (source_line, raw) in source.lines().enumerate() {
        match classify_line(raw) {
            None => {}
            Some(Line::Label(name)) => {
                labels.insert(name.to_string(), instruction_lines.len());
            }
            Some(Line::Instruction(text)) => {
                instruction_lines.push((source_line, text));
            }
        }
    }

    if !labels.contains_key("main") {
        return Err(RiscvError::DecodeError(
            "program has no 'main' label".to_string(),
        ));
    }

    let mut instructions = Vec::with_capacity(instruction_lines.len());
    for (source_line, text) in instruction_lines {
        let tokens: Vec<&str> = text.split_whitespace().map(strip_trailing_comma).collect();
        let (opcode, operand_tokens) = tokens
            .split_first()
            .ok_or_else(|| RiscvError::DecodeError(format!("empty instruction at line {}", source_line)))?;

        let operands = operand_tokens
            .iter()
            .map(|tok| operand::classify(tok, &labels, &functions))
            .collect::<Result<Vec<_>>>()?;

        instructions.push(Instruction {
            opcode: opcode.to_string(),
            operands,
            source_line,
        });
    }

    Ok(Program {
        instructions,
        labels,
        functions,
    })
}
