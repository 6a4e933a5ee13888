//! Typed error taxonomy for the interpreter core (spec kinds, see §7).

use thiserror::Error;

/// A fatal error raised by the core. Every variant here aborts the
/// current `step()` and propagates to the host; nothing is retried
/// inside the core.
#[derive(Debug, Error)]
pub enum RiscvError {
    #[error("decode error: {0}")]
    DecodeError(String),

    #[error("invalid register: {0}")]
    InvalidRegister(String),

    #[error("memory access out of bounds: address {address}, size {size}")]
    OutOfBounds { address: i64, size: usize },

    #[error("insufficient operands for '{opcode}': expected at least {expected}, got {got}")]
    InsufficientOperands {
        opcode: String,
        expected: usize,
        got: usize,
    },

    #[error("unsupported instruction: {0}")]
    UnsupportedInstruction(String),

    #[error("unsupported taint opcode: {0}")]
    UnsupportedTaintOpcode(String),

    #[error("snapshot error: {0}")]
    SnapshotError(String),
}

pub type Result<T> = std::result::Result<T, RiscvError>;
