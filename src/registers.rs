//! The RV32I register ABI names and their indices (spec §6).
//!
//! Index 32 is the program counter; there is no dedicated `PC` register in
//! the ISA, but the interpreter models it as register 32 for uniformity
//! (spec §3).

use std::collections::HashMap;
use std::sync::OnceLock;

pub const NUM_REGISTERS: usize = 33;
pub const PC: usize = 32;
pub const RA: usize = 1;
pub const SP: usize = 2;
pub const ZERO: usize = 0;

fn abi_table() -> &'static HashMap<&'static str, usize> {
    static TABLE: OnceLock<HashMap<&'static str, usize>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut m = HashMap::new();
        m.insert("zero", 0);
        m.insert("ra", 1);
        m.insert("sp", 2);
        m.insert("gp", 3);
        m.insert("tp", 4);
        m.insert("t0", 5);
        m.insert("t1", 6);
        m.insert("t2", 7);
        m.insert("s0", 8);
        m.insert("fp", 8);
        m.insert("s1", 9);
        m.insert("a0", 10);
        m.insert("a1", 11);
        m.insert("a2", 12);
        m.insert("a3", 13);
        m.insert("a4", 14);
        m.insert("a5", 15);
        m.insert("a6", 16);
        m.insert("a7", 17);
        m.insert("s2", 18);
        m.insert("s3", 19);
        m.insert("s4", 20);
        m.insert("s5", 21);
        m.insert("s6", 22);
        m.insert("s7", 23);
        m.insert("s8", 24);
        m.insert("s9", 25);
        m.insert("s10", 26);
        m.insert("s11", 27);
        m.insert("t3", 28);
        m.insert("t4", 29);
        m.insert("t5", 30);
        m.insert("t6", 31);
        m.insert("pc", 32);
        m
    })
}

/// Resolves an ABI register name (lowercased) to its index, if valid.
pub fn abi_index(name: &str) -> Option<usize> {
    abi_table().get(name.to_lowercase().as_str()).copied()
}

pub fn is_abi_name(name: &str) -> bool {
    abi_index(name).is_some()
}

/// The canonical (non-alias) ABI name for each register index, for
/// reporting (spec §6). `s0` is preferred over its `fp` alias.
pub const CANONICAL_NAMES: [&str; NUM_REGISTERS] = [
    "zero", "ra", "sp", "gp", "tp", "t0", "t1", "t2", "s0", "s1", "a0", "a1", "a2", "a3", "a4",
    "a5", "a6", "a7", "s2", "s3", "s4", "s5", "s6", "s7", "s8", "s9", "s10", "s11", "t3", "t4",
    "t5", "t6", "pc",
];
