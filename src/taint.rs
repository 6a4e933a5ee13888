//! Taint labels and the taint mask bitset they compose into.
//!
//! Ported from `original_source/instruction.py`'s `TAINT_*` constants. The
//! one-hex-digit spacing is kept deliberately so printed masks stay readable.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

/// A single bit of sensitive provenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaintLabel {
    Loc,
    Uid,
    Name,
    Face,
    Password,
    Other,
}

impl TaintLabel {
    const ALL: [(TaintLabel, &'static str); 6] = [
        (TaintLabel::Loc, "LOC"),
        (TaintLabel::Uid, "UID"),
        (TaintLabel::Name, "NAME"),
        (TaintLabel::Face, "FACE"),
        (TaintLabel::Password, "PASSWORD"),
        (TaintLabel::Other, "OTHER"),
    ];

    pub const fn bit(self) -> u32 {
        match self {
            TaintLabel::Loc => 0x1,
            TaintLabel::Uid => 0x10,
            TaintLabel::Name => 0x100,
            TaintLabel::Face => 0x1000,
            TaintLabel::Password => 0x10000,
            TaintLabel::Other => 0x100000,
        }
    }
}

/// A bitmask over [`TaintLabel`]s. `0` means clean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaintMask(pub u32);

impl TaintMask {
    pub const CLEAN: TaintMask = TaintMask(0);
    pub const LOC: TaintMask = TaintMask(TaintLabel::Loc.bit());
    pub const UID: TaintMask = TaintMask(TaintLabel::Uid.bit());
    pub const NAME: TaintMask = TaintMask(TaintLabel::Name.bit());
    pub const FACE: TaintMask = TaintMask(TaintLabel::Face.bit());
    pub const PASSWORD: TaintMask = TaintMask(TaintLabel::Password.bit());
    pub const OTHER: TaintMask = TaintMask(TaintLabel::Other.bit());

    pub fn is_clean(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, label: TaintLabel) -> bool {
        self.0 & label.bit() != 0
    }

    /// `OR(t1, t2) = t1 | t2` — commutative, associative, `OR(t, 0) = t`.
    pub fn or(self, other: TaintMask) -> TaintMask {
        TaintMask(self.0 | other.0)
    }
}

impl BitOr for TaintMask {
    type Output = TaintMask;

    fn bitor(self, rhs: TaintMask) -> TaintMask {
        self.or(rhs)
    }
}

impl BitOrAssign for TaintMask {
    fn bitor_assign(&mut self, rhs: TaintMask) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for TaintMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_clean() {
            return write!(f, "CLEAN");
        }

        let names: Vec<&str> = TaintLabel::ALL
            .iter()
            .filter(|(label, _)| self.contains(*label))
            .map(|(_, name)| *name)
            .collect();

        write!(f, "{}", names.join("|"))
    }
}
