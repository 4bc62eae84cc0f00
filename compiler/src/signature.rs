// signature.rs — Kernel signature codec
//
// A signature is a 6-bit mask describing a kernel's parameter shape. Bit
// positions come from the compile-unit descriptor and are never reordered.
// Every synthesizer tests bits through these predicates and nowhere else.

use std::fmt;
use std::ops::BitOr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signature(u32);

impl Signature {
    pub const INPUT: Signature = Signature(0x01);
    pub const OUTPUT: Signature = Signature(0x02);
    pub const USER_DATA: Signature = Signature(0x04);
    pub const X: Signature = Signature(0x08);
    pub const Y: Signature = Signature(0x10);
    pub const KERNEL: Signature = Signature(0x20);

    /// Mask of every defined bit.
    pub const ALL: Signature = Signature(0x3f);

    pub const fn from_bits(bits: u32) -> Self {
        Signature(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    const fn has(self, flag: Signature) -> bool {
        self.0 & flag.0 != 0
    }

    pub const fn has_input(self) -> bool {
        self.has(Self::INPUT)
    }

    pub const fn has_output(self) -> bool {
        self.has(Self::OUTPUT)
    }

    pub const fn has_user_data(self) -> bool {
        self.has(Self::USER_DATA)
    }

    pub const fn has_x(self) -> bool {
        self.has(Self::X)
    }

    pub const fn has_y(self) -> bool {
        self.has(Self::Y)
    }

    pub const fn is_kernel_entry(self) -> bool {
        self.has(Self::KERNEL)
    }

    /// No defined bit set.
    pub const fn is_empty(self) -> bool {
        self.0 & Self::ALL.0 == 0
    }

    /// Every value of the 6-bit space, in ascending order.
    pub fn all_values() -> impl Iterator<Item = Signature> {
        (0..=Self::ALL.0).map(Signature)
    }
}

impl BitOr for Signature {
    type Output = Signature;

    fn bitor(self, rhs: Signature) -> Signature {
        Signature(self.0 | rhs.0)
    }
}

impl From<u32> for Signature {
    fn from(bits: u32) -> Self {
        Signature(bits)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (Self::INPUT, "in"),
            (Self::OUTPUT, "out"),
            (Self::USER_DATA, "usr"),
            (Self::X, "x"),
            (Self::Y, "y"),
            (Self::KERNEL, "kernel"),
        ];
        let set: Vec<&str> = names
            .iter()
            .filter(|(flag, _)| self.has(*flag))
            .map(|(_, name)| *name)
            .collect();
        if set.is_empty() {
            write!(f, "none")
        } else {
            write!(f, "{}", set.join("|"))
        }
    }
}
