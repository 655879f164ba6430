//! Access flags for classes, fields and methods.
//!
//! The on-disk bitset overloads some positions by declaration kind: 0x40 is
//! `volatile` on a field but `bridge` on a method, 0x80 is `transient` on a
//! field but `varargs` on a method. One flags type covers all three kinds;
//! the per-kind masks say which bits are meaningful where.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct AccessFlags: u32 {
        const PUBLIC = 0x1;
        const PRIVATE = 0x2;
        const PROTECTED = 0x4;
        const STATIC = 0x8;
        const FINAL = 0x10;
        const SYNCHRONIZED = 0x20;
        const VOLATILE = 0x40;
        const BRIDGE = 0x40;
        const TRANSIENT = 0x80;
        const VARARGS = 0x80;
        const NATIVE = 0x100;
        const INTERFACE = 0x200;
        const ABSTRACT = 0x400;
        const STRICT = 0x800;
        const SYNTHETIC = 0x1000;
        const ANNOTATION = 0x2000;
        const ENUM = 0x4000;
        const CONSTRUCTOR = 0x10000;
        const DECLARED_SYNCHRONIZED = 0x20000;
    }
}

impl AccessFlags {
    /// Bits meaningful on a class_def_item.
    pub const CLASS_MASK: AccessFlags = AccessFlags::from_bits_truncate(
        0x1 | 0x10 | 0x200 | 0x400 | 0x1000 | 0x2000 | 0x4000,
    );

    /// Bits meaningful on an encoded field.
    pub const FIELD_MASK: AccessFlags = AccessFlags::from_bits_truncate(
        0x1 | 0x2 | 0x4 | 0x8 | 0x10 | 0x40 | 0x80 | 0x1000 | 0x4000,
    );

    /// Bits meaningful on an encoded method.
    pub const METHOD_MASK: AccessFlags = AccessFlags::from_bits_truncate(
        0x1 | 0x2
            | 0x4
            | 0x8
            | 0x10
            | 0x20
            | 0x40
            | 0x80
            | 0x100
            | 0x400
            | 0x800
            | 0x1000
            | 0x10000
            | 0x20000,
    );

    pub fn from_raw(bits: u32) -> AccessFlags {
        AccessFlags::from_bits_retain(bits)
    }

    pub fn raw(self) -> u32 {
        self.bits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlapping_bits() {
        assert_eq!(AccessFlags::VOLATILE, AccessFlags::BRIDGE);
        assert_eq!(AccessFlags::TRANSIENT, AccessFlags::VARARGS);
    }

    #[test]
    fn masks() {
        assert!(AccessFlags::CLASS_MASK.contains(AccessFlags::INTERFACE));
        assert!(!AccessFlags::CLASS_MASK.contains(AccessFlags::NATIVE));
        assert!(AccessFlags::METHOD_MASK.contains(AccessFlags::CONSTRUCTOR));
        assert!(!AccessFlags::FIELD_MASK.contains(AccessFlags::NATIVE));
    }

    #[test]
    fn raw_roundtrip() {
        let f = AccessFlags::PUBLIC | AccessFlags::STATIC | AccessFlags::FINAL;
        assert_eq!(AccessFlags::from_raw(f.raw()), f);
    }
}
