//! Nominal index types for the five constant pools.
//!
//! Each wraps a plain machine integer but is a distinct type, so a string
//! index can never be handed to a method-pool lookup (or mixed up with a
//! code-unit offset) without an explicit conversion.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! pool_index {
    ($(#[$doc:meta])* $name:ident, $tag:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub u32);

        impl $name {
            #[inline]
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl From<u32> for $name {
            fn from(v: u32) -> Self {
                $name(v)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($tag, "@{}"), self.0)
            }
        }
    };
}

pool_index!(
    /// Index into the string pool.
    StringId, "string");
pool_index!(
    /// Index into the type pool.
    TypeId, "type");
pool_index!(
    /// Index into the prototype pool.
    ProtoId, "proto");
pool_index!(
    /// Index into the field pool.
    FieldId, "field");
pool_index!(
    /// Index into the method pool.
    MethodId, "method");

/// Sentinel meaning "no index" in class-def records (superclass, source file).
pub const NO_INDEX: u32 = 0xffff_ffff;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_tags() {
        assert_eq!(StringId(7).to_string(), "string@7");
        assert_eq!(MethodId(0).to_string(), "method@0");
    }
}
