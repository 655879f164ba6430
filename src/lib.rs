//! # dexcodec
//!
//! A library for decoding and encoding Android DEX files.
//!
//! The public boundary is deliberately small: [`Dex::from_bytes`] decodes a
//! whole container into a fully resolved structure (no pool indices, branch
//! targets as plain instruction indices), and [`Dex::to_bytes`] assembles
//! that structure back into a container. The assembler writes placeholder
//! checksum/signature fields; [`finalize_header_digests`] computes the real
//! ones as a separate pass.
//!
//! ```no_run
//! use dexcodec::Dex;
//! use std::path::Path;
//!
//! let dex = Dex::from_file(Path::new("classes.dex")).unwrap();
//! println!("{} classes", dex.classes.len());
//! let mut bytes = dex.to_bytes().unwrap();
//! dexcodec::finalize_header_digests(&mut bytes).unwrap();
//! ```

#[macro_use]
mod error;

mod access;
mod annotations;
mod codec;
mod debug_info;
mod encoded_values;
mod formats;
mod ids;
mod instructions;
mod leb;
mod model;
mod offsets;
mod opcodes;
mod pools;
mod raw;
mod reader;
mod rw;
mod writer;

#[cfg(test)]
mod tests;

pub use access::AccessFlags;
pub use codec::{decode_instructions, encode_instructions, IndexResolver, RefResolver};
pub use error::DexError;
pub use formats::Format;
pub use ids::{FieldId, MethodId, ProtoId, StringId, TypeId, NO_INDEX};
pub use instructions::{
    AccessKind, BinaryOp, CompareKind, Instruction, InvokeKind, TestKind, UnaryOp,
};
pub use model::{
    Annotation, AnnotationValue, CatchHandler, Class, Code, DebugEvent, DebugInfo, Dex, Field,
    FieldRef, Method, MethodRef, Prototype, TrySpan, Value, Visibility,
};
pub use offsets::{
    absolute_to_relative, raw_to_relative, relative_to_absolute, relative_to_raw, CodeUnitOffset,
    InsnIndex, RelativeOffset,
};
pub use opcodes::{lookup_name, lookup_value, OpcodeDef, OPCODES};
pub use pools::Pools;
pub use writer::finalize_header_digests;
