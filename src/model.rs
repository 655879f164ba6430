//! The public, fully resolved view of a container.
//!
//! Nothing in this module holds a pool index: every cross-reference has been
//! chased to its concrete value during reading, and is turned back into an
//! index during assembly. Instruction sequences live in the absolute tier
//! ([`InsnIndex`] branch targets), try ranges are instruction-index ranges.

use crate::access::AccessFlags;
use crate::error::DexError;
use crate::instructions::Instruction;
use crate::offsets::InsnIndex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

/// A whole container: just its classes, in file order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Dex {
    pub classes: Vec<Class>,
}

impl Dex {
    /// Decode a container from its bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Dex, DexError> {
        crate::reader::read_dex(bytes)
    }

    pub fn from_file(path: &Path) -> Result<Dex, DexError> {
        let bytes =
            fs::read(path).map_err(|e| DexError::new(&format!("io error: {}", e)))?;
        Dex::from_bytes(&bytes)
    }

    /// Encode the container. The header's checksum and signature fields are
    /// placeholders; run [`crate::finalize_header_digests`] on the result if
    /// a self-verifying file is needed.
    pub fn to_bytes(&self) -> Result<Vec<u8>, DexError> {
        crate::writer::write_dex(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Class {
    /// JNI descriptor, e.g. `Lcom/example/Foo;`
    pub descriptor: String,
    pub access_flags: AccessFlags,
    /// Absent only for `Ljava/lang/Object;` and friends.
    pub superclass: Option<String>,
    pub interfaces: Vec<String>,
    pub source_file: Option<String>,
    pub annotations: Vec<Annotation>,
    /// Initial values for a leading run of `static_fields`, in field order.
    pub static_values: Vec<Value>,
    pub static_fields: Vec<Field>,
    pub instance_fields: Vec<Field>,
    pub direct_methods: Vec<Method>,
    pub virtual_methods: Vec<Method>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub descriptor: String,
    pub access_flags: AccessFlags,
    pub annotations: Vec<Annotation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Method {
    pub name: String,
    pub prototype: Prototype,
    pub access_flags: AccessFlags,
    pub annotations: Vec<Annotation>,
    /// One entry per declared parameter; empty when nothing is annotated.
    pub parameter_annotations: Vec<Vec<Annotation>>,
    pub code: Option<Code>,
}

/// A method prototype: shorty, return type and parameter descriptors.
///
/// The shorty is derived from the signature at construction and kept so the
/// prototype pools on all three components, matching the on-disk record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Prototype {
    pub shorty: String,
    pub return_type: String,
    pub parameters: Vec<String>,
}

impl Prototype {
    pub fn new(return_type: impl Into<String>, parameters: Vec<String>) -> Prototype {
        let return_type = return_type.into();
        let mut shorty = String::with_capacity(parameters.len() + 1);
        shorty.push(shorty_char(&return_type));
        for p in &parameters {
            shorty.push(shorty_char(p));
        }
        Prototype { shorty, return_type, parameters }
    }

    /// `(II)V`-style descriptor, used in diagnostics.
    pub fn descriptor(&self) -> String {
        let mut s = String::from("(");
        for p in &self.parameters {
            s.push_str(p);
        }
        s.push(')');
        s.push_str(&self.return_type);
        s
    }
}

impl fmt::Display for Prototype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.descriptor())
    }
}

/// Shorty letter for a type descriptor: objects and arrays collapse to `L`.
fn shorty_char(descriptor: &str) -> char {
    match descriptor.chars().next() {
        Some('L') | Some('[') => 'L',
        Some(c) => c,
        None => 'V',
    }
}

/// A field reference: defining class, name and type descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldRef {
    pub class: String,
    pub name: String,
    pub descriptor: String,
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}:{}", self.class, self.name, self.descriptor)
    }
}

/// A method reference: defining class, name and prototype.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodRef {
    pub class: String,
    pub name: String,
    pub prototype: Prototype,
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}{}", self.class, self.name, self.prototype)
    }
}

/// A method body. Instructions are in the absolute tier; `tries` spans are
/// instruction-index ranges with instruction-index handler targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Code {
    pub registers: u16,
    pub ins: u16,
    pub outs: u16,
    pub debug: Option<DebugInfo>,
    pub instructions: Vec<Instruction<InsnIndex>>,
    pub tries: Vec<TrySpan>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrySpan {
    /// First covered instruction.
    pub start: InsnIndex,
    /// One past the last covered instruction.
    pub end: InsnIndex,
    /// Ordered typed handlers, tried first to last.
    pub catches: Vec<CatchHandler>,
    pub catch_all: Option<InsnIndex>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatchHandler {
    /// Exception type descriptor.
    pub exception: String,
    pub target: InsnIndex,
}

/// The line-number/local-variable program attached to a method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugInfo {
    pub line_start: u32,
    pub parameter_names: Vec<Option<String>>,
    pub events: Vec<DebugEvent>,
}

/// One event of the debug byte-code program. Addresses advance in code
/// units, the debug program's native coordinate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DebugEvent {
    AdvancePc(u32),
    AdvanceLine(i32),
    StartLocal {
        register: u16,
        name: Option<String>,
        descriptor: Option<String>,
    },
    StartLocalExtended {
        register: u16,
        name: Option<String>,
        descriptor: Option<String>,
        signature: Option<String>,
    },
    EndLocal(u16),
    RestartLocal(u16),
    PrologueEnd,
    EpilogueBegin,
    SetFile(Option<String>),
    /// A special opcode (0x0a..=0xff) advancing both line and pc.
    Special(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Visibility {
    Build,
    Runtime,
    System,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub visibility: Visibility,
    /// Annotation type descriptor.
    pub descriptor: String,
    pub elements: Vec<AnnotationValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationValue {
    pub name: String,
    pub value: Value,
}

/// A resolved encoded value, as found in static initializers and annotation
/// elements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Byte(i8),
    Short(i16),
    Char(u16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    Type(String),
    Field(FieldRef),
    Method(MethodRef),
    MethodType(Prototype),
    Enum(FieldRef),
    Array(Vec<Value>),
    Annotation(Box<Annotation>),
    Null,
    Boolean(bool),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shorty_derivation() {
        let p = Prototype::new("V", vec!["I".to_string(), "Ljava/lang/String;".to_string()]);
        assert_eq!(p.shorty, "VIL");
        assert_eq!(p.descriptor(), "(ILjava/lang/String;)V");

        let arrays = Prototype::new("[I", vec!["[Ljava/lang/Object;".to_string()]);
        assert_eq!(arrays.shorty, "LL");
    }

    #[test]
    fn reference_display() {
        let f = FieldRef {
            class: "Lcom/example/Foo;".to_string(),
            name: "bar".to_string(),
            descriptor: "I".to_string(),
        };
        assert_eq!(f.to_string(), "Lcom/example/Foo;->bar:I");

        let m = MethodRef {
            class: "Lcom/example/Foo;".to_string(),
            name: "baz".to_string(),
            prototype: Prototype::new("V", vec![]),
        };
        assert_eq!(m.to_string(), "Lcom/example/Foo;->baz()V");
    }
}
