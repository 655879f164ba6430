//! Encoded values, arrays and annotations as they sit in the container.
//!
//! Numeric payloads use the minimal number of bytes that round-trips the
//! value: signed integers drop trailing sign-extension bytes, unsigned
//! indices drop trailing zero bytes, and floats/doubles are stored as their
//! high-order bytes with trailing zero bytes stripped. At least one byte is
//! always written, and the invariant holds in both directions.

use crate::error::DexError;
use crate::ids::{FieldId, MethodId, ProtoId, StringId, TypeId};
use crate::rw::{read_u1, read_uleb128, write_u1, write_uleb128, write_x};
use std::cmp::max;

#[derive(Debug, PartialEq, Clone)]
pub struct EncodedAnnotation {
    pub type_idx: TypeId,
    pub elements: Vec<AnnotationElement>,
}

impl EncodedAnnotation {
    pub fn read(bytes: &[u8], ix: &mut usize) -> Result<EncodedAnnotation, DexError> {
        let type_idx = TypeId(read_uleb128(bytes, ix)?);
        let size = read_uleb128(bytes, ix)? as usize;
        let mut elements = Vec::with_capacity(size);

        for _ in 0..size {
            elements.push(AnnotationElement::read(bytes, ix)?);
        }

        Ok(EncodedAnnotation { type_idx, elements })
    }

    pub fn write(&self, bytes: &mut Vec<u8>) -> usize {
        let mut c = 0;
        c += write_uleb128(bytes, self.type_idx.0);
        c += write_uleb128(bytes, self.elements.len() as u32);
        for element in &self.elements {
            c += element.write(bytes);
        }
        c
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct AnnotationElement {
    pub name_idx: StringId,
    pub value: EncodedValue,
}

impl AnnotationElement {
    pub fn read(bytes: &[u8], ix: &mut usize) -> Result<AnnotationElement, DexError> {
        let name_idx = StringId(read_uleb128(bytes, ix)?);
        let value = EncodedValue::read(bytes, ix)?;
        Ok(AnnotationElement { name_idx, value })
    }

    pub fn write(&self, bytes: &mut Vec<u8>) -> usize {
        let mut c = 0;
        c += write_uleb128(bytes, self.name_idx.0);
        c += self.value.write(bytes);
        c
    }
}

#[derive(Debug, PartialEq, Clone)]
pub enum EncodedValue {
    Byte(i8),
    Short(i16),
    Char(u16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    MethodType(ProtoId),
    MethodHandle(u32),
    String(StringId),
    Type(TypeId),
    Field(FieldId),
    Method(MethodId),
    Enum(FieldId),
    Array(Vec<EncodedValue>),
    Annotation(EncodedAnnotation),
    Null,
    Boolean(bool),
}

const VALUE_BYTE: u8 = 0x00;
const VALUE_SHORT: u8 = 0x02;
const VALUE_CHAR: u8 = 0x03;
const VALUE_INT: u8 = 0x04;
const VALUE_LONG: u8 = 0x06;
const VALUE_FLOAT: u8 = 0x10;
const VALUE_DOUBLE: u8 = 0x11;
const VALUE_METHOD_TYPE: u8 = 0x15;
const VALUE_METHOD_HANDLE: u8 = 0x16;
const VALUE_STRING: u8 = 0x17;
const VALUE_TYPE: u8 = 0x18;
const VALUE_FIELD: u8 = 0x19;
const VALUE_METHOD: u8 = 0x1a;
const VALUE_ENUM: u8 = 0x1b;
const VALUE_ARRAY: u8 = 0x1c;
const VALUE_ANNOTATION: u8 = 0x1d;
const VALUE_NULL: u8 = 0x1e;
const VALUE_BOOLEAN: u8 = 0x1f;

impl EncodedValue {
    pub fn read(bytes: &[u8], ix: &mut usize) -> Result<EncodedValue, DexError> {
        let header_byte = read_u1(bytes, ix)?;
        let value_arg = header_byte >> 5;
        let value_type = header_byte & 0x1F;
        let size = (value_arg + 1) as usize;

        let bounded = |limit: usize| -> Result<usize, DexError> {
            if size > limit {
                return Err(DexError::new(&format!(
                    "encoded value type 0x{:02x} has an oversized {}-byte payload",
                    value_type, size
                )));
            }
            Ok(size)
        };

        match value_type {
            VALUE_BYTE => Ok(EncodedValue::Byte(read_u1(bytes, ix)? as i8)),
            VALUE_SHORT => Ok(EncodedValue::Short(read_var_i64(bytes, ix, bounded(2)?)? as i16)),
            VALUE_CHAR => Ok(EncodedValue::Char(read_var_u64(bytes, ix, bounded(2)?)? as u16)),
            VALUE_INT => Ok(EncodedValue::Int(read_var_i64(bytes, ix, bounded(4)?)? as i32)),
            VALUE_LONG => Ok(EncodedValue::Long(read_var_i64(bytes, ix, size)?)),
            VALUE_FLOAT => {
                let size = bounded(4)?;
                let bits = (read_var_u64(bytes, ix, size)? as u32) << (8 * (4 - size));
                Ok(EncodedValue::Float(f32::from_bits(bits)))
            }
            VALUE_DOUBLE => {
                let bits = read_var_u64(bytes, ix, size)? << (8 * (8 - size));
                Ok(EncodedValue::Double(f64::from_bits(bits)))
            }
            VALUE_METHOD_TYPE => Ok(EncodedValue::MethodType(ProtoId(
                read_var_u64(bytes, ix, size)? as u32,
            ))),
            VALUE_METHOD_HANDLE => Ok(EncodedValue::MethodHandle(
                read_var_u64(bytes, ix, size)? as u32,
            )),
            VALUE_STRING => Ok(EncodedValue::String(StringId(
                read_var_u64(bytes, ix, size)? as u32,
            ))),
            VALUE_TYPE => Ok(EncodedValue::Type(TypeId(read_var_u64(bytes, ix, size)? as u32))),
            VALUE_FIELD => Ok(EncodedValue::Field(FieldId(
                read_var_u64(bytes, ix, size)? as u32,
            ))),
            VALUE_METHOD => Ok(EncodedValue::Method(MethodId(
                read_var_u64(bytes, ix, size)? as u32,
            ))),
            VALUE_ENUM => Ok(EncodedValue::Enum(FieldId(read_var_u64(bytes, ix, size)? as u32))),
            VALUE_ARRAY => Ok(EncodedValue::Array(read_encoded_array(bytes, ix)?)),
            VALUE_ANNOTATION => Ok(EncodedValue::Annotation(EncodedAnnotation::read(bytes, ix)?)),
            VALUE_NULL => Ok(EncodedValue::Null),
            VALUE_BOOLEAN => Ok(EncodedValue::Boolean(value_arg != 0)),
            other => Err(DexError::new(&format!("unknown encoded value type 0x{:02x}", other))),
        }
    }

    pub fn write(&self, bytes: &mut Vec<u8>) -> usize {
        let mut c = 0;

        match self {
            EncodedValue::Byte(val) => {
                c += write_u1(bytes, VALUE_BYTE);
                c += write_u1(bytes, *val as u8);
            }
            EncodedValue::Short(value) => {
                let size = byte_size_signed(*value as i64, 2);
                c += write_u1(bytes, ((size - 1) << 5) | VALUE_SHORT);
                c += write_x(bytes, &value.to_le_bytes()[..size as usize]);
            }
            EncodedValue::Char(value) => {
                let size = byte_size_unsigned(*value as u64);
                c += write_u1(bytes, ((size - 1) << 5) | VALUE_CHAR);
                c += write_x(bytes, &value.to_le_bytes()[..size as usize]);
            }
            EncodedValue::Int(value) => {
                let size = byte_size_signed(*value as i64, 4);
                c += write_u1(bytes, ((size - 1) << 5) | VALUE_INT);
                c += write_x(bytes, &value.to_le_bytes()[..size as usize]);
            }
            EncodedValue::Long(value) => {
                let size = byte_size_signed(*value, 8);
                c += write_u1(bytes, ((size - 1) << 5) | VALUE_LONG);
                c += write_x(bytes, &value.to_le_bytes()[..size as usize]);
            }
            EncodedValue::Float(value) => {
                let size = byte_size_right_zero(value.to_bits() as u64, 4);
                c += write_u1(bytes, ((size - 1) << 5) | VALUE_FLOAT);
                let all = value.to_bits().to_le_bytes();
                c += write_x(bytes, &all[4 - size as usize..]);
            }
            EncodedValue::Double(value) => {
                let size = byte_size_right_zero(value.to_bits(), 8);
                c += write_u1(bytes, ((size - 1) << 5) | VALUE_DOUBLE);
                let all = value.to_bits().to_le_bytes();
                c += write_x(bytes, &all[8 - size as usize..]);
            }
            EncodedValue::MethodType(value) => c += write_index(bytes, value.0, VALUE_METHOD_TYPE),
            EncodedValue::MethodHandle(value) => {
                c += write_index(bytes, *value, VALUE_METHOD_HANDLE)
            }
            EncodedValue::String(value) => c += write_index(bytes, value.0, VALUE_STRING),
            EncodedValue::Type(value) => c += write_index(bytes, value.0, VALUE_TYPE),
            EncodedValue::Field(value) => c += write_index(bytes, value.0, VALUE_FIELD),
            EncodedValue::Method(value) => c += write_index(bytes, value.0, VALUE_METHOD),
            EncodedValue::Enum(value) => c += write_index(bytes, value.0, VALUE_ENUM),
            EncodedValue::Array(value) => {
                c += write_u1(bytes, VALUE_ARRAY);
                c += write_encoded_array(value, bytes);
            }
            EncodedValue::Annotation(value) => {
                c += write_u1(bytes, VALUE_ANNOTATION);
                c += value.write(bytes);
            }
            EncodedValue::Null => c += write_u1(bytes, VALUE_NULL),
            EncodedValue::Boolean(val) => {
                let v = u8::from(*val);
                c += write_u1(bytes, VALUE_BOOLEAN | (v << 5));
            }
        }
        c
    }
}

fn write_index(bytes: &mut Vec<u8>, value: u32, value_type: u8) -> usize {
    let size = byte_size_unsigned(value as u64);
    let mut c = write_u1(bytes, ((size - 1) << 5) | value_type);
    c += write_x(bytes, &value.to_le_bytes()[..size as usize]);
    c
}

fn read_var_u64(bytes: &[u8], ix: &mut usize, size: usize) -> Result<u64, DexError> {
    if size > 8 {
        fail!("encoded value payload of {} bytes is too large", size);
    }
    let mut result = 0u64;
    for i in 0..size {
        result |= (read_u1(bytes, ix)? as u64) << (8 * i);
    }
    Ok(result)
}

fn read_var_i64(bytes: &[u8], ix: &mut usize, size: usize) -> Result<i64, DexError> {
    let raw = read_var_u64(bytes, ix, size)?;
    if size < 8 {
        let shift = 64 - 8 * size as u32;
        Ok(((raw << shift) as i64) >> shift)
    } else {
        Ok(raw as i64)
    }
}

/// Width of a signed value once trailing sign-extension bytes are stripped.
fn byte_size_signed(v: i64, width: u8) -> u8 {
    let bytes = v.to_le_bytes();
    let mut n = width;
    while n > 1 {
        let sign = if bytes[n as usize - 2] & 0x80 != 0 { 0xff } else { 0x00 };
        if bytes[n as usize - 1] == sign {
            n -= 1;
        } else {
            break;
        }
    }
    n
}

/// Width of an unsigned value once trailing zero bytes are stripped.
fn byte_size_unsigned(v: u64) -> u8 {
    max(1, 8 - (v.leading_zeros() / 8) as u8)
}

/// Width of a float/double bit pattern once its low-order zero bytes are
/// stripped; the stored bytes are the high-order ones.
fn byte_size_right_zero(bits: u64, width: u8) -> u8 {
    if bits == 0 {
        return 1;
    }
    let low_zero = (bits.trailing_zeros() / 8) as u8;
    max(1, width - low_zero)
}

pub fn write_encoded_array(encoded_array: &[EncodedValue], bytes: &mut Vec<u8>) -> usize {
    let mut c = 0;
    c += write_uleb128(bytes, encoded_array.len() as u32);
    for value in encoded_array {
        c += value.write(bytes);
    }
    c
}

pub fn read_encoded_array(bytes: &[u8], ix: &mut usize) -> Result<Vec<EncodedValue>, DexError> {
    let size = read_uleb128(bytes, ix)? as usize;
    let mut values = Vec::with_capacity(size);
    for _ in 0..size {
        values.push(EncodedValue::read(bytes, ix)?);
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload_len(v: &EncodedValue) -> usize {
        let mut bytes = vec![];
        v.write(&mut bytes);
        bytes.len() - 1
    }

    fn roundtrip(v: EncodedValue) {
        let mut bytes = vec![];
        v.write(&mut bytes);
        let mut ix = 0;
        let back = EncodedValue::read(&bytes, &mut ix).expect("read back");
        assert_eq!(ix, bytes.len());
        assert_eq!(v, back);
    }

    #[test]
    fn minimal_width_signed_ints() {
        assert_eq!(payload_len(&EncodedValue::Int(1)), 1);
        assert_eq!(payload_len(&EncodedValue::Int(-1)), 1);
        assert_eq!(payload_len(&EncodedValue::Int(256)), 2);
        assert_eq!(payload_len(&EncodedValue::Int(127)), 1);
        assert_eq!(payload_len(&EncodedValue::Int(128)), 2);
        assert_eq!(payload_len(&EncodedValue::Int(-128)), 1);
        assert_eq!(payload_len(&EncodedValue::Int(-129)), 2);
        assert_eq!(payload_len(&EncodedValue::Int(i32::MIN)), 4);
        assert_eq!(payload_len(&EncodedValue::Long(-1)), 1);
        assert_eq!(payload_len(&EncodedValue::Long(i64::MAX)), 8);
    }

    #[test]
    fn minimal_width_bytes_exact() {
        let mut bytes = vec![];
        EncodedValue::Int(1).write(&mut bytes);
        assert_eq!(bytes, vec![VALUE_INT, 0x01]);

        let mut bytes = vec![];
        EncodedValue::Int(-1).write(&mut bytes);
        assert_eq!(bytes, vec![VALUE_INT, 0xFF]);

        let mut bytes = vec![];
        EncodedValue::Int(256).write(&mut bytes);
        assert_eq!(bytes, vec![(1 << 5) | VALUE_INT, 0x00, 0x01]);
    }

    #[test]
    fn minimal_width_unsigned() {
        assert_eq!(payload_len(&EncodedValue::Char(0)), 1);
        assert_eq!(payload_len(&EncodedValue::Char(255)), 1);
        assert_eq!(payload_len(&EncodedValue::Char(256)), 2);
        assert_eq!(payload_len(&EncodedValue::String(StringId(0))), 1);
        assert_eq!(payload_len(&EncodedValue::String(StringId(0x1_0000))), 3);
    }

    #[test]
    fn floats_strip_low_zero_bytes() {
        // 1.0f32 = 0x3f800000: two low bytes are zero
        assert_eq!(payload_len(&EncodedValue::Float(1.0)), 2);
        assert_eq!(payload_len(&EncodedValue::Float(0.0)), 1);
        // 1.0f64 = 0x3ff0000000000000
        assert_eq!(payload_len(&EncodedValue::Double(1.0)), 2);
        roundtrip(EncodedValue::Float(314159.0));
        roundtrip(EncodedValue::Double(-2.5e-300));
    }

    #[test]
    fn scalar_roundtrips() {
        roundtrip(EncodedValue::Byte(-128));
        roundtrip(EncodedValue::Short(-32768));
        roundtrip(EncodedValue::Char(0xffff));
        roundtrip(EncodedValue::Int(i32::MIN));
        roundtrip(EncodedValue::Long(i64::MIN));
        roundtrip(EncodedValue::Null);
        roundtrip(EncodedValue::Boolean(true));
        roundtrip(EncodedValue::Boolean(false));
        roundtrip(EncodedValue::String(StringId(42)));
        roundtrip(EncodedValue::Enum(FieldId(7)));
    }

    #[test]
    fn randomized_roundtrips() {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        for _ in 0..200 {
            roundtrip(EncodedValue::Int(rng.gen::<i32>()));
            roundtrip(EncodedValue::Long(rng.gen::<i64>()));
            roundtrip(EncodedValue::Short(rng.gen::<i16>()));
            roundtrip(EncodedValue::Char(rng.gen::<u16>()));
            roundtrip(EncodedValue::Float(f32::from_bits(rng.gen::<u32>())));
            roundtrip(EncodedValue::Double(f64::from_bits(rng.gen::<u64>())));
        }
    }

    #[test]
    fn annotation_roundtrip() {
        let annotation = EncodedAnnotation {
            type_idx: TypeId(1),
            elements: vec![
                AnnotationElement { name_idx: StringId(2), value: EncodedValue::Boolean(true) },
                AnnotationElement { name_idx: StringId(3), value: EncodedValue::Int(42) },
                AnnotationElement {
                    name_idx: StringId(4),
                    value: EncodedValue::Array(vec![
                        EncodedValue::Type(TypeId(0)),
                        EncodedValue::Null,
                    ]),
                },
            ],
        };

        let mut bytes = vec![];
        annotation.write(&mut bytes);
        let mut ix = 0;
        let back = EncodedAnnotation::read(&bytes, &mut ix).expect("read annotation");
        assert_eq!(annotation, back);
        assert_eq!(ix, bytes.len());
    }
}
