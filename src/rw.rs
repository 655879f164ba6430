//! Little-endian cursor primitives the rest of the codec is built on.
//!
//! Readers take `(bytes, &mut ix)` and advance the cursor; writers append to
//! a byte vector and return the number of bytes written.

use crate::error::DexError;
use crate::leb::{
    decode_sleb128, decode_uleb128, decode_uleb128p1, encode_sleb128, encode_uleb128,
    encode_uleb128p1,
};

pub(crate) fn read_u1(bytes: &[u8], ix: &mut usize) -> Result<u8, DexError>
{
    if bytes.len() < *ix + 1
    {
        fail!("Unexpected end of stream reading u1 at index {}", *ix);
    }
    let result = bytes[*ix];
    *ix += 1;
    Ok(result)
}

pub(crate) fn read_u2(bytes: &[u8], ix: &mut usize) -> Result<u16, DexError>
{
    if bytes.len() < *ix + 2
    {
        fail!("Unexpected end of stream reading u2 at index {}", *ix);
    }
    let result = ((bytes[*ix + 1] as u16) << 8) | (bytes[*ix] as u16);
    *ix += 2;
    Ok(result)
}

pub(crate) fn read_u4(bytes: &[u8], ix: &mut usize) -> Result<u32, DexError>
{
    if bytes.len() < *ix + 4
    {
        fail!("Unexpected end of stream reading u4 at index {}", *ix);
    }
    let result = ((bytes[*ix + 3] as u32) << 24)
        | ((bytes[*ix + 2] as u32) << 16)
        | ((bytes[*ix + 1] as u32) << 8)
        | (bytes[*ix] as u32);
    *ix += 4;
    Ok(result)
}

pub(crate) fn read_uleb128(bytes: &[u8], ix: &mut usize) -> Result<u32, DexError>
{
    if *ix >= bytes.len()
    {
        fail!("Unexpected end of stream reading uleb128 at index {}", *ix);
    }
    let (val, size) = decode_uleb128(&bytes[*ix..]);
    *ix += size;
    Ok(val)
}

pub(crate) fn read_sleb128(bytes: &[u8], ix: &mut usize) -> Result<i32, DexError>
{
    if *ix >= bytes.len()
    {
        fail!("Unexpected end of stream reading sleb128 at index {}", *ix);
    }
    let (val, size) = decode_sleb128(&bytes[*ix..]);
    *ix += size;
    Ok(val)
}

pub(crate) fn read_uleb128p1(bytes: &[u8], ix: &mut usize) -> Result<i32, DexError>
{
    if *ix >= bytes.len()
    {
        fail!("Unexpected end of stream reading uleb128p1 at index {}", *ix);
    }
    let (val, size) = decode_uleb128p1(&bytes[*ix..]);
    *ix += size;
    Ok(val)
}

pub(crate) fn read_x(bytes: &[u8], ix: &mut usize, length: usize) -> Result<Vec<u8>, DexError>
{
    if bytes.len() - *ix >= length
    {
        let mut v = Vec::with_capacity(length + 1);
        v.extend_from_slice(&bytes[*ix..*ix + length]);
        *ix += length;
        Ok(v)
    }
    else
    {
        Err(DexError::new("buffer too short for array read"))
    }
}

pub(crate) fn write_u1(buffer: &mut Vec<u8>, val: u8) -> usize
{
    buffer.push(val);
    1
}

pub(crate) fn write_u2(buffer: &mut Vec<u8>, val: u16) -> usize
{
    buffer.push(val as u8);
    buffer.push((val >> 8) as u8);
    2
}

pub(crate) fn write_u4(buffer: &mut Vec<u8>, val: u32) -> usize
{
    for i in 0..4
    {
        buffer.push((val >> (i * 8)) as u8);
    }
    4
}

pub(crate) fn write_uleb128(buffer: &mut Vec<u8>, val: u32) -> usize
{
    let encoded = encode_uleb128(val);
    let c = encoded.len();
    buffer.extend(encoded);
    c
}

pub(crate) fn write_sleb128(buffer: &mut Vec<u8>, val: i32) -> usize
{
    let encoded = encode_sleb128(val);
    let c = encoded.len();
    buffer.extend(encoded);
    c
}

pub(crate) fn write_uleb128p1(buffer: &mut Vec<u8>, val: i32) -> usize
{
    let encoded = encode_uleb128p1(val);
    let c = encoded.len();
    buffer.extend(encoded);
    c
}

pub(crate) fn write_x(buffer: &mut Vec<u8>, val: &[u8]) -> usize
{
    let len = val.len();
    buffer.extend(val);
    len
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_width_roundtrip() {
        let mut buf = vec![];
        write_u1(&mut buf, 0xab);
        write_u2(&mut buf, 0x1234);
        write_u4(&mut buf, 0xdeadbeef);
        let mut ix = 0;
        assert_eq!(read_u1(&buf, &mut ix).unwrap(), 0xab);
        assert_eq!(read_u2(&buf, &mut ix).unwrap(), 0x1234);
        assert_eq!(read_u4(&buf, &mut ix).unwrap(), 0xdeadbeef);
        assert_eq!(ix, buf.len());
    }

    #[test]
    fn truncated_reads_fail() {
        let buf = [0x01u8];
        let mut ix = 0;
        assert!(read_u2(&buf, &mut ix).is_err());
        assert!(read_u4(&buf, &mut ix).is_err());
        assert!(read_x(&buf, &mut ix, 2).is_err());
    }
}
