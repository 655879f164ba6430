//! On-disk record layer: the fixed header, ID-table entries, class
//! definitions and the variable-length data-region items, each with a
//! cursor-based `read` and an appending `write`.
//!
//! Everything here still speaks pool indices and file offsets; resolution to
//! concrete values happens one layer up in the reader/writer.

use crate::error::DexError;
use crate::ids::{FieldId, MethodId, ProtoId, StringId, TypeId};
use crate::rw::{
    read_u1, read_u2, read_u4, read_uleb128, read_x, write_u2, write_u4, write_uleb128, write_x,
};
use crate::rw::{read_sleb128, write_sleb128, write_u1};
use cesu8::{from_java_cesu8, to_java_cesu8};

/* Constants */
pub const DEX_FILE_MAGIC: [u8; 8] = [0x64, 0x65, 0x78, 0x0a, 0x30, 0x33, 0x39, 0x00];
pub const ENDIAN_CONSTANT: u32 = 0x12345678;
pub const REVERSE_ENDIAN_CONSTANT: u32 = 0x78563412;
pub const HEADER_SIZE: u32 = 0x70;

/* map_list item type codes */
pub const TYPE_HEADER_ITEM: u16 = 0x0000;
pub const TYPE_STRING_ID_ITEM: u16 = 0x0001;
pub const TYPE_TYPE_ID_ITEM: u16 = 0x0002;
pub const TYPE_PROTO_ID_ITEM: u16 = 0x0003;
pub const TYPE_FIELD_ID_ITEM: u16 = 0x0004;
pub const TYPE_METHOD_ID_ITEM: u16 = 0x0005;
pub const TYPE_CLASS_DEF_ITEM: u16 = 0x0006;
pub const TYPE_MAP_LIST: u16 = 0x1000;
pub const TYPE_TYPE_LIST: u16 = 0x1001;
pub const TYPE_ANNOTATION_SET_REF_LIST: u16 = 0x1002;
pub const TYPE_ANNOTATION_SET_ITEM: u16 = 0x1003;
pub const TYPE_CODE_ITEM: u16 = 0x2001;
pub const TYPE_CLASS_DATA_ITEM: u16 = 0x2000;
pub const TYPE_STRING_DATA_ITEM: u16 = 0x2002;
pub const TYPE_DEBUG_INFO_ITEM: u16 = 0x2003;
pub const TYPE_ANNOTATION_ITEM: u16 = 0x2004;
pub const TYPE_ENCODED_ARRAY_ITEM: u16 = 0x2005;
pub const TYPE_ANNOTATIONS_DIRECTORY_ITEM: u16 = 0x2006;

#[derive(Debug, PartialEq, Eq)]
pub struct Header {
    pub magic: [u8; 8],
    pub checksum: u32,
    pub signature: [u8; 20],
    pub file_size: u32,
    pub header_size: u32,
    pub endian_tag: u32,
    pub link_size: u32,
    pub link_off: u32,
    pub map_off: u32,
    pub string_ids_size: u32,
    pub string_ids_off: u32,
    pub type_ids_size: u32,
    pub type_ids_off: u32,
    pub proto_ids_size: u32,
    pub proto_ids_off: u32,
    pub field_ids_size: u32,
    pub field_ids_off: u32,
    pub method_ids_size: u32,
    pub method_ids_off: u32,
    pub class_defs_size: u32,
    pub class_defs_off: u32,
    pub data_size: u32,
    pub data_off: u32,
}

impl Header {
    pub fn read(bytes: &[u8], ix: &mut usize) -> Result<Header, DexError> {
        if bytes.len() < HEADER_SIZE as usize {
            return Err(DexError::new("not enough bytes for header"));
        }

        let magic = <[u8; 8]>::try_from(read_x(bytes, ix, 8)?).unwrap();
        if magic[0..4] != DEX_FILE_MAGIC[0..4] {
            return Err(DexError::new("invalid magic value"));
        }
        if !(magic[4].is_ascii_digit() && magic[5].is_ascii_digit() && magic[6].is_ascii_digit())
            || magic[7] != 0
        {
            return Err(DexError::new("invalid version string in magic"));
        }

        let header = Header {
            magic,
            checksum: read_u4(bytes, ix)?,
            signature: <[u8; 20]>::try_from(read_x(bytes, ix, 20)?).unwrap(),
            file_size: read_u4(bytes, ix)?,
            header_size: read_u4(bytes, ix)?,
            endian_tag: read_u4(bytes, ix)?,
            link_size: read_u4(bytes, ix)?,
            link_off: read_u4(bytes, ix)?,
            map_off: read_u4(bytes, ix)?,
            string_ids_size: read_u4(bytes, ix)?,
            string_ids_off: read_u4(bytes, ix)?,
            type_ids_size: read_u4(bytes, ix)?,
            type_ids_off: read_u4(bytes, ix)?,
            proto_ids_size: read_u4(bytes, ix)?,
            proto_ids_off: read_u4(bytes, ix)?,
            field_ids_size: read_u4(bytes, ix)?,
            field_ids_off: read_u4(bytes, ix)?,
            method_ids_size: read_u4(bytes, ix)?,
            method_ids_off: read_u4(bytes, ix)?,
            class_defs_size: read_u4(bytes, ix)?,
            class_defs_off: read_u4(bytes, ix)?,
            data_size: read_u4(bytes, ix)?,
            data_off: read_u4(bytes, ix)?,
        };

        if header.endian_tag == REVERSE_ENDIAN_CONSTANT {
            return Err(DexError::new("big-endian containers are not supported"));
        }
        if header.endian_tag != ENDIAN_CONSTANT {
            fail!("invalid endian tag 0x{:08x}", header.endian_tag);
        }
        Ok(header)
    }

    pub fn write(&self, bytes: &mut Vec<u8>) -> usize {
        let mut c = 0;
        c += write_x(bytes, &self.magic);
        c += write_u4(bytes, self.checksum);
        c += write_x(bytes, &self.signature);
        c += write_u4(bytes, self.file_size);
        c += write_u4(bytes, self.header_size);
        c += write_u4(bytes, self.endian_tag);
        c += write_u4(bytes, self.link_size);
        c += write_u4(bytes, self.link_off);
        c += write_u4(bytes, self.map_off);
        c += write_u4(bytes, self.string_ids_size);
        c += write_u4(bytes, self.string_ids_off);
        c += write_u4(bytes, self.type_ids_size);
        c += write_u4(bytes, self.type_ids_off);
        c += write_u4(bytes, self.proto_ids_size);
        c += write_u4(bytes, self.proto_ids_off);
        c += write_u4(bytes, self.field_ids_size);
        c += write_u4(bytes, self.field_ids_off);
        c += write_u4(bytes, self.method_ids_size);
        c += write_u4(bytes, self.method_ids_off);
        c += write_u4(bytes, self.class_defs_size);
        c += write_u4(bytes, self.class_defs_off);
        c += write_u4(bytes, self.data_size);
        c += write_u4(bytes, self.data_off);
        c
    }
}

/// Read a string_data_item: uleb128 UTF-16 length, MUTF-8 bytes, NUL.
///
/// A payload that fails MUTF-8 decoding, or whose decoded UTF-16 length
/// disagrees with the declared one, is a format violation.
pub fn read_string_data(bytes: &[u8], ix: &mut usize) -> Result<String, DexError> {
    let utf16_size = read_uleb128(bytes, ix)?;
    let mut v = vec![];
    loop {
        let u = read_u1(bytes, ix)?;
        if u != 0 {
            v.push(u);
        } else {
            break;
        }
    }

    let decoded = from_java_cesu8(v.as_slice())
        .map_err(|_| DexError::new("string data is not valid MUTF-8"))?;
    let actual = decoded.encode_utf16().count() as u32;
    if actual != utf16_size {
        fail!(
            "string length mismatch: declared {} UTF-16 units, decoded {}",
            utf16_size, actual
        );
    }
    Ok(decoded.into_owned())
}

pub fn write_string_data(bytes: &mut Vec<u8>, s: &str) -> usize {
    let mut c = 0;
    c += write_uleb128(bytes, s.encode_utf16().count() as u32);
    c += write_x(bytes, &to_java_cesu8(s));
    c += write_u1(bytes, 0);
    c
}

/// type_list: u4 count then u2 type indices, 4-byte aligned on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeList(pub Vec<TypeId>);

impl TypeList {
    pub fn read(bytes: &[u8], ix: &mut usize) -> Result<TypeList, DexError> {
        let size = read_u4(bytes, ix)?;
        let mut v = Vec::with_capacity(size as usize);
        for _ in 0..size {
            v.push(TypeId(read_u2(bytes, ix)? as u32));
        }
        Ok(TypeList(v))
    }

    pub fn write(&self, bytes: &mut Vec<u8>) -> usize {
        let mut c = 0;
        c += write_u4(bytes, self.0.len() as u32);
        for i in &self.0 {
            c += write_u2(bytes, i.0 as u16);
        }
        c
    }
}

/// proto_id_item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtoIdItem {
    pub shorty_idx: StringId,
    pub return_type_idx: TypeId,
    pub parameters_off: u32,
}

impl ProtoIdItem {
    pub fn read(bytes: &[u8], ix: &mut usize) -> Result<ProtoIdItem, DexError> {
        Ok(ProtoIdItem {
            shorty_idx: StringId(read_u4(bytes, ix)?),
            return_type_idx: TypeId(read_u4(bytes, ix)?),
            parameters_off: read_u4(bytes, ix)?,
        })
    }
}

/// field_id_item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldIdItem {
    pub class_idx: TypeId,
    pub type_idx: TypeId,
    pub name_idx: StringId,
}

impl FieldIdItem {
    pub fn read(bytes: &[u8], ix: &mut usize) -> Result<FieldIdItem, DexError> {
        Ok(FieldIdItem {
            class_idx: TypeId(read_u2(bytes, ix)? as u32),
            type_idx: TypeId(read_u2(bytes, ix)? as u32),
            name_idx: StringId(read_u4(bytes, ix)?),
        })
    }

    pub fn write(&self, bytes: &mut Vec<u8>) -> usize {
        let mut c = 0;
        c += write_u2(bytes, self.class_idx.0 as u16);
        c += write_u2(bytes, self.type_idx.0 as u16);
        c += write_u4(bytes, self.name_idx.0);
        c
    }
}

/// method_id_item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodIdItem {
    pub class_idx: TypeId,
    pub proto_idx: ProtoId,
    pub name_idx: StringId,
}

impl MethodIdItem {
    pub fn read(bytes: &[u8], ix: &mut usize) -> Result<MethodIdItem, DexError> {
        Ok(MethodIdItem {
            class_idx: TypeId(read_u2(bytes, ix)? as u32),
            proto_idx: ProtoId(read_u2(bytes, ix)? as u32),
            name_idx: StringId(read_u4(bytes, ix)?),
        })
    }

    pub fn write(&self, bytes: &mut Vec<u8>) -> usize {
        let mut c = 0;
        c += write_u2(bytes, self.class_idx.0 as u16);
        c += write_u2(bytes, self.proto_idx.0 as u16);
        c += write_u4(bytes, self.name_idx.0);
        c
    }
}

/// class_def_item (read side; the assembler emits these field by field so it
/// can reserve the offset slots).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDefItem {
    pub class_idx: TypeId,
    pub access_flags: u32,
    pub superclass_idx: u32,
    pub interfaces_off: u32,
    pub source_file_idx: u32,
    pub annotations_off: u32,
    pub class_data_off: u32,
    pub static_values_off: u32,
}

impl ClassDefItem {
    pub fn read(bytes: &[u8], ix: &mut usize) -> Result<ClassDefItem, DexError> {
        Ok(ClassDefItem {
            class_idx: TypeId(read_u4(bytes, ix)?),
            access_flags: read_u4(bytes, ix)?,
            superclass_idx: read_u4(bytes, ix)?,
            interfaces_off: read_u4(bytes, ix)?,
            source_file_idx: read_u4(bytes, ix)?,
            annotations_off: read_u4(bytes, ix)?,
            class_data_off: read_u4(bytes, ix)?,
            static_values_off: read_u4(bytes, ix)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFieldEntry {
    pub field_idx: FieldId,
    pub access_flags: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedMethodEntry {
    pub method_idx: MethodId,
    pub access_flags: u32,
    pub code_off: u32,
}

/// class_data_item: four uleb128 counts, then delta-encoded member lists.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClassDataItem {
    pub static_fields: Vec<EncodedFieldEntry>,
    pub instance_fields: Vec<EncodedFieldEntry>,
    pub direct_methods: Vec<EncodedMethodEntry>,
    pub virtual_methods: Vec<EncodedMethodEntry>,
}

impl ClassDataItem {
    pub fn read(bytes: &[u8], ix: &mut usize) -> Result<ClassDataItem, DexError> {
        let static_field_size = read_uleb128(bytes, ix)?;
        let instance_field_size = read_uleb128(bytes, ix)?;
        let direct_method_size = read_uleb128(bytes, ix)?;
        let virtual_method_size = read_uleb128(bytes, ix)?;

        let read_fields = |bytes: &[u8], ix: &mut usize, n: u32| -> Result<Vec<EncodedFieldEntry>, DexError> {
            let mut v = Vec::with_capacity(n as usize);
            let mut idx = 0u32;
            for _ in 0..n {
                idx += read_uleb128(bytes, ix)?;
                v.push(EncodedFieldEntry {
                    field_idx: FieldId(idx),
                    access_flags: read_uleb128(bytes, ix)?,
                });
            }
            Ok(v)
        };
        let read_methods = |bytes: &[u8], ix: &mut usize, n: u32| -> Result<Vec<EncodedMethodEntry>, DexError> {
            let mut v = Vec::with_capacity(n as usize);
            let mut idx = 0u32;
            for _ in 0..n {
                idx += read_uleb128(bytes, ix)?;
                let access_flags = read_uleb128(bytes, ix)?;
                let code_off = read_uleb128(bytes, ix)?;
                v.push(EncodedMethodEntry { method_idx: MethodId(idx), access_flags, code_off });
            }
            Ok(v)
        };

        Ok(ClassDataItem {
            static_fields: read_fields(bytes, ix, static_field_size)?,
            instance_fields: read_fields(bytes, ix, instance_field_size)?,
            direct_methods: read_methods(bytes, ix, direct_method_size)?,
            virtual_methods: read_methods(bytes, ix, virtual_method_size)?,
        })
    }

    pub fn write(&self, bytes: &mut Vec<u8>) -> usize {
        let mut c = 0;
        c += write_uleb128(bytes, self.static_fields.len() as u32);
        c += write_uleb128(bytes, self.instance_fields.len() as u32);
        c += write_uleb128(bytes, self.direct_methods.len() as u32);
        c += write_uleb128(bytes, self.virtual_methods.len() as u32);

        for fields in [&self.static_fields, &self.instance_fields] {
            let mut last = 0u32;
            for f in fields.iter() {
                c += write_uleb128(bytes, f.field_idx.0 - last);
                last = f.field_idx.0;
                c += write_uleb128(bytes, f.access_flags);
            }
        }

        for methods in [&self.direct_methods, &self.virtual_methods] {
            let mut last = 0u32;
            for m in methods.iter() {
                c += write_uleb128(bytes, m.method_idx.0 - last);
                last = m.method_idx.0;
                c += write_uleb128(bytes, m.access_flags);
                c += write_uleb128(bytes, m.code_off);
            }
        }
        c
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TryItem {
    pub start_addr: u32,
    pub insn_count: u16,
    /// Byte offset into the encoded_catch_handler_list.
    pub handler_off: u16,
}

impl TryItem {
    pub fn read(bytes: &[u8], ix: &mut usize) -> Result<TryItem, DexError> {
        Ok(TryItem {
            start_addr: read_u4(bytes, ix)?,
            insn_count: read_u2(bytes, ix)?,
            handler_off: read_u2(bytes, ix)?,
        })
    }

    pub fn write(&self, bytes: &mut Vec<u8>) -> usize {
        let mut c = 0;
        c += write_u4(bytes, self.start_addr);
        c += write_u2(bytes, self.insn_count);
        c += write_u2(bytes, self.handler_off);
        c
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedTypeAddrPair {
    pub type_idx: TypeId,
    pub addr: u32,
}

impl EncodedTypeAddrPair {
    pub fn read(bytes: &[u8], ix: &mut usize) -> Result<EncodedTypeAddrPair, DexError> {
        let type_idx = TypeId(read_uleb128(bytes, ix)?);
        let addr = read_uleb128(bytes, ix)?;
        Ok(EncodedTypeAddrPair { type_idx, addr })
    }

    pub fn write(&self, bytes: &mut Vec<u8>) -> usize {
        let mut c = 0;
        c += write_uleb128(bytes, self.type_idx.0);
        c += write_uleb128(bytes, self.addr);
        c
    }
}

/// encoded_catch_handler: a negative leading count means a catch-all
/// address follows the typed pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedCatchHandler {
    pub handlers: Vec<EncodedTypeAddrPair>,
    pub catch_all_addr: Option<u32>,
}

impl EncodedCatchHandler {
    pub fn read(bytes: &[u8], ix: &mut usize) -> Result<EncodedCatchHandler, DexError> {
        let size = read_sleb128(bytes, ix)?;
        let count = size.unsigned_abs() as usize;
        let mut pairs = Vec::with_capacity(count);
        for _ in 0..count {
            pairs.push(EncodedTypeAddrPair::read(bytes, ix)?);
        }
        let catch_all_addr = if size <= 0 { Some(read_uleb128(bytes, ix)?) } else { None };
        Ok(EncodedCatchHandler { handlers: pairs, catch_all_addr })
    }

    pub fn write(&self, bytes: &mut Vec<u8>) -> usize {
        let mut c = 0;
        let size: i32 = if self.catch_all_addr.is_some() {
            -(self.handlers.len() as i32)
        } else {
            self.handlers.len() as i32
        };
        c += write_sleb128(bytes, size);
        for p in &self.handlers {
            c += p.write(bytes);
        }
        if let Some(addr) = self.catch_all_addr {
            c += write_uleb128(bytes, addr);
        }
        c
    }
}

/// code_item as read from disk. The assembler emits this shape field by
/// field so the debug-info offset can be reserved and patched later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeItem {
    pub registers_size: u16,
    pub ins_size: u16,
    pub outs_size: u16,
    pub debug_info_off: u32,
    pub insns: Vec<u16>,
    pub tries: Vec<TryItem>,
    pub handlers: Vec<EncodedCatchHandler>,
    /// Byte position of each catch handler relative to the start of the
    /// encoded_catch_handler_list, matching `TryItem::handler_off`.
    pub handler_offsets: Vec<u16>,
}

impl CodeItem {
    pub fn read(bytes: &[u8], ix: &mut usize) -> Result<CodeItem, DexError> {
        let registers_size = read_u2(bytes, ix)?;
        let ins_size = read_u2(bytes, ix)?;
        let outs_size = read_u2(bytes, ix)?;
        let tries_size = read_u2(bytes, ix)?;
        let debug_info_off = read_u4(bytes, ix)?;
        let insns_size = read_u4(bytes, ix)?;

        let mut insns = Vec::with_capacity(insns_size as usize);
        for _ in 0..insns_size {
            insns.push(read_u2(bytes, ix)?);
        }

        let mut tries = Vec::new();
        let mut handlers = Vec::new();
        let mut handler_offsets = Vec::new();
        if tries_size > 0 {
            if insns_size % 2 == 1 {
                let padding = read_u2(bytes, ix)?;
                if padding != 0 {
                    log::warn!("non-zero code item padding 0x{:04x}", padding);
                }
            }
            for _ in 0..tries_size {
                tries.push(TryItem::read(bytes, ix)?);
            }
            // handler_off values count from the start of the list, size
            // field included
            let handlers_base = *ix;
            let handlers_size = read_uleb128(bytes, ix)?;
            for _ in 0..handlers_size {
                let entry_off = *ix - handlers_base;
                handler_offsets.push(u16::try_from(entry_off).map_err(|_| {
                    DexError::new("encoded_catch_handler_list exceeds 64k bytes")
                })?);
                handlers.push(EncodedCatchHandler::read(bytes, ix)?);
            }
        }

        Ok(CodeItem {
            registers_size,
            ins_size,
            outs_size,
            debug_info_off,
            insns,
            tries,
            handlers,
            handler_offsets,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapItem {
    pub type_code: u16,
    pub size: u32,
    pub offset: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapList {
    pub items: Vec<MapItem>,
}

impl MapList {
    pub fn read(bytes: &[u8], ix: &mut usize) -> Result<MapList, DexError> {
        let size = read_u4(bytes, ix)?;
        let mut items = Vec::with_capacity(size as usize);
        for _ in 0..size {
            let type_code = read_u2(bytes, ix)?;
            let _unused = read_u2(bytes, ix)?;
            items.push(MapItem { type_code, size: read_u4(bytes, ix)?, offset: read_u4(bytes, ix)? });
        }
        Ok(MapList { items })
    }

    pub fn write(&self, bytes: &mut Vec<u8>) -> usize {
        let mut c = 0;
        c += write_u4(bytes, self.items.len() as u32);
        for item in &self.items {
            c += write_u2(bytes, item.type_code);
            c += write_u2(bytes, 0);
            c += write_u4(bytes, item.size);
            c += write_u4(bytes, item.offset);
        }
        c
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> Header {
        Header {
            magic: DEX_FILE_MAGIC,
            checksum: 0,
            signature: [0; 20],
            file_size: 0x1000,
            header_size: HEADER_SIZE,
            endian_tag: ENDIAN_CONSTANT,
            link_size: 0,
            link_off: 0,
            map_off: 0x0f00,
            string_ids_size: 4,
            string_ids_off: 0x70,
            type_ids_size: 2,
            type_ids_off: 0x80,
            proto_ids_size: 1,
            proto_ids_off: 0x88,
            field_ids_size: 0,
            field_ids_off: 0,
            method_ids_size: 1,
            method_ids_off: 0x94,
            class_defs_size: 1,
            class_defs_off: 0x9c,
            data_size: 0xf00,
            data_off: 0xbc,
        }
    }

    #[test]
    fn header_roundtrip() {
        let header = sample_header();
        let mut encoded = vec![];
        header.write(&mut encoded);
        assert_eq!(encoded.len(), HEADER_SIZE as usize);
        let mut ix = 0;
        let decoded = Header::read(&encoded, &mut ix).unwrap();
        assert_eq!(header, decoded);
    }

    #[test]
    fn header_rejects_bad_magic() {
        let mut encoded = vec![];
        sample_header().write(&mut encoded);
        encoded[0] = b'x';
        let mut ix = 0;
        assert!(Header::read(&encoded, &mut ix).is_err());
    }

    #[test]
    fn header_rejects_reverse_endian() {
        let mut header = sample_header();
        header.endian_tag = REVERSE_ENDIAN_CONSTANT;
        let mut encoded = vec![];
        header.write(&mut encoded);
        let mut ix = 0;
        let err = Header::read(&encoded, &mut ix).unwrap_err();
        assert!(err.to_string().contains("big-endian"));
    }

    #[test]
    fn string_data_roundtrip() {
        let cases = ["", "hello", "emoji \u{1F980} and nul-free", "日本語"];
        for s in cases {
            let mut buf = vec![];
            write_string_data(&mut buf, s);
            let mut ix = 0;
            assert_eq!(read_string_data(&buf, &mut ix).unwrap(), s);
            assert_eq!(ix, buf.len());
        }
    }

    #[test]
    fn string_data_length_mismatch_is_fatal() {
        let mut buf = vec![];
        write_string_data(&mut buf, "abc");
        buf[0] = 7; // declared length now lies
        let mut ix = 0;
        let err = read_string_data(&buf, &mut ix).unwrap_err();
        assert!(err.to_string().contains("length mismatch"));
    }

    #[test]
    fn supplementary_chars_count_utf16_units() {
        // U+1F980 encodes as a surrogate pair: 2 UTF-16 units
        let mut buf = vec![];
        write_string_data(&mut buf, "\u{1F980}");
        assert_eq!(buf[0], 2);
    }

    #[test]
    fn try_item_roundtrip() {
        let t = TryItem { start_addr: 0x12345678, insn_count: 0x0102, handler_off: 0x2030 };
        let mut bytes = vec![];
        let written = t.write(&mut bytes);
        assert_eq!(written, 8);
        let mut ix = 0;
        let t2 = TryItem::read(&bytes, &mut ix).expect("TryItem read failed");
        assert_eq!(ix, bytes.len());
        assert_eq!(t, t2);
    }

    #[test]
    fn encoded_catch_handler_roundtrip_no_catch_all() {
        let h = EncodedCatchHandler {
            handlers: vec![
                EncodedTypeAddrPair { type_idx: TypeId(3), addr: 0x0100 },
                EncodedTypeAddrPair { type_idx: TypeId(7), addr: 0x2222 },
            ],
            catch_all_addr: None,
        };
        let mut bytes = vec![];
        let _ = h.write(&mut bytes);
        let mut ix = 0;
        let h2 = EncodedCatchHandler::read(&bytes, &mut ix).expect("read failed");
        assert_eq!(ix, bytes.len());
        assert_eq!(h, h2);
    }

    #[test]
    fn encoded_catch_handler_roundtrip_with_catch_all() {
        let h = EncodedCatchHandler {
            handlers: vec![EncodedTypeAddrPair { type_idx: TypeId(42), addr: 0xABCD }],
            catch_all_addr: Some(0x1234),
        };
        let mut bytes = vec![];
        let _ = h.write(&mut bytes);

        // leading sleb128 must be negative when a catch-all is present
        let (size_signed, used) = crate::leb::decode_sleb128(&bytes);
        assert!(size_signed < 0);
        assert_eq!((-size_signed) as usize, h.handlers.len());
        assert!((1..=5).contains(&used));

        let mut ix = 0;
        let h2 = EncodedCatchHandler::read(&bytes, &mut ix).expect("read failed");
        assert_eq!(ix, bytes.len());
        assert_eq!(h, h2);
    }

    #[test]
    fn class_data_delta_encoding() {
        let item = ClassDataItem {
            static_fields: vec![
                EncodedFieldEntry { field_idx: FieldId(2), access_flags: 0x19 },
                EncodedFieldEntry { field_idx: FieldId(5), access_flags: 0x1a },
            ],
            instance_fields: vec![EncodedFieldEntry { field_idx: FieldId(0), access_flags: 0x2 }],
            direct_methods: vec![EncodedMethodEntry {
                method_idx: MethodId(1),
                access_flags: 0x10001,
                code_off: 0x200,
            }],
            virtual_methods: vec![
                EncodedMethodEntry { method_idx: MethodId(3), access_flags: 0x1, code_off: 0x300 },
                EncodedMethodEntry { method_idx: MethodId(9), access_flags: 0x1, code_off: 0 },
            ],
        };
        let mut bytes = vec![];
        item.write(&mut bytes);
        let mut ix = 0;
        let back = ClassDataItem::read(&bytes, &mut ix).expect("read class data");
        assert_eq!(ix, bytes.len());
        assert_eq!(item, back);
    }

    #[test]
    fn map_list_roundtrip() {
        let map = MapList {
            items: vec![
                MapItem { type_code: TYPE_HEADER_ITEM, size: 1, offset: 0 },
                MapItem { type_code: TYPE_STRING_ID_ITEM, size: 4, offset: 0x70 },
                MapItem { type_code: TYPE_MAP_LIST, size: 1, offset: 0x200 },
            ],
        };
        let mut bytes = vec![];
        map.write(&mut bytes);
        let mut ix = 0;
        let back = MapList::read(&bytes, &mut ix).unwrap();
        assert_eq!(map, back);
    }
}
