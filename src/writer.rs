//! Container assembler.
//!
//! The file is produced front to back with a strictly increasing write
//! position, even though the format is full of backward references (the
//! header names the offset of every table, class defs name their data
//! items, code items name their debug info). Every such field is reserved
//! as a fixed-width slot through a [`PatchBuffer`] token and patched exactly
//! once when the referenced position becomes known. A token is consumed by
//! the patch, so patching twice does not compile, and `finish` refuses a
//! buffer with unpatched slots.
//!
//! The data region is written in a fixed pass order — string data, type
//! lists, encoded arrays, code items, class data, debug info, annotation
//! directories, set-ref lists, sets, items — and each pass both appends new
//! data and patches slots reserved by earlier passes. The trailing map then
//! lists every non-empty section sorted by offset.
//!
//! The header's checksum and signature are written as fixed placeholders
//! (zero); computing the real digests is deliberately left to the separate
//! [`finalize_header_digests`] pass.

use crate::codec::{encode_instructions, IndexResolver};
use crate::debug_info::{DebugInfoItem, RawDebugEvent};
use crate::encoded_values::{
    write_encoded_array, AnnotationElement, EncodedAnnotation, EncodedValue,
};
use crate::error::DexError;
use crate::ids::NO_INDEX;
use crate::model::{Annotation, Class, Code, DebugEvent, DebugInfo, Dex, Value, Visibility};
use crate::offsets::{absolute_to_relative, relative_to_raw_with_layout, LoweredLayout};
use crate::pools::Pools;
use crate::raw::{
    ClassDataItem, EncodedCatchHandler, EncodedFieldEntry, EncodedMethodEntry,
    EncodedTypeAddrPair, FieldIdItem, MapItem, MapList, MethodIdItem, TryItem, TypeList,
    write_string_data,
    DEX_FILE_MAGIC, ENDIAN_CONSTANT, HEADER_SIZE, TYPE_ANNOTATIONS_DIRECTORY_ITEM,
    TYPE_ANNOTATION_ITEM, TYPE_ANNOTATION_SET_ITEM, TYPE_ANNOTATION_SET_REF_LIST,
    TYPE_CLASS_DATA_ITEM, TYPE_CLASS_DEF_ITEM, TYPE_CODE_ITEM, TYPE_DEBUG_INFO_ITEM,
    TYPE_ENCODED_ARRAY_ITEM, TYPE_FIELD_ID_ITEM, TYPE_HEADER_ITEM, TYPE_MAP_LIST,
    TYPE_METHOD_ID_ITEM, TYPE_PROTO_ID_ITEM, TYPE_STRING_DATA_ITEM, TYPE_STRING_ID_ITEM,
    TYPE_TYPE_ID_ITEM, TYPE_TYPE_LIST,
};
use crate::rw::{write_u1, write_u2, write_u4, write_uleb128};
use adler::adler32_slice;
use sha1::{Digest, Sha1};

/// A reserved four-byte slot waiting for its value. Not `Clone`: patching
/// consumes the token, so a slot can be resolved exactly once.
#[derive(Debug)]
pub(crate) struct OffsetToken {
    slot: usize,
}

#[derive(Debug)]
struct Slot {
    position: usize,
    label: &'static str,
    patched: bool,
}

/// Append-only output buffer with reserve-now-patch-later support.
#[derive(Debug, Default)]
pub(crate) struct PatchBuffer {
    bytes: Vec<u8>,
    slots: Vec<Slot>,
}

impl PatchBuffer {
    fn new() -> PatchBuffer {
        PatchBuffer::default()
    }

    fn position(&self) -> u32 {
        self.bytes.len() as u32
    }

    fn raw_mut(&mut self) -> &mut Vec<u8> {
        &mut self.bytes
    }

    fn push_u1(&mut self, v: u8) {
        write_u1(&mut self.bytes, v);
    }

    fn push_u2(&mut self, v: u16) {
        write_u2(&mut self.bytes, v);
    }

    fn push_u4(&mut self, v: u32) {
        write_u4(&mut self.bytes, v);
    }

    fn push_bytes(&mut self, v: &[u8]) {
        self.bytes.extend_from_slice(v);
    }

    fn align4(&mut self) {
        while self.bytes.len() % 4 != 0 {
            self.bytes.push(0);
        }
    }

    fn reserve_u4(&mut self, label: &'static str) -> OffsetToken {
        let slot = self.slots.len();
        self.slots.push(Slot { position: self.bytes.len(), label, patched: false });
        self.bytes.extend_from_slice(&[0; 4]);
        OffsetToken { slot }
    }

    fn patch_u4(&mut self, token: OffsetToken, value: u32) {
        let slot = &mut self.slots[token.slot];
        debug_assert!(!slot.patched);
        slot.patched = true;
        self.bytes[slot.position..slot.position + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Patch with the current write position.
    fn patch_here(&mut self, token: OffsetToken) -> u32 {
        let pos = self.position();
        self.patch_u4(token, pos);
        pos
    }

    fn finish(self) -> Result<Vec<u8>, DexError> {
        if let Some(slot) = self.slots.iter().find(|s| !s.patched) {
            fail!(
                "deferred offset slot {:?} at byte {} was never patched",
                slot.label, slot.position
            );
        }
        Ok(self.bytes)
    }
}

/// Map bookkeeping: item count and first offset per section kind.
#[derive(Debug, Default, Clone, Copy)]
struct SectionStats {
    count: u32,
    first: Option<u32>,
}

impl SectionStats {
    fn note(&mut self, offset: u32) {
        self.count += 1;
        if self.first.is_none() {
            self.first = Some(offset);
        }
    }

    fn map_item(&self, type_code: u16) -> Option<MapItem> {
        self.first.map(|offset| MapItem { type_code, size: self.count, offset })
    }
}

struct ClassTokens {
    interfaces: Option<OffsetToken>,
    annotations: Option<OffsetToken>,
    class_data: Option<OffsetToken>,
    static_values: Option<OffsetToken>,
}

fn has_annotations(class: &Class) -> bool {
    !class.annotations.is_empty()
        || class
            .static_fields
            .iter()
            .chain(class.instance_fields.iter())
            .any(|f| !f.annotations.is_empty())
        || class
            .direct_methods
            .iter()
            .chain(class.virtual_methods.iter())
            .any(|m| !m.annotations.is_empty() || !m.parameter_annotations.is_empty())
}

fn has_class_data(class: &Class) -> bool {
    !class.static_fields.is_empty()
        || !class.instance_fields.is_empty()
        || !class.direct_methods.is_empty()
        || !class.virtual_methods.is_empty()
}

pub fn write_dex(dex: &Dex) -> Result<Vec<u8>, DexError> {
    let pools = Pools::scan(dex);
    let mut buf = PatchBuffer::new();

    /* ---- header ---- */
    buf.push_bytes(&DEX_FILE_MAGIC);
    buf.push_u4(0); // checksum placeholder, see finalize_header_digests
    buf.push_bytes(&[0u8; 20]); // signature placeholder
    let file_size_tok = buf.reserve_u4("file_size");
    buf.push_u4(HEADER_SIZE);
    buf.push_u4(ENDIAN_CONSTANT);
    buf.push_u4(0); // link_size
    buf.push_u4(0); // link_off
    let map_off_tok = buf.reserve_u4("map_off");

    let section = |buf: &mut PatchBuffer, count: usize, label: &'static str| {
        buf.push_u4(count as u32);
        if count > 0 { Some(buf.reserve_u4(label)) } else { buf.push_u4(0); None }
    };
    let string_ids_tok = section(&mut buf, pools.strings().len(), "string_ids_off");
    let type_ids_tok = section(&mut buf, pools.types().len(), "type_ids_off");
    let proto_ids_tok = section(&mut buf, pools.protos().len(), "proto_ids_off");
    let field_ids_tok = section(&mut buf, pools.fields().len(), "field_ids_off");
    let method_ids_tok = section(&mut buf, pools.methods().len(), "method_ids_off");
    let class_defs_tok = section(&mut buf, dex.classes.len(), "class_defs_off");
    let data_size_tok = buf.reserve_u4("data_size");
    let data_off_tok = buf.reserve_u4("data_off");
    debug_assert_eq!(buf.position(), HEADER_SIZE);

    /* ---- ID tables ---- */
    let string_ids_off = string_ids_tok.map(|t| buf.patch_here(t));
    let mut string_data_toks = Vec::with_capacity(pools.strings().len());
    for _ in pools.strings() {
        string_data_toks.push(buf.reserve_u4("string_data_off"));
    }

    let type_ids_off = type_ids_tok.map(|t| buf.patch_here(t));
    for descriptor in pools.types() {
        let idx = pools.string_index(descriptor)?;
        buf.push_u4(idx.0);
    }

    let proto_ids_off = proto_ids_tok.map(|t| buf.patch_here(t));
    let mut proto_param_toks = Vec::with_capacity(pools.protos().len());
    for proto in pools.protos() {
        buf.push_u4(pools.string_index(&proto.shorty)?.0);
        buf.push_u4(pools.type_index(&proto.return_type)?.0);
        if proto.parameters.is_empty() {
            buf.push_u4(0);
            proto_param_toks.push(None);
        } else {
            proto_param_toks.push(Some(buf.reserve_u4("proto_parameters_off")));
        }
    }

    let field_ids_off = field_ids_tok.map(|t| buf.patch_here(t));
    for field in pools.fields() {
        let item = FieldIdItem {
            class_idx: pools.type_index(&field.class)?,
            type_idx: pools.type_index(&field.descriptor)?,
            name_idx: pools.string_index(&field.name)?,
        };
        item.write(buf.raw_mut());
    }

    let method_ids_off = method_ids_tok.map(|t| buf.patch_here(t));
    for method in pools.methods() {
        let item = MethodIdItem {
            class_idx: pools.type_index(&method.class)?,
            proto_idx: pools.proto_index(&method.prototype)?,
            name_idx: pools.string_index(&method.name)?,
        };
        item.write(buf.raw_mut());
    }

    /* ---- class defs ---- */
    let class_defs_off = class_defs_tok.map(|t| buf.patch_here(t));
    let mut class_toks = Vec::with_capacity(dex.classes.len());
    for class in &dex.classes {
        buf.push_u4(pools.type_index(&class.descriptor)?.0);
        buf.push_u4(class.access_flags.raw());
        match &class.superclass {
            Some(s) => buf.push_u4(pools.type_index(s)?.0),
            None => buf.push_u4(NO_INDEX),
        }
        let interfaces = if class.interfaces.is_empty() {
            buf.push_u4(0);
            None
        } else {
            Some(buf.reserve_u4("interfaces_off"))
        };
        match &class.source_file {
            Some(s) => buf.push_u4(pools.string_index(s)?.0),
            None => buf.push_u4(NO_INDEX),
        }
        let annotations = if has_annotations(class) {
            Some(buf.reserve_u4("annotations_off"))
        } else {
            buf.push_u4(0);
            None
        };
        let class_data = if has_class_data(class) {
            Some(buf.reserve_u4("class_data_off"))
        } else {
            buf.push_u4(0);
            None
        };
        let static_values = if class.static_values.is_empty() {
            buf.push_u4(0);
            None
        } else {
            Some(buf.reserve_u4("static_values_off"))
        };
        class_toks.push(ClassTokens { interfaces, annotations, class_data, static_values });
    }

    /* ---- data region ---- */
    buf.align4();
    let data_off = buf.patch_here(data_off_tok);

    let mut string_data_stats = SectionStats::default();
    let mut type_list_stats = SectionStats::default();
    let mut encoded_array_stats = SectionStats::default();
    let mut code_stats = SectionStats::default();
    let mut class_data_stats = SectionStats::default();
    let mut debug_stats = SectionStats::default();
    let mut directory_stats = SectionStats::default();
    let mut set_ref_stats = SectionStats::default();
    let mut set_stats = SectionStats::default();
    let mut item_stats = SectionStats::default();

    // string data
    for (s, tok) in pools.strings().iter().zip(string_data_toks) {
        string_data_stats.note(buf.patch_here(tok));
        write_string_data(buf.raw_mut(), s);
    }

    // type lists: prototype parameter lists, then class interface lists
    for (proto, tok) in pools.protos().iter().zip(proto_param_toks) {
        let Some(tok) = tok else { continue };
        buf.align4();
        type_list_stats.note(buf.patch_here(tok));
        let ids = proto
            .parameters
            .iter()
            .map(|p| pools.type_index(p))
            .collect::<Result<Vec<_>, _>>()?;
        TypeList(ids).write(buf.raw_mut());
    }
    let mut interface_toks: Vec<Option<OffsetToken>> =
        class_toks.iter_mut().map(|t| t.interfaces.take()).collect();
    for (class, tok) in dex.classes.iter().zip(interface_toks.iter_mut()) {
        let Some(tok) = tok.take() else { continue };
        buf.align4();
        type_list_stats.note(buf.patch_here(tok));
        let ids = class
            .interfaces
            .iter()
            .map(|i| pools.type_index(i))
            .collect::<Result<Vec<_>, _>>()?;
        TypeList(ids).write(buf.raw_mut());
    }

    // encoded arrays (static values)
    for (class, toks) in dex.classes.iter().zip(class_toks.iter_mut()) {
        let Some(tok) = toks.static_values.take() else { continue };
        encoded_array_stats.note(buf.patch_here(tok));
        let values = class
            .static_values
            .iter()
            .map(|v| encode_value(&pools, v))
            .collect::<Result<Vec<_>, _>>()?;
        write_encoded_array(&values, buf.raw_mut());
    }

    // code items; debug-info offsets are reserved here and patched by the
    // debug pass below
    let mut code_offsets: Vec<Vec<u32>> = Vec::with_capacity(dex.classes.len());
    let mut pending_debug: Vec<(OffsetToken, &DebugInfo)> = Vec::new();
    for class in &dex.classes {
        let mut offsets = Vec::new();
        for method in class.direct_methods.iter().chain(class.virtual_methods.iter()) {
            match &method.code {
                None => offsets.push(0),
                Some(code) => {
                    buf.align4();
                    let off = buf.position();
                    code_stats.note(off);
                    let debug_tok = write_code_item(&mut buf, &pools, code).map_err(|e| {
                        e.context(format!("while assembling {}->{}", class.descriptor, method.name))
                    })?;
                    if let (Some(tok), Some(debug)) = (debug_tok, code.debug.as_ref()) {
                        pending_debug.push((tok, debug));
                    }
                    offsets.push(off);
                }
            }
        }
        code_offsets.push(offsets);
    }

    // class data
    for (ci, (class, toks)) in dex.classes.iter().zip(class_toks.iter_mut()).enumerate() {
        let Some(tok) = toks.class_data.take() else { continue };
        class_data_stats.note(buf.patch_here(tok));
        let item = build_class_data(&pools, class, &code_offsets[ci])?;
        item.write(buf.raw_mut());
    }

    // debug info
    for (tok, debug) in pending_debug {
        debug_stats.note(buf.patch_here(tok));
        let item = encode_debug_info(&pools, debug)?;
        item.write(buf.raw_mut());
    }

    // annotation directories, then set-ref lists, then sets, then items;
    // every pass patches slots the previous one reserved
    let mut set_jobs: Vec<(OffsetToken, &[Annotation])> = Vec::new();
    let mut ref_list_jobs: Vec<(OffsetToken, &Vec<Vec<Annotation>>)> = Vec::new();
    for (class, toks) in dex.classes.iter().zip(class_toks.iter_mut()) {
        let Some(tok) = toks.annotations.take() else { continue };
        buf.align4();
        directory_stats.note(buf.patch_here(tok));

        if class.annotations.is_empty() {
            buf.push_u4(0);
        } else {
            set_jobs.push((buf.reserve_u4("class_annotations_off"), &class.annotations));
        }

        let mut annotated_fields = Vec::new();
        for field in class.static_fields.iter().chain(class.instance_fields.iter()) {
            if field.annotations.is_empty() {
                continue;
            }
            let field_ref = crate::model::FieldRef {
                class: class.descriptor.clone(),
                name: field.name.clone(),
                descriptor: field.descriptor.clone(),
            };
            annotated_fields.push((pools.field_index(&field_ref)?, &field.annotations));
        }
        annotated_fields.sort_by_key(|(idx, _)| *idx);

        let mut annotated_methods = Vec::new();
        let mut annotated_parameters = Vec::new();
        for method in class.direct_methods.iter().chain(class.virtual_methods.iter()) {
            let method_ref = crate::model::MethodRef {
                class: class.descriptor.clone(),
                name: method.name.clone(),
                prototype: method.prototype.clone(),
            };
            let idx = pools.method_index(&method_ref)?;
            if !method.annotations.is_empty() {
                annotated_methods.push((idx, &method.annotations));
            }
            if !method.parameter_annotations.is_empty() {
                annotated_parameters.push((idx, &method.parameter_annotations));
            }
        }
        annotated_methods.sort_by_key(|(idx, _)| *idx);
        annotated_parameters.sort_by_key(|(idx, _)| *idx);

        buf.push_u4(annotated_fields.len() as u32);
        buf.push_u4(annotated_methods.len() as u32);
        buf.push_u4(annotated_parameters.len() as u32);
        for (idx, annotations) in annotated_fields {
            buf.push_u4(idx.0);
            set_jobs.push((buf.reserve_u4("field_annotations_off"), annotations));
        }
        for (idx, annotations) in annotated_methods {
            buf.push_u4(idx.0);
            set_jobs.push((buf.reserve_u4("method_annotations_off"), annotations));
        }
        for (idx, per_param) in annotated_parameters {
            buf.push_u4(idx.0);
            ref_list_jobs.push((buf.reserve_u4("parameter_annotations_off"), per_param));
        }
    }

    for (tok, per_param) in ref_list_jobs {
        buf.align4();
        set_ref_stats.note(buf.patch_here(tok));
        buf.push_u4(per_param.len() as u32);
        for annotations in per_param {
            if annotations.is_empty() {
                buf.push_u4(0);
            } else {
                set_jobs.push((buf.reserve_u4("parameter_set_off"), annotations));
            }
        }
    }

    let mut item_jobs: Vec<(OffsetToken, &Annotation)> = Vec::new();
    for (tok, annotations) in set_jobs {
        buf.align4();
        set_stats.note(buf.patch_here(tok));
        buf.push_u4(annotations.len() as u32);
        for annotation in annotations {
            item_jobs.push((buf.reserve_u4("annotation_item_off"), annotation));
        }
    }

    for (tok, annotation) in item_jobs {
        item_stats.note(buf.patch_here(tok));
        let visibility = match annotation.visibility {
            Visibility::Build => 0x00,
            Visibility::Runtime => 0x01,
            Visibility::System => 0x02,
        };
        buf.push_u1(visibility);
        encode_annotation(&pools, annotation)?.write(buf.raw_mut());
    }

    /* ---- map ---- */
    buf.align4();
    let map_off = buf.patch_here(map_off_tok);

    let mut rest = Vec::new();
    let mut id_section = |type_code: u16, count: usize, offset: Option<u32>| {
        if let Some(offset) = offset {
            rest.push(MapItem { type_code, size: count as u32, offset });
        }
    };
    id_section(TYPE_STRING_ID_ITEM, pools.strings().len(), string_ids_off);
    id_section(TYPE_TYPE_ID_ITEM, pools.types().len(), type_ids_off);
    id_section(TYPE_PROTO_ID_ITEM, pools.protos().len(), proto_ids_off);
    id_section(TYPE_FIELD_ID_ITEM, pools.fields().len(), field_ids_off);
    id_section(TYPE_METHOD_ID_ITEM, pools.methods().len(), method_ids_off);
    id_section(TYPE_CLASS_DEF_ITEM, dex.classes.len(), class_defs_off);
    for (stats, type_code) in [
        (string_data_stats, TYPE_STRING_DATA_ITEM),
        (type_list_stats, TYPE_TYPE_LIST),
        (encoded_array_stats, TYPE_ENCODED_ARRAY_ITEM),
        (code_stats, TYPE_CODE_ITEM),
        (class_data_stats, TYPE_CLASS_DATA_ITEM),
        (debug_stats, TYPE_DEBUG_INFO_ITEM),
        (directory_stats, TYPE_ANNOTATIONS_DIRECTORY_ITEM),
        (set_ref_stats, TYPE_ANNOTATION_SET_REF_LIST),
        (set_stats, TYPE_ANNOTATION_SET_ITEM),
        (item_stats, TYPE_ANNOTATION_ITEM),
    ] {
        if let Some(item) = stats.map_item(type_code) {
            rest.push(item);
        }
    }
    rest.push(MapItem { type_code: TYPE_MAP_LIST, size: 1, offset: map_off });
    rest.sort_by_key(|item| item.offset);

    let mut items = vec![MapItem { type_code: TYPE_HEADER_ITEM, size: 1, offset: 0 }];
    items.extend(rest);
    MapList { items }.write(buf.raw_mut());

    let file_size = buf.position();
    buf.patch_u4(file_size_tok, file_size);
    buf.patch_u4(data_size_tok, file_size - data_off);

    buf.finish()
}

/// Emit one code_item; returns the debug-info offset token when the method
/// carries debug info.
fn write_code_item(
    buf: &mut PatchBuffer,
    pools: &Pools,
    code: &Code,
) -> Result<Option<OffsetToken>, DexError> {
    let rel = absolute_to_relative(code.instructions.clone())?;
    let (raw, layout) = relative_to_raw_with_layout(rel)?;
    let insns = encode_instructions(&raw, pools)?;

    buf.push_u2(code.registers);
    buf.push_u2(code.ins);
    buf.push_u2(code.outs);
    let tries_count = u16::try_from(code.tries.len())
        .map_err(|_| DexError::new("too many try items"))?;
    buf.push_u2(tries_count);
    let debug_tok = if code.debug.is_some() {
        Some(buf.reserve_u4("debug_info_off"))
    } else {
        buf.push_u4(0);
        None
    };
    buf.push_u4(insns.len() as u32);
    for cu in &insns {
        buf.push_u2(*cu);
    }

    if !code.tries.is_empty() {
        if insns.len() % 2 == 1 {
            buf.push_u2(0);
        }

        // serialize the handler list first so the try items know their
        // handler_off values (measured from the start of the list)
        let mut handler_bytes = Vec::new();
        let mut handler_offs = Vec::with_capacity(code.tries.len());
        write_uleb128(&mut handler_bytes, code.tries.len() as u32);
        for try_span in &code.tries {
            handler_offs.push(handler_bytes.len());
            let handler = EncodedCatchHandler {
                handlers: try_span
                    .catches
                    .iter()
                    .map(|c| {
                        Ok(EncodedTypeAddrPair {
                            type_idx: pools.type_index(&c.exception)?,
                            addr: layout.position_of(c.target.0),
                        })
                    })
                    .collect::<Result<Vec<_>, DexError>>()?,
                catch_all_addr: try_span.catch_all.map(|t| layout.position_of(t.0)),
            };
            handler.write(&mut handler_bytes);
        }

        for (try_span, handler_off) in code.tries.iter().zip(handler_offs) {
            let item = try_item(try_span, &layout, handler_off)?;
            item.write(buf.raw_mut());
        }
        buf.push_bytes(&handler_bytes);
    }

    Ok(debug_tok)
}

fn try_item(
    try_span: &crate::model::TrySpan,
    layout: &LoweredLayout,
    handler_off: usize,
) -> Result<TryItem, DexError> {
    let start_addr = layout.position_of(try_span.start.0);
    let end_addr = layout.boundary_of(try_span.end.0);
    if end_addr < start_addr {
        fail!("try range ends before it starts");
    }
    Ok(TryItem {
        start_addr,
        insn_count: u16::try_from(end_addr - start_addr)
            .map_err(|_| DexError::new("try range spans more than 64k code units"))?,
        handler_off: u16::try_from(handler_off)
            .map_err(|_| DexError::new("encoded_catch_handler_list exceeds 64k bytes"))?,
    })
}

fn build_class_data(
    pools: &Pools,
    class: &Class,
    code_offsets: &[u32],
) -> Result<ClassDataItem, DexError> {
    let field_entries = |fields: &[crate::model::Field]| -> Result<Vec<EncodedFieldEntry>, DexError> {
        let mut entries = fields
            .iter()
            .map(|f| {
                Ok(EncodedFieldEntry {
                    field_idx: pools.field_index(&crate::model::FieldRef {
                        class: class.descriptor.clone(),
                        name: f.name.clone(),
                        descriptor: f.descriptor.clone(),
                    })?,
                    access_flags: f.access_flags.raw(),
                })
            })
            .collect::<Result<Vec<_>, DexError>>()?;
        // class_data lists are delta-encoded, so indices must ascend
        entries.sort_by_key(|e| e.field_idx);
        Ok(entries)
    };

    let method_entries = |methods: &[crate::model::Method],
                          offsets: &[u32]|
     -> Result<Vec<EncodedMethodEntry>, DexError> {
        let mut entries = methods
            .iter()
            .zip(offsets)
            .map(|(m, &code_off)| {
                Ok(EncodedMethodEntry {
                    method_idx: pools.method_index(&crate::model::MethodRef {
                        class: class.descriptor.clone(),
                        name: m.name.clone(),
                        prototype: m.prototype.clone(),
                    })?,
                    access_flags: m.access_flags.raw(),
                    code_off,
                })
            })
            .collect::<Result<Vec<_>, DexError>>()?;
        entries.sort_by_key(|e| e.method_idx);
        Ok(entries)
    };

    let direct_count = class.direct_methods.len();
    Ok(ClassDataItem {
        static_fields: field_entries(&class.static_fields)?,
        instance_fields: field_entries(&class.instance_fields)?,
        direct_methods: method_entries(&class.direct_methods, &code_offsets[..direct_count])?,
        virtual_methods: method_entries(&class.virtual_methods, &code_offsets[direct_count..])?,
    })
}

fn encode_value(pools: &Pools, value: &Value) -> Result<EncodedValue, DexError> {
    Ok(match value {
        Value::Byte(v) => EncodedValue::Byte(*v),
        Value::Short(v) => EncodedValue::Short(*v),
        Value::Char(v) => EncodedValue::Char(*v),
        Value::Int(v) => EncodedValue::Int(*v),
        Value::Long(v) => EncodedValue::Long(*v),
        Value::Float(v) => EncodedValue::Float(*v),
        Value::Double(v) => EncodedValue::Double(*v),
        Value::String(s) => EncodedValue::String(pools.string_index(s)?),
        Value::Type(d) => EncodedValue::Type(pools.type_index(d)?),
        Value::Field(f) => EncodedValue::Field(pools.field_index(f)?),
        Value::Method(m) => EncodedValue::Method(pools.method_index(m)?),
        Value::MethodType(p) => EncodedValue::MethodType(pools.proto_index(p)?),
        Value::Enum(f) => EncodedValue::Enum(pools.field_index(f)?),
        Value::Array(values) => EncodedValue::Array(
            values.iter().map(|v| encode_value(pools, v)).collect::<Result<_, _>>()?,
        ),
        Value::Annotation(a) => EncodedValue::Annotation(encode_annotation(pools, a)?),
        Value::Null => EncodedValue::Null,
        Value::Boolean(b) => EncodedValue::Boolean(*b),
    })
}

fn encode_annotation(pools: &Pools, annotation: &Annotation) -> Result<EncodedAnnotation, DexError> {
    Ok(EncodedAnnotation {
        type_idx: pools.type_index(&annotation.descriptor)?,
        elements: annotation
            .elements
            .iter()
            .map(|e| {
                Ok(AnnotationElement {
                    name_idx: pools.string_index(&e.name)?,
                    value: encode_value(pools, &e.value)?,
                })
            })
            .collect::<Result<Vec<_>, DexError>>()?,
    })
}

fn encode_debug_info(pools: &Pools, debug: &DebugInfo) -> Result<DebugInfoItem, DexError> {
    let parameter_names = debug
        .parameter_names
        .iter()
        .map(|name| name.as_deref().map(|n| pools.string_index(n)).transpose())
        .collect::<Result<Vec<_>, DexError>>()?;

    let events = debug
        .events
        .iter()
        .map(|event| {
            Ok(match event {
                DebugEvent::AdvancePc(d) => RawDebugEvent::AdvancePc(*d),
                DebugEvent::AdvanceLine(d) => RawDebugEvent::AdvanceLine(*d),
                DebugEvent::StartLocal { register, name, descriptor } => {
                    RawDebugEvent::StartLocal {
                        register: *register,
                        name: name.as_deref().map(|n| pools.string_index(n)).transpose()?,
                        descriptor: descriptor
                            .as_deref()
                            .map(|d| pools.type_index(d))
                            .transpose()?,
                    }
                }
                DebugEvent::StartLocalExtended { register, name, descriptor, signature } => {
                    RawDebugEvent::StartLocalExtended {
                        register: *register,
                        name: name.as_deref().map(|n| pools.string_index(n)).transpose()?,
                        descriptor: descriptor
                            .as_deref()
                            .map(|d| pools.type_index(d))
                            .transpose()?,
                        signature: signature
                            .as_deref()
                            .map(|s| pools.string_index(s))
                            .transpose()?,
                    }
                }
                DebugEvent::EndLocal(r) => RawDebugEvent::EndLocal(*r),
                DebugEvent::RestartLocal(r) => RawDebugEvent::RestartLocal(*r),
                DebugEvent::PrologueEnd => RawDebugEvent::PrologueEnd,
                DebugEvent::EpilogueBegin => RawDebugEvent::EpilogueBegin,
                DebugEvent::SetFile(name) => RawDebugEvent::SetFile(
                    name.as_deref().map(|n| pools.string_index(n)).transpose()?,
                ),
                DebugEvent::Special(op) => RawDebugEvent::Special(*op),
            })
        })
        .collect::<Result<Vec<_>, DexError>>()?;

    Ok(DebugInfoItem { line_start: debug.line_start, parameter_names, events })
}

/// Compute the real header digests over an assembled file: the SHA-1
/// signature covers everything after itself, the Adler-32 checksum covers
/// everything after itself including the signature. The assembler leaves
/// both as zero placeholders; run this when a self-verifying file is needed.
pub fn finalize_header_digests(bytes: &mut [u8]) -> Result<(), DexError> {
    if bytes.len() < HEADER_SIZE as usize {
        fail!("buffer of {} bytes is too small to be a container", bytes.len());
    }
    let mut hasher = Sha1::new();
    hasher.update(&bytes[32..]);
    let digest = hasher.finalize();
    bytes[12..32].copy_from_slice(&digest);

    let checksum = adler32_slice(&bytes[12..]);
    bytes[8..12].copy_from_slice(&checksum.to_le_bytes());
    Ok(())
}
