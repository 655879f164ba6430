//! Container reader: fixed header, then each pool at its declared offset,
//! then class definitions, resolving every cross-reference eagerly so the
//! caller only ever sees the [`Dex`] model.
//!
//! String, type and prototype data is read indirectly (the ID tables hold
//! offsets into the data region); class data, code and debug info are read
//! lazily by offset, only when a class or method actually has them (offset
//! `0` means absent).

use crate::annotations::{AnnotationItem, AnnotationSetItem, AnnotationSetRefList, AnnotationsDirectoryItem};
use crate::codec::{decode_instructions, RefResolver};
use crate::debug_info::DebugInfoItem;
use crate::encoded_values::{read_encoded_array, EncodedValue};
use crate::error::DexError;
use crate::ids::{FieldId, MethodId, ProtoId, StringId, TypeId, NO_INDEX};
use crate::model::{
    Annotation, AnnotationValue, CatchHandler, Class, Code, DebugEvent, DebugInfo, Dex, Field,
    FieldRef, Method, MethodRef, Prototype, TrySpan, Value, Visibility,
};
use crate::offsets::{raw_to_relative, relative_to_absolute, AddressMap};
use crate::raw::{
    read_string_data, ClassDataItem, ClassDefItem, CodeItem, EncodedFieldEntry,
    EncodedMethodEntry, FieldIdItem, Header, MethodIdItem, ProtoIdItem, TypeList,
};
use crate::rw::read_u4;
use crate::access::AccessFlags;
use log::warn;
use std::collections::HashMap;

pub fn read_dex(bytes: &[u8]) -> Result<Dex, DexError> {
    let mut ix = 0;
    let header = Header::read(bytes, &mut ix)?;
    let tables = Tables::read(bytes, &header)?;

    let mut classes = Vec::with_capacity(header.class_defs_size as usize);
    ix = header.class_defs_off as usize;
    for i in 0..header.class_defs_size {
        let def = ClassDefItem::read(bytes, &mut ix)?;
        let class = read_class(bytes, &tables, &def)
            .map_err(|e| e.context(format!("while reading class_def #{}", i)))?;
        classes.push(class);
    }

    Ok(Dex { classes })
}

/// The five ID tables, resolved to concrete values up front. Implements the
/// codec's [`RefResolver`] so instruction operands resolve as they decode.
struct Tables {
    strings: Vec<String>,
    types: Vec<String>,
    protos: Vec<Prototype>,
    fields: Vec<FieldRef>,
    methods: Vec<MethodRef>,
}

impl Tables {
    fn read(bytes: &[u8], header: &Header) -> Result<Tables, DexError> {
        let mut strings = Vec::with_capacity(header.string_ids_size as usize);
        let mut ix = header.string_ids_off as usize;
        for _ in 0..header.string_ids_size {
            let mut data_off = read_u4(bytes, &mut ix)? as usize;
            strings.push(read_string_data(bytes, &mut data_off)?);
        }

        let mut types = Vec::with_capacity(header.type_ids_size as usize);
        ix = header.type_ids_off as usize;
        for _ in 0..header.type_ids_size {
            let string_idx = read_u4(bytes, &mut ix)? as usize;
            let descriptor = strings
                .get(string_idx)
                .ok_or_else(|| DexError::new(&format!("type_id string index {} out of bounds", string_idx)))?;
            types.push(descriptor.clone());
        }

        let mut protos = Vec::with_capacity(header.proto_ids_size as usize);
        ix = header.proto_ids_off as usize;
        for _ in 0..header.proto_ids_size {
            let item = ProtoIdItem::read(bytes, &mut ix)?;
            let return_type = lookup(&types, item.return_type_idx.index(), "proto return type")?;
            let parameters = if item.parameters_off == 0 {
                vec![]
            } else {
                let mut p = item.parameters_off as usize;
                TypeList::read(bytes, &mut p)?
                    .0
                    .iter()
                    .map(|t| lookup(&types, t.index(), "proto parameter"))
                    .collect::<Result<_, _>>()?
            };
            let proto = Prototype::new(return_type, parameters);
            let declared = lookup(&strings, item.shorty_idx.index(), "proto shorty")?;
            if declared != proto.shorty {
                warn!("proto shorty {:?} disagrees with derived {:?}", declared, proto.shorty);
            }
            protos.push(proto);
        }

        let mut fields = Vec::with_capacity(header.field_ids_size as usize);
        ix = header.field_ids_off as usize;
        for _ in 0..header.field_ids_size {
            let item = FieldIdItem::read(bytes, &mut ix)?;
            fields.push(FieldRef {
                class: lookup(&types, item.class_idx.index(), "field class")?,
                name: lookup(&strings, item.name_idx.index(), "field name")?,
                descriptor: lookup(&types, item.type_idx.index(), "field type")?,
            });
        }

        let mut methods = Vec::with_capacity(header.method_ids_size as usize);
        ix = header.method_ids_off as usize;
        for _ in 0..header.method_ids_size {
            let item = MethodIdItem::read(bytes, &mut ix)?;
            methods.push(MethodRef {
                class: lookup(&types, item.class_idx.index(), "method class")?,
                name: lookup(&strings, item.name_idx.index(), "method name")?,
                prototype: protos
                    .get(item.proto_idx.index())
                    .cloned()
                    .ok_or_else(|| DexError::new("method proto index out of bounds"))?,
            });
        }

        Ok(Tables { strings, types, protos, fields, methods })
    }

    fn string_at(&self, idx: usize) -> Result<String, DexError> {
        lookup(&self.strings, idx, "string")
    }

    fn type_at(&self, idx: usize) -> Result<String, DexError> {
        lookup(&self.types, idx, "type")
    }
}

fn lookup<T: Clone>(table: &[T], idx: usize, what: &str) -> Result<T, DexError> {
    table
        .get(idx)
        .cloned()
        .ok_or_else(|| DexError::new(&format!("{} index {} out of bounds ({} entries)", what, idx, table.len())))
}

impl RefResolver for Tables {
    fn string(&self, idx: StringId) -> Result<String, DexError> {
        self.string_at(idx.index())
    }

    fn type_desc(&self, idx: TypeId) -> Result<String, DexError> {
        self.type_at(idx.index())
    }

    fn field(&self, idx: FieldId) -> Result<FieldRef, DexError> {
        lookup(&self.fields, idx.index(), "field")
    }

    fn method(&self, idx: MethodId) -> Result<MethodRef, DexError> {
        lookup(&self.methods, idx.index(), "method")
    }

    fn proto(&self, idx: ProtoId) -> Result<Prototype, DexError> {
        lookup(&self.protos, idx.index(), "proto")
    }
}

fn read_class(bytes: &[u8], tables: &Tables, def: &ClassDefItem) -> Result<Class, DexError> {
    let descriptor = tables.type_at(def.class_idx.index())?;

    let superclass = if def.superclass_idx == NO_INDEX {
        None
    } else {
        Some(tables.type_at(def.superclass_idx as usize)?)
    };

    let interfaces = if def.interfaces_off == 0 {
        vec![]
    } else {
        let mut ix = def.interfaces_off as usize;
        TypeList::read(bytes, &mut ix)?
            .0
            .iter()
            .map(|t| tables.type_at(t.index()))
            .collect::<Result<_, _>>()?
    };

    let source_file = if def.source_file_idx == NO_INDEX {
        None
    } else {
        Some(tables.string_at(def.source_file_idx as usize)?)
    };

    let static_values = if def.static_values_off == 0 {
        vec![]
    } else {
        let mut ix = def.static_values_off as usize;
        read_encoded_array(bytes, &mut ix)?
            .iter()
            .map(|v| resolve_value(tables, v))
            .collect::<Result<_, _>>()?
    };

    let directory = if def.annotations_off == 0 {
        None
    } else {
        let mut ix = def.annotations_off as usize;
        Some(AnnotationsDirectoryItem::read(bytes, &mut ix)?)
    };

    let mut annotations = vec![];
    let mut field_annotations: HashMap<FieldId, Vec<Annotation>> = HashMap::new();
    let mut method_annotations: HashMap<MethodId, Vec<Annotation>> = HashMap::new();
    let mut parameter_annotations: HashMap<MethodId, Vec<Vec<Annotation>>> = HashMap::new();
    if let Some(dir) = &directory {
        if dir.class_annotations_off != 0 {
            annotations = read_annotation_set(bytes, tables, dir.class_annotations_off)?;
        }
        for fa in &dir.field_annotations {
            field_annotations
                .insert(fa.field_idx, read_annotation_set(bytes, tables, fa.annotations_off)?);
        }
        for ma in &dir.method_annotations {
            method_annotations
                .insert(ma.method_idx, read_annotation_set(bytes, tables, ma.annotations_off)?);
        }
        for pa in &dir.parameter_annotations {
            if pa.annotations_off == 0 {
                continue;
            }
            let mut ix = pa.annotations_off as usize;
            let ref_list = AnnotationSetRefList::read(bytes, &mut ix)?;
            let mut per_param = Vec::with_capacity(ref_list.list.len());
            for set_off in ref_list.list {
                if set_off == 0 {
                    per_param.push(vec![]);
                } else {
                    per_param.push(read_annotation_set(bytes, tables, set_off)?);
                }
            }
            parameter_annotations.insert(pa.method_idx, per_param);
        }
    }

    let class_data = if def.class_data_off == 0 {
        None
    } else {
        let mut ix = def.class_data_off as usize;
        Some(ClassDataItem::read(bytes, &mut ix)?)
    };

    let mut class = Class {
        descriptor,
        access_flags: AccessFlags::from_raw(def.access_flags),
        superclass,
        interfaces,
        source_file,
        annotations,
        static_values,
        static_fields: vec![],
        instance_fields: vec![],
        direct_methods: vec![],
        virtual_methods: vec![],
    };

    if let Some(data) = class_data {
        class.static_fields = data
            .static_fields
            .iter()
            .map(|f| resolve_field(tables, f, &mut field_annotations))
            .collect::<Result<_, _>>()?;
        class.instance_fields = data
            .instance_fields
            .iter()
            .map(|f| resolve_field(tables, f, &mut field_annotations))
            .collect::<Result<_, _>>()?;
        class.direct_methods = data
            .direct_methods
            .iter()
            .map(|m| resolve_method(bytes, tables, m, &mut method_annotations, &mut parameter_annotations))
            .collect::<Result<_, _>>()?;
        class.virtual_methods = data
            .virtual_methods
            .iter()
            .map(|m| resolve_method(bytes, tables, m, &mut method_annotations, &mut parameter_annotations))
            .collect::<Result<_, _>>()?;
    }

    Ok(class)
}

fn resolve_field(
    tables: &Tables,
    entry: &EncodedFieldEntry,
    annotations: &mut HashMap<FieldId, Vec<Annotation>>,
) -> Result<Field, DexError> {
    let field_ref = lookup(&tables.fields, entry.field_idx.index(), "field")?;
    Ok(Field {
        name: field_ref.name,
        descriptor: field_ref.descriptor,
        access_flags: AccessFlags::from_raw(entry.access_flags),
        annotations: annotations.remove(&entry.field_idx).unwrap_or_default(),
    })
}

fn resolve_method(
    bytes: &[u8],
    tables: &Tables,
    entry: &EncodedMethodEntry,
    annotations: &mut HashMap<MethodId, Vec<Annotation>>,
    parameter_annotations: &mut HashMap<MethodId, Vec<Vec<Annotation>>>,
) -> Result<Method, DexError> {
    let method_ref = lookup(&tables.methods, entry.method_idx.index(), "method")?;
    let code = if entry.code_off == 0 {
        None
    } else {
        let mut ix = entry.code_off as usize;
        let item = CodeItem::read(bytes, &mut ix)?;
        Some(resolve_code(bytes, tables, &item).map_err(|e| {
            e.context(format!("while decoding {}->{}", method_ref.class, method_ref.name))
        })?)
    };
    Ok(Method {
        name: method_ref.name,
        prototype: method_ref.prototype,
        access_flags: AccessFlags::from_raw(entry.access_flags),
        annotations: annotations.remove(&entry.method_idx).unwrap_or_default(),
        parameter_annotations: parameter_annotations.remove(&entry.method_idx).unwrap_or_default(),
        code,
    })
}

fn resolve_code(bytes: &[u8], tables: &Tables, item: &CodeItem) -> Result<Code, DexError> {
    let raw = decode_instructions(&item.insns, tables)?;
    let map = AddressMap::new(&raw);

    let mut tries = Vec::with_capacity(item.tries.len());
    for t in &item.tries {
        let handler_pos = item
            .handler_offsets
            .iter()
            .position(|&off| off == t.handler_off)
            .ok_or_else(|| DexError::new("try item points outside the handler list"))?;
        let handler = &item.handlers[handler_pos];

        let mut catches = Vec::with_capacity(handler.handlers.len());
        for pair in &handler.handlers {
            catches.push(CatchHandler {
                exception: tables.type_at(pair.type_idx.index())?,
                target: crate::offsets::InsnIndex(map.index_at(pair.addr as i64)?),
            });
        }
        let catch_all = match handler.catch_all_addr {
            Some(addr) => Some(crate::offsets::InsnIndex(map.index_at(addr as i64)?)),
            None => None,
        };

        tries.push(TrySpan {
            start: crate::offsets::InsnIndex(map.index_at(t.start_addr as i64)?),
            end: crate::offsets::InsnIndex(
                map.index_at_or_end(t.start_addr as i64 + t.insn_count as i64)?,
            ),
            catches,
            catch_all,
        });
    }

    let debug = if item.debug_info_off == 0 {
        None
    } else {
        let mut ix = item.debug_info_off as usize;
        Some(resolve_debug_info(tables, &DebugInfoItem::read(bytes, &mut ix)?)?)
    };

    let instructions = relative_to_absolute(raw_to_relative(raw)?)?;

    Ok(Code {
        registers: item.registers_size,
        ins: item.ins_size,
        outs: item.outs_size,
        debug,
        instructions,
        tries,
    })
}

fn resolve_debug_info(tables: &Tables, item: &DebugInfoItem) -> Result<DebugInfo, DexError> {
    use crate::debug_info::RawDebugEvent as Raw;

    let mut parameter_names = Vec::with_capacity(item.parameter_names.len());
    for name in &item.parameter_names {
        parameter_names.push(match name {
            Some(idx) => Some(tables.string_at(idx.index())?),
            None => None,
        });
    }

    let opt_string = |idx: &Option<StringId>| -> Result<Option<String>, DexError> {
        idx.map(|i| tables.string_at(i.index())).transpose()
    };
    let opt_type = |idx: &Option<TypeId>| -> Result<Option<String>, DexError> {
        idx.map(|i| tables.type_at(i.index())).transpose()
    };

    let mut events = Vec::with_capacity(item.events.len());
    for event in &item.events {
        events.push(match event {
            Raw::AdvancePc(d) => DebugEvent::AdvancePc(*d),
            Raw::AdvanceLine(d) => DebugEvent::AdvanceLine(*d),
            Raw::StartLocal { register, name, descriptor } => DebugEvent::StartLocal {
                register: *register,
                name: opt_string(name)?,
                descriptor: opt_type(descriptor)?,
            },
            Raw::StartLocalExtended { register, name, descriptor, signature } => {
                DebugEvent::StartLocalExtended {
                    register: *register,
                    name: opt_string(name)?,
                    descriptor: opt_type(descriptor)?,
                    signature: opt_string(signature)?,
                }
            }
            Raw::EndLocal(r) => DebugEvent::EndLocal(*r),
            Raw::RestartLocal(r) => DebugEvent::RestartLocal(*r),
            Raw::PrologueEnd => DebugEvent::PrologueEnd,
            Raw::EpilogueBegin => DebugEvent::EpilogueBegin,
            Raw::SetFile(name) => DebugEvent::SetFile(opt_string(name)?),
            Raw::Special(op) => DebugEvent::Special(*op),
        });
    }

    Ok(DebugInfo { line_start: item.line_start, parameter_names, events })
}

fn read_annotation_set(
    bytes: &[u8],
    tables: &Tables,
    off: u32,
) -> Result<Vec<Annotation>, DexError> {
    if off == 0 {
        return Ok(vec![]);
    }
    let mut ix = off as usize;
    let set = AnnotationSetItem::read(bytes, &mut ix)?;
    let mut items = Vec::with_capacity(set.entries.len());
    for entry_off in set.entries {
        if entry_off == 0 {
            continue;
        }
        let mut j = entry_off as usize;
        let item = AnnotationItem::read(bytes, &mut j)?;
        items.push(resolve_annotation_item(tables, &item)?);
    }
    Ok(items)
}

fn resolve_annotation_item(tables: &Tables, item: &AnnotationItem) -> Result<Annotation, DexError> {
    let visibility = match item.visibility {
        0x00 => Visibility::Build,
        0x01 => Visibility::Runtime,
        0x02 => Visibility::System,
        other => {
            warn!("unknown annotation visibility 0x{:02x}, treating as runtime", other);
            Visibility::Runtime
        }
    };
    resolve_annotation(tables, visibility, &item.annotation)
}

fn resolve_annotation(
    tables: &Tables,
    visibility: Visibility,
    annotation: &crate::encoded_values::EncodedAnnotation,
) -> Result<Annotation, DexError> {
    let descriptor = tables.type_at(annotation.type_idx.index())?;
    let mut elements = Vec::with_capacity(annotation.elements.len());
    for element in &annotation.elements {
        elements.push(AnnotationValue {
            name: tables.string_at(element.name_idx.index())?,
            value: resolve_value(tables, &element.value)?,
        });
    }
    Ok(Annotation { visibility, descriptor, elements })
}

fn resolve_value(tables: &Tables, value: &EncodedValue) -> Result<Value, DexError> {
    Ok(match value {
        EncodedValue::Byte(v) => Value::Byte(*v),
        EncodedValue::Short(v) => Value::Short(*v),
        EncodedValue::Char(v) => Value::Char(*v),
        EncodedValue::Int(v) => Value::Int(*v),
        EncodedValue::Long(v) => Value::Long(*v),
        EncodedValue::Float(v) => Value::Float(*v),
        EncodedValue::Double(v) => Value::Double(*v),
        EncodedValue::MethodType(idx) => Value::MethodType(lookup(&tables.protos, idx.index(), "proto")?),
        EncodedValue::MethodHandle(_) => {
            fail!("method-handle encoded values are not supported: no method-handle pool")
        }
        EncodedValue::String(idx) => Value::String(tables.string_at(idx.index())?),
        EncodedValue::Type(idx) => Value::Type(tables.type_at(idx.index())?),
        EncodedValue::Field(idx) => Value::Field(lookup(&tables.fields, idx.index(), "field")?),
        EncodedValue::Method(idx) => Value::Method(lookup(&tables.methods, idx.index(), "method")?),
        EncodedValue::Enum(idx) => Value::Enum(lookup(&tables.fields, idx.index(), "field")?),
        EncodedValue::Array(values) => Value::Array(
            values.iter().map(|v| resolve_value(tables, v)).collect::<Result<_, _>>()?,
        ),
        EncodedValue::Annotation(a) => {
            Value::Annotation(Box::new(resolve_annotation(tables, Visibility::Runtime, a)?))
        }
        EncodedValue::Null => Value::Null,
        EncodedValue::Boolean(b) => Value::Boolean(*b),
    })
}
