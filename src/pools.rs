//! The five constant pools, built by one scan over a [`Dex`].
//!
//! Each pool is a bijection between a domain value and a dense index,
//! assigned in first-discovery order of a deterministic walk (classes in
//! input order; within a class its descriptor, hierarchy, members,
//! annotations, instruction operands, try types and debug strings, in that
//! order). Membership is deduplicated by structural equality.
//!
//! The `*_index` getters refuse values that were never scanned: a miss there
//! means the assembler walked something the scanner did not, which is a bug,
//! not bad input.

use crate::codec::IndexResolver;
use crate::error::DexError;
use crate::ids::{FieldId, MethodId, ProtoId, StringId, TypeId};
use crate::instructions::Instruction;
use crate::model::{
    Annotation, Code, Dex, DebugEvent, FieldRef, Method, MethodRef, Prototype, Value,
};
use crate::offsets::InsnIndex;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct Pools {
    strings: Vec<String>,
    string_ids: HashMap<String, StringId>,
    types: Vec<String>,
    type_ids: HashMap<String, TypeId>,
    protos: Vec<Prototype>,
    proto_ids: HashMap<Prototype, ProtoId>,
    fields: Vec<FieldRef>,
    field_ids: HashMap<FieldRef, FieldId>,
    methods: Vec<MethodRef>,
    method_ids: HashMap<MethodRef, MethodId>,
}

impl Pools {
    /// One pass over the whole structure, recording every distinct string,
    /// type, prototype, field and method reference.
    pub fn scan(dex: &Dex) -> Pools {
        let mut pools = Pools::default();
        for class in &dex.classes {
            pools.scan_class(class);
        }
        pools
    }

    pub fn strings(&self) -> &[String] {
        &self.strings
    }

    pub fn types(&self) -> &[String] {
        &self.types
    }

    pub fn protos(&self) -> &[Prototype] {
        &self.protos
    }

    pub fn fields(&self) -> &[FieldRef] {
        &self.fields
    }

    pub fn methods(&self) -> &[MethodRef] {
        &self.methods
    }

    fn add_string(&mut self, value: &str) -> StringId {
        if let Some(&id) = self.string_ids.get(value) {
            return id;
        }
        let id = StringId(self.strings.len() as u32);
        self.strings.push(value.to_string());
        self.string_ids.insert(value.to_string(), id);
        id
    }

    fn add_type(&mut self, descriptor: &str) -> TypeId {
        self.add_string(descriptor);
        if let Some(&id) = self.type_ids.get(descriptor) {
            return id;
        }
        let id = TypeId(self.types.len() as u32);
        self.types.push(descriptor.to_string());
        self.type_ids.insert(descriptor.to_string(), id);
        id
    }

    fn add_proto(&mut self, proto: &Prototype) -> ProtoId {
        self.add_string(&proto.shorty);
        self.add_type(&proto.return_type);
        for p in &proto.parameters {
            self.add_type(p);
        }
        if let Some(&id) = self.proto_ids.get(proto) {
            return id;
        }
        let id = ProtoId(self.protos.len() as u32);
        self.protos.push(proto.clone());
        self.proto_ids.insert(proto.clone(), id);
        id
    }

    fn add_field(&mut self, field: &FieldRef) -> FieldId {
        self.add_type(&field.class);
        self.add_type(&field.descriptor);
        self.add_string(&field.name);
        if let Some(&id) = self.field_ids.get(field) {
            return id;
        }
        let id = FieldId(self.fields.len() as u32);
        self.fields.push(field.clone());
        self.field_ids.insert(field.clone(), id);
        id
    }

    fn add_method(&mut self, method: &MethodRef) -> MethodId {
        self.add_type(&method.class);
        self.add_proto(&method.prototype);
        self.add_string(&method.name);
        if let Some(&id) = self.method_ids.get(method) {
            return id;
        }
        let id = MethodId(self.methods.len() as u32);
        self.methods.push(method.clone());
        self.method_ids.insert(method.clone(), id);
        id
    }

    fn scan_class(&mut self, class: &crate::model::Class) {
        self.add_type(&class.descriptor);
        if let Some(superclass) = &class.superclass {
            self.add_type(superclass);
        }
        for iface in &class.interfaces {
            self.add_type(iface);
        }
        if let Some(source) = &class.source_file {
            self.add_string(source);
        }
        self.scan_annotations(&class.annotations);
        for value in &class.static_values {
            self.scan_value(value);
        }
        for field in class.static_fields.iter().chain(class.instance_fields.iter()) {
            self.add_field(&FieldRef {
                class: class.descriptor.clone(),
                name: field.name.clone(),
                descriptor: field.descriptor.clone(),
            });
            self.scan_annotations(&field.annotations);
        }
        for method in class.direct_methods.iter().chain(class.virtual_methods.iter()) {
            self.scan_method(&class.descriptor, method);
        }
    }

    fn scan_method(&mut self, class_descriptor: &str, method: &Method) {
        self.add_method(&MethodRef {
            class: class_descriptor.to_string(),
            name: method.name.clone(),
            prototype: method.prototype.clone(),
        });
        self.scan_annotations(&method.annotations);
        for per_param in &method.parameter_annotations {
            self.scan_annotations(per_param);
        }
        if let Some(code) = &method.code {
            self.scan_code(code);
        }
    }

    fn scan_code(&mut self, code: &Code) {
        for insn in &code.instructions {
            self.scan_instruction(insn);
        }
        for try_span in &code.tries {
            for catch in &try_span.catches {
                self.add_type(&catch.exception);
            }
        }
        if let Some(debug) = &code.debug {
            for name in debug.parameter_names.iter().flatten() {
                self.add_string(name);
            }
            for event in &debug.events {
                match event {
                    DebugEvent::StartLocal { name, descriptor, .. } => {
                        if let Some(n) = name {
                            self.add_string(n);
                        }
                        if let Some(d) = descriptor {
                            self.add_type(d);
                        }
                    }
                    DebugEvent::StartLocalExtended { name, descriptor, signature, .. } => {
                        if let Some(n) = name {
                            self.add_string(n);
                        }
                        if let Some(d) = descriptor {
                            self.add_type(d);
                        }
                        if let Some(s) = signature {
                            self.add_string(s);
                        }
                    }
                    DebugEvent::SetFile(Some(name)) => {
                        self.add_string(name);
                    }
                    _ => {}
                }
            }
        }
    }

    fn scan_instruction(&mut self, insn: &Instruction<InsnIndex>) {
        use Instruction::*;
        match insn {
            ConstString(_, s) | ConstStringJumbo(_, s) => {
                self.add_string(s);
            }
            ConstClass(_, d) | CheckCast(_, d) | NewInstance(_, d) | InstanceOf(_, _, d)
            | NewArray(_, _, d) | FilledNewArray(_, d) | FilledNewArrayRange(_, _, d) => {
                self.add_type(d);
            }
            InstanceOp(_, _, _, field) | StaticOp(_, _, field) => {
                self.add_field(field);
            }
            Invoke(_, _, method) | InvokeRange(_, _, _, method) => {
                self.add_method(method);
            }
            InvokePolymorphic(_, method, proto) | InvokePolymorphicRange(_, _, method, proto) => {
                self.add_method(method);
                self.add_proto(proto);
            }
            _ => {}
        }
    }

    fn scan_annotations(&mut self, annotations: &[Annotation]) {
        for annotation in annotations {
            self.scan_annotation(annotation);
        }
    }

    fn scan_annotation(&mut self, annotation: &Annotation) {
        self.add_type(&annotation.descriptor);
        for element in &annotation.elements {
            self.add_string(&element.name);
            self.scan_value(&element.value);
        }
    }

    fn scan_value(&mut self, value: &Value) {
        match value {
            Value::String(s) => {
                self.add_string(s);
            }
            Value::Type(d) => {
                self.add_type(d);
            }
            Value::Field(f) | Value::Enum(f) => {
                self.add_field(f);
            }
            Value::Method(m) => {
                self.add_method(m);
            }
            Value::MethodType(p) => {
                self.add_proto(p);
            }
            Value::Array(values) => {
                for v in values {
                    self.scan_value(v);
                }
            }
            Value::Annotation(a) => self.scan_annotation(a),
            _ => {}
        }
    }
}

impl IndexResolver for Pools {
    fn string_index(&self, value: &str) -> Result<StringId, DexError> {
        self.string_ids
            .get(value)
            .copied()
            .ok_or_else(|| DexError::new(&format!("string {:?} was never scanned into the pool", value)))
    }

    fn type_index(&self, descriptor: &str) -> Result<TypeId, DexError> {
        self.type_ids
            .get(descriptor)
            .copied()
            .ok_or_else(|| DexError::new(&format!("type {} was never scanned into the pool", descriptor)))
    }

    fn field_index(&self, field: &FieldRef) -> Result<FieldId, DexError> {
        self.field_ids
            .get(field)
            .copied()
            .ok_or_else(|| DexError::new(&format!("field {} was never scanned into the pool", field)))
    }

    fn method_index(&self, method: &MethodRef) -> Result<MethodId, DexError> {
        self.method_ids
            .get(method)
            .copied()
            .ok_or_else(|| DexError::new(&format!("method {} was never scanned into the pool", method)))
    }

    fn proto_index(&self, proto: &Prototype) -> Result<ProtoId, DexError> {
        self.proto_ids
            .get(proto)
            .copied()
            .ok_or_else(|| DexError::new(&format!("prototype {} was never scanned into the pool", proto)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::AccessFlags;
    use crate::model::Class;

    fn class_with_methods(descriptor: &str, methods: Vec<Method>) -> Class {
        Class {
            descriptor: descriptor.to_string(),
            access_flags: AccessFlags::PUBLIC,
            superclass: Some("Ljava/lang/Object;".to_string()),
            interfaces: vec![],
            source_file: None,
            annotations: vec![],
            static_values: vec![],
            static_fields: vec![],
            instance_fields: vec![],
            direct_methods: methods,
            virtual_methods: vec![],
        }
    }

    fn method_casting_to(name: &str, descriptor: &str) -> Method {
        Method {
            name: name.to_string(),
            prototype: Prototype::new("V", vec![]),
            access_flags: AccessFlags::PUBLIC | AccessFlags::STATIC,
            annotations: vec![],
            parameter_annotations: vec![],
            code: Some(Code {
                registers: 1,
                ins: 0,
                outs: 0,
                debug: None,
                instructions: vec![
                    Instruction::CheckCast(0, descriptor.to_string()),
                    Instruction::ReturnVoid,
                ],
                tries: vec![],
            }),
        }
    }

    #[test]
    fn same_type_from_three_methods_pools_once() {
        let target = "Lcom/example/Shared;";
        let dex = Dex {
            classes: vec![class_with_methods(
                "Lcom/example/Main;",
                vec![
                    method_casting_to("a", target),
                    method_casting_to("b", target),
                    method_casting_to("c", target),
                ],
            )],
        };
        let pools = Pools::scan(&dex);
        assert_eq!(pools.types().iter().filter(|t| t.as_str() == target).count(), 1);

        let id = pools.type_index(target).unwrap();
        assert_eq!(pools.types()[id.index()], target);
    }

    #[test]
    fn first_seen_order_is_kept() {
        let dex = Dex {
            classes: vec![class_with_methods(
                "Lb/First;",
                vec![method_casting_to("m", "La/Second;")],
            )],
        };
        let pools = Pools::scan(&dex);
        // discovery order, not lexicographic: the class descriptor comes first
        assert_eq!(pools.type_index("Lb/First;").unwrap(), TypeId(0));
        assert!(pools.type_index("La/Second;").unwrap() > pools.type_index("Ljava/lang/Object;").unwrap());
    }

    #[test]
    fn unscanned_value_is_refused() {
        let pools = Pools::scan(&Dex { classes: vec![] });
        let err = pools.string_index("never seen").unwrap_err();
        assert!(err.to_string().contains("never scanned"));
        assert!(pools.type_index("Lmissing;").is_err());
        assert!(pools.proto_index(&Prototype::new("V", vec![])).is_err());
    }

    #[test]
    fn prototype_components_are_pooled() {
        let dex = Dex {
            classes: vec![class_with_methods("La/A;", vec![Method {
                name: "f".to_string(),
                prototype: Prototype::new("I", vec!["J".to_string(), "La/A;".to_string()]),
                access_flags: AccessFlags::PUBLIC,
                annotations: vec![],
                parameter_annotations: vec![],
                code: None,
            }])],
        };
        let pools = Pools::scan(&dex);
        assert!(pools.string_index("IJL").is_ok(), "shorty must be pooled");
        assert!(pools.type_index("I").is_ok());
        assert!(pools.type_index("J").is_ok());
    }
}
