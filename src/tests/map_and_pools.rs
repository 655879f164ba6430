//! Byte-level checks of the assembled container: header fields, map
//! ordering, pool deduplication.

use crate::access::AccessFlags;
use crate::instructions::Instruction;
use crate::model::{Class, Code, Dex, Method, Prototype};
use crate::raw::{Header, MapList, TYPE_HEADER_ITEM, TYPE_MAP_LIST};

fn minimal_class(descriptor: &str, methods: Vec<Method>) -> Class {
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

fn casting_method(name: &str, target: &str) -> Method {
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
                Instruction::CheckCast(0, target.to_string()),
                Instruction::ReturnVoid,
            ],
            tries: vec![],
        }),
    }
}

#[test]
fn map_is_sorted_and_omits_empty_sections() {
    let dex = Dex {
        classes: vec![minimal_class("La/A;", vec![casting_method("go", "Lb/B;")])],
    };
    let bytes = dex.to_bytes().unwrap();

    let mut ix = 0;
    let header = Header::read(&bytes, &mut ix).unwrap();
    let mut map_ix = header.map_off as usize;
    let map = MapList::read(&bytes, &mut map_ix).unwrap();

    assert_eq!(map.items[0].type_code, TYPE_HEADER_ITEM);
    for pair in map.items.windows(2) {
        assert!(
            pair[0].offset < pair[1].offset,
            "map offsets must be strictly ascending: {:?} then {:?}",
            pair[0],
            pair[1]
        );
    }
    for item in &map.items {
        assert!(item.size > 0, "zero-size section {:?} must be omitted", item);
    }
    assert!(map.items.iter().any(|i| i.type_code == TYPE_MAP_LIST));

    // the sample has no annotations and no debug info; those sections must
    // not appear at all
    assert!(map.items.iter().all(|i| i.type_code != crate::raw::TYPE_ANNOTATION_ITEM));
    assert!(map.items.iter().all(|i| i.type_code != crate::raw::TYPE_DEBUG_INFO_ITEM));
}

#[test]
fn header_accounts_for_every_byte() {
    let dex = Dex {
        classes: vec![minimal_class("La/A;", vec![casting_method("go", "Lb/B;")])],
    };
    let bytes = dex.to_bytes().unwrap();
    let mut ix = 0;
    let header = Header::read(&bytes, &mut ix).unwrap();

    assert_eq!(header.file_size as usize, bytes.len());
    assert_eq!(header.header_size, crate::raw::HEADER_SIZE);
    assert_eq!(header.data_off + header.data_size, header.file_size);
    assert_eq!(header.checksum, 0, "checksum stays a placeholder");
    assert_eq!(header.signature, [0u8; 20], "signature stays a placeholder");
    assert_eq!(header.link_size, 0);
    assert_eq!(header.class_defs_size, 1);
}

#[test]
fn shared_type_is_pooled_once() {
    let target = "Lshared/Target;";
    let dex = Dex {
        classes: vec![minimal_class(
            "La/A;",
            vec![
                casting_method("a", target),
                casting_method("b", target),
                casting_method("c", target),
            ],
        )],
    };
    let bytes = dex.to_bytes().unwrap();
    let mut ix = 0;
    let header = Header::read(&bytes, &mut ix).unwrap();

    // La/A;, Ljava/lang/Object;, V (return type), Lshared/Target; — exactly
    // one entry for the shared target despite three referencing methods
    assert_eq!(header.type_ids_size, 4);

    let back = Dex::from_bytes(&bytes).unwrap();
    for method in &back.classes[0].direct_methods {
        let code = method.code.as_ref().unwrap();
        match &code.instructions[0] {
            Instruction::CheckCast(_, descriptor) => assert_eq!(descriptor, target),
            other => panic!("expected check-cast, got {:?}", other),
        }
    }
}

#[test]
fn string_pool_counts_every_distinct_string_once() {
    let dex = Dex {
        classes: vec![minimal_class("La/A;", vec![casting_method("go", "La/A;")])],
    };
    let bytes = dex.to_bytes().unwrap();
    let mut ix = 0;
    let header = Header::read(&bytes, &mut ix).unwrap();
    // La/A;, Ljava/lang/Object;, V (shorty and type descriptor collapse), go
    assert_eq!(header.string_ids_size, 4);
}
