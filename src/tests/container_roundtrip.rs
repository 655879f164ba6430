//! Whole-container round trips over a generator-built structure exercising
//! classes, code with branches and payloads, try/catch, annotations, static
//! values and debug info.

use crate::access::AccessFlags;
use crate::instructions::{Instruction, InvokeKind, TestKind};
use crate::model::{
    Annotation, AnnotationValue, CatchHandler, Class, Code, DebugEvent, DebugInfo, Dex, Field,
    Method, MethodRef, Prototype, TrySpan, Value, Visibility,
};
use crate::offsets::InsnIndex;

const MAIN: &str = "Lcom/example/Main;";
const OBJECT: &str = "Ljava/lang/Object;";

fn object_init() -> MethodRef {
    MethodRef {
        class: OBJECT.to_string(),
        name: "<init>".to_string(),
        prototype: Prototype::new("V", vec![]),
    }
}

fn marker_annotation() -> Annotation {
    Annotation {
        visibility: Visibility::Runtime,
        descriptor: "Lcom/example/Marker;".to_string(),
        elements: vec![
            AnnotationValue { name: "value".to_string(), value: Value::String("hi".to_string()) },
            AnnotationValue {
                name: "numbers".to_string(),
                value: Value::Array(vec![Value::Int(1), Value::Int(256), Value::Int(-1)]),
            },
            AnnotationValue {
                name: "nested".to_string(),
                value: Value::Annotation(Box::new(Annotation {
                    visibility: Visibility::Runtime,
                    descriptor: "Lcom/example/Inner;".to_string(),
                    elements: vec![AnnotationValue {
                        name: "flag".to_string(),
                        value: Value::Boolean(true),
                    }],
                })),
            },
        ],
    }
}

fn init_method() -> Method {
    Method {
        name: "<init>".to_string(),
        prototype: Prototype::new("V", vec![]),
        access_flags: AccessFlags::PUBLIC | AccessFlags::CONSTRUCTOR,
        annotations: vec![],
        parameter_annotations: vec![],
        code: Some(Code {
            registers: 1,
            ins: 1,
            outs: 1,
            debug: None,
            instructions: vec![
                Instruction::Invoke(InvokeKind::Direct, vec![0], object_init()),
                Instruction::ReturnVoid,
            ],
            tries: vec![],
        }),
    }
}

fn compute_method() -> Method {
    // switch payload parked at an even code-unit position so no padding is
    // inserted and the round trip is instruction-exact
    let instructions = vec![
        Instruction::Const16(0, 3),                      // 0 @0
        Instruction::PackedSwitch(0, InsnIndex(7)),      // 1 @2
        Instruction::Const4(1, 1),                       // 2 @5
        Instruction::Goto(InsnIndex(5)),                 // 3 @6
        Instruction::Const4(1, -1),                      // 4 @7
        Instruction::Return(1),                          // 5 @8
        Instruction::Nop,                                // 6 @9
        Instruction::PackedSwitchPayload {
            // 7 @10
            first_key: 0,
            targets: vec![InsnIndex(2), InsnIndex(4)],
        },
    ];
    Method {
        name: "compute".to_string(),
        prototype: Prototype::new("I", vec!["I".to_string()]),
        access_flags: AccessFlags::PUBLIC,
        annotations: vec![marker_annotation()],
        parameter_annotations: vec![vec![Annotation {
            visibility: Visibility::Build,
            descriptor: "Lcom/example/ParamCheck;".to_string(),
            elements: vec![],
        }]],
        code: Some(Code {
            registers: 3,
            ins: 2,
            outs: 0,
            debug: Some(DebugInfo {
                line_start: 10,
                parameter_names: vec![Some("x".to_string())],
                events: vec![
                    DebugEvent::PrologueEnd,
                    DebugEvent::Special(0x0b),
                    DebugEvent::AdvancePc(2),
                    DebugEvent::AdvanceLine(3),
                    DebugEvent::StartLocal {
                        register: 1,
                        name: Some("y".to_string()),
                        descriptor: Some("I".to_string()),
                    },
                    DebugEvent::EndLocal(1),
                ],
            }),
            instructions,
            tries: vec![TrySpan {
                start: InsnIndex(2),
                end: InsnIndex(5),
                catches: vec![CatchHandler {
                    exception: "Ljava/lang/Exception;".to_string(),
                    target: InsnIndex(4),
                }],
                catch_all: Some(InsnIndex(5)),
            }],
        }),
    }
}

fn fill_method() -> Method {
    Method {
        name: "fill".to_string(),
        prototype: Prototype::new("V", vec![]),
        access_flags: AccessFlags::PUBLIC,
        annotations: vec![],
        parameter_annotations: vec![],
        code: Some(Code {
            registers: 1,
            ins: 1,
            outs: 0,
            debug: None,
            instructions: vec![
                Instruction::FillArrayData(0, InsnIndex(2)),
                Instruction::ReturnVoid,
                Instruction::ArrayDataPayload {
                    element_width: 4,
                    data: vec![1, 0, 0, 0, 2, 0, 0, 0],
                },
            ],
            tries: vec![],
        }),
    }
}

fn branchy_method() -> Method {
    Method {
        name: "pick".to_string(),
        prototype: Prototype::new("I", vec!["I".to_string(), "I".to_string()]),
        access_flags: AccessFlags::PUBLIC | AccessFlags::STATIC,
        annotations: vec![],
        parameter_annotations: vec![],
        code: Some(Code {
            registers: 2,
            ins: 2,
            outs: 0,
            debug: None,
            instructions: vec![
                Instruction::If(TestKind::LessThan, 0, 1, InsnIndex(3)),
                Instruction::Return(1),
                Instruction::Nop,
                Instruction::Return(0),
            ],
            tries: vec![],
        }),
    }
}

fn sample_dex() -> Dex {
    let main = Class {
        descriptor: MAIN.to_string(),
        access_flags: AccessFlags::PUBLIC,
        superclass: Some(OBJECT.to_string()),
        interfaces: vec!["Ljava/lang/Runnable;".to_string()],
        source_file: Some("Main.java".to_string()),
        annotations: vec![marker_annotation()],
        static_values: vec![Value::Int(7), Value::String("seed".to_string())],
        static_fields: vec![
            Field {
                name: "COUNT".to_string(),
                descriptor: "I".to_string(),
                access_flags: AccessFlags::PUBLIC | AccessFlags::STATIC | AccessFlags::FINAL,
                annotations: vec![],
            },
            Field {
                name: "NAME".to_string(),
                descriptor: "Ljava/lang/String;".to_string(),
                access_flags: AccessFlags::PUBLIC | AccessFlags::STATIC | AccessFlags::FINAL,
                annotations: vec![],
            },
        ],
        instance_fields: vec![Field {
            name: "value".to_string(),
            descriptor: "I".to_string(),
            access_flags: AccessFlags::PRIVATE,
            annotations: vec![Annotation {
                visibility: Visibility::System,
                descriptor: "Lcom/example/Tag;".to_string(),
                elements: vec![],
            }],
        }],
        direct_methods: vec![init_method()],
        virtual_methods: vec![compute_method(), fill_method()],
    };

    let util = Class {
        descriptor: "Lcom/example/Util;".to_string(),
        access_flags: AccessFlags::PUBLIC | AccessFlags::FINAL,
        superclass: Some(OBJECT.to_string()),
        interfaces: vec![],
        source_file: Some("Util.java".to_string()),
        annotations: vec![],
        static_values: vec![],
        static_fields: vec![],
        instance_fields: vec![],
        direct_methods: vec![branchy_method()],
        virtual_methods: vec![],
    };

    Dex { classes: vec![main, util] }
}

#[test]
fn container_roundtrip_deep_equals() {
    let dex = sample_dex();
    let bytes = dex.to_bytes().expect("assemble container");
    let back = Dex::from_bytes(&bytes).expect("decode container");
    assert_eq!(dex, back);
}

#[test]
fn roundtrip_is_stable_across_a_second_pass() {
    let dex = sample_dex();
    let first = dex.to_bytes().expect("first assembly");
    let decoded = Dex::from_bytes(&first).expect("decode");
    let second = decoded.to_bytes().expect("second assembly");
    assert_eq!(first, second, "re-assembly of a decoded container must be byte-identical");
}

#[test]
fn empty_container_roundtrip() {
    let dex = Dex { classes: vec![] };
    let bytes = dex.to_bytes().expect("assemble empty container");
    let back = Dex::from_bytes(&bytes).expect("decode empty container");
    assert_eq!(dex, back);
}

#[test]
fn switch_operand_is_absolute_payload_index() {
    let dex = sample_dex();
    let bytes = dex.to_bytes().unwrap();
    let back = Dex::from_bytes(&bytes).unwrap();

    let compute = &back.classes[0].virtual_methods[0];
    let code = compute.code.as_ref().unwrap();
    match &code.instructions[1] {
        Instruction::PackedSwitch(_, target) => assert_eq!(*target, InsnIndex(7)),
        other => panic!("expected packed-switch, got {:?}", other),
    }
    match &code.instructions[7] {
        Instruction::PackedSwitchPayload { targets, .. } => {
            assert_eq!(targets, &[InsnIndex(2), InsnIndex(4)]);
        }
        other => panic!("expected payload, got {:?}", other),
    }
}

#[test]
fn try_ranges_survive_as_instruction_indices() {
    let dex = sample_dex();
    let back = Dex::from_bytes(&dex.to_bytes().unwrap()).unwrap();
    let code = back.classes[0].virtual_methods[0].code.as_ref().unwrap();
    assert_eq!(code.tries.len(), 1);
    let t = &code.tries[0];
    assert_eq!(t.start, InsnIndex(2));
    assert_eq!(t.end, InsnIndex(5));
    assert_eq!(t.catches[0].exception, "Ljava/lang/Exception;");
    assert_eq!(t.catches[0].target, InsnIndex(4));
    assert_eq!(t.catch_all, Some(InsnIndex(5)));
}
