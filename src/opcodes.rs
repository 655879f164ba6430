//! The global opcode table.
//!
//! One flat, immutable list built at first use, plus the two derived lookup
//! maps (value→definition for the decoder, name→definition for the
//! encoder). Payload pseudo-instructions are keyed by their 16-bit ident
//! (`0x0100`/`0x0200`/`0x0300`) so they share the table with the ordinary
//! one-byte opcodes.

use crate::formats::Format;
use once_cell::sync::Lazy;
use std::collections::HashMap;

#[derive(Debug)]
pub struct OpcodeDef {
    pub value: u16,
    pub name: &'static str,
    pub format: Format,
}

const fn def(value: u16, name: &'static str, format: Format) -> OpcodeDef {
    OpcodeDef { value, name, format }
}

pub static OPCODES: &[OpcodeDef] = &[
    def(0x00, "nop", Format::Format10x),
    def(0x01, "move", Format::Format12x),
    def(0x02, "move/from16", Format::Format22x),
    def(0x03, "move/16", Format::Format32x),
    def(0x04, "move-wide", Format::Format12x),
    def(0x05, "move-wide/from16", Format::Format22x),
    def(0x06, "move-wide/16", Format::Format32x),
    def(0x07, "move-object", Format::Format12x),
    def(0x08, "move-object/from16", Format::Format22x),
    def(0x09, "move-object/16", Format::Format32x),
    def(0x0a, "move-result", Format::Format11x),
    def(0x0b, "move-result-wide", Format::Format11x),
    def(0x0c, "move-result-object", Format::Format11x),
    def(0x0d, "move-exception", Format::Format11x),
    def(0x0e, "return-void", Format::Format10x),
    def(0x0f, "return", Format::Format11x),
    def(0x10, "return-wide", Format::Format11x),
    def(0x11, "return-object", Format::Format11x),
    def(0x12, "const/4", Format::Format11n),
    def(0x13, "const/16", Format::Format21s),
    def(0x14, "const", Format::Format31i),
    def(0x15, "const/high16", Format::Format21ih),
    def(0x16, "const-wide/16", Format::Format21s),
    def(0x17, "const-wide/32", Format::Format31i),
    def(0x18, "const-wide", Format::Format51l),
    def(0x19, "const-wide/high16", Format::Format21lh),
    def(0x1a, "const-string", Format::Format21c),
    def(0x1b, "const-string/jumbo", Format::Format31c),
    def(0x1c, "const-class", Format::Format21c),
    def(0x1d, "monitor-enter", Format::Format11x),
    def(0x1e, "monitor-exit", Format::Format11x),
    def(0x1f, "check-cast", Format::Format21c),
    def(0x20, "instance-of", Format::Format22c),
    def(0x21, "array-length", Format::Format12x),
    def(0x22, "new-instance", Format::Format21c),
    def(0x23, "new-array", Format::Format22c),
    def(0x24, "filled-new-array", Format::Format35c),
    def(0x25, "filled-new-array/range", Format::Format3rc),
    def(0x26, "fill-array-data", Format::Format31t),
    def(0x27, "throw", Format::Format11x),
    def(0x28, "goto", Format::Format10t),
    def(0x29, "goto/16", Format::Format20t),
    def(0x2a, "goto/32", Format::Format30t),
    def(0x2b, "packed-switch", Format::Format31t),
    def(0x2c, "sparse-switch", Format::Format31t),
    def(0x2d, "cmpl-float", Format::Format23x),
    def(0x2e, "cmpg-float", Format::Format23x),
    def(0x2f, "cmpl-double", Format::Format23x),
    def(0x30, "cmpg-double", Format::Format23x),
    def(0x31, "cmp-long", Format::Format23x),
    def(0x32, "if-eq", Format::Format22t),
    def(0x33, "if-ne", Format::Format22t),
    def(0x34, "if-lt", Format::Format22t),
    def(0x35, "if-ge", Format::Format22t),
    def(0x36, "if-gt", Format::Format22t),
    def(0x37, "if-le", Format::Format22t),
    def(0x38, "if-eqz", Format::Format21t),
    def(0x39, "if-nez", Format::Format21t),
    def(0x3a, "if-ltz", Format::Format21t),
    def(0x3b, "if-gez", Format::Format21t),
    def(0x3c, "if-gtz", Format::Format21t),
    def(0x3d, "if-lez", Format::Format21t),
    def(0x44, "aget", Format::Format23x),
    def(0x45, "aget-wide", Format::Format23x),
    def(0x46, "aget-object", Format::Format23x),
    def(0x47, "aget-boolean", Format::Format23x),
    def(0x48, "aget-byte", Format::Format23x),
    def(0x49, "aget-char", Format::Format23x),
    def(0x4a, "aget-short", Format::Format23x),
    def(0x4b, "aput", Format::Format23x),
    def(0x4c, "aput-wide", Format::Format23x),
    def(0x4d, "aput-object", Format::Format23x),
    def(0x4e, "aput-boolean", Format::Format23x),
    def(0x4f, "aput-byte", Format::Format23x),
    def(0x50, "aput-char", Format::Format23x),
    def(0x51, "aput-short", Format::Format23x),
    def(0x52, "iget", Format::Format22c),
    def(0x53, "iget-wide", Format::Format22c),
    def(0x54, "iget-object", Format::Format22c),
    def(0x55, "iget-boolean", Format::Format22c),
    def(0x56, "iget-byte", Format::Format22c),
    def(0x57, "iget-char", Format::Format22c),
    def(0x58, "iget-short", Format::Format22c),
    def(0x59, "iput", Format::Format22c),
    def(0x5a, "iput-wide", Format::Format22c),
    def(0x5b, "iput-object", Format::Format22c),
    def(0x5c, "iput-boolean", Format::Format22c),
    def(0x5d, "iput-byte", Format::Format22c),
    def(0x5e, "iput-char", Format::Format22c),
    def(0x5f, "iput-short", Format::Format22c),
    def(0x60, "sget", Format::Format21c),
    def(0x61, "sget-wide", Format::Format21c),
    def(0x62, "sget-object", Format::Format21c),
    def(0x63, "sget-boolean", Format::Format21c),
    def(0x64, "sget-byte", Format::Format21c),
    def(0x65, "sget-char", Format::Format21c),
    def(0x66, "sget-short", Format::Format21c),
    def(0x67, "sput", Format::Format21c),
    def(0x68, "sput-wide", Format::Format21c),
    def(0x69, "sput-object", Format::Format21c),
    def(0x6a, "sput-boolean", Format::Format21c),
    def(0x6b, "sput-byte", Format::Format21c),
    def(0x6c, "sput-char", Format::Format21c),
    def(0x6d, "sput-short", Format::Format21c),
    def(0x6e, "invoke-virtual", Format::Format35c),
    def(0x6f, "invoke-super", Format::Format35c),
    def(0x70, "invoke-direct", Format::Format35c),
    def(0x71, "invoke-static", Format::Format35c),
    def(0x72, "invoke-interface", Format::Format35c),
    def(0x74, "invoke-virtual/range", Format::Format3rc),
    def(0x75, "invoke-super/range", Format::Format3rc),
    def(0x76, "invoke-direct/range", Format::Format3rc),
    def(0x77, "invoke-static/range", Format::Format3rc),
    def(0x78, "invoke-interface/range", Format::Format3rc),
    def(0x7b, "neg-int", Format::Format12x),
    def(0x7c, "not-int", Format::Format12x),
    def(0x7d, "neg-long", Format::Format12x),
    def(0x7e, "not-long", Format::Format12x),
    def(0x7f, "neg-float", Format::Format12x),
    def(0x80, "neg-double", Format::Format12x),
    def(0x81, "int-to-long", Format::Format12x),
    def(0x82, "int-to-float", Format::Format12x),
    def(0x83, "int-to-double", Format::Format12x),
    def(0x84, "long-to-int", Format::Format12x),
    def(0x85, "long-to-float", Format::Format12x),
    def(0x86, "long-to-double", Format::Format12x),
    def(0x87, "float-to-int", Format::Format12x),
    def(0x88, "float-to-long", Format::Format12x),
    def(0x89, "float-to-double", Format::Format12x),
    def(0x8a, "double-to-int", Format::Format12x),
    def(0x8b, "double-to-long", Format::Format12x),
    def(0x8c, "double-to-float", Format::Format12x),
    def(0x8d, "int-to-byte", Format::Format12x),
    def(0x8e, "int-to-char", Format::Format12x),
    def(0x8f, "int-to-short", Format::Format12x),
    def(0x90, "add-int", Format::Format23x),
    def(0x91, "sub-int", Format::Format23x),
    def(0x92, "mul-int", Format::Format23x),
    def(0x93, "div-int", Format::Format23x),
    def(0x94, "rem-int", Format::Format23x),
    def(0x95, "and-int", Format::Format23x),
    def(0x96, "or-int", Format::Format23x),
    def(0x97, "xor-int", Format::Format23x),
    def(0x98, "shl-int", Format::Format23x),
    def(0x99, "shr-int", Format::Format23x),
    def(0x9a, "ushr-int", Format::Format23x),
    def(0x9b, "add-long", Format::Format23x),
    def(0x9c, "sub-long", Format::Format23x),
    def(0x9d, "mul-long", Format::Format23x),
    def(0x9e, "div-long", Format::Format23x),
    def(0x9f, "rem-long", Format::Format23x),
    def(0xa0, "and-long", Format::Format23x),
    def(0xa1, "or-long", Format::Format23x),
    def(0xa2, "xor-long", Format::Format23x),
    def(0xa3, "shl-long", Format::Format23x),
    def(0xa4, "shr-long", Format::Format23x),
    def(0xa5, "ushr-long", Format::Format23x),
    def(0xa6, "add-float", Format::Format23x),
    def(0xa7, "sub-float", Format::Format23x),
    def(0xa8, "mul-float", Format::Format23x),
    def(0xa9, "div-float", Format::Format23x),
    def(0xaa, "rem-float", Format::Format23x),
    def(0xab, "add-double", Format::Format23x),
    def(0xac, "sub-double", Format::Format23x),
    def(0xad, "mul-double", Format::Format23x),
    def(0xae, "div-double", Format::Format23x),
    def(0xaf, "rem-double", Format::Format23x),
    def(0xb0, "add-int/2addr", Format::Format12x),
    def(0xb1, "sub-int/2addr", Format::Format12x),
    def(0xb2, "mul-int/2addr", Format::Format12x),
    def(0xb3, "div-int/2addr", Format::Format12x),
    def(0xb4, "rem-int/2addr", Format::Format12x),
    def(0xb5, "and-int/2addr", Format::Format12x),
    def(0xb6, "or-int/2addr", Format::Format12x),
    def(0xb7, "xor-int/2addr", Format::Format12x),
    def(0xb8, "shl-int/2addr", Format::Format12x),
    def(0xb9, "shr-int/2addr", Format::Format12x),
    def(0xba, "ushr-int/2addr", Format::Format12x),
    def(0xbb, "add-long/2addr", Format::Format12x),
    def(0xbc, "sub-long/2addr", Format::Format12x),
    def(0xbd, "mul-long/2addr", Format::Format12x),
    def(0xbe, "div-long/2addr", Format::Format12x),
    def(0xbf, "rem-long/2addr", Format::Format12x),
    def(0xc0, "and-long/2addr", Format::Format12x),
    def(0xc1, "or-long/2addr", Format::Format12x),
    def(0xc2, "xor-long/2addr", Format::Format12x),
    def(0xc3, "shl-long/2addr", Format::Format12x),
    def(0xc4, "shr-long/2addr", Format::Format12x),
    def(0xc5, "ushr-long/2addr", Format::Format12x),
    def(0xc6, "add-float/2addr", Format::Format12x),
    def(0xc7, "sub-float/2addr", Format::Format12x),
    def(0xc8, "mul-float/2addr", Format::Format12x),
    def(0xc9, "div-float/2addr", Format::Format12x),
    def(0xca, "rem-float/2addr", Format::Format12x),
    def(0xcb, "add-double/2addr", Format::Format12x),
    def(0xcc, "sub-double/2addr", Format::Format12x),
    def(0xcd, "mul-double/2addr", Format::Format12x),
    def(0xce, "div-double/2addr", Format::Format12x),
    def(0xcf, "rem-double/2addr", Format::Format12x),
    def(0xd0, "add-int/lit16", Format::Format22s),
    def(0xd1, "rsub-int", Format::Format22s),
    def(0xd2, "mul-int/lit16", Format::Format22s),
    def(0xd3, "div-int/lit16", Format::Format22s),
    def(0xd4, "rem-int/lit16", Format::Format22s),
    def(0xd5, "and-int/lit16", Format::Format22s),
    def(0xd6, "or-int/lit16", Format::Format22s),
    def(0xd7, "xor-int/lit16", Format::Format22s),
    def(0xd8, "add-int/lit8", Format::Format22b),
    def(0xd9, "rsub-int/lit8", Format::Format22b),
    def(0xda, "mul-int/lit8", Format::Format22b),
    def(0xdb, "div-int/lit8", Format::Format22b),
    def(0xdc, "rem-int/lit8", Format::Format22b),
    def(0xdd, "and-int/lit8", Format::Format22b),
    def(0xde, "or-int/lit8", Format::Format22b),
    def(0xdf, "xor-int/lit8", Format::Format22b),
    def(0xe0, "shl-int/lit8", Format::Format22b),
    def(0xe1, "shr-int/lit8", Format::Format22b),
    def(0xe2, "ushr-int/lit8", Format::Format22b),
    def(0xfa, "invoke-polymorphic", Format::Format45cc),
    def(0xfb, "invoke-polymorphic/range", Format::Format4rcc),
    def(0xfc, "invoke-custom", Format::Format35c),
    def(0xfd, "invoke-custom/range", Format::Format3rc),
    def(0xfe, "const-method-handle", Format::Format21c),
    def(0xff, "const-method-type", Format::Format21c),
    def(0x100, "packed-switch-payload", Format::PackedSwitchPayload),
    def(0x200, "sparse-switch-payload", Format::SparseSwitchPayload),
    def(0x300, "array-data-payload", Format::ArrayDataPayload),
];

pub static OPCODE_BY_VALUE: Lazy<HashMap<u16, &'static OpcodeDef>> = Lazy::new(|| {
    let mut map = HashMap::with_capacity(OPCODES.len());
    for op in OPCODES {
        map.insert(op.value, op);
    }
    map
});

pub static OPCODE_BY_NAME: Lazy<HashMap<&'static str, &'static OpcodeDef>> = Lazy::new(|| {
    let mut map = HashMap::with_capacity(OPCODES.len());
    for op in OPCODES {
        map.insert(op.name, op);
    }
    map
});

pub fn lookup_value(value: u16) -> Option<&'static OpcodeDef> {
    OPCODE_BY_VALUE.get(&value).copied()
}

pub fn lookup_name(name: &str) -> Option<&'static OpcodeDef> {
    OPCODE_BY_NAME.get(name).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tables_are_bijective() {
        assert_eq!(OPCODE_BY_VALUE.len(), OPCODES.len());
        assert_eq!(OPCODE_BY_NAME.len(), OPCODES.len());
        for op in OPCODES {
            assert_eq!(lookup_value(op.value).unwrap().name, op.name);
            assert_eq!(lookup_name(op.name).unwrap().value, op.value);
        }
    }

    #[test]
    fn gaps_are_absent() {
        // odex/quickened territory is deliberately not in the table
        for value in [0x3e, 0x43, 0x73, 0x79, 0x7a, 0xe3, 0xf9] {
            assert!(lookup_value(value).is_none(), "0x{:02x} should be absent", value);
        }
    }

    #[test]
    fn payload_idents() {
        assert_eq!(lookup_value(0x100).unwrap().name, "packed-switch-payload");
        assert_eq!(lookup_name("array-data-payload").unwrap().value, 0x300);
    }
}
