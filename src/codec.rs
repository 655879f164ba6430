//! Instruction-stream codec: 16-bit code units ⇄ raw-tier instructions.
//!
//! Decoding is length-driven from the opcode table: every format has a fixed
//! size, except the three payload kinds whose size comes from an embedded
//! count. Pool-index operands are resolved to concrete values through a
//! [`RefResolver`] as they are read, and turned back into indices through an
//! [`IndexResolver`] on the way out, so instruction records never carry raw
//! indices.

use crate::error::DexError;
use crate::formats::{a4, a8, b4, hi16, lo16, op, pack_a8, pack_nibbles, s16, s4, s8, Format};
use crate::ids::{FieldId, MethodId, ProtoId, StringId, TypeId};
use crate::instructions::{
    AccessKind, BinaryOp, CompareKind, Instruction, InvokeKind, TestKind, UnaryOp,
};
use crate::model::{FieldRef, MethodRef, Prototype};
use crate::offsets::CodeUnitOffset;
use crate::opcodes::{lookup_name, lookup_value};
use std::collections::HashMap;

/// Resolves pool indices to concrete values while decoding.
pub trait RefResolver {
    fn string(&self, idx: StringId) -> Result<String, DexError>;
    fn type_desc(&self, idx: TypeId) -> Result<String, DexError>;
    fn field(&self, idx: FieldId) -> Result<FieldRef, DexError>;
    fn method(&self, idx: MethodId) -> Result<MethodRef, DexError>;
    fn proto(&self, idx: ProtoId) -> Result<Prototype, DexError>;
}

/// Resolves concrete values back to pool indices while encoding.
pub trait IndexResolver {
    fn string_index(&self, value: &str) -> Result<StringId, DexError>;
    fn type_index(&self, descriptor: &str) -> Result<TypeId, DexError>;
    fn field_index(&self, field: &FieldRef) -> Result<FieldId, DexError>;
    fn method_index(&self, method: &MethodRef) -> Result<MethodId, DexError>;
    fn proto_index(&self, proto: &Prototype) -> Result<ProtoId, DexError>;
}

type RawInstruction = Instruction<CodeUnitOffset>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PayloadKind {
    PackedSwitch,
    SparseSwitch,
    ArrayData,
}

#[inline]
fn require_cu(code: &[u16], pc: usize, need: usize, what: &str) -> Result<(), DexError> {
    if pc + need > code.len() {
        fail!(
            "truncated {} at code unit {}: need {} code units, have {}",
            what,
            pc,
            need,
            code.len().saturating_sub(pc)
        );
    }
    Ok(())
}

#[inline]
fn read_i32(code: &[u16], pc: usize) -> i32 {
    ((code[pc + 1] as u32) << 16 | code[pc] as u32) as i32
}

/// Size in code units of the payload starting at `pc`, from its header.
fn payload_size_at(code: &[u16], pc: usize) -> Result<(PayloadKind, usize), DexError> {
    require_cu(code, pc, 2, "payload header")?;
    match code[pc] {
        0x0100 => {
            let size = code[pc + 1] as usize;
            Ok((PayloadKind::PackedSwitch, 4 + size * 2))
        }
        0x0200 => {
            let size = code[pc + 1] as usize;
            Ok((PayloadKind::SparseSwitch, 2 + size * 4))
        }
        0x0300 => {
            require_cu(code, pc, 4, "array-data header")?;
            let width = code[pc + 1] as usize;
            let count = ((code[pc + 3] as u32) << 16 | code[pc + 2] as u32) as usize;
            let bytes = width
                .checked_mul(count)
                .ok_or_else(|| DexError::new("array-data size overflow"))?;
            Ok((PayloadKind::ArrayData, 4 + (bytes + 1) / 2))
        }
        other => Err(DexError::new(&format!(
            "unknown payload ident 0x{:04x} at code unit {}",
            other, pc
        ))),
    }
}

/// First pass over the stream: collect where payloads start (from their own
/// idents) and which positions the branch instructions actually reference.
fn scan_payloads(code: &[u16]) -> Result<HashMap<usize, PayloadKind>, DexError> {
    let mut starts = HashMap::new();
    let mut referenced = HashMap::new();
    let mut pc = 0usize;
    while pc < code.len() {
        let cu = code[pc];
        if op(cu) == 0x00 && a8(cu) != 0 {
            let (kind, size) = payload_size_at(code, pc)?;
            require_cu(code, pc, size, "payload")?;
            starts.insert(pc, kind);
            pc += size;
            continue;
        }
        let def = lookup_value(op(cu) as u16).ok_or_else(|| {
            DexError::new(&format!("unknown opcode 0x{:02x} at code unit {}", op(cu), pc))
        })?;
        let size = def
            .format
            .code_units()
            .expect("non-payload opcodes have a fixed size");
        require_cu(code, pc, size, def.name)?;
        if def.format == Format::Format31t {
            let target = pc as i64 + read_i32(code, pc + 1) as i64;
            let kind = match def.name {
                "packed-switch" => PayloadKind::PackedSwitch,
                "sparse-switch" => PayloadKind::SparseSwitch,
                _ => PayloadKind::ArrayData,
            };
            referenced.insert(target, kind);
        }
        pc += size;
    }

    for (&start, &kind) in &starts {
        match referenced.get(&(start as i64)) {
            Some(&k) if k == kind => {}
            Some(_) => {
                fail!("payload at code unit {} is referenced as a different payload kind", start)
            }
            None => fail!("payload at code unit {} has no referencing instruction", start),
        }
    }
    Ok(starts)
}

/// Decode a code-unit stream into raw-tier instructions.
pub fn decode_instructions(
    code: &[u16],
    res: &impl RefResolver,
) -> Result<Vec<RawInstruction>, DexError> {
    let payloads = scan_payloads(code)?;

    let mut out = Vec::new();
    let mut pc = 0usize;
    while pc < code.len() {
        if let Some(kind) = payloads.get(&pc) {
            let (insn, size) = decode_payload(code, pc, *kind)?;
            out.push(insn);
            pc += size;
            continue;
        }
        let cu = code[pc];
        let def = lookup_value(op(cu) as u16).ok_or_else(|| {
            DexError::new(&format!("unknown opcode 0x{:02x} at code unit {}", op(cu), pc))
        })?;
        let insn = decode_one(code, pc, def.value as u8, def.format, res)
            .map_err(|e| e.context(format!("while decoding {} at code unit {}", def.name, pc)))?;
        pc += insn.code_units();
        out.push(insn);
    }
    Ok(out)
}

fn decode_payload(
    code: &[u16],
    pc: usize,
    kind: PayloadKind,
) -> Result<(RawInstruction, usize), DexError> {
    match kind {
        PayloadKind::PackedSwitch => {
            let size = code[pc + 1] as usize;
            require_cu(code, pc, 4 + size * 2, "packed-switch payload")?;
            let first_key = read_i32(code, pc + 2);
            let mut targets = Vec::with_capacity(size);
            for i in 0..size {
                targets.push(CodeUnitOffset(read_i32(code, pc + 4 + i * 2)));
            }
            Ok((Instruction::PackedSwitchPayload { first_key, targets }, 4 + size * 2))
        }
        PayloadKind::SparseSwitch => {
            let size = code[pc + 1] as usize;
            require_cu(code, pc, 2 + size * 4, "sparse-switch payload")?;
            let keys_start = pc + 2;
            let targets_start = keys_start + size * 2;
            let mut keys = Vec::with_capacity(size);
            let mut targets = Vec::with_capacity(size);
            for i in 0..size {
                keys.push(read_i32(code, keys_start + i * 2));
            }
            for i in 0..size {
                targets.push(CodeUnitOffset(read_i32(code, targets_start + i * 2)));
            }
            Ok((Instruction::SparseSwitchPayload { keys, targets }, 2 + size * 4))
        }
        PayloadKind::ArrayData => {
            let width = code[pc + 1];
            let count = ((code[pc + 3] as u32) << 16 | code[pc + 2] as u32) as usize;
            let bytes_len = width as usize * count;
            let data_units = (bytes_len + 1) / 2;
            require_cu(code, pc, 4 + data_units, "array-data payload")?;
            let mut data = Vec::with_capacity(bytes_len);
            for i in 0..data_units {
                let cu = code[pc + 4 + i];
                data.push((cu & 0x00ff) as u8);
                if data.len() < bytes_len {
                    data.push((cu >> 8) as u8);
                }
            }
            Ok((
                Instruction::ArrayDataPayload { element_width: width, data },
                4 + data_units,
            ))
        }
    }
}

fn decode_one(
    code: &[u16],
    pc: usize,
    opcode: u8,
    format: Format,
    res: &impl RefResolver,
) -> Result<RawInstruction, DexError> {
    use Instruction::*;
    let cu = code[pc];

    let insn = match format {
        Format::Format10x => match opcode {
            0x00 => Nop,
            0x0e => ReturnVoid,
            _ => fail!("opcode 0x{:02x} has no 10x variant", opcode),
        },

        Format::Format12x => {
            let a = a4(cu);
            let b = b4(cu);
            match opcode {
                0x01 => Move(a, b),
                0x04 => MoveWide(a, b),
                0x07 => MoveObject(a, b),
                0x21 => ArrayLength(a, b),
                0x7b..=0x8f => Unary(
                    UnaryOp::from_offset(opcode - 0x7b)
                        .ok_or_else(|| DexError::new("unary opcode out of range"))?,
                    a,
                    b,
                ),
                0xb0..=0xcf => Binary2Addr(
                    BinaryOp::from_offset(opcode - 0xb0)
                        .ok_or_else(|| DexError::new("2addr opcode out of range"))?,
                    a,
                    b,
                ),
                _ => fail!("opcode 0x{:02x} has no 12x variant", opcode),
            }
        }

        Format::Format22x => {
            let a = a8(cu);
            let b = code[pc + 1];
            match opcode {
                0x02 => MoveFrom16(a, b),
                0x05 => MoveWideFrom16(a, b),
                0x08 => MoveObjectFrom16(a, b),
                _ => fail!("opcode 0x{:02x} has no 22x variant", opcode),
            }
        }

        Format::Format32x => {
            let a = code[pc + 1];
            let b = code[pc + 2];
            match opcode {
                0x03 => Move16(a, b),
                0x06 => MoveWide16(a, b),
                0x09 => MoveObject16(a, b),
                _ => fail!("opcode 0x{:02x} has no 32x variant", opcode),
            }
        }

        Format::Format11x => {
            let a = a8(cu);
            match opcode {
                0x0a => MoveResult(a),
                0x0b => MoveResultWide(a),
                0x0c => MoveResultObject(a),
                0x0d => MoveException(a),
                0x0f => Return(a),
                0x10 => ReturnWide(a),
                0x11 => ReturnObject(a),
                0x1d => MonitorEnter(a),
                0x1e => MonitorExit(a),
                0x27 => Throw(a),
                _ => fail!("opcode 0x{:02x} has no 11x variant", opcode),
            }
        }

        Format::Format11n => Const4(a4(cu), s4(b4(cu)) as i32),

        Format::Format21s => {
            let a = a8(cu);
            let lit = s16(code[pc + 1]);
            match opcode {
                0x13 => Const16(a, lit as i32),
                0x16 => ConstWide16(a, lit as i64),
                _ => fail!("opcode 0x{:02x} has no 21s variant", opcode),
            }
        }

        Format::Format31i => {
            let a = a8(cu);
            let lit = read_i32(code, pc + 1);
            match opcode {
                0x14 => Const(a, lit),
                0x17 => ConstWide32(a, lit as i64),
                _ => fail!("opcode 0x{:02x} has no 31i variant", opcode),
            }
        }

        Format::Format21ih => ConstHigh16(a8(cu), (s16(code[pc + 1]) as i32) << 16),

        Format::Format21lh => ConstWideHigh16(a8(cu), (s16(code[pc + 1]) as i64) << 48),

        Format::Format51l => {
            let lit = (code[pc + 1] as u64)
                | (code[pc + 2] as u64) << 16
                | (code[pc + 3] as u64) << 32
                | (code[pc + 4] as u64) << 48;
            ConstWide(a8(cu), lit as i64)
        }

        Format::Format21c => {
            let a = a8(cu);
            let idx = code[pc + 1] as u32;
            match opcode {
                0x1a => ConstString(a, res.string(StringId(idx))?),
                0x1c => ConstClass(a, res.type_desc(TypeId(idx))?),
                0x1f => CheckCast(a, res.type_desc(TypeId(idx))?),
                0x22 => NewInstance(a, res.type_desc(TypeId(idx))?),
                0x60..=0x6d => StaticOp(
                    AccessKind::from_offset(opcode - 0x60)
                        .ok_or_else(|| DexError::new("static accessor out of range"))?,
                    a,
                    res.field(FieldId(idx))?,
                ),
                0xfe => fail!("const-method-handle is not supported: no method-handle pool"),
                0xff => fail!("const-method-type is not supported: no method-type pool"),
                _ => fail!("opcode 0x{:02x} has no 21c variant", opcode),
            }
        }

        Format::Format31c => {
            let idx = read_i32(code, pc + 1) as u32;
            match opcode {
                0x1b => ConstStringJumbo(a8(cu), res.string(StringId(idx))?),
                _ => fail!("opcode 0x{:02x} has no 31c variant", opcode),
            }
        }

        Format::Format22c => {
            let a = a4(cu);
            let b = b4(cu);
            let idx = code[pc + 1] as u32;
            match opcode {
                0x20 => InstanceOf(a, b, res.type_desc(TypeId(idx))?),
                0x23 => NewArray(a, b, res.type_desc(TypeId(idx))?),
                0x52..=0x5f => InstanceOp(
                    AccessKind::from_offset(opcode - 0x52)
                        .ok_or_else(|| DexError::new("instance accessor out of range"))?,
                    a,
                    b,
                    res.field(FieldId(idx))?,
                ),
                _ => fail!("opcode 0x{:02x} has no 22c variant", opcode),
            }
        }

        Format::Format23x => {
            let a = a8(cu);
            let b = (code[pc + 1] & 0x00ff) as u8;
            let c = (code[pc + 1] >> 8) as u8;
            match opcode {
                0x2d..=0x31 => Compare(
                    CompareKind::from_offset(opcode - 0x2d)
                        .ok_or_else(|| DexError::new("compare opcode out of range"))?,
                    a,
                    b,
                    c,
                ),
                0x44..=0x51 => ArrayOp(
                    AccessKind::from_offset(opcode - 0x44)
                        .ok_or_else(|| DexError::new("array accessor out of range"))?,
                    a,
                    b,
                    c,
                ),
                0x90..=0xaf => Binary(
                    BinaryOp::from_offset(opcode - 0x90)
                        .ok_or_else(|| DexError::new("binary opcode out of range"))?,
                    a,
                    b,
                    c,
                ),
                _ => fail!("opcode 0x{:02x} has no 23x variant", opcode),
            }
        }

        Format::Format22t => If(
            TestKind::from_offset(opcode - 0x32)
                .ok_or_else(|| DexError::new("test opcode out of range"))?,
            a4(cu),
            b4(cu),
            CodeUnitOffset(s16(code[pc + 1]) as i32),
        ),

        Format::Format21t => IfZ(
            TestKind::from_offset(opcode - 0x38)
                .ok_or_else(|| DexError::new("test opcode out of range"))?,
            a8(cu),
            CodeUnitOffset(s16(code[pc + 1]) as i32),
        ),

        Format::Format10t => Goto(CodeUnitOffset(s8(a8(cu)) as i32)),
        Format::Format20t => Goto16(CodeUnitOffset(s16(code[pc + 1]) as i32)),
        Format::Format30t => Goto32(CodeUnitOffset(read_i32(code, pc + 1))),

        Format::Format31t => {
            let a = a8(cu);
            let off = CodeUnitOffset(read_i32(code, pc + 1));
            match opcode {
                0x26 => FillArrayData(a, off),
                0x2b => PackedSwitch(a, off),
                0x2c => SparseSwitch(a, off),
                _ => fail!("opcode 0x{:02x} has no 31t variant", opcode),
            }
        }

        Format::Format22s => BinaryLit16(
            BinaryOp::from_lit_offset(opcode - 0xd0)
                .ok_or_else(|| DexError::new("lit16 opcode out of range"))?,
            a4(cu),
            b4(cu),
            s16(code[pc + 1]),
        ),

        Format::Format22b => BinaryLit8(
            BinaryOp::from_lit_offset(opcode - 0xd8)
                .ok_or_else(|| DexError::new("lit8 opcode out of range"))?,
            a8(cu),
            (code[pc + 1] & 0x00ff) as u8,
            s8((code[pc + 1] >> 8) as u8),
        ),

        Format::Format35c => {
            let regs = unpack_regs35(cu, code[pc + 2])?;
            let idx = code[pc + 1] as u32;
            match opcode {
                0x24 => FilledNewArray(regs, res.type_desc(TypeId(idx))?),
                0x6e..=0x72 => Invoke(
                    InvokeKind::from_offset(opcode - 0x6e)
                        .ok_or_else(|| DexError::new("invoke opcode out of range"))?,
                    regs,
                    res.method(MethodId(idx))?,
                ),
                0xfc => fail!("invoke-custom is not supported: no call-site pool"),
                _ => fail!("opcode 0x{:02x} has no 35c variant", opcode),
            }
        }

        Format::Format3rc => {
            let count = a8(cu);
            let idx = code[pc + 1] as u32;
            let first = code[pc + 2];
            match opcode {
                0x25 => FilledNewArrayRange(first, count, res.type_desc(TypeId(idx))?),
                0x74..=0x78 => InvokeRange(
                    InvokeKind::from_offset(opcode - 0x74)
                        .ok_or_else(|| DexError::new("invoke opcode out of range"))?,
                    first,
                    count,
                    res.method(MethodId(idx))?,
                ),
                0xfd => fail!("invoke-custom/range is not supported: no call-site pool"),
                _ => fail!("opcode 0x{:02x} has no 3rc variant", opcode),
            }
        }

        Format::Format45cc => {
            let regs = unpack_regs35(cu, code[pc + 2])?;
            let method = res.method(MethodId(code[pc + 1] as u32))?;
            let proto = res.proto(ProtoId(code[pc + 3] as u32))?;
            InvokePolymorphic(regs, method, proto)
        }

        Format::Format4rcc => {
            let count = a8(cu);
            let method = res.method(MethodId(code[pc + 1] as u32))?;
            let first = code[pc + 2];
            let proto = res.proto(ProtoId(code[pc + 3] as u32))?;
            InvokePolymorphicRange(first, count, method, proto)
        }

        Format::PackedSwitchPayload
        | Format::SparseSwitchPayload
        | Format::ArrayDataPayload => {
            fail!("payload format reached the scalar decoder")
        }
    };
    Ok(insn)
}

/// Unpack the up-to-five nibble registers of a 35c/45cc instruction.
fn unpack_regs35(first: u16, regs_cu: u16) -> Result<Vec<u8>, DexError> {
    let count = b4(first);
    if count > 5 {
        fail!("invalid register count {} in 35c-style instruction", count);
    }
    let g = a4(first);
    let c = (regs_cu & 0x000f) as u8;
    let d = ((regs_cu >> 4) & 0x0f) as u8;
    let e = ((regs_cu >> 8) & 0x0f) as u8;
    let f = ((regs_cu >> 12) & 0x0f) as u8;
    Ok([c, d, e, f, g].into_iter().take(count as usize).collect())
}

/// Encode raw-tier instructions into a code-unit stream. The opcode is
/// looked up by operation name; operands are packed per the format. The
/// encoder never reorders registers, so canonical operand order supplied by
/// the caller survives a round trip untouched.
pub fn encode_instructions(
    instructions: &[RawInstruction],
    res: &impl IndexResolver,
) -> Result<Vec<u16>, DexError> {
    let mut out = Vec::new();
    for insn in instructions {
        encode_one(insn, &mut out, res)
            .map_err(|e| e.context(format!("while encoding {}", insn.mnemonic())))?;
    }
    Ok(out)
}

fn nibble(reg: u8, mnemonic: &str) -> Result<u8, DexError> {
    if reg > 0x0f {
        fail!("register v{} does not fit the 4-bit field of {}", reg, mnemonic);
    }
    Ok(reg)
}

fn check_i8(v: i32, what: &str) -> Result<i8, DexError> {
    i8::try_from(v).map_err(|_| DexError::new(&format!("{} {} does not fit in 8 bits", what, v)))
}

fn check_i16(v: i32, what: &str) -> Result<i16, DexError> {
    i16::try_from(v).map_err(|_| DexError::new(&format!("{} {} does not fit in 16 bits", what, v)))
}

fn encode_one(
    insn: &RawInstruction,
    out: &mut Vec<u16>,
    res: &impl IndexResolver,
) -> Result<(), DexError> {
    use Instruction::*;
    let mnemonic = insn.mnemonic();
    let def = lookup_name(&mnemonic)
        .ok_or_else(|| DexError::new(&format!("operation {} is not in the opcode table", mnemonic)))?;
    let opcode = (def.value & 0xff) as u8;

    match insn {
        Nop | ReturnVoid => out.push(pack_a8(opcode, 0)),

        Move(a, b) | MoveWide(a, b) | MoveObject(a, b) | ArrayLength(a, b)
        | Unary(_, a, b) | Binary2Addr(_, a, b) => {
            out.push(pack_nibbles(opcode, nibble(*a, &mnemonic)?, nibble(*b, &mnemonic)?));
        }

        MoveFrom16(a, b) | MoveWideFrom16(a, b) | MoveObjectFrom16(a, b) => {
            out.push(pack_a8(opcode, *a));
            out.push(*b);
        }

        Move16(a, b) | MoveWide16(a, b) | MoveObject16(a, b) => {
            out.push(pack_a8(opcode, 0));
            out.push(*a);
            out.push(*b);
        }

        MoveResult(a) | MoveResultWide(a) | MoveResultObject(a) | MoveException(a)
        | Return(a) | ReturnWide(a) | ReturnObject(a) | MonitorEnter(a) | MonitorExit(a)
        | Throw(a) => out.push(pack_a8(opcode, *a)),

        Const4(a, lit) => {
            if *lit < -8 || *lit > 7 {
                fail!("literal {} does not fit const/4", lit);
            }
            out.push(pack_nibbles(opcode, nibble(*a, &mnemonic)?, (*lit as u8) & 0x0f));
        }

        Const16(a, lit) => {
            out.push(pack_a8(opcode, *a));
            out.push(check_i16(*lit, "literal")? as u16);
        }

        Const(a, lit) => {
            out.push(pack_a8(opcode, *a));
            out.push(lo16(*lit));
            out.push(hi16(*lit));
        }

        ConstHigh16(a, lit) => {
            if lit & 0xffff != 0 {
                fail!("const/high16 literal {:#x} has low bits set", lit);
            }
            out.push(pack_a8(opcode, *a));
            out.push((*lit >> 16) as u16);
        }

        ConstWide16(a, lit) => {
            let lit = i32::try_from(*lit)
                .ok()
                .and_then(|v| i16::try_from(v).ok())
                .ok_or_else(|| DexError::new("literal does not fit const-wide/16"))?;
            out.push(pack_a8(opcode, *a));
            out.push(lit as u16);
        }

        ConstWide32(a, lit) => {
            let lit = i32::try_from(*lit)
                .map_err(|_| DexError::new("literal does not fit const-wide/32"))?;
            out.push(pack_a8(opcode, *a));
            out.push(lo16(lit));
            out.push(hi16(lit));
        }

        ConstWide(a, lit) => {
            let bits = *lit as u64;
            out.push(pack_a8(opcode, *a));
            out.push(bits as u16);
            out.push((bits >> 16) as u16);
            out.push((bits >> 32) as u16);
            out.push((bits >> 48) as u16);
        }

        ConstWideHigh16(a, lit) => {
            if lit & 0x0000_ffff_ffff_ffff != 0 {
                fail!("const-wide/high16 literal {:#x} has low bits set", lit);
            }
            out.push(pack_a8(opcode, *a));
            out.push((*lit >> 48) as u16);
        }

        ConstString(a, s) => {
            let idx = res.string_index(s)?;
            out.push(pack_a8(opcode, *a));
            out.push(narrow_index(idx.0, &mnemonic)?);
        }

        ConstStringJumbo(a, s) => {
            let idx = res.string_index(s)?;
            out.push(pack_a8(opcode, *a));
            out.push(idx.0 as u16);
            out.push((idx.0 >> 16) as u16);
        }

        ConstClass(a, d) | CheckCast(a, d) | NewInstance(a, d) => {
            let idx = res.type_index(d)?;
            out.push(pack_a8(opcode, *a));
            out.push(narrow_index(idx.0, &mnemonic)?);
        }

        StaticOp(_, a, field) => {
            let idx = res.field_index(field)?;
            out.push(pack_a8(opcode, *a));
            out.push(narrow_index(idx.0, &mnemonic)?);
        }

        InstanceOf(a, b, d) | NewArray(a, b, d) => {
            let idx = res.type_index(d)?;
            out.push(pack_nibbles(opcode, nibble(*a, &mnemonic)?, nibble(*b, &mnemonic)?));
            out.push(narrow_index(idx.0, &mnemonic)?);
        }

        InstanceOp(_, a, b, field) => {
            let idx = res.field_index(field)?;
            out.push(pack_nibbles(opcode, nibble(*a, &mnemonic)?, nibble(*b, &mnemonic)?));
            out.push(narrow_index(idx.0, &mnemonic)?);
        }

        Compare(_, a, b, c) | ArrayOp(_, a, b, c) | Binary(_, a, b, c) => {
            out.push(pack_a8(opcode, *a));
            out.push((*b as u16) | ((*c as u16) << 8));
        }

        If(_, a, b, CodeUnitOffset(off)) => {
            out.push(pack_nibbles(opcode, nibble(*a, &mnemonic)?, nibble(*b, &mnemonic)?));
            out.push(check_i16(*off, "branch offset")? as u16);
        }

        IfZ(_, a, CodeUnitOffset(off)) => {
            out.push(pack_a8(opcode, *a));
            out.push(check_i16(*off, "branch offset")? as u16);
        }

        Goto(CodeUnitOffset(off)) => {
            out.push(pack_a8(opcode, check_i8(*off, "branch offset")? as u8));
        }

        Goto16(CodeUnitOffset(off)) => {
            out.push(pack_a8(opcode, 0));
            out.push(check_i16(*off, "branch offset")? as u16);
        }

        Goto32(CodeUnitOffset(off)) => {
            out.push(pack_a8(opcode, 0));
            out.push(lo16(*off));
            out.push(hi16(*off));
        }

        FillArrayData(a, CodeUnitOffset(off))
        | PackedSwitch(a, CodeUnitOffset(off))
        | SparseSwitch(a, CodeUnitOffset(off)) => {
            out.push(pack_a8(opcode, *a));
            out.push(lo16(*off));
            out.push(hi16(*off));
        }

        BinaryLit16(_, a, b, lit) => {
            out.push(pack_nibbles(opcode, nibble(*a, &mnemonic)?, nibble(*b, &mnemonic)?));
            out.push(*lit as u16);
        }

        BinaryLit8(_, a, b, lit) => {
            out.push(pack_a8(opcode, *a));
            out.push((*b as u16) | ((*lit as u8 as u16) << 8));
        }

        FilledNewArray(regs, d) => {
            let idx = res.type_index(d)?;
            encode_35c(opcode, regs, narrow_index(idx.0, &mnemonic)?, &mnemonic, out)?;
        }

        Invoke(_, regs, method) => {
            let idx = res.method_index(method)?;
            encode_35c(opcode, regs, narrow_index(idx.0, &mnemonic)?, &mnemonic, out)?;
        }

        FilledNewArrayRange(first, count, d) => {
            let idx = res.type_index(d)?;
            out.push(pack_a8(opcode, *count));
            out.push(narrow_index(idx.0, &mnemonic)?);
            out.push(*first);
        }

        InvokeRange(_, first, count, method) => {
            let idx = res.method_index(method)?;
            out.push(pack_a8(opcode, *count));
            out.push(narrow_index(idx.0, &mnemonic)?);
            out.push(*first);
        }

        InvokePolymorphic(regs, method, proto) => {
            let midx = res.method_index(method)?;
            let pidx = res.proto_index(proto)?;
            encode_35c(opcode, regs, narrow_index(midx.0, &mnemonic)?, &mnemonic, out)?;
            out.push(narrow_index(pidx.0, &mnemonic)?);
        }

        InvokePolymorphicRange(first, count, method, proto) => {
            let midx = res.method_index(method)?;
            let pidx = res.proto_index(proto)?;
            out.push(pack_a8(opcode, *count));
            out.push(narrow_index(midx.0, &mnemonic)?);
            out.push(*first);
            out.push(narrow_index(pidx.0, &mnemonic)?);
        }

        PackedSwitchPayload { first_key, targets } => {
            out.push(0x0100);
            out.push(targets.len() as u16);
            out.push(lo16(*first_key));
            out.push(hi16(*first_key));
            for CodeUnitOffset(t) in targets {
                out.push(lo16(*t));
                out.push(hi16(*t));
            }
        }

        SparseSwitchPayload { keys, targets } => {
            if keys.len() != targets.len() {
                fail!(
                    "sparse-switch payload has {} keys but {} targets",
                    keys.len(),
                    targets.len()
                );
            }
            out.push(0x0200);
            out.push(keys.len() as u16);
            for k in keys {
                out.push(lo16(*k));
                out.push(hi16(*k));
            }
            for CodeUnitOffset(t) in targets {
                out.push(lo16(*t));
                out.push(hi16(*t));
            }
        }

        ArrayDataPayload { element_width, data } => {
            if *element_width == 0 || data.len() % *element_width as usize != 0 {
                fail!(
                    "array-data payload of {} bytes is not a multiple of its element width {}",
                    data.len(),
                    element_width
                );
            }
            let count = (data.len() / *element_width as usize) as u32;
            out.push(0x0300);
            out.push(*element_width);
            out.push(count as u16);
            out.push((count >> 16) as u16);
            let mut iter = data.chunks(2);
            for chunk in &mut iter {
                let lo = chunk[0] as u16;
                let hi = if chunk.len() > 1 { chunk[1] as u16 } else { 0 };
                out.push(lo | (hi << 8));
            }
        }
    }
    Ok(())
}

fn narrow_index(idx: u32, mnemonic: &str) -> Result<u16, DexError> {
    u16::try_from(idx)
        .map_err(|_| DexError::new(&format!("pool index {} does not fit the 16-bit field of {}", idx, mnemonic)))
}

fn encode_35c(
    opcode: u8,
    regs: &[u8],
    idx: u16,
    mnemonic: &str,
    out: &mut Vec<u16>,
) -> Result<(), DexError> {
    if regs.len() > 5 {
        fail!("{} takes at most 5 registers, got {}", mnemonic, regs.len());
    }
    let mut packed = [0u8; 5];
    for (slot, reg) in packed.iter_mut().zip(regs.iter()) {
        *slot = nibble(*reg, mnemonic)?;
    }
    let g = packed[4];
    out.push(
        (opcode as u16) | ((g as u16) << 8) | ((regs.len() as u16) << 12),
    );
    out.push(idx);
    out.push(
        (packed[0] as u16)
            | ((packed[1] as u16) << 4)
            | ((packed[2] as u16) << 8)
            | ((packed[3] as u16) << 12),
    );
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Resolver backed by fixed tables, for codec tests.
    #[derive(Default)]
    pub struct TableResolver {
        pub strings: Vec<String>,
        pub types: Vec<String>,
        pub fields: Vec<FieldRef>,
        pub methods: Vec<MethodRef>,
        pub protos: Vec<Prototype>,
    }

    impl RefResolver for TableResolver {
        fn string(&self, idx: StringId) -> Result<String, DexError> {
            self.strings
                .get(idx.index())
                .cloned()
                .ok_or_else(|| DexError::new(&format!("{} out of bounds", idx)))
        }
        fn type_desc(&self, idx: TypeId) -> Result<String, DexError> {
            self.types
                .get(idx.index())
                .cloned()
                .ok_or_else(|| DexError::new(&format!("{} out of bounds", idx)))
        }
        fn field(&self, idx: FieldId) -> Result<FieldRef, DexError> {
            self.fields
                .get(idx.index())
                .cloned()
                .ok_or_else(|| DexError::new(&format!("{} out of bounds", idx)))
        }
        fn method(&self, idx: MethodId) -> Result<MethodRef, DexError> {
            self.methods
                .get(idx.index())
                .cloned()
                .ok_or_else(|| DexError::new(&format!("{} out of bounds", idx)))
        }
        fn proto(&self, idx: ProtoId) -> Result<Prototype, DexError> {
            self.protos
                .get(idx.index())
                .cloned()
                .ok_or_else(|| DexError::new(&format!("{} out of bounds", idx)))
        }
    }

    impl IndexResolver for TableResolver {
        fn string_index(&self, value: &str) -> Result<StringId, DexError> {
            self.strings
                .iter()
                .position(|s| s == value)
                .map(|i| StringId(i as u32))
                .ok_or_else(|| DexError::new("string was never pooled"))
        }
        fn type_index(&self, descriptor: &str) -> Result<TypeId, DexError> {
            self.types
                .iter()
                .position(|s| s == descriptor)
                .map(|i| TypeId(i as u32))
                .ok_or_else(|| DexError::new("type was never pooled"))
        }
        fn field_index(&self, field: &FieldRef) -> Result<FieldId, DexError> {
            self.fields
                .iter()
                .position(|f| f == field)
                .map(|i| FieldId(i as u32))
                .ok_or_else(|| DexError::new("field was never pooled"))
        }
        fn method_index(&self, method: &MethodRef) -> Result<MethodId, DexError> {
            self.methods
                .iter()
                .position(|m| m == method)
                .map(|i| MethodId(i as u32))
                .ok_or_else(|| DexError::new("method was never pooled"))
        }
        fn proto_index(&self, proto: &Prototype) -> Result<ProtoId, DexError> {
            self.protos
                .iter()
                .position(|p| p == proto)
                .map(|i| ProtoId(i as u32))
                .ok_or_else(|| DexError::new("proto was never pooled"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::TableResolver;
    use super::*;

    fn sample_resolver() -> TableResolver {
        TableResolver {
            strings: vec!["hello".to_string(), "world".to_string()],
            types: vec!["Ljava/lang/String;".to_string(), "[I".to_string()],
            fields: vec![FieldRef {
                class: "Lcom/example/Foo;".to_string(),
                name: "bar".to_string(),
                descriptor: "I".to_string(),
            }],
            methods: vec![MethodRef {
                class: "Lcom/example/Foo;".to_string(),
                name: "run".to_string(),
                prototype: Prototype::new("V", vec![]),
            }],
            protos: vec![Prototype::new("V", vec![])],
        }
    }

    fn roundtrip(insns: Vec<Instruction<CodeUnitOffset>>) {
        let res = sample_resolver();
        let code = encode_instructions(&insns, &res).expect("encode");
        let back = decode_instructions(&code, &res).expect("decode");
        assert_eq!(insns, back);
    }

    #[test]
    fn nibble_pair_layout_is_exact() {
        // move v3, v12 -> low nibble A, high nibble B over the opcode byte
        let res = sample_resolver();
        let code = encode_instructions(&[Instruction::Move(3, 12)], &res).unwrap();
        assert_eq!(code, vec![0xc301]);
    }

    #[test]
    fn const4_packs_signed_nibble() {
        let res = sample_resolver();
        let code = encode_instructions(&[Instruction::Const4(2, -1)], &res).unwrap();
        assert_eq!(code, vec![0xf212]);
        let back = decode_instructions(&code, &res).unwrap();
        assert_eq!(back, vec![Instruction::Const4(2, -1)]);
    }

    #[test]
    fn roundtrip_every_scalar_format() {
        roundtrip(vec![
            Instruction::Nop,
            Instruction::Move(1, 2),
            Instruction::MoveFrom16(3, 300),
            Instruction::Move16(256, 257),
            Instruction::MoveResult(9),
            Instruction::Const4(0, -8),
            Instruction::Const16(1, -32768),
            Instruction::Const(2, 0x12345678),
            Instruction::ConstHigh16(3, 0x7fff_0000u32 as i32),
            Instruction::ConstWide16(4, -2),
            Instruction::ConstWide32(5, -70000),
            Instruction::ConstWide(6, i64::MIN),
            Instruction::ConstWideHigh16(7, 0x1234 << 48),
            Instruction::ConstString(0, "hello".to_string()),
            Instruction::ConstStringJumbo(0, "world".to_string()),
            Instruction::ConstClass(1, "Ljava/lang/String;".to_string()),
            Instruction::MonitorEnter(1),
            Instruction::CheckCast(1, "Ljava/lang/String;".to_string()),
            Instruction::InstanceOf(1, 2, "[I".to_string()),
            Instruction::ArrayLength(1, 2),
            Instruction::NewInstance(3, "Ljava/lang/String;".to_string()),
            Instruction::NewArray(1, 2, "[I".to_string()),
            Instruction::FilledNewArray(vec![1, 2, 3], "[I".to_string()),
            Instruction::FilledNewArrayRange(10, 4, "[I".to_string()),
            Instruction::Throw(0),
            Instruction::Compare(CompareKind::Long, 1, 2, 3),
            Instruction::ArrayOp(AccessKind::PutShort, 1, 2, 3),
            Instruction::InstanceOp(
                AccessKind::Get,
                1,
                2,
                sample_resolver().fields[0].clone(),
            ),
            Instruction::StaticOp(AccessKind::PutObject, 1, sample_resolver().fields[0].clone()),
            Instruction::Invoke(
                InvokeKind::Static,
                vec![0],
                sample_resolver().methods[0].clone(),
            ),
            Instruction::InvokeRange(
                InvokeKind::Virtual,
                16,
                3,
                sample_resolver().methods[0].clone(),
            ),
            Instruction::Unary(UnaryOp::IntToShort, 1, 2),
            Instruction::Binary(BinaryOp::RemDouble, 1, 2, 3),
            Instruction::Binary2Addr(BinaryOp::XorInt, 1, 2),
            Instruction::BinaryLit16(BinaryOp::SubInt, 1, 2, -100),
            Instruction::BinaryLit8(BinaryOp::UshrInt, 1, 2, 31),
            Instruction::InvokePolymorphic(
                vec![0, 1],
                sample_resolver().methods[0].clone(),
                sample_resolver().protos[0].clone(),
            ),
            Instruction::InvokePolymorphicRange(
                5,
                2,
                sample_resolver().methods[0].clone(),
                sample_resolver().protos[0].clone(),
            ),
            Instruction::ReturnVoid,
        ]);
    }

    #[test]
    fn roundtrip_branches_and_payloads() {
        // packed payload sits at code unit 12, sparse at 20
        roundtrip(vec![
            Instruction::PackedSwitch(0, CodeUnitOffset(12)),
            Instruction::SparseSwitch(0, CodeUnitOffset(17)),
            Instruction::Goto(CodeUnitOffset(-6)),
            Instruction::Goto16(CodeUnitOffset(2)),
            Instruction::IfZ(TestKind::LessThan, 3, CodeUnitOffset(-4)),
            Instruction::ReturnVoid,
            Instruction::PackedSwitchPayload {
                first_key: -1,
                targets: vec![CodeUnitOffset(3), CodeUnitOffset(5)],
            },
            Instruction::SparseSwitchPayload {
                keys: vec![-10, 400],
                targets: vec![CodeUnitOffset(3), CodeUnitOffset(5)],
            },
        ]);
    }

    #[test]
    fn roundtrip_array_payload_odd_byte_count() {
        roundtrip(vec![
            Instruction::FillArrayData(0, CodeUnitOffset(4)),
            Instruction::Nop,
            Instruction::ArrayDataPayload { element_width: 1, data: vec![1, 2, 3] },
        ]);
    }

    #[test]
    fn unknown_opcode_is_fatal() {
        let res = sample_resolver();
        // 0x3e is a gap in the table
        let err = decode_instructions(&[0x003e], &res).unwrap_err();
        assert!(err.to_string().contains("unknown opcode"));
    }

    #[test]
    fn unreferenced_payload_ident_is_fatal() {
        let res = sample_resolver();
        let err = decode_instructions(&[0x0100, 0x0000, 0x0000, 0x0000], &res).unwrap_err();
        assert!(err.to_string().contains("no referencing instruction"));
    }

    #[test]
    fn oversized_nibble_register_rejected() {
        let res = sample_resolver();
        let err = encode_instructions(&[Instruction::Move(16, 0)], &res).unwrap_err();
        assert!(err.to_string().contains("4-bit"));
    }

    #[test]
    fn unsupported_call_site_ops_are_fatal() {
        let res = sample_resolver();
        // invoke-custom {}, call_site@0
        let err = decode_instructions(&[0x00fc, 0x0000, 0x0000], &res).unwrap_err();
        assert!(err.to_string().contains("invoke-custom"));
        // const-method-handle v0, handle@0
        let err = decode_instructions(&[0x00fe, 0x0000], &res).unwrap_err();
        assert!(err.to_string().contains("const-method-handle"));
    }
}
