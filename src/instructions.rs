//! Representation of the Dalvik bytecodes.
//!
//! [`Instruction`] is a tagged union keyed by operation: each variant carries
//! exactly the operand fields its format needs. Families that share a layout
//! (the compares, tests, array/field accessors, invokes, unary and binary
//! arithmetic) are collapsed into one variant with a kind discriminant, so
//! the ~200 operations fit in a match a human can read.
//!
//! The type parameter `T` is the branch-offset tier: [`CodeUnitOffset`] as
//! decoded from disk, [`RelativeOffset`] after raw offsets are mapped to
//! instruction-relative form, [`InsnIndex`] in the absolute (public) tier.
//! A sequence is always in exactly one tier; moving between them goes
//! through the conversions in [`crate::offsets`], never a cast.

use crate::formats::Format;
use crate::model::{FieldRef, MethodRef, Prototype};
use serde::{Deserialize, Serialize};
use std::fmt;

pub use crate::offsets::{CodeUnitOffset, InsnIndex, RelativeOffset};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Instruction<T> {
    Nop,
    Move(u8, u8),
    MoveFrom16(u8, u16),
    Move16(u16, u16),
    MoveWide(u8, u8),
    MoveWideFrom16(u8, u16),
    MoveWide16(u16, u16),
    MoveObject(u8, u8),
    MoveObjectFrom16(u8, u16),
    MoveObject16(u16, u16),
    MoveResult(u8),
    MoveResultWide(u8),
    MoveResultObject(u8),
    MoveException(u8),
    ReturnVoid,
    Return(u8),
    ReturnWide(u8),
    ReturnObject(u8),
    Const4(u8, i32),
    Const16(u8, i32),
    Const(u8, i32),
    ConstHigh16(u8, i32),
    ConstWide16(u8, i64),
    ConstWide32(u8, i64),
    ConstWide(u8, i64),
    ConstWideHigh16(u8, i64),
    ConstString(u8, String),
    ConstStringJumbo(u8, String),
    ConstClass(u8, String),
    MonitorEnter(u8),
    MonitorExit(u8),
    CheckCast(u8, String),
    InstanceOf(u8, u8, String),
    ArrayLength(u8, u8),
    NewInstance(u8, String),
    NewArray(u8, u8, String),
    FilledNewArray(Vec<u8>, String),
    FilledNewArrayRange(u16, u8, String),
    FillArrayData(u8, T),
    Throw(u8),
    Goto(T),
    Goto16(T),
    Goto32(T),
    PackedSwitch(u8, T),
    SparseSwitch(u8, T),
    Compare(CompareKind, u8, u8, u8),
    If(TestKind, u8, u8, T),
    IfZ(TestKind, u8, T),
    ArrayOp(AccessKind, u8, u8, u8),
    InstanceOp(AccessKind, u8, u8, FieldRef),
    StaticOp(AccessKind, u8, FieldRef),
    Invoke(InvokeKind, Vec<u8>, MethodRef),
    InvokeRange(InvokeKind, u16, u8, MethodRef),
    Unary(UnaryOp, u8, u8),
    Binary(BinaryOp, u8, u8, u8),
    Binary2Addr(BinaryOp, u8, u8),
    BinaryLit16(BinaryOp, u8, u8, i16),
    BinaryLit8(BinaryOp, u8, u8, i8),
    InvokePolymorphic(Vec<u8>, MethodRef, Prototype),
    InvokePolymorphicRange(u16, u8, MethodRef, Prototype),
    PackedSwitchPayload { first_key: i32, targets: Vec<T> },
    SparseSwitchPayload { keys: Vec<i32>, targets: Vec<T> },
    ArrayDataPayload { element_width: u16, data: Vec<u8> },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareKind {
    LessThanFloat,
    GreaterThanFloat,
    LessThanDouble,
    GreaterThanDouble,
    Long,
}

impl CompareKind {
    pub(crate) fn from_offset(off: u8) -> Option<Self> {
        Some(match off {
            0 => Self::LessThanFloat,
            1 => Self::GreaterThanFloat,
            2 => Self::LessThanDouble,
            3 => Self::GreaterThanDouble,
            4 => Self::Long,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::LessThanFloat => "cmpl-float",
            Self::GreaterThanFloat => "cmpg-float",
            Self::LessThanDouble => "cmpl-double",
            Self::GreaterThanDouble => "cmpg-double",
            Self::Long => "cmp-long",
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestKind {
    Equal,
    NotEqual,
    LessThan,
    GreaterThanOrEqual,
    GreaterThan,
    LessThanOrEqual,
}

impl TestKind {
    pub(crate) fn from_offset(off: u8) -> Option<Self> {
        Some(match off {
            0 => Self::Equal,
            1 => Self::NotEqual,
            2 => Self::LessThan,
            3 => Self::GreaterThanOrEqual,
            4 => Self::GreaterThan,
            5 => Self::LessThanOrEqual,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Equal => "if-eq",
            Self::NotEqual => "if-ne",
            Self::LessThan => "if-lt",
            Self::GreaterThanOrEqual => "if-ge",
            Self::GreaterThan => "if-gt",
            Self::LessThanOrEqual => "if-le",
        }
    }

    pub fn zero_name(&self) -> &'static str {
        match self {
            Self::Equal => "if-eqz",
            Self::NotEqual => "if-nez",
            Self::LessThan => "if-ltz",
            Self::GreaterThanOrEqual => "if-gez",
            Self::GreaterThan => "if-gtz",
            Self::LessThanOrEqual => "if-lez",
        }
    }
}

/// The seven-typed get/put family shared by array (`aget`/`aput`), instance
/// (`iget`/`iput`) and static (`sget`/`sput`) accessors; all three opcode
/// blocks use the same fourteen-slot layout.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessKind {
    Get,
    GetWide,
    GetObject,
    GetBoolean,
    GetByte,
    GetChar,
    GetShort,
    Put,
    PutWide,
    PutObject,
    PutBoolean,
    PutByte,
    PutChar,
    PutShort,
}

impl AccessKind {
    pub(crate) fn from_offset(off: u8) -> Option<Self> {
        Some(match off {
            0 => Self::Get,
            1 => Self::GetWide,
            2 => Self::GetObject,
            3 => Self::GetBoolean,
            4 => Self::GetByte,
            5 => Self::GetChar,
            6 => Self::GetShort,
            7 => Self::Put,
            8 => Self::PutWide,
            9 => Self::PutObject,
            10 => Self::PutBoolean,
            11 => Self::PutByte,
            12 => Self::PutChar,
            13 => Self::PutShort,
            _ => return None,
        })
    }

    fn suffix(&self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::GetWide => "get-wide",
            Self::GetObject => "get-object",
            Self::GetBoolean => "get-boolean",
            Self::GetByte => "get-byte",
            Self::GetChar => "get-char",
            Self::GetShort => "get-short",
            Self::Put => "put",
            Self::PutWide => "put-wide",
            Self::PutObject => "put-object",
            Self::PutBoolean => "put-boolean",
            Self::PutByte => "put-byte",
            Self::PutChar => "put-char",
            Self::PutShort => "put-short",
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvokeKind {
    Virtual,
    Super,
    Direct,
    Static,
    Interface,
}

impl InvokeKind {
    pub(crate) fn from_offset(off: u8) -> Option<Self> {
        Some(match off {
            0 => Self::Virtual,
            1 => Self::Super,
            2 => Self::Direct,
            3 => Self::Static,
            4 => Self::Interface,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Virtual => "invoke-virtual",
            Self::Super => "invoke-super",
            Self::Direct => "invoke-direct",
            Self::Static => "invoke-static",
            Self::Interface => "invoke-interface",
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    NegInt,
    NotInt,
    NegLong,
    NotLong,
    NegFloat,
    NegDouble,
    IntToLong,
    IntToFloat,
    IntToDouble,
    LongToInt,
    LongToFloat,
    LongToDouble,
    FloatToInt,
    FloatToLong,
    FloatToDouble,
    DoubleToInt,
    DoubleToLong,
    DoubleToFloat,
    IntToByte,
    IntToChar,
    IntToShort,
}

impl UnaryOp {
    pub(crate) fn from_offset(off: u8) -> Option<Self> {
        use UnaryOp::*;
        const ALL: [UnaryOp; 21] = [
            NegInt, NotInt, NegLong, NotLong, NegFloat, NegDouble, IntToLong, IntToFloat,
            IntToDouble, LongToInt, LongToFloat, LongToDouble, FloatToInt, FloatToLong,
            FloatToDouble, DoubleToInt, DoubleToLong, DoubleToFloat, IntToByte, IntToChar,
            IntToShort,
        ];
        ALL.get(off as usize).copied()
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::NegInt => "neg-int",
            Self::NotInt => "not-int",
            Self::NegLong => "neg-long",
            Self::NotLong => "not-long",
            Self::NegFloat => "neg-float",
            Self::NegDouble => "neg-double",
            Self::IntToLong => "int-to-long",
            Self::IntToFloat => "int-to-float",
            Self::IntToDouble => "int-to-double",
            Self::LongToInt => "long-to-int",
            Self::LongToFloat => "long-to-float",
            Self::LongToDouble => "long-to-double",
            Self::FloatToInt => "float-to-int",
            Self::FloatToLong => "float-to-long",
            Self::FloatToDouble => "float-to-double",
            Self::DoubleToInt => "double-to-int",
            Self::DoubleToLong => "double-to-long",
            Self::DoubleToFloat => "double-to-float",
            Self::IntToByte => "int-to-byte",
            Self::IntToChar => "int-to-char",
            Self::IntToShort => "int-to-short",
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    AddInt,
    SubInt,
    MulInt,
    DivInt,
    RemInt,
    AndInt,
    OrInt,
    XorInt,
    ShlInt,
    ShrInt,
    UshrInt,
    AddLong,
    SubLong,
    MulLong,
    DivLong,
    RemLong,
    AndLong,
    OrLong,
    XorLong,
    ShlLong,
    ShrLong,
    UshrLong,
    AddFloat,
    SubFloat,
    MulFloat,
    DivFloat,
    RemFloat,
    AddDouble,
    SubDouble,
    MulDouble,
    DivDouble,
    RemDouble,
}

impl BinaryOp {
    pub(crate) fn from_offset(off: u8) -> Option<Self> {
        use BinaryOp::*;
        const ALL: [BinaryOp; 32] = [
            AddInt, SubInt, MulInt, DivInt, RemInt, AndInt, OrInt, XorInt, ShlInt, ShrInt,
            UshrInt, AddLong, SubLong, MulLong, DivLong, RemLong, AndLong, OrLong, XorLong,
            ShlLong, ShrLong, UshrLong, AddFloat, SubFloat, MulFloat, DivFloat, RemFloat,
            AddDouble, SubDouble, MulDouble, DivDouble, RemDouble,
        ];
        ALL.get(off as usize).copied()
    }

    /// The literal families only cover the int subset: add, rsub, mul, div,
    /// rem, and, or, xor (lit16 and lit8) plus shl, shr, ushr (lit8 only).
    pub(crate) fn from_lit_offset(off: u8) -> Option<Self> {
        use BinaryOp::*;
        const LIT: [BinaryOp; 11] = [
            AddInt, SubInt, MulInt, DivInt, RemInt, AndInt, OrInt, XorInt, ShlInt, ShrInt,
            UshrInt,
        ];
        LIT.get(off as usize).copied()
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::AddInt => "add-int",
            Self::SubInt => "sub-int",
            Self::MulInt => "mul-int",
            Self::DivInt => "div-int",
            Self::RemInt => "rem-int",
            Self::AndInt => "and-int",
            Self::OrInt => "or-int",
            Self::XorInt => "xor-int",
            Self::ShlInt => "shl-int",
            Self::ShrInt => "shr-int",
            Self::UshrInt => "ushr-int",
            Self::AddLong => "add-long",
            Self::SubLong => "sub-long",
            Self::MulLong => "mul-long",
            Self::DivLong => "div-long",
            Self::RemLong => "rem-long",
            Self::AndLong => "and-long",
            Self::OrLong => "or-long",
            Self::XorLong => "xor-long",
            Self::ShlLong => "shl-long",
            Self::ShrLong => "shr-long",
            Self::UshrLong => "ushr-long",
            Self::AddFloat => "add-float",
            Self::SubFloat => "sub-float",
            Self::MulFloat => "mul-float",
            Self::DivFloat => "div-float",
            Self::RemFloat => "rem-float",
            Self::AddDouble => "add-double",
            Self::SubDouble => "sub-double",
            Self::MulDouble => "mul-double",
            Self::DivDouble => "div-double",
            Self::RemDouble => "rem-double",
        }
    }
}

impl<T> Instruction<T> {
    /// The byte layout this operation is encoded with.
    pub fn format(&self) -> Format {
        use Instruction::*;
        match self {
            Nop | ReturnVoid => Format::Format10x,
            Move(..) | MoveWide(..) | MoveObject(..) | ArrayLength(..) | Unary(..)
            | Binary2Addr(..) => Format::Format12x,
            MoveFrom16(..) | MoveWideFrom16(..) | MoveObjectFrom16(..) => Format::Format22x,
            Move16(..) | MoveWide16(..) | MoveObject16(..) => Format::Format32x,
            MoveResult(..) | MoveResultWide(..) | MoveResultObject(..) | MoveException(..)
            | Return(..) | ReturnWide(..) | ReturnObject(..) | MonitorEnter(..)
            | MonitorExit(..) | Throw(..) => Format::Format11x,
            Const4(..) => Format::Format11n,
            Const16(..) | ConstWide16(..) => Format::Format21s,
            Const(..) | ConstWide32(..) => Format::Format31i,
            ConstHigh16(..) => Format::Format21ih,
            ConstWide(..) => Format::Format51l,
            ConstWideHigh16(..) => Format::Format21lh,
            ConstString(..) | ConstClass(..) | NewInstance(..) | CheckCast(..)
            | StaticOp(..) => Format::Format21c,
            ConstStringJumbo(..) => Format::Format31c,
            InstanceOf(..) | NewArray(..) | InstanceOp(..) => Format::Format22c,
            FilledNewArray(..) | Invoke(..) => Format::Format35c,
            FilledNewArrayRange(..) | InvokeRange(..) => Format::Format3rc,
            FillArrayData(..) | PackedSwitch(..) | SparseSwitch(..) => Format::Format31t,
            Goto(..) => Format::Format10t,
            Goto16(..) => Format::Format20t,
            Goto32(..) => Format::Format30t,
            Compare(..) | ArrayOp(..) | Binary(..) => Format::Format23x,
            If(..) => Format::Format22t,
            IfZ(..) => Format::Format21t,
            BinaryLit16(..) => Format::Format22s,
            BinaryLit8(..) => Format::Format22b,
            InvokePolymorphic(..) => Format::Format45cc,
            InvokePolymorphicRange(..) => Format::Format4rcc,
            PackedSwitchPayload { .. } => Format::PackedSwitchPayload,
            SparseSwitchPayload { .. } => Format::SparseSwitchPayload,
            ArrayDataPayload { .. } => Format::ArrayDataPayload,
        }
    }

    /// Size of this instruction in 16-bit code units. Payload sizes are
    /// computed from their counts; everything else is fixed by the format.
    pub fn code_units(&self) -> usize {
        match self {
            Instruction::PackedSwitchPayload { targets, .. } => 4 + targets.len() * 2,
            Instruction::SparseSwitchPayload { keys, .. } => 2 + keys.len() * 4,
            Instruction::ArrayDataPayload { data, .. } => 4 + (data.len() + 1) / 2,
            other => other
                .format()
                .code_units()
                .expect("non-payload formats have a fixed size"),
        }
    }

    pub fn is_payload(&self) -> bool {
        self.format().is_payload()
    }

    /// The operation name, as listed in the opcode table. Family variants
    /// compose the name from their kind discriminant.
    pub fn mnemonic(&self) -> String {
        use Instruction::*;
        match self {
            Nop => "nop".to_string(),
            Move(..) => "move".to_string(),
            MoveFrom16(..) => "move/from16".to_string(),
            Move16(..) => "move/16".to_string(),
            MoveWide(..) => "move-wide".to_string(),
            MoveWideFrom16(..) => "move-wide/from16".to_string(),
            MoveWide16(..) => "move-wide/16".to_string(),
            MoveObject(..) => "move-object".to_string(),
            MoveObjectFrom16(..) => "move-object/from16".to_string(),
            MoveObject16(..) => "move-object/16".to_string(),
            MoveResult(..) => "move-result".to_string(),
            MoveResultWide(..) => "move-result-wide".to_string(),
            MoveResultObject(..) => "move-result-object".to_string(),
            MoveException(..) => "move-exception".to_string(),
            ReturnVoid => "return-void".to_string(),
            Return(..) => "return".to_string(),
            ReturnWide(..) => "return-wide".to_string(),
            ReturnObject(..) => "return-object".to_string(),
            Const4(..) => "const/4".to_string(),
            Const16(..) => "const/16".to_string(),
            Const(..) => "const".to_string(),
            ConstHigh16(..) => "const/high16".to_string(),
            ConstWide16(..) => "const-wide/16".to_string(),
            ConstWide32(..) => "const-wide/32".to_string(),
            ConstWide(..) => "const-wide".to_string(),
            ConstWideHigh16(..) => "const-wide/high16".to_string(),
            ConstString(..) => "const-string".to_string(),
            ConstStringJumbo(..) => "const-string/jumbo".to_string(),
            ConstClass(..) => "const-class".to_string(),
            MonitorEnter(..) => "monitor-enter".to_string(),
            MonitorExit(..) => "monitor-exit".to_string(),
            CheckCast(..) => "check-cast".to_string(),
            InstanceOf(..) => "instance-of".to_string(),
            ArrayLength(..) => "array-length".to_string(),
            NewInstance(..) => "new-instance".to_string(),
            NewArray(..) => "new-array".to_string(),
            FilledNewArray(..) => "filled-new-array".to_string(),
            FilledNewArrayRange(..) => "filled-new-array/range".to_string(),
            FillArrayData(..) => "fill-array-data".to_string(),
            Throw(..) => "throw".to_string(),
            Goto(..) => "goto".to_string(),
            Goto16(..) => "goto/16".to_string(),
            Goto32(..) => "goto/32".to_string(),
            PackedSwitch(..) => "packed-switch".to_string(),
            SparseSwitch(..) => "sparse-switch".to_string(),
            Compare(kind, ..) => kind.name().to_string(),
            If(kind, ..) => kind.name().to_string(),
            IfZ(kind, ..) => kind.zero_name().to_string(),
            ArrayOp(kind, ..) => format!("a{}", kind.suffix()),
            InstanceOp(kind, ..) => format!("i{}", kind.suffix()),
            StaticOp(kind, ..) => format!("s{}", kind.suffix()),
            Invoke(kind, ..) => kind.name().to_string(),
            InvokeRange(kind, ..) => format!("{}/range", kind.name()),
            Unary(op, ..) => op.name().to_string(),
            Binary(op, ..) => op.name().to_string(),
            Binary2Addr(op, ..) => format!("{}/2addr", op.name()),
            BinaryLit16(op, ..) => match op {
                BinaryOp::SubInt => "rsub-int".to_string(),
                other => format!("{}/lit16", other.name()),
            },
            BinaryLit8(op, ..) => match op {
                BinaryOp::SubInt => "rsub-int/lit8".to_string(),
                other => format!("{}/lit8", other.name()),
            },
            InvokePolymorphic(..) => "invoke-polymorphic".to_string(),
            InvokePolymorphicRange(..) => "invoke-polymorphic/range".to_string(),
            PackedSwitchPayload { .. } => "packed-switch-payload".to_string(),
            SparseSwitchPayload { .. } => "sparse-switch-payload".to_string(),
            ArrayDataPayload { .. } => "array-data-payload".to_string(),
        }
    }

    /// Rewrite every branch-target operand with `f`, converting the sequence
    /// into another coordinate tier. All other operands pass through as-is.
    pub fn map_targets<U, E>(
        self,
        mut f: impl FnMut(T) -> Result<U, E>,
    ) -> Result<Instruction<U>, E> {
        use Instruction::*;
        Ok(match self {
            FillArrayData(reg, t) => FillArrayData(reg, f(t)?),
            Goto(t) => Goto(f(t)?),
            Goto16(t) => Goto16(f(t)?),
            Goto32(t) => Goto32(f(t)?),
            PackedSwitch(reg, t) => PackedSwitch(reg, f(t)?),
            SparseSwitch(reg, t) => SparseSwitch(reg, f(t)?),
            If(kind, a, b, t) => If(kind, a, b, f(t)?),
            IfZ(kind, a, t) => IfZ(kind, a, f(t)?),
            PackedSwitchPayload { first_key, targets } => PackedSwitchPayload {
                first_key,
                targets: targets.into_iter().map(&mut f).collect::<Result<_, E>>()?,
            },
            SparseSwitchPayload { keys, targets } => SparseSwitchPayload {
                keys,
                targets: targets.into_iter().map(&mut f).collect::<Result<_, E>>()?,
            },

            Nop => Nop,
            Move(a, b) => Move(a, b),
            MoveFrom16(a, b) => MoveFrom16(a, b),
            Move16(a, b) => Move16(a, b),
            MoveWide(a, b) => MoveWide(a, b),
            MoveWideFrom16(a, b) => MoveWideFrom16(a, b),
            MoveWide16(a, b) => MoveWide16(a, b),
            MoveObject(a, b) => MoveObject(a, b),
            MoveObjectFrom16(a, b) => MoveObjectFrom16(a, b),
            MoveObject16(a, b) => MoveObject16(a, b),
            MoveResult(a) => MoveResult(a),
            MoveResultWide(a) => MoveResultWide(a),
            MoveResultObject(a) => MoveResultObject(a),
            MoveException(a) => MoveException(a),
            ReturnVoid => ReturnVoid,
            Return(a) => Return(a),
            ReturnWide(a) => ReturnWide(a),
            ReturnObject(a) => ReturnObject(a),
            Const4(a, l) => Const4(a, l),
            Const16(a, l) => Const16(a, l),
            Const(a, l) => Const(a, l),
            ConstHigh16(a, l) => ConstHigh16(a, l),
            ConstWide16(a, l) => ConstWide16(a, l),
            ConstWide32(a, l) => ConstWide32(a, l),
            ConstWide(a, l) => ConstWide(a, l),
            ConstWideHigh16(a, l) => ConstWideHigh16(a, l),
            ConstString(a, s) => ConstString(a, s),
            ConstStringJumbo(a, s) => ConstStringJumbo(a, s),
            ConstClass(a, d) => ConstClass(a, d),
            MonitorEnter(a) => MonitorEnter(a),
            MonitorExit(a) => MonitorExit(a),
            CheckCast(a, d) => CheckCast(a, d),
            InstanceOf(a, b, d) => InstanceOf(a, b, d),
            ArrayLength(a, b) => ArrayLength(a, b),
            NewInstance(a, d) => NewInstance(a, d),
            NewArray(a, b, d) => NewArray(a, b, d),
            FilledNewArray(regs, d) => FilledNewArray(regs, d),
            FilledNewArrayRange(first, count, d) => FilledNewArrayRange(first, count, d),
            Throw(a) => Throw(a),
            Compare(kind, a, b, c) => Compare(kind, a, b, c),
            ArrayOp(kind, a, b, c) => ArrayOp(kind, a, b, c),
            InstanceOp(kind, a, b, fr) => InstanceOp(kind, a, b, fr),
            StaticOp(kind, a, fr) => StaticOp(kind, a, fr),
            Invoke(kind, regs, m) => Invoke(kind, regs, m),
            InvokeRange(kind, first, count, m) => InvokeRange(kind, first, count, m),
            Unary(op, a, b) => Unary(op, a, b),
            Binary(op, a, b, c) => Binary(op, a, b, c),
            Binary2Addr(op, a, b) => Binary2Addr(op, a, b),
            BinaryLit16(op, a, b, l) => BinaryLit16(op, a, b, l),
            BinaryLit8(op, a, b, l) => BinaryLit8(op, a, b, l),
            InvokePolymorphic(regs, m, p) => InvokePolymorphic(regs, m, p),
            InvokePolymorphicRange(first, count, m, p) => {
                InvokePolymorphicRange(first, count, m, p)
            }
            ArrayDataPayload { element_width, data } => ArrayDataPayload { element_width, data },
        })
    }
}

impl<T: fmt::Display> fmt::Display for Instruction<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mnemonic())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn family_mnemonics() {
        let i: Instruction<InsnIndex> = Instruction::ArrayOp(AccessKind::GetObject, 0, 1, 2);
        assert_eq!(i.mnemonic(), "aget-object");
        let i: Instruction<InsnIndex> = Instruction::Binary2Addr(BinaryOp::UshrLong, 0, 1);
        assert_eq!(i.mnemonic(), "ushr-long/2addr");
        let i: Instruction<InsnIndex> = Instruction::BinaryLit16(BinaryOp::SubInt, 0, 1, 5);
        assert_eq!(i.mnemonic(), "rsub-int");
        let i: Instruction<InsnIndex> = Instruction::BinaryLit8(BinaryOp::ShlInt, 0, 1, 2);
        assert_eq!(i.mnemonic(), "shl-int/lit8");
        let i: Instruction<InsnIndex> = Instruction::IfZ(TestKind::NotEqual, 0, InsnIndex(3));
        assert_eq!(i.mnemonic(), "if-nez");
    }

    #[test]
    fn payload_sizes() {
        let p: Instruction<InsnIndex> = Instruction::PackedSwitchPayload {
            first_key: 10,
            targets: vec![InsnIndex(1), InsnIndex(2), InsnIndex(3)],
        };
        assert_eq!(p.code_units(), 4 + 6);
        let s: Instruction<InsnIndex> = Instruction::SparseSwitchPayload {
            keys: vec![1, 5],
            targets: vec![InsnIndex(1), InsnIndex(2)],
        };
        assert_eq!(s.code_units(), 2 + 8);
        let a: Instruction<InsnIndex> = Instruction::ArrayDataPayload {
            element_width: 2,
            data: vec![1, 2, 3, 4, 5, 6],
        };
        assert_eq!(a.code_units(), 4 + 3);
        let odd: Instruction<InsnIndex> = Instruction::ArrayDataPayload {
            element_width: 1,
            data: vec![1, 2, 3],
        };
        assert_eq!(odd.code_units(), 4 + 2);
    }

    #[test]
    fn map_targets_touches_only_branches() {
        let gote: Instruction<CodeUnitOffset> = Instruction::Goto(CodeUnitOffset(-2));
        let mapped = gote
            .map_targets::<InsnIndex, crate::error::DexError>(|_| Ok(InsnIndex(4)))
            .unwrap();
        assert_eq!(mapped, Instruction::Goto(InsnIndex(4)));

        let mv: Instruction<CodeUnitOffset> = Instruction::Move(1, 2);
        let mapped = mv
            .map_targets::<InsnIndex, crate::error::DexError>(|_| unreachable!())
            .unwrap();
        assert_eq!(mapped, Instruction::Move(1, 2));
    }
}
