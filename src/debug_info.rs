//! The debug_info_item byte-coded program: line numbers and local-variable
//! lifetimes.
//!
//! The program is a header (starting line, parameter names) followed by a
//! stream of one-byte opcodes with LEB128 operands; optional string/type
//! indices use the uleb128p1 form where -1 means absent. Opcodes at and
//! above [`DBG_FIRST_SPECIAL`] advance both the line and the address in one
//! byte and are kept verbatim.

use crate::error::DexError;
use crate::ids::{StringId, TypeId};
use crate::rw::{
    read_sleb128, read_u1, read_uleb128, read_uleb128p1, write_sleb128, write_u1, write_uleb128,
    write_uleb128p1,
};

pub const DBG_END_SEQUENCE: u8 = 0x00;
pub const DBG_ADVANCE_PC: u8 = 0x01;
pub const DBG_ADVANCE_LINE: u8 = 0x02;
pub const DBG_START_LOCAL: u8 = 0x03;
pub const DBG_START_LOCAL_EXTENDED: u8 = 0x04;
pub const DBG_END_LOCAL: u8 = 0x05;
pub const DBG_RESTART_LOCAL: u8 = 0x06;
pub const DBG_SET_PROLOGUE_END: u8 = 0x07;
pub const DBG_SET_EPILOGUE_BEGIN: u8 = 0x08;
pub const DBG_SET_FILE: u8 = 0x09;
pub const DBG_FIRST_SPECIAL: u8 = 0x0a;
pub const DBG_LINE_BASE: i32 = -4;
pub const DBG_LINE_RANGE: i32 = 15;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugInfoItem {
    pub line_start: u32,
    pub parameter_names: Vec<Option<StringId>>,
    pub events: Vec<RawDebugEvent>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawDebugEvent {
    AdvancePc(u32),
    AdvanceLine(i32),
    StartLocal { register: u16, name: Option<StringId>, descriptor: Option<TypeId> },
    StartLocalExtended {
        register: u16,
        name: Option<StringId>,
        descriptor: Option<TypeId>,
        signature: Option<StringId>,
    },
    EndLocal(u16),
    RestartLocal(u16),
    PrologueEnd,
    EpilogueBegin,
    SetFile(Option<StringId>),
    Special(u8),
}

fn read_opt_string(bytes: &[u8], ix: &mut usize) -> Result<Option<StringId>, DexError> {
    let idx = read_uleb128p1(bytes, ix)?;
    if idx < 0 { Ok(None) } else { Ok(Some(StringId(idx as u32))) }
}

fn read_opt_type(bytes: &[u8], ix: &mut usize) -> Result<Option<TypeId>, DexError> {
    let idx = read_uleb128p1(bytes, ix)?;
    if idx < 0 { Ok(None) } else { Ok(Some(TypeId(idx as u32))) }
}

fn opt_p1(idx: Option<u32>) -> i32 {
    match idx {
        Some(v) => v as i32,
        None => -1,
    }
}

fn read_register(bytes: &[u8], ix: &mut usize) -> Result<u16, DexError> {
    let reg = read_uleb128(bytes, ix)?;
    u16::try_from(reg)
        .map_err(|_| DexError::new(&format!("debug-info register v{} is out of range", reg)))
}

impl DebugInfoItem {
    pub fn read(bytes: &[u8], ix: &mut usize) -> Result<DebugInfoItem, DexError> {
        let line_start = read_uleb128(bytes, ix)?;
        let parameters_size = read_uleb128(bytes, ix)? as usize;
        let mut parameter_names = Vec::with_capacity(parameters_size);
        for _ in 0..parameters_size {
            parameter_names.push(read_opt_string(bytes, ix)?);
        }

        let mut events = Vec::new();
        loop {
            let opcode = read_u1(bytes, ix)?;
            let event = match opcode {
                DBG_END_SEQUENCE => break,
                DBG_ADVANCE_PC => RawDebugEvent::AdvancePc(read_uleb128(bytes, ix)?),
                DBG_ADVANCE_LINE => RawDebugEvent::AdvanceLine(read_sleb128(bytes, ix)?),
                DBG_START_LOCAL => RawDebugEvent::StartLocal {
                    register: read_register(bytes, ix)?,
                    name: read_opt_string(bytes, ix)?,
                    descriptor: read_opt_type(bytes, ix)?,
                },
                DBG_START_LOCAL_EXTENDED => RawDebugEvent::StartLocalExtended {
                    register: read_register(bytes, ix)?,
                    name: read_opt_string(bytes, ix)?,
                    descriptor: read_opt_type(bytes, ix)?,
                    signature: read_opt_string(bytes, ix)?,
                },
                DBG_END_LOCAL => RawDebugEvent::EndLocal(read_register(bytes, ix)?),
                DBG_RESTART_LOCAL => RawDebugEvent::RestartLocal(read_register(bytes, ix)?),
                DBG_SET_PROLOGUE_END => RawDebugEvent::PrologueEnd,
                DBG_SET_EPILOGUE_BEGIN => RawDebugEvent::EpilogueBegin,
                DBG_SET_FILE => RawDebugEvent::SetFile(read_opt_string(bytes, ix)?),
                special => RawDebugEvent::Special(special),
            };
            events.push(event);
        }

        Ok(DebugInfoItem { line_start, parameter_names, events })
    }

    pub fn write(&self, bytes: &mut Vec<u8>) -> usize {
        let mut c = 0;
        c += write_uleb128(bytes, self.line_start);
        c += write_uleb128(bytes, self.parameter_names.len() as u32);
        for name in &self.parameter_names {
            c += write_uleb128p1(bytes, opt_p1(name.map(|s| s.0)));
        }

        for event in &self.events {
            match event {
                RawDebugEvent::AdvancePc(diff) => {
                    c += write_u1(bytes, DBG_ADVANCE_PC);
                    c += write_uleb128(bytes, *diff);
                }
                RawDebugEvent::AdvanceLine(diff) => {
                    c += write_u1(bytes, DBG_ADVANCE_LINE);
                    c += write_sleb128(bytes, *diff);
                }
                RawDebugEvent::StartLocal { register, name, descriptor } => {
                    c += write_u1(bytes, DBG_START_LOCAL);
                    c += write_uleb128(bytes, *register as u32);
                    c += write_uleb128p1(bytes, opt_p1(name.map(|s| s.0)));
                    c += write_uleb128p1(bytes, opt_p1(descriptor.map(|t| t.0)));
                }
                RawDebugEvent::StartLocalExtended { register, name, descriptor, signature } => {
                    c += write_u1(bytes, DBG_START_LOCAL_EXTENDED);
                    c += write_uleb128(bytes, *register as u32);
                    c += write_uleb128p1(bytes, opt_p1(name.map(|s| s.0)));
                    c += write_uleb128p1(bytes, opt_p1(descriptor.map(|t| t.0)));
                    c += write_uleb128p1(bytes, opt_p1(signature.map(|s| s.0)));
                }
                RawDebugEvent::EndLocal(register) => {
                    c += write_u1(bytes, DBG_END_LOCAL);
                    c += write_uleb128(bytes, *register as u32);
                }
                RawDebugEvent::RestartLocal(register) => {
                    c += write_u1(bytes, DBG_RESTART_LOCAL);
                    c += write_uleb128(bytes, *register as u32);
                }
                RawDebugEvent::PrologueEnd => c += write_u1(bytes, DBG_SET_PROLOGUE_END),
                RawDebugEvent::EpilogueBegin => c += write_u1(bytes, DBG_SET_EPILOGUE_BEGIN),
                RawDebugEvent::SetFile(name) => {
                    c += write_u1(bytes, DBG_SET_FILE);
                    c += write_uleb128p1(bytes, opt_p1(name.map(|s| s.0)));
                }
                RawDebugEvent::Special(op) => {
                    debug_assert!(*op >= DBG_FIRST_SPECIAL);
                    c += write_u1(bytes, *op);
                }
            }
        }
        c += write_u1(bytes, DBG_END_SEQUENCE);
        c
    }
}

/// The line/pc deltas a special opcode encodes.
pub fn special_deltas(op: u8) -> (i32, u32) {
    let adjusted = (op - DBG_FIRST_SPECIAL) as i32;
    let line = DBG_LINE_BASE + adjusted % DBG_LINE_RANGE;
    let pc = (adjusted / DBG_LINE_RANGE) as u32;
    (line, pc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn program_roundtrip() {
        let item = DebugInfoItem {
            line_start: 42,
            parameter_names: vec![Some(StringId(3)), None, Some(StringId(5))],
            events: vec![
                RawDebugEvent::PrologueEnd,
                RawDebugEvent::Special(0x0a),
                RawDebugEvent::AdvancePc(7),
                RawDebugEvent::AdvanceLine(-3),
                RawDebugEvent::StartLocal {
                    register: 1,
                    name: Some(StringId(0)),
                    descriptor: Some(TypeId(1)),
                },
                RawDebugEvent::StartLocalExtended {
                    register: 2,
                    name: None,
                    descriptor: Some(TypeId(2)),
                    signature: Some(StringId(9)),
                },
                RawDebugEvent::EndLocal(1),
                RawDebugEvent::RestartLocal(1),
                RawDebugEvent::SetFile(None),
                RawDebugEvent::EpilogueBegin,
                RawDebugEvent::Special(0xff),
            ],
        };
        let mut bytes = vec![];
        item.write(&mut bytes);
        let mut ix = 0;
        let back = DebugInfoItem::read(&bytes, &mut ix).expect("read debug info");
        assert_eq!(ix, bytes.len());
        assert_eq!(item, back);
    }

    #[test]
    fn special_opcode_deltas() {
        // first special: line -4, pc +0
        assert_eq!(special_deltas(DBG_FIRST_SPECIAL), (-4, 0));
        // one full line range later the pc advances
        assert_eq!(special_deltas(DBG_FIRST_SPECIAL + 15), (-4, 1));
        assert_eq!(special_deltas(0x0e), (0, 0));
    }

    #[test]
    fn empty_program_is_one_terminator() {
        let item = DebugInfoItem { line_start: 1, parameter_names: vec![], events: vec![] };
        let mut bytes = vec![];
        item.write(&mut bytes);
        assert_eq!(bytes, vec![0x01, 0x00, 0x00]);
    }
}
