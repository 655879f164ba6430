//! The three coordinate tiers for branch targets, and the conversions
//! between them.
//!
//! On disk a branch operand is a signed distance in 16-bit code units from
//! the branching instruction ([`CodeUnitOffset`]). The middle tier replaces
//! it with a signed distance in whole instructions ([`RelativeOffset`]), and
//! the public tier with the plain ordinal of the target instruction
//! ([`InsnIndex`]). The three are distinct types on purpose: a sequence is
//! always in exactly one tier, and crossing tiers goes through the
//! conversion passes below.
//!
//! Switch payloads are the one wrinkle: their target lists are relative to
//! the *switch instruction that references the payload*, not to the payload
//! itself, in both the raw and the relative tier. Conversions therefore
//! first recover the switch→payload association with a reverse scan.

use crate::error::DexError;
use crate::instructions::Instruction;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Raw branch operand: signed distance in 16-bit code units (tier 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CodeUnitOffset(pub i32);

/// Branch operand as a signed distance in instructions (tier 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelativeOffset(pub i32);

/// Absolute instruction index within a method body (tier 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InsnIndex(pub usize);

impl fmt::Display for CodeUnitOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:+}cu", self.0)
    }
}

impl fmt::Display for RelativeOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:+}", self.0)
    }
}

impl fmt::Display for InsnIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// Total maps between instruction index and code-unit position, built from
/// one linear scan accumulating each instruction's format-determined size.
pub(crate) struct AddressMap {
    positions: Vec<u32>,
    by_position: HashMap<u32, usize>,
    total_units: u32,
}

impl AddressMap {
    pub(crate) fn new<T>(instructions: &[Instruction<T>]) -> AddressMap {
        let mut positions = Vec::with_capacity(instructions.len());
        let mut by_position = HashMap::with_capacity(instructions.len());
        let mut pos = 0u32;
        for (i, insn) in instructions.iter().enumerate() {
            positions.push(pos);
            by_position.insert(pos, i);
            pos += insn.code_units() as u32;
        }
        AddressMap { positions, by_position, total_units: pos }
    }

    pub(crate) fn position(&self, index: usize) -> u32 {
        self.positions[index]
    }

    /// Index of the instruction starting exactly at `pos`; a position inside
    /// an instruction (or past the end) means the container is malformed.
    pub(crate) fn index_at(&self, pos: i64) -> Result<usize, DexError> {
        if pos < 0 || pos > u32::MAX as i64 {
            fail!("branch target at code unit {} is out of range", pos);
        }
        match self.by_position.get(&(pos as u32)) {
            Some(&i) => Ok(i),
            None => Err(DexError::new(&format!(
                "branch target at code unit {} does not land on an instruction boundary",
                pos
            ))),
        }
    }

    /// Like `index_at`, but also accepts the end-of-sequence position and
    /// returns the one-past-the-last index. Try ranges may end there.
    pub(crate) fn index_at_or_end(&self, pos: i64) -> Result<usize, DexError> {
        if pos >= 0 && pos as u32 == self.total_units {
            return Ok(self.positions.len());
        }
        self.index_at(pos)
    }
}

fn is_switch_payload<T>(insn: &Instruction<T>) -> bool {
    matches!(
        insn,
        Instruction::PackedSwitchPayload { .. } | Instruction::SparseSwitchPayload { .. }
    )
}

fn kinds_match<A, B>(switch: &Instruction<A>, payload: &Instruction<B>) -> bool {
    matches!(
        (switch, payload),
        (Instruction::PackedSwitch(..), Instruction::PackedSwitchPayload { .. })
            | (Instruction::SparseSwitch(..), Instruction::SparseSwitchPayload { .. })
    )
}

/// Scan for the `packed-switch`/`sparse-switch` instruction whose raw branch
/// offset lands exactly on the payload at `payload_index`. A switch payload
/// nothing points at is a malformed container.
pub(crate) fn find_switch_for_payload(
    instructions: &[Instruction<CodeUnitOffset>],
    map: &AddressMap,
    payload_index: usize,
) -> Result<usize, DexError> {
    let payload_pos = map.position(payload_index) as i64;
    for (i, insn) in instructions.iter().enumerate() {
        let off = match insn {
            Instruction::PackedSwitch(_, CodeUnitOffset(off))
            | Instruction::SparseSwitch(_, CodeUnitOffset(off)) => *off,
            _ => continue,
        };
        if map.position(i) as i64 + off as i64 == payload_pos {
            if !kinds_match(insn, &instructions[payload_index]) {
                fail!(
                    "switch at instruction {} references a payload of the wrong kind at {}",
                    i, payload_index
                );
            }
            return Ok(i);
        }
    }
    Err(DexError::new(&format!(
        "switch payload at instruction {} has no referencing switch instruction",
        payload_index
    )))
}

/// Tier 1 → tier 2: replace every raw code-unit offset with an
/// instruction-relative one. Payload target lists stay relative to their
/// referencing switch instruction.
pub fn raw_to_relative(
    instructions: Vec<Instruction<CodeUnitOffset>>,
) -> Result<Vec<Instruction<RelativeOffset>>, DexError> {
    let map = AddressMap::new(&instructions);

    // payload index -> referencing switch index
    let mut payload_base = HashMap::new();
    for (i, insn) in instructions.iter().enumerate() {
        if is_switch_payload(insn) {
            payload_base.insert(i, find_switch_for_payload(&instructions, &map, i)?);
        }
    }

    let mut out = Vec::with_capacity(instructions.len());
    for (i, insn) in instructions.into_iter().enumerate() {
        let base = *payload_base.get(&i).unwrap_or(&i);
        let base_pos = map.position(base) as i64;
        let converted = insn.map_targets(|CodeUnitOffset(off)| {
            let target = map.index_at(base_pos + off as i64).map_err(|e| {
                e.context(format!("while resolving a branch from instruction {}", base))
            })?;
            Ok(RelativeOffset(target as i32 - base as i32))
        })?;
        out.push(converted);
    }
    Ok(out)
}

/// Tier 2 → tier 3: turn instruction-relative offsets into absolute
/// instruction indices.
pub fn relative_to_absolute(
    instructions: Vec<Instruction<RelativeOffset>>,
) -> Result<Vec<Instruction<InsnIndex>>, DexError> {
    let len = instructions.len();
    let payload_base = relative_payload_bases(&instructions)?;

    let mut out = Vec::with_capacity(len);
    for (i, insn) in instructions.into_iter().enumerate() {
        let base = *payload_base.get(&i).unwrap_or(&i) as i64;
        let converted = insn.map_targets(|RelativeOffset(rel)| {
            let target = base + rel as i64;
            if target < 0 || target as usize >= len {
                fail!(
                    "relative branch {} from instruction {} leaves the method ({} instructions)",
                    rel, base, len
                );
            }
            Ok(InsnIndex(target as usize))
        })?;
        out.push(converted);
    }
    Ok(out)
}

/// Tier 3 → tier 2.
pub fn absolute_to_relative(
    instructions: Vec<Instruction<InsnIndex>>,
) -> Result<Vec<Instruction<RelativeOffset>>, DexError> {
    let len = instructions.len();

    // payload index -> switch index, recovered from the switches' absolute operands
    let mut payload_base = HashMap::new();
    for (i, insn) in instructions.iter().enumerate() {
        if let Instruction::PackedSwitch(_, InsnIndex(p))
        | Instruction::SparseSwitch(_, InsnIndex(p)) = insn
        {
            payload_base.insert(*p, i);
        }
    }
    for (i, insn) in instructions.iter().enumerate() {
        if is_switch_payload(insn) && !payload_base.contains_key(&i) {
            fail!("switch payload at instruction {} has no referencing switch instruction", i);
        }
    }

    let mut out = Vec::with_capacity(len);
    for (i, insn) in instructions.into_iter().enumerate() {
        let base = *payload_base.get(&i).unwrap_or(&i);
        let converted = insn.map_targets(|InsnIndex(abs)| {
            if abs >= len {
                fail!(
                    "absolute branch target {} from instruction {} is out of range ({} instructions)",
                    abs, base, len
                );
            }
            Ok(RelativeOffset(abs as i32 - base as i32))
        })?;
        out.push(converted);
    }
    Ok(out)
}

/// Where each pre-lowering instruction landed once payload-alignment nops
/// were inserted. Lets the assembler translate instruction indices of the
/// absolute tier into code-unit addresses of the emitted stream.
pub(crate) struct LoweredLayout {
    new_index: Vec<usize>,
    positions: Vec<u32>,
    total_units: u32,
}

impl LoweredLayout {
    /// Code-unit position of the instruction that had this index before
    /// padding was inserted.
    pub(crate) fn position_of(&self, old_index: usize) -> u32 {
        self.positions[self.new_index[old_index]]
    }

    /// Like `position_of`, but the one-past-the-end index maps to the total
    /// stream length (try ranges may end there).
    pub(crate) fn boundary_of(&self, old_index: usize) -> u32 {
        if old_index == self.new_index.len() {
            self.total_units
        } else {
            self.position_of(old_index)
        }
    }
}

/// Tier 2 → tier 1: lower instruction-relative offsets back to code-unit
/// distances. Payloads must start on an even code-unit boundary, so this
/// pass may insert `nop` padding in front of a misaligned payload; all
/// surviving offsets are computed against the padded layout.
pub fn relative_to_raw(
    instructions: Vec<Instruction<RelativeOffset>>,
) -> Result<Vec<Instruction<CodeUnitOffset>>, DexError> {
    relative_to_raw_with_layout(instructions).map(|(out, _)| out)
}

pub(crate) fn relative_to_raw_with_layout(
    instructions: Vec<Instruction<RelativeOffset>>,
) -> Result<(Vec<Instruction<CodeUnitOffset>>, LoweredLayout), DexError> {
    let payload_base = relative_payload_bases(&instructions)?;

    // Which old indices need a nop in front, and the old->new index map.
    let mut pad_before = vec![false; instructions.len()];
    let mut pos = 0u32;
    for (i, insn) in instructions.iter().enumerate() {
        if insn.is_payload() && pos % 2 == 1 {
            pad_before[i] = true;
            pos += 1;
        }
        pos += insn.code_units() as u32;
    }
    let mut new_index = Vec::with_capacity(instructions.len());
    let mut inserted = 0usize;
    for (i, padded) in pad_before.iter().enumerate() {
        if *padded {
            inserted += 1;
        }
        new_index.push(i + inserted);
    }

    // Padded positions, indexed by new index.
    let mut positions = Vec::with_capacity(instructions.len() + inserted);
    let mut pos = 0u32;
    for (i, insn) in instructions.iter().enumerate() {
        if pad_before[i] {
            positions.push(pos);
            pos += 1;
        }
        positions.push(pos);
        pos += insn.code_units() as u32;
    }
    let total_units = pos;

    let len = instructions.len();
    let mut out = Vec::with_capacity(len + inserted);
    for (i, insn) in instructions.into_iter().enumerate() {
        if pad_before[i] {
            out.push(Instruction::Nop);
        }
        let base = *payload_base.get(&i).unwrap_or(&i);
        let base_pos = positions[new_index[base]] as i64;
        let converted = insn.map_targets(|RelativeOffset(rel)| {
            let target = base as i64 + rel as i64;
            if target < 0 || target as usize >= len {
                fail!(
                    "relative branch {} from instruction {} leaves the method ({} instructions)",
                    rel, base, len
                );
            }
            let target_pos = positions[new_index[target as usize]] as i64;
            Ok(CodeUnitOffset((target_pos - base_pos) as i32))
        })?;
        out.push(converted);
    }
    Ok((out, LoweredLayout { new_index, positions, total_units }))
}

/// Recover the payload→switch association in the relative tier, where a
/// switch at `s` with offset `r` references the payload at `s + r`.
fn relative_payload_bases(
    instructions: &[Instruction<RelativeOffset>],
) -> Result<HashMap<usize, usize>, DexError> {
    let len = instructions.len() as i64;
    let mut payload_base = HashMap::new();
    for (i, insn) in instructions.iter().enumerate() {
        if let Instruction::PackedSwitch(_, RelativeOffset(rel))
        | Instruction::SparseSwitch(_, RelativeOffset(rel)) = insn
        {
            let p = i as i64 + *rel as i64;
            if p < 0 || p >= len {
                fail!("switch at instruction {} references a payload outside the method", i);
            }
            if !kinds_match(insn, &instructions[p as usize]) {
                fail!(
                    "switch at instruction {} references instruction {} which is not its payload kind",
                    i, p
                );
            }
            payload_base.insert(p as usize, i);
        }
    }
    for (i, insn) in instructions.iter().enumerate() {
        if is_switch_payload(insn) && !payload_base.contains_key(&i) {
            fail!("switch payload at instruction {} has no referencing switch instruction", i);
        }
    }
    Ok(payload_base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instructions::TestKind;

    #[test]
    fn backward_goto_resolves_to_previous_instruction() {
        // return-void is one code unit, so goto -1cu lands on it
        let raw = vec![
            Instruction::ReturnVoid,
            Instruction::Goto(CodeUnitOffset(-1)),
        ];
        let rel = raw_to_relative(raw).unwrap();
        assert_eq!(rel[1], Instruction::Goto(RelativeOffset(-1)));
        let abs = relative_to_absolute(rel).unwrap();
        assert_eq!(abs[1], Instruction::Goto(InsnIndex(0)));
    }

    #[test]
    fn goto_minus_two_over_two_unit_neighbour() {
        // const/16 is 2 code units; a goto at position 2 with raw -2 targets it
        let raw = vec![
            Instruction::Const16(0, 7),
            Instruction::Goto(CodeUnitOffset(-2)),
        ];
        let abs = relative_to_absolute(raw_to_relative(raw).unwrap()).unwrap();
        assert_eq!(abs[1], Instruction::Goto(InsnIndex(0)));
    }

    #[test]
    fn misaligned_target_is_fatal() {
        let raw = vec![
            Instruction::Const16(0, 7),
            Instruction::Goto(CodeUnitOffset(-1)),
        ];
        assert!(raw_to_relative(raw).is_err());
    }

    #[test]
    fn switch_payload_targets_stay_switch_relative() {
        // 0: packed-switch v0 -> payload at instruction 5
        // 1..4: nops, 5: payload with cases pointing back at 1 and 2
        let raw = vec![
            Instruction::PackedSwitch(0, CodeUnitOffset(7)), // 3cu instr at 0, payload at cu 7
            Instruction::Nop,
            Instruction::Nop,
            Instruction::Nop,
            Instruction::Nop,
            Instruction::PackedSwitchPayload {
                first_key: 0,
                targets: vec![CodeUnitOffset(3), CodeUnitOffset(4)],
            },
        ];
        let rel = raw_to_relative(raw).unwrap();
        assert_eq!(rel[0], Instruction::PackedSwitch(0, RelativeOffset(5)));
        match &rel[5] {
            Instruction::PackedSwitchPayload { targets, .. } => {
                // relative to the switch at index 0, not to the payload
                assert_eq!(targets, &[RelativeOffset(1), RelativeOffset(2)]);
            }
            other => panic!("expected payload, got {:?}", other),
        }

        let abs = relative_to_absolute(rel).unwrap();
        assert_eq!(abs[0], Instruction::PackedSwitch(0, InsnIndex(5)));
        match &abs[5] {
            Instruction::PackedSwitchPayload { targets, .. } => {
                assert_eq!(targets, &[InsnIndex(1), InsnIndex(2)]);
            }
            other => panic!("expected payload, got {:?}", other),
        }
    }

    #[test]
    fn unreferenced_payload_is_fatal() {
        let raw: Vec<Instruction<CodeUnitOffset>> = vec![
            Instruction::Nop,
            Instruction::SparseSwitchPayload { keys: vec![], targets: vec![] },
        ];
        let err = raw_to_relative(raw).unwrap_err();
        assert!(err.to_string().contains("no referencing switch"));
    }

    #[test]
    fn full_tier_roundtrip() {
        let raw = vec![
            Instruction::Const16(0, 1),                         // 0 @0
            Instruction::IfZ(TestKind::Equal, 0, CodeUnitOffset(4)), // 1 @2 -> @6 (idx 4)
            Instruction::Nop,                                   // 2 @4
            Instruction::Goto(CodeUnitOffset(-3)),              // 3 @5 -> @2 (idx 1)
            Instruction::ReturnVoid,                            // 4 @6
        ];
        let rel = raw_to_relative(raw.clone()).unwrap();
        let abs = relative_to_absolute(rel).unwrap();
        let rel2 = absolute_to_relative(abs).unwrap();
        let raw2 = relative_to_raw(rel2).unwrap();
        assert_eq!(raw, raw2);
    }

    #[test]
    fn lowering_pads_misaligned_payload() {
        // fill-array-data is 3 code units, leaving the payload at the odd
        // position 3 unless a nop is inserted
        let rel = vec![
            Instruction::FillArrayData(0, RelativeOffset(1)),
            Instruction::ArrayDataPayload { element_width: 1, data: vec![1] },
        ];
        let raw = relative_to_raw(rel).unwrap();
        assert_eq!(raw.len(), 3);
        assert_eq!(raw[1], Instruction::Nop);
        // payload now sits at code unit 4, referenced from code unit 0
        assert_eq!(raw[0], Instruction::FillArrayData(0, CodeUnitOffset(4)));
    }

    #[test]
    fn aligned_payload_needs_no_padding() {
        let rel = vec![
            Instruction::FillArrayData(0, RelativeOffset(2)),
            Instruction::Nop,
            Instruction::ArrayDataPayload { element_width: 1, data: vec![1] },
        ];
        let raw = relative_to_raw(rel).unwrap();
        assert_eq!(raw.len(), 3);
        assert_eq!(raw[0], Instruction::FillArrayData(0, CodeUnitOffset(4)));
    }
}
