use crate::format::fields;
use crate::machine_code::MachineCode;

/// Identifies which patch function a relocation entry should run once its
/// target address is known. See `§4.7 Relocators`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RelocationKind {
    /// Write the low 12 bits of `target` into `IMM_11_0` (I-type load/ALU form).
    ImmAbs,
    /// Split `target` (must fit in 12 signed bits) across the S-type immediate.
    ImmAbsStore,
    /// Write the biased high 20 bits of `target - pc` into `IMM_31_12`.
    PcRelHi,
    /// Write the low 12 bits of `target - pc` into `IMM_11_0`, where `pc` is
    /// the address of the paired AUIPC four bytes earlier.
    PcRelLo,
    /// As `PcRelLo`, but split across the S-type immediate.
    PcRelLoStore,
    /// Encode a PC-relative offset into the J-type split immediate.
    Jal,
    /// Encode a PC-relative offset into the B-type split immediate.
    Branch,
    /// Overwrite 4 little-endian bytes of a data segment with `target`.
    Word,
    /// Reserved for RV64; never produced by this implementation.
    NoRelocator64,
}

/// Raised when a relocation's resolved value does not fit the target field.
#[derive(Clone, Copy, PartialEq, Eq, Debug, thiserror::Error)]
#[error("relocated value {value} does not fit the target field")]
pub struct RelocationRangeError {
    pub value: i64,
}

/// Applies `kind` to `mc`, given the resolved `target` address and the
/// address `pc` of the instruction being patched (the address of the AUIPC
/// itself for the `PcRel*` kinds, not the paired low half).
pub fn apply_code(
    kind: RelocationKind,
    mc: &mut MachineCode,
    pc: u32,
    target: i64,
) -> Result<(), RelocationRangeError> {
    match kind {
        RelocationKind::ImmAbs => {
            mc.set(fields::IMM_11_0, (target as u32) & 0xFFF);
            Ok(())
        }
        RelocationKind::ImmAbsStore => {
            if !(-2048..=2047).contains(&target) {
                return Err(RelocationRangeError { value: target });
            }
            let bits = (target as u32) & 0xFFF;
            mc.set(fields::IMM_4_0, bits & 0x1F);
            mc.set(fields::IMM_11_5, bits >> 5);
            Ok(())
        }
        RelocationKind::PcRelHi => {
            let delta = target.wrapping_sub(i64::from(pc));
            let biased = (delta.wrapping_add(0x800)) as u32;
            mc.set(fields::IMM_31_12, (biased >> 12) & 0xFFFFF);
            Ok(())
        }
        RelocationKind::PcRelLo => {
            // `pc` here is the address of the low-half instruction; the
            // paired AUIPC lives 4 bytes earlier.
            let delta = target.wrapping_sub(i64::from(pc.wrapping_sub(4)));
            mc.set(fields::IMM_11_0, (delta as u32) & 0xFFF);
            Ok(())
        }
        RelocationKind::PcRelLoStore => {
            let delta = target.wrapping_sub(i64::from(pc.wrapping_sub(4)));
            let bits = (delta as u32) & 0xFFF;
            mc.set(fields::IMM_4_0, bits & 0x1F);
            mc.set(fields::IMM_11_5, bits >> 5);
            Ok(())
        }
        RelocationKind::Jal => {
            let delta = target.wrapping_sub(i64::from(pc));
            if !(crate::constants::JAL_OFFSET_MIN..=crate::constants::JAL_OFFSET_MAX)
                .contains(&delta)
            {
                return Err(RelocationRangeError { value: delta });
            }
            let bits = delta as u32;
            mc.set(fields::IMM_20, bits >> 20);
            mc.set(fields::IMM_19_12, (bits >> 12) & 0xFF);
            mc.set(fields::IMM_11_J, (bits >> 11) & 0x1);
            mc.set(fields::IMM_10_1, (bits >> 1) & 0x3FF);
            Ok(())
        }
        RelocationKind::Branch => {
            let delta = target.wrapping_sub(i64::from(pc));
            if !(crate::constants::BRANCH_OFFSET_MIN..=crate::constants::BRANCH_OFFSET_MAX)
                .contains(&delta)
            {
                return Err(RelocationRangeError { value: delta });
            }
            let bits = delta as u32;
            mc.set(fields::IMM_12, bits >> 12);
            mc.set(fields::IMM_11_B, (bits >> 11) & 0x1);
            mc.set(fields::IMM_10_5, (bits >> 5) & 0x3F);
            mc.set(fields::IMM_4_1, (bits >> 1) & 0xF);
            Ok(())
        }
        RelocationKind::Word | RelocationKind::NoRelocator64 => {
            // Handled by `apply_data`; not a MachineCode patch.
            Ok(())
        }
    }
}

/// Applies a data relocation (`.word label`): overwrites 4 little-endian
/// bytes at `offset` within `bytes` with `target`.
pub fn apply_data(bytes: &mut [u8], offset: usize, target: i64) {
    let value = target as u32;
    bytes[offset] = (value & 0xFF) as u8;
    bytes[offset + 1] = ((value >> 8) & 0xFF) as u8;
    bytes[offset + 2] = ((value >> 16) & 0xFF) as u8;
    bytes[offset + 3] = ((value >> 24) & 0xFF) as u8;
}

/// A function pointer pair bundled under one name, mirroring the
/// "`(rel32, rel64)`" description in `§4.7`. RV64 is unimplemented, so
/// `rel64` always returns `NoRelocator64`'s no-op.
pub struct Relocator {
    pub kind: RelocationKind,
}

impl Relocator {
    pub const fn new(kind: RelocationKind) -> Relocator {
        Relocator { kind }
    }

    pub fn apply(&self, mc: &mut MachineCode, pc: u32, target: i64) -> Result<(), RelocationRangeError> {
        apply_code(self.kind, mc, pc, target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jal_relocation_round_trips() {
        let mut mc = MachineCode::new(0);
        apply_code(RelocationKind::Jal, &mut mc, 0x1000, 0x1000 + 8).unwrap();
        let bits = mc.get(fields::IMM_20) << 20
            | mc.get(fields::IMM_19_12) << 12
            | mc.get(fields::IMM_11_J) << 11
            | mc.get(fields::IMM_10_1) << 1;
        assert_eq!(bits, 8);
    }

    #[test]
    fn branch_relocation_round_trips_negative_offset() {
        let mut mc = MachineCode::new(0);
        apply_code(RelocationKind::Branch, &mut mc, 0x2000, 0x2000 - 16).unwrap();
        let raw = (mc.get(fields::IMM_12) << 12)
            | (mc.get(fields::IMM_11_B) << 11)
            | (mc.get(fields::IMM_10_5) << 5)
            | (mc.get(fields::IMM_4_1) << 1);
        let signed = ((raw << 19) as i32) >> 19;
        assert_eq!(signed, -16);
    }

    #[test]
    fn pcrel_hi_lo_pair_reconstructs_target() {
        let pc_hi = 0x500u32;
        let pc_lo = pc_hi + 4;
        let target: i64 = 0x12345;

        let mut hi = MachineCode::new(0);
        apply_code(RelocationKind::PcRelHi, &mut hi, pc_hi, target).unwrap();
        let mut lo = MachineCode::new(0);
        apply_code(RelocationKind::PcRelLo, &mut lo, pc_lo, target).unwrap();

        let hi20 = hi.get(fields::IMM_31_12) as i32;
        let lo12 = lo.get_signed(fields::IMM_11_0);
        let reconstructed = (hi20 << 12).wrapping_add(lo12);
        assert_eq!(reconstructed, target as i32);
    }
}
