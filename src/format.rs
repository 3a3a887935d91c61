use crate::machine_code::MachineCode;

/// An inclusive bit range `[low, high]` within a 32-bit instruction word.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Field {
    pub low: u32,
    pub high: u32,
}

impl Field {
    pub const fn new(low: u32, high: u32) -> Field {
        Field { low, high }
    }

    pub fn width(&self) -> u32 {
        self.high - self.low + 1
    }

    pub fn mask(&self) -> u32 {
        let width = self.width();
        if width >= 32 {
            u32::max_value()
        } else {
            ((1u32 << width) - 1) << self.low
        }
    }
}

/// The named bit-fields of a 32-bit RV32IM instruction word, as laid out in
/// `§3 Data Model`.
pub mod fields {
    use super::Field;

    pub const OPCODE: Field = Field::new(0, 6);
    pub const RD: Field = Field::new(7, 11);
    pub const FUNCT3: Field = Field::new(12, 14);
    pub const RS1: Field = Field::new(15, 19);
    pub const RS2: Field = Field::new(20, 24);
    pub const FUNCT7: Field = Field::new(25, 31);
    pub const SHAMT: Field = Field::new(20, 24);

    pub const IMM_11_0: Field = Field::new(20, 31);
    pub const IMM_4_0: Field = Field::new(7, 11);
    pub const IMM_11_5: Field = Field::new(25, 31);
    pub const IMM_31_12: Field = Field::new(12, 31);

    // B-type split immediate.
    pub const IMM_11_B: Field = Field::new(7, 7);
    pub const IMM_4_1: Field = Field::new(8, 11);
    pub const IMM_10_5: Field = Field::new(25, 30);
    pub const IMM_12: Field = Field::new(31, 31);

    // J-type split immediate.
    pub const IMM_10_1: Field = Field::new(21, 30);
    pub const IMM_11_J: Field = Field::new(20, 20);
    pub const IMM_19_12: Field = Field::new(12, 19);
    pub const IMM_20: Field = Field::new(31, 31);
}

/// A single `field == value` constraint used both to build a `MachineCode`
/// (via [`InstructionFormat::fill`]) and to test whether a decoded word
/// belongs to a given format (via [`InstructionFormat::matches`]).
#[derive(Clone, Copy, Debug)]
pub struct FieldConstraint {
    pub field: Field,
    pub value: u32,
}

impl FieldConstraint {
    pub const fn new(field: Field, value: u32) -> FieldConstraint {
        FieldConstraint { field, value }
    }
}

/// An ordered list of [`FieldConstraint`]s that identifies one instruction's
/// encoding. Decoding a word means finding the unique format whose
/// constraints all hold.
#[derive(Clone, Debug)]
pub struct InstructionFormat {
    constraints: &'static [FieldConstraint],
}

impl InstructionFormat {
    pub const fn new(constraints: &'static [FieldConstraint]) -> InstructionFormat {
        InstructionFormat { constraints }
    }

    /// Builds a `MachineCode` with every constrained field set to its fixed
    /// value; variable fields (operands) are left zero for the parser to fill.
    pub fn fill(&self) -> MachineCode {
        let mut mc = MachineCode::new(0);
        for c in self.constraints {
            mc.set(c.field, c.value);
        }
        mc
    }

    /// True iff every constraint in this format holds on `mc`.
    pub fn matches(&self, mc: &MachineCode) -> bool {
        self.constraints.iter().all(|c| mc.get(c.field) == c.value)
    }

    pub fn constraints(&self) -> &'static [FieldConstraint] {
        self.constraints
    }
}
