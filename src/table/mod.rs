//! The RV32IM instruction table: one [`InstrEntry`] per opcode, pairing its
//! binary encoding ([`InstructionFormat`]) with a text-operand parser and an
//! execute function. `§4.6` of the data model calls this a single
//! "Instruction" entry; it is split here into `format`/`parse`/`exec` so the
//! core crate never depends on the assembler's `Program` type (see
//! [`AssembleContext`]).

mod exec;
mod parsers;

use crate::error::AccessError;
use crate::format::{fields, FieldConstraint, InstructionFormat};
use crate::machine_code::MachineCode;
use crate::simulator::{SimulatorState, TickResult};
use crate::token::Token;

pub use parsers::{AssembleContext, ParseIssue};

type ParseFn = fn(&[Token], &mut dyn AssembleContext, &InstructionFormat) -> Result<MachineCode, ParseIssue>;
type ExecFn = fn(MachineCode, &mut SimulatorState) -> Result<TickResult, AccessError>;

/// One RV32IM instruction: its mnemonic, binary encoding, text-operand parser
/// and simulator implementation.
pub struct InstrEntry {
    pub mnemonic: &'static str,
    pub format: InstructionFormat,
    pub parse: ParseFn,
    pub exec: ExecFn,
}

impl InstrEntry {
    pub fn parse(&self, tokens: &[Token], ctx: &mut dyn AssembleContext) -> Result<MachineCode, ParseIssue> {
        (self.parse)(tokens, ctx, &self.format)
    }
}

const OPCODE_LUI: u32 = 0x37;
const OPCODE_AUIPC: u32 = 0x17;
const OPCODE_JAL: u32 = 0x6F;
const OPCODE_JALR: u32 = 0x67;
const OPCODE_BRANCH: u32 = 0x63;
const OPCODE_LOAD: u32 = 0x03;
const OPCODE_STORE: u32 = 0x23;
const OPCODE_OP_IMM: u32 = 0x13;
const OPCODE_OP: u32 = 0x33;
const OPCODE_SYSTEM: u32 = 0x73;

const FUNCT7_ALT: u32 = 0x20;
const FUNCT7_MULDIV: u32 = 0x01;

macro_rules! r_format {
    ($opcode:expr, $funct3:expr, $funct7:expr) => {
        InstructionFormat::new(&[
            FieldConstraint::new(fields::OPCODE, $opcode),
            FieldConstraint::new(fields::FUNCT3, $funct3),
            FieldConstraint::new(fields::FUNCT7, $funct7),
        ])
    };
}

macro_rules! i_format {
    ($opcode:expr, $funct3:expr) => {
        InstructionFormat::new(&[
            FieldConstraint::new(fields::OPCODE, $opcode),
            FieldConstraint::new(fields::FUNCT3, $funct3),
        ])
    };
}

macro_rules! shift_format {
    ($funct3:expr, $funct7:expr) => {
        InstructionFormat::new(&[
            FieldConstraint::new(fields::OPCODE, OPCODE_OP_IMM),
            FieldConstraint::new(fields::FUNCT3, $funct3),
            FieldConstraint::new(fields::FUNCT7, $funct7),
        ])
    };
}

macro_rules! entry {
    ($mnemonic:expr, $format:expr, $parse:expr, $exec:expr) => {
        InstrEntry { mnemonic: $mnemonic, format: $format, parse: $parse, exec: $exec }
    };
}

/// The complete static RV32IM table, in no particular order; [`decode`] and
/// [`lookup`] are linear scans over it.
pub fn instruction_table() -> &'static [InstrEntry] {
    &INSTRUCTIONS
}

static INSTRUCTIONS: [InstrEntry; 47] = [
    entry!("add", r_format!(OPCODE_OP, 0x0, 0x00), parsers::r_type, exec::add),
    entry!("sub", r_format!(OPCODE_OP, 0x0, FUNCT7_ALT), parsers::r_type, exec::sub),
    entry!("sll", r_format!(OPCODE_OP, 0x1, 0x00), parsers::r_type, exec::sll),
    entry!("slt", r_format!(OPCODE_OP, 0x2, 0x00), parsers::r_type, exec::slt),
    entry!("sltu", r_format!(OPCODE_OP, 0x3, 0x00), parsers::r_type, exec::sltu),
    entry!("xor", r_format!(OPCODE_OP, 0x4, 0x00), parsers::r_type, exec::xor),
    entry!("srl", r_format!(OPCODE_OP, 0x5, 0x00), parsers::r_type, exec::srl),
    entry!("sra", r_format!(OPCODE_OP, 0x5, FUNCT7_ALT), parsers::r_type, exec::sra),
    entry!("or", r_format!(OPCODE_OP, 0x6, 0x00), parsers::r_type, exec::or),
    entry!("and", r_format!(OPCODE_OP, 0x7, 0x00), parsers::r_type, exec::and),
    entry!("mul", r_format!(OPCODE_OP, 0x0, FUNCT7_MULDIV), parsers::r_type, exec::mul),
    entry!("mulh", r_format!(OPCODE_OP, 0x1, FUNCT7_MULDIV), parsers::r_type, exec::mulh),
    entry!("mulhsu", r_format!(OPCODE_OP, 0x2, FUNCT7_MULDIV), parsers::r_type, exec::mulhsu),
    entry!("mulhu", r_format!(OPCODE_OP, 0x3, FUNCT7_MULDIV), parsers::r_type, exec::mulhu),
    entry!("div", r_format!(OPCODE_OP, 0x4, FUNCT7_MULDIV), parsers::r_type, exec::div),
    entry!("divu", r_format!(OPCODE_OP, 0x5, FUNCT7_MULDIV), parsers::r_type, exec::divu),
    entry!("rem", r_format!(OPCODE_OP, 0x6, FUNCT7_MULDIV), parsers::r_type, exec::rem),
    entry!("remu", r_format!(OPCODE_OP, 0x7, FUNCT7_MULDIV), parsers::r_type, exec::remu),
    entry!("addi", i_format!(OPCODE_OP_IMM, 0x0), parsers::i_arith, exec::addi),
    entry!("slti", i_format!(OPCODE_OP_IMM, 0x2), parsers::i_arith, exec::slti),
    entry!("sltiu", i_format!(OPCODE_OP_IMM, 0x3), parsers::i_arith, exec::sltiu),
    entry!("xori", i_format!(OPCODE_OP_IMM, 0x4), parsers::i_arith, exec::xori),
    entry!("ori", i_format!(OPCODE_OP_IMM, 0x6), parsers::i_arith, exec::ori),
    entry!("andi", i_format!(OPCODE_OP_IMM, 0x7), parsers::i_arith, exec::andi),
    entry!("slli", shift_format!(0x1, 0x00), parsers::i_shift, exec::slli),
    entry!("srli", shift_format!(0x5, 0x00), parsers::i_shift, exec::srli),
    entry!("srai", shift_format!(0x5, FUNCT7_ALT), parsers::i_shift, exec::srai),
    entry!("lb", i_format!(OPCODE_LOAD, 0x0), parsers::i_load, exec::lb),
    entry!("lh", i_format!(OPCODE_LOAD, 0x1), parsers::i_load, exec::lh),
    entry!("lw", i_format!(OPCODE_LOAD, 0x2), parsers::i_load, exec::lw),
    entry!("lbu", i_format!(OPCODE_LOAD, 0x4), parsers::i_load, exec::lbu),
    entry!("lhu", i_format!(OPCODE_LOAD, 0x5), parsers::i_load, exec::lhu),
    entry!("jalr", i_format!(OPCODE_JALR, 0x0), parsers::jalr_type, exec::jalr),
    entry!("sb", i_format!(OPCODE_STORE, 0x0), parsers::s_type, exec::sb),
    entry!("sh", i_format!(OPCODE_STORE, 0x1), parsers::s_type, exec::sh),
    entry!("sw", i_format!(OPCODE_STORE, 0x2), parsers::s_type, exec::sw),
    entry!("beq", i_format!(OPCODE_BRANCH, 0x0), parsers::b_type, exec::beq),
    entry!("bne", i_format!(OPCODE_BRANCH, 0x1), parsers::b_type, exec::bne),
    entry!("blt", i_format!(OPCODE_BRANCH, 0x4), parsers::b_type, exec::blt),
    entry!("bge", i_format!(OPCODE_BRANCH, 0x5), parsers::b_type, exec::bge),
    entry!("bltu", i_format!(OPCODE_BRANCH, 0x6), parsers::b_type, exec::bltu),
    entry!("bgeu", i_format!(OPCODE_BRANCH, 0x7), parsers::b_type, exec::bgeu),
    entry!(
        "lui",
        InstructionFormat::new(&[FieldConstraint::new(fields::OPCODE, OPCODE_LUI)]),
        parsers::u_type,
        exec::lui
    ),
    entry!(
        "auipc",
        InstructionFormat::new(&[FieldConstraint::new(fields::OPCODE, OPCODE_AUIPC)]),
        parsers::u_type,
        exec::auipc
    ),
    entry!(
        "jal",
        InstructionFormat::new(&[FieldConstraint::new(fields::OPCODE, OPCODE_JAL)]),
        parsers::j_type,
        exec::jal
    ),
    entry!(
        "ecall",
        InstructionFormat::new(&[
            FieldConstraint::new(fields::OPCODE, OPCODE_SYSTEM),
            FieldConstraint::new(fields::FUNCT3, 0x0),
            FieldConstraint::new(fields::IMM_11_0, 0x000),
        ]),
        parsers::no_args,
        exec::ecall
    ),
];

/// Finds the unique instruction format matching `mc`'s fixed bits.
pub fn decode(mc: &MachineCode) -> Option<&'static InstrEntry> {
    INSTRUCTIONS.iter().find(|entry| entry.format.matches(mc))
}

/// Looks up an instruction by mnemonic, case-insensitively.
pub fn lookup(mnemonic: &str) -> Option<&'static InstrEntry> {
    INSTRUCTIONS.iter().find(|entry| entry.mnemonic.eq_ignore_ascii_case(mnemonic))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_mnemonic_round_trips_through_decode() {
        for entry in INSTRUCTIONS.iter() {
            let mc = entry.format.fill();
            let decoded = decode(&mc).unwrap_or_else(|| panic!("{} did not decode", entry.mnemonic));
            assert_eq!(decoded.mnemonic, entry.mnemonic);
        }
    }

    #[test]
    fn lookup_is_case_insensitive() {
        assert_eq!(lookup("ADDI").unwrap().mnemonic, "addi");
        assert!(lookup("nope").is_none());
    }
}
