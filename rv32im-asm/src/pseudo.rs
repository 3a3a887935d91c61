use rv32im::numeral;
use rv32im::table::AssembleContext;
use rv32im::RelocationKind;

use crate::program::Program;

const LOAD_MNEMONICS: [&str; 5] = ["lb", "lh", "lw", "lbu", "lhu"];
const STORE_MNEMONICS: [&str; 3] = ["sb", "sh", "sw"];

fn line(tokens: &[&str]) -> Vec<String> {
    tokens.iter().map(|s| s.to_string()).collect()
}

/// Splits a 32-bit immediate into the `(hi20, lo12)` pair a `lui`+`addi` (or
/// `auipc`+low-half) encode, using the `+0x800` bias so the low half's sign
/// extension reconstructs the original value. See `§9` open question 3.
fn hi_lo_split(imm: i64) -> (i64, i64) {
    let hi = (imm.wrapping_add(0x800)) >> 12;
    let lo = imm - (hi << 12);
    (hi & 0xFFFFF, lo)
}

/// Expands one pseudo-instruction mnemonic into its canonical TAL form(s),
/// per `§4.4`. Returns `None` for mnemonics that are not pseudo-instructions,
/// in which case the caller passes the tokens through unchanged.
pub fn expand(tokens: &[String], program: &mut Program) -> Option<Vec<Vec<String>>> {
    let mnemonic = tokens[0].to_lowercase();
    let ops: Vec<&str> = tokens[1..].iter().map(|s| s.as_str()).collect();

    match mnemonic.as_str() {
        "li" if ops.len() == 2 => {
            let (rd, imm_tok) = (ops[0], ops[1]);
            match numeral::user_string_to_int(imm_tok) {
                Ok(imm) if (rv32im::IMM12_MIN..=rv32im::IMM12_MAX).contains(&imm) => {
                    Some(vec![line(&["addi", rd, "zero", imm_tok])])
                }
                Ok(imm) => {
                    let (hi, lo) = hi_lo_split(imm);
                    Some(vec![
                        line(&["lui", rd, &hi.to_string()]),
                        line(&["addi", rd, rd, &lo.to_string()]),
                    ])
                }
                // Not a literal: an `.equiv` name or other symbol, resolved
                // only once pass two merges equivs into `labels`. Defer to
                // `addi`'s own symbol resolution rather than failing here.
                Err(_) => Some(vec![line(&["addi", rd, "zero", imm_tok])]),
            }
        }
        "mv" if ops.len() == 2 => Some(vec![line(&["addi", ops[0], ops[1], "0"])]),
        "not" if ops.len() == 2 => Some(vec![line(&["xori", ops[0], ops[1], "-1"])]),
        "neg" if ops.len() == 2 => Some(vec![line(&["sub", ops[0], "zero", ops[1]])]),
        "seqz" if ops.len() == 2 => Some(vec![line(&["sltiu", ops[0], ops[1], "1"])]),
        "snez" if ops.len() == 2 => Some(vec![line(&["sltu", ops[0], "zero", ops[1]])]),
        "sltz" if ops.len() == 2 => Some(vec![line(&["slt", ops[0], ops[1], "zero"])]),
        "sgtz" if ops.len() == 2 => Some(vec![line(&["slt", ops[0], "zero", ops[1]])]),

        "beqz" if ops.len() == 2 => Some(vec![line(&["beq", ops[0], "zero", ops[1]])]),
        "bnez" if ops.len() == 2 => Some(vec![line(&["bne", ops[0], "zero", ops[1]])]),
        "blez" if ops.len() == 2 => Some(vec![line(&["bge", "zero", ops[0], ops[1]])]),
        "bgez" if ops.len() == 2 => Some(vec![line(&["bge", ops[0], "zero", ops[1]])]),
        "bltz" if ops.len() == 2 => Some(vec![line(&["blt", ops[0], "zero", ops[1]])]),
        "bgtz" if ops.len() == 2 => Some(vec![line(&["blt", "zero", ops[0], ops[1]])]),
        "ble" if ops.len() == 3 => Some(vec![line(&["bge", ops[1], ops[0], ops[2]])]),
        "bgt" if ops.len() == 3 => Some(vec![line(&["blt", ops[1], ops[0], ops[2]])]),
        "bleu" if ops.len() == 3 => Some(vec![line(&["bgeu", ops[1], ops[0], ops[2]])]),
        "bgtu" if ops.len() == 3 => Some(vec![line(&["bltu", ops[1], ops[0], ops[2]])]),

        "j" if ops.len() == 1 => Some(vec![line(&["jal", "zero", ops[0]])]),
        "jr" if ops.len() == 1 => Some(vec![line(&["jalr", "zero", "0", ops[0]])]),
        "ret" if ops.is_empty() => Some(vec![line(&["jalr", "zero", "0", "ra"])]),
        "call" if ops.len() == 1 => {
            let symbol = ops[0];
            let hi_offset = program.current_offset();
            program.add_relocation_at(hi_offset, RelocationKind::PcRelHi, symbol.to_string(), 0);
            program.add_relocation_at(hi_offset + rv32im::INSTRUCTION_BYTES, RelocationKind::PcRelLo, symbol.to_string(), 0);
            Some(vec![
                line(&["auipc", "ra", "0"]),
                line(&["jalr", "ra", "0", "ra"]),
            ])
        }
        "la" if ops.len() == 2 => {
            let (rd, symbol) = (ops[0], ops[1]);
            let hi_offset = program.current_offset();
            program.add_relocation_at(hi_offset, RelocationKind::PcRelHi, symbol.to_string(), 0);
            program.add_relocation_at(hi_offset + rv32im::INSTRUCTION_BYTES, RelocationKind::PcRelLo, symbol.to_string(), 0);
            Some(vec![
                line(&["auipc", rd, "0"]),
                line(&["addi", rd, rd, "0"]),
            ])
        }

        _ if LOAD_MNEMONICS.contains(&mnemonic.as_str()) && ops.len() == 2 => {
            let (rd, operand) = (ops[0], ops[1]);
            if numeral::user_string_to_int(operand).is_ok() {
                Some(vec![line(&[&mnemonic, rd, operand, "zero"])])
            } else {
                let hi_offset = program.current_offset();
                program.add_relocation_at(hi_offset, RelocationKind::PcRelHi, operand.to_string(), 0);
                program.add_relocation_at(hi_offset + rv32im::INSTRUCTION_BYTES, RelocationKind::PcRelLo, operand.to_string(), 0);
                Some(vec![
                    line(&["auipc", rd, "0"]),
                    line(&[&mnemonic, rd, "0", rd]),
                ])
            }
        }

        _ if STORE_MNEMONICS.contains(&mnemonic.as_str()) && ops.len() == 3 => {
            let (rs, operand, temp) = (ops[0], ops[1], ops[2]);
            if numeral::user_string_to_int(operand).is_ok() {
                None
            } else {
                let hi_offset = program.current_offset();
                program.add_relocation_at(hi_offset, RelocationKind::PcRelHi, operand.to_string(), 0);
                program.add_relocation_at(hi_offset + rv32im::INSTRUCTION_BYTES, RelocationKind::PcRelLoStore, operand.to_string(), 0);
                Some(vec![
                    line(&["auipc", temp, "0"]),
                    line(&[&mnemonic, rs, "0", temp]),
                ])
            }
        }

        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn li_with_small_immediate_expands_to_addi() {
        let mut program = Program::new();
        let expanded = expand(&line(&["li", "x1", "5"]), &mut program).unwrap();
        assert_eq!(expanded, vec![line(&["addi", "x1", "zero", "5"])]);
    }

    #[test]
    fn li_with_large_immediate_expands_to_lui_addi() {
        let mut program = Program::new();
        let expanded = expand(&line(&["li", "x1", "0x7FFFF800"]), &mut program).unwrap();
        assert_eq!(expanded.len(), 2);
        assert_eq!(expanded[0][0], "lui");
        assert_eq!(expanded[1][0], "addi");
    }

    #[test]
    fn ble_swaps_operands_to_bge() {
        let mut program = Program::new();
        let expanded = expand(&line(&["ble", "x1", "x2", "done"]), &mut program).unwrap();
        assert_eq!(expanded, vec![line(&["bge", "x2", "x1", "done"])]);
    }

    #[test]
    fn unknown_mnemonic_passes_through() {
        let mut program = Program::new();
        assert!(expand(&line(&["addi", "x1", "x0", "5"]), &mut program).is_none());
    }

    #[test]
    fn la_requests_pcrel_hi_lo_relocations() {
        let mut program = Program::new();
        let expanded = expand(&line(&["la", "x5", "v"]), &mut program).unwrap();
        assert_eq!(expanded[0][0], "auipc");
        assert_eq!(expanded[1][0], "addi");
        assert_eq!(program.relocation_table.len(), 2);
    }
}
