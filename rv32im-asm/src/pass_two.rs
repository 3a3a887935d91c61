use std::collections::HashSet;

use rv32im::numeral;

use crate::error::{AssembleError, ErrorKind, LabelError};
use crate::program::Program;

/// Resolves every `.equiv`/`.equ`/`.set` chain to a concrete value and merges
/// it into `labels`, per the pre-step of `§4.5`.
fn resolve_equivs(program: &mut Program) -> Vec<AssembleError> {
    let mut errors = Vec::new();
    let mut resolved: Vec<(String, i64)> = Vec::new();
    let names: Vec<String> = program.equivs.keys().cloned().collect();

    for name in &names {
        let mut visiting = HashSet::new();
        match resolve_one(name, program, &resolved, &mut visiting) {
            Ok(value) => resolved.push((name.clone(), value)),
            Err(e) => errors.push(AssembleError::new(0, e.into())),
        }
    }

    for (name, value) in resolved {
        if program.labels.contains_key(&name) {
            errors.push(AssembleError::new(0, LabelError::LabelEquivConflict(name).into()));
        } else {
            program.labels.insert(name, value);
        }
    }
    program.equivs.clear();

    errors
}

fn resolve_one(
    name: &str,
    program: &Program,
    resolved: &[(String, i64)],
    visiting: &mut HashSet<String>,
) -> Result<i64, LabelError> {
    if let Some((_, value)) = resolved.iter().find(|(n, _)| n == name) {
        return Ok(*value);
    }
    if !visiting.insert(name.to_string()) {
        return Err(LabelError::CircularEquiv(name.to_string()));
    }

    let expr = program
        .equivs
        .get(name)
        .ok_or_else(|| LabelError::Undefined(name.to_string()))?;

    let value = if let Ok(v) = numeral::user_string_to_int(expr) {
        v
    } else if let Some(v) = program.labels.get(expr) {
        *v
    } else if program.equivs.contains_key(expr) {
        resolve_one(expr, program, resolved, visiting)?
    } else {
        return Err(LabelError::Undefined(expr.clone()));
    };

    visiting.remove(name);
    Ok(value)
}

/// Runs pass two (`§4.5`) over the TAL list pass one produced, filling in
/// `program.insts` and `program.debug_info` in order.
pub fn run(program: &mut Program) -> Vec<AssembleError> {
    let mut errors = resolve_equivs(program);
    if !errors.is_empty() {
        return errors;
    }

    program.text_size = 0;
    let tal = std::mem::take(&mut program.tal);

    for entry_line in &tal {
        let mnemonic = entry_line.tokens[0].to_lowercase();
        let operands = &entry_line.tokens[1..];

        match rv32im::table::lookup(&mnemonic) {
            Some(instr) => match instr.parse(operands, program) {
                Ok(mc) => {
                    program.insts.push(mc);
                    program.debug_info.push((entry_line.line_no, entry_line.source.clone()));
                    program.text_size += rv32im::INSTRUCTION_BYTES;
                }
                Err(issue) => errors.push(AssembleError::new(entry_line.line_no, ErrorKind::from(issue))),
            },
            None => errors.push(AssembleError::new(entry_line.line_no, ErrorKind::UnknownMnemonic(mnemonic))),
        }
    }

    program.tal = tal;
    errors
}
