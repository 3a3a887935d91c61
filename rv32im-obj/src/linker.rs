use std::collections::HashMap;

use rv32im_asm::program::{Program, RelocationEntry};
use rv32im::relocation::apply_data;
use rv32im::{relocation, MachineCode};
use thiserror::Error;

use crate::LinkedProgram;

#[derive(Error, Clone, PartialEq, Eq, Debug)]
pub enum LinkError {
    #[error("label {0} defined global in two different files")]
    DuplicateGlobal(String),
    #[error("'main' must be defined, global, and in the text segment")]
    MissingMain,
    #[error("label {0} used but not defined")]
    UndefinedSymbol(String),
    #[error("relocated value at offset {offset:#010x} does not fit the target field")]
    RelocationRange { offset: u32 },
}

struct UnitLayout {
    text_base: u32,
    rodata_base: u32,
    data_base: u32,
}

fn is_text(value: i64) -> bool {
    value < i64::from(rv32im::CONST_BEGIN)
}

fn is_rodata(value: i64) -> bool {
    value >= i64::from(rv32im::CONST_BEGIN) && value < i64::from(rv32im::STATIC_BEGIN)
}

/// Translates one unit's locally-tagged label offset to its final absolute
/// address, given that unit's base offsets in the linked image.
fn absolute(layout: &UnitLayout, local: i64) -> i64 {
    if is_text(local) {
        i64::from(layout.text_base) + local
    } else if is_rodata(local) {
        i64::from(layout.rodata_base) + (local - i64::from(rv32im::CONST_BEGIN))
    } else {
        i64::from(layout.data_base) + (local - i64::from(rv32im::STATIC_BEGIN))
    }
}

/// Links an ordered list of `(unit name, Program)` pairs into one
/// [`LinkedProgram`], per `§4.8`.
pub fn link(units: &[(String, Program)]) -> Result<LinkedProgram, LinkError> {
    let mut layouts = Vec::with_capacity(units.len());
    let (mut text_base, mut rodata_base, mut data_base) = (0u32, rv32im::CONST_BEGIN, rv32im::STATIC_BEGIN);
    for (_, program) in units {
        layouts.push(UnitLayout { text_base, rodata_base, data_base });
        text_base += program.text_size;
        rodata_base += program.rodata_size;
        data_base += program.data_size;
    }

    let mut global_table: HashMap<String, i64> = HashMap::new();
    for ((name, program), layout) in units.iter().zip(&layouts) {
        for label in &program.global_labels {
            let local = *program
                .labels
                .get(label)
                .ok_or_else(|| LinkError::UndefinedSymbol(label.clone()))?;
            let abs = absolute(layout, local);
            if global_table.insert(label.clone(), abs).is_some() {
                return Err(LinkError::DuplicateGlobal(label.clone()));
            }
            let _ = name;
        }
    }

    let start_pc = match global_table.get("main") {
        Some(&addr) if addr < i64::from(rv32im::CONST_BEGIN) => addr as u32,
        _ => return Err(LinkError::MissingMain),
    };

    let mut insts: Vec<MachineCode> = Vec::new();
    let mut rodata = Vec::new();
    let mut data = Vec::new();
    let mut debug_info = Vec::new();

    for ((name, program), layout) in units.iter().zip(&layouts) {
        insts.extend_from_slice(&program.insts);
        for (line_no, source) in &program.debug_info {
            debug_info.push((name.clone(), *line_no, source.clone()));
        }
        rodata.extend_from_slice(&program.rodata_segment);
        data.extend_from_slice(&program.data_segment);
        let _ = layout;
    }

    for ((_, program), layout) in units.iter().zip(&layouts) {
        apply_code_relocations(&mut insts, layout, &program.relocation_table, program, &global_table)?;
        apply_data_relocations(&mut rodata, layout.rodata_base, rv32im::CONST_BEGIN, layout, &program.rodata_relocation_table, program, &global_table)?;
        apply_data_relocations(&mut data, layout.data_base, rv32im::STATIC_BEGIN, layout, &program.data_relocation_table, program, &global_table)?;
    }

    log::debug!(
        "linked {} unit(s): {} instruction(s), {} byte(s) rodata, {} byte(s) data, start_pc {:#010x}",
        units.len(),
        insts.len(),
        rodata.len(),
        data.len(),
        start_pc
    );

    Ok(LinkedProgram { insts, rodata, data, start_pc, debug_info })
}

fn resolve_target(
    entry: &RelocationEntry,
    layout: &UnitLayout,
    program: &Program,
    global_table: &HashMap<String, i64>,
) -> Result<i64, LinkError> {
    if entry.symbol.is_empty() {
        return Ok(entry.addend);
    }
    if let Some(&local) = program.labels.get(&entry.symbol) {
        return Ok(absolute(layout, local) + entry.addend);
    }
    global_table
        .get(&entry.symbol)
        .map(|&addr| addr + entry.addend)
        .ok_or_else(|| LinkError::UndefinedSymbol(entry.symbol.clone()))
}

fn apply_code_relocations(
    insts: &mut [MachineCode],
    layout: &UnitLayout,
    entries: &[RelocationEntry],
    program: &Program,
    global_table: &HashMap<String, i64>,
) -> Result<(), LinkError> {
    for entry in entries {
        let target = resolve_target(entry, layout, program, global_table)?;
        let abs_offset = layout.text_base + entry.offset;
        let index = (abs_offset / rv32im::INSTRUCTION_BYTES) as usize;
        relocation::apply_code(entry.kind, &mut insts[index], abs_offset, target)
            .map_err(|_| LinkError::RelocationRange { offset: abs_offset })?;
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn apply_data_relocations(
    bytes: &mut [u8],
    unit_base: u32,
    segment_begin: u32,
    layout: &UnitLayout,
    entries: &[RelocationEntry],
    program: &Program,
    global_table: &HashMap<String, i64>,
) -> Result<(), LinkError> {
    for entry in entries {
        let target = resolve_target(entry, layout, program, global_table)?;
        let local_index = unit_base - segment_begin + entry.offset;
        apply_data(bytes, local_index as usize, target);
    }
    Ok(())
}
