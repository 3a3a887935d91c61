use rv32im::numeral::{self, NumberFormatError};
use rv32im::RelocationKind;

use crate::error::{AssembleError, DirectiveError, ErrorKind, LabelError};
use crate::lexer::lex;
use crate::program::{Program, Segment};
use crate::pseudo;

fn segment_name(segment: Segment) -> &'static str {
    match segment {
        Segment::Text => "text",
        Segment::Rodata => "rodata",
        Segment::Data => "data",
    }
}

/// Runs pass one (`§4.3`) over every line of `source`, mutating `program` in
/// place and collecting every error rather than stopping at the first one.
pub fn run(program: &mut Program, source: &str) -> Vec<AssembleError> {
    let mut errors = Vec::new();

    for (idx, raw_line) in source.lines().enumerate() {
        let line_no = idx as u32 + 1;
        if let Err(e) = process_line(program, line_no, raw_line) {
            errors.push(e);
        }
    }

    errors
}

fn process_line(program: &mut Program, line_no: u32, raw_line: &str) -> Result<(), AssembleError> {
    let (labels, tokens) = lex(raw_line).map_err(|e| AssembleError::new(line_no, e.into()))?;

    for label in &labels {
        program
            .add_label(label)
            .map_err(|e| AssembleError::new(line_no, e.into()))?;
    }

    if tokens.is_empty() {
        return Ok(());
    }

    if tokens[0].starts_with('.') {
        process_directive(program, line_no, &tokens)
    } else {
        process_instruction(program, line_no, raw_line, &tokens)
    }
}

fn process_instruction(
    program: &mut Program,
    line_no: u32,
    raw_line: &str,
    tokens: &[String],
) -> Result<(), AssembleError> {
    if program.current_segment != Segment::Text {
        return Err(AssembleError::new(
            line_no,
            ErrorKind::Directive(DirectiveError::WrongSegment(
                tokens[0].clone(),
                segment_name(program.current_segment),
            )),
        ));
    }

    let expanded = pseudo::expand(tokens, program).unwrap_or_else(|| vec![tokens.to_vec()]);
    for line in expanded {
        program.push_tal(line_no, raw_line.to_string(), line);
    }
    Ok(())
}

fn directive_name(tok: &str) -> &str {
    &tok[1..]
}

fn parse_int(tok: &str) -> Result<i64, NumberFormatError> {
    numeral::user_string_to_int(tok)
}

fn process_directive(program: &mut Program, line_no: u32, tokens: &[String]) -> Result<(), AssembleError> {
    let name = directive_name(&tokens[0]);
    let err = |kind: DirectiveError| AssembleError::new(line_no, kind.into());

    match name {
        "text" => {
            program.current_segment = Segment::Text;
            Ok(())
        }
        "rodata" => {
            program.current_segment = Segment::Rodata;
            Ok(())
        }
        "data" => {
            program.current_segment = Segment::Data;
            Ok(())
        }
        "byte" => emit_values(program, line_no, &tokens[1..], 1),
        "half" => emit_values(program, line_no, &tokens[1..], 2),
        "word" => emit_words(program, line_no, &tokens[1..]),
        "string" | "asciiz" => emit_string(program, line_no, &tokens[1..]),
        "space" => {
            if program.current_segment == Segment::Text {
                return Err(err(DirectiveError::WrongSegment(name.to_string(), "text")));
            }
            let n = tokens
                .get(1)
                .ok_or_else(|| err(DirectiveError::InvalidArgument(name.to_string(), "missing length".to_string())))?;
            let n = parse_int(n).map_err(|e| err(DirectiveError::InvalidArgument(name.to_string(), e.to_string())))?;
            if n < 0 {
                return Err(err(DirectiveError::InvalidArgument(name.to_string(), "negative length".to_string())));
            }
            write_bytes(program, &vec![0u8; n as usize]);
            Ok(())
        }
        "align" => {
            if program.current_segment == Segment::Text {
                return Err(err(DirectiveError::WrongSegment(name.to_string(), "text")));
            }
            let k = tokens
                .get(1)
                .ok_or_else(|| err(DirectiveError::InvalidArgument(name.to_string(), "missing alignment".to_string())))?;
            let k = parse_int(k).map_err(|e| err(DirectiveError::InvalidArgument(name.to_string(), e.to_string())))?;
            if !(0..=8).contains(&k) {
                return Err(err(DirectiveError::InvalidArgument(name.to_string(), "k must be in [0, 8]".to_string())));
            }
            let modulus = 1i64 << k;
            let current = i64::from(segment_size(program));
            let pad = (modulus - (current % modulus)) % modulus;
            write_bytes(program, &vec![0u8; pad as usize]);
            Ok(())
        }
        "globl" | "global" => {
            let label = tokens
                .get(1)
                .ok_or_else(|| err(DirectiveError::InvalidArgument(name.to_string(), "missing label".to_string())))?;
            program.global_labels.insert(label.clone());
            Ok(())
        }
        "equiv" | "equ" | "set" => {
            let label = tokens
                .get(1)
                .ok_or_else(|| err(DirectiveError::InvalidArgument(name.to_string(), "missing name".to_string())))?;
            let expr = tokens
                .get(2)
                .ok_or_else(|| err(DirectiveError::InvalidArgument(name.to_string(), "missing expression".to_string())))?;
            if name == "equiv" && program.equivs.contains_key(label) {
                return Err(AssembleError::new(
                    line_no,
                    LabelError::DuplicateLocal(label.clone()).into(),
                ));
            }
            program.equivs.insert(label.clone(), expr.clone());
            Ok(())
        }
        "float" | "double" => {
            log::warn!("line {}: '.{}' is accepted but ignored (floating point is unsupported)", line_no, name);
            Ok(())
        }
        other => Err(err(DirectiveError::Unknown(other.to_string()))),
    }
}

fn segment_size(program: &Program) -> u32 {
    match program.current_segment {
        Segment::Text => program.text_size,
        Segment::Rodata => program.rodata_size,
        Segment::Data => program.data_size,
    }
}

fn write_bytes(program: &mut Program, bytes: &[u8]) {
    match program.current_segment {
        Segment::Text => unreachable!("directives never run while emitting text"),
        Segment::Rodata => {
            program.rodata_segment.extend_from_slice(bytes);
            program.rodata_size += bytes.len() as u32;
        }
        Segment::Data => {
            program.data_segment.extend_from_slice(bytes);
            program.data_size += bytes.len() as u32;
        }
    }
}

fn emit_values(program: &mut Program, line_no: u32, operands: &[String], width: u32) -> Result<(), AssembleError> {
    if program.current_segment == Segment::Text {
        return Err(AssembleError::new(
            line_no,
            DirectiveError::WrongSegment("byte/half".to_string(), "text").into(),
        ));
    }
    for tok in operands {
        let value = parse_int(tok).map_err(|e| {
            AssembleError::new(line_no, DirectiveError::InvalidArgument("byte".to_string(), e.to_string()).into())
        })?;
        if width == 1 && !(rv32im::BYTE_DIRECTIVE_MIN..=rv32im::BYTE_DIRECTIVE_MAX).contains(&value) {
            return Err(AssembleError::new(
                line_no,
                DirectiveError::InvalidArgument("byte".to_string(), format!("{} out of range", value)).into(),
            ));
        }
        let bytes = (value as u32).to_le_bytes();
        write_bytes(program, &bytes[..width as usize]);
    }
    Ok(())
}

fn emit_words(program: &mut Program, line_no: u32, operands: &[String]) -> Result<(), AssembleError> {
    if program.current_segment == Segment::Text {
        return Err(AssembleError::new(line_no, DirectiveError::WrongSegment("word".to_string(), "text").into()));
    }
    for tok in operands {
        match parse_int(tok) {
            Ok(value) => write_bytes(program, &(value as u32).to_le_bytes()),
            Err(_) => {
                let offset = segment_size(program);
                let (symbol, rest) = numeral::split_symbol_offset(tok);
                let addend = match rest {
                    Some((sign, text)) => sign * parse_int(text).unwrap_or(0),
                    None => 0,
                };
                let kind = RelocationKind::Word;
                match program.current_segment {
                    Segment::Rodata => program.rodata_relocation_table.push(crate::program::RelocationEntry {
                        offset,
                        kind,
                        symbol: symbol.to_string(),
                        addend,
                    }),
                    Segment::Data => program.data_relocation_table.push(crate::program::RelocationEntry {
                        offset,
                        kind,
                        symbol: symbol.to_string(),
                        addend,
                    }),
                    Segment::Text => unreachable!(),
                }
                write_bytes(program, &[0u8; 4]);
            }
        }
    }
    Ok(())
}

fn emit_string(program: &mut Program, line_no: u32, operands: &[String]) -> Result<(), AssembleError> {
    if program.current_segment == Segment::Text {
        return Err(AssembleError::new(line_no, DirectiveError::WrongSegment("string".to_string(), "text").into()));
    }
    let tok = operands.get(0).ok_or_else(|| {
        AssembleError::new(line_no, DirectiveError::InvalidArgument("string".to_string(), "missing operand".to_string()).into())
    })?;
    let inner = tok
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .ok_or_else(|| AssembleError::new(line_no, DirectiveError::InvalidArgument("string".to_string(), "expected a quoted string".to_string()).into()))?;

    let mut bytes = Vec::new();
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        let resolved = if c == '\\' {
            match chars.next() {
                Some('n') => '\n',
                Some('t') => '\t',
                Some('r') => '\r',
                Some('0') => '\0',
                Some(other) => other,
                None => return Err(AssembleError::new(line_no, DirectiveError::InvalidArgument("string".to_string(), "trailing backslash".to_string()).into())),
            }
        } else {
            c
        };
        if !resolved.is_ascii() {
            return Err(AssembleError::new(
                line_no,
                DirectiveError::InvalidArgument("string".to_string(), "non-ASCII byte".to_string()).into(),
            ));
        }
        bytes.push(resolved as u8);
    }
    bytes.push(0);
    write_bytes(program, &bytes);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_and_directives_track_segment_offsets() {
        let mut program = Program::new();
        let errors = run(&mut program, ".data\nv: .word 42\n.text\nmain: addi x1, x0, 5\n");
        assert!(errors.is_empty(), "{:?}", errors);
        assert_eq!(program.labels["v"], i64::from(rv32im::STATIC_BEGIN));
        assert_eq!(program.labels["main"], 0);
        assert_eq!(program.tal.len(), 1);
    }

    #[test]
    fn duplicate_label_is_reported() {
        let mut program = Program::new();
        let errors = run(&mut program, "a: addi x1, x0, 1\na: addi x1, x0, 2\n");
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn instruction_outside_text_is_an_error() {
        let mut program = Program::new();
        let errors = run(&mut program, ".data\naddi x1, x0, 1\n");
        assert_eq!(errors.len(), 1);
    }
}
