//! Two-pass assembler turning RV32IM source text into an unlinked
//! [`Program`](program::Program), ready to be handed to `rv32im-obj`'s linker.

pub mod error;
pub mod lexer;
pub mod pass_one;
pub mod pass_two;
pub mod program;
pub mod pseudo;

pub use error::{AssembleError, ErrorKind};
pub use program::Program;

/// Assembles one compilation unit. Pass one runs to completion regardless of
/// errors so the caller sees as many diagnostics as possible; pass two only
/// runs if pass one produced none, per `§7`.
pub fn assemble(source: &str) -> Result<Program, Vec<AssembleError>> {
    let mut program = Program::new();
    let pass_one_errors = pass_one::run(&mut program, source);
    if !pass_one_errors.is_empty() {
        return Err(pass_one_errors);
    }

    let pass_two_errors = pass_two::run(&mut program);
    if !pass_two_errors.is_empty() {
        return Err(pass_two_errors);
    }

    Ok(program)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assembles_arithmetic_scenario() {
        let program = assemble("addi x1, x0, 5\naddi x2, x1, 5\nadd x3, x1, x2\nandi x3, x3, 8\n").unwrap();
        assert_eq!(program.insts.len(), 4);
    }

    #[test]
    fn equiv_chain_resolves_through_li() {
        let program = assemble(".equiv A, 3\n.equiv B, A\n.equiv C, B\nli x1, C\n").unwrap();
        assert_eq!(program.insts.len(), 1);
    }

    #[test]
    fn circular_equiv_is_an_error() {
        let errors = assemble(".equiv A, B\n.equiv B, A\nnop_placeholder:\n").unwrap_err();
        assert!(errors.iter().any(|e| matches!(e.kind, crate::error::ErrorKind::Label(crate::error::LabelError::CircularEquiv(_)))));
    }

    #[test]
    fn unknown_mnemonic_is_reported_in_pass_two() {
        let errors = assemble("frobnicate x1, x2\n").unwrap_err();
        assert_eq!(errors.len(), 1);
    }
}
