use thiserror::Error;

use rv32im::table::ParseIssue;

/// One assembler diagnostic, tagged with the source line it came from.
/// Pass one accumulates these rather than aborting on the first one, so the
/// caller sees as many problems as possible in one run.
#[derive(Error, Clone, PartialEq, Eq, Debug)]
#[error("line {line}: {kind}")]
pub struct AssembleError {
    pub line: u32,
    pub kind: ErrorKind,
}

impl AssembleError {
    pub fn new(line: u32, kind: ErrorKind) -> AssembleError {
        AssembleError { line, kind }
    }
}

#[derive(Error, Clone, PartialEq, Eq, Debug)]
pub enum ErrorKind {
    #[error("lex error: {0}")]
    Lex(#[from] LexError),
    #[error("parse error: {0}")]
    Parse(ParseIssue),
    #[error("unknown mnemonic '{0}'")]
    UnknownMnemonic(String),
    #[error("range error: {0}")]
    Range(String),
    #[error("label error: {0}")]
    Label(#[from] LabelError),
    #[error("directive error: {0}")]
    Directive(#[from] DirectiveError),
}

impl From<ParseIssue> for ErrorKind {
    fn from(err: ParseIssue) -> ErrorKind {
        ErrorKind::Parse(err)
    }
}

#[derive(Error, Clone, PartialEq, Eq, Debug)]
pub enum LexError {
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("unterminated character literal")]
    UnterminatedChar,
    #[error("label in the middle of an instruction")]
    LabelMidInstruction,
    #[error("unexpected character '{0}'")]
    UnexpectedChar(char),
}

#[derive(Error, Clone, PartialEq, Eq, Debug)]
pub enum LabelError {
    #[error("label {0} defined twice")]
    DuplicateLocal(String),
    #[error("undefined symbol '{0}'")]
    Undefined(String),
    #[error("circularity in definition of {0}")]
    CircularEquiv(String),
    #[error("'{0}' is defined as both a label and an .equiv")]
    LabelEquivConflict(String),
}

#[derive(Error, Clone, PartialEq, Eq, Debug)]
pub enum DirectiveError {
    #[error("unknown directive '.{0}'")]
    Unknown(String),
    #[error("'.{0}' cannot be used in the {1} segment")]
    WrongSegment(String, &'static str),
    #[error("invalid argument to '.{0}': {1}")]
    InvalidArgument(String, String),
}
