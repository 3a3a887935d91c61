/// A single lexical token. The lexer never interprets tokens semantically;
/// numeral and symbol parsing happen downstream, in the instruction parsers.
pub type Token = String;
