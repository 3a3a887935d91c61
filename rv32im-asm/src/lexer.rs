use rv32im::Token;

use crate::error::LexError;

fn is_delimiter(c: char) -> bool {
    c.is_whitespace() || c == ',' || c == '(' || c == ')' || c == '#' || c == '\'' || c == '"'
}

/// Splits one source line into its labels and instruction/directive tokens,
/// per `§4.1`. Comments, string/char literals and the `(reg)` base-register
/// syntax are handled here; nothing past this point does character-level work.
pub fn lex(line: &str) -> Result<(Vec<String>, Vec<Token>), LexError> {
    let chars: Vec<char> = line.chars().collect();
    let len = chars.len();
    let mut labels = Vec::new();
    let mut tokens: Vec<Token> = Vec::new();
    let mut seen_instruction_token = false;
    let mut i = 0;

    while i < len {
        let c = chars[i];

        if c == '#' {
            break;
        }
        if c.is_whitespace() || c == ',' || c == '(' || c == ')' {
            i += 1;
            continue;
        }

        if c == '\'' {
            let start = i;
            i += 1;
            if i < len && chars[i] == '\\' {
                i += 2;
            } else if i < len {
                i += 1;
            } else {
                return Err(LexError::UnterminatedChar);
            }
            if i >= len || chars[i] != '\'' {
                return Err(LexError::UnterminatedChar);
            }
            i += 1;
            tokens.push(chars[start..i].iter().collect());
            seen_instruction_token = true;
            continue;
        }

        if c == '"' {
            let start = i;
            i += 1;
            loop {
                if i >= len {
                    return Err(LexError::UnterminatedString);
                }
                if chars[i] == '\\' {
                    i += 2;
                    continue;
                }
                if chars[i] == '"' {
                    i += 1;
                    break;
                }
                i += 1;
            }
            tokens.push(chars[start..i].iter().collect());
            seen_instruction_token = true;
            continue;
        }

        let start = i;
        while i < len && !is_delimiter(chars[i]) {
            i += 1;
        }
        let word: String = chars[start..i].iter().collect();

        let mut j = i;
        while j < len && chars[j].is_whitespace() {
            j += 1;
        }
        if j < len && chars[j] == ':' {
            if seen_instruction_token {
                return Err(LexError::LabelMidInstruction);
            }
            labels.push(word);
            i = j + 1;
            continue;
        }

        tokens.push(word);
        seen_instruction_token = true;
    }

    Ok((labels, tokens))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_label_and_tokens() {
        let (labels, tokens) = lex("start: addi x1, x0, 5").unwrap();
        assert_eq!(labels, vec!["start"]);
        assert_eq!(tokens, vec!["addi", "x1", "x0", "5"]);
    }

    #[test]
    fn strips_parens_around_base_register() {
        let (_, tokens) = lex("lw x2, -40(x1)").unwrap();
        assert_eq!(tokens, vec!["lw", "x2", "-40", "x1"]);
    }

    #[test]
    fn comment_is_ignored() {
        let (_, tokens) = lex("addi x1, x0, 5 # load five").unwrap();
        assert_eq!(tokens, vec!["addi", "x1", "x0", "5"]);
    }

    #[test]
    fn string_literal_is_one_token() {
        let (_, tokens) = lex(r#".string "hi \"there\"""#).unwrap();
        assert_eq!(tokens, vec![".string", r#""hi \"there\"""#]);
    }

    #[test]
    fn label_after_instruction_token_errors() {
        assert_eq!(lex("addi x1, x0, 5 start:"), Err(LexError::LabelMidInstruction));
    }

    #[test]
    fn unterminated_string_errors() {
        assert_eq!(lex(r#".string "oops"#), Err(LexError::UnterminatedString));
    }
}
