use thiserror::Error;

/// Raised by [`user_string_to_int`] and the symbol-offset helpers below.
#[derive(Error, Clone, PartialEq, Eq, Debug)]
pub enum NumberFormatError {
    #[error("'{0}' is not a valid number")]
    Malformed(String),
    #[error("'{0}' overflows a 32-bit value")]
    Overflow(String),
}

/// Decodes the standard C escapes accepted inside a character or string
/// literal (`\n`, `\t`, `\\`, `\'`, `\"`, `\0`) plus a literal passthrough for
/// anything else.
fn decode_escape(c: char) -> char {
    match c {
        'n' => '\n',
        't' => '\t',
        'r' => '\r',
        '0' => '\0',
        '\\' => '\\',
        '\'' => '\'',
        '"' => '"',
        other => other,
    }
}

/// Implements `§4.2 userStringToInt`: a character literal, or a signed
/// integer in decimal, `0x` hex, or `0b` binary, parsed as 64-bit and
/// truncated to 32 bits.
pub fn user_string_to_int(s: &str) -> Result<i64, NumberFormatError> {
    if let Some(rest) = s.strip_prefix('\'') {
        return parse_char_literal(s, rest);
    }

    let (sign, unsigned) = match s.strip_prefix('-') {
        Some(rest) => (-1i64, rest),
        None => (1i64, s.strip_prefix('+').unwrap_or(s)),
    };

    if unsigned.is_empty() {
        return Err(NumberFormatError::Malformed(s.to_string()));
    }

    let (radix, digits) = if let Some(rest) = unsigned.strip_prefix("0x") {
        (16u32, rest)
    } else if let Some(rest) = unsigned.strip_prefix("0b") {
        (2u32, rest)
    } else {
        (10u32, unsigned)
    };

    if digits.is_empty() {
        return Err(NumberFormatError::Malformed(s.to_string()));
    }

    let magnitude =
        i64::from_str_radix(digits, radix).map_err(|_| NumberFormatError::Malformed(s.to_string()))?;
    let value = sign * magnitude;

    if value < i64::from(i32::min_value()) || value > i64::from(u32::max_value()) {
        return Err(NumberFormatError::Overflow(s.to_string()));
    }

    Ok(i64::from(value as i32))
}

fn parse_char_literal(original: &str, rest: &str) -> Result<i64, NumberFormatError> {
    if !rest.ends_with('\'') || rest.len() < 2 {
        return Err(NumberFormatError::Malformed(original.to_string()));
    }
    let body = &rest[..rest.len() - 1];
    let mut chars = body.chars();
    let value = match chars.next() {
        Some('\\') => chars
            .next()
            .map(decode_escape)
            .ok_or_else(|| NumberFormatError::Malformed(original.to_string()))?,
        Some(c) => c,
        None => return Err(NumberFormatError::Malformed(original.to_string())),
    };
    if chars.next().is_some() {
        return Err(NumberFormatError::Malformed(original.to_string()));
    }
    Ok(value as i64)
}

/// Splits a label operand `sym`, `sym+N`, `sym-N`, `sym+absSym` or
/// `sym-absSym` into its symbol part and an optional `(sign, remainder)`,
/// per `§4.2 symbolPart`/`labelOffsetPart`. The remainder is either a decimal
/// integer or another `.equiv`-defined symbol name; resolving it is the
/// caller's job, since that requires the label table.
///
/// A hand-written scan for the first top-level `+`/`-` is used in place of a
/// regex, per the design notes: it is no less clear and avoids pulling in a
/// regex engine for one line of logic.
pub fn split_symbol_offset(s: &str) -> (&str, Option<(i64, &str)>) {
    for (i, c) in s.char_indices().skip(1) {
        if c == '+' || c == '-' {
            let sign = if c == '-' { -1 } else { 1 };
            return (&s[..i], Some((sign, &s[i + 1..])));
        }
    }
    (s, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_decimal_hex_binary() {
        assert_eq!(user_string_to_int("42").unwrap(), 42);
        assert_eq!(user_string_to_int("-42").unwrap(), -42);
        assert_eq!(user_string_to_int("0xFF").unwrap(), 255);
        assert_eq!(user_string_to_int("0b101").unwrap(), 5);
        assert_eq!(user_string_to_int("-0x10").unwrap(), -16);
    }

    #[test]
    fn parses_char_literal() {
        assert_eq!(user_string_to_int("'a'").unwrap(), 'a' as i64);
        assert_eq!(user_string_to_int("'\\n'").unwrap(), '\n' as i64);
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(user_string_to_int("").is_err());
        assert!(user_string_to_int("abc").is_err());
        assert!(user_string_to_int("0x").is_err());
    }

    #[test]
    fn splits_symbol_and_offset() {
        assert_eq!(split_symbol_offset("main"), ("main", None));
        assert_eq!(split_symbol_offset("main+4"), ("main", Some((1, "4"))));
        assert_eq!(split_symbol_offset("v-12"), ("v", Some((-1, "12"))));
    }
}
