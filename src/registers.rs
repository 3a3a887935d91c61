use std::fmt;
use std::str::FromStr;

use num_derive::{FromPrimitive, ToPrimitive};
use util::ParseEnumError;

/// One of the 32 general-purpose registers. `Zero` is hard-wired: reads
/// always return 0 and writes are silently dropped.
#[derive(Clone, Copy, PartialEq, Eq, Debug, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum RegisterId {
    Zero = 0,
    Ra,
    Sp,
    Gp,
    Tp,
    T0,
    T1,
    T2,
    S0,
    S1,
    A0,
    A1,
    A2,
    A3,
    A4,
    A5,
    A6,
    A7,
    S2,
    S3,
    S4,
    S5,
    S6,
    S7,
    S8,
    S9,
    S10,
    S11,
    T3,
    T4,
    T5,
    T6,
}

/// ABI name table indexed by register number, matching the canonical RISC-V
/// calling convention names.
const ABI_NAMES: [&str; 32] = [
    "zero", "ra", "sp", "gp", "tp", "t0", "t1", "t2", "s0", "s1", "a0", "a1", "a2", "a3", "a4",
    "a5", "a6", "a7", "s2", "s3", "s4", "s5", "s6", "s7", "s8", "s9", "s10", "s11", "t3", "t4",
    "t5", "t6",
];

impl RegisterId {
    pub fn number(self) -> u32 {
        self as u32
    }

    pub fn from_number(n: u32) -> Option<RegisterId> {
        if n < 32 {
            num_traits::FromPrimitive::from_u32(n)
        } else {
            None
        }
    }

    pub fn abi_name(self) -> &'static str {
        ABI_NAMES[self as usize]
    }
}

impl fmt::Display for RegisterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.abi_name())
    }
}

/// Accepts both ABI names (`zero`, `ra`, `t0`, ...) and the numeric form
/// (`x0`..`x31`), per §6.3.
impl FromStr for RegisterId {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<RegisterId, ParseEnumError> {
        if let Some(pos) = ABI_NAMES.iter().position(|&name| name == s) {
            return RegisterId::from_number(pos as u32).ok_or_else(|| parse_error(s));
        }
        if let Some(rest) = s.strip_prefix('x') {
            if let Ok(n) = rest.parse::<u32>() {
                return RegisterId::from_number(n).ok_or_else(|| parse_error(s));
            }
        }
        Err(parse_error(s))
    }
}

fn parse_error(s: &str) -> ParseEnumError {
    ParseEnumError {
        value: s.to_string(),
        enum_name: "RegisterId",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_abi_and_numeric_names() {
        assert_eq!("zero".parse::<RegisterId>().unwrap(), RegisterId::Zero);
        assert_eq!("t0".parse::<RegisterId>().unwrap(), RegisterId::T0);
        assert_eq!("x5".parse::<RegisterId>().unwrap(), RegisterId::T0);
        assert_eq!("x31".parse::<RegisterId>().unwrap(), RegisterId::T6);
        assert!("x32".parse::<RegisterId>().is_err());
        assert!("garbage".parse::<RegisterId>().is_err());
    }

    #[test]
    fn number_round_trips() {
        for n in 0..32u32 {
            let reg = RegisterId::from_number(n).unwrap();
            assert_eq!(reg.number(), n);
        }
    }
}
