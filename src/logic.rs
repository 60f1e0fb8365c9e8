//! Nine-state logic values and their bit-vector string encoding.
//!
//! The alphabet is the standard nine-value set `U X 0 1 Z W L H -`. A vector
//! is encoded leftmost logical index first.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{GpiError, GpiResult};

/// One nine-state logic value.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Logic {
    Uninitialized,
    Unknown,
    Zero,
    One,
    HighZ,
    WeakUnknown,
    WeakZero,
    WeakOne,
    DontCare,
}

impl Logic {
    /// All nine states in declaration order.
    pub const ALL: [Self; 9] = [
        Self::Uninitialized,
        Self::Unknown,
        Self::Zero,
        Self::One,
        Self::HighZ,
        Self::WeakUnknown,
        Self::WeakZero,
        Self::WeakOne,
        Self::DontCare,
    ];

    /// Encodes the state as its single-character form.
    #[must_use]
    pub const fn to_char(self) -> char {
        match self {
            Self::Uninitialized => 'U',
            Self::Unknown => 'X',
            Self::Zero => '0',
            Self::One => '1',
            Self::HighZ => 'Z',
            Self::WeakUnknown => 'W',
            Self::WeakZero => 'L',
            Self::WeakOne => 'H',
            Self::DontCare => '-',
        }
    }

    /// Decodes a single character. Lower-case letters are accepted.
    ///
    /// # Errors
    /// `InvalidValue` for characters outside the nine-state alphabet.
    pub fn from_char(c: char) -> GpiResult<Self> {
        Ok(match c.to_ascii_uppercase() {
            'U' => Self::Uninitialized,
            'X' => Self::Unknown,
            '0' => Self::Zero,
            '1' => Self::One,
            'Z' => Self::HighZ,
            'W' => Self::WeakUnknown,
            'L' => Self::WeakZero,
            'H' => Self::WeakOne,
            '-' => Self::DontCare,
            other => {
                return Err(GpiError::invalid_value(format!(
                    "'{other}' is not a logic character"
                )))
            }
        })
    }

    /// Strength-reduced two-state value, if resolvable.
    #[must_use]
    pub const fn to_bool(self) -> Option<bool> {
        match self {
            Self::Zero | Self::WeakZero => Some(false),
            Self::One | Self::WeakOne => Some(true),
            _ => None,
        }
    }
}

impl fmt::Display for Logic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_char())
    }
}

/// Decodes a bit-vector string into logic states, leftmost first.
///
/// # Errors
/// `InvalidValue` if any character is outside the alphabet.
pub fn decode_binstr(binstr: &str) -> GpiResult<Vec<Logic>> {
    binstr.chars().map(Logic::from_char).collect()
}

/// Encodes logic states as a bit-vector string, leftmost first.
#[must_use]
pub fn encode_binstr(bits: &[Logic]) -> String {
    bits.iter().map(|b| b.to_char()).collect()
}

/// Interprets a bit-vector string as a two's-complement integer of its own width.
///
/// # Errors
/// `InvalidValue` if the string holds unresolvable states or is wider than 64 bits.
pub fn binstr_to_i64(binstr: &str, signed: bool) -> GpiResult<i64> {
    if binstr.len() > 64 {
        return Err(GpiError::invalid_value(format!(
            "{} bits do not fit in a 64-bit integer",
            binstr.len()
        )));
    }
    let mut acc: u64 = 0;
    for c in binstr.chars() {
        let bit = Logic::from_char(c)?.to_bool().ok_or_else(|| {
            GpiError::invalid_value(format!("'{binstr}' contains unresolvable state '{c}'"))
        })?;
        acc = (acc << 1) | u64::from(bit);
    }
    let width = binstr.len();
    if signed && width > 0 && width < 64 && (acc >> (width - 1)) & 1 == 1 {
        acc |= u64::MAX << width;
    }
    #[allow(clippy::cast_possible_wrap)]
    Ok(acc as i64)
}

/// Renders an integer as a bit-vector string of `width` bits (two's complement, truncated).
#[must_use]
pub fn i64_to_binstr(value: i64, width: usize) -> String {
    #[allow(clippy::cast_sign_loss)]
    let raw = value as u64;
    (0..width)
        .rev()
        .map(|bit| {
            if bit < 64 && (raw >> bit) & 1 == 1 {
                '1'
            } else if bit >= 64 && value < 0 {
                '1'
            } else {
                '0'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_nine_states_roundtrip() {
        for state in Logic::ALL {
            assert_eq!(Logic::from_char(state.to_char()).unwrap(), state);
        }
    }

    #[test]
    fn test_vector_preserves_order() {
        let bits = decode_binstr("10XZ").unwrap();
        assert_eq!(
            bits,
            vec![Logic::One, Logic::Zero, Logic::Unknown, Logic::HighZ]
        );
        assert_eq!(encode_binstr(&bits), "10XZ");
        assert_eq!(encode_binstr(&decode_binstr("UX01ZWLH-").unwrap()), "UX01ZWLH-");
    }

    #[test]
    fn test_lowercase_accepted() {
        assert_eq!(encode_binstr(&decode_binstr("xzh").unwrap()), "XZH");
    }

    #[test]
    fn test_rejects_foreign_characters() {
        assert!(decode_binstr("10a1").is_err());
    }

    #[test]
    fn test_binstr_integer_conversion() {
        assert_eq!(binstr_to_i64("1010", false).unwrap(), 10);
        assert_eq!(binstr_to_i64("1010", true).unwrap(), -6);
        assert_eq!(binstr_to_i64("HL", false).unwrap(), 2);
        assert!(binstr_to_i64("1X", false).is_err());
        assert_eq!(i64_to_binstr(10, 4), "1010");
        assert_eq!(i64_to_binstr(-1, 3), "111");
        assert_eq!(i64_to_binstr(5, 1), "1");
    }
}
