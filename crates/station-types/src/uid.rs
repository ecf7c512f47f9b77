//! Bricklet unit identifiers.
//!
//! The brick daemon reports UIDs as 32-bit integers; humans see them as
//! base58 strings (`"dXj"`) printed on the hardware and in brickv.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const ALPHABET: &[u8; 58] = b"123456789abcdefghijkmnopqrstuvwxyzABCDEFGHJKLMNPQRSTUVWXYZ";

/// Identity of one physical bricklet. `Uid::NONE` (zero) means "no unit".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Uid(u32);

impl Uid {
    pub const NONE: Uid = Uid(0);

    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    pub const fn value(self) -> u32 {
        self.0
    }

    /// Whether this identifies an actual unit.
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl From<u32> for Uid {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

/// Returned when a string is not a base58 UID.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseUidError {
    #[error("empty uid")]
    Empty,
    #[error("invalid base58 character '{0}' in uid")]
    InvalidCharacter(char),
    #[error("uid does not fit in 32 bits")]
    Overflow,
}

impl FromStr for Uid {
    type Err = ParseUidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ParseUidError::Empty);
        }
        let mut value: u64 = 0;
        for c in s.chars() {
            let digit = ALPHABET
                .iter()
                .position(|&a| a as char == c)
                .ok_or(ParseUidError::InvalidCharacter(c))?;
            value = value * 58 + digit as u64;
            if value > u64::from(u32::MAX) {
                return Err(ParseUidError::Overflow);
            }
        }
        Ok(Uid(value as u32))
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut value = self.0;
        let mut digits = Vec::with_capacity(6);
        loop {
            digits.push(ALPHABET[(value % 58) as usize]);
            value /= 58;
            if value == 0 {
                break;
            }
        }
        digits.reverse();
        f.write_str(&String::from_utf8_lossy(&digits))
    }
}

impl TryFrom<String> for Uid {
    type Error = ParseUidError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Uid> for String {
    fn from(uid: Uid) -> Self {
        uid.to_string()
    }
}
