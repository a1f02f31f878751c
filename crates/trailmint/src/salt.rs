//! Deterministic user salt.
//!
//! The salt is the one input to address derivation that is neither in the
//! identity token nor chosen by the user. Deriving it from the email claim
//! keeps addresses stable across sessions without a salt lookup service.
//!
//! Scheme v1: a 128-bit wrapping polynomial hash over the UTF-8 bytes of the
//! claim,
//!
//! ```text
//! h_0     = SALT_OFFSET
//! h_{i+1} = h_i * SALT_MULTIPLIER + byte_i   (mod 2^128)
//! ```
//!
//! rendered as a non-negative decimal integer. The constants are versioned
//! ([`SALT_SCHEME_VERSION`]); changing them reassigns every address.

use core::{fmt, num::ParseIntError, str::FromStr};

use serde::{Deserialize, Serialize, de::Error as _};

use crate::constants::{SALT_MULTIPLIER, SALT_OFFSET, SALT_SCHEME_VERSION};

/// A user salt: a 128-bit unsigned integer.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Salt(u128);

impl Salt {
    /// Salt scheme this value was derived with.
    pub const VERSION: u8 = SALT_SCHEME_VERSION;

    /// Derive the salt for a stable identity claim (the email).
    #[must_use]
    pub fn derive(stable_claim: &str) -> Self {
        Self(
            stable_claim
                .bytes()
                .fold(SALT_OFFSET, |acc, byte| {
                    acc.wrapping_mul(SALT_MULTIPLIER)
                        .wrapping_add(u128::from(byte))
                }),
        )
    }

    /// Little-endian bytes, as fed into the address seed.
    #[must_use]
    pub const fn to_le_bytes(self) -> [u8; 16] {
        self.0.to_le_bytes()
    }
}

impl From<u128> for Salt {
    fn from(value: u128) -> Self {
        Self(value)
    }
}

impl From<Salt> for u128 {
    fn from(salt: Salt) -> Self {
        salt.0
    }
}

impl fmt::Display for Salt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for Salt {
    type Err = ParseIntError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        text.parse().map(Self)
    }
}

// Decimal string on the wire; JSON numbers cannot hold 128 bits.
impl Serialize for Salt {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Salt {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(D::Error::custom)
    }
}
