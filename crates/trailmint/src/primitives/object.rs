use core::{fmt, str::FromStr};

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize, de::Error as _};

/// Failure parsing an object id or digest from its text form.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ParseObjectError {
    /// Not valid hex, or longer than 32 bytes.
    #[error("invalid object id `{0}`")]
    Id(String),

    /// Not valid base58, or not exactly 32 bytes.
    #[error("invalid object digest `{0}`")]
    Digest(String),
}

/// A 32-byte ledger object id, written as `0x`-prefixed hex.
///
/// Short forms such as `0x2` are left-padded with zeros.
#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, BorshDeserialize, BorshSerialize,
)]
pub struct ObjectId([u8; 32]);

impl ObjectId {
    /// The raw id bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl From<[u8; 32]> for ObjectId {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for ObjectId {
    type Err = ParseObjectError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        parse_hex32(text).map(Self)
    }
}

/// Parses `0x`-prefixed (or bare) hex into 32 bytes, left-padding short
/// input with zeros.
pub(crate) fn parse_hex32(text: &str) -> Result<[u8; 32], ParseObjectError> {
    let invalid = || ParseObjectError::Id(text.to_owned());
    let digits = text.strip_prefix("0x").unwrap_or(text);
    if digits.is_empty() || digits.len() > 64 {
        return Err(invalid());
    }
    let padded = format!("{digits:0>64}");
    let mut bytes = [0u8; 32];
    hex::decode_to_slice(padded, &mut bytes).map_err(|_err| invalid())?;
    Ok(bytes)
}

impl Serialize for ObjectId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = <String as Deserialize>::deserialize(deserializer)?;
        text.parse().map_err(D::Error::custom)
    }
}

/// A 32-byte object content digest, written as base58.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, BorshDeserialize, BorshSerialize)]
pub struct ObjectDigest([u8; 32]);

impl From<[u8; 32]> for ObjectDigest {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for ObjectDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(self.0).into_string())
    }
}

impl FromStr for ObjectDigest {
    type Err = ParseObjectError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseObjectError::Digest(text.to_owned());
        let decoded = bs58::decode(text).into_vec().map_err(|_err| invalid())?;
        let bytes: [u8; 32] = decoded.try_into().map_err(|_err: Vec<u8>| invalid())?;
        Ok(Self(bytes))
    }
}

impl Serialize for ObjectDigest {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ObjectDigest {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = <String as Deserialize>::deserialize(deserializer)?;
        text.parse().map_err(D::Error::custom)
    }
}

/// A complete object reference: id, version and digest.
///
/// Gas payment requires all three. Listings that lack a version or digest
/// never become an `ObjectRef`.
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    Hash,
    PartialEq,
    Deserialize,
    Serialize,
    BorshDeserialize,
    BorshSerialize,
)]
#[serde(rename_all = "camelCase")]
pub struct ObjectRef {
    /// Object id.
    pub object_id: ObjectId,
    /// Object version (sequence number).
    pub version: u64,
    /// Object content digest at `version`.
    pub digest: ObjectDigest,
}
