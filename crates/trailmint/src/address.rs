//! Address seed and account address derivation.
//!
//! ```text
//! seed    = ToBase(BLAKE2b-512("ZkLogin_AddrSeed",
//!               salt_le || len("sub") || "sub" || len(sub) || sub || len(aud) || aud))
//! address = BLAKE2b-256("Trailmint_Addres", 0x05 || len(iss) || iss || seed)
//! ```
//!
//! Lengths are little-endian `u64`. The address is a pure function of
//! `(iss, sub, aud, salt)`: no proof and no network call is needed, so it
//! can be displayed before the first transaction and recomputed on every
//! request instead of being stored.
//!
//! Plain-key accounts (the sponsor) hash `0x00 || pk` under the same
//! personalization; the scheme flag keeps the two address spaces apart.

use core::{fmt, str::FromStr};

use borsh::{BorshDeserialize, BorshSerialize};
use ff::{FromUniformBytes as _, PrimeField as _};
use pasta_curves::Fp;
use serde::{Deserialize, Serialize, de::Error as _};

use crate::{
    constants::{Blake2bDomain, KEY_CLAIM_NAME, PLAIN_SIGNATURE_FLAG, ZKLOGIN_SIGNATURE_FLAG},
    keys::public::PublicKey,
    primitives::parse_hex32,
    salt::Salt,
    token::IdentityToken,
};

/// Failure parsing an address or address seed from text.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ParseAddressError {
    /// Not `0x`-prefixed hex of at most 32 bytes.
    #[error("invalid address `{0}`")]
    Address(String),

    /// Not the canonical encoding of a field element.
    #[error("invalid address seed `{0}`")]
    Seed(String),
}

/// Little-endian `u64` length prefix.
fn len_prefix(bytes: &[u8]) -> [u8; 8] {
    u64::try_from(bytes.len())
        .unwrap_or(u64::MAX)
        .to_le_bytes()
}

/// The address seed: a field element binding the user's identity claims and
/// salt.
///
/// Carried inside every composite signature so the ledger can recompute the
/// sender address and check it against the proof's public inputs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AddressSeed(Fp);

impl AddressSeed {
    /// Derive the seed from `(salt, sub, aud)`.
    #[must_use]
    pub fn derive(salt: Salt, subject: &str, audience: &str) -> Self {
        let salt_bytes = salt.to_le_bytes();
        let name = KEY_CLAIM_NAME.as_bytes();
        let hash = Blake2bDomain::ADDRESS_SEED.wide(&[
            &salt_bytes,
            &len_prefix(name),
            name,
            &len_prefix(subject.as_bytes()),
            subject.as_bytes(),
            &len_prefix(audience.as_bytes()),
            audience.as_bytes(),
        ]);
        Self(Fp::from_uniform_bytes(&hash))
    }

    /// Canonical 32-byte encoding.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_repr()
    }
}

impl TryFrom<[u8; 32]> for AddressSeed {
    type Error = ParseAddressError;

    fn try_from(bytes: [u8; 32]) -> Result<Self, Self::Error> {
        Option::from(Fp::from_repr(bytes))
            .map(Self)
            .ok_or_else(|| ParseAddressError::Seed(hex::encode(bytes)))
    }
}

impl fmt::Display for AddressSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.to_bytes()))
    }
}

impl FromStr for AddressSeed {
    type Err = ParseAddressError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let digits = text.strip_prefix("0x").unwrap_or(text);
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(digits, &mut bytes)
            .map_err(|_err| ParseAddressError::Seed(text.to_owned()))?;
        Self::try_from(bytes)
    }
}

impl Serialize for AddressSeed {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for AddressSeed {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = <String as Deserialize>::deserialize(deserializer)?;
        text.parse().map_err(D::Error::custom)
    }
}

/// A 32-byte account address, written as `0x`-prefixed hex.
#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, BorshDeserialize, BorshSerialize,
)]
pub struct Address([u8; 32]);

impl Address {
    /// The address of a zkLogin account.
    #[must_use]
    pub fn from_zklogin(issuer: &str, seed: &AddressSeed) -> Self {
        Self(Blake2bDomain::ADDRESS.narrow(&[
            &[ZKLOGIN_SIGNATURE_FLAG],
            &len_prefix(issuer.as_bytes()),
            issuer.as_bytes(),
            &seed.to_bytes(),
        ]))
    }

    /// The address of a plain-key account.
    #[must_use]
    pub fn from_public_key(pk: &PublicKey) -> Self {
        let raw: [u8; 32] = (*pk).into();
        Self(Blake2bDomain::ADDRESS.narrow(&[&[PLAIN_SIGNATURE_FLAG], &raw]))
    }

    /// The raw address bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl From<[u8; 32]> for Address {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for Address {
    type Err = ParseAddressError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        parse_hex32(text.trim())
            .map(Self)
            .map_err(|_err| ParseAddressError::Address(text.to_owned()))
    }
}

impl Serialize for Address {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = <String as Deserialize>::deserialize(deserializer)?;
        text.parse().map_err(D::Error::custom)
    }
}

/// The address seed for a token's `(sub, aud)` under `salt`.
#[must_use]
pub fn address_seed(token: &IdentityToken, salt: Salt) -> AddressSeed {
    let claims = token.claims();
    AddressSeed::derive(salt, &claims.subject, &claims.audience)
}

/// The account address for a token under `salt`.
#[must_use]
pub fn derive_address(token: &IdentityToken, salt: Salt) -> Address {
    Address::from_zklogin(&token.claims().issuer, &address_seed(token, salt))
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rand::{SeedableRng as _, rngs::StdRng};

    use super::*;
    use crate::{
        keys::private::SponsorSigningKey,
        token::tests::{encode, sample},
    };

    fn token(claims: &serde_json::Value) -> IdentityToken {
        IdentityToken::parse(&encode(claims)).unwrap()
    }

    #[test]
    fn same_token_same_address() {
        let first = token(&sample(2_000));
        let second = token(&sample(2_000));
        let salt = Salt::derive("a@example.com");
        assert_eq!(derive_address(&first, salt), derive_address(&second, salt));
    }

    /// Expiry and nonce are not identity: a fresh login keeps the address.
    #[test]
    fn address_ignores_session_claims() {
        let mut later = sample(9_000);
        later["nonce"] = serde_json::json!("another");
        later["iat"] = serde_json::json!(8_000);
        let salt = Salt::derive("a@example.com");
        assert_eq!(
            derive_address(&token(&sample(2_000)), salt),
            derive_address(&token(&later), salt)
        );
    }

    #[test]
    fn every_identity_input_matters() {
        let salt = Salt::derive("a@example.com");
        let base = derive_address(&token(&sample(2_000)), salt);

        for (claim, value) in [("sub", "u2"), ("aud", "client-456"), ("iss", "https://other")] {
            let mut claims = sample(2_000);
            claims[claim] = serde_json::json!(value);
            assert_ne!(derive_address(&token(&claims), salt), base, "{claim}");
        }
        assert_ne!(
            derive_address(&token(&sample(2_000)), Salt::derive("b@example.com")),
            base
        );
    }

    /// Length prefixes keep `("ab", "c")` and `("a", "bc")` apart.
    #[test]
    fn seed_fields_are_framed() {
        let salt = Salt::from(1);
        assert_ne!(
            AddressSeed::derive(salt, "ab", "c"),
            AddressSeed::derive(salt, "a", "bc")
        );
    }

    #[test]
    fn plain_and_zklogin_addresses_differ() {
        let key = SponsorSigningKey::random(&mut StdRng::seed_from_u64(3));
        let raw: [u8; 32] = key.public().into();
        let seed = AddressSeed::try_from([0u8; 32]).unwrap();
        assert_ne!(Address::from_public_key(&key.public()), Address::from(raw));
        assert_ne!(
            Address::from_public_key(&key.public()),
            Address::from_zklogin("", &seed)
        );
    }

    /// Pinned value: changing this is an address migration.
    #[test]
    fn derivation_is_pinned() {
        let seed = AddressSeed::derive(Salt::derive("a@example.com"), "u1", "client-123");
        assert_eq!(
            seed.to_string(),
            "0x27f8bde913027b707385d4a28e36fb43357b84b5b6bad53dbfea9ba6f024e33b"
        );
        assert_eq!(
            Address::from_zklogin("https://accounts.google.com", &seed).to_string(),
            "0x9575f011fe575b45a25a387c1b4fce65a0056130671410dee672ebdd321833b0"
        );
    }

    #[test]
    fn text_forms() {
        let seed = AddressSeed::derive(Salt::from(42), "u1", "client-123");
        assert_eq!(seed.to_string().parse::<AddressSeed>().unwrap(), seed);
        assert!("0xff".parse::<AddressSeed>().is_err());
        assert!(format!("0x{}", "ff".repeat(32)).parse::<AddressSeed>().is_err());

        let address = Address::from_zklogin("https://accounts.google.com", &seed);
        let json = serde_json::to_string(&address).unwrap();
        assert_eq!(serde_json::from_str::<Address>(&json).unwrap(), address);
        assert!("0xnothex".parse::<Address>().is_err());
    }

    proptest! {
        #[test]
        fn derivation_is_deterministic(
            email in "[a-z]{1,12}@[a-z]{1,8}\\.com",
            sub in "[0-9]{1,20}",
            aud in "[a-z0-9-]{1,30}",
        ) {
            let salt = Salt::derive(&email);
            let first = Address::from_zklogin("iss", &AddressSeed::derive(salt, &sub, &aud));
            let second = Address::from_zklogin(
                "iss",
                &AddressSeed::derive(Salt::derive(&email), &sub, &aud),
            );
            prop_assert_eq!(first, second);
        }
    }
}
