//! Private (signing) keys.

use rand::{CryptoRng, RngCore};
use reddsa::{Error, orchard::SpendAuth};

use super::{public::PublicKey, signature::KeySignature};
use crate::address::Address;

/// The per-login ephemeral signing key.
///
/// Generated fresh by [`LoginSession::begin`](crate::LoginSession::begin)
/// and never sent anywhere. Its public half is bound into the OIDC nonce and
/// the zero-knowledge proof, so a proof is only usable together with the
/// exact key it was requested for.
#[derive(Clone, Copy, Debug)]
pub struct EphemeralSigningKey(reddsa::SigningKey<SpendAuth>);

impl EphemeralSigningKey {
    /// Sample a fresh ephemeral key.
    pub fn random(rng: &mut (impl RngCore + CryptoRng)) -> Self {
        Self(reddsa::SigningKey::new(rng))
    }

    /// Derive the public key: `pk = [sk]G`.
    #[must_use]
    pub fn public(&self) -> PublicKey {
        // reddsa::VerificationKey::from(&signing_key) performs [sk]G
        // (scalar-times-basepoint), not a trivial type conversion.
        PublicKey(reddsa::VerificationKey::from(&self.0))
    }

    /// Sign `msg` (an intent message, never raw transaction bytes).
    pub fn sign(&self, rng: &mut (impl RngCore + CryptoRng), msg: &[u8]) -> KeySignature {
        KeySignature(self.0.sign(rng, msg))
    }
}

impl From<EphemeralSigningKey> for [u8; 32] {
    fn from(key: EphemeralSigningKey) -> Self {
        key.0.into()
    }
}

impl TryFrom<[u8; 32]> for EphemeralSigningKey {
    type Error = reddsa::Error;

    fn try_from(bytes: [u8; 32]) -> Result<Self, Self::Error> {
        reddsa::SigningKey::<SpendAuth>::try_from(bytes).map(Self)
    }
}

/// The sponsor's long-lived gas-owner key.
///
/// Held only by the sponsorship service. Its address owns the gas coins
/// attached to sponsored transactions.
#[derive(Clone, Copy, Debug)]
pub struct SponsorSigningKey(reddsa::SigningKey<SpendAuth>);

impl SponsorSigningKey {
    /// Sample a fresh sponsor key (tests and key generation).
    pub fn random(rng: &mut (impl RngCore + CryptoRng)) -> Self {
        Self(reddsa::SigningKey::new(rng))
    }

    /// Parse a hex-encoded 32-byte key (with or without `0x`).
    pub fn from_hex(text: &str) -> Result<Self, reddsa::Error> {
        let digits = text.trim().strip_prefix("0x").unwrap_or_else(|| text.trim());
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(digits, &mut bytes)
            .map_err(|_err| Error::MalformedSigningKey)?;
        reddsa::SigningKey::<SpendAuth>::try_from(bytes).map(Self)
    }

    /// The sponsor's public key.
    #[must_use]
    pub fn public(&self) -> PublicKey {
        PublicKey(reddsa::VerificationKey::from(&self.0))
    }

    /// The sponsor's account address (the gas owner).
    #[must_use]
    pub fn address(&self) -> Address {
        Address::from_public_key(&self.public())
    }

    /// Sign `msg` as gas owner.
    pub fn sign(&self, rng: &mut (impl RngCore + CryptoRng), msg: &[u8]) -> KeySignature {
        KeySignature(self.0.sign(rng, msg))
    }
}

impl From<SponsorSigningKey> for [u8; 32] {
    fn from(key: SponsorSigningKey) -> Self {
        key.0.into()
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng as _, rngs::StdRng};

    use super::*;

    #[test]
    fn sponsor_key_hex_round_trip() {
        let mut rng = StdRng::seed_from_u64(7);
        let key = SponsorSigningKey::random(&mut rng);
        let bytes: [u8; 32] = key.into();
        let parsed = SponsorSigningKey::from_hex(&format!("0x{}", hex::encode(bytes))).unwrap();
        assert_eq!(parsed.address(), key.address());
    }

    #[test]
    fn sponsor_key_rejects_bad_hex() {
        assert!(SponsorSigningKey::from_hex("not-hex").is_err());
        assert!(SponsorSigningKey::from_hex("0xabcd").is_err());
    }
}
