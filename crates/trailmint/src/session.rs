//! Ephemeral key sessions and the OIDC nonce.
//!
//! One [`LoginSession`] exists per login attempt. It holds the ephemeral
//! signing key, the randomness blinding the nonce, the epoch bound, and
//! (once fetched) the proof. The nonce sent to the identity provider
//! commits to all three of key, bound and randomness:
//!
//! ```text
//! nonce = base64url(BLAKE2b-512("ZkLogin_NonceSed",
//!             flag || pk || max_epoch_le || randomness)[..20])
//! ```
//!
//! so the token the provider returns is only usable with this key.

use core::fmt;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::{
    constants::{Blake2bDomain, NONCE_LEN, RANDOMNESS_LEN},
    keys::{KeySignature, private::EphemeralSigningKey, public::PublicKey},
    primitives::Epoch,
    proof::ZkProof,
};

/// Session lifecycle failures.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// `current + lookahead` does not fit in an epoch.
    #[error("epoch {current} + {lookahead} overflows")]
    EpochOverflow {
        /// Current ledger epoch.
        current: Epoch,
        /// Configured lookahead.
        lookahead: u64,
    },

    /// A persisted session record could not be restored.
    #[error("stored login session is corrupt: {0}")]
    Corrupt(String),

    /// A proof was attached that was requested for another key or bound.
    #[error("proof was requested for a different ephemeral key or epoch bound")]
    ProofMismatch,
}

/// Per-session randomness blinding the nonce.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Randomness([u8; RANDOMNESS_LEN]);

impl Randomness {
    /// Sample fresh randomness.
    pub fn random(rng: &mut (impl RngCore + CryptoRng)) -> Self {
        let mut bytes = [0u8; RANDOMNESS_LEN];
        rng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Raw bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; RANDOMNESS_LEN] {
        &self.0
    }
}

impl From<[u8; RANDOMNESS_LEN]> for Randomness {
    fn from(bytes: [u8; RANDOMNESS_LEN]) -> Self {
        Self(bytes)
    }
}

/// Decimal, as the proving service expects.
impl fmt::Display for Randomness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        u128::from_le_bytes(self.0).fmt(f)
    }
}

/// The OIDC nonce for `(pk, max_epoch, randomness)`.
#[must_use]
pub fn nonce(pk: &PublicKey, max_epoch: Epoch, randomness: &Randomness) -> String {
    let hash = Blake2bDomain::NONCE.wide(&[
        &pk.extended(),
        &u64::from(max_epoch).to_le_bytes(),
        randomness.as_bytes(),
    ]);
    let truncated: Vec<u8> = hash.iter().take(NONCE_LEN).copied().collect();
    URL_SAFE_NO_PAD.encode(truncated)
}

/// A single login attempt's ephemeral state.
///
/// Lives only in the client's session store. Only its public derivatives
/// (the public key via the nonce and proof request, and the proof itself)
/// ever leave the client.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(try_from = "SessionRecord", into = "SessionRecord")]
pub struct LoginSession {
    ephemeral: EphemeralSigningKey,
    randomness: Randomness,
    max_epoch: Epoch,
    proof: Option<ZkProof>,
}

impl LoginSession {
    /// Start a session valid through `current + lookahead`.
    pub fn begin(
        current: Epoch,
        lookahead: u64,
        rng: &mut (impl RngCore + CryptoRng),
    ) -> Result<Self, SessionError> {
        let max_epoch = current
            .checked_add(lookahead)
            .ok_or(SessionError::EpochOverflow { current, lookahead })?;
        let session = Self {
            ephemeral: EphemeralSigningKey::random(rng),
            randomness: Randomness::random(rng),
            max_epoch,
            proof: None,
        };
        tracing::debug!(%current, %max_epoch, "login session started");
        Ok(session)
    }

    /// The nonce to send to the identity provider.
    #[must_use]
    pub fn nonce(&self) -> String {
        nonce(&self.public_key(), self.max_epoch, &self.randomness)
    }

    /// The ephemeral public key.
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        self.ephemeral.public()
    }

    /// The nonce randomness.
    #[must_use]
    pub const fn randomness(&self) -> &Randomness {
        &self.randomness
    }

    /// Last epoch this session may sign for.
    #[must_use]
    pub const fn max_epoch(&self) -> Epoch {
        self.max_epoch
    }

    /// Whether the session has lapsed at ledger epoch `current`.
    #[must_use]
    pub const fn is_expired_at(&self, current: Epoch) -> bool {
        self.max_epoch.has_elapsed_at(current)
    }

    /// The acquired proof, if any.
    #[must_use]
    pub const fn proof(&self) -> Option<&ZkProof> {
        self.proof.as_ref()
    }

    /// Store a proof, refusing one requested for another key or bound.
    pub fn attach_proof(&mut self, proof: ZkProof) -> Result<(), SessionError> {
        if !proof.is_bound_to_key(&self.public_key()) || proof.binding.max_epoch != self.max_epoch
        {
            return Err(SessionError::ProofMismatch);
        }
        self.proof = Some(proof);
        Ok(())
    }

    /// Sign an intent message with the ephemeral key.
    pub fn sign(&self, rng: &mut (impl RngCore + CryptoRng), msg: &[u8]) -> KeySignature {
        self.ephemeral.sign(rng, msg)
    }
}

/// Persisted form of a [`LoginSession`].
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionRecord {
    ephemeral_key: String,
    randomness: String,
    max_epoch: Epoch,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    proof: Option<ZkProof>,
}

impl From<LoginSession> for SessionRecord {
    fn from(session: LoginSession) -> Self {
        let key: [u8; 32] = session.ephemeral.into();
        Self {
            ephemeral_key: hex::encode(key),
            randomness: hex::encode(session.randomness.0),
            max_epoch: session.max_epoch,
            proof: session.proof,
        }
    }
}

impl TryFrom<SessionRecord> for LoginSession {
    type Error = SessionError;

    fn try_from(record: SessionRecord) -> Result<Self, Self::Error> {
        let corrupt = |what: &str| SessionError::Corrupt(what.to_owned());

        let mut key = [0u8; 32];
        hex::decode_to_slice(&record.ephemeral_key, &mut key)
            .map_err(|_err| corrupt("ephemeral key is not 32 hex bytes"))?;
        let ephemeral = EphemeralSigningKey::try_from(key)
            .map_err(|_err| corrupt("ephemeral key is not a valid scalar"))?;

        let mut randomness = [0u8; RANDOMNESS_LEN];
        hex::decode_to_slice(&record.randomness, &mut randomness)
            .map_err(|_err| corrupt("randomness is not 16 hex bytes"))?;

        let mut session = Self {
            ephemeral,
            randomness: Randomness(randomness),
            max_epoch: record.max_epoch,
            proof: None,
        };
        if let Some(proof) = record.proof {
            session.attach_proof(proof)?;
        }
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng as _, rngs::StdRng};

    use super::*;
    use crate::proof::{ProofBinding, encode_extended_public_key};

    fn proof_for(pk: &PublicKey, max_epoch: Epoch) -> ZkProof {
        ZkProof {
            inputs: serde_json::json!({}),
            binding: ProofBinding {
                extended_ephemeral_public_key: encode_extended_public_key(pk),
                max_epoch,
                salt: crate::Salt::from(1),
            },
        }
    }

    #[test]
    fn max_epoch_is_current_plus_lookahead() {
        let mut rng = StdRng::seed_from_u64(0);
        let session = LoginSession::begin(Epoch::from(100), 10, &mut rng).unwrap();
        assert_eq!(session.max_epoch(), Epoch::from(110));
        assert!(!session.is_expired_at(Epoch::from(110)));
        assert!(session.is_expired_at(Epoch::from(111)));
        assert!(session.proof().is_none());
    }

    #[test]
    fn lookahead_overflow_rejected() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(matches!(
            LoginSession::begin(Epoch::from(u64::MAX), 1, &mut rng),
            Err(SessionError::EpochOverflow { .. })
        ));
    }

    #[test]
    fn nonce_is_deterministic_and_bound() {
        let mut rng = StdRng::seed_from_u64(1);
        let session = LoginSession::begin(Epoch::from(5), 10, &mut rng).unwrap();
        let pk = session.public_key();
        let randomness = *session.randomness();

        assert_eq!(session.nonce(), nonce(&pk, Epoch::from(15), &randomness));
        assert_eq!(session.nonce().len(), 27);
        assert_ne!(session.nonce(), nonce(&pk, Epoch::from(16), &randomness));
        assert_ne!(
            session.nonce(),
            nonce(&pk, Epoch::from(15), &Randomness::from([0u8; 16]))
        );

        let other = LoginSession::begin(Epoch::from(5), 10, &mut rng).unwrap();
        assert_ne!(session.nonce(), other.nonce());
    }

    #[test]
    fn randomness_renders_decimal() {
        let mut bytes = [0u8; 16];
        bytes[0] = 1;
        bytes[1] = 1;
        assert_eq!(Randomness::from(bytes).to_string(), "257");
    }

    #[test]
    fn foreign_proof_rejected() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut session = LoginSession::begin(Epoch::from(0), 10, &mut rng).unwrap();
        let stranger = EphemeralSigningKey::random(&mut rng).public();

        assert_eq!(
            session.attach_proof(proof_for(&stranger, Epoch::from(10))),
            Err(SessionError::ProofMismatch)
        );
        assert_eq!(
            session.attach_proof(proof_for(&session.public_key(), Epoch::from(11))),
            Err(SessionError::ProofMismatch)
        );
        session
            .attach_proof(proof_for(&session.public_key(), Epoch::from(10)))
            .unwrap();
        assert!(session.proof().is_some());
    }

    #[test]
    fn session_survives_store_round_trip() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut session = LoginSession::begin(Epoch::from(7), 10, &mut rng).unwrap();
        session
            .attach_proof(proof_for(&session.public_key(), Epoch::from(17)))
            .unwrap();

        let json = serde_json::to_string(&session).unwrap();
        let restored: LoginSession = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.nonce(), session.nonce());
        assert_eq!(restored.proof(), session.proof());

        let sig = restored.sign(&mut rng, b"mint");
        session.public_key().verify(b"mint", &sig).unwrap();
    }

    #[test]
    fn corrupt_record_rejected() {
        let bad = r#"{"ephemeralKey":"zz","randomness":"00","maxEpoch":1}"#;
        assert!(serde_json::from_str::<LoginSession>(bad).is_err());
    }
}
