//! Composite (zkLogin) signatures and the wire signature format.
//!
//! ```text
//! GenericSignature (base64 on the wire)
//! ├── 0x00 || sig(64) || pk(32)              plain key (the sponsor)
//! └── 0x05 || borsh(ZkLoginBody)             composite (the user)
//!             { proof json, address seed, iss, max_epoch, sig, epk }
//! ```
//!
//! A composite signature is accepted in place of a plain one: the ledger
//! recomputes the sender from `(iss, address seed)`, checks the proof
//! against the ephemeral key, and checks the ephemeral signature over the
//! transaction.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use borsh::{BorshDeserialize, BorshSerialize};
use rand::{CryptoRng, RngCore};

use crate::{
    address::{Address, AddressSeed, address_seed},
    constants::{PLAIN_SIGNATURE_FLAG, ZKLOGIN_SIGNATURE_FLAG},
    keys::{KeySignature, private::SponsorSigningKey, public::PublicKey},
    primitives::Epoch,
    proof::ZkProof,
    salt::Salt,
    session::LoginSession,
    token::IdentityToken,
    transaction::signing_message,
};

/// Signature composition and verification failures.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    /// The session has no proof yet.
    #[error("no zk proof has been acquired for this session")]
    MissingProof,

    /// The session's epoch bound has passed.
    #[error("session expired: max epoch {max_epoch}, current epoch {current}")]
    SessionExpired {
        /// The session's bound.
        max_epoch: Epoch,
        /// The ledger's current epoch.
        current: Epoch,
    },

    /// The proof was requested for a different key, bound or salt.
    #[error("zk proof is bound to a different {0}")]
    ProofBindingMismatch(&'static str),

    /// The signature does not verify.
    #[error("signature does not verify")]
    InvalidSignature,

    /// Not a decodable signature.
    #[error("malformed signature: {0}")]
    Malformed(String),

    /// Unknown scheme flag.
    #[error("unknown signature scheme flag {0:#04x}")]
    UnknownScheme(u8),
}

/// A user authorization: ephemeral signature plus the proof binding the
/// ephemeral key to an OIDC identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompositeSignature {
    /// The proof, with the inputs it was requested for.
    pub proof: ZkProof,
    /// Seed from `(salt, sub, aud)`.
    pub address_seed: AddressSeed,
    /// Token issuer.
    pub issuer: String,
    /// Last epoch this signature is valid in.
    pub max_epoch: Epoch,
    /// Ephemeral signature over the transaction's signing message.
    pub user_signature: KeySignature,
    /// Ephemeral public key.
    pub ephemeral_public_key: PublicKey,
}

impl CompositeSignature {
    /// The account this signature authorizes for.
    #[must_use]
    pub fn address(&self) -> Address {
        Address::from_zklogin(&self.issuer, &self.address_seed)
    }

    /// Check the parts a client can check: the proof belongs to the
    /// signing key and epoch bound, and the ephemeral signature covers
    /// `tx_bytes`.
    ///
    /// The proof itself is verified by the ledger.
    pub fn verify(&self, tx_bytes: &[u8]) -> Result<(), SignatureError> {
        if !self.proof.is_bound_to_key(&self.ephemeral_public_key) {
            return Err(SignatureError::ProofBindingMismatch("ephemeral key"));
        }
        if self.proof.binding.max_epoch != self.max_epoch {
            return Err(SignatureError::ProofBindingMismatch("max epoch"));
        }
        self.ephemeral_public_key
            .verify(&signing_message(tx_bytes), &self.user_signature)
            .map_err(|_err| SignatureError::InvalidSignature)
    }
}

/// Sign `tx_bytes` for the user.
///
/// Fails without signing if the proof is absent, the session has lapsed at
/// `current`, or the proof was requested for another key, bound or salt.
pub fn compose(
    tx_bytes: &[u8],
    session: &LoginSession,
    token: &IdentityToken,
    salt: Salt,
    current: Epoch,
    rng: &mut (impl RngCore + CryptoRng),
) -> Result<CompositeSignature, SignatureError> {
    let proof = session.proof().ok_or(SignatureError::MissingProof)?;

    if session.is_expired_at(current) {
        return Err(SignatureError::SessionExpired {
            max_epoch: session.max_epoch(),
            current,
        });
    }

    let ephemeral_public_key = session.public_key();
    if !proof.is_bound_to_key(&ephemeral_public_key) {
        return Err(SignatureError::ProofBindingMismatch("ephemeral key"));
    }
    if proof.binding.max_epoch != session.max_epoch() {
        return Err(SignatureError::ProofBindingMismatch("max epoch"));
    }
    if proof.binding.salt != salt {
        return Err(SignatureError::ProofBindingMismatch("salt"));
    }

    let user_signature = session.sign(rng, &signing_message(tx_bytes));
    Ok(CompositeSignature {
        proof: proof.clone(),
        address_seed: address_seed(token, salt),
        issuer: token.claims().issuer.clone(),
        max_epoch: session.max_epoch(),
        user_signature,
        ephemeral_public_key,
    })
}

/// Borsh body of a composite signature.
#[derive(BorshDeserialize, BorshSerialize)]
struct ZkLoginBody {
    proof: String,
    address_seed: [u8; 32],
    issuer: String,
    max_epoch: u64,
    signature: [u8; 64],
    public_key: [u8; 32],
}

/// Any signature the ledger accepts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GenericSignature {
    /// A plain key signature.
    Plain {
        /// The signature.
        signature: KeySignature,
        /// The signer's public key.
        public_key: PublicKey,
    },
    /// A composite zkLogin signature.
    ZkLogin(Box<CompositeSignature>),
}

impl GenericSignature {
    /// Sign `tx_bytes` as the sponsor.
    pub fn sign_sponsor(
        key: &SponsorSigningKey,
        tx_bytes: &[u8],
        rng: &mut (impl RngCore + CryptoRng),
    ) -> Self {
        Self::Plain {
            signature: key.sign(rng, &signing_message(tx_bytes)),
            public_key: key.public(),
        }
    }

    /// The account this signature is for.
    #[must_use]
    #[expect(clippy::ref_patterns, reason = "payloads are borrowed from a dereferenced self")]
    pub fn signer(&self) -> Address {
        match *self {
            Self::Plain { ref public_key, .. } => Address::from_public_key(public_key),
            Self::ZkLogin(ref composite) => composite.address(),
        }
    }

    /// Check the signature covers `tx_bytes`.
    #[expect(clippy::ref_patterns, reason = "payloads are borrowed from a dereferenced self")]
    pub fn verify(&self, tx_bytes: &[u8]) -> Result<(), SignatureError> {
        match *self {
            Self::Plain {
                ref signature,
                ref public_key,
            } => public_key
                .verify(&signing_message(tx_bytes), signature)
                .map_err(|_err| SignatureError::InvalidSignature),
            Self::ZkLogin(ref composite) => composite.verify(tx_bytes),
        }
    }

    /// `flag || payload`.
    #[expect(clippy::ref_patterns, reason = "payloads are borrowed from a dereferenced self")]
    pub fn to_bytes(&self) -> Result<Vec<u8>, SignatureError> {
        match *self {
            Self::Plain {
                signature,
                public_key,
            } => {
                let sig: [u8; 64] = signature.into();
                let pk: [u8; 32] = public_key.into();
                let mut out = Vec::with_capacity(1 + 64 + 32);
                out.push(PLAIN_SIGNATURE_FLAG);
                out.extend_from_slice(&sig);
                out.extend_from_slice(&pk);
                Ok(out)
            }
            Self::ZkLogin(ref composite) => {
                let body = ZkLoginBody {
                    proof: serde_json::to_string(&composite.proof)
                        .map_err(|err| SignatureError::Malformed(err.to_string()))?,
                    address_seed: composite.address_seed.to_bytes(),
                    issuer: composite.issuer.clone(),
                    max_epoch: composite.max_epoch.into(),
                    signature: composite.user_signature.into(),
                    public_key: composite.ephemeral_public_key.into(),
                };
                let mut out = vec![ZKLOGIN_SIGNATURE_FLAG];
                borsh::to_writer(&mut out, &body)
                    .map_err(|err| SignatureError::Malformed(err.to_string()))?;
                Ok(out)
            }
        }
    }

    /// Decode `flag || payload`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SignatureError> {
        let malformed = |what: &str| SignatureError::Malformed(what.to_owned());
        let (&flag, payload) = bytes.split_first().ok_or_else(|| malformed("empty"))?;

        match flag {
            PLAIN_SIGNATURE_FLAG => {
                let (sig, rest) = payload
                    .split_first_chunk::<64>()
                    .ok_or_else(|| malformed("plain signature too short"))?;
                let pk: [u8; 32] = rest
                    .try_into()
                    .map_err(|_err| malformed("plain signature has the wrong length"))?;
                Ok(Self::Plain {
                    signature: KeySignature::from(*sig),
                    public_key: PublicKey::try_from(pk)
                        .map_err(|_err| malformed("invalid public key"))?,
                })
            }
            ZKLOGIN_SIGNATURE_FLAG => {
                let body: ZkLoginBody = borsh::from_slice(payload)
                    .map_err(|err| SignatureError::Malformed(err.to_string()))?;
                let proof: ZkProof = serde_json::from_str(&body.proof)
                    .map_err(|err| SignatureError::Malformed(err.to_string()))?;
                Ok(Self::ZkLogin(Box::new(CompositeSignature {
                    proof,
                    address_seed: AddressSeed::try_from(body.address_seed)
                        .map_err(|err| SignatureError::Malformed(err.to_string()))?,
                    issuer: body.issuer,
                    max_epoch: Epoch::from(body.max_epoch),
                    user_signature: KeySignature::from(body.signature),
                    ephemeral_public_key: PublicKey::try_from(body.public_key)
                        .map_err(|_err| malformed("invalid ephemeral public key"))?,
                })))
            }
            other => Err(SignatureError::UnknownScheme(other)),
        }
    }

    /// Base64 wire form.
    pub fn to_base64(&self) -> Result<String, SignatureError> {
        self.to_bytes().map(|bytes| STANDARD.encode(bytes))
    }

    /// Decode the base64 wire form.
    pub fn from_base64(text: &str) -> Result<Self, SignatureError> {
        let bytes = STANDARD
            .decode(text.trim())
            .map_err(|err| SignatureError::Malformed(err.to_string()))?;
        Self::from_bytes(&bytes)
    }
}

impl From<CompositeSignature> for GenericSignature {
    fn from(composite: CompositeSignature) -> Self {
        Self::ZkLogin(Box::new(composite))
    }
}
