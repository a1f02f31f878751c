//! ## Keys
//!
//! Two signing roles exist, and neither holds a long-term user account key:
//!
//! ```text
//!   EphemeralSigningKey ──public()──> PublicKey ──extended()──> epk (nonce, prover)
//!          │                                                     │
//!          └──sign(intent msg)──> KeySignature ──┐               │
//!                                                ▼               ▼
//!                                  CompositeSignature { proof bound to epk }
//!
//!   SponsorSigningKey ──public()──> PublicKey ──> sponsor Address (gas owner)
//!          └──sign(intent msg)──> KeySignature ──> GenericSignature::Plain
//! ```
//!
//! ### Private keys ([`private`])
//!
//! - `EphemeralSigningKey`: one per login attempt, lives in the browser
//!   session store, signs the user's half of every transaction until
//!   `max_epoch`.
//! - `SponsorSigningKey`: the server's fixed key; signs as gas owner.
//!
//! ### Public keys ([`public`])
//!
//! - `PublicKey`: verifies [`KeySignature`]s. For an ephemeral key the
//!   *extended* form (`flag || pk`) is what the nonce and proof bind to.
//!
//! Both roles use RedPallas (`reddsa::orchard::SpendAuth`).

pub mod private;
pub mod public;

mod signature;

pub use signature::KeySignature;

#[cfg(test)]
mod tests {
    use rand::{SeedableRng as _, rngs::StdRng};

    use super::{private, public::PublicKey};
    use crate::constants::PLAIN_SIGNATURE_FLAG;

    /// An ephemeral key survives a trip through its byte encoding (session
    /// store) and still produces signatures its public key accepts.
    #[test]
    fn ephemeral_key_persists_and_signs() {
        let mut rng = StdRng::seed_from_u64(0);
        let key = private::EphemeralSigningKey::random(&mut rng);
        let bytes: [u8; 32] = key.into();
        let restored = private::EphemeralSigningKey::try_from(bytes).unwrap();

        let sig = restored.sign(&mut rng, b"summit");
        key.public().verify(b"summit", &sig).unwrap();
    }

    /// A signature from one key does not verify under another key.
    #[test]
    fn signature_bound_to_key() {
        let mut rng = StdRng::seed_from_u64(1);
        let first = private::EphemeralSigningKey::random(&mut rng);
        let second = private::EphemeralSigningKey::random(&mut rng);

        let sig = first.sign(&mut rng, b"trailhead");
        assert!(second.public().verify(b"trailhead", &sig).is_err());
    }

    /// The extended public key is the scheme flag followed by the key.
    #[test]
    fn extended_public_key_layout() {
        let mut rng = StdRng::seed_from_u64(2);
        let pk = private::EphemeralSigningKey::random(&mut rng).public();
        let extended = pk.extended();
        let raw: [u8; 32] = pk.into();
        assert_eq!(extended[0], PLAIN_SIGNATURE_FLAG);
        assert_eq!(&extended[1..], &raw);
        assert_eq!(PublicKey::try_from(raw).unwrap(), pk);
    }
}
