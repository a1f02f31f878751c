//! Public (verification) keys.

use reddsa::orchard::SpendAuth;

use super::signature::KeySignature;
use crate::constants::PLAIN_SIGNATURE_FLAG;

/// A RedPallas verification key, ephemeral or sponsor.
///
/// This is the only key type that **can verify** [`KeySignature`]s.
#[derive(Clone, Copy, Debug)]
#[expect(clippy::field_scoped_visibility_modifiers, reason = "constructed by private keys")]
pub struct PublicKey(pub(super) reddsa::VerificationKey<SpendAuth>);

impl PublicKey {
    /// Verify a signature over `msg`.
    pub fn verify(&self, msg: &[u8], sig: &KeySignature) -> Result<(), reddsa::Error> {
        self.0.verify(msg, &sig.0)
    }

    /// The extended public key: `flag || pk`.
    ///
    /// This is the form bound into the OIDC nonce and sent to the proving
    /// service.
    #[must_use]
    pub fn extended(&self) -> [u8; 33] {
        let raw: [u8; 32] = (*self).into();
        let mut out = [PLAIN_SIGNATURE_FLAG; 33];
        for (dst, src) in out.iter_mut().skip(1).zip(raw) {
            *dst = src;
        }
        out
    }
}

#[expect(
    clippy::missing_trait_methods,
    reason = "default ne/assert impls are correct"
)]
impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        <[u8; 32]>::from(self.0) == <[u8; 32]>::from(other.0)
    }
}

#[expect(
    clippy::missing_trait_methods,
    reason = "default assert_receiver_is_total_eq is correct"
)]
impl Eq for PublicKey {}

impl From<PublicKey> for [u8; 32] {
    fn from(pk: PublicKey) -> Self {
        pk.0.into()
    }
}

impl TryFrom<[u8; 32]> for PublicKey {
    type Error = reddsa::Error;

    fn try_from(bytes: [u8; 32]) -> Result<Self, Self::Error> {
        reddsa::VerificationKey::<SpendAuth>::try_from(bytes).map(Self)
    }
}
