//! Signature type bridging private (sign) and public (verify) keys.

use reddsa::orchard::SpendAuth;

/// A RedPallas signature over an intent message.
#[derive(Clone, Copy, Debug)]
#[expect(clippy::field_scoped_visibility_modifiers, reason = "keys module internals")]
pub struct KeySignature(pub(super) reddsa::Signature<SpendAuth>);

impl From<[u8; 64]> for KeySignature {
    fn from(bytes: [u8; 64]) -> Self {
        Self(reddsa::Signature::<SpendAuth>::from(bytes))
    }
}

impl From<KeySignature> for [u8; 64] {
    fn from(sig: KeySignature) -> Self {
        sig.0.into()
    }
}

#[expect(
    clippy::missing_trait_methods,
    reason = "default ne/assert impls are correct"
)]
impl PartialEq for KeySignature {
    fn eq(&self, other: &Self) -> bool {
        <[u8; 64]>::from(self.0) == <[u8; 64]>::from(other.0)
    }
}

#[expect(
    clippy::missing_trait_methods,
    reason = "default assert_receiver_is_total_eq is correct"
)]
impl Eq for KeySignature {}
