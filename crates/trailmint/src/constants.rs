//! Protocol-wide domain separators, scheme flags and versioned constants.
//!
//! All BLAKE2b personalizations are exactly 16 bytes (the BLAKE2b
//! personal field width). Every derived address depends on the salt and
//! address-seed constants below; changing any of them silently moves every
//! user to a new account.

use blake2b_simd::Params;

/// BLAKE2b-512 personalization for the OIDC nonce.
///
/// `nonce = base64url(BLAKE2b-512("ZkLogin_NonceSed", epk || max_epoch ||
/// randomness)[..20])`
pub const NONCE_PERSONALIZATION: &[u8; 16] = b"ZkLogin_NonceSed";

/// BLAKE2b-512 personalization for the address seed, reduced to `Fp`.
pub const ADDRESS_SEED_PERSONALIZATION: &[u8; 16] = b"ZkLogin_AddrSeed";

/// BLAKE2b-256 personalization for account addresses (both zkLogin and
/// plain-key accounts; the scheme flag separates them).
pub const ADDRESS_PERSONALIZATION: &[u8; 16] = b"Trailmint_Addres";

/// BLAKE2b-256 personalization for transaction digests.
pub const TX_DIGEST_PERSONALIZATION: &[u8; 16] = b"Trailmint_TxDgst";

/// BLAKE2b-256 personalization for the message every signer signs.
///
/// Signers never sign raw transaction bytes: they sign
/// `BLAKE2b-256("Trailmint_Intent", INTENT_TRANSACTION || tx_bytes)`.
pub const INTENT_PERSONALIZATION: &[u8; 16] = b"Trailmint_Intent";

/// BLAKE2b-256 personalization for the commitment the mock proving
/// service issues in place of a Groth16 proof.
pub const MOCK_PROOF_PERSONALIZATION: &[u8; 16] = b"Trailmint_MockPf";

/// Intent prefix for transaction data: `(scope, version, app)`.
pub const INTENT_TRANSACTION: [u8; 3] = [0, 0, 0];

/// Signature scheme flag for a plain RedPallas key signature.
pub const PLAIN_SIGNATURE_FLAG: u8 = 0x00;

/// Signature scheme flag for a composite zkLogin signature.
pub const ZKLOGIN_SIGNATURE_FLAG: u8 = 0x05;

/// The only key claim used for address derivation.
pub const KEY_CLAIM_NAME: &str = "sub";

/// Salt scheme version. Bumping this is an address migration.
pub const SALT_SCHEME_VERSION: u8 = 1;

/// Salt scheme v1 offset basis (FNV-128 offset).
pub const SALT_OFFSET: u128 = 0x6c62_272e_07bb_0142_62b8_2175_6295_c58d;

/// Salt scheme v1 multiplier (FNV-128 prime).
pub const SALT_MULTIPLIER: u128 = 0x0000_0000_0100_0000_0000_0000_0000_013b;

/// Default number of epochs a login session stays valid for.
pub const DEFAULT_EPOCH_LOOKAHEAD: u64 = 10;

/// Ephemeral randomness width in bytes.
pub const RANDOMNESS_LEN: usize = 16;

/// Bytes of the nonce hash kept before base64url encoding.
pub const NONCE_LEN: usize = 20;

/// Native gas coin type reported by the ledger.
pub const GAS_COIN_TYPE: &str = "0x2::sui::SUI";

/// Domain-separated BLAKE2b hashing.
///
/// A personalization tag plus output width. One constant per purpose so
/// no two derivations can collide.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Blake2bDomain {
    personal: &'static [u8; 16],
}

impl Blake2bDomain {
    /// Nonce derivation.
    pub(crate) const NONCE: Self = Self {
        personal: NONCE_PERSONALIZATION,
    };
    /// Address seed derivation.
    pub(crate) const ADDRESS_SEED: Self = Self {
        personal: ADDRESS_SEED_PERSONALIZATION,
    };
    /// Account address derivation.
    pub(crate) const ADDRESS: Self = Self {
        personal: ADDRESS_PERSONALIZATION,
    };
    /// Transaction digest.
    pub(crate) const TX_DIGEST: Self = Self {
        personal: TX_DIGEST_PERSONALIZATION,
    };
    /// Intent message.
    pub(crate) const INTENT: Self = Self {
        personal: INTENT_PERSONALIZATION,
    };

    /// `BLAKE2b-512(personal, parts[0] || parts[1] || ...)`.
    pub(crate) fn wide(self, parts: &[&[u8]]) -> [u8; 64] {
        let mut state = Params::new()
            .hash_length(64)
            .personal(self.personal)
            .to_state();
        for part in parts {
            state.update(part);
        }
        *state.finalize().as_array()
    }

    /// `BLAKE2b-256(personal, parts[0] || parts[1] || ...)`.
    pub(crate) fn narrow(self, parts: &[&[u8]]) -> [u8; 32] {
        let mut state = Params::new()
            .hash_length(32)
            .personal(self.personal)
            .to_state();
        for part in parts {
            state.update(part);
        }
        let mut out = [0u8; 32];
        out.copy_from_slice(state.finalize().as_bytes());
        out
    }
}
