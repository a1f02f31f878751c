//! # trailmint
//!
//! zkLogin sign-in and sponsored transactions for hiking-record mints.
//!
//! A user proves control of an OpenID Connect identity instead of holding a
//! long-term account key. The identity token, an ephemeral signing key and a
//! zero-knowledge proof together authorize a ledger transaction, while a
//! separate sponsor account pays the gas.
//!
//! ## Flow
//!
//! ```text
//! begin_login ──> LoginSession { ephemeral key, randomness, max_epoch }
//!       │                 │ nonce
//!       ▼                 ▼
//!  OIDC redirect ──> IdentityToken ──> Salt ──> Address
//!                         │
//!                         ▼
//!               ProofProvider::request_proof ──> ZkProof
//!                         │
//! build_mint_transaction ─┼─> TransactionKind ──> Sponsor::sponsor
//!                         │                           │ bytes + digest
//!                         ▼                           ▼
//!                 CompositeSignature ─────────> Sponsor::execute ──> ledger
//! ```
//!
//! ## Components
//!
//! - [`token`]: identity token decoding and fail-closed expiry checks
//! - [`salt`]: deterministic salt from the email claim
//! - [`session`]: ephemeral key session and OIDC nonce
//! - [`proof`]: proving service client
//! - [`address`]: address seed and account address derivation
//! - [`transaction`]: mint transaction assembly and digests
//! - [`composite`]: the composite (zkLogin) signature
//! - [`ledger`]: the ledger node interface and its JSON-RPC client
//! - [`sponsor`]: server-side gas sponsorship with coin reservation
//! - [`oidc`], [`store`], [`config`]: redirect helpers, session storage and
//!   client settings
//! - [`wallet`]: client-side orchestration of all of the above

#![cfg_attr(docsrs, feature(doc_cfg))]
#![expect(clippy::pub_use, reason = "the crate root re-exports its core types")]
#![expect(
    clippy::module_name_repetitions,
    reason = "error and request types are named for their module"
)]

extern crate alloc;

pub mod address;
pub mod composite;
pub mod config;
pub mod constants;
pub mod error;
pub mod keys;
pub mod ledger;
pub mod oidc;
pub mod proof;
pub mod salt;
pub mod session;
pub mod sponsor;
pub mod store;
pub mod token;
pub mod transaction;
pub mod wallet;

mod primitives;

pub use address::{Address, AddressSeed};
pub use composite::{CompositeSignature, GenericSignature};
pub use error::AuthError;
pub use primitives::{Epoch, ObjectDigest, ObjectId, ObjectRef, ParseObjectError};
pub use proof::ZkProof;
pub use salt::Salt;
pub use session::LoginSession;
pub use token::IdentityToken;
pub use transaction::{MintFields, TransactionData, TransactionDigest, TransactionKind};
pub use wallet::Wallet;
