//! The ledger node, as seen by this crate.
//!
//! Four calls are needed: the current epoch (session bounds), the reference
//! gas price and the sponsor's gas coins (sponsorship), and transaction
//! submission. Everything else about the ledger is opaque.

pub mod rpc;

use alloc::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    address::Address,
    composite::GenericSignature,
    primitives::{Epoch, ObjectDigest, ObjectId, ObjectRef},
    transaction::TransactionDigest,
};

pub use rpc::RpcLedger;

/// Ledger call failures.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// The node could not be reached.
    #[error("ledger node unreachable: {0}")]
    Transport(String),

    /// The node rejected the call. The text is the node's, verbatim.
    #[error("{0}")]
    Rejected(String),

    /// The node answered with something unexpected.
    #[error("unexpected ledger response: {0}")]
    Malformed(String),
}

/// A gas coin as listed by the node.
///
/// Listings may be partial; only complete ones can pay for gas.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoinListing {
    /// Coin object id.
    pub object_id: ObjectId,
    /// Current version, if reported.
    pub version: Option<u64>,
    /// Current digest, if reported.
    pub digest: Option<ObjectDigest>,
    /// Balance in the smallest unit.
    pub balance: u64,
}

impl CoinListing {
    /// The full object reference, or `None` if version or digest is
    /// missing.
    #[must_use]
    pub fn object_ref(&self) -> Option<ObjectRef> {
        Some(ObjectRef {
            object_id: self.object_id,
            version: self.version?,
            digest: self.digest?,
        })
    }
}

/// Effects status of an executed transaction.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ExecutionStatus {
    /// Executed successfully.
    Success,
    /// Executed, but aborted; gas was still charged.
    Failure {
        /// The ledger's error text.
        error: String,
    },
}

/// Result of a submitted transaction.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct ExecutionOutcome {
    /// Transaction digest.
    pub digest: TransactionDigest,
    /// Effects status.
    pub status: ExecutionStatus,
}

/// A ledger node.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// The current epoch.
    async fn current_epoch(&self) -> Result<Epoch, LedgerError>;

    /// The reference gas price for the current epoch.
    async fn reference_gas_price(&self) -> Result<u64, LedgerError>;

    /// Native gas coins owned by `owner`.
    async fn gas_coins(&self, owner: &Address) -> Result<Vec<CoinListing>, LedgerError>;

    /// Submit signed transaction bytes. Signatures are ordered user first,
    /// then sponsor.
    async fn execute_transaction(
        &self,
        tx_bytes: &[u8],
        signatures: &[GenericSignature],
    ) -> Result<ExecutionOutcome, LedgerError>;
}

#[async_trait]
impl<L: LedgerClient + ?Sized> LedgerClient for Arc<L> {
    async fn current_epoch(&self) -> Result<Epoch, LedgerError> {
        (**self).current_epoch().await
    }

    async fn reference_gas_price(&self) -> Result<u64, LedgerError> {
        (**self).reference_gas_price().await
    }

    async fn gas_coins(&self, owner: &Address) -> Result<Vec<CoinListing>, LedgerError> {
        (**self).gas_coins(owner).await
    }

    async fn execute_transaction(
        &self,
        tx_bytes: &[u8],
        signatures: &[GenericSignature],
    ) -> Result<ExecutionOutcome, LedgerError> {
        (**self).execute_transaction(tx_bytes, signatures).await
    }
}
