//! Gas sponsorship.
//!
//! The sponsor pays for user transactions it did not author. It completes
//! the user's transaction kind with its own gas coin, hands back the exact
//! bytes and their digest, and later countersigns those same bytes once the
//! user's composite signature arrives.
//!
//! ```text
//! client                          Sponsor                         ledger
//!   │ sponsor{kind, sender, ..} ─>│ validate                         │
//!   │                             │ gas price, coins ───────────────>│
//!   │                             │ lock pool, select, reserve       │
//!   │<─ {bytes, digest} ──────────│                                  │
//!   │ compose(bytes)              │                                  │
//!   │ execute{digest, sig} ──────>│ verify user sig, sign as owner   │
//!   │                             │ submit [user, sponsor] ─────────>│
//!   │<─ {digest, status} ─────────│ release or hold coin             │
//! ```
//!
//! Request validation failures never touch the ledger. Ledger rejections
//! are returned with the ledger's own text. A submission that fails in
//! transport keeps its coin reserved, since the ledger may have executed it.

pub mod client;
pub mod pool;

use alloc::sync::Arc;
use core::time::Duration;
use std::time::Instant;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

use crate::{
    address::Address,
    composite::GenericSignature,
    keys::private::SponsorSigningKey,
    ledger::{ExecutionStatus, LedgerClient, LedgerError},
    primitives::ObjectId,
    transaction::{GasData, TransactionData, TransactionDigest, TransactionKind},
};

pub use client::HttpSponsorClient;
pub use pool::GasCoinPool;

/// Default gas budget per sponsored transaction.
pub const DEFAULT_GAS_BUDGET: u64 = 50_000_000;

/// Default lifetime of an unexecuted reservation.
pub const DEFAULT_RESERVATION_TTL: Duration = Duration::from_secs(60);

/// Sponsorship failures.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SponsorError {
    /// A required request field is absent or empty.
    #[error("missing `{0}`")]
    MissingField(&'static str),

    /// A request field could not be decoded.
    #[error("invalid `{field}`: {reason}")]
    InvalidField {
        /// Field name.
        field: &'static str,
        /// What was wrong.
        reason: String,
    },

    /// The request targets another network.
    #[error("network mismatch: sponsor serves `{expected}`, request is for `{requested}`")]
    NetworkMismatch {
        /// The sponsor's network.
        expected: String,
        /// The requested network.
        requested: String,
    },

    /// The sender is not in the request's allow-list.
    #[error("sender {0} is not an allowed address")]
    SenderNotAllowed(Address),

    /// The transaction calls a package the sponsor does not pay for.
    #[error("package {0} is not sponsored")]
    PackageNotAllowed(ObjectId),

    /// The sponsor cannot pay: out of gas or misconfigured.
    #[error("sponsor unavailable: {0}")]
    SponsorUnavailable(String),

    /// Every spendable coin is reserved by another pending transaction.
    #[error("all sponsor gas coins are reserved; retry shortly")]
    GasCoinsBusy,

    /// No pending sponsorship has this digest (never issued, executed, or
    /// expired).
    #[error("unknown or expired transaction digest {0}")]
    UnknownDigest(String),

    /// This digest is already being executed.
    #[error("transaction {0} is already being executed")]
    AlreadyExecuting(String),

    /// The user signature does not authorize the sponsored bytes.
    #[error("user signature rejected: {0}")]
    InvalidSignature(String),

    /// The ledger rejected the transaction. Verbatim ledger text.
    #[error("{0}")]
    LedgerRejected(String),

    /// The ledger or sponsor endpoint could not be reached.
    #[error("transport failure: {0}")]
    Transport(String),

    /// An internal failure (encoding) on the sponsor side.
    #[error("internal sponsor error: {0}")]
    Internal(String),
}

impl SponsorError {
    /// Stable machine-readable code for the wire body.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match *self {
            Self::MissingField(_) => "missing_field",
            Self::InvalidField { .. } => "invalid_field",
            Self::NetworkMismatch { .. } => "network_mismatch",
            Self::SenderNotAllowed(_) => "sender_not_allowed",
            Self::PackageNotAllowed(_) => "package_not_allowed",
            Self::SponsorUnavailable(_) => "sponsor_unavailable",
            Self::GasCoinsBusy => "gas_coins_busy",
            Self::UnknownDigest(_) => "unknown_digest",
            Self::AlreadyExecuting(_) => "already_executing",
            Self::InvalidSignature(_) => "invalid_signature",
            Self::LedgerRejected(_) => "ledger_rejected",
            Self::Transport(_) => "transport",
            Self::Internal(_) => "internal",
        }
    }

    /// Rebuild a typed error from a wire body. Codes whose payload cannot
    /// be recovered from text keep the message verbatim.
    #[must_use]
    pub fn from_wire(code: Option<&str>, message: String) -> Self {
        match code {
            Some("sponsor_unavailable") => Self::SponsorUnavailable(message),
            Some("gas_coins_busy") => Self::GasCoinsBusy,
            Some("unknown_digest") => Self::UnknownDigest(message),
            Some("already_executing") => Self::AlreadyExecuting(message),
            Some("invalid_signature") => Self::InvalidSignature(message),
            Some("ledger_rejected") => Self::LedgerRejected(message),
            Some(_) | None => Self::Transport(message),
        }
    }

    /// HTTP status for this error.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match *self {
            Self::MissingField(_)
            | Self::InvalidField { .. }
            | Self::NetworkMismatch { .. }
            | Self::SenderNotAllowed(_)
            | Self::PackageNotAllowed(_)
            | Self::InvalidSignature(_) => 400,
            Self::UnknownDigest(_) => 404,
            Self::GasCoinsBusy | Self::AlreadyExecuting(_) => 409,
            Self::SponsorUnavailable(_) => 503,
            Self::LedgerRejected(_) | Self::Transport(_) => 502,
            Self::Internal(_) => 500,
        }
    }
}

impl From<LedgerError> for SponsorError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Rejected(text) => Self::LedgerRejected(text),
            LedgerError::Transport(text) | LedgerError::Malformed(text) => Self::Transport(text),
        }
    }
}

/// `POST /sponsor` body.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SponsorRequest {
    /// Base64 kind bytes.
    #[serde(default)]
    pub transaction_kind_bytes: Option<String>,
    /// Sender address.
    #[serde(default)]
    pub sender: Option<String>,
    /// If non-empty, the sender must be one of these.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_addresses: Vec<String>,
    /// Network name.
    #[serde(default)]
    pub network: String,
}

/// `POST /sponsor` response.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct SponsorResponse {
    /// Base64 transaction bytes, to be signed exactly as returned.
    pub bytes: String,
    /// Digest of `bytes`.
    pub digest: TransactionDigest,
}

/// `POST /execute` body.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ExecuteRequest {
    /// Digest returned by `/sponsor`.
    #[serde(default)]
    pub digest: Option<String>,
    /// Base64 user signature over the sponsored bytes.
    #[serde(default)]
    pub signature: Option<String>,
}

/// `POST /execute` response.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct ExecuteResponse {
    /// Executed transaction digest.
    pub digest: TransactionDigest,
    /// Effects status.
    #[serde(flatten)]
    pub status: ExecutionStatus,
}

/// The two-call sponsorship interface, in-process or remote.
#[async_trait]
pub trait SponsorGateway: Send + Sync {
    /// Attach gas to a transaction kind.
    async fn sponsor(&self, request: &SponsorRequest) -> Result<SponsorResponse, SponsorError>;

    /// Countersign and submit previously sponsored bytes.
    async fn execute(&self, request: &ExecuteRequest) -> Result<ExecuteResponse, SponsorError>;
}

#[async_trait]
impl<G: SponsorGateway + ?Sized> SponsorGateway for Arc<G> {
    async fn sponsor(&self, request: &SponsorRequest) -> Result<SponsorResponse, SponsorError> {
        (**self).sponsor(request).await
    }

    async fn execute(&self, request: &ExecuteRequest) -> Result<ExecuteResponse, SponsorError> {
        (**self).execute(request).await
    }
}

/// Sponsor policy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SponsorPolicy {
    /// Network this sponsor serves.
    pub network: String,
    /// Gas budget attached to every transaction.
    pub gas_budget: u64,
    /// How long sponsored bytes stay executable.
    pub reservation_ttl: Duration,
    /// If non-empty, the only packages the sponsor pays for.
    pub allowed_packages: Vec<ObjectId>,
}

impl SponsorPolicy {
    /// Defaults for `network`.
    #[must_use]
    pub fn new(network: impl Into<String>) -> Self {
        Self {
            network: network.into(),
            gas_budget: DEFAULT_GAS_BUDGET,
            reservation_ttl: DEFAULT_RESERVATION_TTL,
            allowed_packages: Vec::new(),
        }
    }
}

/// The sponsorship service.
#[derive(Debug)]
pub struct Sponsor<L> {
    key: SponsorSigningKey,
    ledger: L,
    policy: SponsorPolicy,
    pool: GasCoinPool,
}

fn required<'req>(
    value: Option<&'req String>,
    field: &'static str,
) -> Result<&'req str, SponsorError> {
    value
        .map(|text| text.trim())
        .filter(|text| !text.is_empty())
        .ok_or(SponsorError::MissingField(field))
}

fn invalid(field: &'static str, reason: impl ToString) -> SponsorError {
    SponsorError::InvalidField {
        field,
        reason: reason.to_string(),
    }
}

impl<L: LedgerClient> Sponsor<L> {
    /// A sponsor paying with `key`'s coins on `ledger`.
    pub fn new(key: SponsorSigningKey, ledger: L, policy: SponsorPolicy) -> Self {
        let pool = GasCoinPool::new(policy.reservation_ttl);
        tracing::info!(
            sponsor = %key.address(),
            network = %policy.network,
            gas_budget = policy.gas_budget,
            "sponsor ready"
        );
        Self {
            key,
            ledger,
            policy,
            pool,
        }
    }

    /// The gas owner address.
    #[must_use]
    pub fn address(&self) -> Address {
        self.key.address()
    }

    /// The ledger this sponsor submits to.
    pub const fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Decode and check a sponsorship request without touching the ledger.
    fn validate(
        &self,
        request: &SponsorRequest,
    ) -> Result<(TransactionKind, Address), SponsorError> {
        let sender: Address = required(request.sender.as_ref(), "sender")?
            .parse()
            .map_err(|err| invalid("sender", err))?;
        let kind_bytes = STANDARD
            .decode(required(request.transaction_kind_bytes.as_ref(), "transactionKindBytes")?)
            .map_err(|err| invalid("transactionKindBytes", err))?;
        let kind = TransactionKind::from_bytes(&kind_bytes)
            .map_err(|err| invalid("transactionKindBytes", err))?;

        if request.network != self.policy.network {
            return Err(SponsorError::NetworkMismatch {
                expected: self.policy.network.clone(),
                requested: request.network.clone(),
            });
        }

        if sender == self.address() {
            return Err(invalid("sender", "the sponsor cannot sponsor itself"));
        }

        if !request.allowed_addresses.is_empty() {
            let allowed = request
                .allowed_addresses
                .iter()
                .map(|text| text.parse::<Address>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|err| invalid("allowedAddresses", err))?;
            if !allowed.contains(&sender) {
                return Err(SponsorError::SenderNotAllowed(sender));
            }
        }

        if !self.policy.allowed_packages.is_empty() {
            if let Some(package) = kind
                .called_packages()
                .find(|package| !self.policy.allowed_packages.contains(package))
            {
                return Err(SponsorError::PackageNotAllowed(*package));
            }
        }

        Ok((kind, sender))
    }

    /// Attach gas to a transaction kind and reserve the coin.
    pub async fn sponsor(&self, request: &SponsorRequest) -> Result<SponsorResponse, SponsorError> {
        let (kind, sender) = self.validate(request).inspect_err(|err| {
            tracing::info!(error = %err, "sponsorship request rejected");
        })?;

        let price = self.ledger.reference_gas_price().await?;

        // Hold the pool across listing and reservation so no other request
        // can select the same coin version in between.
        let mut pool = self.pool.lock().await;
        let listings = self.ledger.gas_coins(&self.address()).await?;
        let now = Instant::now();
        let coin = pool
            .select(&listings, self.policy.gas_budget, now)
            .inspect_err(|err| {
                if matches!(*err, SponsorError::SponsorUnavailable(_)) {
                    tracing::error!(
                        alert = true,
                        sponsor = %self.address(),
                        error = %err,
                        "sponsor out of gas"
                    );
                }
            })?;

        let data = TransactionData::new_sponsored(
            kind,
            sender,
            GasData {
                payment: vec![coin],
                owner: self.address(),
                price,
                budget: self.policy.gas_budget,
            },
        );
        let tx_bytes = data
            .to_bytes()
            .map_err(|err| SponsorError::Internal(err.to_string()))?;
        let digest = TransactionDigest::of(&tx_bytes);
        let bytes = STANDARD.encode(&tx_bytes);
        pool.reserve(digest, coin, tx_bytes, self.pool.expiry_from(now));
        drop(pool);

        tracing::debug!(
            %digest,
            %sender,
            coin = %coin.object_id,
            version = coin.version,
            "sponsored transaction"
        );
        Ok(SponsorResponse { bytes, digest })
    }

    /// Check the user's signature, countersign and submit.
    pub async fn execute(&self, request: &ExecuteRequest) -> Result<ExecuteResponse, SponsorError> {
        let digest: TransactionDigest = required(request.digest.as_ref(), "digest")?
            .parse()
            .map_err(|err| invalid("digest", err))?;
        let user = GenericSignature::from_base64(required(request.signature.as_ref(), "signature")?)
            .map_err(|err| invalid("signature", err))?;

        let tx_bytes = self.pool.begin_execute(&digest, Instant::now()).await?;

        if let Err(err) = Self::check_user_signature(&tx_bytes, &user) {
            self.pool.abort_execute(&digest).await;
            tracing::info!(%digest, error = %err, "user signature rejected");
            return Err(err);
        }

        let sponsor = GenericSignature::sign_sponsor(&self.key, &tx_bytes, &mut OsRng);
        let submitted = self
            .ledger
            .execute_transaction(&tx_bytes, &[user, sponsor])
            .await;

        match submitted {
            Ok(outcome) => {
                self.pool.finish_execute(&digest).await;
                tracing::info!(%digest, status = ?outcome.status, "sponsored transaction executed");
                Ok(ExecuteResponse {
                    digest: outcome.digest,
                    status: outcome.status,
                })
            }
            Err(err @ LedgerError::Rejected(_)) => {
                self.pool.finish_execute(&digest).await;
                tracing::warn!(%digest, error = %err, "ledger rejected sponsored transaction");
                Err(err.into())
            }
            Err(err @ (LedgerError::Transport(_) | LedgerError::Malformed(_))) => {
                self.pool.hold_in_doubt(&digest, Instant::now()).await;
                tracing::warn!(
                    %digest,
                    error = %err,
                    "sponsored transaction outcome unknown; holding gas coin"
                );
                Err(err.into())
            }
        }
    }

    fn check_user_signature(tx_bytes: &[u8], user: &GenericSignature) -> Result<(), SponsorError> {
        let data = TransactionData::from_bytes(tx_bytes)
            .map_err(|err| SponsorError::Internal(err.to_string()))?;
        if user.signer() != data.sender {
            return Err(SponsorError::InvalidSignature(format!(
                "signature is for {}, transaction sender is {}",
                user.signer(),
                data.sender
            )));
        }
        user.verify(tx_bytes)
            .map_err(|err| SponsorError::InvalidSignature(err.to_string()))
    }
}

#[async_trait]
impl<L: LedgerClient> SponsorGateway for Sponsor<L> {
    async fn sponsor(&self, request: &SponsorRequest) -> Result<SponsorResponse, SponsorError> {
        Self::sponsor(self, request).await
    }

    async fn execute(&self, request: &ExecuteRequest) -> Result<ExecuteResponse, SponsorError> {
        Self::execute(self, request).await
    }
}
