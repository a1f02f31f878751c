//! The top-level error taxonomy.
//!
//! Identity and session failures are recovered locally (the wallet resets
//! to unauthenticated before returning them). Proof and sponsorship
//! failures propagate with their full message.

use crate::{
    composite::SignatureError,
    ledger::LedgerError,
    primitives::Epoch,
    proof::ProofError,
    session::SessionError,
    sponsor::SponsorError,
    store::StoreError,
    token::TokenError,
    transaction::BuildError,
};

/// Any failure of the sign-in and mint flow.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// Missing, malformed or expired identity token.
    #[error("invalid identity token: {0}")]
    InvalidToken(#[from] TokenError),

    /// The proof could not be obtained; sign-in is incomplete.
    #[error("sign-in incomplete: {0}")]
    ProofService(#[from] ProofError),

    /// The session's epoch bound has passed; log in again.
    #[error("session expired at epoch {max_epoch} (current epoch {current_epoch})")]
    SessionExpired {
        /// The session's bound.
        max_epoch: Epoch,
        /// The ledger's epoch.
        current_epoch: Epoch,
    },

    /// The sponsor cannot pay for transactions.
    #[error("sponsor unavailable: {0}")]
    SponsorUnavailable(String),

    /// The ledger rejected the transaction. Verbatim ledger text.
    #[error("{0}")]
    LedgerRejected(String),

    /// No login is in progress or completed.
    #[error("not authenticated")]
    NotAuthenticated,

    /// The sponsor returned bytes that are not the transaction we asked for.
    #[error("sponsored transaction does not match the request: {0}")]
    Integrity(String),

    /// Transaction assembly failed.
    #[error(transparent)]
    Build(#[from] BuildError),

    /// Signature composition failed.
    #[error(transparent)]
    Signature(SignatureError),

    /// Any other sponsorship failure.
    #[error(transparent)]
    Sponsor(SponsorError),

    /// Session storage failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Session state is unusable.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Any other ledger failure.
    #[error(transparent)]
    Ledger(LedgerError),
}

impl From<SignatureError> for AuthError {
    fn from(err: SignatureError) -> Self {
        match err {
            SignatureError::SessionExpired { max_epoch, current } => Self::SessionExpired {
                max_epoch,
                current_epoch: current,
            },
            other @ (SignatureError::MissingProof
            | SignatureError::ProofBindingMismatch(_)
            | SignatureError::InvalidSignature
            | SignatureError::Malformed(_)
            | SignatureError::UnknownScheme(_)) => Self::Signature(other),
        }
    }
}

impl From<SponsorError> for AuthError {
    fn from(err: SponsorError) -> Self {
        match err {
            SponsorError::SponsorUnavailable(text) => Self::SponsorUnavailable(text),
            SponsorError::LedgerRejected(text) => Self::LedgerRejected(text),
            other @ (SponsorError::MissingField(_)
            | SponsorError::InvalidField { .. }
            | SponsorError::NetworkMismatch { .. }
            | SponsorError::SenderNotAllowed(_)
            | SponsorError::PackageNotAllowed(_)
            | SponsorError::GasCoinsBusy
            | SponsorError::UnknownDigest(_)
            | SponsorError::AlreadyExecuting(_)
            | SponsorError::InvalidSignature(_)
            | SponsorError::Transport(_)
            | SponsorError::Internal(_)) => Self::Sponsor(other),
        }
    }
}

impl From<LedgerError> for AuthError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Rejected(text) => Self::LedgerRejected(text),
            other @ (LedgerError::Transport(_) | LedgerError::Malformed(_)) => Self::Ledger(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_mapping() {
        assert_eq!(
            AuthError::from(SponsorError::SponsorUnavailable("no coins".to_owned())),
            AuthError::SponsorUnavailable("no coins".to_owned())
        );
        assert_eq!(
            AuthError::from(SponsorError::LedgerRejected("abort 7".to_owned())).to_string(),
            "abort 7"
        );
        assert_eq!(
            AuthError::from(SignatureError::SessionExpired {
                max_epoch: Epoch::from(3),
                current: Epoch::from(4),
            }),
            AuthError::SessionExpired {
                max_epoch: Epoch::from(3),
                current_epoch: Epoch::from(4),
            }
        );
        assert!(matches!(
            AuthError::from(SponsorError::GasCoinsBusy),
            AuthError::Sponsor(SponsorError::GasCoinsBusy)
        ));
    }
}
