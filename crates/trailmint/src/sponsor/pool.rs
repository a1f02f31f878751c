//! Gas coin reservation.
//!
//! The sponsor's coins are a shared resource: two transactions embedding
//! the same coin version would both be signed but only one could execute.
//! The pool serializes selection behind one async mutex per sponsor and
//! keeps each selected coin reserved, keyed by the digest of the bytes it
//! was built into, until that transaction is executed or the reservation
//! lapses.
//!
//! A submission that fails in transport may still have reached the ledger,
//! so its coin is held as in doubt until the TTL passes or a listing shows
//! the coin at a newer version than the one reserved.
//!
//! ```text
//!   sponsor ──lock──> select(listings) ──> reserve(digest, coin, bytes) ──unlock
//!   execute ──begin(digest)──> Executing ──submit──> finish(digest)
//!                 ├── verification failed ──> abort(digest) ──> Pending
//!                 └── outcome unknown ──> hold(digest) ──> InDoubt
//! ```

use core::time::Duration;
use std::{collections::HashMap, time::Instant};

use tokio::sync::{Mutex, MutexGuard};

use super::SponsorError;
use crate::{
    ledger::CoinListing,
    primitives::{ObjectId, ObjectRef},
    transaction::TransactionDigest,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Stage {
    Pending,
    Executing,
    InDoubt,
}

#[derive(Debug)]
struct Reservation {
    coin: ObjectId,
    version: u64,
    tx_bytes: Vec<u8>,
    expires_at: Instant,
    stage: Stage,
}

/// Reservations currently held.
#[derive(Debug, Default)]
pub struct PoolState {
    reservations: HashMap<TransactionDigest, Reservation>,
}

impl PoolState {
    /// Drop pending reservations whose TTL has passed. Executing ones are
    /// kept until their submission returns.
    fn purge(&mut self, now: Instant) {
        self.reservations.retain(|digest, reservation| {
            let live = reservation.stage == Stage::Executing || reservation.expires_at > now;
            if !live {
                tracing::debug!(%digest, coin = %reservation.coin, "gas reservation expired");
            }
            live
        });
    }

    /// Release in-doubt reservations on `listed` if the ledger already shows
    /// the coin past the reserved version.
    fn settle(&mut self, listed: &ObjectRef) {
        self.reservations.retain(|digest, reservation| {
            let spent = reservation.stage == Stage::InDoubt
                && reservation.coin == listed.object_id
                && reservation.version < listed.version;
            if spent {
                tracing::debug!(%digest, coin = %reservation.coin, "in-doubt gas coin moved on");
            }
            !spent
        });
    }

    fn is_reserved(&self, coin: &ObjectId) -> bool {
        self.reservations
            .values()
            .any(|reservation| reservation.coin == *coin)
    }

    /// Pick a coin able to pay `budget` that no live reservation holds.
    ///
    /// Listings missing a version or digest are skipped, as are coins below
    /// the budget. If nothing is spendable at all the sponsor is out of gas;
    /// if everything spendable is reserved the pool is busy.
    pub fn select(
        &mut self,
        listings: &[CoinListing],
        budget: u64,
        now: Instant,
    ) -> Result<ObjectRef, SponsorError> {
        self.purge(now);

        let mut spendable = 0usize;
        for listing in listings {
            let Some(object_ref) = listing.object_ref() else {
                tracing::warn!(
                    coin = %listing.object_id,
                    "skipping gas coin with partial reference"
                );
                continue;
            };
            self.settle(&object_ref);
            if listing.balance < budget {
                continue;
            }
            spendable = spendable.saturating_add(1);
            if !self.is_reserved(&object_ref.object_id) {
                return Ok(object_ref);
            }
        }

        if spendable == 0 {
            Err(SponsorError::SponsorUnavailable(format!(
                "no gas coin can cover a budget of {budget} ({} listed)",
                listings.len()
            )))
        } else {
            Err(SponsorError::GasCoinsBusy)
        }
    }

    /// Hold `coin` for the transaction `tx_bytes` with `digest`.
    pub fn reserve(
        &mut self,
        digest: TransactionDigest,
        coin: ObjectRef,
        tx_bytes: Vec<u8>,
        expires_at: Instant,
    ) {
        self.reservations.insert(
            digest,
            Reservation {
                coin: coin.object_id,
                version: coin.version,
                tx_bytes,
                expires_at,
                stage: Stage::Pending,
            },
        );
    }

    /// Number of live reservations (pending, executing or in doubt).
    #[must_use]
    pub fn len(&self) -> usize {
        self.reservations.len()
    }

    /// Whether no reservation is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reservations.is_empty()
    }
}

/// A sponsor's gas coins and their reservations.
#[derive(Debug)]
pub struct GasCoinPool {
    state: Mutex<PoolState>,
    ttl: Duration,
}

impl GasCoinPool {
    /// A pool whose reservations lapse after `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            state: Mutex::new(PoolState::default()),
            ttl,
        }
    }

    /// When a reservation made now lapses.
    #[must_use]
    pub fn expiry_from(&self, now: Instant) -> Instant {
        now.checked_add(self.ttl).unwrap_or(now)
    }

    /// Exclusive access for one select-and-reserve.
    pub async fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().await
    }

    /// Move a pending reservation to executing and return its bytes.
    pub async fn begin_execute(
        &self,
        digest: &TransactionDigest,
        now: Instant,
    ) -> Result<Vec<u8>, SponsorError> {
        let mut state = self.state.lock().await;
        state.purge(now);
        let reservation = state
            .reservations
            .get_mut(digest)
            .ok_or_else(|| SponsorError::UnknownDigest(digest.to_string()))?;
        match reservation.stage {
            Stage::Pending => {
                reservation.stage = Stage::Executing;
                Ok(reservation.tx_bytes.clone())
            }
            Stage::Executing | Stage::InDoubt => {
                Err(SponsorError::AlreadyExecuting(digest.to_string()))
            }
        }
    }

    /// Return an executing reservation to pending (nothing was submitted).
    pub async fn abort_execute(&self, digest: &TransactionDigest) {
        if let Some(reservation) = self.state.lock().await.reservations.get_mut(digest) {
            reservation.stage = Stage::Pending;
        }
    }

    /// Release the coin once the ledger has accepted or refused the bytes.
    pub async fn finish_execute(&self, digest: &TransactionDigest) {
        self.state.lock().await.reservations.remove(digest);
    }

    /// Keep the coin reserved when the submission's fate is unknown.
    pub async fn hold_in_doubt(&self, digest: &TransactionDigest, now: Instant) {
        let expires_at = self.expiry_from(now);
        if let Some(reservation) = self.state.lock().await.reservations.get_mut(digest) {
            reservation.stage = Stage::InDoubt;
            reservation.expires_at = expires_at;
        }
    }
}
