//! In-memory doubles for the ledger node and the proving service.
//!
//! [`MockLedger`] behaves like a node as far as sponsored zkLogin
//! transactions are concerned: it checks both signatures and their order,
//! enforces the composite signature's epoch bound, checks the mock proof
//! against the signature's key, seed and issuer, and consumes gas coin
//! versions so a stale reference is rejected. Rejections are free text, as
//! a real node's are.
//!
//! [`MockProver`] stands in for the proving service. Its "proof" is a
//! BLAKE2b commitment to exactly what a real proof binds (ephemeral key,
//! epoch bound, address seed, issuer), which the mock ledger recomputes.

extern crate alloc;

use alloc::sync::Arc;
use core::sync::atomic::{AtomicUsize, Ordering};
use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use base64::{
    Engine as _,
    engine::general_purpose::{STANDARD, STANDARD_NO_PAD},
};
use blake2b_simd::Params;
use serde_json::Value;
use trailmint::{
    Address, AddressSeed, CompositeSignature, Epoch, GenericSignature, IdentityToken, ObjectDigest,
    ObjectId, ObjectRef, TransactionData, TransactionDigest,
    address::address_seed,
    constants::MOCK_PROOF_PERSONALIZATION,
    keys::public::PublicKey,
    ledger::{CoinListing, ExecutionOutcome, ExecutionStatus, LedgerClient, LedgerError},
    proof::{ProofError, ProofProvider, ProofRequest, encode_extended_public_key},
    session::{Randomness, nonce},
};

/// Personalization of mock coin digests.
const COIN_PERSONALIZATION: &[u8; 16] = b"MockLedger__Coin";

fn commitment(bound_key: &str, max_epoch: Epoch, seed: &AddressSeed, issuer: &str) -> String {
    let hash = Params::new()
        .hash_length(32)
        .personal(MOCK_PROOF_PERSONALIZATION)
        .to_state()
        .update(bound_key.as_bytes())
        .update(&u64::from(max_epoch).to_le_bytes())
        .update(&seed.to_bytes())
        .update(issuer.as_bytes())
        .finalize();
    STANDARD_NO_PAD.encode(hash.as_bytes())
}

fn coin_digest(id: &ObjectId, version: u64) -> ObjectDigest {
    let hash = Params::new()
        .hash_length(32)
        .personal(COIN_PERSONALIZATION)
        .to_state()
        .update(id.as_bytes())
        .update(&version.to_le_bytes())
        .finalize();
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(hash.as_bytes());
    ObjectDigest::from(bytes)
}

#[derive(Clone, Copy, Debug)]
struct Coin {
    id: ObjectId,
    version: u64,
    balance: u64,
    complete: bool,
}

impl Coin {
    fn listing(&self) -> CoinListing {
        CoinListing {
            object_id: self.id,
            version: self.complete.then_some(self.version),
            digest: self.complete.then(|| coin_digest(&self.id, self.version)),
            balance: self.balance,
        }
    }

    fn object_ref(&self) -> ObjectRef {
        ObjectRef {
            object_id: self.id,
            version: self.version,
            digest: coin_digest(&self.id, self.version),
        }
    }
}

#[derive(Debug)]
struct State {
    epoch: Epoch,
    gas_price: u64,
    next_coin: u64,
    coins: HashMap<Address, Vec<Coin>>,
    executed: Vec<TransactionDigest>,
}

/// An in-memory ledger node. Clones share state.
#[derive(Clone, Debug)]
pub struct MockLedger {
    state: Arc<Mutex<State>>,
}

impl Default for MockLedger {
    fn default() -> Self {
        Self::new(Epoch::from(0))
    }
}

impl MockLedger {
    /// A ledger at `epoch` with a reference gas price of 1000.
    #[must_use]
    pub fn new(epoch: Epoch) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                epoch,
                gas_price: 1_000,
                next_coin: 1,
                coins: HashMap::new(),
                executed: Vec::new(),
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move the ledger to `epoch`.
    pub fn set_epoch(&self, epoch: Epoch) {
        self.state().epoch = epoch;
    }

    /// Give `owner` a fresh gas coin holding `balance`.
    pub fn fund(&self, owner: Address, balance: u64) -> ObjectId {
        self.mint_coin(owner, balance, true)
    }

    /// Give `owner` a coin the node lists without version or digest.
    pub fn fund_partial(&self, owner: Address, balance: u64) -> ObjectId {
        self.mint_coin(owner, balance, false)
    }

    fn mint_coin(&self, owner: Address, balance: u64, complete: bool) -> ObjectId {
        let mut state = self.state();
        let mut raw = [0u8; 32];
        for (dst, src) in raw.iter_mut().rev().zip(state.next_coin.to_le_bytes()) {
            *dst = src;
        }
        state.next_coin = state.next_coin.saturating_add(1);
        let id = ObjectId::from(raw);
        state.coins.entry(owner).or_default().push(Coin {
            id,
            version: 1,
            balance,
            complete,
        });
        id
    }

    /// Current version of a coin.
    #[must_use]
    pub fn coin_version(&self, id: &ObjectId) -> Option<u64> {
        self.state()
            .coins
            .values()
            .flatten()
            .find(|coin| coin.id == *id)
            .map(|coin| coin.version)
    }

    /// Digests of executed transactions, in order.
    #[must_use]
    pub fn executed(&self) -> Vec<TransactionDigest> {
        self.state().executed.clone()
    }

    fn check_composite(
        composite: &CompositeSignature,
        sender: Address,
        epoch: Epoch,
    ) -> Result<(), String> {
        if composite.address() != sender {
            return Err(format!(
                "Invalid user signature: zkLogin address {} does not match sender {sender}",
                composite.address()
            ));
        }
        if composite.max_epoch < epoch {
            return Err(format!(
                "Invalid user signature: ZKLogin expired at epoch {}, current epoch {epoch}",
                composite.max_epoch
            ));
        }
        let inputs = &composite.proof.inputs;
        let bound_key = encode_extended_public_key(&composite.ephemeral_public_key);
        let expected = commitment(
            &bound_key,
            composite.max_epoch,
            &composite.address_seed,
            &composite.issuer,
        );
        let points = inputs.get("proofPoints").and_then(Value::as_str);
        if points != Some(expected.as_str()) {
            return Err("Invalid user signature: Groth16 proof verify failed".to_owned());
        }
        Ok(())
    }

    #[expect(clippy::ref_patterns, reason = "the composite is borrowed out of the signature")]
    fn check_signatures(
        tx_bytes: &[u8],
        data: &TransactionData,
        signatures: &[GenericSignature],
        epoch: Epoch,
    ) -> Result<(), String> {
        let &[ref user, ref sponsor] = signatures else {
            return Err(format!(
                "Expected 2 signatures for a sponsored transaction, got {}",
                signatures.len()
            ));
        };
        if user.signer() != data.sender {
            return Err(format!(
                "Signer {} is not the transaction sender {}",
                user.signer(),
                data.sender
            ));
        }
        if sponsor.signer() != data.gas_data.owner {
            return Err(format!(
                "Signer {} is not the gas owner {}",
                sponsor.signer(),
                data.gas_data.owner
            ));
        }
        for signature in signatures {
            signature
                .verify(tx_bytes)
                .map_err(|err| format!("Invalid signature for {}: {err}", signature.signer()))?;
        }
        if let GenericSignature::ZkLogin(ref composite) = *user {
            Self::check_composite(composite, data.sender, epoch)?;
        }
        Ok(())
    }

    fn consume_gas(state: &mut State, data: &TransactionData) -> Result<(), String> {
        let owned = state.coins.entry(data.gas_data.owner).or_default();
        let mut balance = 0u64;
        for payment in &data.gas_data.payment {
            let coin = owned
                .iter()
                .find(|coin| coin.id == payment.object_id)
                .ok_or_else(|| format!("Object {} not found", payment.object_id))?;
            if coin.object_ref() != *payment {
                return Err(format!(
                    "Object {} version {} is unavailable for consumption, current version: {}",
                    payment.object_id, payment.version, coin.version
                ));
            }
            balance = balance.saturating_add(coin.balance);
        }
        if balance < data.gas_data.budget {
            return Err(format!(
                "Balance of gas object {balance} is lower than the needed amount {}",
                data.gas_data.budget
            ));
        }
        for coin in owned.iter_mut() {
            if data
                .gas_data
                .payment
                .iter()
                .any(|payment| payment.object_id == coin.id)
            {
                coin.version = coin.version.saturating_add(1);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn current_epoch(&self) -> Result<Epoch, LedgerError> {
        Ok(self.state().epoch)
    }

    async fn reference_gas_price(&self) -> Result<u64, LedgerError> {
        Ok(self.state().gas_price)
    }

    async fn gas_coins(&self, owner: &Address) -> Result<Vec<CoinListing>, LedgerError> {
        Ok(self
            .state()
            .coins
            .get(owner)
            .map(|coins| coins.iter().map(Coin::listing).collect())
            .unwrap_or_default())
    }

    async fn execute_transaction(
        &self,
        tx_bytes: &[u8],
        signatures: &[GenericSignature],
    ) -> Result<ExecutionOutcome, LedgerError> {
        let data = TransactionData::from_bytes(tx_bytes)
            .map_err(|err| LedgerError::Rejected(format!("Invalid transaction bytes: {err}")))?;
        let digest = TransactionDigest::of(tx_bytes);

        let mut state = self.state();
        if state.executed.contains(&digest) {
            return Err(LedgerError::Rejected(format!(
                "Transaction {digest} already executed"
            )));
        }
        Self::check_signatures(tx_bytes, &data, signatures, state.epoch)
            .map_err(LedgerError::Rejected)?;
        Self::consume_gas(&mut state, &data).map_err(LedgerError::Rejected)?;
        state.executed.push(digest);
        tracing::debug!(%digest, "mock ledger executed transaction");

        Ok(ExecutionOutcome {
            digest,
            status: ExecutionStatus::Success,
        })
    }
}

/// A mock proving service. Clones share the call counter and failure
/// switch.
#[derive(Clone, Debug, Default)]
pub struct MockProver {
    calls: Arc<AtomicUsize>,
    failure: Arc<Mutex<Option<ProofError>>>,
}

impl MockProver {
    /// A prover that answers every well-formed request.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following request fail with `err` (or succeed again with
    /// `None`).
    pub fn fail_with(&self, err: Option<ProofError>) {
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = err;
    }

    /// Number of proof requests received.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn rejected(body: impl Into<String>) -> ProofError {
        ProofError::Rejected {
            status: 400,
            body: body.into(),
        }
    }
}

#[async_trait]
impl ProofProvider for MockProver {
    async fn prove(&self, request: &ProofRequest) -> Result<Value, ProofError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self
            .failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
        {
            return Err(err);
        }

        let token = IdentityToken::parse(&request.jwt)
            .map_err(|err| Self::rejected(format!("invalid jwt: {err}")))?;

        let extended: [u8; 33] = STANDARD
            .decode(&request.extended_ephemeral_public_key)
            .ok()
            .and_then(|bytes| bytes.try_into().ok())
            .ok_or_else(|| Self::rejected("invalid extended ephemeral public key"))?;
        let raw: [u8; 32] = extended
            .get(1..)
            .and_then(|raw| raw.try_into().ok())
            .ok_or_else(|| Self::rejected("invalid extended ephemeral public key"))?;
        let pk = PublicKey::try_from(raw)
            .map_err(|_err| Self::rejected("invalid ephemeral public key"))?;

        let randomness: u128 = request
            .jwt_randomness
            .parse()
            .map_err(|_err| Self::rejected("invalid jwt randomness"))?;
        let expected = nonce(&pk, request.max_epoch, &Randomness::from(randomness.to_le_bytes()));
        if token.claims().nonce.as_deref() != Some(expected.as_str()) {
            return Err(Self::rejected("nonce does not match the ephemeral key"));
        }

        let seed = address_seed(&token, request.salt);
        let issuer = &token.claims().issuer;
        Ok(serde_json::json!({
            "proofPoints": commitment(
                &request.extended_ephemeral_public_key,
                request.max_epoch,
                &seed,
                issuer,
            ),
            "issBase64Details": { "value": issuer, "indexMod4": 0 },
            "headerBase64": "mock",
        }))
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng as _, rngs::StdRng};
    use trailmint::keys::private::SponsorSigningKey;

    use super::*;

    #[tokio::test]
    async fn funded_coins_are_listed() {
        let ledger = MockLedger::new(Epoch::from(3));
        let owner = Address::from([1u8; 32]);
        let full = ledger.fund(owner, 100);
        let partial = ledger.fund_partial(owner, 100);
        assert_ne!(full, partial);

        let coins = ledger.gas_coins(&owner).await.unwrap();
        assert_eq!(coins.len(), 2);
        assert!(coins.iter().any(|coin| coin.object_ref().is_some()));
        assert!(coins.iter().any(|coin| coin.object_ref().is_none()));
        assert!(ledger.gas_coins(&Address::from([2u8; 32])).await.unwrap().is_empty());
        assert_eq!(ledger.current_epoch().await.unwrap(), Epoch::from(3));
    }

    #[tokio::test]
    async fn garbage_is_rejected_verbatim() {
        let ledger = MockLedger::default();
        let mut rng = StdRng::seed_from_u64(0);
        let key = SponsorSigningKey::random(&mut rng);
        let signature = GenericSignature::sign_sponsor(&key, b"junk", &mut rng);
        let err = ledger
            .execute_transaction(b"junk", &[signature])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Rejected(text) if text.starts_with("Invalid transaction bytes")
        ));
    }
}
