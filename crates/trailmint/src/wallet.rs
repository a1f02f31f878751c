//! Client-side sign-in and mint flow.
//!
//! [`Wallet`] owns no global state: the session store, proving service,
//! ledger and sponsor are all injected, so the same flow runs against a
//! browser session store and live services or against in-memory doubles.
//!
//! ```text
//! begin_login ──> store: LoginSession ──> provider URL
//! complete_login(id_token) ──> nonce check ──> store: token ──> Address
//! mint(fields)
//!   ├─ identity (token, salt) ── expired? reset, InvalidToken
//!   ├─ ensure_proof ─────────── failed?  reset, ProofService
//!   ├─ epoch check ──────────── lapsed?  reset, SessionExpired
//!   ├─ sponsor(kind, sender) ── bytes must hash to digest, embed our kind
//!   ├─ compose(bytes)
//!   └─ execute(digest, signature)
//! ```

use base64::{Engine as _, engine::general_purpose::STANDARD};
use rand::{CryptoRng, RngCore};
use url::Url;

use crate::{
    address::{Address, derive_address},
    composite::{GenericSignature, compose},
    config::{ProofPolicy, WalletConfig},
    error::AuthError,
    ledger::{LedgerClient, RpcLedger},
    oidc::authorization_url,
    proof::{HttpProver, ProofProvider, ProofRequest, ZkProof, request_proof},
    salt::Salt,
    session::LoginSession,
    sponsor::{ExecuteRequest, ExecuteResponse, HttpSponsorClient, SponsorGateway, SponsorRequest},
    store::{SESSION_KEY, SessionStore, TOKEN_KEY, load, save},
    token::{IdentityToken, TokenError},
    transaction::{
        MintFields, TransactionData, TransactionDigest, TransactionKind, build_mint_kind,
    },
};

/// The client-side orchestrator.
#[derive(Debug)]
pub struct Wallet<S, P, L, G> {
    config: WalletConfig,
    store: S,
    prover: P,
    ledger: L,
    sponsor: G,
}

impl<S: SessionStore> Wallet<S, HttpProver, RpcLedger, HttpSponsorClient> {
    /// A wallet talking to the configured services over HTTPS.
    pub fn over_http(config: WalletConfig, store: S) -> Result<Self, AuthError> {
        let timeout = config.http_timeout();
        let prover = HttpProver::new(config.prover_url.clone(), timeout)?;
        let ledger = RpcLedger::new(config.ledger_rpc_url.clone(), timeout)?;
        let sponsor = HttpSponsorClient::new(config.sponsor_url.clone(), timeout)?;
        Ok(Self::new(config, store, prover, ledger, sponsor))
    }
}

impl<S, P, L, G> Wallet<S, P, L, G>
where
    S: SessionStore,
    P: ProofProvider,
    L: LedgerClient,
    G: SponsorGateway,
{
    /// Assemble a wallet from its collaborators.
    pub const fn new(config: WalletConfig, store: S, prover: P, ledger: L, sponsor: G) -> Self {
        Self {
            config,
            store,
            prover,
            ledger,
            sponsor,
        }
    }

    /// The session store.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Start a login: discard any previous session, create a new one and
    /// return the provider URL carrying its nonce.
    pub async fn begin_login(
        &self,
        rng: &mut (impl RngCore + CryptoRng + Send),
    ) -> Result<Url, AuthError> {
        self.store.clear()?;
        let epoch = self.ledger.current_epoch().await?;
        let session = LoginSession::begin(epoch, self.config.epoch_lookahead, rng)?;
        save(&self.store, SESSION_KEY, &session)?;
        Ok(authorization_url(&self.config.oidc, &session.nonce()))
    }

    /// Finish a login with the token from the provider redirect.
    pub async fn complete_login(&self, id_token: &str, now: u64) -> Result<Address, AuthError> {
        let token = match IdentityToken::validate(id_token, now) {
            Ok(token) => token,
            Err(err) => return Err(self.reset_with(err.into(), "identity token rejected")),
        };
        let session: LoginSession =
            load(&self.store, SESSION_KEY)?.ok_or(AuthError::NotAuthenticated)?;
        if let Err(err) = token.check_nonce(&session.nonce()) {
            return Err(self.reset_with(err.into(), "identity token is for another session"));
        }
        save(&self.store, TOKEN_KEY, &token)?;

        let salt = salt_for(&token)?;
        let address = derive_address(&token, salt);
        tracing::info!(%address, "login completed");

        if self.config.proof_policy == ProofPolicy::Eager {
            self.ensure_proof().await?;
        }
        Ok(address)
    }

    /// Whether a live, unexpired identity and session are stored.
    pub fn is_authenticated(&self, now: u64) -> bool {
        let has_session = matches!(self.store.get(SESSION_KEY), Ok(Some(_)));
        has_session && self.identity(now).is_ok()
    }

    /// The account address of the logged-in user.
    pub fn address(&self, now: u64) -> Result<Address, AuthError> {
        let (token, salt) = self.identity(now)?;
        Ok(derive_address(&token, salt))
    }

    /// The session's proof, requesting it if not yet acquired.
    ///
    /// Any failure discards the session.
    pub async fn ensure_proof(&self) -> Result<ZkProof, AuthError> {
        let mut session: LoginSession =
            load(&self.store, SESSION_KEY)?.ok_or(AuthError::NotAuthenticated)?;
        if let Some(proof) = session.proof() {
            return Ok(proof.clone());
        }
        let token: IdentityToken =
            load(&self.store, TOKEN_KEY)?.ok_or(AuthError::NotAuthenticated)?;
        if let Err(err) = token.check_nonce(&session.nonce()) {
            return Err(self.reset_with(err.into(), "identity token is for another session"));
        }
        let salt = salt_for(&token)?;

        let request = ProofRequest::new(
            &token,
            &session.public_key(),
            session.randomness(),
            session.max_epoch(),
            salt,
        );
        let proof = match request_proof(&self.prover, &request).await {
            Ok(proof) => proof,
            Err(err) => return Err(self.reset_with(err.into(), "proof request failed")),
        };
        if let Err(err) = session.attach_proof(proof.clone()) {
            return Err(self.reset_with(err.into(), "proof does not match session"));
        }
        save(&self.store, SESSION_KEY, &session)?;
        tracing::debug!(max_epoch = %session.max_epoch(), "zk proof acquired");
        Ok(proof)
    }

    /// Mint a hiking record as a sponsored transaction.
    pub async fn mint(
        &self,
        fields: &MintFields,
        rng: &mut (impl RngCore + CryptoRng + Send),
        now: u64,
    ) -> Result<ExecuteResponse, AuthError> {
        let (token, salt) = self.identity(now)?;
        let sender = derive_address(&token, salt);
        let kind = build_mint_kind(&self.config.mint_target, fields)?;
        let kind_bytes = kind.to_bytes()?;

        self.ensure_proof().await?;
        let session: LoginSession =
            load(&self.store, SESSION_KEY)?.ok_or(AuthError::NotAuthenticated)?;

        // Checked before sponsoring so a lapsed session never holds a coin.
        let epoch = self.ledger.current_epoch().await?;
        if session.is_expired_at(epoch) {
            return Err(self.reset_with(
                AuthError::SessionExpired {
                    max_epoch: session.max_epoch(),
                    current_epoch: epoch,
                },
                "login session expired",
            ));
        }

        let sponsored = self
            .sponsor
            .sponsor(&SponsorRequest {
                transaction_kind_bytes: Some(STANDARD.encode(&kind_bytes)),
                sender: Some(sender.to_string()),
                allowed_addresses: vec![sender.to_string()],
                network: self.config.network.clone(),
            })
            .await
            .inspect_err(|err| tracing::warn!(error = %err, "sponsorship failed"))?;

        let tx_bytes = STANDARD
            .decode(&sponsored.bytes)
            .map_err(|err| AuthError::Integrity(err.to_string()))?;
        check_sponsored(&tx_bytes, sponsored.digest, &kind, sender)?;

        let composite = match compose(&tx_bytes, &session, &token, salt, epoch, rng) {
            Ok(composite) => composite,
            Err(err) => return Err(self.reset_with(err.into(), "signature composition failed")),
        };
        let signature = GenericSignature::from(composite)
            .to_base64()
            .map_err(AuthError::from)?;

        let executed = self
            .sponsor
            .execute(&ExecuteRequest {
                digest: Some(sponsored.digest.to_string()),
                signature: Some(signature),
            })
            .await
            .inspect_err(|err| tracing::warn!(error = %err, "sponsored execution failed"))?;
        tracing::info!(digest = %executed.digest, status = ?executed.status, "mint submitted");
        Ok(executed)
    }

    /// Forget everything.
    pub fn logout(&self) -> Result<(), AuthError> {
        self.store.clear()?;
        tracing::info!("logged out");
        Ok(())
    }

    /// The stored token (unexpired at `now`) and its salt.
    fn identity(&self, now: u64) -> Result<(IdentityToken, Salt), AuthError> {
        let token: IdentityToken = match load(&self.store, TOKEN_KEY) {
            Ok(Some(token)) => token,
            Ok(None) => return Err(AuthError::NotAuthenticated),
            Err(err) => return Err(self.reset_with(err.into(), "stored token unreadable")),
        };
        if let Err(err) = token.check_expiry(now) {
            return Err(self.reset_with(err.into(), "stored token expired"));
        }
        let salt = salt_for(&token)?;
        Ok((token, salt))
    }

    /// Clear all session state and hand back `err`.
    fn reset_with(&self, err: AuthError, reason: &'static str) -> AuthError {
        tracing::warn!(error = %err, reason, "resetting to unauthenticated");
        if let Err(store_err) = self.store.clear() {
            tracing::error!(error = %store_err, "failed to clear session store");
        }
        err
    }
}

/// The salt for a token, from its email claim.
fn salt_for(token: &IdentityToken) -> Result<Salt, AuthError> {
    token
        .claims()
        .email
        .as_deref()
        .map(Salt::derive)
        .ok_or(AuthError::InvalidToken(TokenError::MissingClaim("email")))
}

/// The sponsor must hand back exactly our kind and sender, and a digest of
/// exactly those bytes.
fn check_sponsored(
    tx_bytes: &[u8],
    digest: TransactionDigest,
    kind: &TransactionKind,
    sender: Address,
) -> Result<(), AuthError> {
    if TransactionDigest::of(tx_bytes) != digest {
        return Err(AuthError::Integrity(format!(
            "digest {digest} does not match the returned bytes"
        )));
    }
    let data =
        TransactionData::from_bytes(tx_bytes).map_err(|err| AuthError::Integrity(err.to_string()))?;
    if data.kind != *kind {
        return Err(AuthError::Integrity("transaction kind was altered".to_owned()));
    }
    if data.sender != sender {
        return Err(AuthError::Integrity(format!(
            "sender is {}, expected {sender}",
            data.sender
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        primitives::{ObjectDigest, ObjectId, ObjectRef},
        transaction::{GasData, tests::{fields, target}},
    };

    fn sponsored(kind: TransactionKind, sender: Address) -> Vec<u8> {
        TransactionData::new_sponsored(
            kind,
            sender,
            GasData {
                payment: vec![ObjectRef {
                    object_id: ObjectId::from([1u8; 32]),
                    version: 1,
                    digest: ObjectDigest::from([2u8; 32]),
                }],
                owner: Address::from([3u8; 32]),
                price: 1,
                budget: 1,
            },
        )
        .to_bytes()
        .unwrap()
    }

    #[test]
    fn sponsored_bytes_checked() {
        let kind = build_mint_kind(&target(), &fields()).unwrap();
        let sender = Address::from([4u8; 32]);
        let bytes = sponsored(kind.clone(), sender);
        let digest = TransactionDigest::of(&bytes);

        check_sponsored(&bytes, digest, &kind, sender).unwrap();

        assert!(matches!(
            check_sponsored(&bytes, TransactionDigest::of(b"other"), &kind, sender),
            Err(AuthError::Integrity(_))
        ));
        assert!(matches!(
            check_sponsored(&bytes, digest, &kind, Address::from([5u8; 32])),
            Err(AuthError::Integrity(_))
        ));

        let mut other_fields = fields();
        other_fields.participants = 99;
        let other_kind = build_mint_kind(&target(), &other_fields).unwrap();
        assert!(matches!(
            check_sponsored(&bytes, digest, &other_kind, sender),
            Err(AuthError::Integrity(_))
        ));
    }
}
