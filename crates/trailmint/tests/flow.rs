//! Sign-in and sponsored minting end to end, against the in-memory ledger
//! and prover.

extern crate alloc;

use alloc::sync::Arc;

use base64::{Engine as _, engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD}};
use mock_ledger::{MockLedger, MockProver};
use rand::{SeedableRng as _, rngs::StdRng};
use trailmint::{
    AuthError, Epoch, GenericSignature, LoginSession, MintFields, ObjectId, Salt,
    address::{address_seed, derive_address},
    composite::compose,
    config::{ProofPolicy, WalletConfig},
    keys::private::{EphemeralSigningKey, SponsorSigningKey},
    ledger::{ExecutionStatus, LedgerClient as _, LedgerError},
    proof::{ProofError, ProofRequest, encode_extended_public_key, request_proof},
    sponsor::{ExecuteRequest, Sponsor, SponsorError, SponsorPolicy, SponsorRequest},
    store::MemoryStore,
    token::{IdentityToken, TokenError},
    transaction::{BuildError, MintTarget, TransactionData, build_mint_transaction, signing_message},
    wallet::Wallet,
};

const NOW: u64 = 1_700_000_000;
const EXPIRES: u64 = NOW + 3_600;

type TestWallet = Wallet<MemoryStore, MockProver, MockLedger, Arc<Sponsor<MockLedger>>>;

struct World {
    ledger: MockLedger,
    prover: MockProver,
    sponsor: Arc<Sponsor<MockLedger>>,
    sponsor_key: SponsorSigningKey,
    rng: StdRng,
}

fn config(policy: ProofPolicy) -> WalletConfig {
    let mut config = WalletConfig::from_json(
        r#"{
            "oidc": {
                "clientId": "client-123",
                "redirectUri": "https://trail.example/auth",
                "authorizationEndpoint": "https://accounts.google.com/o/oauth2/v2/auth"
            },
            "proverUrl": "https://prover.example/v1",
            "sponsorUrl": "https://trail.example/api",
            "ledgerRpcUrl": "https://fullnode.testnet.example",
            "network": "testnet",
            "mintTarget": "0x9::shallwemove::mint"
        }"#,
    )
    .unwrap();
    config.proof_policy = policy;
    config
}

fn world(coins: usize) -> World {
    let mut rng = StdRng::seed_from_u64(7);
    let ledger = MockLedger::new(Epoch::from(5));
    let key = SponsorSigningKey::random(&mut rng);
    for _ in 0..coins {
        ledger.fund(key.address(), 1_000_000_000);
    }
    let mut policy = SponsorPolicy::new("testnet");
    policy.allowed_packages = vec!["0x9".parse::<ObjectId>().unwrap()];
    World {
        sponsor: Arc::new(Sponsor::new(key, ledger.clone(), policy)),
        sponsor_key: key,
        prover: MockProver::new(),
        ledger,
        rng,
    }
}

impl World {
    fn wallet(&self, policy: ProofPolicy) -> TestWallet {
        Wallet::new(
            config(policy),
            MemoryStore::new(),
            self.prover.clone(),
            self.ledger.clone(),
            Arc::clone(&self.sponsor),
        )
    }
}

fn id_token(nonce: &str, email: &str) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
    let claims = serde_json::json!({
        "iss": "https://accounts.google.com",
        "sub": "hiker-1",
        "aud": "client-123",
        "iat": NOW - 10,
        "exp": EXPIRES,
        "email": email,
        "nonce": nonce,
    });
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.c2lnbmF0dXJl")
}

fn nonce_of(url: &url::Url) -> String {
    url.query_pairs()
        .find(|pair| pair.0 == "nonce")
        .map(|(_, value)| value.into_owned())
        .unwrap()
}

async fn login(wallet: &TestWallet, rng: &mut StdRng) -> trailmint::Address {
    let url = wallet.begin_login(rng).await.unwrap();
    let token = id_token(&nonce_of(&url), "hiker@example.com");
    wallet.complete_login(&token, NOW).await.unwrap()
}

fn fields() -> MintFields {
    MintFields {
        location: "Seoraksan".to_owned(),
        description: "Ridge traverse".to_owned(),
        image_url: "https://aggregator.example/v1/blob/abc".to_owned(),
        participants: 4,
        max_elevation: 1_708,
        duration: 540,
        date: "2025-10-03".to_owned(),
        start_time: "04:30".to_owned(),
        end_time: "13:30".to_owned(),
    }
}

#[tokio::test]
async fn lazy_login_then_mint() {
    let mut world = world(1);
    let wallet = world.wallet(ProofPolicy::Lazy);

    let address = login(&wallet, &mut world.rng).await;
    assert!(wallet.is_authenticated(NOW));
    assert_eq!(wallet.address(NOW).unwrap(), address);
    assert_eq!(world.prover.calls(), 0, "lazy policy defers the proof");

    let executed = wallet.mint(&fields(), &mut world.rng, NOW).await.unwrap();
    assert_eq!(executed.status, ExecutionStatus::Success);
    assert_eq!(world.ledger.executed(), vec![executed.digest]);
    assert_eq!(world.prover.calls(), 1);

    // The proof is reused and the coin is free again at its new version.
    let again = wallet.mint(&fields(), &mut world.rng, NOW).await.unwrap();
    assert_ne!(again.digest, executed.digest);
    assert_eq!(world.prover.calls(), 1);
    assert_eq!(world.ledger.executed().len(), 2);
}

#[tokio::test]
async fn eager_login_fetches_proof() {
    let mut world = world(1);
    let wallet = world.wallet(ProofPolicy::Eager);
    login(&wallet, &mut world.rng).await;
    assert_eq!(world.prover.calls(), 1);

    wallet.mint(&fields(), &mut world.rng, NOW).await.unwrap();
    assert_eq!(world.prover.calls(), 1);
}

#[tokio::test]
async fn address_survives_relogin() {
    let mut world = world(0);
    let wallet = world.wallet(ProofPolicy::Lazy);
    let first = login(&wallet, &mut world.rng).await;
    wallet.logout().unwrap();
    assert!(!wallet.is_authenticated(NOW));

    let second = login(&wallet, &mut world.rng).await;
    assert_eq!(first, second, "address depends on identity and salt only");
}

#[tokio::test]
async fn token_for_another_session_is_refused() {
    let mut world = world(1);
    let wallet = world.wallet(ProofPolicy::Lazy);
    wallet.begin_login(&mut world.rng).await.unwrap();

    let err = wallet
        .complete_login(&id_token("not-our-nonce", "hiker@example.com"), NOW)
        .await
        .unwrap_err();
    assert_eq!(err, AuthError::InvalidToken(TokenError::NonceMismatch));
    assert!(wallet.store().is_empty());
}

#[tokio::test]
async fn expired_token_fails_closed() {
    let mut world = world(1);
    let wallet = world.wallet(ProofPolicy::Lazy);
    let url = wallet.begin_login(&mut world.rng).await.unwrap();
    let token = id_token(&nonce_of(&url), "hiker@example.com");

    let err = wallet.complete_login(&token, EXPIRES).await.unwrap_err();
    assert_eq!(
        err,
        AuthError::InvalidToken(TokenError::Expired {
            exp: EXPIRES,
            now: EXPIRES,
        })
    );
    assert!(!wallet.is_authenticated(NOW));
    assert_eq!(
        wallet.mint(&fields(), &mut world.rng, NOW).await,
        Err(AuthError::NotAuthenticated)
    );
}

#[tokio::test]
async fn proof_failure_resets_session() {
    let mut world = world(1);
    let wallet = world.wallet(ProofPolicy::Lazy);
    login(&wallet, &mut world.rng).await;

    world.prover.fail_with(Some(ProofError::Rejected {
        status: 503,
        body: "prover overloaded".to_owned(),
    }));
    let err = wallet.mint(&fields(), &mut world.rng, NOW).await.unwrap_err();
    assert!(matches!(err, AuthError::ProofService(ProofError::Rejected { status: 503, .. })));
    assert!(!wallet.is_authenticated(NOW));
    assert!(world.ledger.executed().is_empty());
}

#[tokio::test]
async fn lapsed_session_must_log_in_again() {
    let mut world = world(1);
    let wallet = world.wallet(ProofPolicy::Eager);
    login(&wallet, &mut world.rng).await;

    // Logged in at epoch 5 with the default lookahead of 10.
    world.ledger.set_epoch(Epoch::from(16));
    let err = wallet.mint(&fields(), &mut world.rng, NOW).await.unwrap_err();
    assert_eq!(
        err,
        AuthError::SessionExpired {
            max_epoch: Epoch::from(15),
            current_epoch: Epoch::from(16),
        }
    );
    assert!(!wallet.is_authenticated(NOW));
    assert!(world.ledger.executed().is_empty());
}

#[tokio::test]
async fn last_valid_epoch_still_mints() {
    let mut world = world(1);
    let wallet = world.wallet(ProofPolicy::Lazy);
    login(&wallet, &mut world.rng).await;

    world.ledger.set_epoch(Epoch::from(15));
    wallet.mint(&fields(), &mut world.rng, NOW).await.unwrap();
}

#[tokio::test]
async fn out_of_gas_is_sponsor_unavailable() {
    let mut world = world(0);
    let wallet = world.wallet(ProofPolicy::Lazy);
    login(&wallet, &mut world.rng).await;

    let err = wallet.mint(&fields(), &mut world.rng, NOW).await.unwrap_err();
    assert!(matches!(err, AuthError::SponsorUnavailable(_)), "{err}");
    assert!(wallet.is_authenticated(NOW), "sponsor failures keep the login");
}

#[tokio::test]
async fn oversized_argument_is_not_submitted() {
    let mut world = world(1);
    let wallet = world.wallet(ProofPolicy::Lazy);
    login(&wallet, &mut world.rng).await;

    let fields = MintFields {
        participants: 300_000,
        ..fields()
    };
    let err = wallet.mint(&fields, &mut world.rng, NOW).await.unwrap_err();
    assert_eq!(
        err,
        AuthError::Build(BuildError::ArgumentOutOfRange {
            field: "participants",
            value: 300_000,
            max: 65_535,
        })
    );
    assert_eq!(world.prover.calls(), 0);
}

fn plain_request(sender: trailmint::Address) -> SponsorRequest {
    let target: MintTarget = "0x9::shallwemove::mint".parse().unwrap();
    SponsorRequest {
        transaction_kind_bytes: Some(STANDARD.encode(
            build_mint_transaction(&target, &fields()).unwrap(),
        )),
        sender: Some(sender.to_string()),
        allowed_addresses: Vec::new(),
        network: "testnet".to_owned(),
    }
}

#[tokio::test]
async fn concurrent_requests_never_share_a_coin() {
    let mut world = world(1);
    let alice = SponsorSigningKey::random(&mut world.rng).address();
    let bob = SponsorSigningKey::random(&mut world.rng).address();

    let alice_request = plain_request(alice);
    let bob_request = plain_request(bob);
    let (first, second) = tokio::join!(
        world.sponsor.sponsor(&alice_request),
        world.sponsor.sponsor(&bob_request),
    );
    let outcomes = [first, second];
    assert_eq!(outcomes.iter().filter(|outcome| outcome.is_ok()).count(), 1);
    assert!(outcomes.contains(&Err(SponsorError::GasCoinsBusy)));
}

#[tokio::test]
async fn two_coins_serve_two_requests() {
    let mut world = world(2);
    let alice = SponsorSigningKey::random(&mut world.rng).address();
    let bob = SponsorSigningKey::random(&mut world.rng).address();

    let first = world.sponsor.sponsor(&plain_request(alice)).await.unwrap();
    let second = world.sponsor.sponsor(&plain_request(bob)).await.unwrap();
    assert_ne!(first.bytes, second.bytes);
}

/// A session with a proof, outside any wallet.
async fn proven_session(
    world: &mut World,
    email: &str,
) -> (LoginSession, IdentityToken, Salt) {
    let mut session = LoginSession::begin(Epoch::from(5), 10, &mut world.rng).unwrap();
    let token = IdentityToken::parse(&id_token(&session.nonce(), email)).unwrap();
    let salt = Salt::derive(email);
    let request = ProofRequest::new(
        &token,
        &session.public_key(),
        session.randomness(),
        session.max_epoch(),
        salt,
    );
    let proof = request_proof(&world.prover, &request).await.unwrap();
    session.attach_proof(proof).unwrap();
    (session, token, salt)
}

#[tokio::test]
async fn proof_for_another_key_is_rejected_by_ledger() {
    let mut world = world(1);
    let (session, token, salt) = proven_session(&mut world, "hiker@example.com").await;
    let sender = derive_address(&token, salt);

    let sponsored = world.sponsor.sponsor(&plain_request(sender)).await.unwrap();
    let tx_bytes = STANDARD.decode(&sponsored.bytes).unwrap();
    let mut forged = compose(&tx_bytes, &session, &token, salt, Epoch::from(5), &mut world.rng)
        .unwrap();

    // Re-sign with another key and relabel the proof's binding to match.
    let other = EphemeralSigningKey::random(&mut world.rng);
    forged.ephemeral_public_key = other.public();
    forged.user_signature = other.sign(&mut world.rng, &signing_message(&tx_bytes));
    forged.proof.binding.extended_ephemeral_public_key =
        encode_extended_public_key(&other.public());
    forged.verify(&tx_bytes).unwrap();

    let err = world
        .sponsor
        .execute(&ExecuteRequest {
            digest: Some(sponsored.digest.to_string()),
            signature: Some(GenericSignature::from(forged).to_base64().unwrap()),
        })
        .await
        .unwrap_err();
    assert_eq!(
        err,
        SponsorError::LedgerRejected(
            "Invalid user signature: Groth16 proof verify failed".to_owned()
        )
    );
    assert!(world.ledger.executed().is_empty());
}

#[tokio::test]
async fn ledger_expiry_text_is_verbatim() {
    let mut world = world(1);
    let (session, token, salt) = proven_session(&mut world, "hiker@example.com").await;
    let sender = derive_address(&token, salt);

    let sponsored = world.sponsor.sponsor(&plain_request(sender)).await.unwrap();
    let tx_bytes = STANDARD.decode(&sponsored.bytes).unwrap();
    let composite =
        compose(&tx_bytes, &session, &token, salt, Epoch::from(15), &mut world.rng).unwrap();
    assert_eq!(composite.address_seed, address_seed(&token, salt));

    // The epoch moves on between signing and submission.
    world.ledger.set_epoch(Epoch::from(16));
    let err = world
        .sponsor
        .execute(&ExecuteRequest {
            digest: Some(sponsored.digest.to_string()),
            signature: Some(GenericSignature::from(composite).to_base64().unwrap()),
        })
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Invalid user signature: ZKLogin expired at epoch 15, current epoch 16"
    );
    assert_eq!(
        AuthError::from(err),
        AuthError::LedgerRejected(
            "Invalid user signature: ZKLogin expired at epoch 15, current epoch 16".to_owned()
        )
    );
}

#[tokio::test]
async fn spent_coin_version_is_refused() {
    let mut world = world(1);
    let user = SponsorSigningKey::random(&mut world.rng);

    let sponsored = world.sponsor.sponsor(&plain_request(user.address())).await.unwrap();
    let tx_bytes = STANDARD.decode(&sponsored.bytes).unwrap();
    let spent = TransactionData::from_bytes(&tx_bytes).unwrap().gas_data.payment[0];
    let signature = GenericSignature::sign_sponsor(&user, &tx_bytes, &mut world.rng);
    world
        .sponsor
        .execute(&ExecuteRequest {
            digest: Some(sponsored.digest.to_string()),
            signature: Some(signature.to_base64().unwrap()),
        })
        .await
        .unwrap();
    assert_eq!(world.ledger.coin_version(&spent.object_id), Some(2));

    // Same coin at its old version, signed by both parties.
    let mut replay = TransactionData::from_bytes(&tx_bytes).unwrap();
    replay.gas_data.budget -= 1;
    let replay_bytes = replay.to_bytes().unwrap();
    let signatures = [
        GenericSignature::sign_sponsor(&user, &replay_bytes, &mut world.rng),
        GenericSignature::sign_sponsor(&world.sponsor_key, &replay_bytes, &mut world.rng),
    ];
    let err = world
        .ledger
        .execute_transaction(&replay_bytes, &signatures)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        LedgerError::Rejected(format!(
            "Object {} version 1 is unavailable for consumption, current version: 2",
            spent.object_id
        ))
    );

    // The sponsor itself only ever hands out the live version.
    let next = world.sponsor.sponsor(&plain_request(user.address())).await.unwrap();
    let fresh = TransactionData::from_bytes(&STANDARD.decode(&next.bytes).unwrap()).unwrap();
    assert_eq!(fresh.gas_data.payment[0].version, 2);
}
