//! Drive the sponsorship routes in-process against the mock ledger.

extern crate alloc;

use alloc::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use mock_ledger::MockLedger;
use rand::{SeedableRng as _, rngs::StdRng};
use serde_json::{Value, json};
use sponsor_server::router;
use tower::ServiceExt as _;
use trailmint::{
    Epoch, GenericSignature, MintFields, ObjectId,
    keys::private::SponsorSigningKey,
    sponsor::{Sponsor, SponsorPolicy},
    transaction::{MintTarget, build_mint_transaction},
};

struct Harness {
    app: Router,
    ledger: MockLedger,
    rng: StdRng,
}

fn harness(coins: usize) -> Harness {
    let mut rng = StdRng::seed_from_u64(11);
    let ledger = MockLedger::new(Epoch::from(5));
    let key = SponsorSigningKey::random(&mut rng);
    for _ in 0..coins {
        ledger.fund(key.address(), 1_000_000_000);
    }
    let sponsor = Sponsor::new(key, ledger.clone(), SponsorPolicy::new("testnet"));
    Harness {
        app: router(Arc::new(sponsor)),
        ledger,
        rng,
    }
}

fn kind_bytes() -> String {
    let fields = MintFields {
        location: "Jirisan".to_owned(),
        participants: 2,
        max_elevation: 1_915,
        duration: 600,
        ..MintFields::default()
    };
    let target = MintTarget::in_package(ObjectId::from([9u8; 32]));
    STANDARD.encode(build_mint_transaction(&target, &fields).unwrap())
}

async fn post(app: &Router, path: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::post(path)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn sponsor_then_execute() {
    let mut harness = harness(1);
    let user = SponsorSigningKey::random(&mut harness.rng);

    let (sponsor_status, sponsored) = post(
        &harness.app,
        "/sponsor",
        json!({
            "transactionKindBytes": kind_bytes(),
            "sender": user.address().to_string(),
            "allowedAddresses": [user.address().to_string()],
            "network": "testnet",
        }),
    )
    .await;
    assert_eq!(sponsor_status, StatusCode::OK, "{sponsored}");

    let bytes = STANDARD
        .decode(sponsored["bytes"].as_str().unwrap())
        .unwrap();
    let signature = GenericSignature::sign_sponsor(&user, &bytes, &mut harness.rng);
    let (execute_status, executed) = post(
        &harness.app,
        "/execute",
        json!({
            "digest": sponsored["digest"],
            "signature": signature.to_base64().unwrap(),
        }),
    )
    .await;
    assert_eq!(execute_status, StatusCode::OK, "{executed}");
    assert_eq!(executed["digest"], sponsored["digest"]);
    assert_eq!(executed["status"], "success");
    assert_eq!(harness.ledger.executed().len(), 1);

    // The reservation is gone once executed.
    let (replay_status, body) = post(
        &harness.app,
        "/execute",
        json!({
            "digest": sponsored["digest"],
            "signature": signature.to_base64().unwrap(),
        }),
    )
    .await;
    assert_eq!(replay_status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "unknown_digest");
}

#[tokio::test]
async fn missing_sender_is_bad_request() {
    let harness = harness(1);
    let (status, body) = post(
        &harness.app,
        "/sponsor",
        json!({ "transactionKindBytes": kind_bytes(), "network": "testnet" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "missing_field");
    assert!(body["error"].as_str().unwrap().contains("sender"));
}

#[tokio::test]
async fn malformed_body_is_json_error() {
    let harness = harness(1);
    let (status, body) = post(&harness.app, "/execute", json!(["not", "an", "object"])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_field");
}

#[tokio::test]
async fn out_of_gas_is_unavailable() {
    let mut harness = harness(0);
    let user = SponsorSigningKey::random(&mut harness.rng);
    let (status, body) = post(
        &harness.app,
        "/sponsor",
        json!({
            "transactionKindBytes": kind_bytes(),
            "sender": user.address().to_string(),
            "network": "testnet",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "sponsor_unavailable");
}

#[tokio::test]
async fn second_request_is_busy_while_only_coin_is_reserved() {
    let mut harness = harness(1);
    let user = SponsorSigningKey::random(&mut harness.rng);
    let request = json!({
        "transactionKindBytes": kind_bytes(),
        "sender": user.address().to_string(),
        "network": "testnet",
    });

    let (first, _) = post(&harness.app, "/sponsor", request.clone()).await;
    let (second, body) = post(&harness.app, "/sponsor", request).await;
    assert_eq!(first, StatusCode::OK);
    assert_eq!(second, StatusCode::CONFLICT);
    assert_eq!(body["code"], "gas_coins_busy");
}
