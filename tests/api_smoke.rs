#![cfg(feature = "store-sqlite")]

mod common;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use chrono::Utc;
use common::{identity, private_tx, FakeChain, FakeGateway, ACCOUNT};
use psc_reader::api::{router, AppState};
use psc_reader::prelude::*;
use psc_reader::EuclideanMatcher;
use psc_reader::BiometricMatcher;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt; // for `oneshot`

struct Harness {
    chain: Arc<FakeChain>,
    store: Arc<SqliteStore>,
    app: Router,
}

fn harness() -> anyhow::Result<Harness> {
    let chain = Arc::new(FakeChain::new());
    let store = Arc::new(SqliteStore::new_in_memory(Duration::from_secs(48 * 3600))?);
    let gateway = Arc::new(FakeGateway::new());
    let state = Arc::new(AppState {
        store: store.clone(),
        chain: chain.clone(),
        matcher: BiometricMatcher::new(store.clone(), Arc::new(EuclideanMatcher::default())),
        deletion: DeletionCoordinator::new(store.clone(), gateway),
    });
    Ok(Harness {
        chain,
        store,
        app: router(state),
    })
}

async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> anyhow::Result<Value> {
    let mut req = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(v) => {
            req = req.header(header::CONTENT_TYPE, "application/json");
            Body::from(v.to_string())
        }
        None => Body::empty(),
    };
    let resp = app.clone().oneshot(req.body(body)?).await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = to_bytes(resp.into_body(), usize::MAX).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Block 10 holds one private tx to 0xABC, whose contract holds "Alice" and a 128-d zero vector.
async fn ingest_alice(h: &Harness) -> anyhow::Result<()> {
    h.chain.set_height(Some(10));
    h.chain
        .add_block(10, vec![private_tx("0xT1", Some("0xABC"), "0x01")]);
    h.chain
        .add_two_call_contract("0xABC", "Alice", &[vec![0.0; 128]]);

    let mut scanner = BlockScanner::new(
        h.chain.clone(),
        h.store.clone(),
        ContractSchema::TwoCall.strategy(ACCOUNT),
        10,
        Duration::from_millis(10),
    );
    scanner.run_cycle().await?;
    assert_eq!(scanner.cursor(), 11);
    Ok(())
}

#[tokio::test]
async fn end_to_end_ingest_match_and_delete() -> anyhow::Result<()> {
    let h = harness()?;
    ingest_alice(&h).await?;

    let v = call(&h.app, Method::GET, "/identities/count", None).await?;
    assert_eq!(v, json!({ "count": 1 }));
    let v = call(&h.app, Method::GET, "/transactions/count", None).await?;
    assert_eq!(v, json!({ "count": 1 }));

    let v = call(&h.app, Method::GET, "/identities", None).await?;
    let ids = v["identities"].as_array().unwrap();
    assert_eq!(ids.len(), 1);
    assert_eq!(ids[0]["id"], "0xABC");
    assert_eq!(ids[0]["name"], "Alice");
    assert_eq!(ids[0]["biometrics"][0].as_array().unwrap().len(), 128);

    let mut query = vec![0.0; 128];
    query[0] = 0.4;
    let v = call(
        &h.app,
        Method::POST,
        "/identities/biometrics",
        Some(json!({ "biometrics": query })),
    )
    .await?;
    assert_eq!(v["identity"]["label"], "0xABC");
    let d = v["identity"]["distance"].as_f64().unwrap();
    assert!((d - 0.4).abs() < 1e-9);

    let v = call(&h.app, Method::GET, "/transactions?contractAddress=0xABC", None).await?;
    assert_eq!(v["transactions"].as_array().unwrap().len(), 1);
    assert_eq!(v["transactions"][0]["id"], "0xT1");
    assert_eq!(v["transactionsValid"], true);

    let v = call(&h.app, Method::DELETE, "/transactions/0xABC", None).await?;
    assert_eq!(v["deletedTransactions"], json!(["0xT1"]));

    let v = call(&h.app, Method::GET, "/identities/count", None).await?;
    assert_eq!(v, json!({ "count": 0 }));
    let v = call(&h.app, Method::GET, "/transactions/count", None).await?;
    assert_eq!(v, json!({ "count": 0 }));
    Ok(())
}

#[tokio::test]
async fn far_query_is_unknown_with_distance() -> anyhow::Result<()> {
    let h = harness()?;
    ingest_alice(&h).await?;

    let v = call(
        &h.app,
        Method::POST,
        "/identities/biometrics",
        Some(json!({ "biometrics": vec![1.0; 128] })),
    )
    .await?;
    assert_eq!(v["identity"]["label"], "unknown");
    assert!(v["identity"]["distance"].as_f64().unwrap() > 0.6);
    Ok(())
}

#[tokio::test]
async fn match_errors_come_back_as_err_payloads() -> anyhow::Result<()> {
    let h = harness()?;

    // nothing stored yet
    let v = call(
        &h.app,
        Method::POST,
        "/identities/biometrics",
        Some(json!({ "biometrics": [0.1, 0.2] })),
    )
    .await?;
    assert!(v["err"].is_string());

    // malformed body
    let v = call(
        &h.app,
        Method::POST,
        "/identities/biometrics",
        Some(json!({ "vectors": [] })),
    )
    .await?;
    assert!(v["err"].is_string());
    Ok(())
}

#[tokio::test]
async fn rewritten_transaction_is_reported_invalid() -> anyhow::Result<()> {
    let h = harness()?;
    ingest_alice(&h).await?;

    h.chain.put_tx(private_tx("0xT1", Some("0xABC"), "0xff"));
    let v = call(&h.app, Method::GET, "/transactions", None).await?;
    assert_eq!(v["transactions"].as_array().unwrap().len(), 1);
    assert_eq!(v["transactionsValid"], false);

    let v = call(&h.app, Method::GET, "/transactions?contractAddress=0xOTHER", None).await?;
    assert_eq!(v["transactions"], json!([]));
    assert_eq!(v["transactionsValid"], true);
    Ok(())
}

#[tokio::test]
async fn cors_reflects_origin_with_credentials() -> anyhow::Result<()> {
    let h = harness()?;
    let req = Request::builder()
        .uri("/identities/count")
        .header(header::ORIGIN, "http://app.example")
        .body(Body::empty())?;
    let resp = h.app.clone().oneshot(req).await?;

    let headers = resp.headers();
    assert_eq!(
        headers[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "http://app.example"
    );
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");

    let preflight = Request::builder()
        .method(Method::OPTIONS)
        .uri("/identities/biometrics")
        .header(header::ORIGIN, "http://app.example")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(Body::empty())?;
    let resp = h.app.clone().oneshot(preflight).await?;
    assert_eq!(resp.headers()[header::ACCESS_CONTROL_MAX_AGE], "600");
    Ok(())
}

#[tokio::test]
async fn bad_query_string_comes_back_as_err_payload() -> anyhow::Result<()> {
    let h = harness()?;
    ingest_alice(&h).await?;

    let v = call(
        &h.app,
        Method::GET,
        "/transactions?contractAddress=a&contractAddress=b",
        None,
    )
    .await?;
    assert!(v["err"].is_string());
    assert!(v.get("transactions").is_none());
    Ok(())
}

#[tokio::test]
async fn identity_with_other_descriptor_length_does_not_break_matching() -> anyhow::Result<()> {
    let h = harness()?;
    ingest_alice(&h).await?;
    h.store
        .upsert_identity(&identity("0xSHORT", "Short", vec![vec![0.0; 3]], Utc::now()))
        .await?;

    let v = call(
        &h.app,
        Method::POST,
        "/identities/biometrics",
        Some(json!({ "biometrics": vec![0.0; 128] })),
    )
    .await?;
    assert_eq!(v["identity"]["label"], "0xABC");
    assert_eq!(v["identity"]["distance"], 0.0);

    // no stored identity has this length
    let v = call(
        &h.app,
        Method::POST,
        "/identities/biometrics",
        Some(json!({ "biometrics": vec![0.0; 7] })),
    )
    .await?;
    assert!(v["err"].is_string());
    Ok(())
}
