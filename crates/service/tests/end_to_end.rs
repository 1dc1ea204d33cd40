//! End-to-end tests for the HTTP API.
//!
//! Builds the shared state with a manual clock and a journal in a temp
//! directory, then drives the axum router in-process (no network).

use std::sync::Arc;

use alloy_primitives::{Address, B256};
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tower::ServiceExt;

use rg_core::clock::ManualClock;
use rg_core::config::{
    AppConfig, GateConfig, GateMode, LoggingConfig, RegistryConfig, ServerConfig, SessionConfig,
};
use rg_core::journal::EventJournal;
use rg_gate::RiskReason;
use rg_service::engine::SharedState;
use rg_service::events::ServiceEvent;
use rg_service::server::{
    router, ErrorBody, GateResponse, SessionIdResponse, TokenResponse, ValidResponse,
    CALLER_HEADER,
};
use rg_session::{Session, SessionAction, SessionStatus};

const OWNER: Address = Address::new([0x11; 20]);
const UPDATER: Address = Address::new([0x22; 20]);
const ALICE: Address = Address::new([0xa1; 20]);
const BOB: Address = Address::new([0xb0; 20]);
const TOKEN_X: Address = Address::new([0x0a; 20]);
const TOKEN_Y: Address = Address::new([0x0b; 20]);

struct Harness {
    app: Router,
    state: Arc<SharedState>,
    clock: Arc<ManualClock>,
    dir: tempfile::TempDir,
}

fn config(mode: GateMode, journal_path: std::path::PathBuf) -> AppConfig {
    AppConfig {
        registry: RegistryConfig {
            owner: OWNER,
            authorized: vec![UPDATER],
        },
        session: SessionConfig {
            timeout_secs: 600,
            max_actions: 3,
        },
        gate: GateConfig {
            mode,
            high_threshold: 70,
            medium_threshold: 40,
        },
        server: ServerConfig {
            port: 0,
            journal_path,
            journal_max_events: 0,
        },
        logging: LoggingConfig::default(),
    }
}

fn harness(mode: GateMode) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.jsonl");
    harness_with_journal(mode, dir, path)
}

fn harness_with_journal(
    mode: GateMode,
    dir: tempfile::TempDir,
    path: std::path::PathBuf,
) -> Harness {
    let clock = Arc::new(ManualClock::new(1_000));
    let journal = EventJournal::<ServiceEvent>::open(path.clone()).unwrap();
    let state = Arc::new(
        SharedState::build(&config(mode, path), clock.clone())
            .unwrap()
            .with_journal(journal),
    );
    Harness {
        app: router(state.clone()),
        state,
        clock,
        dir,
    }
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    caller: Option<Address>,
    body: Option<Value>,
) -> (StatusCode, Vec<u8>) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(caller) = caller {
        builder = builder.header(CALLER_HEADER, caller.to_string());
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, bytes.to_vec())
}

fn parse<T: DeserializeOwned>(bytes: &[u8]) -> T {
    serde_json::from_slice(bytes).unwrap()
}

async fn put_scores(app: &Router, token: Address, scores: [u32; 3], caller: Address) -> StatusCode {
    let body = json!({
        "holder_concentration": scores[0],
        "liquidity_ownership": scores[1],
        "governance_capture": scores[2],
    });
    send(app, Method::PUT, &format!("/tokens/{token}"), Some(caller), Some(body))
        .await
        .0
}

#[tokio::test]
async fn test_health() {
    let h = harness(GateMode::BlockHigh);
    let (status, body) = send(&h.app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = parse(&body);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_block_high_on_holder_concentration() {
    let h = harness(GateMode::BlockHigh);
    assert_eq!(put_scores(&h.app, TOKEN_X, [80, 10, 10], OWNER).await, StatusCode::OK);

    let uri = format!("/gate?token_a={TOKEN_X}&token_b={TOKEN_Y}");
    let (status, body) = send(&h.app, Method::GET, &uri, None, None).await;
    assert_eq!(status, StatusCode::OK);

    let decision: GateResponse = parse(&body);
    assert!(decision.should_block);
    assert_eq!(decision.token, TOKEN_X);
    assert_eq!(decision.reason, RiskReason::HighHolderConcentration);
    assert_eq!(decision.message, "High holder concentration risk");
    assert_eq!(decision.mode, GateMode::BlockHigh);
}

#[tokio::test]
async fn test_strict_blocks_moderate_composite() {
    let h = harness(GateMode::Strict);
    assert_eq!(put_scores(&h.app, TOKEN_X, [30, 40, 50], UPDATER).await, StatusCode::OK);

    let (_, body) = send(&h.app, Method::GET, &format!("/tokens/{TOKEN_X}"), None, None).await;
    let token: TokenResponse = parse(&body);
    assert!(token.exists);
    assert_eq!(token.composite, 40);
    assert_eq!(token.record.submitter, UPDATER);

    let uri = format!("/gate?token_a={TOKEN_Y}&token_b={TOKEN_X}");
    let (_, body) = send(&h.app, Method::GET, &uri, None, None).await;
    let decision: GateResponse = parse(&body);
    assert!(decision.should_block);
    assert_eq!(decision.token, TOKEN_X);
    assert_eq!(decision.message, "Multiple moderate risk factors");
}

#[tokio::test]
async fn test_unknown_tokens_are_not_blocked() {
    let h = harness(GateMode::Strict);
    let uri = format!("/gate?token_a={TOKEN_X}&token_b={TOKEN_Y}");
    let (_, body) = send(&h.app, Method::GET, &uri, None, None).await;
    let decision: GateResponse = parse(&body);
    assert!(!decision.should_block);
    assert_eq!(decision.score, 0);
    assert_eq!(decision.message, "No risk data available");
}

#[tokio::test]
async fn test_registry_error_statuses() {
    let h = harness(GateMode::BlockHigh);

    // Unauthorized caller.
    assert_eq!(put_scores(&h.app, TOKEN_X, [1, 2, 3], ALICE).await, StatusCode::FORBIDDEN);
    // Score above 100.
    let (status, body) = send(
        &h.app,
        Method::PUT,
        &format!("/tokens/{TOKEN_X}"),
        Some(OWNER),
        Some(json!({"holder_concentration": 1, "liquidity_ownership": 2, "governance_capture": 101})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let err: ErrorBody = parse(&body);
    assert_eq!(err.error, "out_of_range");
    // Zero token.
    assert_eq!(
        put_scores(&h.app, Address::ZERO, [1, 2, 3], OWNER).await,
        StatusCode::UNPROCESSABLE_ENTITY
    );
    // Missing caller header and malformed address.
    let (status, _) = send(
        &h.app,
        Method::PUT,
        &format!("/tokens/{TOKEN_X}"),
        None,
        Some(json!({"holder_concentration": 1, "liquidity_ownership": 2, "governance_capture": 3})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = send(
        &h.app,
        Method::POST,
        "/auth",
        Some(OWNER),
        Some(json!({"identity": "0xnot-hex", "authorized": true})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = send(&h.app, Method::GET, "/tokens/nope", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert!(!h.state.registry.exists(&TOKEN_X));
}

#[tokio::test]
async fn test_authorization_and_ownership() {
    let h = harness(GateMode::BlockHigh);

    // Only the owner manages updaters.
    let grant = json!({"identity": ALICE, "authorized": true});
    let (status, _) = send(&h.app, Method::POST, "/auth", Some(UPDATER), Some(grant.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = send(&h.app, Method::POST, "/auth", Some(OWNER), Some(grant)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(put_scores(&h.app, TOKEN_X, [5, 5, 5], ALICE).await, StatusCode::OK);

    let (status, _) = send(
        &h.app,
        Method::POST,
        "/owner",
        Some(OWNER),
        Some(json!({"new_owner": Address::ZERO})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = send(
        &h.app,
        Method::POST,
        "/owner",
        Some(OWNER),
        Some(json!({"new_owner": BOB})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(h.state.registry.owner(), BOB);
    // The previous owner can no longer manage the set.
    let revoke = json!({"identity": ALICE, "authorized": false});
    let (status, _) = send(&h.app, Method::POST, "/auth", Some(OWNER), Some(revoke)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_batch_update_is_all_or_nothing() {
    let h = harness(GateMode::BlockHigh);

    let bad = json!({"entries": [
        {"token": TOKEN_X, "holder_concentration": 10, "liquidity_ownership": 10, "governance_capture": 10},
        {"token": TOKEN_Y, "holder_concentration": 10, "liquidity_ownership": 200, "governance_capture": 10},
    ]});
    let (status, _) = send(&h.app, Method::POST, "/tokens/batch", Some(OWNER), Some(bad)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(h.state.registry.token_count(), 0);

    let good = json!({"entries": [
        {"token": TOKEN_X, "holder_concentration": 10, "liquidity_ownership": 10, "governance_capture": 10},
        {"token": TOKEN_Y, "holder_concentration": 90, "liquidity_ownership": 0, "governance_capture": 0},
    ]});
    let (status, body) = send(&h.app, Method::POST, "/tokens/batch", Some(OWNER), Some(good)).await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = parse(&body);
    assert_eq!(body["updated"], 2);
    assert_eq!(h.state.registry.token_count(), 2);
}

#[tokio::test]
async fn test_session_lifecycle() {
    let h = harness(GateMode::BlockHigh);
    assert_eq!(put_scores(&h.app, TOKEN_X, [30, 30, 30], OWNER).await, StatusCode::OK);

    let (status, body) = send(&h.app, Method::POST, "/sessions", Some(ALICE), None).await;
    assert_eq!(status, StatusCode::CREATED);
    let started: SessionIdResponse = parse(&body);
    let id = started.session_id.unwrap();

    let (_, body) = send(&h.app, Method::GET, &format!("/users/{ALICE}/session"), None, None).await;
    let active: SessionIdResponse = parse(&body);
    assert_eq!(active.session_id, Some(id));

    // Another user cannot act on Alice's session.
    let swap = json!({"action_type": "swap", "token": TOKEN_X, "payload": "0x01"});
    let uri = format!("/sessions/{id}/actions");
    let (status, _) = send(&h.app, Method::POST, &uri, Some(BOB), Some(swap.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&h.app, Method::POST, &uri, Some(ALICE), Some(swap)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    h.clock.advance(5);
    let ack = json!({"action_type": "acknowledge_risk", "token": TOKEN_X});
    let (status, _) = send(&h.app, Method::POST, &uri, Some(ALICE), Some(ack)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, body) = send(&h.app, Method::GET, &uri, None, None).await;
    let actions: Vec<SessionAction> = parse(&body);
    assert_eq!(actions.len(), 2);
    assert_eq!(&actions[0].payload[..], &[0x01]);
    assert!(actions[1].payload.is_empty());

    let (_, body) = send(&h.app, Method::GET, &format!("/sessions/{id}/valid"), None, None).await;
    let valid: ValidResponse = parse(&body);
    assert!(valid.valid);

    let hash = B256::repeat_byte(0x77);
    let settle = json!({"final_state_hash": hash});
    let (status, body) = send(
        &h.app,
        Method::POST,
        &format!("/sessions/{id}/settle"),
        Some(ALICE),
        Some(settle.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let settled: Session = parse(&body);
    assert_eq!(settled.status, SessionStatus::Settled);
    assert_eq!(settled.final_state_hash, hash);
    assert_eq!(settled.action_count, 2);

    // Terminal: actions discarded, pointer cleared, further writes refused.
    let (_, body) = send(&h.app, Method::GET, &uri, None, None).await;
    let actions: Vec<SessionAction> = parse(&body);
    assert!(actions.is_empty());
    let (_, body) = send(&h.app, Method::GET, &format!("/users/{ALICE}/session"), None, None).await;
    let active: SessionIdResponse = parse(&body);
    assert_eq!(active.session_id, None);
    let (status, _) = send(
        &h.app,
        Method::POST,
        &format!("/sessions/{id}/settle"),
        Some(ALICE),
        Some(settle),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, body) = send(&h.app, Method::GET, &format!("/sessions/{id}"), None, None).await;
    let stored: Session = parse(&body);
    assert_eq!(stored, settled);
}

#[tokio::test]
async fn test_session_cap_and_expiry() {
    let h = harness(GateMode::BlockHigh);
    let (_, body) = send(&h.app, Method::POST, "/sessions", Some(ALICE), None).await;
    let id = parse::<SessionIdResponse>(&body).session_id.unwrap();
    let uri = format!("/sessions/{id}/actions");
    let approve = json!({"action_type": "approve", "token": TOKEN_X});

    for _ in 0..3 {
        let (status, _) = send(&h.app, Method::POST, &uri, Some(ALICE), Some(approve.clone())).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }
    let (status, body) = send(&h.app, Method::POST, &uri, Some(ALICE), Some(approve.clone())).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(parse::<ErrorBody>(&body).error, "limit_reached");

    // Cleanup refused until the inactivity window has passed.
    let cleanup = format!("/sessions/{id}/cleanup");
    let (status, body) = send(&h.app, Method::POST, &cleanup, None, None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(parse::<ErrorBody>(&body).error, "not_expired");

    h.clock.advance(601);
    let (status, body) = send(&h.app, Method::POST, &cleanup, Some(BOB), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parse::<Session>(&body).status, SessionStatus::Ended);

    let (_, body) = send(&h.app, Method::GET, &format!("/sessions/{id}/valid"), None, None).await;
    assert!(!parse::<ValidResponse>(&body).valid);
}

#[tokio::test]
async fn test_expired_session_refuses_actions() {
    let h = harness(GateMode::BlockHigh);
    let (_, body) = send(&h.app, Method::POST, "/sessions", Some(ALICE), None).await;
    let id = parse::<SessionIdResponse>(&body).session_id.unwrap();

    h.clock.advance(601);
    let (status, body) = send(
        &h.app,
        Method::POST,
        &format!("/sessions/{id}/actions"),
        Some(ALICE),
        Some(json!({"action_type": "swap", "token": TOKEN_X})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(parse::<ErrorBody>(&body).error, "expired");
}

#[tokio::test]
async fn test_unknown_session() {
    let h = harness(GateMode::BlockHigh);
    let id = B256::repeat_byte(0x42);

    let (status, _) = send(&h.app, Method::GET, &format!("/sessions/{id}"), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&h.app, Method::GET, "/sessions/0x1234", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, body) = send(
        &h.app,
        Method::POST,
        &format!("/sessions/{id}/settle"),
        Some(ALICE),
        Some(json!({"final_state_hash": B256::ZERO})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(parse::<ErrorBody>(&body).error, "not_active");
}

#[tokio::test]
async fn test_events_are_journaled_and_restored() {
    let h = harness(GateMode::BlockHigh);
    assert_eq!(put_scores(&h.app, TOKEN_X, [80, 10, 10], OWNER).await, StatusCode::OK);
    h.clock.advance(100);
    send(&h.app, Method::GET, &format!("/gate?token_a={TOKEN_X}&token_b={TOKEN_Y}"), None, None).await;
    send(&h.app, Method::POST, "/sessions", Some(ALICE), None).await;

    let path = h.dir.path().join("events.jsonl");
    let journal = EventJournal::<ServiceEvent>::open(path.clone()).unwrap();
    let events = journal.replay().unwrap();
    assert_eq!(events.len(), 3);
    assert!(matches!(events[0], ServiceEvent::Registry(_)));
    assert!(matches!(events[1], ServiceEvent::Gate(_)));
    assert!(matches!(events[2], ServiceEvent::Session(_)));

    // A fresh state over the same journal sees the same record.
    let clock = Arc::new(ManualClock::new(2_000));
    let restored = SharedState::build(&config(GateMode::BlockHigh, path.clone()), clock)
        .unwrap()
        .with_journal(journal);
    assert_eq!(restored.restore().unwrap(), 1);
    assert_eq!(restored.registry.read(&TOKEN_X), h.state.registry.read(&TOKEN_X));
    assert_eq!(restored.registry.data_age(&TOKEN_X), 1_000);
}

#[tokio::test]
async fn test_status_reports_configuration() {
    let h = harness(GateMode::WarnOnly);
    assert_eq!(put_scores(&h.app, TOKEN_X, [1, 2, 3], OWNER).await, StatusCode::OK);
    send(&h.app, Method::POST, "/sessions", Some(ALICE), None).await;

    let (status, body) = send(&h.app, Method::GET, "/status", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = parse(&body);
    assert_eq!(body["tokens"], 1);
    assert_eq!(body["active_sessions"], 1);
    assert_eq!(body["gate_mode"], "warn_only");
    assert_eq!(body["high_threshold"], 70);
    assert_eq!(body["medium_threshold"], 40);
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_unwritable_journal_fails_request_and_keeps_events() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness_with_journal(GateMode::BlockHigh, dir, "/dev/full".into());

    let (status, body) = send(
        &h.app,
        Method::PUT,
        &format!("/tokens/{TOKEN_X}"),
        Some(OWNER),
        Some(json!({"holder_concentration": 80, "liquidity_ownership": 10, "governance_capture": 10})),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(parse::<ErrorBody>(&body).error, "journal_unavailable");

    // Applied in memory, queued for the journal.
    assert!(h.state.registry.exists(&TOKEN_X));
    assert_eq!(h.state.pending_events(), 1);
}
