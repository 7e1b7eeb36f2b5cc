//! Integration tests for the CVA review queue against a mock CVA service.
//!
//! These tests verify:
//! 1. Approve sends one idempotency key, in both the header and the body
//! 2. A retried approval after a transient failure reuses the same key, both
//!    across operator retries and inside the transport's own retries
//! 3. Rejections without a reason never reach the network
//! 4. Decisions on already-decided requests are refused or surfaced as conflicts
//! 5. List calls send normalized paging

use jsonwebtoken::{encode, EncodingKey, Header};
use portal::auth::AuthSession;
use portal::client::Portal;
use portal::config::Config;
use portal::errors::PortalError;
use portal::intent::IdempotencyLedger;
use portal::models::verification::{journey_checksum, ReviewAction, VerificationQuery, VerificationStatus};
use portal::review::ReviewQueue;
use serde_json::{json, Value};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn token(sub: &str, role: &str) -> String {
    encode(
        &Header::default(),
        &json!({ "sub": sub, "role": role, "exp": 4_102_444_800i64 }),
        &EncodingKey::from_secret(b"test"),
    )
    .unwrap()
}

fn queue(server: &MockServer) -> (ReviewQueue, IdempotencyLedger) {
    queue_with_retries(server, 0)
}

fn queue_with_retries(server: &MockServer, max_retries: u32) -> (ReviewQueue, IdempotencyLedger) {
    let mut cfg = Config::single_host(&server.uri()).unwrap();
    cfg.max_retries = max_retries;
    let portal = Portal::new(&cfg, AuthSession::with_token(token("cva-7", "CVA"))).unwrap();
    let ledger = IdempotencyLedger::in_memory();
    (ReviewQueue::new(portal.cva.clone(), ledger.clone()), ledger)
}

fn request_json(id: &str, status: &str) -> Value {
    let mut body = json!({
        "id": id,
        "ownerId": "owner-1",
        "tripId": "trip-42",
        "distanceKm": 120.5,
        "energyKwh": 18.25,
        "checksum": journey_checksum("owner-1", "trip-42", 120.5, 18.25),
        "status": status,
    });
    if status != "PENDING" {
        body["verifierId"] = json!("cva-7");
        body["verifiedAt"] = json!("2026-03-01T10:00:00Z");
    }
    body
}

fn approved_json(id: &str) -> Value {
    let mut body = request_json(id, "APPROVED");
    body["creditIssuance"] = json!({
        "co2ReducedKg": 14.2,
        "creditsRaw": 0.0142,
        "creditsRounded": 0.014,
        "idempotencyKey": "k",
        "correlationId": "c"
    });
    body
}

fn page(items: Vec<Value>) -> Value {
    let n = items.len();
    json!({ "content": items, "totalElements": n, "totalPages": 1, "number": 0, "size": 20 })
}

// ── Approve ───────────────────────────────────────────────────

/// The idempotency key travels in the header and the body, and they agree.
#[tokio::test]
async fn test_approve_sends_matching_key_in_header_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/verification-requests/vr-1/approve"))
        .respond_with(ResponseTemplate::new(200).set_body_json(approved_json("vr-1")))
        .expect(1)
        .mount(&server)
        .await;

    let (queue, ledger) = queue(&server);
    let decided = queue.approve("vr-1", None, Some("looks fine".into())).await.unwrap();
    assert_eq!(decided.status, VerificationStatus::Approved);
    assert_eq!(decided.credit_issuance.unwrap().credits_rounded, 0.014);

    let received = server.received_requests().await.unwrap();
    let req = &received[0];
    let header_key = req.headers.get("idempotency-key").unwrap().to_str().unwrap().to_string();
    let body: Value = serde_json::from_slice(&req.body).unwrap();
    assert_eq!(body["idempotencyKey"], json!(header_key));
    assert_eq!(body["verifierId"], json!("cva-7"));
    assert_eq!(body["notes"], json!("looks fine"));
    assert_eq!(
        req.headers.get("x-correlation-id").unwrap().to_str().unwrap(),
        body["correlationId"].as_str().unwrap()
    );

    // Definitive answer: nothing left to resume.
    assert!(ledger.pending().await.unwrap().is_empty());
    assert_eq!(queue.last_seen("vr-1"), Some(VerificationStatus::Approved));
}

/// A 503 keeps the intent; the operator's retry carries the same key.
#[tokio::test]
async fn test_retry_after_unavailable_reuses_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/verification-requests/vr-2/approve"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({ "message": "ledger busy" })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/verification-requests/vr-2/approve"))
        .respond_with(ResponseTemplate::new(200).set_body_json(approved_json("vr-2")))
        .mount(&server)
        .await;

    let (queue, ledger) = queue(&server);

    let first = queue.approve("vr-2", None, None).await;
    match first {
        Err(PortalError::Api { status, ref message, .. }) => {
            assert_eq!(status, 503);
            assert_eq!(message, "ledger busy");
        }
        other => panic!("expected 503 api error, got {:?}", other),
    }
    let unfinished = queue.unfinished().await.unwrap();
    assert_eq!(unfinished.len(), 1);
    assert_eq!(unfinished[0].scope, "verification:vr-2");

    queue.approve("vr-2", None, None).await.unwrap();

    let received = server.received_requests().await.unwrap();
    assert_eq!(received.len(), 2);
    let keys: Vec<_> = received
        .iter()
        .map(|r| r.headers.get("idempotency-key").unwrap().to_str().unwrap().to_string())
        .collect();
    assert_eq!(keys[0], keys[1]);
    assert!(ledger.pending().await.unwrap().is_empty());
}

/// Transport-level retries inside one call resend the exact same ids.
#[tokio::test]
async fn test_transport_retry_resends_same_ids() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/verification-requests/vr-6/approve"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/verification-requests/vr-6/approve"))
        .respond_with(ResponseTemplate::new(200).set_body_json(approved_json("vr-6")))
        .mount(&server)
        .await;

    let (queue, ledger) = queue_with_retries(&server, 2);
    let decided = queue.approve("vr-6", None, None).await.unwrap();
    assert_eq!(decided.status, VerificationStatus::Approved);

    let received = server.received_requests().await.unwrap();
    assert_eq!(received.len(), 2);
    for name in ["idempotency-key", "x-correlation-id"] {
        let values: Vec<_> = received
            .iter()
            .map(|r| r.headers.get(name).unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(values[0], values[1], "{} changed between attempts", name);
    }
    let bodies: Vec<Value> = received
        .iter()
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect();
    assert_eq!(bodies[0], bodies[1]);
    assert!(ledger.pending().await.unwrap().is_empty());
}

/// Someone else decided first: 409 surfaces as a conflict and clears the intent.
#[tokio::test]
async fn test_conflict_is_surfaced_and_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/verification-requests/vr-3/approve"))
        .respond_with(
            ResponseTemplate::new(409).set_body_json(json!({ "message": "request is not pending" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (queue, ledger) = queue(&server);
    let err = queue.approve("vr-3", Some("cva-9".into()), None).await.unwrap_err();
    assert!(matches!(err, PortalError::Conflict(ref m) if m == "request is not pending"));
    assert!(ledger.pending().await.unwrap().is_empty());
}

// ── Reject ────────────────────────────────────────────────────

/// A blank reason is refused locally; the service never sees the call.
#[tokio::test]
async fn test_reject_without_reason_sends_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let (queue, ledger) = queue(&server);
    let err = queue.reject("vr-4", None, "   ").await.unwrap_err();
    assert!(matches!(err, PortalError::Validation(_)));
    assert!(ledger.pending().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_reject_with_reason() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/verification-requests/vr-5/reject"))
        .respond_with(ResponseTemplate::new(200).set_body_json(request_json("vr-5", "REJECTED")))
        .expect(1)
        .mount(&server)
        .await;

    let (queue, _) = queue(&server);
    let decided = queue.reject("vr-5", None, " odometer photo missing ").await.unwrap();
    assert_eq!(decided.status, VerificationStatus::Rejected);

    let received = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&received[0].body).unwrap();
    assert_eq!(body["reason"], json!("odometer photo missing"));
    assert!(received[0].headers.get("idempotency-key").is_none());
}

// ── Listing & guards ──────────────────────────────────────────

/// Actions are offered only while a request is pending, and a decision on a
/// request already seen as decided is refused without a network call.
#[tokio::test]
async fn test_decided_requests_offer_no_actions() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/verification-requests"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(vec![
            request_json("vr-10", "PENDING"),
            request_json("vr-11", "REJECTED"),
        ])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let (queue, _) = queue(&server);
    let listed = queue.list(&VerificationQuery::default()).await.unwrap();
    assert_eq!(listed.content.len(), 2);
    assert_eq!(
        queue.actions_for(&listed.content[0]),
        &[ReviewAction::Approve, ReviewAction::Reject]
    );
    assert!(queue.actions_for(&listed.content[1]).is_empty());
    assert!(listed.content.iter().all(|r| r.checksum_matches()));

    let err = queue.approve("vr-11", None, None).await.unwrap_err();
    assert!(matches!(
        err,
        PortalError::AlreadyDecided { status: VerificationStatus::Rejected, .. }
    ));
}

/// An unset page size goes out as the default page, an oversized one clamped.
#[tokio::test]
async fn test_list_sends_normalized_page_size() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/verification-requests"))
        .and(query_param("size", "20"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(vec![])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/verification-requests"))
        .and(query_param("size", "200"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(vec![])))
        .expect(1)
        .mount(&server)
        .await;

    let (queue, _) = queue(&server);
    queue.list(&VerificationQuery::default()).await.unwrap();
    let oversized = VerificationQuery {
        size: 10_000,
        ..Default::default()
    };
    queue.list(&oversized).await.unwrap();
}

/// A pending request that arrives with decision fields breaks the contract.
#[tokio::test]
async fn test_pending_with_issuance_is_rejected_as_contract_breach() {
    let server = MockServer::start().await;
    let mut broken = approved_json("vr-20");
    broken["status"] = json!("PENDING");
    Mock::given(method("GET"))
        .and(path("/api/verification-requests/vr-20"))
        .respond_with(ResponseTemplate::new(200).set_body_json(broken))
        .mount(&server)
        .await;

    let (queue, _) = queue(&server);
    let err = queue.fetch("vr-20").await.unwrap_err();
    assert!(matches!(err, PortalError::Contract(_)));
}
