//! Integration tests for the owner, buyer and admin clients.
//!
//! These tests verify:
//! 1. Auth failures clear the shared session and surface server messages
//! 2. Wallet balances are returned exactly as the wallet service reports them
//! 3. Purchases and payouts reuse their idempotency key across retries
//! 4. Journey submissions carry the checksum over the session owner

use std::str::FromStr;

use jsonwebtoken::{encode, EncodingKey, Header};
use portal::auth::AuthSession;
use portal::client::Portal;
use portal::config::Config;
use portal::errors::PortalError;
use portal::intent::{FileIntentStore, IdempotencyLedger};
use portal::models::journey::JourneySubmission;
use portal::models::listing::ListingQuery;
use portal::models::page::PageRequest;
use portal::models::verification::journey_checksum;
use portal::models::wallet::PayoutRequest;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn token(sub: &str, role: &str) -> String {
    encode(
        &Header::default(),
        &json!({ "sub": sub, "role": role, "exp": 4_102_444_800i64 }),
        &EncodingKey::from_secret(b"test"),
    )
    .unwrap()
}

fn portal(server: &MockServer, session: AuthSession) -> Portal {
    let cfg = Config::single_host(&server.uri()).unwrap();
    Portal::new(&cfg, session).unwrap()
}

fn transaction_json(id: &str) -> Value {
    json!({
        "id": id,
        "listingId": "lst-1",
        "buyerId": "buyer-1",
        "sellerId": "owner-1",
        "quantity": 2.5,
        "pricePerCredit": 12.4,
        "totalAmount": 31.0,
        "status": "COMPLETED",
        "createdAt": "2026-03-02T08:00:00Z"
    })
}

// ── Session handling ──────────────────────────────────────────

/// 401 from any service ends the session for every client.
#[tokio::test]
async fn test_unauthorized_clears_session() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/wallet/balance"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "error": "token expired" })))
        .mount(&server)
        .await;

    let session = AuthSession::with_token(token("owner-1", "EV_OWNER"));
    let p = portal(&server, session.clone());
    assert!(session.is_authenticated().await);

    let err = p.owner.get_wallet_balance().await.unwrap_err();
    assert!(matches!(err, PortalError::Unauthorized));
    assert!(!session.is_authenticated().await);
    assert!(p.buyer.get_listing("x").await.is_err());
}

/// 403 keeps the session and carries the server's message.
#[tokio::test]
async fn test_forbidden_surfaces_server_message() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/audit-logs"))
        .respond_with(
            ResponseTemplate::new(403).set_body_json(json!({ "message": "admin role required" })),
        )
        .mount(&server)
        .await;

    let session = AuthSession::with_token(token("buyer-1", "BUYER"));
    let p = portal(&server, session.clone());
    let err = p.admin.list_audit_logs(&Default::default()).await.unwrap_err();
    assert!(matches!(err, PortalError::Forbidden(ref m) if m == "admin role required"));
    assert!(session.is_authenticated().await);
}

/// The bearer token and a request id go out on every call.
#[tokio::test]
async fn test_requests_carry_bearer_and_request_id() {
    let server = MockServer::start().await;
    let jwt = token("buyer-1", "BUYER");
    Mock::given(method("GET"))
        .and(path("/api/listings"))
        .and(header("authorization", format!("Bearer {}", jwt).as_str()))
        .and(query_param("listingType", "AUCTION"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "content": [] })))
        .expect(1)
        .mount(&server)
        .await;

    let p = portal(&server, AuthSession::with_token(jwt));
    let query = ListingQuery {
        listing_type: Some(portal::models::listing::ListingType::Auction),
        page: 0,
        size: 20,
        ..Default::default()
    };
    let listings = p.buyer.list_listings(&query).await.unwrap();
    assert!(listings.content.is_empty());

    let received = server.received_requests().await.unwrap();
    assert!(received[0].headers.get("x-request-id").is_some());
}

// ── Owner ─────────────────────────────────────────────────────

/// The client does not recompute or round anything in the balance.
#[tokio::test]
async fn test_wallet_balance_is_returned_unchanged() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/wallet/balance"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ownerId": "owner-1",
            "availableCredits": 3.1416,
            "pendingCredits": 0.75,
            "cashBalance": 1234.56,
            "currency": "USD"
        })))
        .mount(&server)
        .await;

    let p = portal(&server, AuthSession::with_token(token("owner-1", "EV_OWNER")));
    let bal = p.owner.get_wallet_balance().await.unwrap();
    assert_eq!(bal.available_credits, 3.1416);
    assert_eq!(bal.pending_credits, 0.75);
    assert_eq!(bal.cash_balance, Decimal::from_str("1234.56").unwrap());
    assert_eq!(bal.currency, "USD");
}

#[tokio::test]
async fn test_submit_journey_sends_checksum_over_session_owner() {
    let server = MockServer::start().await;
    let checksum = journey_checksum("owner-1", "trip-9", 42.0, 6.5);
    Mock::given(method("POST"))
        .and(path("/api/journeys"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "vr-99",
            "ownerId": "owner-1",
            "tripId": "trip-9",
            "distanceKm": 42.0,
            "energyKwh": 6.5,
            "checksum": checksum,
            "status": "PENDING"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let p = portal(&server, AuthSession::with_token(token("owner-1", "EV_OWNER")));
    let submission = JourneySubmission {
        vehicle_id: "veh-1".into(),
        trip_id: "trip-9".into(),
        started_at: "2026-03-01T08:00:00Z".parse().unwrap(),
        ended_at: "2026-03-01T09:00:00Z".parse().unwrap(),
        distance_km: 42.0,
        energy_kwh: 6.5,
    };
    let created = p.owner.submit_journey(&submission).await.unwrap();
    assert!(created.checksum_matches());

    let received = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&received[0].body).unwrap();
    assert_eq!(body["checksum"], json!(checksum));
    assert_eq!(body["tripId"], json!("trip-9"));
}

/// Without a decodable token there is no owner to checksum over.
#[tokio::test]
async fn test_submit_journey_requires_subject() {
    let server = MockServer::start().await;
    let p = portal(&server, AuthSession::with_token("opaque-token"));
    let submission = JourneySubmission {
        vehicle_id: "veh-1".into(),
        trip_id: "trip-9".into(),
        started_at: "2026-03-01T08:00:00Z".parse().unwrap(),
        ended_at: "2026-03-01T09:00:00Z".parse().unwrap(),
        distance_km: 42.0,
        energy_kwh: 6.5,
    };
    let err = p.owner.submit_journey(&submission).await.unwrap_err();
    assert!(matches!(err, PortalError::Session(_)));
    assert!(server.received_requests().await.unwrap().is_empty());
}

// ── Idempotent mutations ──────────────────────────────────────

/// A purchase that timed out on the gateway is retried under the same key,
/// even from a fresh ledger over the same intent directory.
#[tokio::test]
async fn test_purchase_retry_survives_restart() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/purchases"))
        .respond_with(ResponseTemplate::new(504))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/purchases"))
        .respond_with(ResponseTemplate::new(200).set_body_json(transaction_json("tx-1")))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let p = portal(&server, AuthSession::with_token(token("buyer-1", "BUYER")));

    let ledger = IdempotencyLedger::new(std::sync::Arc::new(
        FileIntentStore::open(dir.path()).await.unwrap(),
    ));
    assert!(p.buyer.purchase(&ledger, "lst-1", 2.5).await.is_err());

    let restarted = IdempotencyLedger::new(std::sync::Arc::new(
        FileIntentStore::open(dir.path()).await.unwrap(),
    ));
    assert_eq!(restarted.pending().await.unwrap().len(), 1);
    let tx = p.buyer.purchase(&restarted, "lst-1", 2.5).await.unwrap();
    assert_eq!(tx.id, "tx-1");
    assert_eq!(tx.certificate_id, None);

    let received = server.received_requests().await.unwrap();
    let bodies: Vec<Value> = received
        .iter()
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect();
    assert_eq!(bodies[0]["idempotencyKey"], bodies[1]["idempotencyKey"]);
    assert!(restarted.pending().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_payout_validation_happens_before_any_call() {
    let server = MockServer::start().await;
    let p = portal(&server, AuthSession::with_token(token("owner-1", "EV_OWNER")));
    let ledger = IdempotencyLedger::in_memory();

    let request = PayoutRequest {
        amount: Decimal::ZERO,
        currency: "USD".into(),
        bank_account_id: "bank-1".into(),
    };
    let err = p.owner.request_payout(&ledger, &request).await.unwrap_err();
    assert!(matches!(err, PortalError::Validation(_)));
    assert!(ledger.pending().await.unwrap().is_empty());
    assert!(server.received_requests().await.unwrap().is_empty());
}

// ── Admin ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_pending_payouts_filter_by_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/admin/payouts"))
        .and(query_param("status", "PENDING"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [{
                "id": "po-1",
                "ownerId": "owner-1",
                "amount": 50.0,
                "currency": "USD",
                "bankAccountId": "bank-1",
                "status": "PENDING",
                "requestedAt": "2026-03-03T12:00:00Z"
            }],
            "totalElements": 1,
            "totalPages": 1
        })))
        .expect(1)
        .mount(&server)
        .await;

    let p = portal(&server, AuthSession::with_token(token("admin-1", "ADMIN")));
    let payouts = p.admin.list_pending_payouts(PageRequest::default()).await.unwrap();
    assert_eq!(payouts.content.len(), 1);
    assert_eq!(payouts.content[0].amount, Decimal::from(50));
}

#[tokio::test]
async fn test_suspend_requires_reason() {
    let server = MockServer::start().await;
    let p = portal(&server, AuthSession::with_token(token("admin-1", "ADMIN")));
    let err = p.admin.suspend_user("u-1", "").await.unwrap_err();
    assert!(matches!(err, PortalError::Validation(_)));
    assert!(server.received_requests().await.unwrap().is_empty());
}
