use serde::Serialize;

use super::ServiceClient;
use crate::errors::{PortalError, Result};
use crate::models::audit::{AuditLogQuery, AuditLogResponse};
use crate::models::page::{Page, PageRequest};
use crate::models::user::{ReasonPayload, UserAccount, UserQuery};
use crate::models::wallet::Payout;

/// Client for the admin moderation service.
#[derive(Clone)]
pub struct AdminClient {
    inner: ServiceClient,
}

#[derive(Serialize)]
struct PendingPayoutQuery {
    status: &'static str,
    page: u32,
    size: u32,
}

fn require_reason(reason: &str) -> Result<&str> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(PortalError::Validation("a reason is required".into()));
    }
    Ok(reason)
}

impl AdminClient {
    pub fn new(inner: ServiceClient) -> Self {
        Self { inner }
    }

    pub async fn list_audit_logs(&self, query: &AuditLogQuery) -> Result<Page<AuditLogResponse>> {
        self.inner.get_with_query(&["api", "audit-logs"], query).await
    }

    pub async fn list_users(&self, query: &UserQuery) -> Result<Page<UserAccount>> {
        self.inner.get_with_query(&["api", "users"], query).await
    }

    pub async fn suspend_user(&self, id: &str, reason: &str) -> Result<UserAccount> {
        let reason = require_reason(reason)?;
        self.inner
            .post(&["api", "users", id, "suspend"], &ReasonPayload { reason }, None)
            .await
    }

    pub async fn activate_user(&self, id: &str) -> Result<UserAccount> {
        self.inner
            .post(&["api", "users", id, "activate"], &serde_json::json!({}), None)
            .await
    }

    pub async fn remove_listing(&self, id: &str, reason: &str) -> Result<()> {
        let reason = require_reason(reason)?;
        self.inner
            .post_empty(&["api", "admin", "listings", id, "remove"], &ReasonPayload { reason })
            .await
    }

    pub async fn list_pending_payouts(&self, page: PageRequest) -> Result<Page<Payout>> {
        let query = PendingPayoutQuery {
            status: "PENDING",
            page: page.page,
            size: page.size,
        };
        self.inner.get_with_query(&["api", "admin", "payouts"], &query).await
    }

    pub async fn approve_payout(&self, id: &str) -> Result<Payout> {
        self.inner
            .post(&["api", "admin", "payouts", id, "approve"], &serde_json::json!({}), None)
            .await
    }

    pub async fn reject_payout(&self, id: &str, reason: &str) -> Result<Payout> {
        let reason = require_reason(reason)?;
        self.inner
            .post(&["api", "admin", "payouts", id, "reject"], &ReasonPayload { reason }, None)
            .await
    }
}
