use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::page::PageRequest;
use crate::errors::{PortalError, Result};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationStatus {
    Pending,
    Approved,
    Rejected,
}

impl VerificationStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, VerificationStatus::Pending)
    }

    /// A request leaves `Pending` exactly once and never moves again.
    pub fn can_transition(self, to: VerificationStatus) -> bool {
        matches!(
            (self, to),
            (VerificationStatus::Pending, VerificationStatus::Approved)
                | (VerificationStatus::Pending, VerificationStatus::Rejected)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            VerificationStatus::Pending => "PENDING",
            VerificationStatus::Approved => "APPROVED",
            VerificationStatus::Rejected => "REJECTED",
        }
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for VerificationStatus {
    type Err = PortalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(VerificationStatus::Pending),
            "APPROVED" => Ok(VerificationStatus::Approved),
            "REJECTED" => Ok(VerificationStatus::Rejected),
            other => Err(PortalError::Validation(format!(
                "unknown verification status '{}'",
                other
            ))),
        }
    }
}

/// Credits minted when a request is approved.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreditIssuance {
    pub co2_reduced_kg: f64,
    pub credits_raw: f64,
    pub credits_rounded: f64,
    pub idempotency_key: String,
    pub correlation_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VerificationRequest {
    pub id: String,
    pub owner_id: String,
    pub trip_id: String,
    pub distance_km: f64,
    pub energy_kwh: f64,
    pub checksum: String,
    pub status: VerificationStatus,
    #[serde(default)]
    pub verifier_id: Option<String>,
    #[serde(default)]
    pub verified_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub credit_issuance: Option<CreditIssuance>,
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
}

impl VerificationRequest {
    /// Check the lifecycle shape of a request received from the CVA service.
    pub fn validate(&self) -> Result<()> {
        match self.status {
            VerificationStatus::Pending => {
                if self.verifier_id.is_some() || self.verified_at.is_some() || self.notes.is_some() {
                    return Err(PortalError::Contract(format!(
                        "pending request {} carries decision fields",
                        self.id
                    )));
                }
                if self.credit_issuance.is_some() {
                    return Err(PortalError::Contract(format!(
                        "pending request {} carries a credit issuance",
                        self.id
                    )));
                }
            }
            VerificationStatus::Rejected => {
                self.require_decision_fields()?;
                if self.credit_issuance.is_some() {
                    return Err(PortalError::Contract(format!(
                        "rejected request {} carries a credit issuance",
                        self.id
                    )));
                }
            }
            VerificationStatus::Approved => self.require_decision_fields()?,
        }
        Ok(())
    }

    fn require_decision_fields(&self) -> Result<()> {
        if self.verifier_id.is_none() || self.verified_at.is_none() {
            return Err(PortalError::Contract(format!(
                "{} request {} is missing its verifier or decision time",
                self.status, self.id
            )));
        }
        Ok(())
    }

    /// Recompute the journey checksum and compare it with the stored one.
    pub fn checksum_matches(&self) -> bool {
        journey_checksum(&self.owner_id, &self.trip_id, self.distance_km, self.energy_kwh)
            .eq_ignore_ascii_case(self.checksum.trim())
    }

    pub fn available_actions(&self) -> &'static [ReviewAction] {
        if self.status == VerificationStatus::Pending {
            &[ReviewAction::Approve, ReviewAction::Reject]
        } else {
            &[]
        }
    }
}

/// Decision an operator can take on a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewAction {
    Approve,
    Reject,
}

impl ReviewAction {
    pub fn target_status(self) -> VerificationStatus {
        match self {
            ReviewAction::Approve => VerificationStatus::Approved,
            ReviewAction::Reject => VerificationStatus::Rejected,
        }
    }
}

/// SHA-256 over the immutable journey fields, lowercase hex.
pub fn journey_checksum(owner_id: &str, trip_id: &str, distance_km: f64, energy_kwh: f64) -> String {
    let canonical = format!(
        "{}|{}|{:.3}|{:.3}",
        owner_id, trip_id, distance_km, energy_kwh
    );
    hex::encode(Sha256::digest(canonical.as_bytes()))
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<VerificationStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyword: Option<String>,
    pub page: u32,
    pub size: u32,
}

impl VerificationQuery {
    /// Same query with paging the backend accepts: an unset size means the
    /// default page, anything else is clamped like [`PageRequest::new`].
    pub fn normalized(&self) -> Self {
        let paging = if self.size == 0 {
            PageRequest {
                page: self.page,
                ..PageRequest::default()
            }
        } else {
            PageRequest::new(self.page, self.size)
        };
        Self {
            page: paging.page,
            size: paging.size,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApproveVerification {
    pub verifier_id: String,
    pub idempotency_key: Uuid,
    pub correlation_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectVerification {
    pub verifier_id: String,
    pub reason: String,
    pub correlation_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VerificationSummary {
    pub pending: u64,
    pub approved: u64,
    pub rejected: u64,
    #[serde(default)]
    pub total_credits_issued: f64,
}
