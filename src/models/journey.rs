use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{PortalError, Result};

/// A trip an EV owner submits for verification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JourneySubmission {
    pub vehicle_id: String,
    pub trip_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub distance_km: f64,
    pub energy_kwh: f64,
}

impl JourneySubmission {
    pub fn validate(&self) -> Result<()> {
        if self.trip_id.trim().is_empty() || self.vehicle_id.trim().is_empty() {
            return Err(PortalError::Validation(
                "trip and vehicle ids are required".into(),
            ));
        }
        if !(self.distance_km.is_finite() && self.distance_km > 0.0) {
            return Err(PortalError::Validation("distance must be positive".into()));
        }
        if !(self.energy_kwh.is_finite() && self.energy_kwh > 0.0) {
            return Err(PortalError::Validation("energy must be positive".into()));
        }
        if self.ended_at <= self.started_at {
            return Err(PortalError::Validation(
                "journey must end after it starts".into(),
            ));
        }
        Ok(())
    }
}

/// Body posted to the owner service: the submission plus its checksum.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct JourneyPayload<'a> {
    #[serde(flatten)]
    pub submission: &'a JourneySubmission,
    pub checksum: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Journey {
    pub id: String,
    pub trip_id: String,
    pub vehicle_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub distance_km: f64,
    pub energy_kwh: f64,
    pub status: String,
}
