//! User-facing alert payload

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Upper bound on alert visibility (one year)
const MAX_DURATION_MS: i64 = 365 * 24 * 60 * 60 * 1000;

/// One alert announcing a newly submitted, still pending record
///
/// Alerts are transient: the UI shows each one for `duration_ms` and then
/// dismisses it on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Unique alert id (not the record id)
    pub notification_id: Uuid,
    /// Id of the record this alert announces
    pub record_id: String,
    /// Record kind tag (`quote`, `finished`, `checkin`)
    pub kind: String,
    /// Short headline, e.g. "Novo Orçamento"
    pub title: String,
    /// One-line summary of submitter, customer and vehicle
    pub description: String,
    /// Resolved display name of the submitter (or truncated-id fallback)
    pub submitter_name: String,
    pub customer_name: Option<String>,
    pub vehicle_summary: Option<String>,
    /// How long the alert stays visible
    pub duration_ms: u64,
    /// When the alert was raised
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    /// Instant after which the alert should no longer be shown
    pub fn expires_at(&self) -> DateTime<Utc> {
        let millis = i64::try_from(self.duration_ms).unwrap_or(MAX_DURATION_MS).min(MAX_DURATION_MS);
        let duration = chrono::Duration::milliseconds(millis);
        self.timestamp
            .checked_add_signed(duration)
            .unwrap_or(self.timestamp)
    }

    pub fn is_expired_at(&self, at: DateTime<Utc>) -> bool {
        at >= self.expires_at()
    }
}
