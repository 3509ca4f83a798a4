//! Typed records, profiles and view filters
//!
//! A record is a closed sum over the three shapes the shop submits (quote,
//! finished service, check-in) sharing one envelope. Documents are turned
//! into records once, at the store boundary (see `normalizer`), so the rest
//! of the engine matches on [`RecordBody`] instead of probing optional fields.

use lima_common::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::SyncError;

/// Record kind tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Quote,
    Finished,
    Checkin,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Quote => "quote",
            RecordKind::Finished => "finished",
            RecordKind::Checkin => "checkin",
        }
    }

    /// pt-BR label shown on dashboard cards
    pub fn label(&self) -> &'static str {
        match self {
            RecordKind::Quote => "Orçamento",
            RecordKind::Finished => "Serviço Finalizado",
            RecordKind::Checkin => "Check-in",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordKind {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "quote" => Ok(RecordKind::Quote),
            "finished" => Ok(RecordKind::Finished),
            "checkin" => Ok(RecordKind::Checkin),
            other => Err(SyncError::InvalidInput(format!("unknown record kind {:?}", other))),
        }
    }
}

/// Office review state; only ever moves Pending -> Viewed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewState {
    Pending,
    Viewed,
}

impl ReviewState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewState::Pending => "pending",
            ReviewState::Viewed => "viewed",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ReviewState::Pending => "Pendente",
            ReviewState::Viewed => "Visualizado",
        }
    }
}

impl FromStr for ReviewState {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ReviewState::Pending),
            "viewed" => Ok(ReviewState::Viewed),
            other => Err(SyncError::InvalidInput(format!("unknown review state {:?}", other))),
        }
    }
}

/// Fields shared by every record kind
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub id: String,
    pub submitter_id: String,
    pub created_at: Timestamp,
    pub review_state: ReviewState,
    pub archived: bool,
    pub notes: String,
    pub customer_name: Option<String>,
    pub vehicle_summary: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub line_item: String,
    pub unit_price: f64,
    pub quantity: u32,
}

impl LineItem {
    pub fn subtotal(&self) -> f64 {
        self.unit_price * f64::from(self.quantity)
    }
}

/// Line items of a quote or finished service, with the derived total
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PricedDetails {
    items: Vec<LineItem>,
    total_price: f64,
}

impl PricedDetails {
    /// Build from line items; the total is always recomputed here
    pub fn new(items: Vec<LineItem>) -> Self {
        let total_price = total_of(&items);
        Self { items, total_price }
    }

    pub fn items(&self) -> &[LineItem] {
        &self.items
    }

    pub fn total_price(&self) -> f64 {
        self.total_price
    }
}

/// Σ unit_price × quantity
pub fn total_of(items: &[LineItem]) -> f64 {
    items.iter().map(LineItem::subtotal).sum()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum ChecklistValue {
    Text(String),
    LongText(String),
    Boolean(bool),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub id: String,
    pub label: String,
    pub value: ChecklistValue,
    pub note: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VehicleIdentity {
    pub make: Option<String>,
    pub model: Option<String>,
    pub year: Option<String>,
    pub plate: Option<String>,
    pub vin: Option<String>,
}

impl VehicleIdentity {
    /// "Make Model Year (PLATE)" built from whatever is present
    pub fn summary(&self) -> Option<String> {
        let name: Vec<&str> = [&self.make, &self.model, &self.year]
            .into_iter()
            .filter_map(|part| part.as_deref())
            .collect();
        let mut summary = name.join(" ");
        if let Some(plate) = self.plate.as_deref() {
            if summary.is_empty() {
                summary = plate.to_string();
            } else {
                summary = format!("{} ({})", summary, plate);
            }
        }
        (!summary.is_empty()).then_some(summary)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckinDetails {
    pub vehicle: VehicleIdentity,
    pub service_request: String,
    pub checklist: Vec<ChecklistItem>,
    /// Inline photo payloads (data URIs)
    pub photos: Vec<String>,
}

/// Kind-specific part of a record
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RecordBody {
    Quote(PricedDetails),
    Finished(PricedDetails),
    Checkin(CheckinDetails),
}

/// One submitted business document
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    #[serde(flatten)]
    pub envelope: Envelope,
    #[serde(flatten)]
    pub body: RecordBody,
}

impl Record {
    pub fn id(&self) -> &str {
        &self.envelope.id
    }

    pub fn submitter_id(&self) -> &str {
        &self.envelope.submitter_id
    }

    pub fn kind(&self) -> RecordKind {
        match self.body {
            RecordBody::Quote(_) => RecordKind::Quote,
            RecordBody::Finished(_) => RecordKind::Finished,
            RecordBody::Checkin(_) => RecordKind::Checkin,
        }
    }

    pub fn review_state(&self) -> ReviewState {
        self.envelope.review_state
    }

    pub fn is_pending(&self) -> bool {
        self.envelope.review_state == ReviewState::Pending
    }

    /// Total for priced kinds, `None` for check-ins
    pub fn total_price(&self) -> Option<f64> {
        match &self.body {
            RecordBody::Quote(d) | RecordBody::Finished(d) => Some(d.total_price()),
            RecordBody::Checkin(_) => None,
        }
    }

    /// Vehicle text for alerts and cards
    ///
    /// Uses the free-text summary when present; check-ins fall back to their
    /// structured vehicle identity.
    pub fn vehicle_label(&self) -> Option<String> {
        if let Some(summary) = &self.envelope.vehicle_summary {
            return Some(summary.clone());
        }
        match &self.body {
            RecordBody::Checkin(details) => details.vehicle.summary(),
            _ => None,
        }
    }
}

/// Display identity of a submitter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub uid: String,
    pub display_name: String,
    #[serde(default)]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// New record submitted through the write boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRecord {
    pub submitter_id: String,
    pub kind: RecordKind,
    #[serde(default)]
    pub items: Vec<LineItem>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub vehicle_summary: Option<String>,
    #[serde(default)]
    pub vehicle: Option<VehicleIdentity>,
    #[serde(default)]
    pub service_request: Option<String>,
    #[serde(default)]
    pub checklist: Vec<ChecklistItem>,
    #[serde(default)]
    pub photos: Vec<String>,
}

/// Criteria for the filter view; `None` means "all"
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ViewFilter {
    pub kind: Option<RecordKind>,
    pub review_state: Option<ReviewState>,
}

impl ViewFilter {
    /// Parse UI filter values where `"all"` (or empty) matches everything
    pub fn parse(kind: Option<&str>, review_state: Option<&str>) -> Result<Self, SyncError> {
        let kind = match kind.map(str::trim) {
            None | Some("") | Some("all") => None,
            Some(k) => Some(k.parse()?),
        };
        let review_state = match review_state.map(str::trim) {
            None | Some("") | Some("all") => None,
            Some(s) => Some(s.parse()?),
        };
        Ok(Self { kind, review_state })
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.kind.map_or(true, |k| record.kind() == k)
            && self.review_state.map_or(true, |s| record.review_state() == s)
    }
}
