//! Dashboard card summaries
//!
//! Serializable, pre-formatted view of a record in the shop's locale
//! (pt-BR labels, `dd/mm/yyyy às HH:MM` dates, `R$` totals).

use serde::Serialize;

use crate::model::{Record, RecordKind, ReviewState};

/// Submitter name shown when nothing is cached yet
pub const UNKNOWN_SUBMITTER: &str = "Mecânico Desconhecido";

const NOTES_PREVIEW_CHARS: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordSummary {
    pub id: String,
    pub kind: RecordKind,
    pub kind_label: &'static str,
    pub review_state: ReviewState,
    pub review_label: &'static str,
    pub submitter_name: String,
    pub created_at: String,
    pub customer_name: Option<String>,
    pub vehicle: Option<String>,
    pub notes_preview: String,
    /// Formatted total, priced kinds only
    pub total: Option<String>,
}

impl RecordSummary {
    /// `submitter_name` of `None` shows [`UNKNOWN_SUBMITTER`]
    pub fn new(record: &Record, submitter_name: Option<String>) -> Self {
        Self {
            id: record.id().to_string(),
            kind: record.kind(),
            kind_label: record.kind().label(),
            review_state: record.review_state(),
            review_label: record.review_state().label(),
            submitter_name: submitter_name.unwrap_or_else(|| UNKNOWN_SUBMITTER.to_string()),
            created_at: record.envelope.created_at.display(),
            customer_name: record.envelope.customer_name.clone(),
            vehicle: record.vehicle_label(),
            notes_preview: notes_preview(&record.envelope.notes),
            total: record.total_price().map(format_price),
        }
    }
}

/// "R$ 70.00"
pub fn format_price(value: f64) -> String {
    format!("R$ {:.2}", value)
}

/// First 50 characters of the notes, with "..." when cut
pub fn notes_preview(notes: &str) -> String {
    let mut chars = notes.chars();
    let preview: String = chars.by_ref().take(NOTES_PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", preview)
    } else {
        preview
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::normalize;
    use crate::store::RawDocument;
    use serde_json::json;

    #[test]
    fn test_quote_summary() {
        let record = normalize(&RawDocument::new(
            "Q1",
            json!({
                "submitterId": "mech1",
                "createdAt": "2026-03-01T14:05:00Z",
                "items": [
                    {"lineItem": "Lâmpada H4", "unitPrice": 25.0, "quantity": 2},
                    {"lineItem": "Troca de Lâmpada", "unitPrice": 20.0, "quantity": 1}
                ],
            }),
        ))
        .unwrap();

        let summary = RecordSummary::new(&record, Some("João".to_string()));
        assert_eq!(summary.kind_label, "Orçamento");
        assert_eq!(summary.review_label, "Pendente");
        assert_eq!(summary.created_at, "01/03/2026 às 14:05");
        assert_eq!(summary.total.as_deref(), Some("R$ 70.00"));
        assert_eq!(summary.submitter_name, "João");
    }

    #[test]
    fn test_unknown_submitter_and_no_total_for_checkin() {
        let record = normalize(&RawDocument::new(
            "C1",
            json!({"submitterId": "mech1", "kind": "checkin"}),
        ))
        .unwrap();

        let summary = RecordSummary::new(&record, None);
        assert_eq!(summary.submitter_name, UNKNOWN_SUBMITTER);
        assert_eq!(summary.total, None);
        assert_eq!(summary.created_at, "data desconhecida");
    }

    #[test]
    fn test_notes_preview_truncates_at_fifty_chars() {
        let short = "Cliente pediu orçamento";
        assert_eq!(notes_preview(short), short);

        let long = "ç".repeat(60);
        let preview = notes_preview(&long);
        assert!(preview.ends_with("..."));
        assert_eq!(preview.chars().count(), 53);

        assert_eq!(notes_preview(&"a".repeat(50)), "a".repeat(50));
    }
}
