//! Filter view over the synchronized records
//!
//! Pure and synchronous: works only on a snapshot of the local view.

use crate::classifier::LocalView;
use crate::model::{Record, ViewFilter};

/// Records of `view` matching `criteria`, newest first
pub fn filter(view: &LocalView, criteria: &ViewFilter) -> Vec<Record> {
    view.ordered()
        .into_iter()
        .filter(|record| criteria.matches(record))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RecordKind, ReviewState};
    use crate::normalizer::normalize;
    use crate::store::RawDocument;
    use serde_json::json;

    fn view() -> LocalView {
        [
            ("Q1", "quote", "pending", "2026-03-01T10:00:00Z"),
            ("F1", "finished", "viewed", "2026-03-02T10:00:00Z"),
            ("C1", "checkin", "pending", "2026-03-03T10:00:00Z"),
            ("Q2", "quote", "viewed", "2026-03-04T10:00:00Z"),
        ]
        .into_iter()
        .map(|(id, kind, status, at)| {
            normalize(&RawDocument::new(
                id,
                json!({"submitterId": "mech1", "kind": kind, "reviewState": status, "createdAt": at}),
            ))
            .unwrap()
        })
        .collect()
    }

    fn ids(records: &[Record]) -> Vec<&str> {
        records.iter().map(Record::id).collect()
    }

    #[test]
    fn test_all_returns_everything_newest_first() {
        let records = filter(&view(), &ViewFilter::default());
        assert_eq!(ids(&records), vec!["Q2", "C1", "F1", "Q1"]);
    }

    #[test]
    fn test_by_kind_and_state() {
        let view = view();
        let quotes = filter(
            &view,
            &ViewFilter {
                kind: Some(RecordKind::Quote),
                review_state: None,
            },
        );
        assert_eq!(ids(&quotes), vec!["Q2", "Q1"]);

        let pending_quotes = filter(
            &view,
            &ViewFilter {
                kind: Some(RecordKind::Quote),
                review_state: Some(ReviewState::Pending),
            },
        );
        assert_eq!(ids(&pending_quotes), vec!["Q1"]);
    }

    #[test]
    fn test_repeated_calls_are_equal_and_leave_view_untouched() {
        let view = view();
        let before = view.clone();
        let criteria = ViewFilter::parse(Some("all"), Some("pending")).unwrap();

        let first = filter(&view, &criteria);
        let second = filter(&view, &criteria);
        assert_eq!(first, second);
        assert_eq!(view, before);
    }
}
