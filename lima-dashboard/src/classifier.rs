//! Change classifier
//!
//! Turns store snapshots into the session's local view and decides which
//! arrivals are worth an alert. The first snapshot after a subscription opens
//! is the initial load and never alerts. Later snapshots alert only for
//! `added` deltas whose id was absent from the prior view, since the store
//! re-tags known documents as added on reconnect.
//!
//! The new view is always rebuilt wholesale from the snapshot's documents;
//! the delta list is consulted only to classify novelty.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::model::{Record, ReviewState};
use crate::normalizer::normalize;
use crate::store::{ChangeKind, Snapshot};

/// Id-keyed records of the non-archived partition
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocalView {
    records: HashMap<String, Record>,
}

impl LocalView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Record> {
        self.records.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.records.values()
    }

    /// Records newest first; ties (and unknown timestamps) fall back to id
    pub fn ordered(&self) -> Vec<&Record> {
        let mut records: Vec<&Record> = self.records.values().collect();
        records.sort_by(|a, b| {
            b.envelope
                .created_at
                .cmp(&a.envelope.created_at)
                .then_with(|| a.id().cmp(b.id()))
        });
        records
    }
}

impl FromIterator<Record> for LocalView {
    fn from_iter<T: IntoIterator<Item = Record>>(iter: T) -> Self {
        Self {
            records: iter.into_iter().map(|r| (r.id().to_string(), r)).collect(),
        }
    }
}

/// A snapshot after normalization
///
/// Malformed documents are dropped here, one at a time; the rest of the
/// snapshot is unaffected.
#[derive(Debug, Clone, Default)]
pub struct NormalizedBatch {
    pub records: Vec<Record>,
    pub changes: Vec<(ChangeKind, String)>,
    pub skipped: usize,
}

impl NormalizedBatch {
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        let mut records = Vec::with_capacity(snapshot.documents.len());
        let mut skipped = 0;
        for doc in &snapshot.documents {
            match normalize(doc) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!("Skipping document: {}", e);
                    skipped += 1;
                }
            }
        }

        let changes = snapshot
            .changes
            .iter()
            .map(|c| (c.kind, c.document.id.clone()))
            .collect();

        Self {
            records,
            changes,
            skipped,
        }
    }

    /// Distinct submitter ids referenced by the batch
    pub fn submitter_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.records.iter().map(Record::submitter_id).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

/// Delta counts of one batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub added: usize,
    pub modified: usize,
    pub removed: usize,
    /// `added` deltas for ids already in the prior view
    pub redelivered: usize,
}

#[derive(Debug)]
pub struct Classified {
    pub view: LocalView,
    /// Genuinely new, pending, non-archived records in delta order
    pub notifiable: Vec<Record>,
    pub is_initial: bool,
    pub stats: BatchStats,
}

/// Per-subscription classification state
#[derive(Debug, Default)]
pub struct ChangeClassifier {
    initial_consumed: bool,
}

impl ChangeClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify `batch` against `prior` and build the replacement view
    pub fn apply(&mut self, prior: &LocalView, batch: NormalizedBatch) -> Classified {
        let is_initial = !self.initial_consumed;
        self.initial_consumed = true;

        let view: LocalView = batch
            .records
            .into_iter()
            .filter(|record| {
                if record.envelope.archived {
                    debug!("Dropping archived record {} from live view", record.id());
                }
                !record.envelope.archived
            })
            .map(|record| keep_monotonic(prior, record))
            .collect();

        let mut stats = BatchStats::default();
        let mut notifiable = Vec::new();
        for (kind, id) in &batch.changes {
            match kind {
                ChangeKind::Modified => stats.modified += 1,
                ChangeKind::Removed => stats.removed += 1,
                ChangeKind::Added => {
                    stats.added += 1;
                    if is_initial {
                        continue;
                    }
                    if prior.contains(id) {
                        stats.redelivered += 1;
                        continue;
                    }
                    if let Some(record) = view.get(id) {
                        if record.is_pending() && !notifiable.iter().any(|r: &Record| r.id() == id.as_str()) {
                            notifiable.push(record.clone());
                        }
                    }
                }
            }
        }

        Classified {
            view,
            notifiable,
            is_initial,
            stats,
        }
    }
}

/// A record seen as viewed never goes back to pending
fn keep_monotonic(prior: &LocalView, mut record: Record) -> Record {
    if let Some(previous) = prior.get(record.id()) {
        if previous.review_state() == ReviewState::Viewed && record.is_pending() {
            debug!("Ignoring viewed -> pending regression for {}", record.id());
            record.envelope.review_state = ReviewState::Viewed;
        }
    }
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{DocumentChange, RawDocument};
    use serde_json::{json, Value};

    fn doc(id: &str, status: &str) -> RawDocument {
        RawDocument::new(
            id,
            json!({
                "kind": "quote",
                "submitterId": "mech1",
                "reviewState": status,
                "createdAt": "2026-03-01T10:00:00Z",
                "items": [{"lineItem": "Óleo", "unitPrice": 35.0, "quantity": 2}],
            }),
        )
    }

    fn snapshot(documents: Vec<RawDocument>, changes: &[(ChangeKind, &str)]) -> NormalizedBatch {
        let changes = changes
            .iter()
            .map(|(kind, id)| DocumentChange {
                kind: *kind,
                document: documents
                    .iter()
                    .find(|d| d.id == *id)
                    .cloned()
                    .unwrap_or_else(|| RawDocument::new(*id, Value::Null)),
            })
            .collect();
        NormalizedBatch::from_snapshot(&Snapshot { documents, changes })
    }

    fn initial(classifier: &mut ChangeClassifier, docs: Vec<RawDocument>) -> LocalView {
        let ids: Vec<String> = docs.iter().map(|d| d.id.clone()).collect();
        let changes: Vec<(ChangeKind, &str)> =
            ids.iter().map(|id| (ChangeKind::Added, id.as_str())).collect();
        classifier.apply(&LocalView::new(), snapshot(docs, &changes)).view
    }

    #[test]
    fn test_initial_load_never_notifies() {
        let mut classifier = ChangeClassifier::new();
        let docs = vec![doc("A", "pending"), doc("B", "pending"), doc("C", "pending")];
        let batch = snapshot(docs, &[(ChangeKind::Added, "A"), (ChangeKind::Added, "B"), (ChangeKind::Added, "C")]);

        let result = classifier.apply(&LocalView::new(), batch);
        assert!(result.is_initial);
        assert!(result.notifiable.is_empty());
        assert_eq!(result.view.len(), 3);

        let next = classifier.apply(&result.view, snapshot(Vec::new(), &[]));
        assert!(!next.is_initial);
    }

    #[test]
    fn test_only_absent_ids_are_new() {
        let mut classifier = ChangeClassifier::new();
        let prior = initial(&mut classifier, vec![doc("A", "pending"), doc("B", "pending")]);

        let batch = snapshot(
            vec![doc("A", "pending"), doc("B", "pending"), doc("C", "pending")],
            &[(ChangeKind::Added, "C"), (ChangeKind::Added, "A")],
        );
        let result = classifier.apply(&prior, batch);

        assert!(!result.is_initial);
        let ids: Vec<&str> = result.notifiable.iter().map(Record::id).collect();
        assert_eq!(ids, vec!["C"]);
        assert_eq!(result.stats.redelivered, 1);
        assert_eq!(result.view.len(), 3);
    }

    #[test]
    fn test_new_viewed_record_is_not_notifiable() {
        let mut classifier = ChangeClassifier::new();
        let prior = initial(&mut classifier, vec![doc("A", "pending")]);

        let batch = snapshot(vec![doc("A", "pending"), doc("D", "viewed")], &[(ChangeKind::Added, "D")]);
        let result = classifier.apply(&prior, batch);
        assert!(result.notifiable.is_empty());
        assert!(result.view.contains("D"));
    }

    #[test]
    fn test_view_is_replaced_not_patched() {
        let mut classifier = ChangeClassifier::new();
        let prior = initial(&mut classifier, vec![doc("A", "pending"), doc("B", "pending")]);

        // B removed, but the delta list says nothing about it
        let result = classifier.apply(&prior, snapshot(vec![doc("A", "pending")], &[]));
        assert_eq!(result.view.len(), 1);
        assert!(!result.view.contains("B"));
    }

    #[test]
    fn test_viewed_never_reverts_to_pending() {
        let mut classifier = ChangeClassifier::new();
        let prior = initial(&mut classifier, vec![doc("A", "viewed")]);

        let result = classifier.apply(&prior, snapshot(vec![doc("A", "pending")], &[(ChangeKind::Modified, "A")]));
        assert_eq!(result.view.get("A").map(Record::review_state), Some(ReviewState::Viewed));
        assert_eq!(result.stats.modified, 1);
    }

    #[test]
    fn test_archived_documents_stay_out_of_live_view() {
        let mut classifier = ChangeClassifier::new();
        let prior = initial(&mut classifier, vec![doc("A", "pending")]);

        let mut archived = doc("E", "pending");
        archived.data["archived"] = json!(true);
        let result = classifier.apply(&prior, snapshot(vec![doc("A", "pending"), archived], &[(ChangeKind::Added, "E")]));
        assert!(!result.view.contains("E"));
        assert!(result.notifiable.is_empty());
    }

    #[test]
    fn test_malformed_document_is_skipped_alone() {
        let mut classifier = ChangeClassifier::new();
        let prior = initial(&mut classifier, vec![doc("A", "pending")]);

        let broken = RawDocument::new("X", json!({"kind": "quote", "reviewState": "pending"}));
        let batch = snapshot(
            vec![doc("A", "pending"), broken, doc("F", "pending")],
            &[(ChangeKind::Added, "X"), (ChangeKind::Added, "F")],
        );
        assert_eq!(batch.skipped, 1);

        let result = classifier.apply(&prior, batch);
        let ids: Vec<&str> = result.notifiable.iter().map(Record::id).collect();
        assert_eq!(ids, vec!["F"]);
        assert_eq!(result.view.len(), 2);
    }

    #[test]
    fn test_ordered_is_newest_first() {
        let mut older = doc("old", "pending");
        older.data["createdAt"] = json!("2026-01-01T08:00:00Z");
        let mut unknown = doc("unk", "pending");
        unknown.data["createdAt"] = json!("not a date");

        let view: LocalView = [doc("new", "pending"), older, unknown]
            .iter()
            .filter_map(|d| normalize(d).ok())
            .collect();
        let ids: Vec<&str> = view.ordered().into_iter().map(Record::id).collect();
        assert_eq!(ids, vec!["new", "old", "unk"]);
    }
}
