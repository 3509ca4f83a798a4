//! In-process document store with change-stream semantics
//!
//! Holds raw JSON documents keyed by id. Every mutation recomputes the live
//! (non-archived) result set, diffs it against the previous one and pushes a
//! [`Snapshot`] to each open subscription, the same way the hosted document
//! store delivers query snapshots. Used by the dashboard binary (seeded from
//! a JSON file) and by the tests.

use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use super::{
    ChangeKind, DocumentChange, LiveSubscription, ProfileSource, RawDocument, RecordStore,
    RecordWriter, Snapshot, StoreError,
};
use crate::model::{total_of, ChecklistValue, NewRecord, RecordKind, UserProfile};
use lima_common::Timestamp;

/// Seed file layout: raw documents (each with an `id`) and profiles
#[derive(Debug, Default, Deserialize)]
pub struct SeedFile {
    #[serde(default)]
    pub documents: Vec<Value>,
    #[serde(default)]
    pub profiles: Vec<UserProfile>,
}

#[derive(Default)]
struct Inner {
    documents: HashMap<String, Value>,
    profiles: HashMap<String, UserProfile>,
    subscribers: Vec<mpsc::UnboundedSender<Snapshot>>,
    missing_index: bool,
}

/// In-memory record collection, profile directory and change stream
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    profile_lookups: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a raw document as-is (no coercion)
    pub async fn insert_document(&self, doc: RawDocument) {
        let mut inner = self.inner.lock().await;
        let before = live_map(&inner.documents);
        inner.documents.insert(doc.id, doc.data);
        publish(&mut inner, &before);
    }

    pub async fn put_profile(&self, profile: UserProfile) {
        let mut inner = self.inner.lock().await;
        inner.profiles.insert(profile.uid.clone(), profile);
    }

    /// Load documents and profiles from a seed file; returns documents loaded
    pub async fn load_seed(&self, seed: SeedFile) -> usize {
        let mut loaded = 0;
        for profile in seed.profiles {
            self.put_profile(profile).await;
        }
        for data in seed.documents {
            match data.get("id").and_then(Value::as_str).map(str::to_string) {
                Some(id) if !id.is_empty() => {
                    self.insert_document(RawDocument::new(id, data)).await;
                    loaded += 1;
                }
                _ => warn!("Seed document without an id skipped"),
            }
        }
        loaded
    }

    /// Simulate a missing server-side index for the ordered queries
    pub async fn set_missing_index(&self, missing: bool) {
        self.inner.lock().await.missing_index = missing;
    }

    /// Re-deliver documents tagged as added, as the store does after a reconnect
    pub async fn redeliver(&self, ids: &[&str]) {
        let mut inner = self.inner.lock().await;
        let documents = live_documents(&inner.documents);
        let changes = documents
            .iter()
            .filter(|doc| ids.contains(&doc.id.as_str()))
            .map(|doc| DocumentChange {
                kind: ChangeKind::Added,
                document: doc.clone(),
            })
            .collect();
        broadcast(&mut inner, Snapshot { documents, changes });
    }

    /// Number of subscriptions whose receiver is still open
    pub async fn live_subscription_count(&self) -> usize {
        let mut inner = self.inner.lock().await;
        inner.subscribers.retain(|tx| !tx.is_closed());
        inner.subscribers.len()
    }

    /// Number of profile lookups served so far
    pub fn profile_lookups(&self) -> usize {
        self.profile_lookups.load(Ordering::SeqCst)
    }

    /// Current raw document by id
    pub async fn document(&self, id: &str) -> Option<Value> {
        self.inner.lock().await.documents.get(id).cloned()
    }
}

impl RecordStore for MemoryStore {
    async fn subscribe_live(&self) -> Result<LiveSubscription, StoreError> {
        let mut inner = self.inner.lock().await;
        if inner.missing_index {
            return Err(StoreError::MissingIndex(
                "records: archived ASC, createdAt DESC".to_string(),
            ));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let documents = live_documents(&inner.documents);
        let changes = documents
            .iter()
            .map(|doc| DocumentChange {
                kind: ChangeKind::Added,
                document: doc.clone(),
            })
            .collect();
        // Receiver is held locally, so the initial send cannot fail
        let _ = tx.send(Snapshot { documents, changes });
        inner.subscribers.push(tx);
        debug!("Live subscription opened ({} subscribers)", inner.subscribers.len());
        Ok(LiveSubscription::new(rx))
    }

    async fn fetch_archived(&self) -> Result<Vec<RawDocument>, StoreError> {
        let inner = self.inner.lock().await;
        if inner.missing_index {
            return Err(StoreError::MissingIndex(
                "records: archived ASC, createdAt DESC".to_string(),
            ));
        }
        let mut archived: Vec<RawDocument> = inner
            .documents
            .iter()
            .filter(|(_, data)| is_archived(data))
            .map(|(id, data)| RawDocument::new(id.clone(), data.clone()))
            .collect();
        sort_newest_first(&mut archived);
        Ok(archived)
    }
}

impl ProfileSource for MemoryStore {
    async fn get_profile(&self, id: &str) -> Result<Option<UserProfile>, StoreError> {
        self.profile_lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.inner.lock().await.profiles.get(id).cloned())
    }
}

impl RecordWriter for MemoryStore {
    async fn create_record(&self, draft: NewRecord) -> Result<String, StoreError> {
        if draft.submitter_id.trim().is_empty() {
            return Err(StoreError::Rejected("submitterId is required".to_string()));
        }
        if let Some(bad) = draft
            .items
            .iter()
            .find(|item| item.quantity < 1 || !item.unit_price.is_finite() || item.unit_price < 0.0)
        {
            return Err(StoreError::Rejected(format!(
                "invalid line item {:?}: quantity must be >= 1 and unit price >= 0",
                bad.line_item
            )));
        }

        let id = uuid::Uuid::new_v4().simple().to_string();
        let data = document_for(&id, &draft);

        let mut inner = self.inner.lock().await;
        let before = live_map(&inner.documents);
        inner.documents.insert(id.clone(), data);
        publish(&mut inner, &before);
        Ok(id)
    }

    async fn mark_viewed(&self, id: &str) -> Result<(), StoreError> {
        self.update_field(id, "reviewState", json!("viewed")).await
    }

    async fn archive(&self, id: &str) -> Result<(), StoreError> {
        self.update_field(id, "archived", json!(true)).await
    }
}

impl MemoryStore {
    async fn update_field(&self, id: &str, field: &str, value: Value) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let before = live_map(&inner.documents);
        match inner.documents.get_mut(id).and_then(Value::as_object_mut) {
            Some(obj) => {
                obj.insert(field.to_string(), value);
            }
            None => return Err(StoreError::NotFound(id.to_string())),
        }
        publish(&mut inner, &before);
        Ok(())
    }
}

/// Build the stored document for a new record; the total is computed here
fn document_for(id: &str, draft: &NewRecord) -> Value {
    let items: Vec<Value> = draft
        .items
        .iter()
        .map(|item| {
            json!({
                "lineItem": item.line_item,
                "unitPrice": item.unit_price,
                "quantity": item.quantity,
            })
        })
        .collect();

    let mut data = Map::new();
    data.insert("id".to_string(), json!(id));
    data.insert("submitterId".to_string(), json!(draft.submitter_id));
    data.insert("kind".to_string(), json!(draft.kind.as_str()));
    data.insert("createdAt".to_string(), json!(lima_common::time::now().to_rfc3339()));
    data.insert("reviewState".to_string(), json!("pending"));
    data.insert("archived".to_string(), json!(false));
    data.insert("notes".to_string(), json!(draft.notes));
    if let Some(customer) = &draft.customer_name {
        data.insert("customerName".to_string(), json!(customer));
    }
    if let Some(vehicle) = &draft.vehicle_summary {
        data.insert("vehicleSummary".to_string(), json!(vehicle));
    }

    match draft.kind {
        RecordKind::Quote | RecordKind::Finished => {
            data.insert("totalPrice".to_string(), json!(total_of(&draft.items)));
            data.insert("items".to_string(), Value::Array(items));
        }
        RecordKind::Checkin => {
            if let Some(vehicle) = &draft.vehicle {
                for (key, value) in [
                    ("vehicleMake", &vehicle.make),
                    ("vehicleModel", &vehicle.model),
                    ("vehicleYear", &vehicle.year),
                    ("vehicleLicensePlate", &vehicle.plate),
                    ("vehicleVIN", &vehicle.vin),
                ] {
                    if let Some(v) = value {
                        data.insert(key.to_string(), json!(v));
                    }
                }
            }
            if let Some(request) = &draft.service_request {
                data.insert("serviceRequestDetails".to_string(), json!(request));
            }
            let checklist: Vec<Value> = draft
                .checklist
                .iter()
                .map(|entry| {
                    let (kind, value) = match &entry.value {
                        ChecklistValue::Text(t) => ("text", json!(t)),
                        ChecklistValue::LongText(t) => ("longText", json!(t)),
                        ChecklistValue::Boolean(b) => ("boolean", json!(b)),
                    };
                    json!({
                        "id": entry.id,
                        "label": entry.label,
                        "type": kind,
                        "value": value,
                        "note": entry.note,
                    })
                })
                .collect();
            data.insert("checklistItems".to_string(), Value::Array(checklist));
            data.insert("photoDataUris".to_string(), json!(draft.photos));
        }
    }
    Value::Object(data)
}

fn is_archived(data: &Value) -> bool {
    data.get("archived").and_then(Value::as_bool).unwrap_or(false)
}

fn created_at(data: &Value) -> Timestamp {
    Timestamp::from_value(data.get("createdAt").or_else(|| data.get("timestamp")))
}

fn sort_newest_first(docs: &mut [RawDocument]) {
    docs.sort_by(|a, b| {
        created_at(&b.data)
            .cmp(&created_at(&a.data))
            .then_with(|| a.id.cmp(&b.id))
    });
}

fn live_documents(documents: &HashMap<String, Value>) -> Vec<RawDocument> {
    let mut live: Vec<RawDocument> = documents
        .iter()
        .filter(|(_, data)| !is_archived(data))
        .map(|(id, data)| RawDocument::new(id.clone(), data.clone()))
        .collect();
    sort_newest_first(&mut live);
    live
}

fn live_map(documents: &HashMap<String, Value>) -> HashMap<String, Value> {
    documents
        .iter()
        .filter(|(_, data)| !is_archived(data))
        .map(|(id, data)| (id.clone(), data.clone()))
        .collect()
}

/// Diff the live set against `before` and push the snapshot if anything changed
fn publish(inner: &mut Inner, before: &HashMap<String, Value>) {
    let documents = live_documents(&inner.documents);
    let mut changes = Vec::new();
    for doc in &documents {
        match before.get(&doc.id) {
            None => changes.push(DocumentChange {
                kind: ChangeKind::Added,
                document: doc.clone(),
            }),
            Some(old) if old != &doc.data => changes.push(DocumentChange {
                kind: ChangeKind::Modified,
                document: doc.clone(),
            }),
            Some(_) => {}
        }
    }
    for (id, data) in before {
        if !documents.iter().any(|doc| &doc.id == id) {
            changes.push(DocumentChange {
                kind: ChangeKind::Removed,
                document: RawDocument::new(id.clone(), data.clone()),
            });
        }
    }
    if changes.is_empty() {
        return;
    }
    broadcast(inner, Snapshot { documents, changes });
}

fn broadcast(inner: &mut Inner, snapshot: Snapshot) {
    inner
        .subscribers
        .retain(|tx| tx.send(snapshot.clone()).is_ok());
}
