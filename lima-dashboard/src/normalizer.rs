//! Record normalizer
//!
//! Maps one raw store document to a typed [`Record`] or rejects it. Coercion
//! rules per field:
//! - missing `kind` -> quote
//! - missing numbers -> 0, missing arrays -> empty, missing strings -> empty
//! - missing `reviewState` -> pending, missing `archived` -> false
//! - timestamps accept the store's native shape, dates, strings or numbers,
//!   otherwise they stay `Unknown`
//!
//! Only the fields of the document's own kind are read, so stray check-in
//! fields on a quote (or line items on a check-in) never reach the record.
//! A present field of the wrong type rejects the whole document.
//!
//! Legacy field names written by older clients (`mechanicId`, `type`,
//! `status`, `timestamp`, `vehicleInfo`) are read as aliases.

use serde_json::{Map, Value};

use crate::error::{Result, SyncError};
use crate::model::{
    CheckinDetails, ChecklistItem, ChecklistValue, Envelope, LineItem, PricedDetails, Record,
    RecordBody, RecordKind, ReviewState, VehicleIdentity,
};
use crate::store::RawDocument;
use lima_common::Timestamp;

/// Normalize one raw document
pub fn normalize(doc: &RawDocument) -> Result<Record> {
    let id = doc.id.trim();
    if id.is_empty() {
        return Err(SyncError::malformed("<empty>", "document has no id"));
    }
    let fields = doc
        .data
        .as_object()
        .ok_or_else(|| SyncError::malformed(id, "document body is not an object"))?;
    let reader = FieldReader { id, fields };

    let kind = match reader.string_any(&["kind", "type"])? {
        None => RecordKind::Quote,
        Some(k) => k
            .parse()
            .map_err(|_| SyncError::malformed(id, format!("unknown kind {:?}", k)))?,
    };

    let submitter_id = reader
        .string_any(&["submitterId", "mechanicId"])?
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| SyncError::malformed(id, "missing submitterId"))?;

    let review_state = match reader.string_any(&["reviewState", "status"])? {
        None => ReviewState::Pending,
        Some(s) => s
            .parse()
            .map_err(|_| SyncError::malformed(id, format!("unknown review state {:?}", s)))?,
    };

    let envelope = Envelope {
        id: id.to_string(),
        submitter_id,
        created_at: Timestamp::from_value(reader.first(&["createdAt", "timestamp"])),
        review_state,
        archived: reader.bool("archived")?.unwrap_or(false),
        notes: reader.string("notes")?.unwrap_or_default(),
        customer_name: reader.string("customerName")?.filter(|s| !s.is_empty()),
        vehicle_summary: reader
            .string_any(&["vehicleSummary", "vehicleInfo"])?
            .filter(|s| !s.is_empty()),
    };

    let body = match kind {
        RecordKind::Quote => RecordBody::Quote(priced(&reader)?),
        RecordKind::Finished => RecordBody::Finished(priced(&reader)?),
        RecordKind::Checkin => RecordBody::Checkin(checkin(&reader)?),
    };

    Ok(Record { envelope, body })
}

/// Line items; any stored `totalPrice` is ignored and recomputed
fn priced(reader: &FieldReader<'_>) -> Result<PricedDetails> {
    let mut items = Vec::new();
    for (index, raw) in reader.array("items")?.iter().enumerate() {
        items.push(line_item(reader.id, index, raw)?);
    }
    Ok(PricedDetails::new(items))
}

/// Accepts `{lineItem, unitPrice, quantity}` and the older
/// `{item: {name, price}, quantity}` shape
fn line_item(id: &str, index: usize, raw: &Value) -> Result<LineItem> {
    let obj = raw
        .as_object()
        .ok_or_else(|| SyncError::malformed(id, format!("item {} is not an object", index)))?;
    let nested = obj.get("item").and_then(Value::as_object);

    let name = obj
        .get("lineItem")
        .or_else(|| nested.and_then(|n| n.get("name")))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let unit_price = match obj
        .get("unitPrice")
        .or_else(|| nested.and_then(|n| n.get("price")))
    {
        None | Some(Value::Null) => 0.0,
        Some(v) => v
            .as_f64()
            .ok_or_else(|| SyncError::malformed(id, format!("item {} price is not a number", index)))?,
    };
    if !unit_price.is_finite() || unit_price < 0.0 {
        return Err(SyncError::malformed(id, format!("item {} has negative price", index)));
    }

    let quantity = match obj.get("quantity") {
        None | Some(Value::Null) => 0,
        Some(v) => v
            .as_u64()
            .ok_or_else(|| SyncError::malformed(id, format!("item {} quantity is not a whole number", index)))?,
    };
    if quantity < 1 {
        return Err(SyncError::malformed(id, format!("item {} quantity must be at least 1", index)));
    }
    let quantity = u32::try_from(quantity)
        .map_err(|_| SyncError::malformed(id, format!("item {} quantity out of range", index)))?;

    Ok(LineItem {
        line_item: name,
        unit_price,
        quantity,
    })
}

fn checkin(reader: &FieldReader<'_>) -> Result<CheckinDetails> {
    let vehicle = VehicleIdentity {
        make: reader.text_like("vehicleMake")?,
        model: reader.text_like("vehicleModel")?,
        year: reader.text_like("vehicleYear")?,
        plate: match reader.text_like("vehicleLicensePlate")? {
            Some(plate) => Some(plate),
            None => reader.text_like("vehiclePlate")?,
        },
        vin: reader.text_like("vehicleVIN")?,
    };

    let service_request = reader
        .string_any(&["serviceRequest", "serviceRequestDetails"])?
        .unwrap_or_default();

    let mut checklist = Vec::new();
    for (index, raw) in reader.array_any(&["checklist", "checklistItems"])?.iter().enumerate() {
        checklist.push(checklist_item(reader.id, index, raw)?);
    }

    let mut photos = Vec::new();
    for raw in reader.array_any(&["photos", "photoDataUris"])? {
        match raw.as_str() {
            Some(uri) if !uri.is_empty() => photos.push(uri.to_string()),
            Some(_) => {}
            None => return Err(SyncError::malformed(reader.id, "photo payload is not a string")),
        }
    }

    Ok(CheckinDetails {
        vehicle,
        service_request,
        checklist,
        photos,
    })
}

/// `{id, label, type, value, note}`; `textarea` is the older name for long text
fn checklist_item(id: &str, index: usize, raw: &Value) -> Result<ChecklistItem> {
    let obj = raw
        .as_object()
        .ok_or_else(|| SyncError::malformed(id, format!("checklist entry {} is not an object", index)))?;
    let text = |key: &str| obj.get(key).and_then(Value::as_str).unwrap_or_default().to_string();
    let raw_value = obj.get("value").unwrap_or(&Value::Null);

    let value = match obj.get("type").and_then(Value::as_str) {
        Some("boolean") => ChecklistValue::Boolean(raw_value.as_bool().unwrap_or(false)),
        Some("longText") | Some("textarea") => ChecklistValue::LongText(scalar_text(raw_value)),
        Some("text") => ChecklistValue::Text(scalar_text(raw_value)),
        Some(other) => {
            return Err(SyncError::malformed(
                id,
                format!("checklist entry {} has unknown type {:?}", index, other),
            ))
        }
        None => match raw_value {
            Value::Bool(b) => ChecklistValue::Boolean(*b),
            other => ChecklistValue::Text(scalar_text(other)),
        },
    };

    let note = match obj.get("note").and_then(Value::as_str) {
        Some(n) => n.to_string(),
        None => text("notes"),
    };

    Ok(ChecklistItem {
        id: text("id"),
        label: text("label"),
        value,
        note,
    })
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

/// Typed access to document fields, rejecting present-but-mistyped values
struct FieldReader<'a> {
    id: &'a str,
    fields: &'a Map<String, Value>,
}

impl<'a> FieldReader<'a> {
    /// First present, non-null field among `keys`
    fn first(&self, keys: &[&str]) -> Option<&'a Value> {
        keys.iter()
            .filter_map(|key| self.fields.get(*key))
            .find(|v| !v.is_null())
    }

    fn string(&self, key: &str) -> Result<Option<String>> {
        self.string_any(&[key])
    }

    fn string_any(&self, keys: &[&str]) -> Result<Option<String>> {
        match self.first(keys) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(_) => Err(SyncError::malformed(
                self.id,
                format!("field {} is not a string", keys[0]),
            )),
        }
    }

    /// Strings, or numbers rendered as text (model years are often numeric)
    fn text_like(&self, key: &str) -> Result<Option<String>> {
        match self.first(&[key]) {
            None => Ok(None),
            Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(Value::Number(n)) => Ok(Some(n.to_string())),
            Some(_) => Err(SyncError::malformed(
                self.id,
                format!("field {} is not text", key),
            )),
        }
    }

    fn bool(&self, key: &str) -> Result<Option<bool>> {
        match self.first(&[key]) {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(_) => Err(SyncError::malformed(
                self.id,
                format!("field {} is not a boolean", key),
            )),
        }
    }

    fn array(&self, key: &str) -> Result<&'a [Value]> {
        self.array_any(&[key])
    }

    fn array_any(&self, keys: &[&str]) -> Result<&'a [Value]> {
        match self.first(keys) {
            None => Ok(&[][..]),
            Some(Value::Array(items)) => Ok(items.as_slice()),
            Some(_) => Err(SyncError::malformed(
                self.id,
                format!("field {} is not a list", keys[0]),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(id: &str, data: Value) -> RawDocument {
        RawDocument::new(id, data)
    }

    #[test]
    fn test_defaults_for_minimal_document() {
        let record = normalize(&raw("Q1", json!({"submitterId": "mech1"}))).unwrap();
        assert_eq!(record.kind(), RecordKind::Quote);
        assert_eq!(record.review_state(), ReviewState::Pending);
        assert!(!record.envelope.archived);
        assert_eq!(record.envelope.created_at, Timestamp::Unknown);
        assert_eq!(record.envelope.notes, "");
        assert_eq!(record.total_price(), Some(0.0));
    }

    #[test]
    fn test_total_recomputed_not_trusted() {
        let record = normalize(&raw(
            "Q1",
            json!({
                "submitterId": "mech1",
                "kind": "quote",
                "totalPrice": 9999.0,
                "items": [
                    {"lineItem": "Lâmpada H4", "unitPrice": 25.0, "quantity": 2},
                    {"lineItem": "Troca de Lâmpada", "unitPrice": 20.0, "quantity": 1}
                ]
            }),
        ))
        .unwrap();
        assert_eq!(record.total_price(), Some(70.0));
    }

    #[test]
    fn test_legacy_item_shape_and_field_aliases() {
        let record = normalize(&raw(
            "sub2",
            json!({
                "mechanicId": "mech2",
                "type": "finished",
                "status": "viewed",
                "timestamp": "2024-03-10T09:00:00Z",
                "vehicleInfo": "Gol 2015",
                "items": [{"item": {"id": "ps3", "name": "Óleo Motor", "price": 45.0}, "quantity": 4}]
            }),
        ))
        .unwrap();
        assert_eq!(record.kind(), RecordKind::Finished);
        assert_eq!(record.submitter_id(), "mech2");
        assert_eq!(record.review_state(), ReviewState::Viewed);
        assert!(record.envelope.created_at.is_known());
        assert_eq!(record.envelope.vehicle_summary.as_deref(), Some("Gol 2015"));
        assert_eq!(record.total_price(), Some(180.0));
    }

    #[test]
    fn test_checkin_fields_and_checklist() {
        let record = normalize(&raw(
            "C1",
            json!({
                "submitterId": "tablet_user",
                "kind": "checkin",
                "vehicleMake": "Fiat",
                "vehicleModel": "Uno",
                "vehicleYear": 2010,
                "vehicleLicensePlate": "ABC1D23",
                "serviceRequestDetails": "Barulho no freio",
                "checklistItems": [
                    {"id": "mileage", "label": "Quilometragem Atual", "value": "120000", "type": "text", "notes": ""},
                    {"id": "has_spare_tire", "label": "Estepe Presente?", "value": true, "type": "boolean"},
                    {"id": "exterior_damage_notes", "label": "Avarias", "value": "Risco na porta", "type": "textarea"}
                ],
                "photoDataUris": ["data:image/png;base64,AAAA"],
                "items": [{"lineItem": "stray", "unitPrice": 1.0, "quantity": 1}]
            }),
        ))
        .unwrap();

        let RecordBody::Checkin(details) = &record.body else {
            panic!("expected check-in body");
        };
        assert_eq!(details.vehicle.year.as_deref(), Some("2010"));
        assert_eq!(details.service_request, "Barulho no freio");
        assert_eq!(details.checklist.len(), 3);
        assert_eq!(details.checklist[1].value, ChecklistValue::Boolean(true));
        assert_eq!(
            details.checklist[2].value,
            ChecklistValue::LongText("Risco na porta".to_string())
        );
        assert_eq!(details.photos.len(), 1);
        assert_eq!(record.total_price(), None);
        assert_eq!(record.vehicle_label().as_deref(), Some("Fiat Uno 2010 (ABC1D23)"));
    }

    #[test]
    fn test_checkin_fields_dropped_from_quote() {
        let record = normalize(&raw(
            "Q2",
            json!({
                "submitterId": "mech1",
                "kind": "quote",
                "checklistItems": [{"id": "x", "label": "y", "value": true, "type": "boolean"}],
                "vehicleMake": "Fiat"
            }),
        ))
        .unwrap();
        assert!(matches!(record.body, RecordBody::Quote(_)));
        assert_eq!(record.vehicle_label(), None);
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("checklist").is_none());
        assert!(json.get("vehicle").is_none());
    }

    #[test]
    fn test_rejections() {
        let cases = vec![
            raw("", json!({"submitterId": "m"})),
            raw("A", json!("not an object")),
            raw("B", json!({"kind": "quote"})),
            raw("C", json!({"submitterId": "m", "kind": "invoice"})),
            raw("D", json!({"submitterId": "m", "reviewState": "archived"})),
            raw("E", json!({"submitterId": "m", "archived": "yes"})),
            raw("F", json!({"submitterId": "m", "items": [{"lineItem": "x", "unitPrice": -1.0, "quantity": 1}]})),
            raw("G", json!({"submitterId": "m", "items": [{"lineItem": "x", "unitPrice": 1.0}]})),
            raw("H", json!({"submitterId": "m", "items": "none"})),
            raw("I", json!({"submitterId": 42})),
        ];
        for doc in cases {
            let result = normalize(&doc);
            assert!(
                matches!(result, Err(SyncError::Malformed { .. })),
                "document {:?} should be rejected, got {:?}",
                doc.id,
                result
            );
        }
    }

    #[test]
    fn test_unknown_timestamp_is_not_now() {
        let record = normalize(&raw(
            "Q3",
            json!({"submitterId": "m", "createdAt": "ontem"}),
        ))
        .unwrap();
        assert_eq!(record.envelope.created_at, Timestamp::Unknown);
        assert_eq!(record.envelope.created_at.display(), "data desconhecida");
    }
}
