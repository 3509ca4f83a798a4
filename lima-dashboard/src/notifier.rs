//! Notification emitter
//!
//! Builds one auto-expiring alert per notifiable record and publishes it on
//! the EventBus. Record ids already alerted during the current subscription
//! are remembered, so a record can alert at most once per subscription no
//! matter how often the classifier hands it over.

use std::collections::HashSet;
use std::time::Duration;

use lima_common::events::{DashboardEvent, EventBus, Notification};
use tracing::info;
use uuid::Uuid;

use crate::model::{Record, RecordKind, UserProfile};
use crate::profiles::fallback_name;

/// Alert separator between summary parts
const SEPARATOR: &str = " · ";

pub struct Notifier {
    bus: EventBus,
    duration: Duration,
    fallback_id_len: usize,
    emitted: HashSet<String>,
}

impl Notifier {
    pub fn new(bus: EventBus, duration: Duration, fallback_id_len: usize) -> Self {
        Self {
            bus,
            duration,
            fallback_id_len,
            emitted: HashSet::new(),
        }
    }

    /// Emit the alert for `record` unless one was already emitted
    ///
    /// `profile` is whatever the cache holds for the submitter; `None`
    /// degrades to the truncated id.
    pub fn notify(&mut self, record: &Record, profile: Option<&UserProfile>) -> Option<Notification> {
        if !self.emitted.insert(record.id().to_string()) {
            return None;
        }

        let submitter_name = match profile {
            Some(p) => p.display_name.clone(),
            None => fallback_name(record.submitter_id(), self.fallback_id_len),
        };
        let customer_name = record.envelope.customer_name.clone();
        let vehicle_summary = record.vehicle_label();

        let mut parts = vec![submitter_name.clone()];
        if let Some(customer) = &customer_name {
            parts.push(format!("Cliente: {}", customer));
        }
        if let Some(vehicle) = &vehicle_summary {
            parts.push(format!("Veículo: {}", vehicle));
        }

        let notification = Notification {
            notification_id: Uuid::new_v4(),
            record_id: record.id().to_string(),
            kind: record.kind().as_str().to_string(),
            title: title_for(record.kind()).to_string(),
            description: parts.join(SEPARATOR),
            submitter_name,
            customer_name,
            vehicle_summary,
            duration_ms: u64::try_from(self.duration.as_millis()).unwrap_or(u64::MAX),
            timestamp: lima_common::time::now(),
        };

        info!(
            "New {} {} from {}",
            record.kind(),
            record.id(),
            notification.submitter_name
        );
        self.bus.emit_lossy(DashboardEvent::NewSubmission(notification.clone()));
        Some(notification)
    }

    pub fn has_emitted(&self, record_id: &str) -> bool {
        self.emitted.contains(record_id)
    }

    pub fn emitted_count(&self) -> usize {
        self.emitted.len()
    }
}

fn title_for(kind: RecordKind) -> &'static str {
    match kind {
        RecordKind::Quote => "Novo Orçamento",
        RecordKind::Finished => "Novo Serviço Finalizado",
        RecordKind::Checkin => "Novo Check-in",
    }
}
