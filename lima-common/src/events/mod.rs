//! Event types for the Lima Connect dashboard
//!
//! Provides the dashboard event definitions and the EventBus that carries
//! them from the synchronization engine to SSE clients.

mod notification;

pub use notification::Notification;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Dashboard event types
///
/// Events are broadcast via EventBus and serialized for SSE transmission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DashboardEvent {
    /// A genuinely new, pending record arrived
    ///
    /// Triggers:
    /// - SSE: show an auto-dismissing alert
    NewSubmission(Notification),

    /// Live subscription opened for a session
    SubscriptionOpened {
        session_id: String,
        timestamp: DateTime<Utc>,
    },

    /// First batch of a subscription was classified
    ///
    /// The dashboard stops showing its loading indicator.
    InitialLoadComplete {
        session_id: String,
        /// Number of records in the live view
        record_count: usize,
        timestamp: DateTime<Utc>,
    },

    /// Live view changed after an incremental batch
    ViewUpdated {
        session_id: String,
        record_count: usize,
        added: usize,
        modified: usize,
        removed: usize,
        timestamp: DateTime<Utc>,
    },

    /// Live subscription closed (session ended, refresh or shutdown)
    SubscriptionClosed {
        session_id: String,
        timestamp: DateTime<Utc>,
    },

    /// The store cannot serve the ordered live query as configured
    ///
    /// NOTE: Not retried automatically. The next session change or an
    /// explicit refresh reopens the subscription.
    ConfigurationError {
        session_id: String,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// The subscription could not be established for another reason
    SubscriptionError {
        session_id: String,
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl DashboardEvent {
    /// Event type name, used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            DashboardEvent::NewSubmission(_) => "NewSubmission",
            DashboardEvent::SubscriptionOpened { .. } => "SubscriptionOpened",
            DashboardEvent::InitialLoadComplete { .. } => "InitialLoadComplete",
            DashboardEvent::ViewUpdated { .. } => "ViewUpdated",
            DashboardEvent::SubscriptionClosed { .. } => "SubscriptionClosed",
            DashboardEvent::ConfigurationError { .. } => "ConfigurationError",
            DashboardEvent::SubscriptionError { .. } => "SubscriptionError",
        }
    }

    /// The alert payload, if this is a notification
    pub fn as_notification(&self) -> Option<&Notification> {
        match self {
            DashboardEvent::NewSubmission(n) => Some(n),
            _ => None,
        }
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus for dashboard events
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block the engine)
/// - Multiple concurrent subscribers (one per SSE client)
/// - Automatic cleanup when subscribers drop
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use lima_common::events::{DashboardEvent, EventBus};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(DashboardEvent::SubscriptionOpened {
///     session_id: "office-1".to_string(),
///     timestamp: chrono::Utc::now(),
/// });
///
/// let event = rx.try_recv().unwrap();
/// assert_eq!(event.event_type(), "SubscriptionOpened");
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<DashboardEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// `capacity` is the number of events buffered per subscriber before the
    /// oldest are dropped for that subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<DashboardEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists,
    /// `Err` if nobody is listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: DashboardEvent,
    ) -> Result<usize, broadcast::error::SendError<DashboardEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    ///
    /// Alerts are fire-and-forget: a dashboard with no open SSE client simply
    /// misses them.
    pub fn emit_lossy(&self, event: DashboardEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn opened(session: &str) -> DashboardEvent {
        DashboardEvent::SubscriptionOpened {
            session_id: session.to_string(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_eventbus_new() {
        let bus = EventBus::new(100);
        assert_eq!(bus.capacity(), 100);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_eventbus_emit_without_subscribers_is_err() {
        let bus = EventBus::new(10);
        assert!(bus.emit(opened("s1")).is_err());
        // lossy variant swallows the same condition
        bus.emit_lossy(opened("s1"));
    }

    #[test]
    fn test_eventbus_multiple_subscribers() {
        let bus = EventBus::new(10);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.emit(opened("s1")).expect("emit should succeed");

        assert_eq!(rx1.try_recv().expect("rx1").event_type(), "SubscriptionOpened");
        assert_eq!(rx2.try_recv().expect("rx2").event_type(), "SubscriptionOpened");
    }

    #[test]
    fn test_eventbus_emit_lossy_on_full_channel() {
        let bus = EventBus::new(2);
        let _rx = bus.subscribe();
        for _ in 0..10 {
            bus.emit_lossy(opened("s1"));
        }
        assert_eq!(bus.capacity(), 2);
    }

    #[test]
    fn test_notification_event_serialization() {
        let event = DashboardEvent::NewSubmission(Notification {
            notification_id: Uuid::new_v4(),
            record_id: "C1".to_string(),
            kind: "checkin".to_string(),
            title: "Novo Check-in".to_string(),
            description: "Recepção/Check-in".to_string(),
            submitter_name: "Recepção/Check-in".to_string(),
            customer_name: Some("Ana".to_string()),
            vehicle_summary: None,
            duration_ms: 5000,
            timestamp: Utc::now(),
        });

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "NewSubmission");
        assert_eq!(json["record_id"], "C1");
        assert_eq!(json["customer_name"], "Ana");

        let back: DashboardEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
        assert_eq!(back.as_notification().map(|n| n.record_id.as_str()), Some("C1"));
    }

    #[test]
    fn test_event_type_names() {
        let cases = vec![
            (opened("s"), "SubscriptionOpened"),
            (
                DashboardEvent::ConfigurationError {
                    session_id: "s".to_string(),
                    message: "index".to_string(),
                    timestamp: Utc::now(),
                },
                "ConfigurationError",
            ),
            (
                DashboardEvent::SubscriptionClosed {
                    session_id: "s".to_string(),
                    timestamp: Utc::now(),
                },
                "SubscriptionClosed",
            ),
        ];
        for (event, expected) in cases {
            assert_eq!(event.event_type(), expected);
            assert!(event.as_notification().is_none());
        }
    }
}
