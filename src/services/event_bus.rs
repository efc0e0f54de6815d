//! EventBus service for alert distribution.
//!
//! Provides a broadcast-based alert stream with sequence numbering. Publishing
//! never blocks and never fails: with no subscribers the alert is dropped, and
//! a slow subscriber lags instead of stalling the publisher.

use chrono::Utc;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::domain::models::{AlertEvent, AlertSeverity, AlertsConfig};
use crate::domain::ports::AlertListener;

/// Configuration for the EventBus.
#[derive(Debug, Clone)]
pub struct EventBusConfig {
    /// Channel capacity for the broadcast channel.
    pub channel_capacity: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
        }
    }
}

impl From<&AlertsConfig> for EventBusConfig {
    fn from(config: &AlertsConfig) -> Self {
        Self {
            channel_capacity: config.channel_capacity,
        }
    }
}

/// Envelope fields supplied by the publisher.
#[derive(Debug, Clone)]
pub struct PublishOptions {
    pub severity: AlertSeverity,
    pub scope_id: String,
}

impl PublishOptions {
    pub fn new(severity: AlertSeverity, scope_id: impl Into<String>) -> Self {
        Self {
            severity,
            scope_id: scope_id.into(),
        }
    }
}

/// Central event bus for broadcasting alerts to multiple consumers.
pub struct EventBus {
    sender: broadcast::Sender<AlertEvent>,
    sequence: AtomicU64,
}

impl EventBus {
    /// Create a new EventBus with the given configuration.
    pub fn new(config: EventBusConfig) -> Self {
        let (sender, _) = broadcast::channel(config.channel_capacity.max(1));
        Self {
            sender,
            sequence: AtomicU64::new(0),
        }
    }

    /// Publish an alert and return the envelope that was broadcast.
    pub fn publish(
        &self,
        event_type: impl Into<String>,
        payload: serde_json::Value,
        options: PublishOptions,
    ) -> AlertEvent {
        let event = AlertEvent {
            id: Uuid::new_v4(),
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst),
            event_type: event_type.into(),
            payload,
            severity: options.severity,
            scope_id: options.scope_id,
            timestamp: Utc::now(),
        };

        // Broadcast to subscribers (ignore send errors - may have no subscribers)
        if self.sender.send(event.clone()).is_err() {
            debug!(event_type = %event.event_type, "alert published with no subscribers");
        }
        event
    }

    /// Subscribe to the raw alert stream.
    pub fn subscribe(&self) -> broadcast::Receiver<AlertEvent> {
        self.sender.subscribe()
    }

    /// Drive a listener from its own task until the bus is dropped.
    ///
    /// Listener errors and panics are logged and the listener keeps receiving.
    pub fn add_listener(&self, listener: Arc<dyn AlertListener>) -> JoinHandle<()> {
        let mut rx = self.sender.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => deliver(listener.as_ref(), &event),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(listener = listener.name(), skipped, "alert listener lagged, alerts dropped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!(listener = listener.name(), "alert listener stopped");
        })
    }

    /// Get the current sequence number.
    pub fn current_sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }

    /// Get the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EventBusConfig::default())
    }
}

fn deliver(listener: &dyn AlertListener, event: &AlertEvent) {
    match catch_unwind(AssertUnwindSafe(|| listener.on_alert(event))) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(
            listener = listener.name(),
            event_type = %event.event_type,
            error = %e,
            "alert listener failed"
        ),
        Err(_) => error!(
            listener = listener.name(),
            event_type = %event.event_type,
            "alert listener panicked"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::time::Duration;

    struct Recording(Mutex<Vec<String>>);

    impl AlertListener for Recording {
        fn name(&self) -> &str {
            "recording"
        }

        fn on_alert(&self, event: &AlertEvent) -> anyhow::Result<()> {
            self.0.lock().push(event.event_type.clone());
            Ok(())
        }
    }

    struct Failing;

    impl AlertListener for Failing {
        fn on_alert(&self, event: &AlertEvent) -> anyhow::Result<()> {
            if event.sequence == 0 {
                panic!("listener bug");
            }
            anyhow::bail!("listener rejected {}", event.event_type)
        }
    }

    fn options() -> PublishOptions {
        PublishOptions::new(AlertSeverity::Warning, "prd:p1")
    }

    #[tokio::test]
    async fn test_event_bus_sequence_assignment() {
        let bus = EventBus::default();
        assert_eq!(bus.current_sequence(), 0);

        let mut rx = bus.subscribe();

        bus.publish("first", serde_json::json!({}), options());
        let event1 = rx.recv().await.unwrap();
        assert_eq!(event1.sequence, 0);
        assert_eq!(event1.scope_id, "prd:p1");

        bus.publish("second", serde_json::json!({"value": 1}), options());
        let event2 = rx.recv().await.unwrap();
        assert_eq!(event2.sequence, 1);
        assert_eq!(event2.payload["value"], 1);

        assert_eq!(bus.current_sequence(), 2);
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::default();
        let event = bus.publish("orphan", serde_json::Value::Null, options());
        assert_eq!(event.severity, AlertSeverity::Warning);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_failing_listener_does_not_affect_others() {
        let bus = EventBus::default();
        let recording = Arc::new(Recording(Mutex::new(Vec::new())));
        let _failing = bus.add_listener(Arc::new(Failing));
        let _recording = bus.add_listener(recording.clone());

        bus.publish("a", serde_json::Value::Null, options());
        bus.publish("b", serde_json::Value::Null, options());

        for _ in 0..50 {
            if recording.0.lock().len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(*recording.0.lock(), vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_listener_stops_when_bus_dropped() {
        let bus = EventBus::default();
        let handle = bus.add_listener(Arc::new(Recording(Mutex::new(Vec::new()))));
        drop(bus);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
