//! Bounded channel subscriber.
//!
//! Forwards events into a bounded `mpsc` channel so a slow consumer (a
//! streaming transport, say) never blocks the run. When the channel is full
//! the event is dropped and counted: delivery is at-most-once.

use super::{EventSubscriber, SharedEvent};
use crate::errors::SubscriberError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

/// Delivery counters of a channel subscriber.
#[derive(Debug, Default)]
pub struct DeliveryMetrics {
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl DeliveryMetrics {
    fn record_delivery(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    fn record_drop(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Events placed in the channel.
    #[must_use]
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Events dropped because the channel was full.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Drop rate as a percentage.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn drop_rate(&self) -> f64 {
        let delivered = self.delivered();
        let dropped = self.dropped();
        let total = delivered + dropped;
        if total == 0 {
            0.0
        } else {
            (dropped as f64 / total as f64) * 100.0
        }
    }

    /// Converts metrics to a JSON object.
    #[must_use]
    pub fn to_dict(&self) -> serde_json::Value {
        serde_json::json!({
            "delivered": self.delivered(),
            "dropped": self.dropped(),
            "drop_rate_percent": (self.drop_rate() * 100.0).round() / 100.0
        })
    }
}

/// Subscriber that pushes events into a bounded channel.
#[derive(Debug)]
pub struct ChannelSubscriber {
    name: String,
    tx: mpsc::Sender<SharedEvent>,
    metrics: Arc<DeliveryMetrics>,
}

impl ChannelSubscriber {
    /// Creates a subscriber and the receiving end of its channel.
    ///
    /// A capacity of 0 is raised to 1.
    #[must_use]
    pub fn new(name: impl Into<String>, capacity: usize) -> (Self, mpsc::Receiver<SharedEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                name: name.into(),
                tx,
                metrics: Arc::new(DeliveryMetrics::default()),
            },
            rx,
        )
    }

    /// Shared delivery counters.
    #[must_use]
    pub fn metrics(&self) -> Arc<DeliveryMetrics> {
        Arc::clone(&self.metrics)
    }
}

#[async_trait]
impl EventSubscriber for ChannelSubscriber {
    fn name(&self) -> &str {
        &self.name
    }

    async fn on_event(&self, event: SharedEvent) -> Result<(), SubscriberError> {
        match self.tx.try_send(event) {
            Ok(()) => {
                self.metrics.record_delivery();
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(event)) => {
                self.metrics.record_drop();
                warn!(
                    subscriber = %self.name,
                    run_id = %event.run_id,
                    sequence = event.sequence,
                    dropped = self.metrics.dropped(),
                    "Event channel full, dropping event"
                );
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(SubscriberError::new(
                self.name.clone(),
                "receiver dropped",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RunId;
    use crate::core::{EventKind, PipelineEvent};
    use chrono::Utc;

    fn event(sequence: u64) -> SharedEvent {
        Arc::new(PipelineEvent {
            run_id: RunId::new(),
            sequence,
            kind: EventKind::StageStarted,
            stage: None,
            message: String::new(),
            progress: 0,
            timestamp: Utc::now(),
            payload: serde_json::Value::Null,
        })
    }

    #[tokio::test]
    async fn test_delivers_in_order() {
        let (subscriber, mut rx) = ChannelSubscriber::new("stream", 4);
        for seq in 1..=3 {
            subscriber.on_event(event(seq)).await.unwrap();
        }

        for expected in 1..=3 {
            assert_eq!(rx.recv().await.unwrap().sequence, expected);
        }
        assert_eq!(subscriber.metrics().delivered(), 3);
    }

    #[tokio::test]
    async fn test_drops_when_full() {
        let (subscriber, mut rx) = ChannelSubscriber::new("stream", 2);
        for seq in 1..=5 {
            subscriber.on_event(event(seq)).await.unwrap();
        }

        let metrics = subscriber.metrics();
        assert_eq!(metrics.delivered(), 2);
        assert_eq!(metrics.dropped(), 3);
        assert_eq!(rx.recv().await.unwrap().sequence, 1);
        assert_eq!(metrics.to_dict()["dropped"], 3);
    }

    #[tokio::test]
    async fn test_closed_receiver_is_an_error() {
        let (subscriber, rx) = ChannelSubscriber::new("stream", 2);
        drop(rx);
        let err = subscriber.on_event(event(1)).await.unwrap_err();
        assert_eq!(err.subscriber, "stream");
    }
}
