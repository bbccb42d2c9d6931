//! Event subscriber trait and implementations.

use crate::core::PipelineEvent;
use crate::errors::SubscriberError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, Level};

/// An event shared read-only between all subscribers.
pub type SharedEvent = Arc<PipelineEvent>;

/// Receives every event of a run, in emission order.
///
/// Errors and panics are caught by the bus and logged; they never reach
/// other subscribers or the run.
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    /// Name used in logs when the subscriber fails.
    fn name(&self) -> &str {
        "subscriber"
    }

    /// Handles one event.
    ///
    /// # Errors
    ///
    /// A failure is logged by the bus and otherwise ignored.
    async fn on_event(&self, event: SharedEvent) -> Result<(), SubscriberError>;
}

/// Wraps a synchronous closure.
pub struct FnSubscriber<F>
where
    F: Fn(&PipelineEvent) + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FnSubscriber<F>
where
    F: Fn(&PipelineEvent) + Send + Sync,
{
    /// Creates a closure subscriber.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> std::fmt::Debug for FnSubscriber<F>
where
    F: Fn(&PipelineEvent) + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnSubscriber").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F> EventSubscriber for FnSubscriber<F>
where
    F: Fn(&PipelineEvent) + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn on_event(&self, event: SharedEvent) -> Result<(), SubscriberError> {
        (self.func)(&event);
        Ok(())
    }
}

/// Logs every event through `tracing`.
#[derive(Debug, Clone)]
pub struct LoggingSubscriber {
    level: Level,
}

impl Default for LoggingSubscriber {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingSubscriber {
    /// Creates a logging subscriber at the given level.
    #[must_use]
    pub const fn new(level: Level) -> Self {
        Self { level }
    }
}

#[async_trait]
impl EventSubscriber for LoggingSubscriber {
    fn name(&self) -> &str {
        "logging"
    }

    async fn on_event(&self, event: SharedEvent) -> Result<(), SubscriberError> {
        let stage = event.stage.map(|s| s.as_str()).unwrap_or("-");
        if self.level == Level::DEBUG {
            debug!(
                run_id = %event.run_id,
                sequence = event.sequence,
                kind = %event.kind,
                stage,
                progress = event.progress,
                "{}",
                event.message
            );
        } else {
            info!(
                run_id = %event.run_id,
                sequence = event.sequence,
                kind = %event.kind,
                stage,
                progress = event.progress,
                "{}",
                event.message
            );
        }
        Ok(())
    }
}

/// Collects events in memory, mostly for tests and replay tooling.
#[derive(Debug, Default, Clone)]
pub struct CollectingSubscriber {
    events: Arc<Mutex<Vec<SharedEvent>>>,
}

impl CollectingSubscriber {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Events received so far.
    #[must_use]
    pub fn events(&self) -> Vec<SharedEvent> {
        self.events.lock().clone()
    }

    /// Number of events received.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Returns true if nothing was received.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Progress values in receive order.
    #[must_use]
    pub fn progress_values(&self) -> Vec<u8> {
        self.events.lock().iter().map(|e| e.progress).collect()
    }
}

#[async_trait]
impl EventSubscriber for CollectingSubscriber {
    fn name(&self) -> &str {
        "collecting"
    }

    async fn on_event(&self, event: SharedEvent) -> Result<(), SubscriberError> {
        self.events.lock().push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RunId;
    use crate::core::EventKind;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn event(progress: u8) -> SharedEvent {
        Arc::new(PipelineEvent {
            run_id: RunId::new(),
            sequence: 1,
            kind: EventKind::StatusChanged,
            stage: None,
            message: "status".to_string(),
            progress,
            timestamp: Utc::now(),
            payload: serde_json::Value::Null,
        })
    }

    #[tokio::test]
    async fn test_fn_subscriber() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let subscriber = FnSubscriber::new("counter", move |_e| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        subscriber.on_event(event(10)).await.unwrap();
        assert_eq!(subscriber.name(), "counter");
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_collecting_subscriber() {
        let collector = CollectingSubscriber::new();
        collector.on_event(event(5)).await.unwrap();
        collector.on_event(event(15)).await.unwrap();

        assert_eq!(collector.len(), 2);
        assert_eq!(collector.progress_values(), vec![5, 15]);
    }

    #[tokio::test]
    async fn test_logging_subscriber_never_fails() {
        let subscriber = LoggingSubscriber::new(Level::DEBUG);
        assert!(subscriber.on_event(event(50)).await.is_ok());
    }
}
