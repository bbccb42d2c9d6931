//! Run events.
//!
//! This module provides the per-run [`EventBus`], the subscriber trait and
//! its stock implementations, and the stage progress checkpoints.

mod bus;
mod channel;
mod progress;
mod subscriber;

pub use bus::{EventBus, ExecutionSummary, StageSummary};
pub use channel::{ChannelSubscriber, DeliveryMetrics};
pub use progress::{progress_for, started_progress};
pub use subscriber::{
    CollectingSubscriber, EventSubscriber, FnSubscriber, LoggingSubscriber, SharedEvent,
};
