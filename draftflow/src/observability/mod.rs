//! Observability utilities.

mod logging;
mod timer;

pub use logging::{init_logging, LogFormat, DEFAULT_FILTER};
pub use timer::SpanTimer;
