//! Cooperative cancellation of runs.

mod token;

pub use token::CancellationToken;
