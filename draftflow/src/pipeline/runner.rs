//! Executes one stage with timing, retries and failure isolation.

use super::RetryPolicy;
use crate::cancellation::CancellationToken;
use crate::context::StageInput;
use crate::core::{StageName, StageOutput, StageResult};
use crate::events::EventBus;
use crate::observability::SpanTimer;
use crate::stages::{summarize, Stage};
use chrono::Utc;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use tracing::{debug, info, warn};

/// Runs stages under a retry policy.
///
/// `run` never fails: errors, panics and timeouts of the stage are folded
/// into a single [`StageResult`] with `status = error`.
#[derive(Debug, Clone, Default)]
pub struct StageRunner {
    policy: RetryPolicy,
}

impl StageRunner {
    /// Creates a runner.
    #[must_use]
    pub const fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// The retry policy in use.
    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Runs `stage` once, with retries, emitting exactly one start and one
    /// finish event on `bus`.
    pub async fn run(
        &self,
        name: StageName,
        stage: &dyn Stage,
        input: &StageInput,
        bus: &EventBus,
        cancel: &CancellationToken,
    ) -> StageResult {
        let run_id = input.run_id();
        bus.stage_started(name).await;

        let timer = SpanTimer::start(name.as_str());
        let started_at = Utc::now();
        let mut attempt = 0;

        let result = loop {
            attempt += 1;
            debug!(%run_id, stage = %name, attempt, implementation = stage.name(), "Running stage");

            let error = match self.attempt(stage, input).await {
                Ok(output) => {
                    let summary = summarize(name, &output);
                    break StageResult::success(name, output, attempt, timer.elapsed_ms(), started_at)
                        .with_summary(summary);
                }
                Err(error) => error,
            };

            warn!(%run_id, stage = %name, attempt, error = %error, "Stage attempt failed");

            if !self.policy.should_retry(attempt) {
                break StageResult::failure(name, error, attempt, timer.elapsed_ms(), started_at);
            }

            let delay = self.policy.delay_for(attempt);
            debug!(
                %run_id,
                stage = %name,
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "Retrying after error"
            );

            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = cancel.cancelled() => {
                    let reason = cancel.reason().unwrap_or_default();
                    break StageResult::failure(
                        name,
                        format!("{error} (retries abandoned: cancelled: {reason})"),
                        attempt,
                        timer.elapsed_ms(),
                        started_at,
                    );
                }
            }
        };

        let elapsed_ms = timer.finish();
        info!(
            %run_id,
            stage = %name,
            status = %result.status,
            attempts = result.attempts,
            elapsed_ms,
            "Stage finished"
        );

        bus.stage_finished(&result).await;
        result
    }

    async fn attempt(&self, stage: &dyn Stage, input: &StageInput) -> Result<StageOutput, String> {
        let call = AssertUnwindSafe(stage.execute(input)).catch_unwind();

        let outcome = match self.policy.attempt_timeout() {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    return Err(format!("attempt timed out after {}ms", limit.as_millis()));
                }
            },
            None => call.await,
        };

        match outcome {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(err)) => Err(format!("{err:#}")),
            Err(panic) => Err(format!("stage panicked: {}", panic_message(panic.as_ref()))),
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
