//! Scripted stages for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::context::StageInput;
use crate::core::StageOutput;
use crate::stages::Stage;

#[derive(Debug, Clone)]
enum Step {
    Ok(StageOutput),
    Fail(String),
    Panic(String),
}

/// A stage that plays back a script of outcomes, one per call.
///
/// Once the script runs out the last step repeats; an empty script returns
/// an empty output. Every call and the input it received are recorded.
#[derive(Debug)]
pub struct ScriptedStage {
    name: String,
    steps: Vec<Step>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    inputs: Mutex<Vec<StageInput>>,
}

impl ScriptedStage {
    /// Creates a stage with an empty script.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
            delay: None,
            calls: AtomicUsize::new(0),
            inputs: Mutex::new(Vec::new()),
        }
    }

    /// A stage that always returns `output`.
    #[must_use]
    pub fn always(name: impl Into<String>, output: StageOutput) -> Self {
        Self::new(name).then_ok(output)
    }

    /// Appends a successful call.
    #[must_use]
    pub fn then_ok(mut self, output: StageOutput) -> Self {
        self.steps.push(Step::Ok(output));
        self
    }

    /// Appends a failing call.
    #[must_use]
    pub fn then_fail(mut self, message: impl Into<String>) -> Self {
        self.steps.push(Step::Fail(message.into()));
        self
    }

    /// Appends a panicking call.
    #[must_use]
    pub fn then_panic(mut self, message: impl Into<String>) -> Self {
        self.steps.push(Step::Panic(message.into()));
        self
    }

    /// Sleeps before every call.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of calls so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Inputs received, in call order.
    #[must_use]
    pub fn inputs(&self) -> Vec<StageInput> {
        self.inputs.lock().clone()
    }

    /// Input of the most recent call.
    #[must_use]
    pub fn last_input(&self) -> Option<StageInput> {
        self.inputs.lock().last().cloned()
    }
}

#[async_trait]
impl Stage for ScriptedStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, input: &StageInput) -> anyhow::Result<StageOutput> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.inputs.lock().push(input.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match self.steps.get(call).or_else(|| self.steps.last()) {
            None => Ok(StageOutput::new()),
            Some(Step::Ok(output)) => Ok(output.clone()),
            Some(Step::Fail(message)) => Err(anyhow::anyhow!("{message}")),
            Some(Step::Panic(message)) => panic!("{message}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{PipelineState, RunId, RunInput};
    use crate::core::StageName;

    fn input() -> StageInput {
        let state = PipelineState::new(RunId::new(), RunInput::new("idea"), serde_json::Value::Null, 2);
        StageInput::for_stage(StageName::Optimize, &state)
    }

    #[tokio::test]
    async fn test_script_plays_in_order_then_repeats() {
        let stage = ScriptedStage::new("s")
            .then_fail("first")
            .then_ok(StageOutput::new().with("n", 2));

        assert!(stage.execute(&input()).await.is_err());
        assert_eq!(stage.execute(&input()).await.unwrap().get_u64("n"), Some(2));
        assert_eq!(stage.execute(&input()).await.unwrap().get_u64("n"), Some(2));
        assert_eq!(stage.calls(), 3);
        assert_eq!(stage.inputs().len(), 3);
        assert_eq!(stage.last_input().unwrap().stage(), StageName::Optimize);
    }

    #[test]
    fn test_empty_script() {
        let stage = ScriptedStage::new("empty");
        let output = tokio_test::block_on(stage.execute(&input())).unwrap();
        assert!(output.is_empty());
    }

    #[tokio::test]
    async fn test_panic_step_panics() {
        let stage = ScriptedStage::new("p").then_panic("kaboom");
        let outcome = futures::FutureExt::catch_unwind(std::panic::AssertUnwindSafe(stage.execute(&input()))).await;
        assert!(outcome.is_err());
        assert_eq!(stage.calls(), 1);
    }
}
