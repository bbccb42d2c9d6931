//! Stage trait and implementations.
//!
//! Stages are the black-box units of work of a draftflow run. Each receives a
//! read-only [`StageInput`] view and returns a structured [`StageOutput`], or an
//! error that the runner retries and eventually records as data.

mod set;
mod summary;

pub use set::StageSet;
pub use summary::summarize;

use crate::context::StageInput;
use crate::core::StageOutput;
use async_trait::async_trait;
use std::fmt::Debug;
use std::future::Future;
use std::marker::PhantomData;

/// Trait for pipeline stages.
///
/// Implementations may fail or panic; the runner isolates both.
#[async_trait]
pub trait Stage: Send + Sync + Debug {
    /// Returns the name of the stage implementation.
    fn name(&self) -> &str;

    /// Executes the stage.
    ///
    /// # Arguments
    ///
    /// * `input` - The stage-specific view of the run
    ///
    /// # Errors
    ///
    /// Any error is treated as a failed attempt.
    async fn execute(&self, input: &StageInput) -> anyhow::Result<StageOutput>;
}

/// A simple function-based stage.
pub struct FnStage<F>
where
    F: Fn(&StageInput) -> anyhow::Result<StageOutput> + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FnStage<F>
where
    F: Fn(&StageInput) -> anyhow::Result<StageOutput> + Send + Sync,
{
    /// Creates a new function-based stage.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Debug for FnStage<F>
where
    F: Fn(&StageInput) -> anyhow::Result<StageOutput> + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStage").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F> Stage for FnStage<F>
where
    F: Fn(&StageInput) -> anyhow::Result<StageOutput> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, input: &StageInput) -> anyhow::Result<StageOutput> {
        (self.func)(input)
    }
}

/// An async function-based stage. The closure receives an owned input.
pub struct AsyncFnStage<F, Fut>
where
    F: Fn(StageInput) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<StageOutput>> + Send,
{
    name: String,
    func: F,
    _phantom: PhantomData<fn() -> Fut>,
}

impl<F, Fut> AsyncFnStage<F, Fut>
where
    F: Fn(StageInput) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<StageOutput>> + Send,
{
    /// Creates a new async function-based stage.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
            _phantom: PhantomData,
        }
    }
}

impl<F, Fut> Debug for AsyncFnStage<F, Fut>
where
    F: Fn(StageInput) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<StageOutput>> + Send,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncFnStage").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F, Fut> Stage for AsyncFnStage<F, Fut>
where
    F: Fn(StageInput) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<StageOutput>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, input: &StageInput) -> anyhow::Result<StageOutput> {
        (self.func)(input.clone()).await
    }
}

/// A stage that returns an empty output.
#[derive(Debug, Clone)]
pub struct NoOpStage {
    name: String,
}

impl NoOpStage {
    /// Creates a new no-op stage.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Stage for NoOpStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _input: &StageInput) -> anyhow::Result<StageOutput> {
        Ok(StageOutput::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{PipelineState, RunId, RunInput};
    use crate::core::StageName;

    fn test_input() -> StageInput {
        let state = PipelineState::new(RunId::new(), RunInput::new("idea"), serde_json::Value::Null, 2);
        StageInput::for_stage(StageName::Validate, &state)
    }

    #[tokio::test]
    async fn test_fn_stage() {
        let stage = FnStage::new("validator", |input| {
            Ok(StageOutput::new().with("echo", input.input().idea.clone()))
        });

        assert_eq!(stage.name(), "validator");
        let output = stage.execute(&test_input()).await.unwrap();
        assert_eq!(output.get_str("echo"), Some("idea"));
    }

    #[tokio::test]
    async fn test_fn_stage_error() {
        let stage = FnStage::new("broken", |_input| anyhow::bail!("model unavailable"));
        let err = stage.execute(&test_input()).await.unwrap_err();
        assert_eq!(err.to_string(), "model unavailable");
    }

    #[tokio::test]
    async fn test_async_fn_stage() {
        let stage = AsyncFnStage::new("async", |input: StageInput| async move {
            tokio::task::yield_now().await;
            Ok(StageOutput::new().with("stage", input.stage().as_str()))
        });

        let output = stage.execute(&test_input()).await.unwrap();
        assert_eq!(output.get_str("stage"), Some("validate"));
    }

    #[tokio::test]
    async fn test_noop_stage() {
        let stage = NoOpStage::new("noop");
        assert_eq!(stage.name(), "noop");
        assert!(stage.execute(&test_input()).await.unwrap().is_empty());
    }
}
