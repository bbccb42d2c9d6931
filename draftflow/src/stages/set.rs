//! The fixed set of stage implementations a run dispatches to.

use super::Stage;
use crate::core::StageName;
use std::sync::Arc;

/// One implementation per executable stage.
///
/// `finalize` is pure assembly inside the engine and has no slot here.
#[derive(Debug, Clone)]
pub struct StageSet {
    validate: Arc<dyn Stage>,
    strategize: Arc<dyn Stage>,
    write: Arc<dyn Stage>,
    visual: Arc<dyn Stage>,
    optimize: Arc<dyn Stage>,
}

impl StageSet {
    /// Creates a stage set.
    pub fn new(
        validate: impl Stage + 'static,
        strategize: impl Stage + 'static,
        write: impl Stage + 'static,
        visual: impl Stage + 'static,
        optimize: impl Stage + 'static,
    ) -> Self {
        Self {
            validate: Arc::new(validate),
            strategize: Arc::new(strategize),
            write: Arc::new(write),
            visual: Arc::new(visual),
            optimize: Arc::new(optimize),
        }
    }

    /// Creates a stage set from shared implementations.
    #[must_use]
    pub fn from_shared(
        validate: Arc<dyn Stage>,
        strategize: Arc<dyn Stage>,
        write: Arc<dyn Stage>,
        visual: Arc<dyn Stage>,
        optimize: Arc<dyn Stage>,
    ) -> Self {
        Self {
            validate,
            strategize,
            write,
            visual,
            optimize,
        }
    }

    /// Replaces the implementation of one stage. Ignored for `finalize`.
    #[must_use]
    pub fn with_stage(mut self, name: StageName, stage: Arc<dyn Stage>) -> Self {
        match name {
            StageName::Validate => self.validate = stage,
            StageName::Strategize => self.strategize = stage,
            StageName::Write => self.write = stage,
            StageName::Visual => self.visual = stage,
            StageName::Optimize => self.optimize = stage,
            StageName::Finalize => {
                tracing::warn!("finalize is assembled by the engine; replacement ignored");
            }
        }
        self
    }

    /// Returns the implementation for a stage, `None` for `finalize`.
    #[must_use]
    pub fn get(&self, name: StageName) -> Option<&Arc<dyn Stage>> {
        match name {
            StageName::Validate => Some(&self.validate),
            StageName::Strategize => Some(&self.strategize),
            StageName::Write => Some(&self.write),
            StageName::Visual => Some(&self.visual),
            StageName::Optimize => Some(&self.optimize),
            StageName::Finalize => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::NoOpStage;

    fn set() -> StageSet {
        StageSet::new(
            NoOpStage::new("v"),
            NoOpStage::new("s"),
            NoOpStage::new("w"),
            NoOpStage::new("vis"),
            NoOpStage::new("o"),
        )
    }

    #[test]
    fn test_dispatch_by_name() {
        let stages = set();
        assert_eq!(stages.get(StageName::Write).unwrap().name(), "w");
        assert_eq!(stages.get(StageName::Optimize).unwrap().name(), "o");
        assert!(stages.get(StageName::Finalize).is_none());
    }

    #[test]
    fn test_with_stage_replaces() {
        let stages = set().with_stage(StageName::Visual, Arc::new(NoOpStage::new("carousel")));
        assert_eq!(stages.get(StageName::Visual).unwrap().name(), "carousel");
    }
}
