//! Fixed progress checkpoints per stage.

use crate::core::StageName;

/// Progress reported when a stage completes.
#[must_use]
pub const fn progress_for(stage: StageName) -> u8 {
    match stage {
        StageName::Validate => 15,
        StageName::Strategize => 30,
        StageName::Write => 55,
        StageName::Visual => 75,
        StageName::Optimize => 90,
        StageName::Finalize => 100,
    }
}

/// Progress reported when a stage starts: ten points below its checkpoint.
#[must_use]
pub const fn started_progress(stage: StageName) -> u8 {
    progress_for(stage).saturating_sub(10)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkpoints_increase_in_graph_order() {
        let checkpoints: Vec<u8> = StageName::ALL.iter().map(|s| progress_for(*s)).collect();
        assert_eq!(checkpoints, vec![15, 30, 55, 75, 90, 100]);
        assert!(checkpoints.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_started_progress() {
        assert_eq!(started_progress(StageName::Validate), 5);
        assert_eq!(started_progress(StageName::Write), 45);
    }
}
