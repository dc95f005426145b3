use serde::{Deserialize, Serialize};

/// Multiplier applied however long a completed solve took.
pub const MINIMUM_MULTIPLIER: u8 = 20;

/// Score of one graded submission.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringResult {
    pub base_score: i64,
    pub time_taken_seconds: i64,
    /// Percent applied to `base_score`.
    pub score_multiplier: u8,
    /// `floor(base_score * score_multiplier / 100)`.
    pub final_score: i64,
    pub penalty_applied: bool,
}

impl ScoringResult {
    /// Describe the first broken invariant, if any.
    pub fn invariant_violation(&self) -> Option<String> {
        if self.time_taken_seconds < 0 {
            return Some(format!(
                "time_taken_seconds is negative ({})",
                self.time_taken_seconds
            ));
        }
        if self.score_multiplier > 100 {
            return Some(format!(
                "score_multiplier {} exceeds 100",
                self.score_multiplier
            ));
        }
        if self.final_score < 0 || self.final_score > self.base_score {
            return Some(format!(
                "final_score {} outside [0, {}]",
                self.final_score, self.base_score
            ));
        }
        let expected = self.base_score * i64::from(self.score_multiplier) / 100;
        if self.base_score > 0 && self.final_score != expected {
            return Some(format!(
                "final_score {} does not match base {} at {}%",
                self.final_score, self.base_score, self.score_multiplier
            ));
        }
        None
    }
}
