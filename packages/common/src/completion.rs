use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::grading::SubmissionOutcome;
use crate::mq::Message;

/// Published when a student's solution passes every test of a challenge.
///
/// Delivery is at-least-once; consumers deduplicate on `solution_id`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeCompletedEvent {
    pub student_id: String,
    pub challenge_id: String,
    pub solution_id: String,
    pub experience_points_earned: i64,
    pub total_experience_points: i64,
    pub passed_tests: usize,
    pub total_tests: usize,
    pub all_tests_passed: bool,
    pub execution_time_ms: u64,
    pub completed_at: DateTime<Utc>,
}

impl ChallengeCompletedEvent {
    pub fn from_outcome(outcome: &SubmissionOutcome, completed_at: DateTime<Utc>) -> Self {
        Self {
            student_id: outcome.student_id.clone(),
            challenge_id: outcome.challenge_id.clone(),
            solution_id: outcome.solution_id.clone(),
            experience_points_earned: outcome.scoring.final_score,
            total_experience_points: outcome.scoring.base_score,
            passed_tests: outcome.execution.passed_count,
            total_tests: outcome.execution.total_count,
            all_tests_passed: outcome.all_tests_passed,
            execution_time_ms: outcome.execution.execution_time_ms,
            completed_at,
        }
    }
}

impl Message for ChallengeCompletedEvent {
    fn message_type() -> &'static str {
        "challenge_completed"
    }

    fn message_id(&self) -> &str {
        &self.solution_id
    }
}
