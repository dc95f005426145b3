//! Difficulty-aware, time-penalized scoring.
//!
//! Pure functions only: no I/O, no state. Scoring is binary before the time
//! penalty (all tests pass or the score is zero), and a completed challenge
//! never earns less than [`MINIMUM_MULTIPLIER`] percent of its base score.

use common::Difficulty;
use common::scoring::{MINIMUM_MULTIPLIER, ScoringResult};
use thiserror::Error;
use tracing::error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScoringError {
    #[error("Invalid scoring input: {0}")]
    InvalidInput(String),

    #[error("Scoring invariant violated: {0}")]
    InvariantViolation(String),
}

/// Parse a difficulty name coming from an untyped source. A missing name is
/// invalid input, as is an unknown one.
pub fn parse_difficulty(name: Option<&str>) -> Result<Difficulty, ScoringError> {
    let name = name.ok_or_else(|| ScoringError::InvalidInput("difficulty is missing".into()))?;
    name.parse()
        .map_err(|e: common::difficulty::ParseDifficultyError| {
            ScoringError::InvalidInput(e.to_string())
        })
}

/// Multiplier (percent) earned by a completed solve after `time_taken_seconds`.
///
/// Threshold bounds are inclusive on the lower tier.
pub fn time_multiplier(difficulty: Difficulty, time_taken_seconds: i64) -> u8 {
    let t = difficulty.thresholds();
    if time_taken_seconds <= t.grace {
        100
    } else if time_taken_seconds <= t.medium {
        80
    } else if time_taken_seconds <= t.heavy {
        60
    } else if time_taken_seconds <= t.maximum {
        40
    } else {
        MINIMUM_MULTIPLIER
    }
}

/// Compute the score of one submission.
pub fn calculate_score(
    base_score: i64,
    difficulty: Difficulty,
    time_taken_seconds: i64,
    all_tests_passed: bool,
) -> Result<ScoringResult, ScoringError> {
    if base_score < 0 {
        return Err(ScoringError::InvalidInput(format!(
            "base score must not be negative, got {base_score}"
        )));
    }
    if time_taken_seconds < 0 {
        return Err(ScoringError::InvalidInput(format!(
            "time taken must not be negative, got {time_taken_seconds}s"
        )));
    }

    let result = if base_score == 0 {
        ScoringResult {
            base_score,
            time_taken_seconds,
            score_multiplier: 100,
            final_score: 0,
            penalty_applied: false,
        }
    } else if !all_tests_passed {
        ScoringResult {
            base_score,
            time_taken_seconds,
            score_multiplier: 0,
            final_score: 0,
            penalty_applied: false,
        }
    } else {
        let multiplier = time_multiplier(difficulty, time_taken_seconds);
        ScoringResult {
            base_score,
            time_taken_seconds,
            score_multiplier: multiplier,
            final_score: base_score * i64::from(multiplier) / 100,
            penalty_applied: multiplier < 100,
        }
    };

    if let Some(violation) = result.invariant_violation() {
        error!(
            base_score,
            %difficulty,
            time_taken_seconds,
            all_tests_passed,
            violation = %violation,
            "Scoring produced an invalid result"
        );
        return Err(ScoringError::InvariantViolation(violation));
    }

    Ok(result)
}

/// Human-readable rationale for a score. Display only.
pub fn explain(result: &ScoringResult, difficulty: Difficulty) -> String {
    let name = difficulty.as_str().to_lowercase();
    match result.score_multiplier {
        100 => format!(
            "Solved the {name} challenge within the grace period: full {} points awarded.",
            result.final_score
        ),
        80 => format!(
            "Solved the {name} challenge after the grace period: 20% time penalty, {} of {} points.",
            result.final_score, result.base_score
        ),
        60 => format!(
            "Solved the {name} challenge late: 40% time penalty, {} of {} points.",
            result.final_score, result.base_score
        ),
        40 => format!(
            "Solved the {name} challenge very late: 60% time penalty, {} of {} points.",
            result.final_score, result.base_score
        ),
        20 => format!(
            "Solved the {name} challenge past every time threshold: minimum 20% guaranteed, {} of {} points.",
            result.final_score, result.base_score
        ),
        _ => format!("Not all tests of the {name} challenge passed: no points awarded."),
    }
}
