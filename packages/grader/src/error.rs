use common::grading::GradingErrorInfo;
use common::retry::RetryAttempt;
use thiserror::Error;

use crate::scoring::ScoringError;

/// Why a grading run did not produce an outcome.
#[derive(Debug, Error)]
pub enum GradingError {
    #[error("Invalid submission: {0}")]
    InvalidSubmission(String),

    #[error("Challenge not found: {0}")]
    ChallengeNotFound(String),

    #[error("Challenge catalog unavailable: {0}")]
    CatalogUnavailable(String),

    #[error("Invalid challenge configuration: {0}")]
    InvalidChallenge(String),

    #[error("Execution engine unavailable after {} attempt(s): {}", attempts.len(), last_error(attempts))]
    ExecutionUnavailable { attempts: Vec<RetryAttempt> },

    #[error("A submission for challenge {challenge_id} by student {student_id} is already being graded")]
    SubmissionInProgress {
        student_id: String,
        challenge_id: String,
    },

    #[error("Grading cancelled")]
    Cancelled,

    #[error("Scoring invariant violated: {0}")]
    ScoringInvariantViolation(String),
}

fn last_error(attempts: &[RetryAttempt]) -> &str {
    attempts.last().map(|a| a.error.as_str()).unwrap_or("no attempt recorded")
}

impl GradingError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidSubmission(_) => "INVALID_SUBMISSION",
            Self::ChallengeNotFound(_) => "CHALLENGE_NOT_FOUND",
            Self::CatalogUnavailable(_) => "CATALOG_UNAVAILABLE",
            Self::InvalidChallenge(_) => "INVALID_CHALLENGE",
            Self::ExecutionUnavailable { .. } => "EXECUTION_UNAVAILABLE",
            Self::SubmissionInProgress { .. } => "SUBMISSION_IN_PROGRESS",
            Self::Cancelled => "CANCELLED",
            Self::ScoringInvariantViolation(_) => "SCORING_INVARIANT_VIOLATION",
        }
    }

    /// Whether resubmitting the same request later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::CatalogUnavailable(_)
                | Self::ExecutionUnavailable { .. }
                | Self::SubmissionInProgress { .. }
                | Self::Cancelled
        )
    }

    pub fn to_error_info(&self) -> GradingErrorInfo {
        GradingErrorInfo::new(self.code(), self.to_string(), self.is_retryable())
    }
}

impl From<ScoringError> for GradingError {
    fn from(e: ScoringError) -> Self {
        match e {
            ScoringError::InvalidInput(msg) => GradingError::InvalidChallenge(msg),
            ScoringError::InvariantViolation(msg) => GradingError::ScoringInvariantViolation(msg),
        }
    }
}

pub type Result<T> = std::result::Result<T, GradingError>;
