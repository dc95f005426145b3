use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::execution::{ExecutionErrorType, ExecutionLimits};
use crate::mq::Message;
use crate::scoring::ScoringResult;

/// Stage of a single grading run.
///
/// Runs move strictly forward through
/// `Received → TestsFetched → Executed → Aggregated → Scored → Notified → Done`;
/// `Failed` is reachable from any non-terminal stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GradingState {
    Received,
    TestsFetched,
    Executed,
    Aggregated,
    Scored,
    Notified,
    Done,
    Failed,
}

impl GradingState {
    pub const ALL: &'static [GradingState] = &[
        Self::Received,
        Self::TestsFetched,
        Self::Executed,
        Self::Aggregated,
        Self::Scored,
        Self::Notified,
        Self::Done,
        Self::Failed,
    ];

    /// The only state a successful run may move to next.
    pub fn successor(&self) -> Option<GradingState> {
        match self {
            Self::Received => Some(Self::TestsFetched),
            Self::TestsFetched => Some(Self::Executed),
            Self::Executed => Some(Self::Aggregated),
            Self::Aggregated => Some(Self::Scored),
            Self::Scored => Some(Self::Notified),
            Self::Notified => Some(Self::Done),
            Self::Done | Self::Failed => None,
        }
    }

    pub fn can_transition_to(&self, next: GradingState) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == Self::Failed || self.successor() == Some(next)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "RECEIVED",
            Self::TestsFetched => "TESTS_FETCHED",
            Self::Executed => "EXECUTED",
            Self::Aggregated => "AGGREGATED",
            Self::Scored => "SCORED",
            Self::Notified => "NOTIFIED",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for GradingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error when parsing an invalid grading state string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseGradingStateError {
    invalid: String,
}

impl fmt::Display for ParseGradingStateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid grading state '{}'", self.invalid)
    }
}

impl std::error::Error for ParseGradingStateError {}

impl FromStr for GradingState {
    type Err = ParseGradingStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| ParseGradingStateError {
                invalid: s.to_string(),
            })
    }
}

/// A student's submission, as handed to the grading pipeline.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GradingRequest {
    /// Request identifier (UUID)
    pub request_id: String,
    pub solution_id: String,
    pub challenge_id: String,
    /// Code version whose fixed test set is used.
    pub code_version_id: String,
    pub student_id: String,
    pub code: String,
    /// Language name as submitted; validated by the grader.
    pub language: String,
    /// When the submission was received. Elapsed time is measured from here.
    pub received_at: DateTime<Utc>,
    /// Per-request override of the default execution limits.
    #[serde(default)]
    pub limits: Option<ExecutionLimits>,
}

impl GradingRequest {
    /// Create a request received now, with a generated UUID.
    pub fn new(
        solution_id: impl Into<String>,
        challenge_id: impl Into<String>,
        code_version_id: impl Into<String>,
        student_id: impl Into<String>,
        code: impl Into<String>,
        language: impl Into<String>,
    ) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            solution_id: solution_id.into(),
            challenge_id: challenge_id.into(),
            code_version_id: code_version_id.into(),
            student_id: student_id.into(),
            code: code.into(),
            language: language.into(),
            received_at: Utc::now(),
            limits: None,
        }
    }

    pub fn with_limits(mut self, limits: ExecutionLimits) -> Self {
        self.limits = Some(limits);
        self
    }

    pub fn received_at(mut self, received_at: DateTime<Utc>) -> Self {
        self.received_at = received_at;
        self
    }
}

impl Message for GradingRequest {
    fn message_type() -> &'static str {
        "grading_request"
    }

    fn message_id(&self) -> &str {
        &self.request_id
    }
}

/// Aggregated view of one execution against the challenge's test set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    /// Engine healthy and every test of the set approved.
    pub all_passed: bool,
    pub passed_count: usize,
    pub total_count: usize,
    /// Whether the engine itself ran without infrastructure failure.
    pub engine_success: bool,
    pub execution_time_ms: u64,
    pub error_type: Option<ExecutionErrorType>,
    pub error_message: Option<String>,
    pub execution_id: Option<String>,
    pub passed_test_ids: Vec<String>,
    pub failed_test_ids: Vec<String>,
}

/// Final product of one grading run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SubmissionOutcome {
    pub challenge_id: String,
    pub student_id: String,
    pub solution_id: String,
    pub execution: ExecutionSummary,
    pub scoring: ScoringResult,
    pub all_tests_passed: bool,
    /// Human-readable rationale for the multiplier.
    pub explanation: String,
}

/// Machine-readable description of a failed grading run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradingErrorInfo {
    /// Stable error code (e.g., "INVALID_SUBMISSION", "EXECUTION_UNAVAILABLE").
    pub code: String,
    pub message: String,
    /// Whether the caller may submit the same request again later.
    pub retryable: bool,
}

impl GradingErrorInfo {
    pub fn new(code: impl Into<String>, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            retryable,
        }
    }
}

/// Report published by the grader after handling a queued request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GradingReport {
    pub request_id: String,
    pub solution_id: String,
    pub outcome: Option<SubmissionOutcome>,
    pub error: Option<GradingErrorInfo>,
}

impl GradingReport {
    pub fn completed(request: &GradingRequest, outcome: SubmissionOutcome) -> Self {
        Self {
            request_id: request.request_id.clone(),
            solution_id: request.solution_id.clone(),
            outcome: Some(outcome),
            error: None,
        }
    }

    pub fn failed(request: &GradingRequest, error: GradingErrorInfo) -> Self {
        Self {
            request_id: request.request_id.clone(),
            solution_id: request.solution_id.clone(),
            outcome: None,
            error: Some(error),
        }
    }
}

impl Message for GradingReport {
    fn message_type() -> &'static str {
        "grading_report"
    }

    fn message_id(&self) -> &str {
        &self.request_id
    }
}
