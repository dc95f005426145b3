use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use crate::Language;
use crate::challenge::TestCase;

/// Default wall-clock budget for untrusted code, in seconds.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
/// Default memory cap for untrusted code, in megabytes.
pub const DEFAULT_MEMORY_LIMIT_MB: u32 = 512;

/// Resource limits sent with every execution request.
///
/// Always serialized in full so the engine never falls back to its own defaults.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionLimits {
    pub timeout_seconds: u64,
    pub memory_limit_mb: u32,
    pub enable_network: bool,
    pub debug_mode: bool,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            memory_limit_mb: DEFAULT_MEMORY_LIMIT_MB,
            enable_network: false,
            debug_mode: false,
        }
    }
}

/// Failure classification reported by the execution engine.
///
/// Unknown engine codes are kept verbatim in `Other`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ExecutionErrorType {
    Timeout,
    CompilationError,
    RuntimeError,
    InfrastructureError,
    Other(String),
}

impl ExecutionErrorType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Timeout => "TIMEOUT",
            Self::CompilationError => "COMPILATION_ERROR",
            Self::RuntimeError => "RUNTIME_ERROR",
            Self::InfrastructureError => "INFRASTRUCTURE_ERROR",
            Self::Other(code) => code,
        }
    }
}

impl fmt::Display for ExecutionErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionErrorType {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "TIMEOUT" => Self::Timeout,
            "COMPILATION_ERROR" => Self::CompilationError,
            "RUNTIME_ERROR" => Self::RuntimeError,
            "INFRASTRUCTURE_ERROR" => Self::InfrastructureError,
            other => Self::Other(other.to_string()),
        })
    }
}

impl From<String> for ExecutionErrorType {
    fn from(s: String) -> Self {
        match s.parse() {
            Ok(parsed) => parsed,
            Err(never) => match never {},
        }
    }
}

impl From<ExecutionErrorType> for String {
    fn from(e: ExecutionErrorType) -> Self {
        match e {
            ExecutionErrorType::Other(code) => code,
            known => known.as_str().to_string(),
        }
    }
}

/// Request sent to the remote execution engine.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRequest {
    pub solution_id: String,
    pub challenge_id: String,
    pub student_id: String,
    pub code: String,
    pub language: Language,
    pub test_cases: Vec<TestCase>,
    pub config: ExecutionLimits,
}

/// Raw response of the remote execution engine.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExecutionResponse {
    /// The engine ran without infrastructure failure. Says nothing about tests.
    pub success: bool,
    pub approved_test_ids: Vec<String>,
    pub execution_time_ms: u64,
    pub error_type: Option<ExecutionErrorType>,
    pub error_message: Option<String>,
    pub execution_id: Option<String>,
}

/// Result of one execution attempt, normalized for aggregation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub approved_test_ids: BTreeSet<String>,
    pub total_tests: usize,
    pub execution_time_ms: u64,
    pub success: bool,
    pub error_type: Option<ExecutionErrorType>,
    pub error_message: Option<String>,
    pub execution_id: Option<String>,
}

impl ExecutionOutcome {
    /// Build an outcome from an engine response for a run of `total_tests` tests.
    pub fn from_response(response: ExecutionResponse, total_tests: usize) -> Self {
        Self {
            approved_test_ids: response.approved_test_ids.into_iter().collect(),
            total_tests,
            execution_time_ms: response.execution_time_ms,
            success: response.success,
            error_type: response.error_type,
            error_message: response.error_message,
            execution_id: response.execution_id,
        }
    }

    /// Outcome for a run cut off by the client-side deadline.
    pub fn timed_out(total_tests: usize, elapsed_ms: u64, message: impl Into<String>) -> Self {
        Self {
            approved_test_ids: BTreeSet::new(),
            total_tests,
            execution_time_ms: elapsed_ms,
            success: false,
            error_type: Some(ExecutionErrorType::Timeout),
            error_message: Some(message.into()),
            execution_id: None,
        }
    }
}
