//! Remote execution of untrusted submissions.
//!
//! [`ExecutionEngine`] is the transport seam (HTTP in production, fakes in
//! tests). [`RemoteExecutionClient`] sits on top of it, fills in the resource
//! limits and enforces the client-side deadline.

pub mod http;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::Language;
use common::challenge::TestCase;
use common::execution::{ExecutionLimits, ExecutionOutcome, ExecutionRequest, ExecutionResponse};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

pub use http::HttpExecutionEngine;

/// Upper bound for a readiness probe.
pub const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(2);

/// RPC-level failure talking to the execution engine.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to connect to execution engine: {0}")]
    Connect(String),

    #[error("Execution engine returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to encode or decode execution payload: {0}")]
    Codec(String),

    #[error("Transport deadline exceeded: {0}")]
    Deadline(String),

    #[error("Transport error: {0}")]
    Other(String),
}

/// Request/response transport to a code-execution engine.
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    /// Run a submission against its test cases.
    async fn execute(&self, request: &ExecutionRequest)
    -> Result<ExecutionResponse, TransportError>;

    /// Whether the engine currently accepts work.
    async fn health(&self) -> bool;
}

pub struct RemoteExecutionClient {
    engine: Arc<dyn ExecutionEngine>,
    default_limits: ExecutionLimits,
    rpc_margin: Duration,
}

impl RemoteExecutionClient {
    /// `rpc_margin` is added to the execution timeout to form the client-side deadline.
    pub fn new(
        engine: Arc<dyn ExecutionEngine>,
        default_limits: ExecutionLimits,
        rpc_margin: Duration,
    ) -> Self {
        Self {
            engine,
            default_limits,
            rpc_margin,
        }
    }

    pub fn default_limits(&self) -> ExecutionLimits {
        self.default_limits
    }

    /// Hard deadline for one call under `limits`.
    pub fn deadline_for(&self, limits: &ExecutionLimits) -> Duration {
        Duration::from_secs(limits.timeout_seconds).saturating_add(self.rpc_margin)
    }

    /// Assemble a request, falling back to the default limits when none are given.
    pub fn build_request(
        &self,
        solution_id: &str,
        challenge_id: &str,
        student_id: &str,
        code: &str,
        language: Language,
        tests: &[TestCase],
        limits: Option<ExecutionLimits>,
    ) -> ExecutionRequest {
        ExecutionRequest {
            solution_id: solution_id.to_string(),
            challenge_id: challenge_id.to_string(),
            student_id: student_id.to_string(),
            code: code.to_string(),
            language,
            test_cases: tests.to_vec(),
            config: limits.unwrap_or(self.default_limits),
        }
    }

    /// Execute once. A deadline hit is a graded `TIMEOUT` outcome, not an error;
    /// only transport failures are returned as `Err`.
    #[instrument(
        skip_all,
        fields(
            solution_id = %request.solution_id,
            language = %request.language,
            test_count = request.test_cases.len()
        )
    )]
    pub async fn execute(
        &self,
        request: &ExecutionRequest,
    ) -> Result<ExecutionOutcome, TransportError> {
        let deadline = self.deadline_for(&request.config);
        let total_tests = request.test_cases.len();
        let started = Instant::now();

        match tokio::time::timeout(deadline, self.engine.execute(request)).await {
            Ok(Ok(response)) => {
                debug!(
                    success = response.success,
                    approved = response.approved_test_ids.len(),
                    execution_time_ms = response.execution_time_ms,
                    "Execution engine responded"
                );
                Ok(ExecutionOutcome::from_response(response, total_tests))
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                let elapsed_ms = started.elapsed().as_millis() as u64;
                warn!(
                    deadline_ms = deadline.as_millis() as u64,
                    elapsed_ms, "Execution exceeded client-side deadline"
                );
                Ok(ExecutionOutcome::timed_out(
                    total_tests,
                    elapsed_ms,
                    format!(
                        "No result within {}s (limit {}s)",
                        deadline.as_secs(),
                        request.config.timeout_seconds
                    ),
                ))
            }
        }
    }

    /// Readiness probe. Not used on the submission path.
    pub async fn is_available(&self) -> bool {
        tokio::time::timeout(HEALTH_CHECK_TIMEOUT, self.engine.health())
            .await
            .unwrap_or(false)
    }
}
