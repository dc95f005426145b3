//! Drives one submission through fetch, execute, aggregate, score and notify.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use common::challenge::{ChallengeScoringInfo, GradingCodeVersion, TestCase};
use common::completion::ChallengeCompletedEvent;
use common::execution::{ExecutionLimits, ExecutionOutcome};
use common::grading::{GradingRequest, SubmissionOutcome};
use common::retry::{RetryBudget, RetryDecision, calculate_backoff};
use common::{GradingState, Language};
use tokio::time::error::Elapsed;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, instrument, warn};

use crate::aggregator::aggregate;
use crate::catalog::{CatalogError, ChallengeCatalog};
use crate::config::GraderAppConfig;
use crate::error::{GradingError, Result};
use crate::execution::RemoteExecutionClient;
use crate::in_flight::{InFlightKey, InFlightRegistry};
use crate::notify::CompletionSink;
use crate::scoring::{calculate_score, explain};

/// Transport failures are retried exactly once.
pub const EXECUTION_MAX_RETRIES: u8 = 1;

const MAX_RETRY_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub max_code_bytes: usize,
    pub max_timeout_seconds: u64,
    pub max_memory_limit_mb: u32,
    pub catalog_timeout: Duration,
    pub publish_timeout: Duration,
    pub retry_base_delay: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_code_bytes: 64 * 1024,
            max_timeout_seconds: 300,
            max_memory_limit_mb: 4096,
            catalog_timeout: Duration::from_secs(2),
            publish_timeout: Duration::from_secs(2),
            retry_base_delay: Duration::from_millis(250),
        }
    }
}

impl From<&GraderAppConfig> for OrchestratorSettings {
    fn from(config: &GraderAppConfig) -> Self {
        Self {
            max_code_bytes: config.grader.max_code_bytes,
            max_timeout_seconds: config.execution.max_timeout_seconds,
            max_memory_limit_mb: config.execution.max_memory_limit_mb,
            catalog_timeout: config.catalog.timeout(),
            publish_timeout: config.events.publish_timeout(),
            retry_base_delay: Duration::from_millis(config.execution.retry_delay_ms),
        }
    }
}

/// Tracks the state of one grading run and logs each transition.
#[derive(Debug)]
struct GradingRun {
    state: GradingState,
}

impl GradingRun {
    fn new() -> Self {
        debug!(state = %GradingState::Received, "Grading run started");
        Self {
            state: GradingState::Received,
        }
    }

    fn advance(&mut self, next: GradingState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        debug!(from = %self.state, to = %next, "Grading state transition");
        self.state = next;
    }

    fn fail(&mut self, err: &GradingError) {
        let failed_at = self.state;
        self.state = GradingState::Failed;
        match err {
            GradingError::ScoringInvariantViolation(_) => {
                error!(failed_at = %failed_at, code = err.code(), error = %err, "Grading failed")
            }
            _ => warn!(failed_at = %failed_at, code = err.code(), error = %err, "Grading failed"),
        }
    }

    fn state(&self) -> GradingState {
        self.state
    }
}

pub struct GradingOrchestrator {
    catalog: Arc<dyn ChallengeCatalog>,
    executor: RemoteExecutionClient,
    sink: Arc<dyn CompletionSink>,
    in_flight: Arc<InFlightRegistry>,
    settings: OrchestratorSettings,
}

impl GradingOrchestrator {
    pub fn new(
        catalog: Arc<dyn ChallengeCatalog>,
        executor: RemoteExecutionClient,
        sink: Arc<dyn CompletionSink>,
        in_flight: Arc<InFlightRegistry>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            catalog,
            executor,
            sink,
            in_flight,
            settings,
        }
    }

    /// Readiness of the execution engine. Never called while grading.
    pub async fn is_available(&self) -> bool {
        self.executor.is_available().await
    }

    pub async fn grade(&self, request: &GradingRequest) -> Result<SubmissionOutcome> {
        self.grade_with_cancellation(request, &CancellationToken::new())
            .await
    }

    /// Grade a submission. Cancelling `cancel` before execution has returned
    /// aborts the run with [`GradingError::Cancelled`]; later it is ignored.
    #[instrument(
        skip_all,
        fields(
            request_id = %request.request_id,
            solution_id = %request.solution_id,
            challenge_id = %request.challenge_id,
            student_id = %request.student_id
        )
    )]
    pub async fn grade_with_cancellation(
        &self,
        request: &GradingRequest,
        cancel: &CancellationToken,
    ) -> Result<SubmissionOutcome> {
        let mut run = GradingRun::new();
        let result = self.run_pipeline(&mut run, request, cancel).await;
        match &result {
            Ok(outcome) => info!(
                final_score = outcome.scoring.final_score,
                multiplier = outcome.scoring.score_multiplier,
                passed = outcome.execution.passed_count,
                total = outcome.execution.total_count,
                "Grading completed"
            ),
            Err(e) => run.fail(e),
        }
        result
    }

    async fn run_pipeline(
        &self,
        run: &mut GradingRun,
        request: &GradingRequest,
        cancel: &CancellationToken,
    ) -> Result<SubmissionOutcome> {
        let language = self.validate(request)?;
        let limits = request
            .limits
            .unwrap_or_else(|| self.executor.default_limits());

        // Held until this function returns, on every path.
        let _guard = self
            .in_flight
            .try_acquire(
                InFlightKey::new(&request.student_id, &request.challenge_id),
                Duration::from_secs(limits.timeout_seconds),
            )
            .ok_or_else(|| GradingError::SubmissionInProgress {
                student_id: request.student_id.clone(),
                challenge_id: request.challenge_id.clone(),
            })?;

        let (code_version, scoring_info) = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(GradingError::Cancelled),
            fetched = self.fetch_challenge(request) => fetched?,
        };
        check_challenge(language, &code_version, &scoring_info)?;
        run.advance(GradingState::TestsFetched);

        let outcome = self
            .execute_with_retry(request, language, &code_version.tests, limits, cancel)
            .await?;
        let completed_at = Utc::now();
        run.advance(GradingState::Executed);

        let summary = aggregate(&outcome, &code_version.tests);
        run.advance(GradingState::Aggregated);

        let time_taken_seconds = elapsed_seconds(request.received_at, completed_at);
        let scoring = calculate_score(
            scoring_info.base_score,
            scoring_info.difficulty,
            time_taken_seconds,
            summary.all_passed,
        )?;
        let explanation = explain(&scoring, scoring_info.difficulty);
        run.advance(GradingState::Scored);

        let submission = SubmissionOutcome {
            challenge_id: request.challenge_id.clone(),
            student_id: request.student_id.clone(),
            solution_id: request.solution_id.clone(),
            all_tests_passed: summary.all_passed,
            execution: summary,
            scoring,
            explanation,
        };

        if submission.all_tests_passed {
            self.publish_completion(&submission, completed_at).await;
        }
        run.advance(GradingState::Notified);

        run.advance(GradingState::Done);
        Ok(submission)
    }

    fn validate(&self, request: &GradingRequest) -> Result<Language> {
        for (name, value) in [
            ("solution id", &request.solution_id),
            ("challenge id", &request.challenge_id),
            ("code version id", &request.code_version_id),
            ("student id", &request.student_id),
        ] {
            if value.trim().is_empty() {
                return Err(GradingError::InvalidSubmission(format!(
                    "{name} must not be empty"
                )));
            }
        }

        if request.code.trim().is_empty() {
            return Err(GradingError::InvalidSubmission(
                "code must not be empty".into(),
            ));
        }
        if request.code.len() > self.settings.max_code_bytes {
            return Err(GradingError::InvalidSubmission(format!(
                "code is {} bytes, limit is {}",
                request.code.len(),
                self.settings.max_code_bytes
            )));
        }

        if let Some(limits) = &request.limits {
            if limits.timeout_seconds == 0 || limits.memory_limit_mb == 0 {
                return Err(GradingError::InvalidSubmission(
                    "execution limits must be positive".into(),
                ));
            }
            if limits.timeout_seconds > self.settings.max_timeout_seconds {
                return Err(GradingError::InvalidSubmission(format!(
                    "timeout of {}s exceeds the {}s limit",
                    limits.timeout_seconds, self.settings.max_timeout_seconds
                )));
            }
            if limits.memory_limit_mb > self.settings.max_memory_limit_mb {
                return Err(GradingError::InvalidSubmission(format!(
                    "memory limit of {}MB exceeds the {}MB limit",
                    limits.memory_limit_mb, self.settings.max_memory_limit_mb
                )));
            }
        }

        request
            .language
            .parse::<Language>()
            .map_err(|e| GradingError::InvalidSubmission(e.to_string()))
    }

    async fn fetch_challenge(
        &self,
        request: &GradingRequest,
    ) -> Result<(GradingCodeVersion, ChallengeScoringInfo)> {
        let timeout = self.settings.catalog_timeout;
        let (code_version, scoring_info) = tokio::join!(
            tokio::time::timeout(
                timeout,
                self.catalog
                    .get_code_version_for_grading(&request.code_version_id)
            ),
            tokio::time::timeout(
                timeout,
                self.catalog.get_challenge_scoring_info(&request.challenge_id)
            ),
        );

        let code_version = catalog_result(code_version, "code version", timeout)?;
        let scoring_info = catalog_result(scoring_info, "challenge scoring info", timeout)?;
        debug!(
            tests = code_version.tests.len(),
            base_score = scoring_info.base_score,
            difficulty = %scoring_info.difficulty,
            "Fetched challenge"
        );
        Ok((code_version, scoring_info))
    }

    async fn execute_with_retry(
        &self,
        request: &GradingRequest,
        language: Language,
        tests: &[TestCase],
        limits: ExecutionLimits,
        cancel: &CancellationToken,
    ) -> Result<ExecutionOutcome> {
        let exec_request = self.executor.build_request(
            &request.solution_id,
            &request.challenge_id,
            &request.student_id,
            &request.code,
            language,
            tests,
            Some(limits),
        );
        let mut budget = RetryBudget::new(EXECUTION_MAX_RETRIES);

        loop {
            let attempt = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(GradingError::Cancelled),
                result = self.executor.execute(&exec_request) => result,
            };

            let err = match attempt {
                Ok(outcome) => return Ok(outcome),
                Err(e) => e,
            };

            match budget.record_failure(err.to_string()) {
                RetryDecision::Retry { attempt } => {
                    let delay = calculate_backoff(
                        attempt,
                        self.settings.retry_base_delay.as_millis() as u64,
                        MAX_RETRY_DELAY.as_millis() as u64,
                    );
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Execution transport failed, retrying"
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(GradingError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                RetryDecision::Exhausted { history } => {
                    return Err(GradingError::ExecutionUnavailable { attempts: history });
                }
            }
        }
    }

    /// Publish within the configured timeout. Past it the publish keeps running
    /// detached; grading never waits longer and never fails on it.
    async fn publish_completion(&self, outcome: &SubmissionOutcome, completed_at: DateTime<Utc>) {
        let event = ChallengeCompletedEvent::from_outcome(outcome, completed_at);
        let sink = Arc::clone(&self.sink);
        let mut task = tokio::spawn(
            async move {
                match sink.publish(&event).await {
                    Ok(()) => debug!("Published completion event"),
                    Err(e) => warn!(error = %e, "Failed to publish completion event"),
                }
            }
            .in_current_span(),
        );

        let timeout = self.settings.publish_timeout;
        match tokio::time::timeout(timeout, &mut task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Completion publish task failed"),
            Err(_) => warn!(
                timeout_ms = timeout.as_millis() as u64,
                "Completion event still publishing; continuing without it"
            ),
        }
    }
}

fn catalog_result<T>(
    result: std::result::Result<std::result::Result<T, CatalogError>, Elapsed>,
    what: &str,
    timeout: Duration,
) -> Result<T> {
    match result {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e @ CatalogError::NotFound { .. })) => {
            Err(GradingError::ChallengeNotFound(e.to_string()))
        }
        Ok(Err(e @ CatalogError::Invalid { .. })) => {
            Err(GradingError::InvalidChallenge(e.to_string()))
        }
        Ok(Err(e)) => Err(GradingError::CatalogUnavailable(e.to_string())),
        Err(_) => Err(GradingError::CatalogUnavailable(format!(
            "{what} lookup timed out after {}ms",
            timeout.as_millis()
        ))),
    }
}

fn check_challenge(
    language: Language,
    code_version: &GradingCodeVersion,
    scoring_info: &ChallengeScoringInfo,
) -> Result<()> {
    if code_version.language != language {
        return Err(GradingError::InvalidSubmission(format!(
            "submitted {language} code for a {} code version",
            code_version.language
        )));
    }
    if scoring_info.base_score < 0 {
        return Err(GradingError::InvalidChallenge(format!(
            "negative base score {}",
            scoring_info.base_score
        )));
    }
    let max = scoring_info.difficulty.max_base_score();
    if scoring_info.base_score > max {
        warn!(
            base_score = scoring_info.base_score,
            max_base_score = max,
            difficulty = %scoring_info.difficulty,
            "Base score exceeds the difficulty's maximum"
        );
    }
    if code_version.tests.is_empty() {
        warn!("Code version has no tests; the submission cannot pass");
    }
    Ok(())
}

/// Whole seconds between receipt and execution completion, never negative.
fn elapsed_seconds(received_at: DateTime<Utc>, completed_at: DateTime<Utc>) -> i64 {
    (completed_at - received_at).num_seconds().max(0)
}
