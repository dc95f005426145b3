use common::grading::{GradingReport, GradingRequest};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::orchestrator::GradingOrchestrator;

/// Grade a queued request and wrap the result in a report for the result queue.
#[instrument(skip_all, fields(request_id = %request.request_id))]
pub async fn handle_grading_request(
    orchestrator: &GradingOrchestrator,
    request: &GradingRequest,
    cancel: &CancellationToken,
) -> GradingReport {
    match orchestrator.grade_with_cancellation(request, cancel).await {
        Ok(outcome) => GradingReport::completed(request, outcome),
        Err(e) => GradingReport::failed(request, e.to_error_info()),
    }
}
