use std::collections::BTreeSet;

use common::challenge::TestCase;
use common::execution::ExecutionOutcome;
use common::grading::ExecutionSummary;
use tracing::warn;

/// Reduce an execution outcome to pass/fail counts over the given test set.
///
/// - Approved ids not in `test_cases` are ignored.
/// - An empty test set never passes.
/// - An engine failure (`success == false`) never passes, even if every id
///   was approved.
pub fn aggregate(outcome: &ExecutionOutcome, test_cases: &[TestCase]) -> ExecutionSummary {
    let known_ids: BTreeSet<&str> = test_cases.iter().map(|tc| tc.id.as_str()).collect();

    let passed_test_ids: Vec<String> = outcome
        .approved_test_ids
        .iter()
        .filter(|id| known_ids.contains(id.as_str()))
        .cloned()
        .collect();

    let foreign = outcome.approved_test_ids.len() - passed_test_ids.len();
    if foreign > 0 {
        warn!(
            foreign,
            execution_id = ?outcome.execution_id,
            "Engine approved test ids outside the current test set; ignoring them"
        );
    }

    let failed_test_ids: Vec<String> = test_cases
        .iter()
        .filter(|tc| !outcome.approved_test_ids.contains(&tc.id))
        .map(|tc| tc.id.clone())
        .collect();

    let total_count = test_cases.len();
    let passed_count = passed_test_ids.len();
    let all_passed = total_count > 0 && outcome.success && passed_count == total_count;

    ExecutionSummary {
        all_passed,
        passed_count,
        total_count,
        engine_success: outcome.success,
        execution_time_ms: outcome.execution_time_ms,
        error_type: outcome.error_type.clone(),
        error_message: outcome.error_message.clone(),
        execution_id: outcome.execution_id.clone(),
        passed_test_ids,
        failed_test_ids,
    }
}
