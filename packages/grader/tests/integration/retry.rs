use grader::GradingError;

use crate::common::{Harness, MEDIUM, ScriptedEngine, Step, submission};

#[tokio::test]
async fn single_transport_failure_is_retried() {
    let h = Harness::new(ScriptedEngine::new([Step::Fail("connection refused")]));
    let outcome = h.orchestrator.grade(&submission(MEDIUM, 10)).await.unwrap();

    assert!(outcome.all_tests_passed);
    assert_eq!(outcome.scoring.final_score, 10);
    assert_eq!(h.engine.calls(), 2);

    let requests = h.engine.requests();
    assert_eq!(requests[0].solution_id, requests[1].solution_id);
    assert_eq!(requests[0].code, requests[1].code);
    assert_eq!(requests[0].config, requests[1].config);
    assert_eq!(requests[0].test_cases, requests[1].test_cases);
    assert_eq!(h.sink.events().len(), 1);
}

#[tokio::test]
async fn second_transport_failure_is_execution_unavailable() {
    let h = Harness::new(ScriptedEngine::new([
        Step::Fail("connection refused"),
        Step::Fail("connection reset"),
    ]));
    let err = h
        .orchestrator
        .grade(&submission(MEDIUM, 10))
        .await
        .unwrap_err();

    match &err {
        GradingError::ExecutionUnavailable { attempts } => {
            assert_eq!(attempts.len(), 2);
            assert_eq!(attempts[0].attempt, 1);
            assert!(attempts[1].error.contains("connection reset"));
        }
        other => panic!("expected ExecutionUnavailable, got {other:?}"),
    }
    assert!(err.is_retryable());
    assert_eq!(err.to_error_info().code, "EXECUTION_UNAVAILABLE");

    // Never more than one retry.
    assert_eq!(h.engine.calls(), 2);
    assert!(h.sink.events().is_empty());
    assert!(h.in_flight.is_empty());
}

#[tokio::test]
async fn later_submission_after_unavailable_succeeds() {
    let h = Harness::new(ScriptedEngine::new([
        Step::Fail("connection refused"),
        Step::Fail("connection refused"),
    ]));
    assert!(h.orchestrator.grade(&submission(MEDIUM, 10)).await.is_err());

    let outcome = h.orchestrator.grade(&submission(MEDIUM, 10)).await.unwrap();
    assert!(outcome.all_tests_passed);
    assert_eq!(h.engine.calls(), 3);
}
