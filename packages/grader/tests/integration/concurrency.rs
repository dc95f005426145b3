use common::grading::GradingRequest;
use grader::GradingError;
use tokio_util::sync::CancellationToken;

use crate::common::{
    HARD, Harness, MEDIUM, RecordingSink, ScriptedEngine, SinkMode, Step, submission,
};

fn for_student(student_id: &str, challenge_id: &str) -> GradingRequest {
    let mut request = submission(challenge_id, 10);
    request.student_id = student_id.into();
    request
}

mod in_flight_guard {
    use super::*;

    #[tokio::test]
    async fn duplicate_submission_is_rejected_while_first_runs() {
        let h = Harness::new(ScriptedEngine::new([Step::Block]));

        let orchestrator = h.orchestrator.clone();
        let first = tokio::spawn(async move {
            orchestrator.grade(&submission(MEDIUM, 10)).await
        });
        h.engine.entered.notified().await;

        let err = h
            .orchestrator
            .grade(&submission(MEDIUM, 10))
            .await
            .unwrap_err();
        assert!(matches!(err, GradingError::SubmissionInProgress { .. }));
        assert!(err.is_retryable());

        h.engine.release();
        let outcome = first.await.unwrap().unwrap();
        assert!(outcome.all_tests_passed);
        assert_eq!(h.engine.calls(), 1);
        assert_eq!(h.sink.events().len(), 1);

        // Released on completion.
        assert!(h.in_flight.is_empty());
        assert!(h.orchestrator.grade(&submission(MEDIUM, 10)).await.is_ok());
    }

    #[tokio::test]
    async fn panic_in_execution_releases_the_claim() {
        let h = Harness::new(ScriptedEngine::new([Step::Panic]));

        let orchestrator = h.orchestrator.clone();
        let err = tokio::spawn(async move { orchestrator.grade(&submission(MEDIUM, 10)).await })
            .await
            .unwrap_err();
        assert!(err.is_panic());
        assert!(h.in_flight.is_empty());
        assert!(h.sink.events().is_empty());

        let outcome = h.orchestrator.grade(&submission(MEDIUM, 10)).await.unwrap();
        assert!(outcome.all_tests_passed);
        assert_eq!(h.engine.calls(), 2);
    }

    #[tokio::test]
    async fn different_pairs_grade_in_parallel() {
        let h = Harness::new(ScriptedEngine::default());
        let (s1, s2, s3) = (
            for_student("stu-1", MEDIUM),
            for_student("stu-2", MEDIUM),
            for_student("stu-1", HARD),
        );
        let (a, b, c) = tokio::join!(
            h.orchestrator.grade(&s1),
            h.orchestrator.grade(&s2),
            h.orchestrator.grade(&s3),
        );
        assert!(a.is_ok() && b.is_ok() && c.is_ok());
        assert_eq!(h.engine.calls(), 3);
        assert_eq!(h.sink.events().len(), 3);
    }
}

mod cancellation {
    use super::*;

    #[tokio::test]
    async fn cancel_during_execution_fails_and_releases() {
        let h = Harness::new(ScriptedEngine::new([Step::Hang]));
        let token = CancellationToken::new();

        let orchestrator = h.orchestrator.clone();
        let run_token = token.clone();
        let run = tokio::spawn(async move {
            orchestrator
                .grade_with_cancellation(&submission(MEDIUM, 10), &run_token)
                .await
        });
        h.engine.entered.notified().await;
        token.cancel();

        let err = run.await.unwrap().unwrap_err();
        assert!(matches!(err, GradingError::Cancelled));
        assert_eq!(err.code(), "CANCELLED");
        assert!(h.in_flight.is_empty());
        assert!(h.sink.events().is_empty());
    }

    #[tokio::test]
    async fn cancelled_before_start_never_executes() {
        let h = Harness::new(ScriptedEngine::default());
        let token = CancellationToken::new();
        token.cancel();

        let err = h
            .orchestrator
            .grade_with_cancellation(&submission(MEDIUM, 10), &token)
            .await
            .unwrap_err();
        assert!(matches!(err, GradingError::Cancelled));
        assert_eq!(h.engine.calls(), 0);
    }

    #[tokio::test]
    async fn cancel_after_execution_is_ignored() {
        let token = CancellationToken::new();
        let mut sink = RecordingSink::new(SinkMode::Accept);
        sink.on_publish = Some(token.clone());
        let h = Harness::with_sink(ScriptedEngine::default(), sink);

        let outcome = h
            .orchestrator
            .grade_with_cancellation(&submission(MEDIUM, 10), &token)
            .await
            .unwrap();
        assert!(token.is_cancelled());
        assert_eq!(outcome.scoring.final_score, 10);
    }
}
