use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use common::challenge::TestCase;
use common::execution::{ExecutionLimits, ExecutionRequest};
use common::{Difficulty, Language};
use grader::catalog::{CatalogError, ChallengeCatalog, HttpChallengeCatalog};
use grader::GradingError;
use grader::execution::{
    ExecutionEngine, HttpExecutionEngine, RemoteExecutionClient, TransportError,
};
use grader::in_flight::InFlightRegistry;
use grader::orchestrator::GradingOrchestrator;
use serde_json::{Value, json};

use crate::common::{MEDIUM, RecordingSink, SinkMode, spawn_server, submission, test_settings};

type Seen = Arc<Mutex<Vec<Value>>>;

async fn execute(State(seen): State<Seen>, Json(body): Json<Value>) -> Json<Value> {
    let ids: Vec<Value> = body["testCases"]
        .as_array()
        .map(|tests| tests.iter().map(|t| t["id"].clone()).collect())
        .unwrap_or_default();
    seen.lock().unwrap().push(body);
    Json(json!({
        "success": true,
        "approvedTestIds": ids,
        "executionTimeMs": 64,
        "executionId": "exec-http-1",
    }))
}

async fn code_version(Path(id): Path<String>) -> Result<Json<Value>, StatusCode> {
    if id != "cv-py" {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(Json(json!({
        "language": "python",
        "tests": [
            {"id": "t1", "input": "1", "expectedOutput": "1"},
            {"id": "t2", "input": "2", "expectedOutput": "4"},
        ],
    })))
}

async fn scoring(Path(id): Path<String>) -> Result<Json<Value>, StatusCode> {
    match id.as_str() {
        "ch-medium" => Ok(Json(json!({"baseScore": 10, "difficulty": "MEDIUM"}))),
        "ch-lower" => Ok(Json(json!({"baseScore": 20, "difficulty": "hard"}))),
        "ch-null" => Ok(Json(json!({"baseScore": 10, "difficulty": null}))),
        "ch-absent" => Ok(Json(json!({"baseScore": 10}))),
        "ch-legendary" => Ok(Json(json!({"baseScore": 10, "difficulty": "LEGENDARY"}))),
        "team/ch-1" => Ok(Json(json!({"baseScore": 5, "difficulty": "Easy"}))),
        "ch-broken" => Err(StatusCode::SERVICE_UNAVAILABLE),
        _ => Err(StatusCode::NOT_FOUND),
    }
}

async fn spawn_backend() -> (String, Seen) {
    let seen: Seen = Arc::default();
    let router = Router::new()
        .route("/execute", post(execute))
        .route("/health", get(|| async { "ok" }))
        .route("/code-versions/{id}/grading", get(code_version))
        .route("/challenges/{id}/scoring", get(scoring))
        .with_state(seen.clone());
    (spawn_server(router).await, seen)
}

/// Base URL of a port nothing listens on.
async fn dead_endpoint() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

fn request() -> ExecutionRequest {
    ExecutionRequest {
        solution_id: "sol-1".into(),
        challenge_id: "ch-medium".into(),
        student_id: "stu-1".into(),
        code: "print(1)".into(),
        language: Language::Python,
        test_cases: vec![TestCase::new("t1", "1", "1"), TestCase::new("t2", "2", "4")],
        config: ExecutionLimits::default(),
    }
}

mod execution_engine {
    use super::*;

    #[tokio::test]
    async fn sends_explicit_limits_and_decodes_response() {
        let (url, seen) = spawn_backend().await;
        let engine = HttpExecutionEngine::new(url, Duration::from_secs(2)).unwrap();

        let response = engine.execute(&request()).await.unwrap();
        assert!(response.success);
        assert_eq!(response.approved_test_ids, vec!["t1", "t2"]);
        assert_eq!(response.execution_time_ms, 64);
        assert_eq!(response.execution_id.as_deref(), Some("exec-http-1"));

        let body = seen.lock().unwrap()[0].clone();
        assert_eq!(body["solutionId"], "sol-1");
        assert_eq!(body["language"], "python");
        assert_eq!(body["config"]["timeoutSeconds"], 30);
        assert_eq!(body["config"]["memoryLimitMb"], 512);
        assert_eq!(body["config"]["enableNetwork"], false);
        assert_eq!(body["config"]["debugMode"], false);
    }

    #[tokio::test]
    async fn error_status_is_a_transport_error() {
        let router = Router::new().route(
            "/execute",
            post(|| async { (StatusCode::BAD_GATEWAY, "sandbox pool exhausted") }),
        );
        let url = spawn_server(router).await;
        let engine = HttpExecutionEngine::new(url, Duration::from_secs(2)).unwrap();

        match engine.execute(&request()).await {
            Err(TransportError::Status { status, body }) => {
                assert_eq!(status, 502);
                assert!(body.contains("exhausted"));
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_engine_fails_to_connect() {
        let engine =
            HttpExecutionEngine::new(dead_endpoint().await, Duration::from_secs(2)).unwrap();
        assert!(matches!(
            engine.execute(&request()).await,
            Err(TransportError::Connect(_))
        ));
        assert!(!engine.health().await);
    }

    #[tokio::test]
    async fn health_reflects_endpoint() {
        let (url, _) = spawn_backend().await;
        let client = RemoteExecutionClient::new(
            Arc::new(HttpExecutionEngine::new(url, Duration::from_secs(2)).unwrap()),
            ExecutionLimits::default(),
            Duration::from_secs(5),
        );
        assert!(client.is_available().await);
    }
}

mod challenge_catalog {
    use super::*;

    #[tokio::test]
    async fn fetches_code_version_and_scoring_info() {
        let (url, _) = spawn_backend().await;
        let catalog = HttpChallengeCatalog::new(url, Duration::from_secs(2)).unwrap();

        let cv = catalog.get_code_version_for_grading("cv-py").await.unwrap();
        assert_eq!(cv.language, Language::Python);
        assert_eq!(cv.tests.len(), 2);
        assert_eq!(cv.tests[1].expected_output, "4");

        let info = catalog.get_challenge_scoring_info("ch-medium").await.unwrap();
        assert_eq!(info.base_score, 10);
        assert_eq!(info.difficulty, Difficulty::Medium);
    }

    #[tokio::test]
    async fn missing_entries_map_to_not_found() {
        let (url, _) = spawn_backend().await;
        let catalog = HttpChallengeCatalog::new(url, Duration::from_secs(2)).unwrap();

        assert!(matches!(
            catalog.get_code_version_for_grading("cv-nope").await,
            Err(CatalogError::NotFound { .. })
        ));
        assert!(matches!(
            catalog.get_challenge_scoring_info("ch-nope").await,
            Err(CatalogError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn difficulty_is_case_insensitive() {
        let (url, _) = spawn_backend().await;
        let catalog = HttpChallengeCatalog::new(url, Duration::from_secs(2)).unwrap();
        let info = catalog.get_challenge_scoring_info("ch-lower").await.unwrap();
        assert_eq!(info.base_score, 20);
        assert_eq!(info.difficulty, Difficulty::Hard);
    }

    #[tokio::test]
    async fn missing_or_unknown_difficulty_is_invalid() {
        let (url, _) = spawn_backend().await;
        let catalog = HttpChallengeCatalog::new(url, Duration::from_secs(2)).unwrap();
        for id in ["ch-null", "ch-absent", "ch-legendary"] {
            let err = catalog.get_challenge_scoring_info(id).await.unwrap_err();
            assert!(
                matches!(err, CatalogError::Invalid { kind: "Challenge", .. }),
                "{id}: {err}"
            );
        }
    }

    #[tokio::test]
    async fn ids_are_sent_as_one_path_segment() {
        let (url, _) = spawn_backend().await;
        let catalog = HttpChallengeCatalog::new(format!("{url}/"), Duration::from_secs(2)).unwrap();

        let info = catalog.get_challenge_scoring_info("team/ch-1").await.unwrap();
        assert_eq!(info.difficulty, Difficulty::Easy);
        assert!(matches!(
            catalog.get_challenge_scoring_info("..").await,
            Err(CatalogError::NotFound { .. })
        ));
        assert!(matches!(
            catalog.get_challenge_scoring_info("ch-medium?x=1").await,
            Err(CatalogError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn server_errors_are_unavailable() {
        let (url, _) = spawn_backend().await;
        let catalog = HttpChallengeCatalog::new(url, Duration::from_secs(2)).unwrap();
        assert!(matches!(
            catalog.get_challenge_scoring_info("ch-broken").await,
            Err(CatalogError::Unavailable(_))
        ));
    }
}

#[tokio::test]
async fn grades_end_to_end_over_http() {
    let (url, seen) = spawn_backend().await;
    let sink = Arc::new(RecordingSink::new(SinkMode::Accept));
    let orchestrator = GradingOrchestrator::new(
        Arc::new(HttpChallengeCatalog::new(url.clone(), Duration::from_secs(2)).unwrap()),
        RemoteExecutionClient::new(
            Arc::new(HttpExecutionEngine::new(url, Duration::from_secs(2)).unwrap()),
            ExecutionLimits::default(),
            Duration::from_secs(5),
        ),
        sink.clone(),
        Arc::new(InFlightRegistry::new()),
        test_settings(),
    );

    let outcome = orchestrator.grade(&submission(MEDIUM, 900)).await.unwrap();
    assert!(outcome.all_tests_passed);
    assert_eq!(outcome.execution.total_count, 2);
    assert_eq!(outcome.scoring.final_score, 10);
    assert_eq!(seen.lock().unwrap().len(), 1);
    assert_eq!(sink.events().len(), 1);
}

#[tokio::test]
async fn invalid_difficulty_fails_without_retry_or_execution() {
    let (url, seen) = spawn_backend().await;
    let orchestrator = GradingOrchestrator::new(
        Arc::new(HttpChallengeCatalog::new(url.clone(), Duration::from_secs(2)).unwrap()),
        RemoteExecutionClient::new(
            Arc::new(HttpExecutionEngine::new(url, Duration::from_secs(2)).unwrap()),
            ExecutionLimits::default(),
            Duration::from_secs(5),
        ),
        Arc::new(RecordingSink::new(SinkMode::Accept)),
        Arc::new(InFlightRegistry::new()),
        test_settings(),
    );

    let err = orchestrator
        .grade(&submission("ch-null", 10))
        .await
        .unwrap_err();
    assert!(matches!(err, GradingError::InvalidChallenge(_)), "{err}");
    assert_eq!(err.code(), "INVALID_CHALLENGE");
    assert!(!err.is_retryable());
    assert!(seen.lock().unwrap().is_empty());
}
