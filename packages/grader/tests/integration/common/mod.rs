use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use chrono::{TimeDelta, Utc};
use common::challenge::TestCase;
use common::completion::ChallengeCompletedEvent;
use common::execution::{ExecutionErrorType, ExecutionLimits, ExecutionRequest, ExecutionResponse};
use common::grading::GradingRequest;
use common::{Difficulty, Language};
use grader::catalog::InMemoryCatalog;
use grader::execution::{ExecutionEngine, RemoteExecutionClient, TransportError};
use grader::in_flight::InFlightRegistry;
use grader::notify::{CompletionSink, NotifyError};
use grader::orchestrator::{GradingOrchestrator, OrchestratorSettings};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

pub const CODE_VERSION: &str = "cv-py";
pub const EASY: &str = "ch-easy";
pub const MEDIUM: &str = "ch-medium";
pub const HARD: &str = "ch-hard";
pub const TEST_IDS: [&str; 3] = ["t1", "t2", "t3"];

/// One scripted reaction of the fake engine.
pub enum Step {
    /// Approve exactly these ids.
    Approve(&'static [&'static str]),
    Respond(ExecutionResponse),
    Fail(&'static str),
    /// Wait for [`ScriptedEngine::release`] then approve everything.
    Block,
    Hang,
    /// Panic inside the engine call.
    Panic,
}

/// Execution engine that plays back a script. Approves every test once the
/// script is exhausted.
#[derive(Default)]
pub struct ScriptedEngine {
    steps: Mutex<VecDeque<Step>>,
    calls: AtomicUsize,
    requests: Mutex<Vec<ExecutionRequest>>,
    pub entered: Notify,
    release: Notify,
}

impl ScriptedEngine {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into_iter().collect()),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<ExecutionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn release(&self) {
        self.release.notify_one();
    }
}

pub fn approve(request: &ExecutionRequest, ids: &[&str]) -> ExecutionResponse {
    ExecutionResponse {
        success: true,
        approved_test_ids: ids.iter().map(|s| s.to_string()).collect(),
        execution_time_ms: 87,
        error_type: None,
        error_message: None,
        execution_id: Some(format!("exec-{}", request.solution_id)),
    }
}

pub fn timed_out_response() -> ExecutionResponse {
    ExecutionResponse {
        success: false,
        approved_test_ids: vec![],
        execution_time_ms: 30_000,
        error_type: Some(ExecutionErrorType::Timeout),
        error_message: Some("time limit exceeded".into()),
        execution_id: Some("exec-timeout".into()),
    }
}

#[async_trait]
impl ExecutionEngine for ScriptedEngine {
    async fn execute(
        &self,
        request: &ExecutionRequest,
    ) -> Result<ExecutionResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        self.entered.notify_one();

        let step = self.steps.lock().unwrap().pop_front();
        let all: Vec<&str> = request.test_cases.iter().map(|t| t.id.as_str()).collect();
        match step {
            None => Ok(approve(request, &all)),
            Some(Step::Approve(ids)) => Ok(approve(request, ids)),
            Some(Step::Respond(response)) => Ok(response),
            Some(Step::Fail(reason)) => Err(TransportError::Connect(reason.into())),
            Some(Step::Block) => {
                self.release.notified().await;
                Ok(approve(request, &all))
            }
            Some(Step::Hang) => std::future::pending().await,
            Some(Step::Panic) => panic!("execution engine crashed"),
        }
    }

    async fn health(&self) -> bool {
        true
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum SinkMode {
    Accept,
    Fail,
    Hang,
}

/// Completion sink that records what it was asked to publish.
pub struct RecordingSink {
    mode: SinkMode,
    events: Mutex<Vec<ChallengeCompletedEvent>>,
    /// Cancelled when a publish starts.
    pub on_publish: Option<CancellationToken>,
}

impl RecordingSink {
    pub fn new(mode: SinkMode) -> Self {
        Self {
            mode,
            events: Mutex::new(Vec::new()),
            on_publish: None,
        }
    }

    pub fn events(&self) -> Vec<ChallengeCompletedEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionSink for RecordingSink {
    async fn publish(&self, event: &ChallengeCompletedEvent) -> Result<(), NotifyError> {
        if let Some(token) = &self.on_publish {
            token.cancel();
        }
        self.events.lock().unwrap().push(event.clone());
        match self.mode {
            SinkMode::Accept => Ok(()),
            SinkMode::Fail => Err(NotifyError::Publish("broker down".into())),
            SinkMode::Hang => std::future::pending().await,
        }
    }
}

pub fn seeded_catalog() -> InMemoryCatalog {
    let catalog = InMemoryCatalog::new();
    catalog.insert_code_version(
        CODE_VERSION,
        Language::Python,
        TEST_IDS
            .iter()
            .enumerate()
            .map(|(i, id)| TestCase::new(*id, i.to_string(), (i * i).to_string()))
            .collect(),
    );
    catalog.insert_challenge(EASY, 5, Difficulty::Easy);
    catalog.insert_challenge(MEDIUM, 10, Difficulty::Medium);
    catalog.insert_challenge(HARD, 20, Difficulty::Hard);
    catalog
}

pub fn test_settings() -> OrchestratorSettings {
    OrchestratorSettings {
        retry_base_delay: Duration::from_millis(10),
        ..Default::default()
    }
}

pub struct Harness {
    pub orchestrator: Arc<GradingOrchestrator>,
    pub engine: Arc<ScriptedEngine>,
    pub sink: Arc<RecordingSink>,
    pub in_flight: Arc<InFlightRegistry>,
}

impl Harness {
    pub fn new(engine: ScriptedEngine) -> Self {
        Self::with_sink(engine, RecordingSink::new(SinkMode::Accept))
    }

    pub fn with_sink(engine: ScriptedEngine, sink: RecordingSink) -> Self {
        let engine = Arc::new(engine);
        let sink = Arc::new(sink);
        let in_flight = Arc::new(InFlightRegistry::new());
        let orchestrator = GradingOrchestrator::new(
            Arc::new(seeded_catalog()),
            RemoteExecutionClient::new(
                engine.clone(),
                ExecutionLimits::default(),
                Duration::from_secs(5),
            ),
            sink.clone(),
            in_flight.clone(),
            test_settings(),
        );
        Self {
            orchestrator: Arc::new(orchestrator),
            engine,
            sink,
            in_flight,
        }
    }
}

/// Python submission for `challenge`, received `elapsed_secs` ago.
pub fn submission(challenge_id: &str, elapsed_secs: i64) -> GradingRequest {
    GradingRequest::new(
        format!("sol-{challenge_id}"),
        challenge_id,
        CODE_VERSION,
        "stu-1",
        "n = int(input())\nprint(n * n)\n",
        "python",
    )
    .received_at(Utc::now() - TimeDelta::seconds(elapsed_secs))
}

/// Serve `router` on an ephemeral local port and return its base URL.
pub async fn spawn_server(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test server");
    let addr = listener.local_addr().expect("Failed to read local addr");
    tokio::spawn(async move {
        axum::serve(listener, router)
            .await
            .expect("Test server crashed");
    });
    format!("http://{addr}")
}
