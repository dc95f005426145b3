use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use common::grading::GradingRequest;
use grader::GraderAppConfig;
use grader::catalog::HttpChallengeCatalog;
use grader::execution::{HttpExecutionEngine, RemoteExecutionClient};
use grader::handlers::grading::handle_grading_request;
use grader::in_flight::{InFlightRegistry, spawn_purge_task};
use grader::notify::MqCompletionSink;
use grader::orchestrator::{GradingOrchestrator, OrchestratorSettings};
use mq::{BroccoliError, BrokerMessage, MqConfig, init_mq, publish_message};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const IN_FLIGHT_PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = GraderAppConfig::load().context("Failed to load config")?;
    info!("Grader starting: {}", config.grader.id);

    let mq = Arc::new(
        init_mq(MqConfig {
            url: config.mq.url.clone(),
            pool_size: config.mq.pool_size,
        })
        .await
        .context("Failed to initialize MQ")?,
    );

    info!(
        queue_name = %config.mq.queue_name,
        result_queue_name = %config.mq.result_queue_name,
        events_queue_name = %config.events.queue_name,
        "MQ connected"
    );

    let engine = HttpExecutionEngine::new(
        config.execution.endpoint.clone(),
        config.execution.connect_timeout(),
    )
    .context("Failed to build execution engine client")?;
    let catalog =
        HttpChallengeCatalog::new(&config.catalog.endpoint, config.catalog.timeout())
            .context("Failed to build challenge catalog client")?;

    let in_flight = Arc::new(InFlightRegistry::new());
    // Runs until process exit.
    let _purge_handle = spawn_purge_task(Arc::clone(&in_flight), IN_FLIGHT_PURGE_INTERVAL);

    let orchestrator = Arc::new(GradingOrchestrator::new(
        Arc::new(catalog),
        RemoteExecutionClient::new(
            Arc::new(engine),
            config.execution.limits(),
            config.execution.rpc_margin(),
        ),
        Arc::new(MqCompletionSink::new(
            Arc::clone(&mq),
            config.events.queue_name.clone(),
        )),
        in_flight,
        OrchestratorSettings::from(&config),
    ));

    if orchestrator.is_available().await {
        info!(endpoint = %config.execution.endpoint, "Execution engine available");
    } else {
        warn!(
            endpoint = %config.execution.endpoint,
            "Execution engine not reachable; requests will fail until it recovers"
        );
    }

    let shutdown = CancellationToken::new();
    // Handlers run as tracked tasks so they outlive the consumer on shutdown.
    let tracker = TaskTracker::new();
    let result_queue = config.mq.result_queue_name.clone();
    let mq_for_handler = Arc::clone(&mq);
    let handler_shutdown = shutdown.clone();
    let handler_tracker = tracker.clone();

    let consume = mq.process_messages(
        &config.mq.queue_name,
        Some(config.grader.concurrency),
        None,
        move |message: BrokerMessage<GradingRequest>| {
            let mq = Arc::clone(&mq_for_handler);
            let orchestrator = Arc::clone(&orchestrator);
            let result_queue = result_queue.clone();
            let cancel = handler_shutdown.clone();
            let task = handler_tracker.spawn(async move {
                process_message(message, &mq, &orchestrator, &result_queue, &cancel).await
            });
            async move {
                task.await.map_err(|e| {
                    BroccoliError::Job(format!("Grading task did not complete: {e}"))
                })?
            }
        },
    );

    tokio::select! {
        result = consume => {
            if let Err(e) = result {
                error!(error = %e, "Grader stopped unexpectedly");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("Received shutdown signal, no longer consuming");
            shutdown.cancel();
        }
    }

    // Runs not yet executed fail as cancelled; executed ones finish and report.
    tracker.close();
    let grace = config.grader.shutdown_grace();
    info!(
        running = tracker.len(),
        grace_ms = grace.as_millis() as u64,
        "Waiting for running gradings"
    );
    if tokio::time::timeout(grace, tracker.wait()).await.is_err() {
        warn!(
            running = tracker.len(),
            "Shutdown grace period elapsed with gradings still running"
        );
    }

    info!("Grader shutdown complete");
    Ok(())
}

async fn process_message(
    message: BrokerMessage<GradingRequest>,
    mq: &Arc<mq::Mq>,
    orchestrator: &GradingOrchestrator,
    result_queue: &str,
    cancel: &CancellationToken,
) -> Result<(), BroccoliError> {
    let request = message.payload;
    info!(
        request_id = %request.request_id,
        solution_id = %request.solution_id,
        language = %request.language,
        "Processing grading request"
    );

    let report = handle_grading_request(orchestrator, &request, cancel).await;

    publish_message(mq, result_queue, &report)
        .await
        .map_err(|e| BroccoliError::Publish(format!("Failed to publish GradingReport: {e}")))?;

    info!(
        request_id = %report.request_id,
        error_code = report.error.as_ref().map(|e| e.code.as_str()),
        final_score = report.outcome.as_ref().map(|o| o.scoring.final_score),
        "Published report to queue"
    );

    Ok(())
}
