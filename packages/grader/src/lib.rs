pub mod aggregator;
pub mod catalog;
pub mod config;
pub mod error;
pub mod execution;
pub mod handlers;
pub mod in_flight;
pub mod notify;
pub mod orchestrator;
pub mod scoring;

pub use config::GraderAppConfig;
pub use error::{GradingError, Result};
pub use execution::{ExecutionEngine, RemoteExecutionClient, TransportError};
pub use in_flight::InFlightRegistry;
pub use orchestrator::{GradingOrchestrator, OrchestratorSettings};
