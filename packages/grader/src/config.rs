use std::time::Duration;

use common::execution::ExecutionLimits;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;

pub use common::config::MqAppConfig;

/// Grader-process settings.
#[derive(Debug, Deserialize, Clone)]
pub struct GraderConfig {
    /// Unique identifier for this grader instance. Default: "grader-1".
    #[serde(default = "default_grader_id")]
    pub id: String,
    /// Requests graded concurrently. Default: 10.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Largest accepted submission, in bytes. Default: 65536.
    #[serde(default = "default_max_code_bytes")]
    pub max_code_bytes: usize,
    /// How long shutdown waits for running gradings to finish. Default: 90000.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

fn default_grader_id() -> String {
    "grader-1".into()
}
fn default_concurrency() -> usize {
    10
}
fn default_max_code_bytes() -> usize {
    64 * 1024
}
fn default_shutdown_grace_ms() -> u64 {
    90_000
}

impl Default for GraderConfig {
    fn default() -> Self {
        Self {
            id: default_grader_id(),
            concurrency: default_concurrency(),
            max_code_bytes: default_max_code_bytes(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

impl GraderConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

/// Remote execution engine settings.
#[derive(Debug, Deserialize, Clone)]
pub struct ExecutionConfig {
    #[serde(default = "default_execution_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_memory_limit_mb")]
    pub memory_limit_mb: u32,
    #[serde(default)]
    pub enable_network: bool,
    #[serde(default)]
    pub debug_mode: bool,
    /// Added to `timeout_seconds` to form the client-side deadline. Default: 5000.
    #[serde(default = "default_rpc_margin_ms")]
    pub rpc_margin_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Base delay before the single transport retry. Default: 250.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Largest `timeout_seconds` a request may ask for. Default: 300.
    #[serde(default = "default_max_timeout_seconds")]
    pub max_timeout_seconds: u64,
    /// Largest `memory_limit_mb` a request may ask for. Default: 4096.
    #[serde(default = "default_max_memory_limit_mb")]
    pub max_memory_limit_mb: u32,
}

fn default_execution_endpoint() -> String {
    "http://localhost:8090".into()
}
fn default_timeout_seconds() -> u64 {
    common::execution::DEFAULT_TIMEOUT_SECONDS
}
fn default_memory_limit_mb() -> u32 {
    common::execution::DEFAULT_MEMORY_LIMIT_MB
}
fn default_rpc_margin_ms() -> u64 {
    5000
}
fn default_connect_timeout_ms() -> u64 {
    2000
}
fn default_retry_delay_ms() -> u64 {
    250
}
fn default_max_timeout_seconds() -> u64 {
    300
}
fn default_max_memory_limit_mb() -> u32 {
    4096
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            endpoint: default_execution_endpoint(),
            timeout_seconds: default_timeout_seconds(),
            memory_limit_mb: default_memory_limit_mb(),
            enable_network: false,
            debug_mode: false,
            rpc_margin_ms: default_rpc_margin_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            retry_delay_ms: default_retry_delay_ms(),
            max_timeout_seconds: default_max_timeout_seconds(),
            max_memory_limit_mb: default_max_memory_limit_mb(),
        }
    }
}

impl ExecutionConfig {
    /// Limits applied to requests that carry none of their own.
    pub fn limits(&self) -> ExecutionLimits {
        ExecutionLimits {
            timeout_seconds: self.timeout_seconds,
            memory_limit_mb: self.memory_limit_mb,
            enable_network: self.enable_network,
            debug_mode: self.debug_mode,
        }
    }

    pub fn rpc_margin(&self) -> Duration {
        Duration::from_millis(self.rpc_margin_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Challenge catalog settings.
#[derive(Debug, Deserialize, Clone)]
pub struct CatalogConfig {
    #[serde(default = "default_catalog_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_catalog_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_catalog_endpoint() -> String {
    "http://localhost:8080".into()
}
fn default_catalog_timeout_ms() -> u64 {
    2000
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            endpoint: default_catalog_endpoint(),
            timeout_ms: default_catalog_timeout_ms(),
        }
    }
}

impl CatalogConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Completion event settings.
#[derive(Debug, Deserialize, Clone)]
pub struct EventsConfig {
    /// Queue receiving challenge-completed events. Default: "challenge_completed".
    #[serde(default = "default_events_queue_name")]
    pub queue_name: String,
    /// How long grading waits on a publish before detaching it. Default: 2000.
    #[serde(default = "default_publish_timeout_ms")]
    pub publish_timeout_ms: u64,
}

fn default_events_queue_name() -> String {
    "challenge_completed".into()
}
fn default_publish_timeout_ms() -> u64 {
    2000
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            queue_name: default_events_queue_name(),
            publish_timeout_ms: default_publish_timeout_ms(),
        }
    }
}

impl EventsConfig {
    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }
}

/// Grader application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct GraderAppConfig {
    #[serde(default)]
    pub grader: GraderConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub events: EventsConfig,
    #[serde(default)]
    pub mq: MqAppConfig,
}

impl GraderAppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var("GRADER_CONFIG").unwrap_or_else(|_| "config/grader".to_string());

        Self::defaults()?
            .add_source(File::with_name(&config_path).required(false))
            .add_source(Environment::with_prefix("GRADER").separator("__"))
            .build()?
            .try_deserialize()
    }

    fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Config::builder()
            .set_default("grader.id", "grader-1")?
            .set_default("grader.concurrency", 10_i64)?
            .set_default("grader.max_code_bytes", 65_536_i64)?
            .set_default("execution.endpoint", "http://localhost:8090")?
            .set_default("execution.timeout_seconds", 30_i64)?
            .set_default("execution.memory_limit_mb", 512_i64)?
            .set_default("catalog.endpoint", "http://localhost:8080")?
            .set_default("events.queue_name", "challenge_completed")?
            .set_default("mq.url", "redis://localhost:6379")?
            .set_default("mq.pool_size", 5_i64)?
            .set_default("mq.queue_name", "grading_requests")?
            .set_default("mq.result_queue_name", "grading_results")
    }
}
