use std::time::Duration;

use async_trait::async_trait;
use common::execution::{ExecutionRequest, ExecutionResponse};
use tracing::{debug, warn};

use super::{ExecutionEngine, TransportError};

/// JSON-over-HTTP execution engine.
///
/// `POST {endpoint}/execute` runs a submission, `GET {endpoint}/health` is the
/// readiness probe. The overall deadline is enforced by the caller.
pub struct HttpExecutionEngine {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpExecutionEngine {
    pub fn new(
        endpoint: impl Into<String>,
        connect_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| TransportError::Other(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint, path)
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() {
            TransportError::Connect(e.to_string())
        } else if e.is_timeout() {
            TransportError::Deadline(e.to_string())
        } else if e.is_decode() || e.is_body() {
            TransportError::Codec(e.to_string())
        } else if let Some(status) = e.status() {
            TransportError::Status {
                status: status.as_u16(),
                body: e.to_string(),
            }
        } else {
            TransportError::Other(e.to_string())
        }
    }
}

#[async_trait]
impl ExecutionEngine for HttpExecutionEngine {
    async fn execute(
        &self,
        request: &ExecutionRequest,
    ) -> Result<ExecutionResponse, TransportError> {
        let url = self.url("execute");
        debug!(url = %url, solution_id = %request.solution_id, "Dispatching execution");

        let response = self.client.post(&url).json(request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Execution engine rejected request");
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json::<ExecutionResponse>().await?)
    }

    async fn health(&self) -> bool {
        match self.client.get(self.url("health")).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                debug!(error = %e, "Execution engine health probe failed");
                false
            }
        }
    }
}
