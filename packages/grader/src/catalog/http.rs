use std::time::Duration;

use async_trait::async_trait;
use common::challenge::{ChallengeScoringInfo, GradingCodeVersion};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::{CatalogError, ChallengeCatalog};
use crate::scoring::parse_difficulty;

/// Challenge catalog served over HTTP.
///
/// - `GET {endpoint}/code-versions/{id}/grading`
/// - `GET {endpoint}/challenges/{id}/scoring`
///
/// Ids are sent as single percent-encoded path segments.
pub struct HttpChallengeCatalog {
    client: reqwest::Client,
    endpoint: Url,
}

/// Scoring info as the catalog sends it. The difficulty may be absent or in
/// any casing.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScoringInfoPayload {
    base_score: i64,
    #[serde(default)]
    difficulty: Option<String>,
}

impl HttpChallengeCatalog {
    pub fn new(endpoint: impl AsRef<str>, timeout: Duration) -> Result<Self, CatalogError> {
        let endpoint = Url::parse(endpoint.as_ref())
            .map_err(|e| CatalogError::Unavailable(format!("invalid catalog endpoint: {e}")))?;
        if endpoint.cannot_be_a_base() {
            return Err(CatalogError::Unavailable(format!(
                "invalid catalog endpoint: {endpoint}"
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CatalogError::Unavailable(e.to_string()))?;
        Ok(Self { client, endpoint })
    }

    fn url(&self, collection: &str, id: &str, leaf: &str) -> Result<Url, CatalogError> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| CatalogError::Unavailable("catalog endpoint cannot be a base".into()))?
            .pop_if_empty()
            .push(collection)
            .push(id)
            .push(leaf);
        Ok(url)
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        collection: &str,
        leaf: &str,
        kind: &'static str,
        id: &str,
    ) -> Result<T, CatalogError> {
        // Dot segments would be normalized away and address a different resource.
        if id.trim().is_empty() || id == "." || id == ".." {
            return Err(CatalogError::not_found(kind, id));
        }
        let url = self.url(collection, id, leaf)?;
        debug!(url = %url, "Fetching from challenge catalog");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| CatalogError::Unavailable(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(CatalogError::not_found(kind, id)),
            status if status.is_success() => response
                .json::<T>()
                .await
                .map_err(|e| CatalogError::Unavailable(format!("malformed {kind}: {e}"))),
            status => Err(CatalogError::Unavailable(format!(
                "catalog returned HTTP {}",
                status.as_u16()
            ))),
        }
    }
}

#[async_trait]
impl ChallengeCatalog for HttpChallengeCatalog {
    async fn get_code_version_for_grading(
        &self,
        code_version_id: &str,
    ) -> Result<GradingCodeVersion, CatalogError> {
        self.fetch("code-versions", "grading", "Code version", code_version_id)
            .await
    }

    async fn get_challenge_scoring_info(
        &self,
        challenge_id: &str,
    ) -> Result<ChallengeScoringInfo, CatalogError> {
        let payload: ScoringInfoPayload = self
            .fetch("challenges", "scoring", "Challenge", challenge_id)
            .await?;
        let difficulty =
            parse_difficulty(payload.difficulty.as_deref()).map_err(|e| CatalogError::Invalid {
                kind: "Challenge",
                id: challenge_id.to_string(),
                reason: e.to_string(),
            })?;
        Ok(ChallengeScoringInfo {
            base_score: payload.base_score,
            difficulty,
        })
    }
}
