//! Read-only access to challenge metadata needed for grading.

pub mod http;
pub mod memory;

use async_trait::async_trait;
use common::challenge::{ChallengeScoringInfo, GradingCodeVersion};
use thiserror::Error;

pub use http::HttpChallengeCatalog;
pub use memory::InMemoryCatalog;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    #[error("{kind} '{id}' is invalid: {reason}")]
    Invalid {
        kind: &'static str,
        id: String,
        reason: String,
    },

    #[error("Challenge catalog unavailable: {0}")]
    Unavailable(String),
}

impl CatalogError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }
}

#[async_trait]
pub trait ChallengeCatalog: Send + Sync {
    /// Language and test cases of a code version. Tests come back in catalog order.
    async fn get_code_version_for_grading(
        &self,
        code_version_id: &str,
    ) -> Result<GradingCodeVersion, CatalogError>;

    async fn get_challenge_scoring_info(
        &self,
        challenge_id: &str,
    ) -> Result<ChallengeScoringInfo, CatalogError>;
}
