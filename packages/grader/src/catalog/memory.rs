use async_trait::async_trait;
use common::Difficulty;
use common::Language;
use common::challenge::{ChallengeScoringInfo, GradingCodeVersion, TestCase};
use dashmap::DashMap;

use super::{CatalogError, ChallengeCatalog};

/// Catalog held in process memory. Used for local runs and tests.
#[derive(Default)]
pub struct InMemoryCatalog {
    code_versions: DashMap<String, GradingCodeVersion>,
    challenges: DashMap<String, ChallengeScoringInfo>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_code_version(
        &self,
        code_version_id: impl Into<String>,
        language: Language,
        tests: Vec<TestCase>,
    ) {
        self.code_versions
            .insert(code_version_id.into(), GradingCodeVersion { language, tests });
    }

    pub fn insert_challenge(
        &self,
        challenge_id: impl Into<String>,
        base_score: i64,
        difficulty: Difficulty,
    ) {
        self.challenges.insert(
            challenge_id.into(),
            ChallengeScoringInfo {
                base_score,
                difficulty,
            },
        );
    }
}

#[async_trait]
impl ChallengeCatalog for InMemoryCatalog {
    async fn get_code_version_for_grading(
        &self,
        code_version_id: &str,
    ) -> Result<GradingCodeVersion, CatalogError> {
        self.code_versions
            .get(code_version_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| CatalogError::not_found("Code version", code_version_id))
    }

    async fn get_challenge_scoring_info(
        &self,
        challenge_id: &str,
    ) -> Result<ChallengeScoringInfo, CatalogError> {
        self.challenges
            .get(challenge_id)
            .map(|entry| *entry.value())
            .ok_or_else(|| CatalogError::not_found("Challenge", challenge_id))
    }
}
