use serde::{Deserialize, Serialize};

use crate::{Difficulty, Language};

/// A single test of a challenge's code version.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    /// Opaque test identifier, echoed back by the engine when the test passes.
    pub id: String,
    /// Input fed to the program.
    pub input: String,
    /// Expected output for comparison.
    pub expected_output: String,
    /// Validation snippet run by the engine instead of plain output comparison.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_validation_code: Option<String>,
}

impl TestCase {
    pub fn new(
        id: impl Into<String>,
        input: impl Into<String>,
        expected_output: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            input: input.into(),
            expected_output: expected_output.into(),
            custom_validation_code: None,
        }
    }
}

/// What the catalog hands out for grading one code version.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingCodeVersion {
    pub language: Language,
    pub tests: Vec<TestCase>,
}

/// Scoring parameters of a challenge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeScoringInfo {
    pub base_score: i64,
    pub difficulty: Difficulty,
}
