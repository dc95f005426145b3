use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Elapsed-time thresholds (seconds) at which the score multiplier drops a tier.
///
/// Each bound is inclusive: a solve taking exactly `grace` seconds still earns
/// the full score.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PenaltyThresholds {
    /// No penalty up to this many seconds.
    pub grace: i64,
    /// 80% up to this many seconds.
    pub medium: i64,
    /// 60% up to this many seconds.
    pub heavy: i64,
    /// 40% up to this many seconds; 20% beyond.
    pub maximum: i64,
}

/// Challenge difficulty tier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
    Expert,
}

impl Difficulty {
    /// All difficulty tiers, easiest first.
    pub const ALL: &'static [Difficulty] = &[Self::Easy, Self::Medium, Self::Hard, Self::Expert];

    /// Largest base score a challenge of this tier is expected to award.
    pub fn max_base_score(&self) -> i64 {
        match self {
            Self::Easy => 5,
            Self::Medium => 10,
            Self::Hard => 20,
            Self::Expert => 40,
        }
    }

    /// Time-penalty schedule for this tier.
    pub fn thresholds(&self) -> PenaltyThresholds {
        match self {
            Self::Easy => PenaltyThresholds {
                grace: 600,
                medium: 1200,
                heavy: 1800,
                maximum: 2400,
            },
            Self::Medium => PenaltyThresholds {
                grace: 1200,
                medium: 2400,
                heavy: 3600,
                maximum: 5400,
            },
            Self::Hard => PenaltyThresholds {
                grace: 1800,
                medium: 3600,
                heavy: 5400,
                maximum: 7200,
            },
            Self::Expert => PenaltyThresholds {
                grace: 3600,
                medium: 7200,
                heavy: 10800,
                maximum: 14400,
            },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Easy => "EASY",
            Self::Medium => "MEDIUM",
            Self::Hard => "HARD",
            Self::Expert => "EXPERT",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error when parsing an unknown difficulty name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseDifficultyError {
    invalid: String,
}

impl fmt::Display for ParseDifficultyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Invalid difficulty '{}'. Valid values: {}",
            self.invalid,
            Difficulty::ALL
                .iter()
                .map(|d| d.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        )
    }
}

impl std::error::Error for ParseDifficultyError {}

impl FromStr for Difficulty {
    type Err = ParseDifficultyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "EASY" => Ok(Self::Easy),
            "MEDIUM" => Ok(Self::Medium),
            "HARD" => Ok(Self::Hard),
            "EXPERT" => Ok(Self::Expert),
            _ => Err(ParseDifficultyError {
                invalid: s.to_string(),
            }),
        }
    }
}

/// Accepts any casing, like [`FromStr`].
impl<'de> Deserialize<'de> for Difficulty {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}
