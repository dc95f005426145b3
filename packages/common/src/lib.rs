pub mod challenge;
pub mod completion;
pub mod config;
pub mod difficulty;
pub mod execution;
pub mod grading;
pub mod language;
pub mod mq;
pub mod retry;
pub mod scoring;

pub use difficulty::Difficulty;
pub use grading::GradingState;
pub use language::Language;
