//! Error types for the interview core.

use crate::session::Stage;
use thiserror::Error;

/// Defects inside the interview loop. Modeled degradations (provider, scorer, store) never
/// become an `InterviewError`; these end the session early and are logged at the loop boundary.
#[derive(Error, Debug)]
pub enum InterviewError {
    #[error("invalid operation on a session in stage {stage:?}: {detail}")]
    Invariant { stage: Stage, detail: String },

    #[error("stage would move backwards: {from:?} -> {to:?}")]
    StageRegression { from: Stage, to: Stage },
}

pub type InterviewResult<T> = Result<T, InterviewError>;

/// The scorer could not produce a verdict for one answer.
#[derive(Error, Debug, Clone)]
pub enum ScoringError {
    #[error("no scoring endpoint configured")]
    Unavailable,

    #[error("scoring request failed: {0}")]
    Request(String),

    #[error("could not parse scoring verdict: {0}")]
    Parse(String),
}

/// The question source could not supply questions for a stage.
#[derive(Error, Debug)]
pub enum QuestionError {
    #[error("question bank error: {0}")]
    Bank(String),

    #[error("question generation failed: {0}")]
    Generation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// The reference corpus could not be loaded.
#[derive(Error, Debug)]
pub enum ContextError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Session store failures. The resilient store absorbs these by degrading to memory.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("record encoding error: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("store lock poisoned")]
    Poisoned,
}
