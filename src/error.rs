//! Typed errors for the trait, goal, and scoring contracts.
//!
//! Validation failures are reported to the caller as [`EvolveError`] and never
//! touch stored state. Orchestration code (consolidation, scheduling, CLI) wraps
//! these in `anyhow` with context instead.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EvolveError {
    /// The name does not parse to any registered trait.
    #[error("unknown trait: {0}")]
    UnknownTrait(String),

    /// The trait is registered but has no stored row.
    #[error("trait not found: {0}")]
    TraitNotFound(String),

    #[error("delta out of range: {0} (must be finite and within [-1.0, 1.0])")]
    InvalidDelta(f64),

    #[error("decay amount out of range: {0} (must be finite and within [0.0, 1.0])")]
    InvalidDecay(f64),

    #[error("turn text is empty")]
    EmptyTurn,

    #[error("goal target must be finite and positive, got {0}")]
    InvalidGoalTarget(f64),

    #[error("goal not found: {0}")]
    GoalNotFound(String),

    #[error(transparent)]
    Database(#[from] rusqlite::Error),

    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),
}

pub type Result<T, E = EvolveError> = std::result::Result<T, E>;

/// Failures of the external text-generation dependency.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("text generation service unreachable at {url}: {source}")]
    Unreachable {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("text generation timed out after {0}s")]
    Timeout(u64),

    #[error("text generation returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed text generation response: {0}")]
    Malformed(String),
}
