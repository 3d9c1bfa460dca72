//! Error types for the reducer.
//!
//! Only unrecoverable, user-visible conditions surface as errors. Worker
//! crashes degrade to uninteresting verdicts, contradicting cache inserts
//! are logged and ignored, and cancellation never escapes the scheduler.

/// Failure to start or finish a reduction.
#[derive(Debug, thiserror::Error)]
pub enum ReduceError {
    /// The input contains no units to reduce.
    #[error("input is empty")]
    EmptyInput,

    /// The unreduced input is not interesting, so there is nothing to
    /// preserve while shrinking.
    #[error("the initial test case is not interesting")]
    InitialUninteresting,

    /// The reducer was configured with contradictory or useless settings.
    #[error("invalid options: {0}")]
    InvalidOptions(String),
}
