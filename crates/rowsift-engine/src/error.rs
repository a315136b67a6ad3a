use std::time::Duration;

/// Why an expression could not be evaluated.
///
/// Every variant is contained at the call site: the pipeline turns any of
/// them into a failed filter or an `ERROR` sort value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvalError {
    /// The sandbox evaluated the expression and reported a failure.
    #[error("{0}")]
    Evaluation(String),

    /// No response arrived in time.
    #[error("evaluation timed out after {0:?}")]
    Timeout(Duration),

    /// The sandbox could not be started.
    #[error("evaluator unavailable: {0}")]
    Unavailable(String),

    /// The sandbox went away while the call was outstanding.
    #[error("evaluator disconnected")]
    Disconnected,

    #[error("failed to encode evaluation request: {0}")]
    Encode(String),
}

impl EvalError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, EvalError::Timeout(_))
    }
}
