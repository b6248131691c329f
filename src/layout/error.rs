/// Asynchronous layout failures. None of them ever changes the domain graph.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LayoutError {
    #[error("layout engine failed: {0}")]
    Engine(String),

    #[error("layout output is degenerate: all {count} entities at the origin")]
    Degenerate { count: usize },

    #[error("layout output is invalid: {0}")]
    InvalidOutput(String),

    #[error("stale layout result for scope {scope}: {reason}")]
    Stale { scope: String, reason: String },
}

impl LayoutError {
    pub fn stale(scope: &str, reason: impl Into<String>) -> Self {
        Self::Stale {
            scope: scope.to_string(),
            reason: reason.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidOutput(message.into())
    }

    /// Engine trouble or output that could not be used. Previous geometry stays.
    pub fn is_failure(&self) -> bool {
        !self.is_stale()
    }

    /// The result was superseded; discarding it is expected behaviour.
    pub fn is_stale(&self) -> bool {
        matches!(self, Self::Stale { .. })
    }
}
