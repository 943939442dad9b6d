use std::time::Duration;

/// Failures reported by a generation collaborator.
///
/// The engine never retries any of these; it classifies them and passes them on.
#[derive(Clone, Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("generation timed out after {0:?}")]
    Timeout(Duration),
    #[error("generation failed: {0}")]
    Failure(String),
    #[error("generator unavailable: {0}")]
    Unavailable(String),
    #[error("generator returned an empty response")]
    EmptyResponse,
}

impl GenerationError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::Failure(_) => "failure",
            Self::Unavailable(_) => "unavailable",
            Self::EmptyResponse => "empty_response",
        }
    }

    /// Classify a non-success HTTP status from an inference endpoint.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            408 | 504 => Self::Timeout(Duration::ZERO),
            502 | 503 => Self::Unavailable(format!("status {status}: {body}")),
            _ => Self::Failure(format!("status {status}: {body}")),
        }
    }
}
