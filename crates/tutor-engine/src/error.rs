use std::time::Duration;

use tutor_core::errors::GenerationError;
use tutor_core::ids::LearnerKey;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// No session memory for this learner. Call init or resume first.
    #[error("no active session for learner {0}")]
    SessionNotFound(LearnerKey),

    #[error("generation timed out after {0:?}, please try again")]
    GenerationTimeout(Duration),

    /// Generator failure, message carried verbatim.
    #[error("{0}")]
    GenerationFailure(String),

    #[error("invalid curriculum: {0}")]
    InvalidCurriculum(String),

    #[error("summarize \"{topic}\" with <IS> tags before moving on")]
    SummaryRequired { topic: String },
}

impl EngineError {
    /// Short classification string for logs and API error codes.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::SessionNotFound(_) => "session_not_found",
            Self::GenerationTimeout(_) => "generation_timeout",
            Self::GenerationFailure(_) => "generation_failure",
            Self::InvalidCurriculum(_) => "invalid_curriculum",
            Self::SummaryRequired { .. } => "summary_required",
        }
    }
}

impl From<GenerationError> for EngineError {
    fn from(e: GenerationError) -> Self {
        match e {
            GenerationError::Timeout(after) => Self::GenerationTimeout(after),
            other => Self::GenerationFailure(other.to_string()),
        }
    }
}
