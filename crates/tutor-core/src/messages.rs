use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who produced a turn in the session history.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    Learner,
    Tutor,
}

impl std::fmt::Display for Speaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Learner => write!(f, "learner"),
            Self::Tutor => write!(f, "tutor"),
        }
    }
}

impl std::str::FromStr for Speaker {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "learner" => Ok(Self::Learner),
            "tutor" => Ok(Self::Tutor),
            other => Err(format!("unknown speaker: {other}")),
        }
    }
}

/// One entry of a session's history. Only ever rendered, never replayed
/// into a generation context.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub speaker: Speaker,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn learner(text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            speaker: Speaker::Learner,
            text: text.into(),
            timestamp,
        }
    }

    pub fn tutor(text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            speaker: Speaker::Tutor,
            text: text.into(),
            timestamp,
        }
    }

    pub fn is_learner(&self) -> bool {
        self.speaker == Speaker::Learner
    }
}

/// Role tag on a block handed to the generation collaborator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockRole {
    /// Framing instructions, rebuilt on every turn.
    System,
    Learner,
    Tutor,
}

impl BlockRole {
    /// Role name used by chat-completion style APIs.
    pub fn chat_role(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Learner => "user",
            Self::Tutor => "assistant",
        }
    }
}

/// A role-tagged text block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptBlock {
    pub role: BlockRole,
    pub content: String,
}

impl PromptBlock {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: BlockRole::System,
            content: content.into(),
        }
    }

    pub fn learner(content: impl Into<String>) -> Self {
        Self {
            role: BlockRole::Learner,
            content: content.into(),
        }
    }
}
