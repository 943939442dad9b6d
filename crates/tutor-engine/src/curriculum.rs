use std::collections::HashSet;

use serde::Serialize;

use crate::error::EngineError;

/// Topic names that get a network diagram hint when a session reaches them.
const NETWORK_KEYWORDS: [&str; 9] = [
    "vpc",
    "subnet",
    "security group",
    "nacl",
    "route",
    "gateway",
    "peering",
    "privatelink",
    "endpoint",
];

/// Case-insensitive substring match against the network vocabulary.
pub fn is_network_topic(topic: &str) -> bool {
    let lower = topic.to_lowercase();
    NETWORK_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// Position of a topic relative to the cursor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicStatus {
    Completed,
    InProgress,
    Pending,
}

impl TopicStatus {
    pub fn relative(idx: usize, current: usize) -> Self {
        match idx.cmp(&current) {
            std::cmp::Ordering::Less => Self::Completed,
            std::cmp::Ordering::Equal => Self::InProgress,
            std::cmp::Ordering::Greater => Self::Pending,
        }
    }

    pub fn glyph(&self) -> &'static str {
        match self {
            Self::Completed => "✅",
            Self::InProgress => "🔄",
            Self::Pending => "⏳",
        }
    }
}

/// Ordered, non-empty topic list with a cursor that only moves forward.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Curriculum {
    topics: Vec<String>,
    index: usize,
}

impl Curriculum {
    /// Topics are trimmed. Empty lists, blank names and duplicates are rejected:
    /// summaries are keyed by topic name.
    pub fn new<I, S>(topics: I) -> Result<Self, EngineError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let topics: Vec<String> = topics
            .into_iter()
            .map(|t| t.into().trim().to_string())
            .collect();

        if topics.is_empty() {
            return Err(EngineError::InvalidCurriculum("at least one topic is required".into()));
        }
        if topics.iter().any(String::is_empty) {
            return Err(EngineError::InvalidCurriculum("topic names must not be blank".into()));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = topics.iter().find(|t| !seen.insert(t.as_str())) {
            return Err(EngineError::InvalidCurriculum(format!("duplicate topic: {dup}")));
        }

        Ok(Self { topics, index: 0 })
    }

    /// Rebuild a curriculum at a stored cursor position.
    pub fn at<I, S>(topics: I, index: usize) -> Result<Self, EngineError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut curriculum = Self::new(topics)?;
        if index >= curriculum.topics.len() {
            return Err(EngineError::InvalidCurriculum(format!(
                "index {index} out of range for {} topics",
                curriculum.topics.len()
            )));
        }
        curriculum.index = index;
        Ok(curriculum)
    }

    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    pub fn current_index(&self) -> usize {
        self.index
    }

    pub fn current_topic(&self) -> &str {
        &self.topics[self.index]
    }

    pub fn is_multi_objective(&self) -> bool {
        self.topics.len() > 1
    }

    pub fn is_last(&self) -> bool {
        self.index + 1 == self.topics.len()
    }

    /// Topics strictly before the cursor.
    pub fn completed(&self) -> &[String] {
        &self.topics[..self.index]
    }

    pub fn status(&self, idx: usize) -> TopicStatus {
        TopicStatus::relative(idx, self.index)
    }

    /// Move to the next topic. Returns false at the last topic.
    pub(crate) fn step_forward(&mut self) -> bool {
        if self.is_last() {
            return false;
        }
        self.index += 1;
        true
    }
}
