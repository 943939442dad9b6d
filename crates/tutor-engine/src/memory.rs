use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use tutor_core::messages::Turn;

use crate::extract::extract_summary;

/// Mutable per-learner state.
///
/// `history` is kept for the transcript only; it never feeds the generator.
#[derive(Clone, Debug, Default)]
pub struct SessionMemory {
    /// Summary of the topic under the cursor. Cleared on advance.
    pub current_summary: String,
    /// Finalized summaries of topics that were left, keyed by topic name.
    pub summary_by_topic: BTreeMap<String, String>,
    pub history: Vec<Turn>,
    /// Learner turns that carried a summary.
    pub turn_count: u32,
    pub last_reply: Option<String>,
    /// Adds scenario-style framing to every composed prompt.
    pub interaction_mode: bool,
    /// Set once the session reaches a network topic; never reset.
    pub visual_hint: bool,
}

impl SessionMemory {
    pub fn new(interaction_mode: bool) -> Self {
        Self {
            interaction_mode,
            ..Default::default()
        }
    }

    /// Record a learner turn, picking up its `<IS>` summary if present.
    ///
    /// The full text is appended to history either way.
    pub fn record_learner_turn(&mut self, text: &str, at: DateTime<Utc>) -> bool {
        let found = extract_summary(text);
        let had_summary = found.is_some();
        if let Some(summary) = found {
            self.current_summary = summary;
            self.turn_count += 1;
        }
        self.history.push(Turn::learner(text, at));
        had_summary
    }

    pub fn record_reply(&mut self, text: &str, at: DateTime<Utc>) {
        self.last_reply = Some(text.to_string());
        self.history.push(Turn::tutor(text, at));
    }

    /// Move the current summary into `summary_by_topic[topic]` if non-empty.
    pub(crate) fn commit_summary(&mut self, topic: &str) {
        if !self.current_summary.is_empty() {
            self.summary_by_topic
                .insert(topic.to_string(), self.current_summary.clone());
        }
    }
}
