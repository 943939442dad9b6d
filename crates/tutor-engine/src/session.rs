use chrono::{DateTime, Utc};
use serde::Serialize;

use tutor_core::messages::{PromptBlock, Turn};
use tutor_core::snapshot::SessionSnapshot;

use crate::compose::{self, PromptConfig};
use crate::curriculum::{is_network_topic, Curriculum};
use crate::error::EngineError;
use crate::memory::SessionMemory;
use crate::render::{self, TranscriptOptions};

/// Where a learner stands in their curriculum.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub current_topic: String,
    pub current_index: usize,
    pub total_topics: usize,
    pub completed_topics: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionFlags {
    pub interaction_mode: bool,
    pub visual_hint: bool,
}

/// A learner's curriculum and memory, always locked together.
#[derive(Clone, Debug)]
pub struct LearnerSession {
    pub curriculum: Curriculum,
    pub memory: SessionMemory,
}

impl LearnerSession {
    pub fn new(curriculum: Curriculum, interaction_mode: bool) -> Self {
        Self {
            curriculum,
            memory: SessionMemory::new(interaction_mode),
        }
    }

    /// Rebuild from durable fields and the stored flags. History starts empty.
    pub fn from_snapshot(snapshot: SessionSnapshot, flags: SessionFlags) -> Result<Self, EngineError> {
        let curriculum = Curriculum::at(snapshot.topics, snapshot.current_index)?;
        if let Some(stray) = snapshot
            .summary_by_topic
            .keys()
            .find(|k| !curriculum.topics().contains(k))
        {
            return Err(EngineError::InvalidCurriculum(format!(
                "summary stored for unknown topic: {stray}"
            )));
        }
        Ok(Self {
            curriculum,
            memory: SessionMemory {
                current_summary: snapshot.current_summary,
                summary_by_topic: snapshot.summary_by_topic,
                turn_count: snapshot.turn_count,
                interaction_mode: flags.interaction_mode,
                visual_hint: flags.visual_hint,
                ..Default::default()
            },
        })
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            topics: self.curriculum.topics().to_vec(),
            current_index: self.curriculum.current_index(),
            current_summary: self.memory.current_summary.clone(),
            summary_by_topic: self.memory.summary_by_topic.clone(),
            turn_count: self.memory.turn_count,
        }
    }

    pub fn extract(&mut self, learner_text: &str, at: DateTime<Utc>) -> bool {
        self.memory.record_learner_turn(learner_text, at)
    }

    /// Commit the current summary and move to the next topic.
    ///
    /// At the last topic the summary is still committed, but the cursor and
    /// the current summary stay put and `false` is returned.
    pub fn advance(&mut self) -> bool {
        self.memory.commit_summary(self.curriculum.current_topic());
        if !self.curriculum.step_forward() {
            return false;
        }
        self.memory.current_summary.clear();
        if is_network_topic(self.curriculum.current_topic()) {
            self.memory.visual_hint = true;
        }
        true
    }

    pub fn prompt_config(&self) -> PromptConfig<'_> {
        PromptConfig {
            topics: self.curriculum.topics(),
            current_index: self.curriculum.current_index(),
            current_summary: &self.memory.current_summary,
            summary_by_topic: &self.memory.summary_by_topic,
            turn_count: self.memory.turn_count,
            interaction_mode: self.memory.interaction_mode,
        }
    }

    pub fn compose(&self, learner_text: &str) -> Vec<PromptBlock> {
        compose::compose(&self.prompt_config(), learner_text)
    }

    pub fn render(&self, options: &TranscriptOptions, generated_at: DateTime<Utc>) -> String {
        render::render(self, options, generated_at)
    }

    pub fn progress(&self) -> Progress {
        Progress {
            current_topic: self.curriculum.current_topic().to_string(),
            current_index: self.curriculum.current_index(),
            total_topics: self.curriculum.len(),
            completed_topics: self.curriculum.completed().to_vec(),
        }
    }

    pub fn flags(&self) -> SessionFlags {
        SessionFlags {
            interaction_mode: self.memory.interaction_mode,
            visual_hint: self.memory.visual_hint,
        }
    }

    /// Append previously stored turns, e.g. after a resume.
    pub fn load_history(&mut self, turns: impl IntoIterator<Item = Turn>) {
        self.memory.history.extend(turns);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn flags(interaction_mode: bool, visual_hint: bool) -> SessionFlags {
        SessionFlags { interaction_mode, visual_hint }
    }

    fn session(topics: &[&str]) -> LearnerSession {
        LearnerSession::new(Curriculum::new(topics.iter().copied()).unwrap(), false)
    }

    #[test]
    fn advance_commits_and_clears() {
        let mut s = session(&["IAM", "VPC", "S3"]);
        s.extract("<IS>identities and policies</IS>", Utc::now());
        assert!(s.advance());
        assert_eq!(s.memory.summary_by_topic["IAM"], "identities and policies");
        assert!(s.memory.current_summary.is_empty());
        assert_eq!(s.curriculum.current_topic(), "VPC");
        assert!(s.memory.visual_hint);
    }

    #[test]
    fn advance_without_summary_is_allowed() {
        let mut s = session(&["IAM", "S3"]);
        assert!(s.advance());
        assert!(s.memory.summary_by_topic.is_empty());
        assert!(!s.memory.visual_hint);
    }

    #[test]
    fn advance_at_last_topic_returns_false_and_keeps_cursor() {
        let mut s = session(&["A", "B"]);
        s.advance();
        let before = s.snapshot();
        assert!(!s.advance());
        assert_eq!(s.snapshot(), before);
    }

    #[test]
    fn round_trip_two_topics() {
        let mut s = session(&["A", "B"]);
        s.extract("<IS>foo</IS>", Utc::now());
        assert!(s.advance());
        s.extract("<IS>bar</IS>", Utc::now());
        assert!(!s.advance());

        let expected: BTreeMap<String, String> =
            [("A".to_string(), "foo".to_string()), ("B".to_string(), "bar".to_string())].into();
        assert_eq!(s.memory.summary_by_topic, expected);
    }

    #[test]
    fn visual_hint_is_sticky() {
        let mut s = session(&["IAM", "Subnet", "S3"]);
        s.advance();
        s.advance();
        assert_eq!(s.curriculum.current_topic(), "S3");
        assert!(s.memory.visual_hint);
    }

    #[test]
    fn snapshot_restore_roundtrip() {
        let mut s = session(&["IAM", "Route Tables", "S3"]);
        s.extract("<IS>who can do what</IS>", Utc::now());
        s.advance();
        s.extract("<IS>where packets go</IS>", Utc::now());

        let restored = LearnerSession::from_snapshot(s.snapshot(), flags(true, true)).unwrap();
        assert_eq!(restored.snapshot(), s.snapshot());
        assert!(restored.memory.history.is_empty());
        assert!(restored.memory.visual_hint);
        assert!(restored.memory.interaction_mode);
    }

    #[test]
    fn restore_takes_visual_hint_from_stored_flags() {
        // Cursor sits on a topic with no network keyword.
        let mut s = session(&["IAM", "VPC", "S3"]);
        s.advance();
        s.advance();
        assert!(s.memory.visual_hint);

        let restored = LearnerSession::from_snapshot(s.snapshot(), s.flags()).unwrap();
        assert_eq!(restored.flags(), s.flags());

        let plain = LearnerSession::from_snapshot(s.snapshot(), flags(false, false)).unwrap();
        assert!(!plain.memory.visual_hint);
    }

    #[test]
    fn restore_rejects_bad_index_and_stray_topic() {
        let mut snap = SessionSnapshot::fresh(vec!["A".into()]);
        snap.current_index = 3;
        assert!(LearnerSession::from_snapshot(snap, flags(false, false)).is_err());

        let mut snap = SessionSnapshot::fresh(vec!["A".into()]);
        snap.summary_by_topic.insert("Z".into(), "?".into());
        assert!(LearnerSession::from_snapshot(snap, flags(false, false)).is_err());
    }

    #[test]
    fn progress_lists_completed_topics() {
        let mut s = session(&["A", "B", "C"]);
        s.advance();
        assert_eq!(
            s.progress(),
            Progress {
                current_topic: "B".into(),
                current_index: 1,
                total_topics: 3,
                completed_topics: vec!["A".into()],
            }
        );
    }

    #[test]
    fn progress_and_flags_serialize_camel_case() {
        let s = session(&["IAM", "VPC"]);
        let json = serde_json::to_value(s.progress()).unwrap();
        assert_eq!(json["currentTopic"], "IAM");
        assert_eq!(json["totalTopics"], 2);
        assert_eq!(json["completedTopics"], serde_json::json!([]));
        let json = serde_json::to_value(s.flags()).unwrap();
        assert_eq!(json["interactionMode"], false);
        assert_eq!(json["visualHint"], false);
    }
}
