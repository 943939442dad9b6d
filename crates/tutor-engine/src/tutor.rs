use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use tutor_core::clock::{Clock, SystemClock};
use tutor_core::ids::LearnerKey;
use tutor_core::messages::{PromptBlock, Turn};
use tutor_core::provider::Generator;
use tutor_core::snapshot::SessionSnapshot;

use crate::curriculum::Curriculum;
use crate::error::EngineError;
use crate::render::TranscriptOptions;
use crate::session::{LearnerSession, Progress, SessionFlags};
use crate::store::MemoryStore;

const TIP_ADVANCE: &str = "Summary saved. Advance when you are ready for the next topic.";
const TIP_EXPORT: &str = "Summary saved. This was the last topic; export your notes when you are done.";
const TIP_SUMMARIZE: &str = "Wrap your understanding in <IS>...</IS> tags to save it.";

#[derive(Clone, Debug)]
pub struct TutorConfig {
    pub transcript: TranscriptOptions,
    pub interaction_mode_default: bool,
}

impl Default for TutorConfig {
    fn default() -> Self {
        Self {
            transcript: TranscriptOptions::default(),
            interaction_mode_default: true,
        }
    }
}

/// Result of one learner turn.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnOutcome {
    pub reply: String,
    pub had_summary: bool,
    pub turn_count: u32,
    pub progress: Progress,
    pub tip: &'static str,
    /// A summary is saved and there is a topic after this one.
    pub can_advance: bool,
    /// Timestamps of the learner turn and the reply as kept in history.
    pub learner_at: DateTime<Utc>,
    pub replied_at: DateTime<Utc>,
}

/// Keyed facade over learner sessions plus the turn pipeline.
pub struct Tutor {
    store: MemoryStore,
    generator: Arc<dyn Generator>,
    clock: Arc<dyn Clock>,
    config: TutorConfig,
}

impl Tutor {
    pub fn new(generator: Arc<dyn Generator>, config: TutorConfig) -> Self {
        Self::with_clock(generator, Arc::new(SystemClock), config)
    }

    pub fn with_clock(generator: Arc<dyn Generator>, clock: Arc<dyn Clock>, config: TutorConfig) -> Self {
        Self {
            store: MemoryStore::new(),
            generator,
            clock,
            config,
        }
    }

    pub fn generator(&self) -> &Arc<dyn Generator> {
        &self.generator
    }

    pub fn config(&self) -> &TutorConfig {
        &self.config
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn is_active(&self, key: &LearnerKey) -> bool {
        self.store.contains(key)
    }

    /// Start a fresh session, replacing any existing one for `key`.
    pub fn init<I, S>(&self, key: &LearnerKey, topics: I) -> Result<Progress, EngineError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let curriculum = Curriculum::new(topics)?;
        let session = LearnerSession::new(curriculum, self.config.interaction_mode_default);
        let progress = session.progress();
        self.store.insert(key.clone(), session);
        info!(learner = %key, topics = progress.total_topics, "session initialized");
        Ok(progress)
    }

    /// Rebuild a session from its durable fields.
    pub fn restore(
        &self,
        key: &LearnerKey,
        snapshot: SessionSnapshot,
        flags: SessionFlags,
    ) -> Result<Progress, EngineError> {
        let session = LearnerSession::from_snapshot(snapshot, flags)?;
        let progress = session.progress();
        self.store.insert(key.clone(), session);
        info!(learner = %key, index = progress.current_index, "session restored");
        Ok(progress)
    }

    pub fn load_history(&self, key: &LearnerKey, turns: Vec<Turn>) -> Result<(), EngineError> {
        self.store.with_session(key, |s| s.load_history(turns))
    }

    pub fn evict(&self, key: &LearnerKey) -> bool {
        self.store.evict(key)
    }

    pub fn extract(&self, key: &LearnerKey, learner_text: &str) -> Result<bool, EngineError> {
        let at = self.clock.now();
        self.store.with_session(key, |s| s.extract(learner_text, at))
    }

    pub fn compose(&self, key: &LearnerKey, learner_text: &str) -> Result<Vec<PromptBlock>, EngineError> {
        self.store.with_session(key, |s| s.compose(learner_text))
    }

    /// Move to the next topic. Without `force`, an empty current summary is
    /// refused with [`EngineError::SummaryRequired`].
    pub fn advance(&self, key: &LearnerKey, force: bool) -> Result<bool, EngineError> {
        self.store.with_session(key, |s| {
            if !force && s.memory.current_summary.is_empty() {
                return Err(EngineError::SummaryRequired {
                    topic: s.curriculum.current_topic().to_string(),
                });
            }
            let from = s.curriculum.current_topic().to_string();
            let moved = s.advance();
            if moved {
                info!(learner = %key, from = %from, to = %s.curriculum.current_topic(), "advanced topic");
            } else {
                debug!(learner = %key, topic = %from, "already at last topic");
            }
            Ok(moved)
        })?
    }

    pub fn record_reply(&self, key: &LearnerKey, reply: &str) -> Result<(), EngineError> {
        let at = self.clock.now();
        self.store.with_session(key, |s| s.memory.record_reply(reply, at))
    }

    pub fn progress(&self, key: &LearnerKey) -> Result<Progress, EngineError> {
        self.store.with_session(key, |s| s.progress())
    }

    pub fn render(&self, key: &LearnerKey) -> Result<String, EngineError> {
        let at = self.clock.now();
        self.store
            .with_session(key, |s| s.render(&self.config.transcript, at))
    }

    pub fn snapshot(&self, key: &LearnerKey) -> Result<SessionSnapshot, EngineError> {
        self.store.with_session(key, |s| s.snapshot())
    }

    pub fn set_interaction_mode(&self, key: &LearnerKey, enabled: bool) -> Result<(), EngineError> {
        self.store
            .with_session(key, |s| s.memory.interaction_mode = enabled)
    }

    pub fn flags(&self, key: &LearnerKey) -> Result<SessionFlags, EngineError> {
        self.store.with_session(key, |s| s.flags())
    }

    pub async fn submit_turn(
        &self,
        key: &LearnerKey,
        learner_text: &str,
        interaction_mode: Option<bool>,
    ) -> Result<TurnOutcome, EngineError> {
        let sent_at = self.clock.now();
        self.submit_turn_at(key, learner_text, interaction_mode, sent_at).await
    }

    /// Extract, compose, generate and record the reply. The learner turn is
    /// stamped `sent_at` so callers that persist it can use the same instant,
    /// even when generation fails.
    ///
    /// The session lock is released while the generator runs.
    pub async fn submit_turn_at(
        &self,
        key: &LearnerKey,
        learner_text: &str,
        interaction_mode: Option<bool>,
        sent_at: DateTime<Utc>,
    ) -> Result<TurnOutcome, EngineError> {
        let (had_summary, blocks) = self.store.with_session(key, |s| {
            if let Some(enabled) = interaction_mode {
                s.memory.interaction_mode = enabled;
            }
            let had_summary = s.extract(learner_text, sent_at);
            (had_summary, s.compose(learner_text))
        })?;
        debug!(learner = %key, had_summary, framing_len = blocks[0].content.len(), "composed context");

        let reply = match self.generator.generate(&blocks).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(learner = %key, error = %e, kind = e.error_kind(), "generation failed");
                return Err(e.into());
            }
        };

        let replied_at = self.clock.now();
        self.store.with_session(key, |s| {
            s.memory.record_reply(&reply, replied_at);
            let is_last = s.curriculum.is_last();
            let tip = match (had_summary, is_last) {
                (true, false) => TIP_ADVANCE,
                (true, true) => TIP_EXPORT,
                (false, _) => TIP_SUMMARIZE,
            };
            TurnOutcome {
                reply: reply.clone(),
                had_summary,
                turn_count: s.memory.turn_count,
                progress: s.progress(),
                tip,
                can_advance: !s.memory.current_summary.is_empty() && !is_last,
                learner_at: sent_at,
                replied_at,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;
    use std::time::Duration;
    use tutor_core::clock::FixedClock;
    use tutor_core::errors::GenerationError;
    use tutor_core::messages::BlockRole;
    use tutor_llm::{MockGenerator, MockReply};

    fn tutor_with(generator: Arc<dyn Generator>) -> Tutor {
        let clock = FixedClock(Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap());
        Tutor::with_clock(generator, Arc::new(clock), TutorConfig::default())
    }

    fn tutor() -> Tutor {
        tutor_with(Arc::new(MockGenerator::always("ok")))
    }

    fn key() -> LearnerKey {
        LearnerKey::from("alice")
    }

    #[test]
    fn framing_does_not_grow_with_history() {
        let short = tutor();
        short.init(&key(), ["IAM", "VPC"]).unwrap();
        short.extract(&key(), "<IS>policies</IS>").unwrap();

        let long = tutor();
        long.init(&key(), ["IAM", "VPC"]).unwrap();
        for i in 0..999 {
            long.extract(&key(), &format!("question {i}")).unwrap();
            long.record_reply(&key(), "answer").unwrap();
        }
        long.extract(&key(), "<IS>policies</IS>").unwrap();

        let a = short.compose(&key(), "next?").unwrap();
        let b = long.compose(&key(), "next?").unwrap();
        assert_eq!(a.len(), 2);
        assert_eq!(b.len(), 2);
        assert_eq!(a[0].content, b[0].content);
        assert!(!b[0].content.contains("question 1"));
    }

    #[test]
    fn extract_appends_once_per_call() {
        let t = tutor();
        t.init(&key(), ["VPC"]).unwrap();
        assert!(t.extract(&key(), "<IS>x</IS>").unwrap());
        assert!(!t.extract(&key(), "plain").unwrap());
        let history_len = t.store.with_session(&key(), |s| s.memory.history.len()).unwrap();
        assert_eq!(history_len, 2);
    }

    #[test]
    fn advance_requires_summary_unless_forced() {
        let t = tutor();
        t.init(&key(), ["IAM", "VPC"]).unwrap();
        let err = t.advance(&key(), false).unwrap_err();
        assert!(matches!(err, EngineError::SummaryRequired { ref topic } if topic == "IAM"));
        assert!(t.advance(&key(), true).unwrap());
        assert_eq!(t.progress(&key()).unwrap().current_topic, "VPC");
        assert!(t.flags(&key()).unwrap().visual_hint);
    }

    #[test]
    fn two_topic_round_trip() {
        let t = tutor();
        t.init(&key(), ["A", "B"]).unwrap();
        t.extract(&key(), "<IS>foo</IS>").unwrap();
        assert!(t.advance(&key(), false).unwrap());
        t.extract(&key(), "<IS>bar</IS>").unwrap();
        assert!(!t.advance(&key(), false).unwrap());

        let expected: BTreeMap<String, String> =
            [("A".to_string(), "foo".to_string()), ("B".to_string(), "bar".to_string())].into();
        assert_eq!(t.snapshot(&key()).unwrap().summary_by_topic, expected);
    }

    #[test]
    fn unknown_key_is_session_not_found_everywhere() {
        let t = tutor();
        let k = LearnerKey::from("ghost");
        assert!(matches!(t.compose(&k, "hi"), Err(EngineError::SessionNotFound(_))));
        assert!(matches!(t.extract(&k, "hi"), Err(EngineError::SessionNotFound(_))));
        assert!(matches!(t.advance(&k, true), Err(EngineError::SessionNotFound(_))));
        assert!(matches!(t.render(&k), Err(EngineError::SessionNotFound(_))));

        t.init(&k, ["VPC"]).unwrap();
        assert!(t.evict(&k));
        assert!(matches!(t.render(&k), Err(EngineError::SessionNotFound(_))));
    }

    #[test]
    fn restore_then_load_history_renders_old_turns() {
        let t = tutor();
        let mut snap = SessionSnapshot::fresh(vec!["VPC".into()]);
        snap.current_summary = "isolated".into();
        snap.turn_count = 1;
        let flags = SessionFlags { interaction_mode: false, visual_hint: true };
        t.restore(&key(), snap, flags).unwrap();

        let at = Utc.with_ymd_and_hms(2026, 2, 1, 8, 0, 0).unwrap();
        t.load_history(&key(), vec![Turn::learner("<IS>isolated</IS>", at), Turn::tutor("Right.", at)])
            .unwrap();
        let md = t.render(&key()).unwrap();
        assert!(md.contains("## 📝 Step 1: My understanding"));
        assert!(md.contains("Right."));
        assert_eq!(t.flags(&key()).unwrap(), flags);
    }

    #[tokio::test]
    async fn submit_turn_sends_two_blocks_and_records_reply() {
        let mock = Arc::new(MockGenerator::new(vec![
            MockReply::text("Good summary."),
            MockReply::text("Ask away."),
        ]));
        let t = tutor_with(mock.clone());
        t.init(&key(), ["IAM", "VPC"]).unwrap();

        let first = t.submit_turn(&key(), "<IS>roles and policies</IS>", None).await.unwrap();
        assert!(first.had_summary);
        assert!(first.can_advance);
        assert_eq!(first.tip, TIP_ADVANCE);
        assert_eq!(first.reply, "Good summary.");
        assert_eq!(first.turn_count, 1);

        let second = t.submit_turn(&key(), "what about MFA?", Some(false)).await.unwrap();
        assert!(!second.had_summary);
        assert_eq!(second.tip, TIP_SUMMARIZE);
        // The summary from the first turn is still saved.
        assert!(second.can_advance);

        assert_eq!(mock.call_count(), 2);
        for call in mock.calls() {
            assert_eq!(call.len(), 2);
            assert_eq!(call[0].role, BlockRole::System);
        }
        let last = mock.last_call().unwrap();
        assert_eq!(last[1].content, "what about MFA?");
        assert!(last[0].content.contains("roles and policies"));
        assert!(!last[0].content.contains("Scenario mode"));

        let history = t.store.with_session(&key(), |s| s.memory.history.len()).unwrap();
        assert_eq!(history, 4);
    }

    #[tokio::test]
    async fn outcome_carries_history_timestamps() {
        let t = tutor();
        t.init(&key(), ["IAM", "VPC"]).unwrap();
        let sent_at = Utc.with_ymd_and_hms(2026, 3, 1, 9, 29, 0).unwrap();

        let outcome = t.submit_turn_at(&key(), "hello", None, sent_at).await.unwrap();
        assert_eq!(outcome.learner_at, sent_at);
        assert_eq!(outcome.replied_at, t.now());

        let stamps: Vec<_> = t
            .store
            .with_session(&key(), |s| s.memory.history.iter().map(|turn| turn.timestamp).collect())
            .unwrap();
        assert_eq!(stamps, vec![outcome.learner_at, outcome.replied_at]);
    }

    #[tokio::test]
    async fn last_topic_summary_suggests_export() {
        let t = tutor();
        t.init(&key(), ["VPC"]).unwrap();
        let outcome = t.submit_turn(&key(), "<IS>isolated network</IS>", None).await.unwrap();
        assert_eq!(outcome.tip, TIP_EXPORT);
        assert!(!outcome.can_advance);
    }

    #[tokio::test]
    async fn generation_errors_map_and_keep_learner_turn() {
        let mock = Arc::new(MockGenerator::new(vec![
            MockReply::Error(GenerationError::Timeout(Duration::from_secs(60))),
            MockReply::Error(GenerationError::Failure("exit status 1".into())),
        ]));
        let t = tutor_with(mock);
        t.init(&key(), ["VPC"]).unwrap();

        let err = t.submit_turn(&key(), "<IS>x</IS>", None).await.unwrap_err();
        assert!(matches!(err, EngineError::GenerationTimeout(_)));
        let err = t.submit_turn(&key(), "again", None).await.unwrap_err();
        assert!(matches!(err, EngineError::GenerationFailure(ref m) if m.contains("exit status 1")));

        let snap = t.snapshot(&key()).unwrap();
        assert_eq!(snap.current_summary, "x");
        let history = t.store.with_session(&key(), |s| s.memory.history.len()).unwrap();
        assert_eq!(history, 2);
    }
}
