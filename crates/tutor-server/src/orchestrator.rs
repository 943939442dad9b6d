//! Learning orchestrator: connects the engine to the store.
//!
//! The engine keeps one in-memory session per learner. This layer tracks
//! which stored session that is, reloads it on demand, and persists turns
//! and progress after every operation that changes them.

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use serde::Serialize;
use tracing::{info, instrument, warn};

use tutor_core::ids::{LearnerKey, SessionId};
use tutor_core::messages::{Speaker, Turn};
use tutor_engine::{EngineError, Progress, SessionFlags, Tutor, TurnOutcome};
use tutor_store::{Database, LearningSessionRow, SessionRepo, TurnRepo, TurnRow};

use crate::error::ApiError;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartResult {
    pub session_id: SessionId,
    pub progress: Progress,
    pub flags: SessionFlags,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResult {
    pub session_id: SessionId,
    #[serde(flatten)]
    pub outcome: TurnOutcome,
    pub flags: SessionFlags,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvanceResult {
    pub session_id: SessionId,
    pub advanced: bool,
    pub progress: Progress,
    pub flags: SessionFlags,
}

/// One row of a learner's session list.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub topics: Vec<String>,
    pub current_topic: Option<String>,
    pub current_index: usize,
    pub total_topics: usize,
    pub turn_count: u32,
    pub created_at: String,
    pub updated_at: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeResult {
    pub session_id: SessionId,
    pub progress: Progress,
    pub flags: SessionFlags,
    pub message_count: usize,
}

pub struct LearningOrchestrator {
    tutor: Arc<Tutor>,
    db: Database,
    /// Which stored session each learner's in-memory state belongs to.
    active: DashMap<LearnerKey, SessionId>,
}

impl LearningOrchestrator {
    pub fn new(tutor: Arc<Tutor>, db: Database) -> Self {
        Self {
            tutor,
            db,
            active: DashMap::new(),
        }
    }

    pub fn tutor(&self) -> &Arc<Tutor> {
        &self.tutor
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn active_session(&self, learner: &LearnerKey) -> Option<SessionId> {
        self.active.get(learner).map(|e| e.value().clone())
    }

    /// Start a new session, replacing whatever the learner had in memory.
    #[instrument(skip(self, topics), fields(learner = %learner))]
    pub fn start(&self, learner: &LearnerKey, topics: Vec<String>) -> Result<StartResult, ApiError> {
        // Validate through the engine first so a bad curriculum never reaches the store.
        let progress = self.tutor.init(learner, topics)?;
        let snapshot = self.tutor.snapshot(learner)?;
        let flags = self.tutor.flags(learner)?;

        // Registers the learner in the same transaction.
        let created = SessionRepo::new(self.db.clone()).create(learner, &snapshot.topics, flags.interaction_mode);
        let row = match created {
            Ok(row) => row,
            Err(e) => {
                self.tutor.evict(learner);
                return Err(e.into());
            }
        };
        self.active.insert(learner.clone(), row.id.clone());
        info!(session_id = %row.id, topics = progress.total_topics, "learning session started");

        Ok(StartResult {
            session_id: row.id,
            progress,
            flags,
        })
    }

    /// Submit one learner turn and persist both sides of the exchange.
    #[instrument(skip(self, message), fields(learner = %learner))]
    pub async fn chat(
        &self,
        learner: &LearnerKey,
        message: &str,
        session_id: Option<SessionId>,
        interaction_mode: Option<bool>,
    ) -> Result<ChatResult, ApiError> {
        let session_id = self.ensure_loaded(learner, session_id)?;
        let started = Instant::now();

        // Stored turns carry the same timestamps as the engine's history.
        let sent_at = self.tutor.now();
        let result = self
            .tutor
            .submit_turn_at(learner, message, interaction_mode, sent_at)
            .await;

        let turns = TurnRepo::new(self.db.clone());
        turns.append_at(&session_id, Speaker::Learner, message, sent_at)?;
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                // The learner turn and any summary it carried are kept.
                self.persist_progress(learner, &session_id)?;
                warn!(session_id = %session_id, error = %e, kind = e.error_kind(), "turn failed");
                return Err(e.into());
            }
        };
        turns.append_at(&session_id, Speaker::Tutor, &outcome.reply, outcome.replied_at)?;
        let flags = self.persist_progress(learner, &session_id)?;

        info!(
            session_id = %session_id,
            had_summary = outcome.had_summary,
            turn_count = outcome.turn_count,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "turn completed"
        );
        Ok(ChatResult {
            session_id,
            outcome,
            flags,
        })
    }

    #[instrument(skip(self), fields(learner = %learner))]
    pub fn advance(
        &self,
        learner: &LearnerKey,
        session_id: Option<SessionId>,
        force: bool,
    ) -> Result<AdvanceResult, ApiError> {
        let session_id = self.ensure_loaded(learner, session_id)?;
        let advanced = self.tutor.advance(learner, force)?;
        let flags = self.persist_progress(learner, &session_id)?;
        Ok(AdvanceResult {
            session_id,
            advanced,
            progress: self.tutor.progress(learner)?,
            flags,
        })
    }

    pub fn progress(&self, learner: &LearnerKey) -> Result<(Progress, SessionFlags), ApiError> {
        Ok((self.tutor.progress(learner)?, self.tutor.flags(learner)?))
    }

    pub fn export(&self, learner: &LearnerKey) -> Result<String, ApiError> {
        Ok(self.tutor.render(learner)?)
    }

    pub fn sessions(&self, learner: &LearnerKey) -> Result<Vec<SessionSummary>, ApiError> {
        let active = self.active_session(learner);
        let rows = SessionRepo::new(self.db.clone()).list_for_learner(learner)?;
        Ok(rows
            .into_iter()
            .map(|row| SessionSummary {
                is_active: active.as_ref() == Some(&row.id),
                current_topic: row.current_topic().map(str::to_string),
                total_topics: row.topics.len(),
                session_id: row.id,
                topics: row.topics,
                current_index: row.current_index,
                turn_count: row.turn_count,
                created_at: row.created_at,
                updated_at: row.updated_at,
            })
            .collect())
    }

    /// Load a stored session into memory for `learner`.
    #[instrument(skip(self), fields(learner = %learner, session_id = %session_id))]
    pub fn resume(&self, learner: &LearnerKey, session_id: &SessionId) -> Result<ResumeResult, ApiError> {
        let row = SessionRepo::new(self.db.clone()).get(session_id)?;
        if row.learner != *learner {
            warn!(owner = %row.learner, "resume refused");
            return Err(ApiError::Forbidden(format!(
                "session {session_id} belongs to another learner"
            )));
        }
        let message_count = self.load(learner, row)?;
        Ok(ResumeResult {
            session_id: session_id.clone(),
            progress: self.tutor.progress(learner)?,
            flags: self.tutor.flags(learner)?,
            message_count,
        })
    }

    pub fn messages(&self, session_id: &SessionId) -> Result<Vec<TurnRow>, ApiError> {
        // Distinguish an unknown session from an empty one.
        SessionRepo::new(self.db.clone()).get(session_id)?;
        Ok(TurnRepo::new(self.db.clone()).list(session_id)?)
    }

    /// The stored session backing this learner's memory, loading it if needed.
    fn ensure_loaded(
        &self,
        learner: &LearnerKey,
        requested: Option<SessionId>,
    ) -> Result<SessionId, ApiError> {
        let active = self
            .active_session(learner)
            .filter(|_| self.tutor.is_active(learner));
        match (active, requested) {
            (Some(active), None) => Ok(active),
            (Some(active), Some(requested)) if active == requested => Ok(active),
            (_, Some(requested)) => {
                self.resume(learner, &requested)?;
                Ok(requested)
            }
            (None, None) => Err(EngineError::SessionNotFound(learner.clone()).into()),
        }
    }

    /// Restore memory from a stored row and replay its turns into history.
    fn load(&self, learner: &LearnerKey, row: LearningSessionRow) -> Result<usize, ApiError> {
        let turns: Vec<Turn> = TurnRepo::new(self.db.clone())
            .list(&row.id)?
            .into_iter()
            .map(Turn::from)
            .collect();
        let count = turns.len();
        let flags = SessionFlags {
            interaction_mode: row.interaction_mode,
            visual_hint: row.visual_hint,
        };
        self.tutor.restore(learner, row.snapshot(), flags)?;
        self.tutor.load_history(learner, turns)?;
        self.active.insert(learner.clone(), row.id.clone());
        info!(session_id = %row.id, turns = count, "session loaded");
        Ok(count)
    }

    fn persist_progress(&self, learner: &LearnerKey, session_id: &SessionId) -> Result<SessionFlags, ApiError> {
        let snapshot = self.tutor.snapshot(learner)?;
        let flags = self.tutor.flags(learner)?;
        let sessions = SessionRepo::new(self.db.clone());
        sessions.save_progress(session_id, &snapshot)?;
        sessions.save_modes(session_id, flags.interaction_mode, flags.visual_hint)?;
        Ok(flags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use chrono::Utc;
    use tutor_core::errors::GenerationError;
    use tutor_store::LearnerRepo;
    use tutor_engine::TutorConfig;
    use tutor_llm::{MockGenerator, MockReply};

    fn orchestrator(replies: Vec<MockReply>) -> LearningOrchestrator {
        let mock = if replies.is_empty() {
            MockGenerator::always("ok")
        } else {
            MockGenerator::new(replies)
        };
        let tutor = Tutor::new(Arc::new(mock), TutorConfig::default());
        LearningOrchestrator::new(Arc::new(tutor), Database::in_memory().unwrap())
    }

    fn alice() -> LearnerKey {
        LearnerKey::from("alice")
    }

    #[tokio::test]
    async fn chat_persists_both_turns_and_progress() {
        let orch = orchestrator(vec![MockReply::text("Well put.")]);
        let started = orch.start(&alice(), vec!["IAM".into(), "VPC".into()]).unwrap();

        let result = orch
            .chat(&alice(), "<IS>roles and policies</IS>", None, None)
            .await
            .unwrap();
        assert_eq!(result.outcome.reply, "Well put.");
        assert!(result.outcome.can_advance);

        let stored = orch.messages(&started.session_id).unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].speaker, Speaker::Learner);
        assert_eq!(stored[1].content, "Well put.");

        let row = SessionRepo::new(orch.db().clone()).get(&started.session_id).unwrap();
        assert_eq!(row.current_summary, "roles and policies");
        assert_eq!(row.turn_count, 1);
    }

    #[tokio::test]
    async fn stored_turns_keep_send_and_reply_times() {
        let delay = Duration::from_millis(300);
        let orch = orchestrator(vec![MockReply::delayed(delay, MockReply::text("ok"))]);
        let started = orch.start(&alice(), vec!["VPC".into()]).unwrap();

        let sent = Utc::now();
        let result = orch.chat(&alice(), "<IS>isolated</IS>", None, None).await.unwrap();

        let stored = orch.messages(&started.session_id).unwrap();
        assert_eq!(stored[0].timestamp, result.outcome.learner_at);
        assert_eq!(stored[1].timestamp, result.outcome.replied_at);
        let lag = (stored[0].timestamp - sent).num_milliseconds();
        assert!(lag < 250, "learner turn stored {lag}ms after send");
        let gap = (stored[1].timestamp - stored[0].timestamp).num_milliseconds();
        assert!(gap >= 300, "reply stored only {gap}ms after the learner turn");
    }

    #[tokio::test]
    async fn failed_generation_stores_learner_turn_at_send_time() {
        let delay = Duration::from_millis(300);
        let failure = MockReply::Error(GenerationError::Failure("boom".into()));
        let orch = orchestrator(vec![MockReply::delayed(delay, failure)]);
        let started = orch.start(&alice(), vec!["VPC".into()]).unwrap();

        let sent = Utc::now();
        orch.chat(&alice(), "hello", None, None).await.unwrap_err();

        let stored = orch.messages(&started.session_id).unwrap();
        assert_eq!(stored.len(), 1);
        let lag = (stored[0].timestamp - sent).num_milliseconds();
        assert!(lag < 250, "learner turn stored {lag}ms after send");
    }

    #[tokio::test]
    async fn blank_message_is_an_ordinary_turn() {
        let orch = orchestrator(Vec::new());
        let started = orch.start(&alice(), vec!["VPC".into()]).unwrap();

        let result = orch.chat(&alice(), "   ", None, None).await.unwrap();
        assert!(!result.outcome.had_summary);
        assert_eq!(result.outcome.turn_count, 1);
        assert_eq!(orch.messages(&started.session_id).unwrap().len(), 2);
    }

    #[test]
    fn start_registers_the_learner() {
        let orch = orchestrator(Vec::new());
        orch.start(&alice(), vec!["VPC".into()]).unwrap();
        orch.start(&alice(), vec!["IAM".into()]).unwrap();

        let learner = LearnerRepo::new(orch.db().clone()).get(&alice()).unwrap();
        assert_eq!(learner.learner_key, alice());
        assert_eq!(orch.sessions(&alice()).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn failed_generation_keeps_learner_turn() {
        let orch = orchestrator(vec![MockReply::Error(GenerationError::Failure("boom".into()))]);
        let started = orch.start(&alice(), vec!["VPC".into()]).unwrap();

        let err = orch.chat(&alice(), "<IS>isolated</IS>", None, None).await.unwrap_err();
        assert_eq!(err.code(), "GENERATION_FAILURE");

        let stored = orch.messages(&started.session_id).unwrap();
        assert_eq!(stored.len(), 1);
        let row = SessionRepo::new(orch.db().clone()).get(&started.session_id).unwrap();
        assert_eq!(row.current_summary, "isolated");
    }

    #[test]
    fn advance_persists_summary_map_and_visual_hint() {
        let orch = orchestrator(Vec::new());
        let started = orch.start(&alice(), vec!["IAM".into(), "Subnets".into()]).unwrap();
        orch.tutor().extract(&alice(), "<IS>who can do what</IS>").unwrap();

        let result = orch.advance(&alice(), None, false).unwrap();
        assert!(result.advanced);
        assert!(result.flags.visual_hint);

        let row = SessionRepo::new(orch.db().clone()).get(&started.session_id).unwrap();
        assert_eq!(row.current_index, 1);
        assert_eq!(row.summary_by_topic["IAM"], "who can do what");
        assert!(row.visual_hint);
    }

    #[test]
    fn resume_restores_the_stored_visual_hint() {
        let orch = orchestrator(Vec::new());
        let started = orch.start(&alice(), vec!["IAM".into(), "VPC".into(), "S3".into()]).unwrap();
        orch.advance(&alice(), None, true).unwrap();
        orch.advance(&alice(), None, true).unwrap();

        // Cursor is on S3, which says nothing about networking.
        orch.tutor().evict(&alice());
        let resumed = orch.resume(&alice(), &started.session_id).unwrap();
        assert_eq!(resumed.progress.current_topic, "S3");
        assert!(resumed.flags.visual_hint);

        let sessions = SessionRepo::new(orch.db().clone());
        sessions.save_modes(&started.session_id, false, false).unwrap();
        orch.tutor().evict(&alice());
        let resumed = orch.resume(&alice(), &started.session_id).unwrap();
        assert_eq!(resumed.flags, SessionFlags { interaction_mode: false, visual_hint: false });
    }

    #[test]
    fn advance_without_summary_is_refused() {
        let orch = orchestrator(Vec::new());
        orch.start(&alice(), vec!["IAM".into(), "S3".into()]).unwrap();
        let err = orch.advance(&alice(), None, false).unwrap_err();
        assert_eq!(err.code(), "SUMMARY_REQUIRED");
    }

    #[tokio::test]
    async fn resume_after_eviction_restores_state_and_history() {
        let orch = orchestrator(vec![MockReply::text("Right.")]);
        let started = orch.start(&alice(), vec!["VPC".into()]).unwrap();
        orch.chat(&alice(), "<IS>isolated network</IS>", None, None).await.unwrap();

        orch.tutor().evict(&alice());
        assert!(orch.export(&alice()).is_err());

        let resumed = orch.resume(&alice(), &started.session_id).unwrap();
        assert_eq!(resumed.message_count, 2);
        let md = orch.export(&alice()).unwrap();
        assert!(md.contains("## 📝 Step 1: My understanding"));
        assert!(md.contains("Right."));
    }

    #[test]
    fn resume_by_another_learner_is_forbidden() {
        let orch = orchestrator(Vec::new());
        let started = orch.start(&alice(), vec!["VPC".into()]).unwrap();
        let err = orch.resume(&LearnerKey::from("mallory"), &started.session_id).unwrap_err();
        assert_eq!(err.code(), "FORBIDDEN");
    }

    #[tokio::test]
    async fn chat_with_session_id_loads_it_on_demand() {
        let orch = orchestrator(vec![MockReply::text("Hi again.")]);
        let started = orch.start(&alice(), vec!["VPC".into()]).unwrap();
        orch.tutor().evict(&alice());

        let result = orch
            .chat(&alice(), "still there?", Some(started.session_id.clone()), None)
            .await
            .unwrap();
        assert_eq!(result.session_id, started.session_id);
    }

    #[tokio::test]
    async fn chat_without_session_is_not_found() {
        let orch = orchestrator(Vec::new());
        let err = orch.chat(&alice(), "hello", None, None).await.unwrap_err();
        assert_eq!(err.code(), "SESSION_NOT_FOUND");
    }

    #[test]
    fn bad_curriculum_creates_nothing() {
        let orch = orchestrator(Vec::new());
        let err = orch.start(&alice(), Vec::new()).unwrap_err();
        assert_eq!(err.code(), "INVALID_CURRICULUM");
        assert!(orch.sessions(&alice()).unwrap().is_empty());
    }

    #[test]
    fn sessions_mark_the_active_one() {
        let orch = orchestrator(Vec::new());
        let first = orch.start(&alice(), vec!["IAM".into()]).unwrap();
        let second = orch.start(&alice(), vec!["VPC".into()]).unwrap();

        let list = orch.sessions(&alice()).unwrap();
        assert_eq!(list.len(), 2);
        let active: Vec<_> = list.iter().filter(|s| s.is_active).collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].session_id, second.session_id);
        assert!(list.iter().any(|s| s.session_id == first.session_id && !s.is_active));
    }
}
