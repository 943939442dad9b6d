use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use tutor_core::ids::{LearnerKey, SessionId};
use tutor_core::snapshot::SessionSnapshot;

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

const TABLE: &str = "learning_sessions";

const SELECT_COLUMNS: &str = "SELECT id, learner_key, topics, current_index, current_summary,
        summary_by_topic, turn_count, interaction_mode, visual_hint, created_at, updated_at
 FROM learning_sessions";

/// A durable learning session.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningSessionRow {
    pub id: SessionId,
    pub learner: LearnerKey,
    pub topics: Vec<String>,
    pub current_index: usize,
    pub current_summary: String,
    pub summary_by_topic: BTreeMap<String, String>,
    pub turn_count: u32,
    pub interaction_mode: bool,
    pub visual_hint: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl LearningSessionRow {
    /// The fields the engine needs to rebuild its in-memory state.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            topics: self.topics.clone(),
            current_index: self.current_index,
            current_summary: self.current_summary.clone(),
            summary_by_topic: self.summary_by_topic.clone(),
            turn_count: self.turn_count,
        }
    }

    pub fn current_topic(&self) -> Option<&str> {
        self.topics.get(self.current_index).map(String::as_str)
    }
}

pub struct SessionRepo {
    db: Database,
}

impl SessionRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create a session at topic 0, registering the learner if needed.
    #[instrument(skip(self, topics), fields(learner = %learner, topics = topics.len()))]
    pub fn create(
        &self,
        learner: &LearnerKey,
        topics: &[String],
        interaction_mode: bool,
    ) -> Result<LearningSessionRow, StoreError> {
        let id = SessionId::new();
        let now = Utc::now().to_rfc3339();
        let topics_json = serde_json::to_string(topics)?;

        self.db.with_tx(|tx| {
            tx.execute(
                "INSERT OR IGNORE INTO learners (learner_key, created_at) VALUES (?1, ?2)",
                rusqlite::params![learner.as_str(), now],
            )?;
            tx.execute(
                "INSERT INTO learning_sessions
                    (id, learner_key, topics, interaction_mode, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    id.as_str(),
                    learner.as_str(),
                    topics_json,
                    interaction_mode,
                    now,
                    now,
                ],
            )?;
            Ok(())
        })?;

        Ok(LearningSessionRow {
            id,
            learner: learner.clone(),
            topics: topics.to_vec(),
            current_index: 0,
            current_summary: String::new(),
            summary_by_topic: BTreeMap::new(),
            turn_count: 0,
            interaction_mode,
            visual_hint: false,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    #[instrument(skip(self), fields(session_id = %id))]
    pub fn get(&self, id: &SessionId) -> Result<LearningSessionRow, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} WHERE id = ?1"))?;
            let mut rows = stmt.query([id.as_str()])?;
            match rows.next()? {
                Some(row) => row_to_session(row),
                None => Err(StoreError::NotFound(format!("session {id}"))),
            }
        })
    }

    /// Sessions for a learner, newest first.
    #[instrument(skip(self), fields(learner = %learner))]
    pub fn list_for_learner(
        &self,
        learner: &LearnerKey,
    ) -> Result<Vec<LearningSessionRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{SELECT_COLUMNS} WHERE learner_key = ?1 ORDER BY created_at DESC, id DESC"
            ))?;
            let mut rows = stmt.query([learner.as_str()])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(row_to_session(row)?);
            }
            Ok(results)
        })
    }

    /// Persist the engine's durable fields.
    #[instrument(skip(self, snapshot), fields(session_id = %id, current_index = snapshot.current_index))]
    pub fn save_progress(&self, id: &SessionId, snapshot: &SessionSnapshot) -> Result<(), StoreError> {
        let summaries = serde_json::to_string(&snapshot.summary_by_topic)?;
        self.update(
            id,
            "UPDATE learning_sessions SET
                current_index = ?1,
                current_summary = ?2,
                summary_by_topic = ?3,
                turn_count = ?4,
                updated_at = ?5
             WHERE id = ?6",
            rusqlite::params![
                snapshot.current_index as i64,
                snapshot.current_summary,
                summaries,
                snapshot.turn_count,
                Utc::now().to_rfc3339(),
                id.as_str(),
            ],
        )
    }

    /// Persist the scenario-mode and diagram-hint flags.
    #[instrument(skip(self), fields(session_id = %id))]
    pub fn save_modes(
        &self,
        id: &SessionId,
        interaction_mode: bool,
        visual_hint: bool,
    ) -> Result<(), StoreError> {
        self.update(
            id,
            "UPDATE learning_sessions SET interaction_mode = ?1, visual_hint = ?2, updated_at = ?3
             WHERE id = ?4",
            rusqlite::params![interaction_mode, visual_hint, Utc::now().to_rfc3339(), id.as_str()],
        )
    }

    /// Delete a session and, by cascade, its turns.
    #[instrument(skip(self), fields(session_id = %id))]
    pub fn delete(&self, id: &SessionId) -> Result<(), StoreError> {
        self.update(
            id,
            "DELETE FROM learning_sessions WHERE id = ?1",
            rusqlite::params![id.as_str()],
        )
    }

    fn update(
        &self,
        id: &SessionId,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<(), StoreError> {
        let changed = self.db.with_conn(|conn| Ok(conn.execute(sql, params)?))?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("session {id}")));
        }
        Ok(())
    }
}

fn row_to_session(row: &rusqlite::Row<'_>) -> Result<LearningSessionRow, StoreError> {
    let topics_raw: String = row_helpers::get(row, 2, TABLE, "topics")?;
    let summaries_raw: String = row_helpers::get(row, 5, TABLE, "summary_by_topic")?;

    Ok(LearningSessionRow {
        id: SessionId::from_raw(row_helpers::get::<String>(row, 0, TABLE, "id")?),
        learner: LearnerKey::new(row_helpers::get::<String>(row, 1, TABLE, "learner_key")?),
        topics: row_helpers::parse_json(&topics_raw, TABLE, "topics")?,
        current_index: row_helpers::non_negative(
            row_helpers::get(row, 3, TABLE, "current_index")?,
            TABLE,
            "current_index",
        )?,
        current_summary: row_helpers::get(row, 4, TABLE, "current_summary")?,
        summary_by_topic: row_helpers::parse_json(&summaries_raw, TABLE, "summary_by_topic")?,
        turn_count: row_helpers::non_negative(
            row_helpers::get(row, 6, TABLE, "turn_count")?,
            TABLE,
            "turn_count",
        )?,
        interaction_mode: row_helpers::get(row, 7, TABLE, "interaction_mode")?,
        visual_hint: row_helpers::get(row, 8, TABLE, "visual_hint")?,
        created_at: row_helpers::get(row, 9, TABLE, "created_at")?,
        updated_at: row_helpers::get(row, 10, TABLE, "updated_at")?,
    })
}
