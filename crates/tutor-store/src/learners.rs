use chrono::Utc;
use rusqlite::OptionalExtension;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use tutor_core::ids::LearnerKey;

use crate::database::Database;
use crate::error::StoreError;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LearnerRow {
    pub learner_key: LearnerKey,
    pub created_at: String,
}

pub struct LearnerRepo {
    db: Database,
}

impl LearnerRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Return the learner, registering it on first sight.
    #[instrument(skip(self), fields(learner = %key))]
    pub fn get_or_create(&self, key: &LearnerKey) -> Result<LearnerRow, StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO learners (learner_key, created_at) VALUES (?1, ?2)",
                rusqlite::params![key.as_str(), Utc::now().to_rfc3339()],
            )?;
            let created_at: String = conn.query_row(
                "SELECT created_at FROM learners WHERE learner_key = ?1",
                [key.as_str()],
                |row| row.get(0),
            )?;
            Ok(LearnerRow {
                learner_key: key.clone(),
                created_at,
            })
        })
    }

    #[instrument(skip(self), fields(learner = %key))]
    pub fn get(&self, key: &LearnerKey) -> Result<LearnerRow, StoreError> {
        self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT created_at FROM learners WHERE learner_key = ?1",
                [key.as_str()],
                |row| row.get::<_, String>(0),
            )
            .optional()?
            .map(|created_at| LearnerRow {
                learner_key: key.clone(),
                created_at,
            })
            .ok_or_else(|| StoreError::NotFound(format!("learner {key}")))
        })
    }
}
