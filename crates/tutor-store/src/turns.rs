use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use tutor_core::ids::{SessionId, TurnId};
use tutor_core::messages::{Speaker, Turn};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

const TABLE: &str = "turns";

/// A stored conversation turn.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnRow {
    pub id: TurnId,
    pub session_id: SessionId,
    pub sequence: i64,
    pub speaker: Speaker,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl From<TurnRow> for Turn {
    fn from(row: TurnRow) -> Self {
        Turn {
            speaker: row.speaker,
            text: row.content,
            timestamp: row.timestamp,
        }
    }
}

/// Append-only turn log, ordered by a per-session sequence.
pub struct TurnRepo {
    db: Database,
}

impl TurnRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn append(
        &self,
        session_id: &SessionId,
        speaker: Speaker,
        content: &str,
    ) -> Result<TurnRow, StoreError> {
        self.append_at(session_id, speaker, content, Utc::now())
    }

    /// Append with an explicit timestamp.
    #[instrument(skip(self, content), fields(session_id = %session_id, speaker = %speaker))]
    pub fn append_at(
        &self,
        session_id: &SessionId,
        speaker: Speaker,
        content: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<TurnRow, StoreError> {
        let id = TurnId::new();
        self.db.with_tx(|tx| {
            let sequence: i64 = tx.query_row(
                "SELECT COALESCE(MAX(sequence), -1) + 1 FROM turns WHERE session_id = ?1",
                [session_id.as_str()],
                |row| row.get(0),
            )?;
            tx.execute(
                "INSERT INTO turns (id, session_id, sequence, speaker, content, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    id.as_str(),
                    session_id.as_str(),
                    sequence,
                    speaker.to_string(),
                    content,
                    timestamp.to_rfc3339(),
                ],
            )
            .map_err(|e| match e {
                rusqlite::Error::SqliteFailure(f, _)
                    if f.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    StoreError::NotFound(format!("session {session_id}"))
                }
                other => other.into(),
            })?;

            Ok(TurnRow {
                id,
                session_id: session_id.clone(),
                sequence,
                speaker,
                content: content.to_string(),
                timestamp,
            })
        })
    }

    /// All turns of a session in chronological order.
    #[instrument(skip(self), fields(session_id = %session_id))]
    pub fn list(&self, session_id: &SessionId) -> Result<Vec<TurnRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, session_id, sequence, speaker, content, timestamp
                 FROM turns WHERE session_id = ?1 ORDER BY sequence ASC",
            )?;
            let mut rows = stmt.query([session_id.as_str()])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(row_to_turn(row)?);
            }
            Ok(results)
        })
    }

    #[instrument(skip(self), fields(session_id = %session_id))]
    pub fn count(&self, session_id: &SessionId) -> Result<i64, StoreError> {
        self.db.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM turns WHERE session_id = ?1",
                [session_id.as_str()],
                |row| row.get(0),
            )?)
        })
    }
}

fn row_to_turn(row: &rusqlite::Row<'_>) -> Result<TurnRow, StoreError> {
    let speaker_raw: String = row_helpers::get(row, 3, TABLE, "speaker")?;
    let ts_raw: String = row_helpers::get(row, 5, TABLE, "timestamp")?;
    let timestamp = DateTime::parse_from_rfc3339(&ts_raw)
        .map_err(|e| StoreError::CorruptRow {
            table: TABLE,
            column: "timestamp",
            detail: e.to_string(),
        })?
        .with_timezone(&Utc);

    Ok(TurnRow {
        id: TurnId::from_raw(row_helpers::get::<String>(row, 0, TABLE, "id")?),
        session_id: SessionId::from_raw(row_helpers::get::<String>(row, 1, TABLE, "session_id")?),
        sequence: row_helpers::get(row, 2, TABLE, "sequence")?,
        speaker: row_helpers::parse_enum(&speaker_raw, TABLE, "speaker")?,
        content: row_helpers::get(row, 4, TABLE, "content")?,
        timestamp,
    })
}
