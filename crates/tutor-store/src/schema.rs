/// SQL DDL for the tutor database.
/// WAL mode + foreign keys enabled at connection time.
pub const SCHEMA_VERSION: u32 = 1;

pub const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS learners (
    learner_key TEXT PRIMARY KEY,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS learning_sessions (
    id TEXT PRIMARY KEY,
    learner_key TEXT NOT NULL REFERENCES learners(learner_key),
    topics TEXT NOT NULL,
    current_index INTEGER NOT NULL DEFAULT 0,
    current_summary TEXT NOT NULL DEFAULT '',
    summary_by_topic TEXT NOT NULL DEFAULT '{}',
    turn_count INTEGER NOT NULL DEFAULT 0,
    interaction_mode INTEGER NOT NULL DEFAULT 1,
    visual_hint INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS turns (
    id TEXT PRIMARY KEY,
    session_id TEXT NOT NULL REFERENCES learning_sessions(id) ON DELETE CASCADE,
    sequence INTEGER NOT NULL,
    speaker TEXT NOT NULL CHECK (speaker IN ('learner', 'tutor')),
    content TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    UNIQUE (session_id, sequence)
);

CREATE INDEX IF NOT EXISTS idx_sessions_learner ON learning_sessions(learner_key, created_at);
CREATE INDEX IF NOT EXISTS idx_turns_session_seq ON turns(session_id, sequence);

CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);
"#;

pub const PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;
PRAGMA busy_timeout = 5000;
PRAGMA synchronous = NORMAL;
"#;
