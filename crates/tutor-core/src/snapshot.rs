use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The durable fields of a learner session. Everything else the engine keeps
/// in memory can be rebuilt from this plus the topic list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub topics: Vec<String>,
    pub current_index: usize,
    pub current_summary: String,
    pub summary_by_topic: BTreeMap<String, String>,
    pub turn_count: u32,
}

impl SessionSnapshot {
    /// Snapshot of a session that has not started yet.
    pub fn fresh(topics: Vec<String>) -> Self {
        Self {
            topics,
            current_index: 0,
            current_summary: String::new(),
            summary_by_topic: BTreeMap::new(),
            turn_count: 0,
        }
    }
}
