//! Markdown transcript of a learner session.
//!
//! Pure function of session state plus an injected timestamp. Sessions with
//! more than one topic get a checklist layout; single-topic sessions are
//! rendered step by step from history.

use std::fmt::Write;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tutor_core::messages::Turn;

use crate::extract::contains_summary;
use crate::session::LearnerSession;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TranscriptOptions {
    pub title: String,
    /// Characters of each topic summary shown in the multi-topic footer.
    pub summary_preview_chars: usize,
}

impl Default for TranscriptOptions {
    fn default() -> Self {
        Self {
            title: "Study Notes".into(),
            summary_preview_chars: 100,
        }
    }
}

pub fn render(session: &LearnerSession, options: &TranscriptOptions, generated_at: DateTime<Utc>) -> String {
    let multi = session.curriculum.is_multi_objective();
    let mut out = String::new();

    header(&mut out, session, options, generated_at);
    if multi {
        multi_body(&mut out, session);
    } else {
        single_body(&mut out, &session.memory.history);
    }
    footer(&mut out, session, options);
    out
}

fn header(out: &mut String, session: &LearnerSession, options: &TranscriptOptions, generated_at: DateTime<Utc>) {
    let curriculum = &session.curriculum;
    let suffix = if curriculum.is_multi_objective() { " (Multi-Objective)" } else { "" };
    let _ = write!(out, "# ☁️ {}{suffix}\n\n", options.title);

    if curriculum.is_multi_objective() {
        out.push_str("## 📚 Topics\n\n");
        for (i, topic) in curriculum.topics().iter().enumerate() {
            let _ = writeln!(out, "{}. {} {topic}", i + 1, curriculum.status(i).glyph());
        }
        out.push('\n');
    } else {
        let _ = write!(out, "**Topic**: {}\n\n", curriculum.current_topic());
    }

    let _ = write!(
        out,
        "**Generated**: {}\n**Total steps**: {}\n\n---\n\n",
        generated_at.format(TIMESTAMP_FORMAT),
        session.memory.turn_count
    );
}

fn multi_body(out: &mut String, session: &LearnerSession) {
    for (i, topic) in session.curriculum.topics().iter().enumerate() {
        let _ = write!(out, "## 📖 Topic {}: {topic}\n\n", i + 1);
        if let Some(summary) = session.memory.summary_by_topic.get(topic) {
            let _ = write!(out, "### ✅ Final understanding summary\n\n<IS>{summary}</IS>\n\n");
        }
        out.push_str("---\n\n");
    }
}

fn single_body(out: &mut String, history: &[Turn]) {
    let mut step = 1;
    let mut previous_had_summary = false;

    for turn in history {
        if turn.is_learner() {
            previous_had_summary = contains_summary(&turn.text);
            if previous_had_summary {
                let _ = write!(out, "## 📝 Step {step}: My understanding\n\n{}\n\n", turn.text);
            } else {
                let _ = write!(out, "### 💬 Question/Answer\n\n{}\n\n", turn.text);
            }
        } else {
            let _ = write!(out, "### 🤖 Tutor feedback\n\n{}\n\n---\n\n", turn.text);
            if previous_had_summary {
                step += 1;
            }
            previous_had_summary = false;
        }
    }
}

fn footer(out: &mut String, session: &LearnerSession, options: &TranscriptOptions) {
    let curriculum = &session.curriculum;
    let steps = session.memory.turn_count;
    out.push_str("\n## ✅ Session complete!\n\n");

    if curriculum.is_multi_objective() {
        let _ = write!(
            out,
            "Covered {} topics in {steps} steps.\n\n**How the topics connect**:\n",
            curriculum.len()
        );
        for (i, topic) in curriculum.topics().iter().enumerate() {
            let preview = match session.memory.summary_by_topic.get(topic) {
                Some(summary) => {
                    let head: String = summary.chars().take(options.summary_preview_chars).collect();
                    format!("{head}...")
                }
                None => "(no summary)".to_string(),
            };
            let _ = writeln!(out, "{}. **{topic}**: {preview}", i + 1);
        }
    } else {
        let _ = write!(out, "Completed {steps} steps.");
    }

    out.push_str("\n\nGreat work! 🎉\n");
}
