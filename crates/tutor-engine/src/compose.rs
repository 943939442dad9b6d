//! Context assembly for the generator.
//!
//! Every call produces exactly two blocks: a framing block rebuilt from the
//! session's summaries and counters, and the learner's text verbatim. Raw
//! history is never included, so the context grows with the number of
//! topics and not with the number of turns.

use std::collections::BTreeMap;
use std::fmt::Write;

use tutor_core::messages::PromptBlock;

use crate::curriculum::TopicStatus;

const NO_SUMMARY_YET: &str = "(no summary yet)";

/// Everything the framing block is built from.
#[derive(Clone, Copy, Debug)]
pub struct PromptConfig<'a> {
    pub topics: &'a [String],
    pub current_index: usize,
    pub current_summary: &'a str,
    pub summary_by_topic: &'a BTreeMap<String, String>,
    pub turn_count: u32,
    pub interaction_mode: bool,
}

pub fn compose(config: &PromptConfig<'_>, learner_text: &str) -> Vec<PromptBlock> {
    vec![
        PromptBlock::system(framing(config)),
        PromptBlock::learner(learner_text),
    ]
}

/// The system framing text for one turn.
pub fn framing(config: &PromptConfig<'_>) -> String {
    let topic = &config.topics[config.current_index];
    let mut out = String::from("You are a patient tutor. Explain concisely and clearly.\n\n");
    let _ = write!(out, "**Current topic**: {topic}");

    if config.topics.len() > 1 {
        let _ = write!(
            out,
            "\n**Progress**: {}/{}\n\n**Curriculum**:",
            config.current_index + 1,
            config.topics.len()
        );
        for (i, t) in config.topics.iter().enumerate() {
            let status = TopicStatus::relative(i, config.current_index);
            let _ = write!(out, "\n{}. {} {t}", i + 1, status.glyph());
        }
    }

    let _ = write!(out, "\n\n**Completed steps**: {}", config.turn_count);

    out.push_str(
        "\n\n**Rules**:\n\
         1. When the learner's message contains <IS>...</IS>, evaluate that summary of the current topic.\n\
         2. If the summary is accurate, praise it briefly and explain how to continue.\n\
         3. If the summary is incomplete or wrong, explain what is missing and ask for a revised summary.\n\
         4. If there is no <IS> summary, answer the question and then ask the learner to summarize with <IS> tags.",
    );

    let summary = if config.current_summary.is_empty() {
        NO_SUMMARY_YET
    } else {
        config.current_summary
    };
    let _ = write!(out, "\n\n**Learner's current summary**: {summary}");

    out.push_str(&digest(config));

    if config.interaction_mode {
        out.push_str(
            "\n\n**Scenario mode**: when the learner asks how something is used in practice:\n\
             - present a short realistic scenario\n\
             - include concrete cost information\n\
             - give a runnable code example",
        );
    }

    out.push_str("\n\nRespond concisely.");
    out
}

/// Finalized summaries of topics before the cursor, in curriculum order.
/// Empty when there is nothing to list.
fn digest(config: &PromptConfig<'_>) -> String {
    let entries: Vec<_> = config.topics[..config.current_index]
        .iter()
        .filter_map(|t| config.summary_by_topic.get(t).map(|s| (t, s)))
        .collect();
    if entries.is_empty() {
        return String::new();
    }

    let mut out = String::from("\n\n**Summary of previous topics:**\n");
    for (topic, summary) in entries {
        let _ = write!(out, "\n- {topic}: {summary}");
    }
    out
}
