//! Gemma chat template and `mlx_lm.generate` output cleanup.
//!
//! Gemma has no system role, so framing is sent as a user turn prefixed with
//! `System: `.

use tutor_core::messages::{BlockRole, PromptBlock};

const START: &str = "<start_of_turn>";
const END: &str = "<end_of_turn>\n";

/// Lines `mlx_lm.generate` prints around the generated text.
const NOISE_MARKERS: [&str; 3] = ["Loading", "==========", "Prompt:"];

/// Render blocks into a single Gemma prompt, ending with an open model turn.
pub fn format_prompt(blocks: &[PromptBlock]) -> String {
    let mut prompt = String::new();
    for block in blocks {
        let (turn, prefix) = match block.role {
            BlockRole::System => ("user", "System: "),
            BlockRole::Learner => ("user", ""),
            BlockRole::Tutor => ("model", ""),
        };
        prompt.push_str(START);
        prompt.push_str(turn);
        prompt.push('\n');
        prompt.push_str(prefix);
        prompt.push_str(&block.content);
        prompt.push_str(END);
    }
    prompt.push_str(START);
    prompt.push_str("model\n");
    prompt
}

/// Strip loader banners, separators, the echoed prompt header and blank lines.
pub fn parse_output(stdout: &str) -> String {
    stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter(|line| !NOISE_MARKERS.iter().any(|m| line.contains(m)))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}
