//! Understanding-summary extraction.
//!
//! A learner marks their summary of the current topic with `<IS>...</IS>`.
//! Only the first span counts; tags are case-insensitive and the span may
//! cross newlines.

use std::sync::LazyLock;

use regex::Regex;

static SUMMARY_SPAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<IS>(.*?)</IS>").unwrap());

/// The trimmed contents of the first `<IS>` span, if any.
///
/// An empty span (`<IS> </IS>`) still counts as a summary and yields `Some("")`.
pub fn extract_summary(text: &str) -> Option<String> {
    SUMMARY_SPAN
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
}

pub fn contains_summary(text: &str) -> bool {
    SUMMARY_SPAN.is_match(text)
}
