//! Node id extraction from textual tool output.
//!
//! Grammar: the literal `ID:`, optional whitespace, then a token starting with
//! an ASCII letter or digit followed by letters, digits or colons. Design-tool
//! node ids look like `12:34` or `I5:6;7:8`; only the part up to the first
//! character outside the token alphabet is taken.

use std::sync::LazyLock;

use regex::Regex;

static NODE_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"ID:\s*([A-Za-z0-9][A-Za-z0-9:]*)").expect("valid node id pattern")
});

/// First node id mentioned in `text`, if any.
#[must_use]
pub fn extract_node_id(text: &str) -> Option<&str> {
    NODE_ID
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim_end_matches(':'))
        .filter(|id| !id.is_empty())
}
