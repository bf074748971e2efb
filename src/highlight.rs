use regex::{Regex, RegexBuilder};

/// Builds the case-insensitive match regex for the active query, or
/// `None` when the trimmed query is empty.
pub fn build_query_regex(query: &str) -> Option<Regex> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return None;
    }
    RegexBuilder::new(&regex::escape(trimmed))
        .case_insensitive(true)
        .build()
        .ok()
}
