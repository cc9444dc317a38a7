//! Keyword-based topic classification.
//!
//! An entry belongs to every topic that has at least one keyword occurring
//! as a substring of `lowercase(title + " " + body)`. There is no stemming
//! and no word-boundary check: the keyword `api` matches `rapid`. An entry
//! may land in several topics, or in none.

use crate::config::TopicTemplate;
use crate::types::ContentEntry;
use std::collections::BTreeSet;

/// Topic identifiers `entry` belongs to.
///
/// Keywords are expected to be lowercase already (config loading folds
/// them). Blank keywords never match.
pub fn classify(entry: &ContentEntry, topics: &[TopicTemplate]) -> BTreeSet<String> {
    if entry.title.trim().is_empty() && entry.body.trim().is_empty() {
        return BTreeSet::new();
    }
    let text = entry.search_text();
    topics
        .iter()
        .filter(|topic| matches_any(&text, &topic.keywords))
        .map(|topic| topic.id.clone())
        .collect()
}

fn matches_any(text: &str, keywords: &[String]) -> bool {
    keywords
        .iter()
        .any(|kw| !kw.trim().is_empty() && text.contains(kw.as_str()))
}
