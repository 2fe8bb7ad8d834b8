//! Record types for the corpus: memories, tasks, and their enums.

mod memory;
mod task;

pub use memory::{classify_complexity, hash_content, Category, Memory, MemoryPatch, MemoryStatus, Priority};
pub use task::{
    MemoryConnection, Task, TaskDraft, TaskLevel, TaskPatch, TaskPriority, TaskStatus,
};

use chrono::{DateTime, SecondsFormat, Utc};

/// Canonical instant rendering used in frontmatter: RFC 3339, UTC, seconds.
pub(crate) fn format_instant(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Now, truncated to whole seconds (the persistence format's resolution)
/// so records compare equal across a disk round-trip.
pub(crate) fn now_second() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp(now.timestamp(), 0).unwrap_or(now)
}

pub(crate) fn parse_instant(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Lowercase, trim, and de-duplicate a tag set. Commas are stripped because
/// the frontmatter list grammar uses them as separators.
pub(crate) fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut cleaned: Vec<String> = tags
        .into_iter()
        .map(|t| t.trim().to_lowercase().replace(',', ""))
        .filter(|t| !t.is_empty())
        .collect();
    cleaned.sort();
    cleaned.dedup();
    cleaned
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_lowercased_and_deduplicated() {
        let tags = normalize_tags(vec![
            "Rust".into(),
            "rust".into(),
            " notes ".into(),
            "a,b".into(),
            "".into(),
        ]);
        assert_eq!(tags, vec!["ab".to_string(), "notes".into(), "rust".into()]);
    }

    #[test]
    fn instants_round_trip() {
        let now = Utc::now();
        let parsed = parse_instant(&format_instant(now)).unwrap();
        assert_eq!(parsed.timestamp(), now.timestamp());
    }
}
