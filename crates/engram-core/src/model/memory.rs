//! The memory record: a markdown body plus frontmatter metadata.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use engram_fs::frontmatter::{Document, Frontmatter, Scalar};
use engram_fs::slug::content_slug;

use super::{format_instant, normalize_tags, now_second, parse_instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    #[default]
    Personal,
    Work,
    Code,
    Research,
    Conversations,
    Preferences,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Personal => "personal",
            Category::Work => "work",
            Category::Code => "code",
            Category::Research => "research",
            Category::Conversations => "conversations",
            Category::Preferences => "preferences",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "personal" => Some(Category::Personal),
            "work" => Some(Category::Work),
            "code" => Some(Category::Code),
            "research" => Some(Category::Research),
            "conversations" => Some(Category::Conversations),
            "preferences" => Some(Category::Preferences),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Priority::Low),
            "medium" => Some(Priority::Medium),
            "high" => Some(Priority::High),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum MemoryStatus {
    #[default]
    Active,
    Archived,
    Reference,
}

impl MemoryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MemoryStatus::Active => "active",
            MemoryStatus::Archived => "archived",
            MemoryStatus::Reference => "reference",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(MemoryStatus::Active),
            "archived" => Some(MemoryStatus::Archived),
            "reference" => Some(MemoryStatus::Reference),
            _ => None,
        }
    }
}

/// A durable note. Persisted as one markdown file; the filename is
/// informational, `id` is authoritative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub access_count: u64,
    pub content: String,
    pub project: String,
    pub category: Category,
    pub tags: Vec<String>,
    pub priority: Priority,
    pub status: MemoryStatus,
    /// 1–4, auto-classified from content length and structure.
    pub complexity: u8,
    /// Weak references to other memory ids; dangling entries are allowed.
    pub related_memories: Vec<String>,
    pub content_hash: String,
}

/// Partial update accepted by `update_memory`. System-managed fields
/// (`id`, `timestamp`, `content_hash`, access counters) are absent here.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct MemoryPatch {
    pub content: Option<String>,
    pub project: Option<String>,
    pub category: Option<Category>,
    pub tags: Option<Vec<String>>,
    pub priority: Option<Priority>,
    pub status: Option<MemoryStatus>,
    pub related_memories: Option<Vec<String>>,
}

impl MemoryPatch {
    pub fn is_empty(&self) -> bool {
        self.content.is_none()
            && self.project.is_none()
            && self.category.is_none()
            && self.tags.is_none()
            && self.priority.is_none()
            && self.status.is_none()
            && self.related_memories.is_none()
    }
}

impl Memory {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        content: String,
        project: String,
        category: Category,
        tags: Vec<String>,
        priority: Priority,
        status: MemoryStatus,
    ) -> Self {
        let now = now_second();
        let content_hash = hash_content(&content);
        let complexity = classify_complexity(&content);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: now,
            last_accessed: now,
            access_count: 0,
            tags: normalize_tags(tags),
            content,
            project,
            category,
            priority,
            status,
            complexity,
            related_memories: Vec::new(),
            content_hash,
        }
    }

    /// First content line, used as a display title and in scoring.
    pub fn title_line(&self) -> &str {
        self.content
            .lines()
            .next()
            .unwrap_or_default()
            .trim_start_matches(['#', ' '])
    }

    /// Informational filename: `<YYYY-MM-DD>--<slug>-<suffix>.md`. The
    /// suffix is the leading id fragment so concurrent same-day notes with
    /// the same first line never collide.
    pub fn file_name(&self) -> String {
        let date = self.timestamp.format("%Y-%m-%d");
        let slug = content_slug(&self.content, 40);
        let suffix: String = self.id.chars().filter(|c| *c != '-').take(6).collect();
        format!("{date}--{slug}-{suffix}.md")
    }

    /// Refresh the content-derived fields after a content change.
    pub fn refresh_derived(&mut self) {
        self.content_hash = hash_content(&self.content);
        self.complexity = classify_complexity(&self.content);
    }

    pub fn to_document(&self) -> Document {
        let mut metadata = Frontmatter::new();
        metadata.insert("id".into(), Scalar::Str(self.id.clone()));
        metadata.insert("timestamp".into(), Scalar::Str(format_instant(self.timestamp)));
        metadata.insert(
            "last_accessed".into(),
            Scalar::Str(format_instant(self.last_accessed)),
        );
        metadata.insert("access_count".into(), Scalar::Int(self.access_count as i64));
        metadata.insert("project".into(), Scalar::Str(self.project.clone()));
        metadata.insert("category".into(), Scalar::Str(self.category.as_str().into()));
        metadata.insert("tags".into(), Scalar::List(self.tags.clone()));
        metadata.insert("priority".into(), Scalar::Str(self.priority.as_str().into()));
        metadata.insert("status".into(), Scalar::Str(self.status.as_str().into()));
        metadata.insert("complexity".into(), Scalar::Int(i64::from(self.complexity)));
        metadata.insert(
            "related_memories".into(),
            Scalar::List(self.related_memories.clone()),
        );
        metadata.insert("content_hash".into(), Scalar::Str(self.content_hash.clone()));
        Document {
            metadata,
            body: self.content.clone(),
        }
    }

    /// Rebuild a record from a parsed file.
    ///
    /// `directory_project` is the sanitized name of the containing
    /// directory; it wins over a divergent `project` field (the directory is
    /// the invariant the tree maintains).
    pub fn from_document(doc: &Document, directory_project: &str) -> Result<Self, String> {
        let meta = &doc.metadata;
        let id = meta
            .get("id")
            .and_then(Scalar::as_str)
            .filter(|s| !s.is_empty())
            .ok_or("missing 'id' field")?
            .to_string();

        let timestamp = meta
            .get("timestamp")
            .and_then(Scalar::as_str)
            .and_then(parse_instant)
            .ok_or("missing or invalid 'timestamp' field")?;

        let last_accessed = meta
            .get("last_accessed")
            .and_then(Scalar::as_str)
            .and_then(parse_instant)
            .unwrap_or(timestamp);

        let access_count = meta
            .get("access_count")
            .and_then(Scalar::as_int)
            .unwrap_or(0)
            .max(0) as u64;

        let category = match meta.get("category").and_then(Scalar::as_str) {
            Some(s) => Category::parse(s).ok_or_else(|| format!("unknown category '{s}'"))?,
            None => Category::default(),
        };
        let priority = match meta.get("priority").and_then(Scalar::as_str) {
            Some(s) => Priority::parse(s).ok_or_else(|| format!("unknown priority '{s}'"))?,
            None => Priority::default(),
        };
        let status = match meta.get("status").and_then(Scalar::as_str) {
            Some(s) => MemoryStatus::parse(s).ok_or_else(|| format!("unknown status '{s}'"))?,
            None => MemoryStatus::default(),
        };

        let tags = meta
            .get("tags")
            .and_then(Scalar::as_list)
            .map(|t| normalize_tags(t.to_vec()))
            .unwrap_or_default();

        let related_memories = meta
            .get("related_memories")
            .and_then(Scalar::as_list)
            .map(<[String]>::to_vec)
            .unwrap_or_default();

        let complexity = meta
            .get("complexity")
            .and_then(Scalar::as_int)
            .map(|n| n.clamp(1, 4) as u8)
            .unwrap_or_else(|| classify_complexity(&doc.body));

        // External edits rarely refresh the hash; recompute so dedup always
        // sees the true content.
        let content_hash = hash_content(&doc.body);

        Ok(Self {
            id,
            timestamp,
            last_accessed,
            access_count,
            content: doc.body.clone(),
            project: directory_project.to_string(),
            category,
            tags,
            priority,
            status,
            complexity,
            related_memories,
            content_hash,
        })
    }
}

/// SHA-256 of the body, hex encoded.
pub fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Classify content into complexity 1–4 from length and structure.
pub fn classify_complexity(content: &str) -> u8 {
    let len = content.len();
    let has_code = content.contains("```");
    let has_structure = content.lines().any(|l| {
        l.starts_with('#') || l.trim_start().starts_with("- ") || l.trim_start().starts_with("* ")
    });

    if len > 4000 {
        4
    } else if len > 1000 || has_code {
        3
    } else if len > 200 || has_structure {
        2
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Memory {
        Memory::new(
            "Remember the frontmatter grammar\n\nDetails here.".into(),
            "engram".into(),
            Category::Code,
            vec!["Parser".into(), "parser".into()],
            Priority::High,
            MemoryStatus::Active,
        )
    }

    #[test]
    fn new_assigns_unique_ids() {
        let a = sample();
        let b = sample();
        assert_ne!(a.id, b.id);
        assert_eq!(a.content_hash, b.content_hash);
    }

    #[test]
    fn tags_are_normalized_at_construction() {
        assert_eq!(sample().tags, vec!["parser".to_string()]);
    }

    #[test]
    fn document_round_trip_preserves_the_record() {
        let mem = sample();
        let doc = mem.to_document();
        let raw = engram_fs::frontmatter::serialize(&doc.metadata, &doc.body);
        let parsed = engram_fs::frontmatter::parse(&raw).unwrap();
        let back = Memory::from_document(&parsed, "engram").unwrap();
        assert_eq!(back, mem);
    }

    #[test]
    fn directory_wins_over_stored_project() {
        let mut doc = sample().to_document();
        doc.metadata
            .insert("project".into(), Scalar::Str("somewhere-else".into()));
        let back = Memory::from_document(&doc, "engram").unwrap();
        assert_eq!(back.project, "engram");
    }

    #[test]
    fn missing_id_is_rejected() {
        let mut doc = sample().to_document();
        doc.metadata.remove("id");
        assert!(Memory::from_document(&doc, "engram").is_err());
    }

    #[test]
    fn file_name_has_date_slug_and_suffix() {
        let mem = sample();
        let name = mem.file_name();
        assert!(name.ends_with(".md"));
        assert!(name.contains("--remember-the-frontmatter-grammar"));
    }

    #[test]
    fn complexity_scales_with_length_and_structure() {
        assert_eq!(classify_complexity("short note"), 1);
        assert!(classify_complexity("# Heading\n- item\nshort") >= 2);
        let long_code = format!("```rust\n{}\n```", "let x = 1;\n".repeat(200));
        assert!(classify_complexity(&long_code) >= 3);
        let huge = "words ".repeat(2000);
        assert_eq!(classify_complexity(&huge), 4);
    }

    #[test]
    fn title_line_strips_heading_markers() {
        let mut mem = sample();
        mem.content = "## A Title\nbody".into();
        assert_eq!(mem.title_line(), "A Title");
    }
}
