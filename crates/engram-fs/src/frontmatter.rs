//! Frontmatter parsing and serialization for Engram records.
//!
//! Records are markdown files with a header block delimited by `---` lines:
//! ```markdown
//! ---
//! id: 0b6c9d1e
//! tags: [rust, notes]
//! access_count: 3
//! ---
//!
//! Record body here...
//! ```
//!
//! The grammar is deliberately a small YAML subset: one `key: value` pair per
//! line, where a value is a bare or quoted string, a `[a, b, c]` string list,
//! an integer, or a boolean. No nested maps, no block scalars. Unknown keys
//! round-trip untouched, so externally edited files keep their extra fields.

use std::collections::BTreeMap;
use std::fmt;

/// A single frontmatter value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scalar {
    Str(String),
    Int(i64),
    Bool(bool),
    List(Vec<String>),
}

impl Scalar {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Scalar::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Scalar::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Scalar::List(items) => Some(items),
            _ => None,
        }
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::Str(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Scalar::Str(s)
    }
}

impl From<i64> for Scalar {
    fn from(n: i64) -> Self {
        Scalar::Int(n)
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Scalar::Bool(b)
    }
}

impl From<Vec<String>> for Scalar {
    fn from(items: Vec<String>) -> Self {
        Scalar::List(items)
    }
}

/// Parsed header key-value pairs. Key order is not significant.
pub type Frontmatter = BTreeMap<String, Scalar>;

/// A record split into header metadata and markdown body.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Document {
    pub metadata: Frontmatter,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrontmatterError {
    /// The file opens a `---` header but never closes it.
    UnterminatedHeader,
}

impl fmt::Display for FrontmatterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrontmatterError::UnterminatedHeader => {
                write!(f, "frontmatter header opened with '---' but never closed")
            }
        }
    }
}

impl std::error::Error for FrontmatterError {}

/// Parse a raw file into metadata and body.
///
/// A file that does not open with `---` is treated as all-body with empty
/// metadata (tolerant mode). A file that opens a header and never closes it
/// is malformed and rejected; callers skip such files from indexing.
pub fn parse(raw: &str) -> Result<Document, FrontmatterError> {
    let Some(header_start) = strip_opening_fence(raw) else {
        return Ok(Document {
            metadata: Frontmatter::new(),
            body: raw.to_string(),
        });
    };

    let Some((header, body)) = split_at_closing_fence(header_start) else {
        return Err(FrontmatterError::UnterminatedHeader);
    };

    let mut metadata = Frontmatter::new();
    for line in header.lines() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        // Lines without a `key:` shape are minor malformation; skip them.
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        metadata.insert(key.to_string(), parse_value(value.trim()));
    }

    Ok(Document {
        metadata,
        body: body.to_string(),
    })
}

/// Serialize metadata and body back into file bytes.
///
/// Output shape is `---\n<header>\n---\n<body>`; `parse(serialize(m, b))`
/// returns `(m, b)` for every value this module can produce.
pub fn serialize(metadata: &Frontmatter, body: &str) -> String {
    let mut out = String::with_capacity(body.len() + metadata.len() * 32 + 16);
    out.push_str("---\n");
    for (key, value) in metadata {
        out.push_str(key);
        out.push_str(": ");
        write_value(&mut out, value);
        out.push('\n');
    }
    out.push_str("---\n");
    out.push_str(body);
    out
}

/// Returns the text after the opening `---` line, or None when the file has
/// no header at all.
fn strip_opening_fence(raw: &str) -> Option<&str> {
    let rest = raw.strip_prefix("---")?;
    if let Some(rest) = rest.strip_prefix("\r\n") {
        Some(rest)
    } else {
        rest.strip_prefix('\n')
    }
}

/// Split header text from body at the closing `---` line (which must start a
/// line of its own).
fn split_at_closing_fence(s: &str) -> Option<(&str, &str)> {
    let mut pos = 0;
    // split_inclusive also yields a final line without a trailing newline,
    // so a bare "---" at EOF closes the header too.
    for line in s.split_inclusive('\n') {
        let trimmed = line.trim_end_matches(['\n', '\r']);
        if trimmed == "---" {
            return Some((&s[..pos], &s[pos + line.len()..]));
        }
        pos += line.len();
    }
    None
}

fn parse_value(value: &str) -> Scalar {
    if let Some(inner) = value.strip_prefix('[').and_then(|v| v.strip_suffix(']')) {
        let items = inner
            .split(',')
            .map(|item| strip_quotes(item.trim()).to_string())
            .filter(|item| !item.is_empty())
            .collect();
        return Scalar::List(items);
    }
    if (value.starts_with('"') && value.ends_with('"') && value.len() >= 2)
        || (value.starts_with('\'') && value.ends_with('\'') && value.len() >= 2)
    {
        return Scalar::Str(strip_quotes(value).to_string());
    }
    match value {
        "true" => return Scalar::Bool(true),
        "false" => return Scalar::Bool(false),
        _ => {}
    }
    if let Ok(n) = value.parse::<i64>() {
        return Scalar::Int(n);
    }
    Scalar::Str(value.to_string())
}

fn strip_quotes(s: &str) -> &str {
    if s.len() >= 2
        && ((s.starts_with('"') && s.ends_with('"'))
            || (s.starts_with('\'') && s.ends_with('\'')))
    {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

fn write_value(out: &mut String, value: &Scalar) {
    match value {
        Scalar::Str(s) => {
            if needs_quoting(s) {
                out.push('"');
                out.push_str(s);
                out.push('"');
            } else {
                out.push_str(s);
            }
        }
        Scalar::Int(n) => out.push_str(&n.to_string()),
        Scalar::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Scalar::List(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                if item.contains(',') || item.contains(']') || item.contains(' ') {
                    out.push('"');
                    out.push_str(item);
                    out.push('"');
                } else {
                    out.push_str(item);
                }
            }
            out.push(']');
        }
    }
}

/// A string must be quoted when the bare form would parse back as another
/// type or collide with the grammar's punctuation.
fn needs_quoting(s: &str) -> bool {
    if s.is_empty() || s == "true" || s == "false" {
        return true;
    }
    if s.parse::<i64>().is_ok() {
        return true;
    }
    if s.starts_with('[') || s.starts_with('"') || s.starts_with('\'') {
        return true;
    }
    s.contains(':') || s.contains('\n') || s.trim() != s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_header_and_body() {
        let raw = "---\nid: abc\ncount: 3\narchived: false\ntags: [rust, notes]\n---\nBody text";
        let doc = parse(raw).unwrap();
        assert_eq!(doc.metadata.get("id"), Some(&Scalar::Str("abc".into())));
        assert_eq!(doc.metadata.get("count"), Some(&Scalar::Int(3)));
        assert_eq!(doc.metadata.get("archived"), Some(&Scalar::Bool(false)));
        assert_eq!(
            doc.metadata.get("tags"),
            Some(&Scalar::List(vec!["rust".into(), "notes".into()]))
        );
        assert_eq!(doc.body, "Body text");
    }

    #[test]
    fn missing_opening_fence_is_all_body() {
        let raw = "Just content, no header";
        let doc = parse(raw).unwrap();
        assert!(doc.metadata.is_empty());
        assert_eq!(doc.body, raw);
    }

    #[test]
    fn unterminated_header_is_an_error() {
        let raw = "---\nid: abc\nno closing fence";
        assert_eq!(parse(raw), Err(FrontmatterError::UnterminatedHeader));
    }

    #[test]
    fn quoted_values_are_stripped() {
        let raw = "---\ntitle: \"hello: world\"\nother: 'single'\n---\n";
        let doc = parse(raw).unwrap();
        assert_eq!(
            doc.metadata.get("title"),
            Some(&Scalar::Str("hello: world".into()))
        );
        assert_eq!(doc.metadata.get("other"), Some(&Scalar::Str("single".into())));
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let raw = "---\nid: abc\nnot a pair\n: empty key\n---\nbody";
        let doc = parse(raw).unwrap();
        assert_eq!(doc.metadata.len(), 1);
        assert_eq!(doc.body, "body");
    }

    #[test]
    fn empty_list_parses() {
        let raw = "---\ntags: []\n---\n";
        let doc = parse(raw).unwrap();
        assert_eq!(doc.metadata.get("tags"), Some(&Scalar::List(vec![])));
    }

    #[test]
    fn crlf_input_parses() {
        let raw = "---\r\nid: abc\r\n---\r\nbody";
        let doc = parse(raw).unwrap();
        assert_eq!(doc.metadata.get("id"), Some(&Scalar::Str("abc".into())));
        assert_eq!(doc.body, "body");
    }

    #[test]
    fn closing_fence_without_trailing_newline() {
        let raw = "---\nid: abc\n---";
        let doc = parse(raw).unwrap();
        assert_eq!(doc.metadata.get("id"), Some(&Scalar::Str("abc".into())));
        assert_eq!(doc.body, "");
    }

    #[test]
    fn round_trips_every_value_kind() {
        let mut meta = Frontmatter::new();
        meta.insert("id".into(), Scalar::Str("2024-01-01--note-ab12".into()));
        meta.insert("timestamp".into(), Scalar::Str("2024-01-01T10:30:00Z".into()));
        meta.insert("count".into(), Scalar::Int(42));
        meta.insert("negative".into(), Scalar::Int(-7));
        meta.insert("flag".into(), Scalar::Bool(true));
        meta.insert("empty".into(), Scalar::Str(String::new()));
        meta.insert("numeric_str".into(), Scalar::Str("123".into()));
        meta.insert("boolish_str".into(), Scalar::Str("true".into()));
        meta.insert(
            "tags".into(),
            Scalar::List(vec!["a".into(), "b-c".into(), "with space".into()]),
        );

        let body = "# Heading\n\nSome body with --- inline.\n";
        let raw = serialize(&meta, body);
        let doc = parse(&raw).unwrap();
        assert_eq!(doc.metadata, meta);
        assert_eq!(doc.body, body);
    }

    #[test]
    fn unknown_keys_survive_a_round_trip() {
        let raw = "---\ncustom_field: kept\nid: abc\n---\nbody";
        let doc = parse(raw).unwrap();
        let again = parse(&serialize(&doc.metadata, &doc.body)).unwrap();
        assert_eq!(again.metadata.get("custom_field"), Some(&Scalar::Str("kept".into())));
    }

    #[test]
    fn body_containing_fence_line_is_preserved() {
        let body = "before\n---\nafter\n";
        let raw = serialize(&Frontmatter::new(), body);
        let doc = parse(&raw).unwrap();
        assert_eq!(doc.body, body);
    }
}
