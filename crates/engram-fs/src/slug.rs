//! Slug derivation for project directories and memory filenames.

/// Fallback project when the supplied name sanitizes to nothing.
pub const DEFAULT_PROJECT: &str = "default";

/// Upper bound on a sanitized project directory name.
pub const MAX_PROJECT_SLUG_LEN: usize = 50;

/// Map a free-form project name to a safe directory name.
///
/// Characters outside `[A-Za-z0-9_-]` are stripped, the result is truncated
/// to [`MAX_PROJECT_SLUG_LEN`], and an empty result falls back to
/// [`DEFAULT_PROJECT`].
pub fn sanitize_project(name: &str) -> String {
    let slug: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .take(MAX_PROJECT_SLUG_LEN)
        .collect();
    if slug.is_empty() {
        DEFAULT_PROJECT.to_string()
    } else {
        slug
    }
}

/// Derive a lowercase hyphenated slug from record text, for filenames.
///
/// Alphanumeric runs are joined by single hyphens; everything else is a
/// separator. Truncated to `max_len` without splitting a run mid-word when
/// avoidable.
pub fn content_slug(text: &str, max_len: usize) -> String {
    let first_line = text.lines().next().unwrap_or_default();
    let mut slug = String::with_capacity(max_len);
    let mut pending_sep = false;
    for c in first_line.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_sep && !slug.is_empty() {
                if slug.len() + 1 >= max_len {
                    break;
                }
                slug.push('-');
            }
            pending_sep = false;
            if slug.len() >= max_len {
                break;
            }
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_sep = true;
        }
    }
    if slug.is_empty() {
        slug.push_str("memory");
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_unsafe_characters() {
        assert_eq!(sanitize_project("My Project!"), "MyProject");
        assert_eq!(sanitize_project("a/b\\c"), "abc");
        assert_eq!(sanitize_project("rust_lang-2024"), "rust_lang-2024");
    }

    #[test]
    fn empty_input_falls_back_to_default() {
        assert_eq!(sanitize_project(""), DEFAULT_PROJECT);
        assert_eq!(sanitize_project("!!!"), DEFAULT_PROJECT);
    }

    #[test]
    fn truncates_to_cap() {
        let long = "x".repeat(120);
        assert_eq!(sanitize_project(&long).len(), MAX_PROJECT_SLUG_LEN);
    }

    #[test]
    fn content_slug_uses_first_line() {
        assert_eq!(content_slug("Remember X\nsecond line", 40), "remember-x");
        assert_eq!(content_slug("# Fix the *parser*", 40), "fix-the-parser");
    }

    #[test]
    fn content_slug_never_empty() {
        assert_eq!(content_slug("!!!", 40), "memory");
        assert_eq!(content_slug("", 40), "memory");
    }

    #[test]
    fn content_slug_respects_max_len() {
        let slug = content_slug("one two three four five six seven", 12);
        assert!(slug.len() <= 12, "slug too long: {slug}");
        assert!(!slug.ends_with('-'));
    }
}
