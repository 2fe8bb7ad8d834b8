//! Filesystem utilities shared by the Engram server and bridge.
//!
//! Three concerns live here: the frontmatter codec for markdown records,
//! slug derivation for project directories and memory filenames, and
//! atomic file writes (temp + fsync + rename).

pub mod atomic;
pub mod frontmatter;
pub mod slug;

pub use atomic::write_atomic;
pub use frontmatter::{parse, serialize, Document, Frontmatter, FrontmatterError, Scalar};
pub use slug::{content_slug, sanitize_project, DEFAULT_PROJECT, MAX_PROJECT_SLUG_LEN};
