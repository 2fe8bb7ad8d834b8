//! Atomic file writes.
//!
//! Every corpus write goes through [`write_atomic`]: write to a uniquely
//! named temp file in the same directory, fsync, then rename over the
//! target. A crash between steps leaves either the old file or the new
//! file, never partial bytes, and readers only ever observe complete files.

use std::io;
use std::path::Path;

use rand::Rng;
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Write `content` to `path` atomically.
pub async fn write_atomic(path: &Path, content: &str) -> io::Result<()> {
    let temp_path = path.with_extension(format!("{}.tmp", random_hex()));

    let result = async {
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(content.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&temp_path, path).await
    }
    .await;

    if result.is_err() {
        // Best effort: never leave temp artifacts behind.
        let _ = fs::remove_file(&temp_path).await;
    }
    result
}

/// Random hex suffix so concurrent writers never share a temp file.
fn random_hex() -> String {
    let bytes: [u8; 8] = rand::rng().random();
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn writes_new_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("note.md");
        write_atomic(&path, "hello").await.unwrap();
        assert_eq!(fs::read_to_string(&path).await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn replaces_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("note.md");
        write_atomic(&path, "v1").await.unwrap();
        write_atomic(&path, "v2").await.unwrap();
        assert_eq!(fs::read_to_string(&path).await.unwrap(), "v2");
    }

    #[tokio::test]
    async fn leaves_no_temp_artifacts() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("note.md");
        write_atomic(&path, "content").await.unwrap();

        let mut entries = fs::read_dir(dir.path()).await.unwrap();
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
        assert_eq!(names, vec!["note.md"]);
    }

    #[tokio::test]
    async fn missing_parent_fails_cleanly() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("note.md");
        assert!(write_atomic(&path, "content").await.is_err());
    }
}
