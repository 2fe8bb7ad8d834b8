//! Session dropoff generation.
//!
//! A dropoff is a markdown handoff document: the caller's summary, the most
//! recent memories, the most recently updated tasks and a short host block.
//! It reads the stores and writes exactly one new file under
//! `session-dropoffs/`; nothing in the corpus is mutated.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::fs;

use engram_fs::write_atomic;

use crate::error::Result;
use crate::model::{Memory, Task};

/// Default number of memory sections.
pub const DEFAULT_RECENT_MEMORIES: usize = 5;

/// Default number of task lines.
pub const DEFAULT_RECENT_TASKS: usize = 10;

/// Render and persist a dropoff. `memories` must already be sorted newest
/// first and truncated by the caller; same for `tasks` by `updated`.
pub async fn generate(
    dropoff_dir: &Path,
    session_summary: &str,
    memories: &[Memory],
    tasks: &[Task],
) -> Result<(PathBuf, String)> {
    let body = render(session_summary, memories, tasks);
    fs::create_dir_all(dropoff_dir).await?;
    let stamp = Utc::now().format("%Y-%m-%d_%H-%M-%S");
    let path = dropoff_dir.join(format!("SESSION-DROPOFF-{stamp}.md"));
    write_atomic(&path, &body).await?;
    Ok((path, body))
}

fn render(session_summary: &str, memories: &[Memory], tasks: &[Task]) -> String {
    let mut out = String::new();
    out.push_str("# Session Dropoff\n\n");
    out.push_str(&format!(
        "Generated: {}\n\n",
        Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
    ));

    out.push_str("## Summary\n\n");
    out.push_str(session_summary.trim());
    out.push_str("\n\n");

    out.push_str(&format!("## Recent Memories ({})\n\n", memories.len()));
    if memories.is_empty() {
        out.push_str("_No memories recorded yet._\n\n");
    }
    for memory in memories {
        out.push_str(&format!(
            "### {}\n\n- project: {}\n- tags: {}\n- date: {}\n\n> {}\n\n",
            memory.title_line(),
            memory.project,
            if memory.tags.is_empty() {
                "(none)".to_string()
            } else {
                memory.tags.join(", ")
            },
            memory.timestamp.format("%Y-%m-%d"),
            preview(&memory.content, 160),
        ));
    }

    out.push_str(&format!("## Active Tasks ({})\n\n", tasks.len()));
    if tasks.is_empty() {
        out.push_str("_No tasks on file._\n\n");
    }
    for task in tasks {
        out.push_str(&format!(
            "- [{}] #{} {} ({}, {})\n",
            task.status.as_str(),
            task.serial,
            task.title,
            task.project,
            task.priority.as_str(),
        ));
    }
    if !tasks.is_empty() {
        out.push('\n');
    }

    out.push_str("## Host\n\n");
    out.push_str(&format!(
        "- platform: {} ({})\n- working directory: {}\n",
        std::env::consts::OS,
        std::env::consts::ARCH,
        std::env::current_dir()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|_| "(unknown)".to_string()),
    ));
    out
}

/// First `max` characters of the first non-empty body line, ellipsized.
fn preview(content: &str, max: usize) -> String {
    let line = content
        .lines()
        .find(|l| !l.trim().is_empty())
        .unwrap_or_default()
        .trim();
    if line.chars().count() <= max {
        line.to_string()
    } else {
        let cut: String = line.chars().take(max).collect();
        format!("{cut}…")
    }
}
