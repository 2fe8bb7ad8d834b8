//! The corpus stores: memories and tasks.

pub mod memory;
pub mod task;

pub use memory::{DedupGroup, DedupReport, MemoryStore};
pub use task::{TaskContext, TaskFilter, TaskLayoutKind, TaskStore};
