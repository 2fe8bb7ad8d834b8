//! Error taxonomy shared by every Engram subsystem.
//!
//! Store-level failures surface to the caller unchanged; the dispatcher and
//! the transports map them to wire errors through [`ErrorKind`], which
//! carries one stable numeric code per kind.

use std::io;

pub type Result<T, E = EngramError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum EngramError {
    #[error("invalid input for '{field}': {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("not found: {id}")]
    NotFound { id: String },

    #[error("conflict on '{field}': {reason}")]
    Conflict { field: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("parse error in {context}: {reason}")]
    Parse { context: String, reason: String },

    #[error("operation timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("unknown tool: {name}")]
    ToolNotFound { name: String },

    #[error("unauthorized: {reason}")]
    Unauthorized { reason: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl EngramError {
    pub fn invalid_input(field: impl Into<String>, reason: impl Into<String>) -> Self {
        EngramError::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn not_found(id: impl Into<String>) -> Self {
        EngramError::NotFound { id: id.into() }
    }

    pub fn conflict(field: impl Into<String>, reason: impl Into<String>) -> Self {
        EngramError::Conflict {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn parse(context: impl Into<String>, reason: impl Into<String>) -> Self {
        EngramError::Parse {
            context: context.into(),
            reason: reason.into(),
        }
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        EngramError::Internal(reason.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            EngramError::InvalidInput { .. } => ErrorKind::InvalidInput,
            EngramError::NotFound { .. } => ErrorKind::NotFound,
            EngramError::Conflict { .. } => ErrorKind::Conflict,
            EngramError::Io(_) => ErrorKind::Io,
            EngramError::Parse { .. } => ErrorKind::Parse,
            EngramError::Timeout { .. } => ErrorKind::Timeout,
            EngramError::ToolNotFound { .. } => ErrorKind::ToolNotFound,
            EngramError::Unauthorized { .. } => ErrorKind::Unauthorized,
            EngramError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// The offending field, for kinds that name one.
    pub fn field(&self) -> Option<&str> {
        match self {
            EngramError::InvalidInput { field, .. } | EngramError::Conflict { field, .. } => {
                Some(field)
            }
            _ => None,
        }
    }
}

/// Wire-stable error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    Conflict,
    Io,
    Parse,
    Timeout,
    ToolNotFound,
    Unauthorized,
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "invalid-input",
            ErrorKind::NotFound => "not-found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Io => "io-error",
            ErrorKind::Parse => "parse-error",
            ErrorKind::Timeout => "timeout",
            ErrorKind::ToolNotFound => "tool-not-found",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Internal => "internal",
        }
    }

    /// Stable JSON-RPC error code per kind. `-32602` and `-32700` are the
    /// standard invalid-params and parse codes; the rest sit in the
    /// implementation-defined `-32000..-32099` range.
    pub fn json_rpc_code(self) -> i64 {
        match self {
            ErrorKind::InvalidInput => -32602,
            ErrorKind::Parse => -32700,
            ErrorKind::NotFound => -32001,
            ErrorKind::Conflict => -32002,
            ErrorKind::Io => -32003,
            ErrorKind::Timeout => -32005,
            ErrorKind::ToolNotFound => -32006,
            ErrorKind::Unauthorized => -32007,
            ErrorKind::Internal => -32000,
        }
    }
}
