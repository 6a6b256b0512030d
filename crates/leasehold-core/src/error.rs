//! Error types for the lock protocol
//!
//! This module defines:
//! - `LockError`: every failure a coordinator or store can report
//! - `ErrorKind`: the coarse class of a `LockError`, for callers that only
//!   need to decide between re-acquiring, retrying or giving up

use std::fmt::{Display, Formatter};

/// Lock protocol error types
#[derive(thiserror::Error, Debug)]
pub enum LockError {
    #[error("invalid key format (max 256 chars, [a-zA-Z0-9_-]): {0:?}")]
    InvalidKey(String),

    #[error("invalid TTL duration (1ms-10m): {0:?}")]
    InvalidTtl(std::time::Duration),

    #[error("invalid retry strategy: {0}")]
    InvalidRetryStrategy(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("lock acquisition failed for '{key}' after {attempts} attempts")]
    AcquisitionFailed { key: String, attempts: u32 },

    #[error("lock ownership mismatch")]
    OwnershipMismatch,

    #[error("lock refresh beyond safety margin")]
    RefreshTooLate,

    #[error("lock operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("lock adapter closed")]
    AdapterClosed,

    #[error("failed to serialize metadata: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("backend error: {0}")]
    Backend(#[source] anyhow::Error),
}

/// Coarse classification of a [`LockError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed input, rejected before any I/O. Never worth retrying.
    Validation,
    /// Release/refresh identity match failed.
    Ownership,
    /// Refresh arrived inside the safety margin; re-acquire instead.
    Timing,
    /// Connectivity, timeout or malformed store response.
    Backend,
    /// Retry budget consumed without a grant.
    Exhausted,
    /// The adapter was closed.
    Closed,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Ownership => "ownership",
            ErrorKind::Timing => "timing",
            ErrorKind::Backend => "backend",
            ErrorKind::Exhausted => "exhausted",
            ErrorKind::Closed => "closed",
        };
        f.write_str(name)
    }
}

impl LockError {
    /// Wrap a store-level error
    pub fn backend<E>(err: E) -> Self
    where
        E: Into<anyhow::Error>,
    {
        LockError::Backend(err.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            LockError::InvalidKey(_)
            | LockError::InvalidTtl(_)
            | LockError::InvalidRetryStrategy(_)
            | LockError::InvalidConfig(_)
            | LockError::Metadata(_) => ErrorKind::Validation,
            LockError::AcquisitionFailed { .. } => ErrorKind::Exhausted,
            LockError::OwnershipMismatch => ErrorKind::Ownership,
            LockError::RefreshTooLate => ErrorKind::Timing,
            LockError::Timeout(_) | LockError::Backend(_) => ErrorKind::Backend,
            LockError::AdapterClosed => ErrorKind::Closed,
        }
    }
}

pub type Result<T> = std::result::Result<T, LockError>;
