//! Error-kind taxonomy shared across the pipeline crates
//!
//! Every crate keeps its own `thiserror` enum; this module provides the one
//! classification the retry executor and the orchestrator's error funnel
//! dispatch on. Classification is local to the call site that produced the
//! error - the orchestrator only ever looks at the kind.

use serde::{Deserialize, Serialize};

/// Classified failure kind for a pipeline operation
///
/// The kind decides two things: whether the retry executor may try again,
/// and which first sentence the job's `error_message` gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Inputs rejected before any I/O was performed
    Validation,
    /// External resource does not exist (unknown ticker, missing file, HTTP 404)
    NotFound,
    /// Policy denial (robots.txt disallow, read-only violation, HTTP 401/403)
    Forbidden,
    /// HTTP 429 or provider-indicated throttling
    RateLimited,
    /// Network timeout, HTTP 5xx, temporary database error
    Transient,
    /// Response or file exceeds a configured cap
    SizeExceeded,
    /// Cancellation signal observed
    Cancelled,
    /// Unclassified failure
    Internal,
}

impl ErrorKind {
    /// Whether the retry executor may re-attempt an operation failing with
    /// this kind. `Internal` is special-cased to a single retry inside
    /// [`crate::RetryPolicy`].
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::RateLimited | Self::Transient)
    }

    /// Whether the kind is a terminal job outcome rather than a stage error
    pub const fn is_cancellation(self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Stable name used as the first sentence of a failed job's
    /// `error_message`
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "ValidationError",
            Self::NotFound => "NotFound",
            Self::Forbidden => "Forbidden",
            Self::RateLimited => "RateLimited",
            Self::Transient => "Transient",
            Self::SizeExceeded => "SizeExceeded",
            Self::Cancelled => "Cancelled",
            Self::Internal => "Internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trait implemented by every crate-level error enum so the retry executor
/// and the orchestrator can dispatch on [`ErrorKind`] alone
pub trait Classify {
    /// Classify this error into the shared taxonomy
    fn kind(&self) -> ErrorKind;
}

/// Marker produced when a cancellation signal interrupts an operation
///
/// Crate error enums implement `From<Cancelled>` so the retry executor can
/// surface cancellation through the caller's own error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

impl std::fmt::Display for Cancelled {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("operation cancelled")
    }
}
