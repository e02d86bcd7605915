//! Error taxonomy for storage operations.
//!
//! Every failure surfaced by the service or an adapter is one of the five
//! [`StoreError`] kinds, each carrying a stable machine code (see
//! [`StoreError::code`]) that the HTTP collaborator maps onto a status:
//!
//! | Kind | Code | Suggested status |
//! |------|------|------------------|
//! | [`StoreError::Validation`] | `VALIDATION_ERROR` | 400 |
//! | [`StoreError::Unauthorized`] | `UNAUTHORIZED` | 401 |
//! | [`StoreError::NotFound`] | `NOT_FOUND` | 404 |
//! | [`StoreError::Precondition`] | `PRECONDITION_FAILED` | 412 |
//! | [`StoreError::Internal`] | `INTERNAL_ERROR` | 500 |
//!
//! Backend adapters map their driver errors into these variants; unknown
//! failures become [`StoreError::Internal`] with the original error retained
//! as `source` for logging.
//!
//! # Trace Context
//!
//! Each variant carries an optional `span_id` captured from the active
//! [`tracing::Span`] at construction time, enabling correlation of errors
//! with the request that produced them.
//!
//! # Example
//!
//! ```
//! use stash_storage::{StoreError, StoreResult};
//!
//! fn reject(key: &str) -> StoreResult<()> {
//!     Err(StoreError::validation(format!("key {key:?} is too long")))
//! }
//! ```

use std::{fmt, sync::Arc};

use thiserror::Error;

/// A boxed error type for source chain tracking.
pub type BoxError = Arc<dyn std::error::Error + Send + Sync>;

/// Result type alias for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Captures the span ID from the current tracing span, if any.
fn current_span_id() -> Option<tracing::span::Id> {
    tracing::Span::current().id()
}

/// Failures surfaced by the storage service and adapters.
///
/// `Display` output is safe to return to external callers: internal
/// diagnostics (backend messages, full key names) are only available via
/// [`StoreError::detail`], which must never leave the server.
///
/// # Non-exhaustive
///
/// New variants may be added in future minor releases. Downstream match
/// expressions must include a wildcard arm.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// The caller supplied an invalid input (key too long, oversized value,
    /// malformed cursor, bad TTL, empty batch).
    ///
    /// Validation happens in the service before any adapter call; adapters
    /// never observe invalid inputs.
    Validation {
        /// Description of the violated constraint. Derived from caller
        /// input, safe to echo back.
        message: String,
        /// Span ID captured at error creation for trace correlation.
        span_id: Option<tracing::span::Id>,
    },

    /// The caller is not authorized for the requested scope.
    ///
    /// Raised by the identity resolver in front of the core; carried here so
    /// the whole system shares one taxonomy.
    Unauthorized {
        /// Span ID captured at error creation for trace correlation.
        span_id: Option<tracing::span::Id>,
    },

    /// The requested item does not exist (or has expired).
    ///
    /// Reads return `Ok(None)` for missing items; this variant exists for
    /// surfaces that must signal absence as a failure (the HTTP `GET` and
    /// `DELETE` routes).
    NotFound {
        /// The key that was not found.
        key: String,
        /// Span ID captured at error creation for trace correlation.
        span_id: Option<tracing::span::Id>,
    },

    /// An `If-Match` precondition did not hold.
    ///
    /// Raised when the supplied version does not match the current active
    /// item, when a precondition names a version but no active item exists,
    /// when the `If-Match` value itself is malformed, or when the key-value
    /// backend exhausts its compare-and-set retry budget under contention.
    /// Never silently converted into an overwrite or a not-found.
    Precondition {
        /// Description of the failed precondition.
        message: String,
        /// Span ID captured at error creation for trace correlation.
        span_id: Option<tracing::span::Id>,
    },

    /// A backend failure that is not the caller's fault (connection drop,
    /// driver error, corrupt row).
    Internal {
        /// Description of the internal error. Only exposed via
        /// [`StoreError::detail`], never via `Display`.
        message: String,
        /// The underlying error that caused this failure.
        #[source]
        source: Option<BoxError>,
        /// Span ID captured at error creation for trace correlation.
        span_id: Option<tracing::span::Id>,
    },
}

/// Appends ` [span=<id>]` to a formatter when a span ID is present.
fn fmt_span_suffix(f: &mut fmt::Formatter<'_>, span_id: &Option<tracing::span::Id>) -> fmt::Result {
    if let Some(id) = span_id { write!(f, " [span={}]", id.into_u64()) } else { Ok(()) }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation { message, span_id } => {
                write!(f, "Validation failed: {message}")?;
                fmt_span_suffix(f, span_id)
            },
            Self::Unauthorized { span_id } => {
                write!(f, "Unauthorized")?;
                fmt_span_suffix(f, span_id)
            },
            Self::NotFound { span_id, .. } => {
                write!(f, "Item not found")?;
                fmt_span_suffix(f, span_id)
            },
            Self::Precondition { message, span_id } => {
                write!(f, "Precondition failed: {message}")?;
                fmt_span_suffix(f, span_id)
            },
            Self::Internal { span_id, .. } => {
                write!(f, "Internal error")?;
                fmt_span_suffix(f, span_id)
            },
        }
    }
}

impl StoreError {
    /// Creates a new `Validation` error with the given message.
    ///
    /// Captures the current tracing span ID for log correlation.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into(), span_id: current_span_id() }
    }

    /// Creates a new `Unauthorized` error.
    ///
    /// Captures the current tracing span ID for log correlation.
    #[must_use]
    pub fn unauthorized() -> Self {
        Self::Unauthorized { span_id: current_span_id() }
    }

    /// Creates a new `NotFound` error for the given key.
    ///
    /// Captures the current tracing span ID for log correlation.
    #[must_use]
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into(), span_id: current_span_id() }
    }

    /// Creates a new `Precondition` error with the given message.
    ///
    /// Captures the current tracing span ID for log correlation.
    #[must_use]
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition { message: message.into(), span_id: current_span_id() }
    }

    /// Creates a `Precondition` error describing a version mismatch.
    ///
    /// `actual` is `None` when no active item exists for the key.
    #[must_use]
    pub fn version_mismatch(expected: i64, actual: Option<i64>) -> Self {
        match actual {
            Some(actual) => {
                Self::precondition(format!("expected version {expected}, found {actual}"))
            },
            None => {
                Self::precondition(format!("expected version {expected}, but no active item exists"))
            },
        }
    }

    /// Creates a new `Internal` error with the given message.
    ///
    /// Captures the current tracing span ID for log correlation.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into(), source: None, span_id: current_span_id() }
    }

    /// Creates a new `Internal` error with a message and source error.
    ///
    /// Captures the current tracing span ID for log correlation.
    #[must_use]
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(Arc::new(source)),
            span_id: current_span_id(),
        }
    }

    /// Returns the stable machine code for this error kind.
    ///
    /// Codes are part of the wire contract and never change.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::Unauthorized { .. } => "UNAUTHORIZED",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Precondition { .. } => "PRECONDITION_FAILED",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    /// Returns the tracing span ID captured when this error was created,
    /// if a tracing subscriber was active at that time.
    #[must_use]
    pub fn span_id(&self) -> Option<&tracing::span::Id> {
        match self {
            Self::Validation { span_id, .. }
            | Self::Unauthorized { span_id, .. }
            | Self::NotFound { span_id, .. }
            | Self::Precondition { span_id, .. }
            | Self::Internal { span_id, .. } => span_id.as_ref(),
        }
    }

    /// Returns a detailed diagnostic string for server-side logging.
    ///
    /// Unlike `Display`, which is safe for external consumers, this includes
    /// internal context such as full key names and backend error messages.
    /// **Never expose this output to external callers.**
    #[must_use]
    pub fn detail(&self) -> String {
        match self {
            Self::NotFound { key, .. } => format!("Item not found: {key}"),
            Self::Internal { message, .. } => format!("Internal error: {message}"),
            _ => self.to_string(),
        }
    }
}
