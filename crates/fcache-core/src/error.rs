//! Unified error types for fcache.
//!
//! Stores and the loading cache map their internal failures into
//! [`CacheError`] so callers can branch on [`ErrorKind`] without knowing which
//! backend produced the error. A sweep reports its per-object failures through
//! [`InvalidationError`].

use std::fmt;

use thiserror::Error;

/// Boxed error accepted as the cause of a [`CacheError`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error kind categorization used across every fcache crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    /// The key is absent from the store. Drives the miss path and is never
    /// counted as a cache error.
    NotFound,
    /// Transport, authorization, or unexpected store failure.
    Backend,
    /// The caller-supplied loader (or the stream it produced) failed.
    Loader,
    /// The stored expiration timestamp could not be parsed.
    InvalidMetadata,
    /// The temporary file used to duplicate loader content failed.
    Scratch,
    /// The request itself is malformed (empty key, out-of-range TTL).
    InvalidRequest,
    /// A configuration error occurred.
    Configuration,
    /// The operation was cancelled by the cache's shutdown token.
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "NOT_FOUND"),
            Self::Backend => write!(f, "BACKEND"),
            Self::Loader => write!(f, "LOADER"),
            Self::InvalidMetadata => write!(f, "INVALID_METADATA"),
            Self::Scratch => write!(f, "SCRATCH"),
            Self::InvalidRequest => write!(f, "INVALID_REQUEST"),
            Self::Configuration => write!(f, "CONFIGURATION"),
            Self::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// The unified error used throughout fcache.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct CacheError {
    /// The category of error.
    pub kind: ErrorKind,
    /// A human-readable message carrying the operation and key.
    pub message: String,
    /// Optional underlying cause.
    #[source]
    pub source: Option<BoxError>,
}

impl CacheError {
    /// Create a new error.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Create a new error with an underlying cause.
    pub fn with_source(
        kind: ErrorKind,
        message: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Create a not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// Create a backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Backend, message)
    }

    /// Create a loader error.
    pub fn loader(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Loader, message)
    }

    /// Create an invalid-metadata error.
    pub fn invalid_metadata(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidMetadata, message)
    }

    /// Create a scratch file error.
    pub fn scratch(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Scratch, message)
    }

    /// Create an invalid-request error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidRequest, message)
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    /// Create a cancellation error.
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Cancelled, message)
    }

    /// Whether this error reports an absent key.
    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }
}

impl Clone for CacheError {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            message: self.message.clone(),
            source: None,
        }
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        Self::with_source(
            ErrorKind::Backend,
            format!("JSON serialization error: {err}"),
            err,
        )
    }
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        Self::with_source(ErrorKind::Backend, format!("I/O error: {err}"), err)
    }
}

impl From<config::ConfigError> for CacheError {
    fn from(err: config::ConfigError) -> Self {
        Self::with_source(
            ErrorKind::Configuration,
            format!("Configuration error: {err}"),
            err,
        )
    }
}

/// Every failure collected during one invalidation pass.
///
/// A pass keeps going after a bad timestamp or a failed removal, so this
/// carries all of them together with the number of objects that were
/// removed regardless.
#[derive(Debug, Error)]
pub struct InvalidationError {
    /// Objects removed before and after the failures.
    pub removed: u64,
    /// Per-object failures, in listing order.
    pub errors: Vec<CacheError>,
}

impl InvalidationError {
    /// Number of collected failures.
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Whether no failure was collected.
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

impl fmt::Display for InvalidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} error(s) occurred while invalidating ({} removed):",
            self.errors.len(),
            self.removed
        )?;
        for err in &self.errors {
            write!(f, "\n\t* {err}")?;
        }
        Ok(())
    }
}
