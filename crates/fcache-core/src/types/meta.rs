//! File metadata and the expiration marker it carries.

use std::collections::HashMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CacheError, ErrorKind};
use crate::result::CacheResult;

/// Reserved metadata key holding the instant after which the sweep may
/// remove the object.
pub const INVALIDATE_AT_KEY: &str = "_invalidate_at";

/// Descriptive record of a cached blob.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMeta {
    /// Logical file name, e.g. `report.pdf`.
    pub name: String,
    /// MIME type.
    pub mime: String,
    /// Size in bytes. Loaders may leave it at zero when unknown.
    pub size: u64,
    /// Auxiliary metadata. Round-trips through every store.
    #[serde(default)]
    pub meta: HashMap<String, String>,
    /// Store key; filled in by stores on read paths.
    #[serde(default)]
    pub key: String,
    /// Creation (last write) time as reported by the store.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl FileMeta {
    /// Create metadata for a file with the given name, type and size.
    pub fn new(name: impl Into<String>, mime: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            mime: mime.into(),
            size,
            ..Self::default()
        }
    }

    /// Add an auxiliary metadata entry.
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    /// The recorded expiration, if any.
    ///
    /// Returns `None` when the object carries no expiration marker and an
    /// [`ErrorKind::InvalidMetadata`] error when the marker does not parse.
    pub fn invalidate_at(&self) -> Option<CacheResult<DateTime<Utc>>> {
        self.meta.get(INVALIDATE_AT_KEY).map(|raw| {
            parse_timestamp(raw).map_err(|e| {
                CacheError::with_source(
                    ErrorKind::InvalidMetadata,
                    format!("parse {INVALIDATE_AT_KEY} {raw:?} of {:?}", self.key),
                    e,
                )
            })
        })
    }

    /// Record the expiration, replacing any previous one.
    pub fn set_invalidate_at(&mut self, at: DateTime<Utc>) {
        self.meta
            .insert(INVALIDATE_AT_KEY.to_string(), format_timestamp(at));
    }
}

/// Encode an instant as a fixed-width RFC 3339 UTC timestamp with
/// nanosecond precision, so lexical order equals chronological order.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Parse a timestamp written by [`format_timestamp`] (any RFC 3339 offset is
/// accepted).
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw).map(|at| at.with_timezone(&Utc))
}
