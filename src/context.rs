//! Degraded-mode notices.
//!
//! When the data-access layer substitutes local data for a failed remote call
//! it attaches a [`DegradedNotice`] so the UI can tell the user what happened.

use crate::error::StructuredError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Context describing why a response came from local data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DegradedNotice {
    /// Unique identifier for this fallback occurrence.
    pub notice_id: Uuid,
    /// Name of the data-access operation that fell back.
    pub operation: String,
    /// User-facing description, e.g. "loaded from local backup".
    pub message: String,
    /// The terminal error that triggered the fallback.
    pub error: StructuredError,
    /// Timestamp when the fallback happened.
    pub occurred_at: DateTime<Utc>,
    /// Additional metadata for debugging.
    pub metadata: HashMap<String, serde_json::Value>,
}

impl DegradedNotice {
    pub fn new<O: Into<String>, M: Into<String>>(
        operation: O,
        message: M,
        error: StructuredError,
    ) -> Self {
        Self {
            notice_id: Uuid::new_v4(),
            operation: operation.into(),
            message: message.into(),
            error,
            occurred_at: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    /// Add metadata using builder pattern.
    ///
    /// # Example
    /// ```rust
    /// use menu_resilience::{DegradedNotice, StructuredError};
    ///
    /// let notice = DegradedNotice::new(
    ///     "list_categories",
    ///     "loaded from local backup",
    ///     StructuredError::network("Failed to fetch"),
    /// )
    /// .with_metadata("rows", serde_json::json!(12));
    ///
    /// assert_eq!(notice.get_metadata("rows"), Some(&serde_json::json!(12)));
    /// ```
    pub fn with_metadata<K: Into<String>>(mut self, key: K, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn get_metadata(&self, key: &str) -> Option<&serde_json::Value> {
        self.metadata.get(key)
    }

    /// Number of remote attempts made before falling back.
    pub fn attempts(&self) -> usize {
        self.error.attempts()
    }
}
