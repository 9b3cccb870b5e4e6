//! Core StructuredError type and constructor methods.
//!
//! Every failure the executor sees is normalized into a [`StructuredError`]
//! carrying a message, an optional kind, an optional transport status and a
//! retryability flag that is always resolved at construction time.

use crate::kind::{BuiltinKind, ErrorKind};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for operations that fail with a [`StructuredError`].
pub type MenuResult<T> = Result<T, StructuredError>;

const FALLBACK_MESSAGE: &str = "Unknown error";

/// The normalized failure value.
///
/// Fields are read through accessors so a constructed value cannot be
/// changed in place.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("{message}")]
pub struct StructuredError {
    message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    kind: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    status: Option<u16>,
    #[serde(default)]
    retryable: bool,
    /// Errors of earlier failed attempts, oldest first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    history: Vec<StructuredError>,
}

/// Optional fields for [`create_structured_error`].
#[derive(Debug, Clone, Default)]
pub struct ErrorOptions {
    pub kind: Option<ErrorKind>,
    pub status: Option<u16>,
    pub retryable: Option<bool>,
}

impl ErrorOptions {
    /// Create empty options; retryable is then derived from the kind.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the error kind.
    pub fn with_kind(mut self, kind: impl Into<ErrorKind>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    /// Set the transport status.
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Override the retryability derived from the kind.
    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = Some(retryable);
        self
    }
}

/// Build a [`StructuredError`].
///
/// When `options.retryable` is absent it is derived from the kind: `true` for
/// the transient kinds (network error, timeout, server error), `false`
/// otherwise, including when no kind was given. An empty message is replaced
/// with `"Unknown error"`.
pub fn create_structured_error<S: Into<String>>(
    message: S,
    options: ErrorOptions,
) -> StructuredError {
    let message = message.into();
    let message = if message.trim().is_empty() {
        FALLBACK_MESSAGE.to_string()
    } else {
        message
    };
    let retryable = options
        .retryable
        .unwrap_or_else(|| options.kind.as_ref().is_some_and(ErrorKind::is_transient));

    StructuredError {
        message,
        kind: options.kind,
        status: options.status,
        retryable,
        history: Vec::new(),
    }
}

impl StructuredError {
    // === Primary Constructors ===

    /// Create an error of the given kind.
    pub fn new<S: Into<String>>(message: S, kind: impl Into<ErrorKind>) -> Self {
        create_structured_error(message, ErrorOptions::new().with_kind(kind))
    }

    /// Create a transport-level failure.
    pub fn network<S: Into<String>>(message: S) -> Self {
        Self::new(message, BuiltinKind::NetworkError)
    }

    /// The failure synthesized when an attempt loses its timeout race.
    pub fn timeout() -> Self {
        Self::new("Request timeout", BuiltinKind::Timeout)
    }

    /// Create a remote-service failure with its transport status.
    pub fn server<S: Into<String>>(status: u16, message: S) -> Self {
        create_structured_error(
            message,
            ErrorOptions::new()
                .with_kind(BuiltinKind::ServerError)
                .with_status(status),
        )
    }

    /// Create an authentication or permission failure.
    pub fn unauthorized<S: Into<String>>(message: S) -> Self {
        Self::new(message, BuiltinKind::Unauthorized)
    }

    /// Create a missing-resource failure.
    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::new(message, BuiltinKind::NotFound)
    }

    /// Create a rejected-input failure.
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::new(message, BuiltinKind::ValidationError)
    }

    /// The failure returned when the caller cancels a retry loop.
    pub fn cancelled() -> Self {
        Self::new("Request cancelled", BuiltinKind::Cancelled)
    }

    /// Create an unclassified failure.
    pub fn unknown<S: Into<String>>(message: S) -> Self {
        Self::new(message, BuiltinKind::Unknown)
    }

    /// Classify an HTTP-like status code.
    pub fn from_status<S: Into<String>>(status: u16, message: S) -> Self {
        let kind = match status {
            400 | 422 => BuiltinKind::ValidationError,
            401 | 403 => BuiltinKind::Unauthorized,
            404 => BuiltinKind::NotFound,
            408 => BuiltinKind::Timeout,
            429 | 500..=599 => BuiltinKind::ServerError,
            _ => BuiltinKind::Unknown,
        };
        create_structured_error(message, ErrorOptions::new().with_kind(kind).with_status(status))
    }

    // === Accessors ===

    /// Get the human-readable message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the kind, if one was given.
    pub fn kind(&self) -> Option<&ErrorKind> {
        self.kind.as_ref()
    }

    /// The kind, with an absent kind read as `UNKNOWN`.
    pub fn kind_or_unknown(&self) -> ErrorKind {
        self.kind.clone().unwrap_or_else(ErrorKind::unknown)
    }

    /// Check the kind against a builtin kind.
    pub fn is_kind(&self, kind: BuiltinKind) -> bool {
        self.kind.as_ref().is_some_and(|k| k.is(kind))
    }

    /// Get the transport status, if any.
    pub fn status(&self) -> Option<u16> {
        self.status
    }

    /// Whether the executor may retry after this failure.
    pub fn is_retryable(&self) -> bool {
        self.retryable
    }

    /// Errors of the attempts that failed before this one, oldest first.
    pub fn history(&self) -> &[StructuredError] {
        &self.history
    }

    /// Number of attempts this error summarizes.
    pub fn attempts(&self) -> usize {
        self.history.len() + 1
    }

    /// Put `earlier` ahead of any history this error already carries.
    pub(crate) fn with_history(mut self, mut earlier: Vec<StructuredError>) -> Self {
        earlier.append(&mut self.history);
        self.history = earlier;
        self
    }
}
