//! Error kind taxonomy.
//!
//! Kinds are a closed set of builtin tags that callers can extend with their own
//! [`KindClassifier`] implementations without modifying this crate.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Trait for defining custom error kinds.
///
/// A custom kind supplies its own tag and decides whether failures of that kind
/// are transient (retryable by default).
pub trait KindClassifier: fmt::Debug + Send + Sync {
    /// Upper-snake tag identifying this kind, e.g. `PAYMENT_DECLINED`.
    fn tag(&self) -> &'static str;

    /// Whether failures of this kind are retryable when the caller does not say otherwise.
    fn is_transient(&self) -> bool;

    /// Clone this classifier (needed for ErrorKind cloning).
    fn clone_box(&self) -> Box<dyn KindClassifier>;
}

impl Clone for Box<dyn KindClassifier> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Built-in error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinKind {
    /// Transport or connectivity failure.
    NetworkError,
    /// An attempt exceeded its configured deadline.
    Timeout,
    /// The remote service reported a failure (5xx-style).
    ServerError,
    /// Authentication or permission failure.
    Unauthorized,
    /// The requested resource does not exist.
    NotFound,
    /// Caller-supplied input was rejected.
    ValidationError,
    /// The caller aborted the operation.
    Cancelled,
    /// Unclassified failure.
    Unknown,
}

impl BuiltinKind {
    /// Every builtin kind, in declaration order.
    pub const ALL: [BuiltinKind; 8] = [
        BuiltinKind::NetworkError,
        BuiltinKind::Timeout,
        BuiltinKind::ServerError,
        BuiltinKind::Unauthorized,
        BuiltinKind::NotFound,
        BuiltinKind::ValidationError,
        BuiltinKind::Cancelled,
        BuiltinKind::Unknown,
    ];

    /// Upper-snake tag, e.g. `NETWORK_ERROR`.
    pub fn as_tag(&self) -> &'static str {
        match self {
            BuiltinKind::NetworkError => "NETWORK_ERROR",
            BuiltinKind::Timeout => "TIMEOUT",
            BuiltinKind::ServerError => "SERVER_ERROR",
            BuiltinKind::Unauthorized => "UNAUTHORIZED",
            BuiltinKind::NotFound => "NOT_FOUND",
            BuiltinKind::ValidationError => "VALIDATION_ERROR",
            BuiltinKind::Cancelled => "CANCELLED",
            BuiltinKind::Unknown => "UNKNOWN",
        }
    }

    /// Look up a builtin kind by its exact tag.
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_tag() == tag)
    }

    /// True for network errors, timeouts and server errors.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BuiltinKind::NetworkError | BuiltinKind::Timeout | BuiltinKind::ServerError
        )
    }
}

/// A failure category: either builtin or caller-defined.
///
/// Two kinds are equal when their tags are equal, so allow-lists can mix builtin
/// and custom kinds.
#[derive(Debug, Clone)]
pub enum ErrorKind {
    Builtin(BuiltinKind),
    Custom(Box<dyn KindClassifier>),
}

impl ErrorKind {
    /// Create a network error kind (retryable by default).
    pub fn network() -> Self {
        Self::Builtin(BuiltinKind::NetworkError)
    }

    /// Create a timeout kind (retryable by default).
    pub fn timeout() -> Self {
        Self::Builtin(BuiltinKind::Timeout)
    }

    /// Create a server error kind (retryable by default).
    pub fn server() -> Self {
        Self::Builtin(BuiltinKind::ServerError)
    }

    /// Create an unauthorized kind (not retryable).
    pub fn unauthorized() -> Self {
        Self::Builtin(BuiltinKind::Unauthorized)
    }

    /// Create a not-found kind (not retryable).
    pub fn not_found() -> Self {
        Self::Builtin(BuiltinKind::NotFound)
    }

    /// Create a validation kind (not retryable).
    pub fn validation() -> Self {
        Self::Builtin(BuiltinKind::ValidationError)
    }

    /// Create a cancelled kind (not retryable).
    pub fn cancelled() -> Self {
        Self::Builtin(BuiltinKind::Cancelled)
    }

    /// Create an unknown kind (not retryable).
    pub fn unknown() -> Self {
        Self::Builtin(BuiltinKind::Unknown)
    }

    /// Wrap a caller-defined classifier.
    pub fn custom(classifier: Box<dyn KindClassifier>) -> Self {
        Self::Custom(classifier)
    }

    /// Get the tag of this kind.
    pub fn tag(&self) -> &str {
        match self {
            ErrorKind::Builtin(builtin) => builtin.as_tag(),
            ErrorKind::Custom(custom) => custom.tag(),
        }
    }

    /// Whether failures of this kind are retryable by default.
    pub fn is_transient(&self) -> bool {
        match self {
            ErrorKind::Builtin(builtin) => builtin.is_transient(),
            ErrorKind::Custom(custom) => custom.is_transient(),
        }
    }

    /// The builtin kind, if this is not a custom one.
    pub fn as_builtin(&self) -> Option<BuiltinKind> {
        match self {
            ErrorKind::Builtin(builtin) => Some(*builtin),
            ErrorKind::Custom(_) => None,
        }
    }

    /// Check against a builtin kind without constructing an `ErrorKind`.
    pub fn is(&self, kind: BuiltinKind) -> bool {
        self.as_builtin() == Some(kind)
    }
}

impl From<BuiltinKind> for ErrorKind {
    fn from(kind: BuiltinKind) -> Self {
        Self::Builtin(kind)
    }
}

impl PartialEq for ErrorKind {
    fn eq(&self, other: &Self) -> bool {
        self.tag() == other.tag()
    }
}

impl Eq for ErrorKind {}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl Serialize for ErrorKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.tag())
    }
}

// Custom classifiers cannot be revived from a tag; they come back as UNKNOWN.
impl<'de> Deserialize<'de> for ErrorKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(BuiltinKind::from_tag(&tag)
            .map(ErrorKind::Builtin)
            .unwrap_or_else(ErrorKind::unknown))
    }
}
