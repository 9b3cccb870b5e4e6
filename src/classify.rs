//! Failure classification.
//!
//! Failures reach the executor from several places with no common base type:
//! the runtime's own I/O stack, the hosted database client (which reports JSON
//! error objects), and hand-built [`StructuredError`]s. [`TransportSignal`] is
//! the capability protocol they share, and the `From` impls here turn each of
//! them into a [`StructuredError`].

use crate::error::{create_structured_error, ErrorOptions, StructuredError};
use crate::kind::{BuiltinKind, ErrorKind};
use serde_json::Value;
use std::error::Error;
use std::io;

const TRANSPORT_MARKERS: [&str; 8] = [
    "failed to fetch",
    "fetch failed",
    "networkerror",
    "network error",
    "connection refused",
    "connection reset",
    "connection closed",
    "dns error",
];

/// Capabilities an error-producing collaborator may expose.
pub trait TransportSignal {
    /// Numeric transport status (HTTP-like), when the failure carries one.
    fn transport_status(&self) -> Option<u16> {
        None
    }

    /// Whether the failure happened below the application protocol.
    fn is_transport_failure(&self) -> bool {
        false
    }
}

/// True when `candidate` is a low-level transport failure.
pub fn is_network_error<S: TransportSignal + ?Sized>(candidate: &S) -> bool {
    candidate.is_transport_failure()
}

/// True when `candidate` carries a numeric transport status.
pub fn is_http_error<S: TransportSignal + ?Sized>(candidate: &S) -> bool {
    candidate.transport_status().is_some()
}

fn mentions_transport_failure(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    TRANSPORT_MARKERS.iter().any(|marker| message.contains(marker))
}

fn chain<'a>(err: &'a (dyn Error + 'static)) -> impl Iterator<Item = &'a (dyn Error + 'static)> {
    std::iter::successors(Some(err), |&e| e.source())
}

impl TransportSignal for StructuredError {
    fn transport_status(&self) -> Option<u16> {
        self.status()
    }

    fn is_transport_failure(&self) -> bool {
        self.is_kind(BuiltinKind::NetworkError)
    }
}

impl TransportSignal for io::Error {
    fn is_transport_failure(&self) -> bool {
        match self.kind() {
            io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::AddrNotAvailable
            | io::ErrorKind::BrokenPipe => true,
            _ => mentions_transport_failure(&self.to_string()),
        }
    }
}

/// Error objects returned by the hosted database service.
///
/// Only JSON objects can carry signals; strings, numbers and arrays never do.
impl TransportSignal for Value {
    fn transport_status(&self) -> Option<u16> {
        let object = self.as_object()?;
        object
            .get("status")
            .or_else(|| object.get("statusCode"))
            .and_then(Value::as_u64)
            .and_then(|status| u16::try_from(status).ok())
    }

    fn is_transport_failure(&self) -> bool {
        if self.transport_status().is_some() {
            return false;
        }
        self.get("message")
            .and_then(Value::as_str)
            .is_some_and(mentions_transport_failure)
    }
}

fn dyn_transport_status(err: &(dyn Error + 'static)) -> Option<u16> {
    chain(err).find_map(|e| e.downcast_ref::<StructuredError>()?.status())
}

fn dyn_is_transport_failure(err: &(dyn Error + 'static)) -> bool {
    chain(err).any(|e| {
        if let Some(structured) = e.downcast_ref::<StructuredError>() {
            structured.is_transport_failure()
        } else if let Some(io_err) = e.downcast_ref::<io::Error>() {
            io_err.is_transport_failure()
        } else {
            mentions_transport_failure(&e.to_string())
        }
    })
}

impl TransportSignal for dyn Error + 'static {
    fn transport_status(&self) -> Option<u16> {
        dyn_transport_status(self)
    }

    fn is_transport_failure(&self) -> bool {
        dyn_is_transport_failure(self)
    }
}

impl TransportSignal for dyn Error + Send + Sync + 'static {
    fn transport_status(&self) -> Option<u16> {
        dyn_transport_status(self)
    }

    fn is_transport_failure(&self) -> bool {
        dyn_is_transport_failure(self)
    }
}

fn is_timeout(err: &(dyn Error + 'static)) -> bool {
    chain(err).any(|e| {
        e.is::<tokio::time::error::Elapsed>()
            || e
                .downcast_ref::<io::Error>()
                .is_some_and(|io_err| io_err.kind() == io::ErrorKind::TimedOut)
    })
}

impl StructuredError {
    /// Normalize an arbitrary error.
    ///
    /// A [`StructuredError`] at the top of the chain passes through unchanged.
    /// Otherwise the chain is inspected for a timeout, a transport failure or a
    /// transport status, in that order; anything else keeps its message with
    /// kind `UNKNOWN`.
    pub fn from_error(err: &(dyn Error + 'static)) -> Self {
        if let Some(structured) = err.downcast_ref::<StructuredError>() {
            return structured.clone();
        }

        let message = err.to_string();
        if is_timeout(err) {
            StructuredError::new(message, BuiltinKind::Timeout)
        } else if dyn_is_transport_failure(err) {
            StructuredError::network(message)
        } else if let Some(status) = dyn_transport_status(err) {
            StructuredError::from_status(status, message)
        } else {
            StructuredError::unknown(message)
        }
    }
}

impl From<io::Error> for StructuredError {
    fn from(err: io::Error) -> Self {
        StructuredError::from_error(&err)
    }
}

impl From<tokio::time::error::Elapsed> for StructuredError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        StructuredError::timeout()
    }
}

impl From<serde_json::Error> for StructuredError {
    fn from(err: serde_json::Error) -> Self {
        StructuredError::validation(format!("JSON serialization error: {err}"))
    }
}

impl From<Box<dyn Error + Send + Sync>> for StructuredError {
    fn from(err: Box<dyn Error + Send + Sync>) -> Self {
        let err: &(dyn Error + 'static) = &*err;
        StructuredError::from_error(err)
    }
}

/// Normalize a remote error object such as `{"message": .., "status": 503}`.
///
/// A `code` equal to a builtin kind tag is honored when no status is present.
impl From<Value> for StructuredError {
    fn from(value: Value) -> Self {
        let message = match &value {
            Value::String(text) => text.clone(),
            Value::Object(object) => object
                .get("message")
                .or_else(|| object.get("error"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| value.to_string()),
            other => other.to_string(),
        };

        if let Some(status) = value.transport_status() {
            return StructuredError::from_status(status, message);
        }
        if value.is_transport_failure() {
            return StructuredError::network(message);
        }

        let kind = value
            .get("code")
            .and_then(Value::as_str)
            .and_then(BuiltinKind::from_tag)
            .map(ErrorKind::Builtin)
            .unwrap_or_else(ErrorKind::unknown);
        create_structured_error(message, ErrorOptions::new().with_kind(kind))
    }
}
