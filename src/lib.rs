//! # Menu Resilience
//!
//! Retry, timeout and local-fallback execution core for the digital menu's
//! data-access layer.
//!
//! Remote calls to the hosted database are wrapped in [`execute_with_retry`].
//! Failures are normalized into [`StructuredError`] values whose kind and
//! retryability decide whether another attempt is made. When the executor
//! finally gives up, [`MenuRepository`] substitutes bundled reference data so
//! the menu stays usable offline.
//!
//! ## Features
//!
//! - **Error Classification**: failures from I/O, the database client and
//!   hand-built errors share one [`StructuredError`] shape
//! - **Retry Logic**: bounded attempts with exponential backoff and an
//!   optional per-attempt timeout
//! - **Cancellation**: [`execute_with_retry_cancellable`] aborts a retry loop
//!   mid-flight
//! - **Fallback**: reads served from a [`LocalCatalog`], submissions simulated
//!   when the backend is unreachable
//!
//! ## Quick Start
//!
//! ```rust
//! use menu_resilience::{execute_with_retry, BuiltinKind, RetryPolicy, StructuredError};
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let policy = RetryPolicy::new()
//!     .with_max_retries(3)
//!     .with_delay(Duration::from_millis(1))
//!     .with_retryable_kinds([BuiltinKind::NetworkError]);
//!
//! let mut failures = 2;
//! let result = execute_with_retry(
//!     || {
//!         let fail = failures > 0;
//!         failures -= 1;
//!         async move {
//!             if fail {
//!                 Err(StructuredError::network("Failed to fetch"))
//!             } else {
//!                 Ok("menu")
//!             }
//!         }
//!     },
//!     &policy,
//! )
//! .await;
//!
//! assert_eq!(result.unwrap(), "menu");
//! # }
//! ```
//!
//! ## Custom Error Kinds
//!
//! ```rust
//! use menu_resilience::{create_structured_error, ErrorKind, ErrorOptions, KindClassifier};
//!
//! #[derive(Debug, Clone)]
//! struct KitchenClosed;
//!
//! impl KindClassifier for KitchenClosed {
//!     fn tag(&self) -> &'static str { "KITCHEN_CLOSED" }
//!     fn is_transient(&self) -> bool { false }
//!     fn clone_box(&self) -> Box<dyn KindClassifier> {
//!         Box::new(self.clone())
//!     }
//! }
//!
//! let error = create_structured_error(
//!     "Kitchen opens at 18:00",
//!     ErrorOptions::new().with_kind(ErrorKind::custom(Box::new(KitchenClosed))),
//! );
//! assert!(!error.is_retryable());
//! ```

pub mod classify;
pub mod context;
pub mod error;
pub mod executor;
pub mod kind;
pub mod repository;
pub mod retry;
pub mod settings;

pub use classify::{is_http_error, is_network_error, TransportSignal};
pub use context::DegradedNotice;
pub use error::{create_structured_error, ErrorOptions, MenuResult, StructuredError};
pub use executor::{execute_with_retry, execute_with_retry_cancellable};
pub use kind::{BuiltinKind, ErrorKind, KindClassifier};
pub use repository::{
    DataSource, LocalCatalog, MenuBackend, MenuRepository, Sourced, SubmissionReceipt,
};
pub use retry::{PolicyError, RetryDecision, RetryPolicy};
pub use settings::RetrySettings;
pub use tokio_util::sync::CancellationToken;
