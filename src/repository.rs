//! Data-access layer with fallback substitution.
//!
//! [`MenuRepository`] wraps every call to the hosted backend in the retry
//! executor. When a read is finally given up on, bundled reference data from
//! the [`LocalCatalog`] is returned instead; when a submission cannot reach the
//! backend for a transient reason, a simulated receipt is returned. Either way
//! the response is tagged with its [`DataSource`] and a [`DegradedNotice`].

use crate::context::DegradedNotice;
use crate::error::MenuResult;
use crate::executor::execute_with_retry;
use crate::retry::RetryPolicy;
use crate::settings::RetrySettings;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

pub const LOCAL_BACKUP_MESSAGE: &str = "loaded from local backup";
pub const OFFLINE_SIMULATED_MESSAGE: &str = "offline simulated";

/// The hosted database service, as seen by the data-access layer.
///
/// Rows and submissions are opaque JSON. Implementations report failures as
/// [`StructuredError`](crate::StructuredError)s so the executor can decide
/// whether to retry.
#[async_trait]
pub trait MenuBackend: Send + Sync {
    async fn list_categories(&self) -> MenuResult<Vec<Value>>;

    async fn list_items(&self, category: Option<&str>) -> MenuResult<Vec<Value>>;

    /// `idempotency_key` is the same for every retry of one submission.
    async fn submit_order(&self, idempotency_key: Uuid, order: &Value) -> MenuResult<Value>;

    /// `idempotency_key` is the same for every retry of one submission.
    async fn submit_service_request(
        &self,
        idempotency_key: Uuid,
        request: &Value,
    ) -> MenuResult<Value>;
}

/// Where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    Remote,
    LocalBackup,
    OfflineSimulated,
}

/// A response tagged with its origin.
#[derive(Debug, Clone, Serialize)]
pub struct Sourced<T> {
    pub data: T,
    pub source: DataSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<DegradedNotice>,
}

impl<T> Sourced<T> {
    fn remote(data: T) -> Self {
        Self {
            data,
            source: DataSource::Remote,
            notice: None,
        }
    }

    fn degraded(data: T, source: DataSource, notice: DegradedNotice) -> Self {
        Self {
            data,
            source,
            notice: Some(notice),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.source != DataSource::Remote
    }
}

/// Acknowledgement of an order or service request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    /// The idempotency key the submission was sent with.
    pub id: Uuid,
    pub submitted_at: DateTime<Utc>,
    /// True when the backend never acknowledged the submission.
    pub simulated: bool,
    /// Backend acknowledgement, or the submitted payload when simulated.
    pub response: Value,
}

/// Statically bundled reference data.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocalCatalog {
    #[serde(default)]
    pub categories: Vec<Value>,
    #[serde(default)]
    pub items: Vec<Value>,
}

impl LocalCatalog {
    pub fn new(categories: Vec<Value>, items: Vec<Value>) -> Self {
        Self { categories, items }
    }

    /// Parse a `{"categories": [...], "items": [...]}` document.
    pub fn from_json_str(json: &str) -> MenuResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Items whose `category_id` (or `category`) matches, or all items.
    ///
    /// Numeric ids match their decimal form.
    pub fn items_in(&self, category: Option<&str>) -> Vec<Value> {
        let Some(category) = category else {
            return self.items.clone();
        };

        self.items
            .iter()
            .filter(|item| {
                let id = item.get("category_id").or_else(|| item.get("category"));
                match id {
                    Some(Value::String(id)) => id == category,
                    Some(Value::Number(id)) => id.to_string() == category,
                    _ => false,
                }
            })
            .cloned()
            .collect()
    }
}

/// Retry-wrapped access to the backend with local fallback.
///
/// The backend is injected and shared; the repository owns no global state.
pub struct MenuRepository<B> {
    backend: Arc<B>,
    catalog: LocalCatalog,
    reads: RetryPolicy,
    writes: RetryPolicy,
    fallback_enabled: bool,
}

impl<B: MenuBackend> MenuRepository<B> {
    /// Repository configured from [`RetrySettings::global`].
    pub fn new(backend: Arc<B>, catalog: LocalCatalog) -> Self {
        Self::from_settings(backend, catalog, RetrySettings::global())
    }

    /// Reads follow `settings` and retry only transient kinds. Writes keep the
    /// [`RetryPolicy::writes`] preset, never retrying more often than `settings`
    /// allows. Without a configured timeout both keep their preset deadline.
    pub fn from_settings(backend: Arc<B>, catalog: LocalCatalog, settings: &RetrySettings) -> Self {
        let presets = (RetryPolicy::reads(), RetryPolicy::writes());

        let mut reads = settings.default_policy().with_transient_kinds();
        reads.timeout = settings.timeout.or(presets.0.timeout);

        let mut writes = presets.1;
        writes.max_retries = writes.max_retries.min(settings.max_retries);
        writes.timeout = settings.timeout.or(writes.timeout);

        Self {
            backend,
            catalog,
            reads,
            writes,
            fallback_enabled: settings.fallback_enabled,
        }
    }

    pub fn with_read_policy(mut self, policy: RetryPolicy) -> Self {
        self.reads = policy;
        self
    }

    pub fn with_write_policy(mut self, policy: RetryPolicy) -> Self {
        self.writes = policy;
        self
    }

    pub fn with_fallback(mut self, enabled: bool) -> Self {
        self.fallback_enabled = enabled;
        self
    }

    pub fn catalog(&self) -> &LocalCatalog {
        &self.catalog
    }

    pub async fn categories(&self) -> MenuResult<Sourced<Vec<Value>>> {
        let backend = &*self.backend;
        self.read_or_backup(
            "list_categories",
            || backend.list_categories(),
            |catalog| catalog.categories.clone(),
        )
        .await
    }

    pub async fn items(&self, category: Option<&str>) -> MenuResult<Sourced<Vec<Value>>> {
        let backend = &*self.backend;
        self.read_or_backup(
            "list_items",
            || backend.list_items(category),
            |catalog| catalog.items_in(category),
        )
        .await
    }

    pub async fn submit_order(&self, order: &Value) -> MenuResult<Sourced<SubmissionReceipt>> {
        let backend = &*self.backend;
        let key = Uuid::new_v4();
        self.write_or_simulate("submit_order", key, order, || backend.submit_order(key, order))
            .await
    }

    pub async fn submit_service_request(
        &self,
        request: &Value,
    ) -> MenuResult<Sourced<SubmissionReceipt>> {
        let backend = &*self.backend;
        let key = Uuid::new_v4();
        self.write_or_simulate("submit_service_request", key, request, || {
            backend.submit_service_request(key, request)
        })
        .await
    }

    async fn read_or_backup<F, Fut, L>(
        &self,
        operation: &'static str,
        call: F,
        local: L,
    ) -> MenuResult<Sourced<Vec<Value>>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = MenuResult<Vec<Value>>>,
        L: FnOnce(&LocalCatalog) -> Vec<Value>,
    {
        match execute_with_retry(call, &self.reads).await {
            Ok(rows) => Ok(Sourced::remote(rows)),
            Err(error) if self.fallback_enabled => {
                let rows = local(&self.catalog);
                warn!(
                    operation,
                    attempts = error.attempts(),
                    rows = rows.len(),
                    error = %error,
                    "backend unavailable, serving local backup"
                );
                let notice = DegradedNotice::new(operation, LOCAL_BACKUP_MESSAGE, error)
                    .with_metadata("rows", Value::from(rows.len()));
                Ok(Sourced::degraded(rows, DataSource::LocalBackup, notice))
            }
            Err(error) => Err(error),
        }
    }

    async fn write_or_simulate<F, Fut>(
        &self,
        operation: &'static str,
        key: Uuid,
        payload: &Value,
        call: F,
    ) -> MenuResult<Sourced<SubmissionReceipt>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = MenuResult<Value>>,
    {
        match execute_with_retry(call, &self.writes).await {
            Ok(response) => Ok(Sourced::remote(SubmissionReceipt {
                id: key,
                submitted_at: Utc::now(),
                simulated: false,
                response,
            })),
            // Rejected input or credentials must reach the caller; only an
            // unreachable backend is simulated.
            Err(error) if self.fallback_enabled && error.kind_or_unknown().is_transient() => {
                warn!(
                    operation,
                    %key,
                    attempts = error.attempts(),
                    error = %error,
                    "backend unavailable, simulating submission"
                );
                let receipt = SubmissionReceipt {
                    id: key,
                    submitted_at: Utc::now(),
                    simulated: true,
                    response: payload.clone(),
                };
                let notice = DegradedNotice::new(operation, OFFLINE_SIMULATED_MESSAGE, error)
                    .with_metadata("idempotency_key", Value::from(key.to_string()));
                Ok(Sourced::degraded(receipt, DataSource::OfflineSimulated, notice))
            }
            Err(error) => Err(error),
        }
    }
}
