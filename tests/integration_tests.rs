use async_trait::async_trait;
use menu_resilience::{
    execute_with_retry, execute_with_retry_cancellable, BuiltinKind, CancellationToken,
    DataSource, LocalCatalog, MenuBackend, MenuRepository, MenuResult, RetryPolicy,
    StructuredError,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[tokio::test(start_paused = true)]
async fn test_timeout_scenario_ends_with_request_timeout() {
    let policy: RetryPolicy = serde_json::from_value(json!({
        "max_retries": 2,
        "delay_ms": 10,
        "backoff_multiplier": 2.0,
        "retryable_kinds": ["NETWORK_ERROR"],
        "timeout_ms": 50
    }))
    .unwrap();
    let calls = AtomicU32::new(0);

    let result = execute_with_retry(
        || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok::<_, StructuredError>("too late")
            }
        },
        &policy,
    )
    .await;

    // TIMEOUT is not on the allow-list, so the first timeout is final.
    let error = result.unwrap_err();
    assert_eq!(error.message(), "Request timeout");
    assert!(error.is_kind(BuiltinKind::Timeout));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(error.attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_remote_error_objects_drive_retries() {
    // Given: a database client reporting JSON error objects
    let calls = AtomicU32::new(0);
    let policy = RetryPolicy::new()
        .with_max_retries(3)
        .with_delay(Duration::from_millis(10));

    // When: the first response is a 503 and the second succeeds
    let result = execute_with_retry(
        || {
            let call = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if call == 0 {
                    Err(json!({"message": "Service Unavailable", "status": 503}))
                } else {
                    Ok(vec![json!({"id": "mains"})])
                }
            }
        },
        &policy,
    )
    .await;

    // Then: the 5xx was retried
    assert_eq!(result.unwrap().len(), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_loop_reports_cancellation() {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(15)).await;
        trigger.cancel();
    });

    let result: MenuResult<()> = execute_with_retry_cancellable(
        || async { Err(StructuredError::network("offline")) },
        &RetryPolicy::new()
            .with_max_retries(10)
            .with_delay(Duration::from_millis(10)),
        &token,
    )
    .await;

    let error = result.unwrap_err();
    assert_eq!(error.message(), "Request cancelled");
    assert_eq!(error.history().len(), 2);
}

struct OfflineBackend;

#[async_trait]
impl MenuBackend for OfflineBackend {
    async fn list_categories(&self) -> MenuResult<Vec<Value>> {
        Err(std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "connection refused").into())
    }

    async fn list_items(&self, _category: Option<&str>) -> MenuResult<Vec<Value>> {
        Err(StructuredError::network("Failed to fetch"))
    }

    async fn submit_order(&self, _key: Uuid, _order: &Value) -> MenuResult<Value> {
        Err(StructuredError::timeout())
    }

    async fn submit_service_request(&self, _key: Uuid, _request: &Value) -> MenuResult<Value> {
        Err(StructuredError::unauthorized("row level security"))
    }
}

#[tokio::test(start_paused = true)]
async fn test_offline_backend_keeps_the_menu_usable() {
    let catalog = LocalCatalog::new(
        vec![json!({"id": "drinks", "name": "Drinks"})],
        vec![json!({"name": "Lemonade", "category_id": "drinks"})],
    );
    let repo = MenuRepository::new(Arc::new(OfflineBackend), catalog).with_fallback(true);

    let categories = repo.categories().await.unwrap();
    assert_eq!(categories.source, DataSource::LocalBackup);
    assert_eq!(categories.data[0]["name"], "Drinks");
    assert!(categories
        .notice
        .as_ref()
        .unwrap()
        .error
        .is_kind(BuiltinKind::NetworkError));

    let order = repo.submit_order(&json!({"table": 2})).await.unwrap();
    assert_eq!(order.source, DataSource::OfflineSimulated);
    assert!(order.data.simulated);

    let error = repo
        .submit_service_request(&json!({"table": 2}))
        .await
        .unwrap_err();
    assert!(error.is_kind(BuiltinKind::Unauthorized));

    let serialized = serde_json::to_value(&categories).unwrap();
    assert_eq!(serialized["source"], "local_backup");
    assert_eq!(serialized["notice"]["message"], "loaded from local backup");
}
