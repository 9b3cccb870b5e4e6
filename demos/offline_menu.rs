use async_trait::async_trait;
use menu_resilience::{
    LocalCatalog, MenuBackend, MenuRepository, MenuResult, RetryPolicy, StructuredError,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

const BUNDLED_MENU: &str = r#"{
    "categories": [
        {"id": "starters", "name": "Starters"},
        {"id": "drinks", "name": "Drinks"}
    ],
    "items": [
        {"name": "Bruschetta", "category_id": "starters", "price": 6.5},
        {"name": "Lemonade", "category_id": "drinks", "price": 3.0}
    ]
}"#;

/// Backend whose network drops after the first request.
struct FlakyBackend {
    requests: AtomicU32,
}

impl FlakyBackend {
    fn check(&self) -> MenuResult<()> {
        if self.requests.fetch_add(1, Ordering::SeqCst) == 0 {
            Ok(())
        } else {
            Err(StructuredError::network("TypeError: Failed to fetch"))
        }
    }
}

#[async_trait]
impl MenuBackend for FlakyBackend {
    async fn list_categories(&self) -> MenuResult<Vec<Value>> {
        self.check()?;
        Ok(vec![json!({"id": "mains", "name": "Mains (live)"})])
    }

    async fn list_items(&self, category: Option<&str>) -> MenuResult<Vec<Value>> {
        self.check()?;
        Ok(vec![json!({"name": "Risotto", "category_id": category})])
    }

    async fn submit_order(&self, key: Uuid, _order: &Value) -> MenuResult<Value> {
        self.check()?;
        Ok(json!({"order_id": key}))
    }

    async fn submit_service_request(&self, key: Uuid, _request: &Value) -> MenuResult<Value> {
        self.check()?;
        Ok(json!({"ticket": key}))
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> MenuResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .init();

    let catalog = LocalCatalog::from_json_str(BUNDLED_MENU)?;
    let backend = Arc::new(FlakyBackend {
        requests: AtomicU32::new(0),
    });
    let quick = RetryPolicy::reads().with_delay(Duration::from_millis(20));
    let repo = MenuRepository::new(backend, catalog).with_read_policy(quick);

    let categories = repo.categories().await?;
    println!("categories ({:?}): {}", categories.source, Value::from(categories.data));

    let drinks = repo.items(Some("drinks")).await?;
    println!("drinks ({:?}): {}", drinks.source, Value::from(drinks.data));
    if let Some(notice) = &drinks.notice {
        println!("  notice: {} after {} attempts", notice.message, notice.attempts());
    }

    let order = repo.submit_order(&json!({"table": 7, "items": ["Lemonade"]})).await?;
    println!(
        "order {} ({:?}, simulated: {})",
        order.data.id, order.source, order.data.simulated
    );

    Ok(())
}
