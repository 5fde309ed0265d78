//! Response caching for the public catalog reads (`moka`).

use std::future::Future;
use std::time::Duration;

use moka::future::Cache;
use serde_json::Value;
use tracing::debug;

use super::error::ApiResult;

pub const PRODUCTS_TTL: Duration = Duration::from_secs(180);
pub const BESTSELLERS_TTL: Duration = Duration::from_secs(300);

#[derive(Clone)]
pub struct ResponseCache {
    products: Cache<String, Value>,
    bestsellers: Cache<String, Value>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self {
            products: Cache::builder().max_capacity(1000).time_to_live(PRODUCTS_TTL).build(),
            bestsellers: Cache::builder().max_capacity(100).time_to_live(BESTSELLERS_TTL).build(),
        }
    }

    pub async fn products<F, Fut>(&self, key: String, load: F) -> ApiResult<Value>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ApiResult<Value>>,
    {
        cached(&self.products, key, load).await
    }

    pub async fn bestsellers<F, Fut>(&self, key: String, load: F) -> ApiResult<Value>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ApiResult<Value>>,
    {
        cached(&self.bestsellers, key, load).await
    }
}

impl Default for ResponseCache {
    fn default() -> Self { Self::new() }
}

/// Errors are returned to the caller and never cached.
async fn cached<F, Fut>(cache: &Cache<String, Value>, key: String, load: F) -> ApiResult<Value>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = ApiResult<Value>>,
{
    if let Some(hit) = cache.get(&key).await {
        debug!(key = %key, "Cache hit");
        return Ok(hit);
    }
    let value = load().await?;
    cache.insert(key, value.clone()).await;
    Ok(value)
}

pub fn cache_control(ttl: Duration) -> String { format!("public, max-age={}", ttl.as_secs()) }
