//! Namespaced key-value cache.
//!
//! Misses are reported as [`appsim_env::ServiceError::CacheMiss`], comparable by value:
//!
//! ```ignore
//! match memcache::get(&ctx, "foo").await {
//!     Err(err) if err == CallError::Service(ServiceError::CacheMiss) => {}
//!     other => panic!("{:?}", other),
//! }
//! ```

use super::invoke;
use appsim_env::{AppContext, CallError, Service};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;

/// A cached value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub key: String,
    pub value: Vec<u8>,

    /// Opaque to the cache
    #[serde(default)]
    pub flags: u32,
}

impl Item {
    pub fn new(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            flags: 0,
        }
    }

    pub fn with_flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }
}

/// Cache counters, across all namespaces.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    pub hits: u64,
    pub misses: u64,
    pub items: u64,
    pub bytes: u64,
}

/// Result payload of `get_multi`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Items {
    pub items: Vec<Item>,
}

/// Result payload of `increment`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Counter {
    pub value: u64,
}

/// Fetches one item; `CacheMiss` if absent.
pub async fn get<C: AppContext + ?Sized>(ctx: &C, key: &str) -> Result<Item, CallError> {
    invoke(ctx, Service::Memcache, "get", &json!({ "key": key })).await
}

/// Fetches several items; absent keys are simply missing from the map.
pub async fn get_multi<C: AppContext + ?Sized>(
    ctx: &C,
    keys: &[&str],
) -> Result<HashMap<String, Item>, CallError> {
    let found: Items = invoke(ctx, Service::Memcache, "get_multi", &json!({ "keys": keys })).await?;
    Ok(found
        .items
        .into_iter()
        .map(|item| (item.key.clone(), item))
        .collect())
}

/// Writes an item unconditionally.
pub async fn set<C: AppContext + ?Sized>(ctx: &C, item: &Item) -> Result<(), CallError> {
    invoke(ctx, Service::Memcache, "set", &json!({ "item": item })).await
}

/// Writes an item only if the key is absent; `NotStored` otherwise.
pub async fn add<C: AppContext + ?Sized>(ctx: &C, item: &Item) -> Result<(), CallError> {
    invoke(ctx, Service::Memcache, "add", &json!({ "item": item })).await
}

/// Removes an item; `CacheMiss` if absent.
pub async fn delete<C: AppContext + ?Sized>(ctx: &C, key: &str) -> Result<(), CallError> {
    invoke(ctx, Service::Memcache, "delete", &json!({ "key": key })).await
}

/// Adds `delta` to a decimal counter stored at `key`.
///
/// An absent key starts from `initial`, or is a `CacheMiss` when `initial`
/// is `None`. The counter saturates at zero.
pub async fn increment<C: AppContext + ?Sized>(
    ctx: &C,
    key: &str,
    delta: i64,
    initial: Option<u64>,
) -> Result<u64, CallError> {
    let counter: Counter = invoke(
        ctx,
        Service::Memcache,
        "increment",
        &json!({ "key": key, "delta": delta, "initial": initial }),
    )
    .await?;
    Ok(counter.value)
}

/// Drops every item in every namespace.
pub async fn flush<C: AppContext + ?Sized>(ctx: &C) -> Result<(), CallError> {
    invoke(ctx, Service::Memcache, "flush", &json!({})).await
}

/// Returns cache counters.
pub async fn stats<C: AppContext + ?Sized>(ctx: &C) -> Result<Statistics, CallError> {
    invoke(ctx, Service::Memcache, "stats", &json!({})).await
}
