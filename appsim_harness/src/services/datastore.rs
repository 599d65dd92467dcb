//! Namespaced entity storage.
//!
//! Entities are any serde-serializable value stored under a [`Key`]. The
//! namespace is taken from the context at call time, so the same key
//! names different entities in different namespaces.

use super::invoke;
use appsim_env::{AppContext, CallError, Service};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Identifies an entity within a namespace.
///
/// A key with neither a name nor a non-zero id is incomplete: `put`
/// allocates an id for it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Key {
    pub kind: String,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub id: i64,
}

impl Key {
    /// A key with a string name.
    pub fn named(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: Some(name.into()),
            id: 0,
        }
    }

    /// A key with a numeric id.
    pub fn with_id(kind: impl Into<String>, id: i64) -> Self {
        Self {
            kind: kind.into(),
            name: None,
            id,
        }
    }

    /// A key whose id is allocated on `put`.
    pub fn incomplete(kind: impl Into<String>) -> Self {
        Self::with_id(kind, 0)
    }

    pub fn is_incomplete(&self) -> bool {
        self.name.is_none() && self.id == 0
    }
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{}:{:?}", self.kind, name),
            None => write!(f, "{}:{}", self.kind, self.id),
        }
    }
}

/// A stored entity as returned by queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub key: Key,
    pub properties: Value,
}

impl Entity {
    /// Decodes the properties into `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, CallError> {
        serde_json::from_value(self.properties.clone()).map_err(CallError::protocol)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Stored {
    pub key: Key,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Entities {
    pub entities: Vec<Entity>,
}

/// Stores `entity` under `key` and returns the complete key.
pub async fn put<C, T>(ctx: &C, key: &Key, entity: &T) -> Result<Key, CallError>
where
    C: AppContext + ?Sized,
    T: Serialize + ?Sized,
{
    let properties = serde_json::to_value(entity).map_err(CallError::protocol)?;
    let stored: Stored = invoke(
        ctx,
        Service::Datastore,
        "put",
        &json!({ "key": key, "properties": properties }),
    )
    .await?;
    Ok(stored.key)
}

/// Loads the entity stored under `key`; `NoSuchEntity` if absent.
pub async fn get<C, T>(ctx: &C, key: &Key) -> Result<T, CallError>
where
    C: AppContext + ?Sized,
    T: DeserializeOwned,
{
    let entity: Entity = invoke(ctx, Service::Datastore, "get", &json!({ "key": key })).await?;
    entity.decode()
}

/// Removes the entity under `key`; removing an absent entity is not an error.
pub async fn delete<C: AppContext + ?Sized>(ctx: &C, key: &Key) -> Result<(), CallError> {
    invoke(ctx, Service::Datastore, "delete", &json!({ "key": key })).await
}

/// Returns every entity of `kind` in the current namespace, ordered by key.
pub async fn query_kind<C: AppContext + ?Sized>(
    ctx: &C,
    kind: &str,
) -> Result<Vec<Entity>, CallError> {
    let found: Entities = invoke(ctx, Service::Datastore, "query", &json!({ "kind": kind })).await?;
    Ok(found.entities)
}
