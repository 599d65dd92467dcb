//! Platform service APIs.
//!
//! Each function is a thin mapping over [`AppContext::call`]: build the
//! payload, dispatch, decode the result. Routing, namespacing and identity
//! all come from the context passed in.

pub mod datastore;
pub mod memcache;
pub mod modules;
pub mod taskqueue;
pub mod user;

use appsim_env::{AppContext, CallError, Service};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Serializes `payload`, dispatches it and decodes the result.
pub(crate) async fn invoke<C, P, R>(
    ctx: &C,
    service: Service,
    method: &str,
    payload: &P,
) -> Result<R, CallError>
where
    C: AppContext + ?Sized,
    P: Serialize + ?Sized,
    R: DeserializeOwned,
{
    let payload = serde_json::to_value(payload).map_err(CallError::protocol)?;
    let value = ctx.call(service, method, payload).await?;
    serde_json::from_value(value).map_err(CallError::protocol)
}
