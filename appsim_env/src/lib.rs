//! appsim Environment Abstraction Layer
//!
//! This crate defines what code under test sees of the platform: the
//! [`AppContext`] capability trait, the identity and severity types, the
//! error sentinels and the wire protocol spoken with emulator processes.
//!
//! # Core Concept: One Context, Many Capabilities
//!
//! Every platform API (cache, task queue, datastore, modules) is a thin
//! request/response mapping over [`AppContext::call`]. The harness provides
//! the only real implementation; module-scoped views provide the same trait
//! with a different routing target.
//!
//! # Example
//!
//! ```ignore
//! use appsim_env::{AppContext, Service};
//! use serde_json::json;
//!
//! async fn warm_cache<Ctx: AppContext>(ctx: &Ctx) {
//!     ctx.info("warming cache");
//!     let _ = ctx
//!         .call(Service::Memcache, "set", json!({"key": "k", "value": [1]}))
//!         .await;
//! }
//! ```

mod context;
mod types;
mod error;
pub mod protocol;

pub use context::AppContext;
pub use protocol::{RpcRequest, RpcResponse, RpcOutcome, Service};
pub use types::{InstanceId, Severity, SimulatedUser, DEFAULT_AUTH_DOMAIN, DEFAULT_MODULE};
pub use error::{CallError, ServiceError};
