//! Module addressing.

use super::invoke;
use crate::error::Result;
use crate::Context;
use appsim_env::{AppContext, CallError, Service, DEFAULT_MODULE};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;

/// What an emulator reports about itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleInfo {
    pub app_id: String,
    pub module: String,
    pub addr: SocketAddr,
}

/// Address of a ready module.
///
/// Unknown or not-yet-ready modules are an error, never a wait.
pub fn hostname(ctx: &Context, module: &str) -> Result<SocketAddr> {
    ctx.hostname(module)
}

/// Address of the `default` module.
pub fn default_hostname(ctx: &Context) -> Result<SocketAddr> {
    ctx.hostname(DEFAULT_MODULE)
}

/// Asks the module the context routes to who it is.
pub async fn ping<C: AppContext + ?Sized>(ctx: &C) -> std::result::Result<ModuleInfo, CallError> {
    invoke(ctx, Service::Module, "ping", &json!({})).await
}
