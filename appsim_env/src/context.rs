//! Core platform context trait for code under test.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Instant;

use crate::error::CallError;
use crate::protocol::Service;
use crate::types::{Severity, SimulatedUser};

/// The capability set a platform request context offers.
///
/// Service helpers (`memcache::get`, `taskqueue::add`, ...) are written
/// against this trait only, so they behave the same whether the context is
/// the harness itself or a module-scoped view of it.
///
/// # Implementations
///
/// - **Harness**: `appsim_harness::Context` - routes to the `default` module
/// - **Module view**: `appsim_harness::ModuleContext` - routes to a named module
#[async_trait]
pub trait AppContext: Send + Sync {
    /// Identifier of the simulated application.
    fn app_id(&self) -> &str;

    /// Namespace applied to calls issued now.
    fn namespace(&self) -> String;

    /// Module calls issued through this context are routed to.
    fn module_name(&self) -> &str;

    /// Currently logged-in user, if any.
    fn current_user(&self) -> Option<SimulatedUser>;

    /// Logs a message at the given severity.
    ///
    /// Whether it is emitted depends on the context's threshold.
    fn log(&self, severity: Severity, message: &str);

    /// Point in time after which work on behalf of this context should stop.
    ///
    /// `None` means no deadline.
    fn deadline(&self) -> Option<Instant>;

    /// Returns true once the context can no longer serve calls.
    fn is_done(&self) -> bool;

    /// Dispatches one opaque call and returns the raw result payload.
    ///
    /// # Returns
    /// * `Ok(value)` - the service's result payload
    /// * `Err(CallError::Service(_))` - sentinel or opaque service failure
    /// * `Err(CallError::Closed)` - the context was closed
    async fn call(&self, service: Service, method: &str, payload: Value)
        -> Result<Value, CallError>;

    fn critical(&self, message: &str) {
        self.log(Severity::Critical, message);
    }

    fn error(&self, message: &str) {
        self.log(Severity::Error, message);
    }

    fn warning(&self, message: &str) {
        self.log(Severity::Warning, message);
    }

    fn info(&self, message: &str) {
        self.log(Severity::Info, message);
    }

    fn debug(&self, message: &str) {
        self.log(Severity::Debug, message);
    }
}
