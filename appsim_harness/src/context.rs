//! Harness context implementing AppContext on top of spawned emulators.

use crate::error::{HarnessError, Result};
use crate::gateway::{Route, RpcGateway};
use crate::log_sink::LogSink;
use crate::options::Options;
use crate::state::{AuthState, NamespaceState};
use crate::supervisor::ProcessSupervisor;
use appsim_env::{AppContext, CallError, Service, Severity, SimulatedUser, DEFAULT_MODULE};
use async_trait::async_trait;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// A sandboxed platform context for one test.
///
/// This implements `AppContext` using:
/// - One or more emulator processes owned by a [`ProcessSupervisor`]
/// - An [`RpcGateway`] that routes every call to the right instance
/// - A [`LogSink`] gating log calls by severity
/// - Namespace and identity state local to this context
///
/// Calls go to the `default` module unless issued through
/// [`Context::module`]. After [`Context::close`] every operation fails with
/// a `Closed` error.
pub struct Context {
    /// Simulated application id
    app_id: String,

    /// Owns the emulator instances
    gateway: RpcGateway,

    /// Shared with the emulator output watchers
    sink: Arc<LogSink>,

    namespace: NamespaceState,

    auth: AuthState,

    closed: AtomicBool,
}

impl Context {
    /// Spawns the configured emulator instances and returns a ready context.
    ///
    /// Fails within the startup timeout per module; never hangs. On failure
    /// the reporter, if any, receives the diagnostic through `fatal`.
    pub async fn new(options: Options) -> Result<Self> {
        let sink = LogSink::shared(options.log_threshold, options.reporter.clone());

        let supervisor = match ProcessSupervisor::start(&options, Arc::clone(&sink)).await {
            Ok(supervisor) => supervisor,
            Err(err) => {
                if let Some(reporter) = &options.reporter {
                    reporter.fatal(&format!("appsim: context setup failed: {}", err));
                }
                return Err(err);
            }
        };

        Ok(Self {
            app_id: options.effective_app_id().to_string(),
            gateway: RpcGateway::new(supervisor),
            sink,
            namespace: NamespaceState::new(),
            auth: AuthState::new(),
            closed: AtomicBool::new(false),
        })
    }

    /// Terminates every emulator instance.
    ///
    /// Idempotent; a second call does nothing.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let stopped = self.gateway.shutdown().await;
        info!(app_id = %self.app_id, stopped, "context closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(HarnessError::Closed)
        } else {
            Ok(())
        }
    }

    /// Switches the namespace for subsequent calls.
    pub fn current_namespace(&self, namespace: impl Into<String>) -> Result<()> {
        self.ensure_open()?;
        self.namespace.set(namespace);
        Ok(())
    }

    /// Logs a simulated user in, replacing any current user.
    ///
    /// Returns the user with its freshly assigned id.
    pub fn login(&self, user: SimulatedUser) -> Result<SimulatedUser> {
        self.ensure_open()?;
        let user = self.auth.login(user);
        info!(email = %user.email, admin = user.admin, id = %user.id, "simulated login");
        Ok(user)
    }

    /// Logs a user in as an application admin.
    pub fn login_admin(&self, user: SimulatedUser) -> Result<SimulatedUser> {
        self.login(user.with_admin(true))
    }

    /// Clears the current user.
    pub fn logout(&self) -> Result<()> {
        self.ensure_open()?;
        self.auth.logout();
        Ok(())
    }

    /// Address of a ready module.
    pub fn hostname(&self, module: &str) -> Result<SocketAddr> {
        self.ensure_open()?;
        self.gateway.registry().hostname(module)
    }

    /// Names of the ready modules.
    pub fn module_names(&self) -> Result<Vec<String>> {
        self.ensure_open()?;
        Ok(self.gateway.registry().module_names())
    }

    /// A view of this context that routes calls to `module`.
    pub fn module(&self, module: &str) -> Result<ModuleContext<'_>> {
        self.hostname(module)?;
        Ok(ModuleContext {
            ctx: self,
            module: module.to_string(),
        })
    }

    /// The log sink, for threshold changes and suppression checks.
    pub fn log_sink(&self) -> &LogSink {
        &self.sink
    }

    /// Returns true if anything was emitted to the log.
    pub fn did_log_anything(&self) -> bool {
        self.sink.did_log_anything()
    }

    async fn dispatch(
        &self,
        module: &str,
        service: Service,
        method: &str,
        payload: Value,
    ) -> std::result::Result<Value, CallError> {
        if self.is_closed() {
            return Err(CallError::Closed);
        }
        let route = Route {
            module: module.to_string(),
            namespace: self.namespace.get(),
            user: self.auth.current(),
        };
        self.gateway.call(route, service, method, payload).await
    }

    fn log_line(&self, severity: Severity, message: &str) {
        if self.is_closed() {
            warn!(severity = %severity, "log call on a closed context dropped");
            return;
        }
        self.sink.log(severity, message);
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        if !self.is_closed() {
            // Children are killed on drop; this only flags the missing close.
            warn!(app_id = %self.app_id, "context dropped without close");
        }
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("app_id", &self.app_id)
            .field("namespace", &self.namespace.get())
            .field("user", &self.auth.current())
            .field("gateway", &self.gateway)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[async_trait]
impl AppContext for Context {
    fn app_id(&self) -> &str {
        &self.app_id
    }

    fn namespace(&self) -> String {
        self.namespace.get()
    }

    fn module_name(&self) -> &str {
        DEFAULT_MODULE
    }

    fn current_user(&self) -> Option<SimulatedUser> {
        self.auth.current()
    }

    fn log(&self, severity: Severity, message: &str) {
        self.log_line(severity, message);
    }

    fn deadline(&self) -> Option<Instant> {
        None
    }

    fn is_done(&self) -> bool {
        self.is_closed()
    }

    async fn call(
        &self,
        service: Service,
        method: &str,
        payload: Value,
    ) -> std::result::Result<Value, CallError> {
        self.dispatch(DEFAULT_MODULE, service, method, payload).await
    }
}

/// A context view whose calls are routed to one named module.
///
/// Shares namespace, identity and logging with the context it came from.
#[derive(Debug)]
pub struct ModuleContext<'a> {
    ctx: &'a Context,
    module: String,
}

impl<'a> ModuleContext<'a> {
    /// The context this view belongs to.
    pub fn parent(&self) -> &'a Context {
        self.ctx
    }
}

#[async_trait]
impl AppContext for ModuleContext<'_> {
    fn app_id(&self) -> &str {
        self.ctx.app_id()
    }

    fn namespace(&self) -> String {
        self.ctx.namespace.get()
    }

    fn module_name(&self) -> &str {
        &self.module
    }

    fn current_user(&self) -> Option<SimulatedUser> {
        self.ctx.auth.current()
    }

    fn log(&self, severity: Severity, message: &str) {
        self.ctx.log_line(severity, message);
    }

    fn deadline(&self) -> Option<Instant> {
        None
    }

    fn is_done(&self) -> bool {
        self.ctx.is_closed()
    }

    async fn call(
        &self,
        service: Service,
        method: &str,
        payload: Value,
    ) -> std::result::Result<Value, CallError> {
        self.ctx.dispatch(&self.module, service, method, payload).await
    }
}
