//! appsim Integration-Testing Harness
//!
//! This crate provides the "sandbox" - a platform context backed by
//! locally spawned emulator processes instead of a live backend.
//!
//! # Core Principle: One Dispatch Point
//!
//! Every service call goes through the context:
//! - **Routing**: calls reach the `default` module unless a module view is used
//! - **Namespacing**: the current namespace scopes every call
//! - **Identity**: the current simulated user travels with every call
//! - **Logging**: log calls are gated by a severity threshold
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                         Context                          │
//! │  ┌─────────────┐  ┌───────────┐  ┌───────────────────┐   │
//! │  │  LogSink    │  │ Namespace │  │ AuthState         │   │
//! │  └─────▲───────┘  └─────┬─────┘  └─────────┬─────────┘   │
//! │        │                └────────┬─────────┘             │
//! │        │                    ┌────▼─────┐                 │
//! │        │                    │RpcGateway│                 │
//! │        │                    └────┬─────┘                 │
//! │  ┌─────┴─────────────────────────▼──────────────────┐    │
//! │  │ ProcessSupervisor                                │    │
//! │  │   default ──► appsim-emulator   worker ──► ...   │    │
//! │  └──────────────────────────────────────────────────┘    │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use appsim_harness::{Context, Options, services::memcache};
//!
//! let ctx = Context::new(Options::new().with_task_queue("mail")).await?;
//! ctx.current_namespace("private")?;
//! memcache::set(&ctx, &memcache::Item::new("foo", "value")).await?;
//! ctx.close().await;
//! ```

mod context;
mod error;
mod gateway;
mod instance;
mod log_sink;
mod options;
mod state;
mod supervisor;
pub mod services;

pub use context::{Context, ModuleContext};
pub use error::{HarnessError, Result};
pub use gateway::{Route, RpcGateway};
pub use instance::{InstanceState, ModuleInstance};
pub use log_sink::LogSink;
pub use options::{
    ModuleConfig, Options, Reporter, DEFAULT_APP_ID, DEFAULT_EMULATOR,
    DEFAULT_STARTUP_TIMEOUT, EMULATOR_ENV, STARTUP_TIMEOUT_ENV,
};
pub use state::{AuthState, NamespaceState};
pub use supervisor::ProcessSupervisor;

pub use appsim_env::{AppContext, CallError, ServiceError, Severity, SimulatedUser};
