//! Errors surfaced by the harness itself (construction and misuse).
//!
//! Errors from individual service calls are [`appsim_env::CallError`].

use appsim_env::CallError;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while building, querying or closing a context.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Modules were declared but no application id was given
    #[error("an application id is required when modules are declared ({0} declared)")]
    MissingAppId(usize),

    /// Two module declarations share a name
    #[error("module {0:?} declared more than once")]
    DuplicateModule(String),

    /// The emulator binary could not be started at all
    #[error("failed to spawn emulator for module {module:?}: {reason}")]
    SpawnFailed { module: String, reason: String },

    /// The emulator started but exited before reporting readiness
    #[error("module {module:?} failed to start: {reason}")]
    ModuleStartup { module: String, reason: String },

    /// Readiness was not observed before the startup deadline
    #[error("module {module:?} did not become ready within {}ms", .timeout.as_millis())]
    StartupTimeout { module: String, timeout: Duration },

    /// The module name is unknown or its instance never became ready
    #[error("unknown module: {0}")]
    UnknownModule(String),

    /// The context was used after close
    #[error("context is closed")]
    Closed,

    /// A service call failed
    #[error(transparent)]
    Call(#[from] CallError),
}

impl HarnessError {
    /// Creates a spawn failure.
    pub fn spawn_failed(module: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::SpawnFailed {
            module: module.into(),
            reason: reason.to_string(),
        }
    }

    /// Creates a startup failure.
    pub fn startup(module: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ModuleStartup {
            module: module.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if the startup deadline elapsed first.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::StartupTimeout { .. })
    }
}

/// Convenience alias for harness results.
pub type Result<T> = std::result::Result<T, HarnessError>;
