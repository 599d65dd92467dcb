//! Construction-time configuration for a harness context.

use appsim_env::{Severity, DEFAULT_MODULE};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Application id handed to the emulator when none is configured.
pub const DEFAULT_APP_ID: &str = "testapp";

/// Fail-fast bound for one module start.
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Emulator binary looked up on `PATH` when nothing else is configured.
pub const DEFAULT_EMULATOR: &str = "appsim-emulator";

/// Overrides [`Options::emulator_path`].
pub const EMULATOR_ENV: &str = "APPSIM_EMULATOR";

/// Overrides [`Options::startup_timeout`], in milliseconds.
pub const STARTUP_TIMEOUT_ENV: &str = "APPSIM_STARTUP_TIMEOUT_MS";

/// Receives diagnostics on behalf of the surrounding test run.
///
/// `fatal` is called when construction fails. Whether that aborts the test
/// is the reporter's decision; the harness itself only returns an error.
pub trait Reporter: Send + Sync {
    /// Records an emitted log line.
    fn log(&self, line: &str);

    /// Records a fatal setup diagnostic.
    fn fatal(&self, message: &str);
}

/// A module instance to spawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleConfig {
    /// Module name, unique within one context
    pub name: String,

    /// Module-specific configuration file read by the emulator
    pub path: PathBuf,
}

impl ModuleConfig {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }

    /// Returns true if this declares the default module.
    pub fn is_default(&self) -> bool {
        self.name == DEFAULT_MODULE
    }
}

/// Configuration for a harness context.
#[derive(Clone)]
pub struct Options {
    /// Simulated application id; required when modules are declared
    pub app_id: Option<String>,

    /// Receives fatal setup diagnostics and emitted log lines
    pub reporter: Option<Arc<dyn Reporter>>,

    /// Severity threshold for log calls
    pub log_threshold: Severity,

    /// Task queues to provision in every instance
    pub task_queues: Vec<String>,

    /// Declared module instances
    pub modules: Vec<ModuleConfig>,

    /// Fail-fast bound for one module start
    pub startup_timeout: Duration,

    /// Emulator binary
    pub emulator_path: PathBuf,

    /// Host the emulator binds to
    pub host: String,
}

impl Default for Options {
    fn default() -> Self {
        let emulator_path = std::env::var_os(EMULATOR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_EMULATOR));
        let startup_timeout = std::env::var(STARTUP_TIMEOUT_ENV)
            .ok()
            .and_then(|ms| ms.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_STARTUP_TIMEOUT);

        Self {
            app_id: None,
            reporter: None,
            log_threshold: Severity::default(),
            task_queues: Vec::new(),
            modules: Vec::new(),
            startup_timeout,
            emulator_path,
            host: "127.0.0.1".to_string(),
        }
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("app_id", &self.app_id)
            .field("reporter", &self.reporter.is_some())
            .field("log_threshold", &self.log_threshold)
            .field("task_queues", &self.task_queues)
            .field("modules", &self.modules)
            .field("startup_timeout", &self.startup_timeout)
            .field("emulator_path", &self.emulator_path)
            .field("host", &self.host)
            .finish()
    }
}

impl Options {
    /// Creates default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the application id.
    pub fn with_app_id(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = Some(app_id.into());
        self
    }

    /// Sets the reporter.
    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Sets the log threshold.
    pub fn with_log_threshold(mut self, threshold: Severity) -> Self {
        self.log_threshold = threshold;
        self
    }

    /// Adds a task queue to provision.
    pub fn with_task_queue(mut self, name: impl Into<String>) -> Self {
        self.task_queues.push(name.into());
        self
    }

    /// Declares a module instance.
    pub fn with_module(mut self, module: ModuleConfig) -> Self {
        self.modules.push(module);
        self
    }

    /// Sets the fail-fast bound.
    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    /// Sets the emulator binary.
    pub fn with_emulator_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.emulator_path = path.into();
        self
    }

    /// Sets the host the emulator binds to.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Application id passed to the emulator.
    pub fn effective_app_id(&self) -> &str {
        self.app_id.as_deref().unwrap_or(DEFAULT_APP_ID)
    }

    /// Instances to spawn, default first.
    ///
    /// When no declared module is named `default`, an implicit one without
    /// a config file is prepended.
    pub fn instance_plan(&self) -> Vec<(String, Option<PathBuf>)> {
        let mut plan: Vec<(String, Option<PathBuf>)> = Vec::new();
        if !self.modules.iter().any(ModuleConfig::is_default) {
            plan.push((DEFAULT_MODULE.to_string(), None));
        }
        let (defaults, others): (Vec<_>, Vec<_>) =
            self.modules.iter().partition(|m| m.is_default());
        for module in defaults.into_iter().chain(others) {
            plan.push((module.name.clone(), Some(module.path.clone())));
        }
        plan
    }
}
