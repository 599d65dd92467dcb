//! Severity-gated log sink shared by a context and its emulator watchers.

use crate::options::Reporter;
use appsim_env::Severity;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Collects log output for one context.
///
/// Calls made through the context are emitted only when their severity
/// passes the threshold. Lines printed by emulator processes are forwarded
/// only when the threshold is [`Severity::Child`]. Anything emitted flips
/// [`did_log_anything`](LogSink::did_log_anything).
pub struct LogSink {
    /// Index into `Severity::all()`
    threshold: AtomicU8,

    /// Set once anything was emitted
    wrote: AtomicBool,

    /// Optional mirror for the surrounding test run
    reporter: Option<Arc<dyn Reporter>>,
}

impl LogSink {
    /// Creates a sink with the given threshold.
    pub fn new(threshold: Severity, reporter: Option<Arc<dyn Reporter>>) -> Self {
        Self {
            threshold: AtomicU8::new(threshold as u8),
            wrote: AtomicBool::new(false),
            reporter,
        }
    }

    /// Creates an Arc-wrapped sink for sharing with watcher tasks.
    pub fn shared(threshold: Severity, reporter: Option<Arc<dyn Reporter>>) -> Arc<Self> {
        Arc::new(Self::new(threshold, reporter))
    }

    /// Returns the current threshold.
    pub fn threshold(&self) -> Severity {
        let idx = self.threshold.load(Ordering::SeqCst) as usize;
        Severity::all()
            .get(idx)
            .copied()
            .unwrap_or(Severity::Off)
    }

    /// Replaces the threshold for subsequent calls.
    pub fn set_threshold(&self, threshold: Severity) {
        self.threshold.store(threshold as u8, Ordering::SeqCst);
    }

    /// Returns true if anything was emitted since creation or the last reset.
    pub fn did_log_anything(&self) -> bool {
        self.wrote.load(Ordering::SeqCst)
    }

    /// Clears the emitted flag.
    pub fn reset(&self) {
        self.wrote.store(false, Ordering::SeqCst);
    }

    /// Logs a message; returns whether it was emitted.
    pub fn log(&self, severity: Severity, message: &str) -> bool {
        if !self.threshold().admits(severity) {
            return false;
        }

        match severity {
            Severity::Critical | Severity::Error => {
                error!(target: "appsim::app", severity = %severity, "{}", message)
            }
            Severity::Warning => warn!(target: "appsim::app", "{}", message),
            Severity::Info => info!(target: "appsim::app", "{}", message),
            _ => debug!(target: "appsim::app", "{}", message),
        }
        self.emit(&format!("{}: {}", severity.name().to_uppercase(), message));
        true
    }

    /// Forwards one line printed by an emulator process.
    pub fn forward_child(&self, module: &str, line: &str) -> bool {
        if !self.threshold().forwards_child() {
            return false;
        }

        info!(target: "appsim::child", module = %module, "{}", line);
        self.emit(&format!("[{}] {}", module, line));
        true
    }

    fn emit(&self, line: &str) {
        self.wrote.store(true, Ordering::SeqCst);
        if let Some(reporter) = &self.reporter {
            reporter.log(line);
        }
    }
}

impl std::fmt::Debug for LogSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogSink")
            .field("threshold", &self.threshold())
            .field("wrote", &self.did_log_anything())
            .finish()
    }
}
