//! Process supervisor - spawns, awaits and terminates emulator instances.
//!
//! # Startup race
//!
//! ```text
//! start()                      watcher task                 emulator
//!   |-- spawn ------------------------------------------------>|
//!   |-- spawn watcher -------->|                               |
//!   |                          |<------ stdout lines ----------|
//!   |                          |   (forwarded to the LogSink)  |
//!   |<-- ready(addr) / exited -|<------ "READY ip:port" / EOF -|
//!   |                                                          |
//!   `-- or the startup deadline elapses first => StartupTimeout
//! ```
//!
//! Whatever happens, every process spawned so far is terminated before an
//! error is returned.

use crate::error::{HarnessError, Result};
use crate::instance::{InstanceState, ModuleInstance};
use crate::log_sink::LogSink;
use crate::options::{ModuleConfig, Options};
use appsim_env::protocol::parse_ready_line;
use std::collections::{HashSet, VecDeque};
use std::net::SocketAddr;
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Output lines kept to explain a failed start.
const TAIL_LINES: usize = 8;

type Readiness = std::result::Result<SocketAddr, String>;

/// Owns every emulator process of one context.
pub struct ProcessSupervisor {
    instances: Mutex<Vec<ModuleInstance>>,
    sink: Arc<LogSink>,
    stopped: AtomicBool,
}

impl ProcessSupervisor {
    /// Creates an empty supervisor.
    pub fn new(sink: Arc<LogSink>) -> Self {
        Self {
            instances: Mutex::new(Vec::new()),
            sink,
            stopped: AtomicBool::new(false),
        }
    }

    /// Validates `options`, then spawns and awaits every instance.
    ///
    /// # Returns
    /// * `Ok(supervisor)` - every instance is ready
    /// * `Err(MissingAppId | DuplicateModule)` - nothing was spawned
    /// * `Err(SpawnFailed | ModuleStartup | StartupTimeout)` - everything
    ///   spawned so far was terminated
    pub async fn start(options: &Options, sink: Arc<LogSink>) -> Result<Self> {
        validate(options)?;

        let supervisor = Self::new(sink);
        for (name, config) in options.instance_plan() {
            if let Err(err) = supervisor
                .spawn_instance(options, &name, config.as_deref())
                .await
            {
                warn!(module = %name, error = %err, "module startup failed, tearing down");
                supervisor.stop().await;
                return Err(err);
            }
        }

        info!(
            modules = supervisor.len(),
            app_id = %options.effective_app_id(),
            "emulator instances ready"
        );
        Ok(supervisor)
    }

    async fn spawn_instance(
        &self,
        options: &Options,
        name: &str,
        config: Option<&Path>,
    ) -> Result<()> {
        let mut cmd = Command::new(&options.emulator_path);
        cmd.arg("--app-id")
            .arg(options.effective_app_id())
            .arg("--module")
            .arg(name)
            .arg("--host")
            .arg(&options.host)
            .arg("--port")
            .arg("0");
        if let Some(path) = config {
            cmd.arg("--config").arg(path);
        }
        for queue in &options.task_queues {
            cmd.arg("--queue").arg(queue);
        }
        if options.log_threshold.forwards_child() {
            cmd.arg("--verbose");
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|err| {
            let binary = options.emulator_path.display();
            HarnessError::spawn_failed(name, format!("{}: {}", binary, err))
        })?;
        debug!(module = %name, pid = ?child.id(), "spawned emulator");

        let (ready_tx, ready_rx) = oneshot::channel();
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(watch_stdout(name.to_string(), stdout, Arc::clone(&self.sink), ready_tx));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(name.to_string(), stderr, Arc::clone(&self.sink)));
        }

        // Registered before waiting so a failed start still gets terminated.
        self.lock().push(ModuleInstance::starting(name, child));

        let outcome = wait_ready(name, ready_rx, options.startup_timeout).await;
        let mut instances = self.lock();
        let instance = instances
            .iter_mut()
            .rev()
            .find(|i| i.name() == name)
            .ok_or_else(|| HarnessError::UnknownModule(name.to_string()))?;
        match outcome {
            Ok(addr) => {
                instance.mark_ready(addr);
                info!(module = %name, instance = %instance.id(), addr = %addr, "module ready");
                Ok(())
            }
            Err(err) => {
                instance.mark_failed();
                Err(err)
            }
        }
    }

    /// Address of a ready module.
    ///
    /// Unknown or not-yet-ready modules are an error, never a wait.
    pub fn hostname(&self, module: &str) -> Result<SocketAddr> {
        self.lock()
            .iter()
            .find(|i| i.name() == module)
            .and_then(ModuleInstance::addr)
            .ok_or_else(|| HarnessError::UnknownModule(module.to_string()))
    }

    /// Names of ready modules, in start order.
    pub fn module_names(&self) -> Vec<String> {
        self.lock()
            .iter()
            .filter(|i| i.state() == InstanceState::Ready)
            .map(|i| i.name().to_string())
            .collect()
    }

    /// Number of instances currently held.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Terminates every instance, including ones that never became ready.
    ///
    /// A failure to terminate one instance is logged and does not stop the
    /// others. Calling this again is a no-op. Returns how many instances
    /// were terminated cleanly.
    pub async fn stop(&self) -> usize {
        self.stopped.store(true, Ordering::SeqCst);
        let drained = std::mem::take(&mut *self.lock());
        if drained.is_empty() {
            return 0;
        }

        let total = drained.len();
        let mut stopped = 0;
        for mut instance in drained {
            match instance.terminate().await {
                Ok(()) => stopped += 1,
                Err(err) => {
                    warn!(
                        module = %instance.name(),
                        instance = %instance.id(),
                        error = %err,
                        "failed to terminate emulator"
                    )
                }
            }
        }
        info!(stopped, total, "emulator instances stopped");
        stopped
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ModuleInstance>> {
        self.instances.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ProcessSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessSupervisor")
            .field("modules", &self.module_names())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// Checks everything that can be rejected without spawning.
fn validate(options: &Options) -> Result<()> {
    let has_app_id = options.app_id.as_deref().is_some_and(|id| !id.is_empty());
    if !options.modules.is_empty() && !has_app_id {
        return Err(HarnessError::MissingAppId(options.modules.len()));
    }

    let mut seen = HashSet::new();
    for ModuleConfig { name, .. } in &options.modules {
        if !seen.insert(name.as_str()) {
            return Err(HarnessError::DuplicateModule(name.clone()));
        }
    }
    Ok(())
}

/// Races the watcher's readiness report against the startup deadline.
async fn wait_ready(
    module: &str,
    ready_rx: oneshot::Receiver<Readiness>,
    timeout: Duration,
) -> Result<SocketAddr> {
    match tokio::time::timeout(timeout, ready_rx).await {
        Ok(Ok(Ok(addr))) => Ok(addr),
        Ok(Ok(Err(reason))) => Err(HarnessError::startup(module, reason)),
        Ok(Err(_)) => Err(HarnessError::startup(module, "emulator output closed unexpectedly")),
        Err(_) => Err(HarnessError::StartupTimeout {
            module: module.to_string(),
            timeout,
        }),
    }
}

/// Reads the emulator's stdout until it announces readiness or exits.
///
/// Lines other than the readiness line go to the sink, in order, so
/// anything printed before readiness is forwarded before `start` returns.
async fn watch_stdout<R>(
    module: String,
    reader: R,
    sink: Arc<LogSink>,
    ready_tx: oneshot::Sender<Readiness>,
) where
    R: AsyncRead + Unpin,
{
    let mut ready_tx = Some(ready_tx);
    let mut tail: VecDeque<String> = VecDeque::with_capacity(TAIL_LINES);
    let mut lines = BufReader::new(reader).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if ready_tx.is_some() {
                    if let Some(addr) = parse_ready_line(&line) {
                        if let Some(tx) = ready_tx.take() {
                            let _ = tx.send(Ok(addr));
                        }
                        continue;
                    }
                    if tail.len() == TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line.clone());
                }
                sink.forward_child(&module, &line);
            }
            Ok(None) => break,
            Err(err) => {
                warn!(module = %module, error = %err, "failed to read emulator stdout");
                break;
            }
        }
    }

    if let Some(tx) = ready_tx.take() {
        let reason = if tail.is_empty() {
            "emulator exited before becoming ready".to_string()
        } else {
            format!(
                "emulator exited before becoming ready: {}",
                tail.into_iter().collect::<Vec<_>>().join(" | ")
            )
        };
        let _ = tx.send(Err(reason));
    }
}

async fn forward_lines<R>(module: String, reader: R, sink: Arc<LogSink>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        sink.forward_child(&module, &line);
    }
}
