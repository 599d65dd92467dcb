//! Handle to one spawned emulator process.

use appsim_env::InstanceId;
use std::net::SocketAddr;
use tokio::process::Child;
use tracing::debug;

/// Lifecycle of a module instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    /// Spawned, readiness not yet observed
    Starting,

    /// Accepting calls
    Ready,

    /// Exited or timed out before readiness
    Failed,

    /// Terminated by the supervisor
    Stopped,
}

/// One emulator process owned by the supervisor.
#[derive(Debug)]
pub struct ModuleInstance {
    id: InstanceId,
    name: String,
    addr: Option<SocketAddr>,
    state: InstanceState,
    child: Option<Child>,
}

impl ModuleInstance {
    /// Wraps a freshly spawned child.
    pub fn starting(name: impl Into<String>, child: Child) -> Self {
        Self {
            id: InstanceId::new(),
            name: name.into(),
            addr: None,
            state: InstanceState::Starting,
            child: Some(child),
        }
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> InstanceState {
        self.state
    }

    /// Address, only once ready.
    pub fn addr(&self) -> Option<SocketAddr> {
        match self.state {
            InstanceState::Ready => self.addr,
            _ => None,
        }
    }

    /// OS process id, while the child is held.
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(Child::id)
    }

    pub fn mark_ready(&mut self, addr: SocketAddr) {
        self.addr = Some(addr);
        self.state = InstanceState::Ready;
    }

    pub fn mark_failed(&mut self) {
        self.state = InstanceState::Failed;
    }

    /// Kills the process if still running and reaps it.
    ///
    /// Calling this again after it succeeded does nothing.
    pub async fn terminate(&mut self) -> std::io::Result<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        if child.try_wait()?.is_none() {
            child.start_kill()?;
        }
        let status = child.wait().await?;
        debug!(module = %self.name, instance = %self.id, status = %status, "emulator exited");

        self.state = InstanceState::Stopped;
        Ok(())
    }
}
