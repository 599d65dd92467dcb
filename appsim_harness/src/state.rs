//! Test-scoped mutable state: current namespace and simulated user.

use appsim_env::SimulatedUser;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Namespace applied to calls issued through one context.
#[derive(Debug, Default)]
pub struct NamespaceState {
    current: Mutex<String>,
}

impl NamespaceState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current namespace; empty is the default scope.
    pub fn get(&self) -> String {
        locked(&self.current).clone()
    }

    /// Switches the namespace for subsequent calls.
    pub fn set(&self, namespace: impl Into<String>) {
        *locked(&self.current) = namespace.into();
    }
}

/// Simulated identity for one context.
///
/// Ids come from a counter so they never repeat within the context,
/// however quickly logins follow each other.
#[derive(Debug)]
pub struct AuthState {
    current: Mutex<Option<SimulatedUser>>,
    next_id: AtomicU64,
}

impl AuthState {
    pub fn new() -> Self {
        Self {
            current: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    /// Logs a user in, replacing any current user.
    ///
    /// Returns the user as stored, with its freshly minted id.
    pub fn login(&self, mut user: SimulatedUser) -> SimulatedUser {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        user.id = format!("{:021}", n);
        *locked(&self.current) = Some(user.clone());
        user
    }

    /// Clears the current user.
    pub fn logout(&self) {
        *locked(&self.current) = None;
    }

    /// Returns the current user, if any.
    pub fn current(&self) -> Option<SimulatedUser> {
        locked(&self.current).clone()
    }
}

impl Default for AuthState {
    fn default() -> Self {
        Self::new()
    }
}
