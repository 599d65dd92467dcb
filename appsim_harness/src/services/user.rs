//! Simulated user identity.
//!
//! Identity is held by the context itself; nothing here talks to an
//! emulator. Log users in and out with [`Context::login`](crate::Context::login)
//! and [`Context::logout`](crate::Context::logout).

use appsim_env::{AppContext, SimulatedUser};

/// The logged-in user, if any.
pub fn current<C: AppContext + ?Sized>(ctx: &C) -> Option<SimulatedUser> {
    ctx.current_user()
}

/// Returns true if a user is logged in and is an application admin.
pub fn is_admin<C: AppContext + ?Sized>(ctx: &C) -> bool {
    ctx.current_user().is_some_and(|u| u.admin)
}
