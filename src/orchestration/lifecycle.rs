//! Server lifecycle guard
//!
//! A relay server moves from `NotStarted` to `Running` at most once. The
//! transition is an atomic compare-and-set so two concurrent `start_server`
//! calls cannot both proceed.

use std::sync::atomic::{AtomicBool, Ordering};

use log::debug;

use crate::core::error::{RelayError, RelayResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    NotStarted,
    Running,
}

#[derive(Debug, Default)]
pub struct LifecycleGuard {
    running: AtomicBool,
}

impl LifecycleGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the `NotStarted -> Running` transition.
    ///
    /// Fails with `ServerAlreadyRunning` and leaves the state untouched if the
    /// transition was already taken.
    pub fn try_start(&self) -> RelayResult<()> {
        self.running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| debug!("Server state: not_started -> running"))
            .map_err(|_| RelayError::ServerAlreadyRunning)
    }

    /// Undo a claimed transition when startup fails before the listener is bound
    pub fn abort_start(&self) {
        self.running.store(false, Ordering::SeqCst);
        debug!("Server state: running -> not_started (startup aborted)");
    }

    pub fn state(&self) -> ServerState {
        if self.running.load(Ordering::SeqCst) {
            ServerState::Running
        } else {
            ServerState::NotStarted
        }
    }
}
