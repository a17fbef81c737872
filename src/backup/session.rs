use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use super::error::BackupError;

/// Which data transfer, if any, currently owns a backup session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    BackingUp,
    Restoring,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::BackingUp => "backup",
            SessionState::Restoring => "restore",
        };
        f.write_str(name)
    }
}

/// At most one backup or restore at a time.
///
/// Shared by clones; the state returns to `Idle` when the [`SessionGuard`]
/// handed out by [`SessionLock::try_acquire`] is dropped.
#[derive(Debug, Clone, Default)]
pub struct SessionLock {
    state: Arc<Mutex<SessionState>>,
}

impl SessionLock {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn state(&self) -> SessionState {
        *self.lock()
    }

    pub fn try_acquire(&self, operation: SessionState) -> Result<SessionGuard, BackupError> {
        let mut state = self.lock();
        if *state != SessionState::Idle {
            return Err(BackupError::Busy(*state));
        }
        *state = operation;
        debug!("Backup session entered {} state", operation);
        Ok(SessionGuard {
            lock: self.clone(),
            operation,
        })
    }
}

#[derive(Debug)]
pub struct SessionGuard {
    lock: SessionLock,
    operation: SessionState,
}

impl SessionGuard {
    pub fn operation(&self) -> SessionState {
        self.operation
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        *self.lock.lock() = SessionState::Idle;
        debug!("Backup session left {} state", self.operation);
    }
}
