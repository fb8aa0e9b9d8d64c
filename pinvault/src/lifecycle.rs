//! One-time initialization shared by every public operation.
//!
//! State machine: `Uninitialized -> Initializing -> Ready | Failed`.
//! The state lives behind an async mutex that is held for the whole
//! initialization, so concurrent first callers queue up behind the one
//! doing the work and then observe its result. `Failed` is terminal.
//!
//! If the initializing future is dropped midway, the state is left at
//! `Initializing` with the lock released and the next caller starts over.
//!
//! Every transition is mirrored into an atomic so `status()` never has to
//! take the lock.

use crate::error::{Error, Result};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use tokio::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LifecycleStatus {
    Uninitialized = 0,
    Initializing = 1,
    Ready = 2,
    Failed = 3,
}

impl LifecycleStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Uninitialized,
            1 => Self::Initializing,
            2 => Self::Ready,
            _ => Self::Failed,
        }
    }
}

enum State<T> {
    Uninitialized,
    Initializing,
    Ready(Arc<T>),
    Failed(String),
}

impl<T> State<T> {
    fn status(&self) -> LifecycleStatus {
        match self {
            State::Uninitialized => LifecycleStatus::Uninitialized,
            State::Initializing => LifecycleStatus::Initializing,
            State::Ready(_) => LifecycleStatus::Ready,
            State::Failed(_) => LifecycleStatus::Failed,
        }
    }
}

pub struct Lifecycle<T> {
    state: Mutex<State<T>>,
    status: AtomicU8,
}

impl<T> Default for Lifecycle<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Lifecycle<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::Uninitialized),
            status: AtomicU8::new(LifecycleStatus::Uninitialized as u8),
        }
    }

    fn transition(&self, state: &mut MutexGuard<'_, State<T>>, next: State<T>) {
        self.status.store(next.status() as u8, Ordering::Release);
        **state = next;
    }

    /// Returns the initialized value, running `init` if nobody has yet.
    pub async fn ensure_initialized<F, Fut>(&self, init: F) -> Result<Arc<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let mut state = self.state.lock().await;
        match &*state {
            State::Ready(value) => return Ok(value.clone()),
            State::Failed(reason) => return Err(Error::Initialization(reason.clone())),
            State::Initializing => {
                tracing::warn!("lifecycle: previous initialization was abandoned, restarting");
            }
            State::Uninitialized => {}
        }

        self.transition(&mut state, State::Initializing);
        match init().await {
            Ok(value) => {
                let value = Arc::new(value);
                self.transition(&mut state, State::Ready(value.clone()));
                Ok(value)
            }
            Err(err) => {
                let reason = format!("{err:#}");
                tracing::error!("lifecycle: initialization failed: {reason}");
                self.transition(&mut state, State::Failed(reason.clone()));
                Err(Error::Initialization(reason))
            }
        }
    }

    /// Current state without waiting for the lock.
    pub fn status(&self) -> LifecycleStatus {
        LifecycleStatus::from_u8(self.status.load(Ordering::Acquire))
    }
}
