//! Shutdown coordination
//!
//! A [`Tomb`] tracks the life of one task: someone asks it to die through
//! [`Tomb::kill`], the task notices through [`Tomb::dying`], and it reports
//! that it has fully exited through [`Tomb::done`]. Anyone can then
//! [`Tomb::wait`] for that exit.
//!
//! Tombs are single-use. A new run always gets a new tomb so that a signal
//! left over from a previous run can never be observed.

use std::sync::{Arc, Mutex};
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// How a task's life ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exit {
    /// The task finished cleanly or was killed on request
    Clean,
    /// The task failed on its own
    Failed(String),
}

/// Two-phase cancellation signal for one task
#[derive(Debug, Clone, Default)]
pub struct Tomb {
    inner: Arc<TombInner>,
}

#[derive(Debug, Default)]
struct TombInner {
    dying: CancellationToken,
    dead: CancellationToken,
    reason: Mutex<Option<String>>,
    exit: Mutex<Option<Exit>>,
}

impl Tomb {
    /// Create a fresh tomb
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the task to die
    ///
    /// The first reason wins; later kills only re-signal.
    pub fn kill(&self, reason: impl Into<String>) {
        if let Ok(mut current) = self.inner.reason.lock() {
            if current.is_none() {
                *current = Some(reason.into());
            }
        }
        self.inner.dying.cancel();
    }

    /// Resolves once [`Tomb::kill`] has been called
    pub fn dying(&self) -> WaitForCancellationFuture<'_> {
        self.inner.dying.cancelled()
    }

    /// Whether [`Tomb::kill`] has been called
    pub fn is_dying(&self) -> bool {
        self.inner.dying.is_cancelled()
    }

    /// Reason passed to the first [`Tomb::kill`]
    pub fn reason(&self) -> Option<String> {
        self.inner.reason.lock().ok().and_then(|r| r.clone())
    }

    /// Flag the task as exited
    ///
    /// Only the first call records its exit.
    pub fn done(&self, exit: Exit) {
        if let Ok(mut current) = self.inner.exit.lock() {
            if current.is_none() {
                *current = Some(exit);
            }
        }
        self.inner.dead.cancel();
    }

    /// Whether [`Tomb::done`] has been called
    pub fn is_dead(&self) -> bool {
        self.inner.dead.is_cancelled()
    }

    /// Wait until the task has exited and return how it ended
    pub async fn wait(&self) -> Exit {
        self.inner.dead.cancelled().await;
        self.exit()
    }

    fn exit(&self) -> Exit {
        self.inner
            .exit
            .lock()
            .ok()
            .and_then(|e| e.clone())
            .unwrap_or(Exit::Clean)
    }
}
