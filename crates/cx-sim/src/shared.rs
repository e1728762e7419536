//! State shared between a controller and its worker thread.

use std::sync::mpsc::Sender;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use cx_solver::SolverError;
use tracing::info;

use crate::status::{RunEvent, RunState, RunStatus};

#[derive(Debug, Default)]
pub(crate) struct Inner {
    pub run: RunState,
    pub error: Option<SolverError>,
    pub elapsed: Duration,
}

#[derive(Debug, Default)]
pub(crate) struct Shared {
    state: Mutex<Inner>,
    changed: Condvar,
    subscribers: Mutex<Vec<Sender<RunEvent>>>,
}

impl Shared {
    pub fn lock(&self) -> MutexGuard<'_, Inner> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe(&self, tx: Sender<RunEvent>) {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
    }

    /// Send to every live subscriber, dropping disconnected ones.
    ///
    /// Called with the state lock held so events keep status order.
    pub fn emit(&self, event: RunEvent) {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Switch status, notify waiters and subscribers.
    pub fn transition(&self, inner: &mut Inner, to: RunStatus) {
        let from = inner.run.status;
        if from == to {
            return;
        }
        inner.run.status = to;
        info!(%from, %to, "Run status changed");
        self.emit(RunEvent::StatusChanged { from, to });
        self.changed.notify_all();
    }

    /// Block until `done(status)` holds or `timeout` passes. Returns the
    /// status seen last and whether the wait timed out.
    pub fn wait_for(
        &self,
        done: impl Fn(RunStatus) -> bool,
        timeout: Duration,
    ) -> (RunStatus, bool) {
        let guard = self.lock();
        let (guard, result) = self
            .changed
            .wait_timeout_while(guard, timeout, |inner| !done(inner.run.status))
            .unwrap_or_else(PoisonError::into_inner);
        (guard.run.status, result.timed_out())
    }
}
