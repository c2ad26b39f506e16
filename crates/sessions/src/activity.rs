//! Activity signal delivery.
//!
//! Instrumentation calls [`ActivityHandle::signal`] on every click,
//! navigation, or visibility change.  One worker task owns the calls into
//! the manager and turns each burst of signals into a single update.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

use crate::manager::SessionManager;

/// Cheap, cloneable sender for activity signals.
#[derive(Debug, Clone)]
pub struct ActivityHandle {
    tx: mpsc::Sender<()>,
}

impl ActivityHandle {
    /// Report user activity.  Never blocks.
    ///
    /// Returns `false` only once the worker has stopped.  A full queue
    /// already guarantees an upcoming update, so the extra signal is dropped.
    pub fn signal(&self) -> bool {
        match self.tx.try_send(()) {
            Ok(()) => true,
            Err(TrySendError::Full(())) => {
                tracing::trace!("activity signal coalesced");
                true
            }
            Err(TrySendError::Closed(())) => false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Spawn the worker that runs `manager.update()` for incoming signals.
///
/// The worker exits once every [`ActivityHandle`] has been dropped.  Update
/// errors are logged and the loop carries on: the next signal retries.
pub fn spawn_activity_worker(
    manager: Arc<SessionManager>,
    capacity: usize,
) -> (ActivityHandle, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<()>(capacity.max(1));

    let handle = tokio::spawn(async move {
        while rx.recv().await.is_some() {
            let mut coalesced = 0usize;
            while rx.try_recv().is_ok() {
                coalesced += 1;
            }

            match manager.update().await {
                Ok(outcome) => tracing::trace!(
                    session_id = %outcome.session_id(),
                    rotated = outcome.is_rotation(),
                    coalesced,
                    "activity processed"
                ),
                Err(e) => tracing::warn!(
                    error = %e,
                    "session update failed; retrying on next activity"
                ),
            }
        }
        tracing::debug!("activity worker stopped");
    });

    (ActivityHandle { tx }, handle)
}
