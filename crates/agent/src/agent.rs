//! Wiring between configuration and the session manager.

use std::future::Future;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use tm_domain::config::Config;
use tm_sessions::{
    spawn_activity_worker, ActivityHandle, FileSessionStore, MemorySessionStore, SessionManager,
    SessionStore, SharedSessionMeta,
};

/// Queue depth for pending activity signals.  Anything beyond one pending
/// signal is coalesced anyway.
const ACTIVITY_QUEUE: usize = 16;

/// Pick the store backend the configuration asks for.
pub fn build_store(config: &Config) -> anyhow::Result<Arc<dyn SessionStore>> {
    if config.session_tracking.persistent {
        Ok(Arc::new(FileSessionStore::new(&config.storage.state_path)?))
    } else {
        Ok(Arc::new(MemorySessionStore::new()))
    }
}

/// Build a manager that publishes into `visible` and logs every change.
pub fn build_manager(
    config: &Config,
    store: Arc<dyn SessionStore>,
    visible: SharedSessionMeta,
) -> SessionManager {
    SessionManager::new(&config.session_tracking, store)
        .with_sink(Arc::new(visible))
        .on_session_change(|previous, next| {
            tracing::info!(
                previous = previous.map(|m| m.id.as_str()).unwrap_or("-"),
                next = %next.id,
                "session changed"
            );
            Ok(())
        })
}

/// Run until stdin closes or a shutdown signal arrives.  Each input line is
/// one activity signal.
pub async fn run(config: Arc<Config>) -> anyhow::Result<()> {
    if !config.session_tracking.enabled {
        tracing::info!("session tracking disabled; nothing to do");
        return Ok(());
    }

    let visible = SharedSessionMeta::new();
    let store = build_store(&config)?;
    let manager = Arc::new(build_manager(&config, store, visible.clone()));

    let meta = manager.initialize().await?;
    tracing::info!(session_id = %meta.id, "session ready");

    let (activity, worker) = spawn_activity_worker(manager, ACTIVITY_QUEUE);

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "cannot listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };
    let input = BufReader::new(tokio::io::stdin());
    let reason = forward_activity(input, &activity, shutdown).await?;
    tracing::info!(?reason, "shutting down");

    drop(activity);
    worker.await?;

    if let Some(id) = visible.session_id() {
        tracing::info!(session_id = %id, "agent stopped");
    }
    Ok(())
}

/// Why [`forward_activity`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    InputClosed,
    Interrupted,
    WorkerStopped,
}

/// Turn each line of `input` into an activity signal until the input ends,
/// `shutdown` resolves, or the worker behind `activity` is gone.
pub async fn forward_activity<R, S>(
    input: R,
    activity: &ActivityHandle,
    shutdown: S,
) -> std::io::Result<StopReason>
where
    R: AsyncBufRead + Unpin,
    S: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut lines = input.lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(_) => {
                    if !activity.signal() {
                        tracing::error!("activity worker stopped; input is no longer tracked");
                        return Ok(StopReason::WorkerStopped);
                    }
                }
                None => return Ok(StopReason::InputClosed),
            },
            _ = &mut shutdown => return Ok(StopReason::Interrupted),
        }
    }
}
