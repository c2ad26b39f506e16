//! Where the visible session goes once the manager has decided on it.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::metadata::SessionMeta;

/// Receives the session metadata that subsequent events must be tagged with.
pub trait SessionSink: Send + Sync {
    fn set_session(&self, meta: &SessionMeta);
}

/// Shared cell read by the rest of the agent when tagging outgoing events.
/// Cloning shares the same cell.
#[derive(Debug, Clone, Default)]
pub struct SharedSessionMeta {
    inner: Arc<RwLock<Option<SessionMeta>>>,
}

impl SharedSessionMeta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<SessionMeta> {
        self.inner.read().clone()
    }

    pub fn session_id(&self) -> Option<String> {
        self.inner.read().as_ref().map(|m| m.id.clone())
    }
}

impl SessionSink for SharedSessionMeta {
    fn set_session(&self, meta: &SessionMeta) {
        *self.inner.write() = Some(meta.clone());
    }
}
