//! Persistence boundary for the current session record.
//!
//! The manager only ever reads the whole record and writes the whole record
//! back.  Two backends ship with the crate: [`MemorySessionStore`] for
//! sessions that should end with the process, and [`FileSessionStore`] for
//! sessions that survive restarts.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;

use tm_domain::error::{Error, Result};

use crate::record::SessionRecord;

const SESSION_FILE: &str = "session.json";

/// Read/write access to the durable session record.
///
/// Implementations may be backed by memory, disk, or a remote call.  Errors
/// are returned as-is; the manager does not retry.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// The stored record, or `None` when there is no session yet.
    async fn fetch_user_session(&self) -> Result<Option<SessionRecord>>;

    /// Replace the stored record.
    async fn store_user_session(&self, record: &SessionRecord) -> Result<()>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// In-memory store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Volatile store: the record lives as long as the process.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    record: RwLock<Option<SessionRecord>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with an existing record already in place.
    pub fn with_record(record: SessionRecord) -> Self {
        Self {
            record: RwLock::new(Some(record)),
        }
    }

    /// Current contents without going through the async interface.
    pub fn snapshot(&self) -> Option<SessionRecord> {
        self.record.read().clone()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn fetch_user_session(&self) -> Result<Option<SessionRecord>> {
        Ok(self.record.read().clone())
    }

    async fn store_user_session(&self, record: &SessionRecord) -> Result<()> {
        *self.record.write() = Some(record.clone());
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// File store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Durable store backed by `<state_path>/session/session.json`.
///
/// Writes go to a sibling temp file first and are renamed into place, so a
/// reader never observes a half-written record.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    /// Open (creating the directory if needed) the store under `state_path`.
    pub fn new(state_path: &Path) -> Result<Self> {
        let store = Self::at(state_path);
        if let Some(dir) = store.path.parent() {
            std::fs::create_dir_all(dir).map_err(Error::Io)?;
        }

        tracing::info!(
            path = %store.path.display(),
            exists = store.path.exists(),
            "session store opened"
        );

        Ok(store)
    }

    /// Point at the store under `state_path` without touching the
    /// filesystem.  Suitable for readers; writes fail until the directory
    /// exists.
    pub fn at(state_path: &Path) -> Self {
        Self {
            path: state_path.join("session").join(SESSION_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn fetch_user_session(&self) -> Result<Option<SessionRecord>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(Error::Store(format!(
                    "reading {}: {e}",
                    self.path.display()
                )))
            }
        };

        // A corrupt file would otherwise fail every activity signal forever.
        match serde_json::from_str(&raw) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "discarding unreadable session record"
                );
                Ok(None)
            }
        }
    }

    async fn store_user_session(&self, record: &SessionRecord) -> Result<()> {
        let json = serde_json::to_string_pretty(record)?;
        let tmp = self.path.with_extension("json.tmp");

        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| Error::Store(format!("writing {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| Error::Store(format!("replacing {}: {e}", self.path.display())))?;
        Ok(())
    }
}
