use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session tracking
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A session idles out after 15 minutes without activity.
pub const DEFAULT_INACTIVITY_TIMEOUT_MS: u64 = 15 * 60 * 1000;

/// A session is rotated after 4 hours regardless of activity.
pub const DEFAULT_ABSOLUTE_LIFETIME_MS: u64 = 4 * 60 * 60 * 1000;

/// Session lifecycle rules.  Resolved once when the session manager is
/// built; nothing inspects this struct on the hot path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionTrackingConfig {
    /// Master switch.  When `false` no session is attached to events.
    #[serde(default = "d_true")]
    pub enabled: bool,

    /// Keep the session record on disk so it survives restarts.  When
    /// `false` the record lives in memory only.
    #[serde(default = "d_true")]
    pub persistent: bool,

    /// Idle time after which the next activity starts a new session.
    #[serde(default = "d_inactivity")]
    pub inactivity_timeout_ms: u64,

    /// Maximum age of a session, however active it is.
    #[serde(default = "d_lifetime")]
    pub absolute_lifetime_ms: u64,

    /// Externally known session to start with (e.g. handed over by a
    /// backend).  A seed without an id is ignored.
    #[serde(default)]
    pub session: Option<SessionSeed>,
}

impl Default for SessionTrackingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            persistent: true,
            inactivity_timeout_ms: DEFAULT_INACTIVITY_TIMEOUT_MS,
            absolute_lifetime_ms: DEFAULT_ABSOLUTE_LIFETIME_MS,
            session: None,
        }
    }
}

/// Initial session supplied through configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionSeed {
    #[serde(default)]
    pub id: Option<String>,
    /// Attributes carried onto the seeded session's metadata.
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl SessionSeed {
    /// The seed id, if it is present and not blank.
    pub fn usable_id(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.trim().is_empty())
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_true() -> bool {
    true
}
fn d_inactivity() -> u64 {
    DEFAULT_INACTIVITY_TIMEOUT_MS
}
fn d_lifetime() -> u64 {
    DEFAULT_ABSOLUTE_LIFETIME_MS
}
