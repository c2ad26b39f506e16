use serde::Serialize;

/// Structured trace events emitted by the session lifecycle.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    /// A brand new session record was minted.
    SessionCreated {
        session_id: String,
        seeded: bool,
    },
    /// A still-valid persisted session was picked up at startup.
    SessionRestored {
        session_id: String,
        idle_ms: i64,
    },
    /// The current session was replaced by a new one.
    SessionRotated {
        previous_session_id: Option<String>,
        new_session_id: String,
        reason: String,
    },
    /// A fetch or store against the session store failed.
    SessionStoreFailed {
        operation: String,
        error: String,
    },
    /// The registered change callback returned an error or panicked.
    SessionChangeCallbackFailed {
        session_id: String,
        error: String,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "tm_event");
    }
}
