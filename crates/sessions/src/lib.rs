//! Session lifecycle for the Tidemark telemetry agent.
//!
//! Every outgoing event is tagged with the current user session.  This crate
//! decides when that session is still usable, when it has to be rotated, how
//! a new session links back to its predecessor, and how each decision is
//! persisted and announced to the rest of the agent.

pub mod activity;
pub mod clock;
pub mod manager;
pub mod metadata;
pub mod notifier;
pub mod record;
pub mod sink;
pub mod store;

pub use activity::{spawn_activity_worker, ActivityHandle};
pub use clock::{Clock, ManualClock, SystemClock, Timestamp};
pub use manager::{SessionManager, UpdateOutcome};
pub use metadata::{chain, SessionMeta, PREVIOUS_SESSION_ATTRIBUTE};
pub use notifier::{CallbackError, ChangeNotifier, SessionChangeCallback};
pub use record::{
    RotationReason, SessionIdGenerator, SessionPolicy, SessionRecord, SessionValidity,
    UuidGenerator,
};
pub use sink::{SessionSink, SharedSessionMeta};
pub use store::{FileSessionStore, MemorySessionStore, SessionStore};
