//! The session manager: reads the current record, extends or rotates it,
//! persists the result, and announces identity changes.
//!
//! Every cycle runs under one async lock, so at most one update is in flight
//! per manager.  Overlapping triggers queue behind it and then see the record
//! the previous cycle wrote; two triggers can never both rotate away from the
//! same expired record.

use std::sync::Arc;

use tokio::sync::Mutex;

use tm_domain::config::SessionTrackingConfig;
use tm_domain::error::Result;
use tm_domain::trace::TraceEvent;

use crate::clock::{Clock, SystemClock, Timestamp};
use crate::metadata::{chain, SessionMeta};
use crate::notifier::{CallbackError, ChangeNotifier};
use crate::record::{
    RotationReason, SessionIdGenerator, SessionPolicy, SessionRecord, SessionValidity,
    UuidGenerator,
};
use crate::sink::{SessionSink, SharedSessionMeta};
use crate::store::SessionStore;

/// What an update cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The current session was still valid; only its last activity moved.
    Extended { session_id: String },
    /// A new session replaced the old one.
    Rotated {
        previous: Option<SessionMeta>,
        next: SessionMeta,
        reason: RotationReason,
    },
}

impl UpdateOutcome {
    pub fn session_id(&self) -> &str {
        match self {
            Self::Extended { session_id } => session_id,
            Self::Rotated { next, .. } => &next.id,
        }
    }

    pub fn is_rotation(&self) -> bool {
        matches!(self, Self::Rotated { .. })
    }
}

/// Owns the visible session and is the only writer of the session record.
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    validity: Arc<dyn SessionValidity>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn SessionIdGenerator>,
    sink: Arc<dyn SessionSink>,
    notifier: ChangeNotifier,
    /// Metadata consumed by `initialize` when a new session is minted.
    seed: Option<SessionMeta>,
    /// Visible metadata.  Held for the whole cycle.
    current: Mutex<Option<SessionMeta>>,
}

impl SessionManager {
    /// Build a manager with the policy and seed from `config`, wall-clock
    /// time, UUID ids, and a private [`SharedSessionMeta`] sink.
    pub fn new(config: &SessionTrackingConfig, store: Arc<dyn SessionStore>) -> Self {
        let seed = config.session.as_ref().and_then(|seed| {
            let meta = SessionMeta::from_seed(seed);
            if meta.is_none() {
                tracing::warn!("configured seed session has no id; starting without it");
            }
            meta
        });

        Self {
            store,
            validity: Arc::new(SessionPolicy::from_config(config)),
            clock: Arc::new(SystemClock),
            ids: Arc::new(UuidGenerator),
            sink: Arc::new(SharedSessionMeta::new()),
            notifier: ChangeNotifier::new(),
            seed,
            current: Mutex::new(None),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_validity(mut self, validity: Arc<dyn SessionValidity>) -> Self {
        self.validity = validity;
        self
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn SessionIdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn SessionSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Replace the configured seed.
    pub fn with_seed(mut self, seed: Option<SessionMeta>) -> Self {
        self.seed = seed;
        self
    }

    /// Treat `meta` as the session currently attached to events, as if an
    /// earlier cycle had set it.
    pub fn with_current(self, meta: SessionMeta) -> Self {
        Self {
            current: Mutex::new(Some(meta)),
            ..self
        }
    }

    /// Register the callback run on every rotation.
    pub fn on_session_change<F>(mut self, callback: F) -> Self
    where
        F: Fn(Option<&SessionMeta>, &SessionMeta) -> std::result::Result<(), CallbackError>
            + Send
            + Sync
            + 'static,
    {
        self.notifier = ChangeNotifier::with_callback(callback);
        self
    }

    /// Snapshot of the visible session metadata.
    pub async fn current(&self) -> Option<SessionMeta> {
        self.current.lock().await.clone()
    }

    /// Startup: adopt a still-valid stored session, or mint a new one
    /// (using the seed id when configured).  Returns the visible metadata.
    pub async fn initialize(&self) -> Result<SessionMeta> {
        let mut current = self.current.lock().await;
        let stored = self.fetch().await?;
        let now = self.clock.now();
        let verdict = self.validity.evaluate(stored.as_ref(), now);

        match (stored, verdict) {
            (Some(record), None) => {
                let meta = record.meta_or_id();
                let refreshed = record.touched(now).with_meta(meta.clone());
                self.persist(&refreshed).await?;

                self.sink.set_session(&meta);
                *current = Some(meta.clone());

                TraceEvent::SessionRestored {
                    session_id: meta.id.clone(),
                    idle_ms: record.idle_ms(now),
                }
                .emit();
                Ok(meta)
            }
            (previous, verdict) => {
                let reason = verdict.unwrap_or(RotationReason::Missing);
                let seed = self.seed.as_ref().filter(|seed| {
                    let reused = previous.as_ref().is_some_and(|p| p.session_id == seed.id);
                    if reused {
                        tracing::warn!(
                            session_id = %seed.id,
                            "seed id belongs to the expired session; generating a new id"
                        );
                    }
                    !reused
                });
                let (_, next) = self
                    .rotate(&mut current, previous, reason, now, seed)
                    .await?;
                Ok(next)
            }
        }
    }

    /// One activity signal: extend the current session or rotate it.
    ///
    /// Store failures are returned unchanged and leave the visible session
    /// untouched.  Nothing is retried; the next signal tries again.
    pub async fn update(&self) -> Result<UpdateOutcome> {
        let mut current = self.current.lock().await;
        let stored = self.fetch().await?;
        let now = self.clock.now();
        let verdict = self.validity.evaluate(stored.as_ref(), now);

        match (stored, verdict) {
            (Some(record), None) => {
                let refreshed = record.touched(now);
                self.persist(&refreshed).await?;
                tracing::debug!(
                    session_id = %refreshed.session_id,
                    idle_ms = record.idle_ms(now),
                    "session extended"
                );

                // Another writer of the same store rotated the session.
                if let Some(stale) = current.as_ref().filter(|m| m.id != refreshed.session_id) {
                    let adopted = refreshed.meta_or_id();
                    tracing::info!(
                        stale_session_id = %stale.id,
                        session_id = %adopted.id,
                        "adopting session rotated by another writer"
                    );
                    self.sink.set_session(&adopted);
                    *current = Some(adopted);
                }
                Ok(UpdateOutcome::Extended {
                    session_id: refreshed.session_id,
                })
            }
            (previous, verdict) => {
                let reason = verdict.unwrap_or(RotationReason::Missing);
                let (previous, next) = self
                    .rotate(&mut current, previous, reason, now, None)
                    .await?;
                Ok(UpdateOutcome::Rotated {
                    previous,
                    next,
                    reason,
                })
            }
        }
    }

    /// Replace `previous` with a new session: chain, persist, set, notify.
    /// Returns the `(previous, next)` metadata pair handed to the notifier.
    async fn rotate(
        &self,
        current: &mut Option<SessionMeta>,
        previous: Option<SessionRecord>,
        reason: RotationReason,
        now: Timestamp,
        seed: Option<&SessionMeta>,
    ) -> Result<(Option<SessionMeta>, SessionMeta)> {
        let record = SessionRecord::create(seed.map(|s| s.id.as_str()), now, self.ids.as_ref());

        let previous_meta = match (current.as_ref(), previous.as_ref()) {
            (Some(visible), Some(record)) if visible.id == record.session_id => {
                Some(visible.clone())
            }
            (_, Some(record)) => Some(record.meta_or_id()),
            (visible, None) => visible.cloned(),
        };

        let next_meta = match (&previous, seed) {
            (None, Some(seed)) => SessionMeta {
                id: record.session_id.clone(),
                attributes: seed.attributes.clone(),
            },
            (previous, seed) => chain(&record, previous.as_ref(), seed.or(previous_meta.as_ref())),
        };

        let record = record.with_meta(next_meta.clone());
        self.persist(&record).await?;

        TraceEvent::SessionCreated {
            session_id: record.session_id.clone(),
            seeded: seed.is_some(),
        }
        .emit();
        TraceEvent::SessionRotated {
            previous_session_id: previous.as_ref().map(|p| p.session_id.clone()),
            new_session_id: record.session_id.clone(),
            reason: reason.to_string(),
        }
        .emit();

        self.sink.set_session(&next_meta);
        *current = Some(next_meta.clone());
        self.notifier.notify(previous_meta.as_ref(), &next_meta);

        Ok((previous_meta, next_meta))
    }

    async fn fetch(&self) -> Result<Option<SessionRecord>> {
        self.store.fetch_user_session().await.map_err(|e| {
            store_failed("fetch", &e);
            e
        })
    }

    async fn persist(&self, record: &SessionRecord) -> Result<()> {
        self.store.store_user_session(record).await.map_err(|e| {
            store_failed("store", &e);
            e
        })
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("notifier", &self.notifier)
            .field("seed", &self.seed)
            .finish_non_exhaustive()
    }
}

fn store_failed(operation: &str, error: &tm_domain::error::Error) {
    tracing::warn!(operation, error = %error, "session store call failed");
    TraceEvent::SessionStoreFailed {
        operation: operation.to_owned(),
        error: error.to_string(),
    }
    .emit();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemorySessionStore;

    struct Sequence(parking_lot::Mutex<u32>);

    impl SessionIdGenerator for Sequence {
        fn generate(&self) -> String {
            let mut n = self.0.lock();
            *n += 1;
            format!("s{n}")
        }
    }

    fn manager(store: Arc<MemorySessionStore>, clock: Arc<ManualClock>) -> SessionManager {
        SessionManager::new(&SessionTrackingConfig::default(), store)
            .with_clock(clock)
            .with_id_generator(Arc::new(Sequence(parking_lot::Mutex::new(0))))
    }

    #[tokio::test]
    async fn first_update_rotates_from_nothing() {
        let store = Arc::new(MemorySessionStore::new());
        let clock = Arc::new(ManualClock::new(1_000));
        let mgr = manager(store.clone(), clock);

        let outcome = mgr.update().await.unwrap();
        assert_eq!(
            outcome,
            UpdateOutcome::Rotated {
                previous: None,
                next: SessionMeta::new("s1"),
                reason: RotationReason::Missing,
            }
        );
        assert_eq!(mgr.current().await, Some(SessionMeta::new("s1")));

        let stored = store.snapshot().unwrap();
        assert_eq!(stored.session_id, "s1");
        assert_eq!(stored.session_meta, Some(SessionMeta::new("s1")));
    }

    #[tokio::test]
    async fn idle_session_rotates_and_links_back() {
        let store = Arc::new(MemorySessionStore::new());
        let clock = Arc::new(ManualClock::new(1_000));
        let mgr = manager(store.clone(), clock.clone());

        mgr.update().await.unwrap();
        clock.advance(15 * 60 * 1000);

        let outcome = mgr.update().await.unwrap();
        let UpdateOutcome::Rotated { previous, next, reason } = outcome else {
            panic!("expected rotation");
        };
        assert_eq!(previous, Some(SessionMeta::new("s1")));
        assert_eq!(next.id, "s2");
        assert_eq!(next.previous_session(), Some("s1"));
        assert!(matches!(reason, RotationReason::Inactive { .. }));
    }

    #[tokio::test]
    async fn repeated_updates_inside_window_only_extend() {
        let store = Arc::new(MemorySessionStore::new());
        let clock = Arc::new(ManualClock::new(1_000));
        let mgr = manager(store.clone(), clock.clone());

        mgr.update().await.unwrap();
        for _ in 0..10 {
            clock.advance(60_000);
            let outcome = mgr.update().await.unwrap();
            assert_eq!(outcome, UpdateOutcome::Extended { session_id: "s1".into() });
        }
        // Redundant calls with no time passing are fine too.
        assert!(!mgr.update().await.unwrap().is_rotation());

        let stored = store.snapshot().unwrap();
        assert_eq!(stored.started, 1_000);
        assert_eq!(stored.last_activity, 1_000 + 10 * 60_000);
    }

    #[tokio::test]
    async fn absolute_lifetime_rotates_an_active_session() {
        let store = Arc::new(MemorySessionStore::new());
        let clock = Arc::new(ManualClock::new(0));
        let mgr = manager(store.clone(), clock.clone());

        mgr.update().await.unwrap();
        // Stay active every 10 minutes for four hours.
        let mut rotated = None;
        for _ in 0..24 {
            clock.advance(10 * 60 * 1000);
            let outcome = mgr.update().await.unwrap();
            if outcome.is_rotation() {
                rotated = Some(outcome);
                break;
            }
        }
        let Some(UpdateOutcome::Rotated { reason, next, .. }) = rotated else {
            panic!("expected a lifetime rotation");
        };
        assert!(matches!(reason, RotationReason::Expired { .. }));
        assert_eq!(next.previous_session(), Some("s1"));
    }

    #[tokio::test]
    async fn initialize_restores_valid_stored_session() {
        let stored = SessionRecord {
            session_id: "kept".into(),
            started: 0,
            last_activity: 500,
            session_meta: Some(SessionMeta::new("kept").with_attribute("previousSession", "older")),
        };
        let store = Arc::new(MemorySessionStore::with_record(stored));
        let clock = Arc::new(ManualClock::new(1_000));
        let notified = Arc::new(parking_lot::Mutex::new(0));
        let count = notified.clone();
        let mgr = manager(store.clone(), clock).on_session_change(move |_, _| {
            *count.lock() += 1;
            Ok(())
        });

        let meta = mgr.initialize().await.unwrap();
        assert_eq!(meta.id, "kept");
        assert_eq!(meta.previous_session(), Some("older"));
        assert_eq!(*notified.lock(), 0);
        assert_eq!(store.snapshot().unwrap().last_activity, 1_000);
    }

    #[tokio::test]
    async fn initialize_uses_seed_when_nothing_is_stored() {
        let store = Arc::new(MemorySessionStore::new());
        let clock = Arc::new(ManualClock::new(1_000));
        let seed = SessionMeta::new("from-backend").with_attribute("foo", "bar");
        let mgr = manager(store.clone(), clock).with_seed(Some(seed.clone()));

        let meta = mgr.initialize().await.unwrap();
        assert_eq!(meta, seed);
        assert_eq!(store.snapshot().unwrap().session_id, "from-backend");
    }

    #[tokio::test]
    async fn initialize_with_seed_chains_to_expired_record() {
        let expired = SessionRecord {
            session_id: "old".into(),
            started: 0,
            last_activity: 0,
            session_meta: None,
        };
        let store = Arc::new(MemorySessionStore::with_record(expired));
        let clock = Arc::new(ManualClock::new(100 * 60 * 1000));
        let seed = SessionMeta::new("from-backend").with_attribute("foo", "bar");
        let mgr = manager(store, clock).with_seed(Some(seed));

        let meta = mgr.initialize().await.unwrap();
        assert_eq!(meta.id, "from-backend");
        assert_eq!(meta.attribute("foo"), Some("bar"));
        assert_eq!(meta.previous_session(), Some("old"));
    }

    #[tokio::test]
    async fn blank_config_seed_is_ignored() {
        let config = SessionTrackingConfig {
            session: Some(tm_domain::config::SessionSeed {
                id: Some("".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let store = Arc::new(MemorySessionStore::new());
        let mgr = SessionManager::new(&config, store)
            .with_clock(Arc::new(ManualClock::new(0)))
            .with_id_generator(Arc::new(Sequence(parking_lot::Mutex::new(0))));

        let meta = mgr.initialize().await.unwrap();
        assert_eq!(meta, SessionMeta::new("s1"));
    }
}
