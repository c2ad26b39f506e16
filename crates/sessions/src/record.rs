//! Session records and the rules that decide when one must be rotated.
//!
//! A record stays usable until it has been idle for the inactivity timeout
//! or has existed for the absolute lifetime, whichever comes first.  Records
//! are replaced wholesale; nothing mutates a stored record in place.

use serde::{Deserialize, Serialize};

use tm_domain::config::SessionTrackingConfig;

use crate::clock::Timestamp;
use crate::metadata::SessionMeta;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session record
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The durable record of the current session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub session_id: String,
    /// When the record was created.
    pub started: Timestamp,
    /// Most recent activity that touched this record.
    pub last_activity: Timestamp,
    /// Metadata computed when the session was created, kept so a later
    /// reader can restore it without re-chaining.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_meta: Option<SessionMeta>,
}

impl SessionRecord {
    /// Mint a record stamped with `now`.  A blank `seed_id` counts as absent.
    pub fn create(seed_id: Option<&str>, now: Timestamp, ids: &dyn SessionIdGenerator) -> Self {
        let session_id = match seed_id.filter(|id| !id.trim().is_empty()) {
            Some(id) => id.to_owned(),
            None => ids.generate(),
        };

        Self {
            session_id,
            started: now,
            last_activity: now,
            session_meta: None,
        }
    }

    /// A copy of this record with `last_activity` moved to `now`.
    pub fn touched(&self, now: Timestamp) -> Self {
        Self {
            last_activity: now,
            ..self.clone()
        }
    }

    pub fn with_meta(mut self, meta: SessionMeta) -> Self {
        self.session_meta = Some(meta);
        self
    }

    /// The persisted metadata, or a bare `{ id }` when none was stored.
    pub fn meta_or_id(&self) -> SessionMeta {
        self.session_meta
            .clone()
            .unwrap_or_else(|| SessionMeta::new(self.session_id.clone()))
    }

    /// Saturates instead of overflowing on out-of-range stored timestamps.
    pub fn idle_ms(&self, now: Timestamp) -> i64 {
        now.saturating_sub(self.last_activity)
    }

    pub fn age_ms(&self, now: Timestamp) -> i64 {
        now.saturating_sub(self.started)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Validity
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Why a record cannot be reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationReason {
    /// There is no record yet.
    Missing,
    Inactive { idle_ms: i64 },
    Expired { age_ms: i64 },
}

impl std::fmt::Display for RotationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing => write!(f, "no current session"),
            Self::Inactive { idle_ms } => write!(f, "inactive for {idle_ms}ms"),
            Self::Expired { age_ms } => write!(f, "lifetime exceeded ({age_ms}ms)"),
        }
    }
}

/// Decides whether a record may be extended or must be rotated.
pub trait SessionValidity: Send + Sync {
    /// `None` when the record is usable, otherwise the reason it is not.
    fn evaluate(&self, record: Option<&SessionRecord>, now: Timestamp) -> Option<RotationReason>;

    fn is_valid(&self, record: Option<&SessionRecord>, now: Timestamp) -> bool {
        self.evaluate(record, now).is_none()
    }
}

/// Inactivity and absolute-lifetime limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionPolicy {
    pub inactivity_timeout_ms: i64,
    pub absolute_lifetime_ms: i64,
}

impl SessionPolicy {
    pub fn new(inactivity_timeout_ms: i64, absolute_lifetime_ms: i64) -> Self {
        Self {
            inactivity_timeout_ms,
            absolute_lifetime_ms,
        }
    }

    pub fn from_config(config: &SessionTrackingConfig) -> Self {
        Self::new(
            millis(config.inactivity_timeout_ms),
            millis(config.absolute_lifetime_ms),
        )
    }
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self::from_config(&SessionTrackingConfig::default())
    }
}

impl SessionValidity for SessionPolicy {
    fn evaluate(&self, record: Option<&SessionRecord>, now: Timestamp) -> Option<RotationReason> {
        let Some(record) = record else {
            return Some(RotationReason::Missing);
        };

        let idle_ms = record.idle_ms(now);
        if idle_ms >= self.inactivity_timeout_ms {
            return Some(RotationReason::Inactive { idle_ms });
        }

        // A record started further in the future than a whole lifetime
        // cannot have been written by this clock.
        let age_ms = record.age_ms(now);
        if age_ms >= self.absolute_lifetime_ms || age_ms <= -self.absolute_lifetime_ms {
            return Some(RotationReason::Expired { age_ms });
        }

        None
    }
}

fn millis(ms: u64) -> i64 {
    i64::try_from(ms).unwrap_or(i64::MAX)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session ids
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Source of fresh session ids.
pub trait SessionIdGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// Random v4 UUIDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidGenerator;

impl SessionIdGenerator for UuidGenerator {
    fn generate(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tm_domain::config::{DEFAULT_ABSOLUTE_LIFETIME_MS, DEFAULT_INACTIVITY_TIMEOUT_MS};

    // 2023-01-01T00:00:00Z
    const NOW: Timestamp = 1_672_531_200_000;
    const INACTIVITY: i64 = DEFAULT_INACTIVITY_TIMEOUT_MS as i64;
    const LIFETIME: i64 = DEFAULT_ABSOLUTE_LIFETIME_MS as i64;

    struct FixedId(&'static str);

    impl SessionIdGenerator for FixedId {
        fn generate(&self) -> String {
            self.0.to_owned()
        }
    }

    fn fresh() -> SessionRecord {
        SessionRecord::create(None, NOW, &FixedId("123"))
    }

    #[test]
    fn create_stamps_both_timestamps_with_now() {
        let record = fresh();
        assert_eq!(
            record,
            SessionRecord {
                session_id: "123".into(),
                started: NOW,
                last_activity: NOW,
                session_meta: None,
            }
        );
    }

    #[test]
    fn create_uses_seed_id() {
        let record = SessionRecord::create(Some("abcde"), NOW, &FixedId("123"));
        assert_eq!(record.session_id, "abcde");
        assert_eq!(record.started, NOW);
        assert_eq!(record.last_activity, NOW);
    }

    #[test]
    fn blank_seed_falls_back_to_generator() {
        let record = SessionRecord::create(Some(" "), NOW, &FixedId("123"));
        assert_eq!(record.session_id, "123");
    }

    #[test]
    fn uuid_ids_are_distinct() {
        let a = UuidGenerator.generate();
        let b = UuidGenerator.generate();
        assert_ne!(a, b);
        assert_eq!(a.len(), 36);
    }

    #[test]
    fn missing_record_is_invalid() {
        let policy = SessionPolicy::default();
        assert!(!policy.is_valid(None, NOW));
        assert_eq!(policy.evaluate(None, NOW), Some(RotationReason::Missing));
    }

    #[test]
    fn fresh_record_is_valid() {
        let policy = SessionPolicy::default();
        assert!(policy.is_valid(Some(&fresh()), NOW));
    }

    #[test]
    fn idle_for_the_full_window_is_invalid() {
        let policy = SessionPolicy::default();
        let mut record = fresh();
        record.last_activity = NOW - INACTIVITY;
        assert_eq!(
            policy.evaluate(Some(&record), NOW),
            Some(RotationReason::Inactive { idle_ms: INACTIVITY })
        );

        // Ancient activity with a recent start still counts as idle.
        record.last_activity = INACTIVITY;
        assert!(!policy.is_valid(Some(&record), NOW));
    }

    #[test]
    fn recent_activity_is_valid() {
        let policy = SessionPolicy::default();
        let mut record = fresh();
        record.last_activity = NOW - 1;
        assert!(policy.is_valid(Some(&record), NOW));

        record.last_activity = NOW - INACTIVITY + 1;
        assert!(policy.is_valid(Some(&record), NOW));
    }

    #[test]
    fn lifetime_reached_is_invalid_despite_activity() {
        let policy = SessionPolicy::default();
        let mut record = fresh();
        record.started -= LIFETIME;
        assert_eq!(
            policy.evaluate(Some(&record), NOW),
            Some(RotationReason::Expired { age_ms: LIFETIME })
        );
    }

    #[test]
    fn just_under_lifetime_is_valid() {
        let policy = SessionPolicy::default();
        let mut record = fresh();
        record.started -= LIFETIME - 1;
        assert!(policy.is_valid(Some(&record), NOW));
    }

    #[test]
    fn extreme_timestamps_rotate_without_overflow() {
        let policy = SessionPolicy::default();

        let mut record = fresh();
        record.last_activity = i64::MIN;
        assert_eq!(record.idle_ms(NOW), i64::MAX);
        assert_eq!(
            policy.evaluate(Some(&record), NOW),
            Some(RotationReason::Inactive { idle_ms: i64::MAX })
        );

        let mut record = fresh();
        record.started = i64::MIN;
        assert_eq!(
            policy.evaluate(Some(&record), NOW),
            Some(RotationReason::Expired { age_ms: i64::MAX })
        );

        let mut record = fresh();
        record.started = i64::MAX;
        assert_eq!(
            policy.evaluate(Some(&record), NOW),
            Some(RotationReason::Expired { age_ms: NOW - i64::MAX })
        );

        let mut record = fresh();
        record.last_activity = i64::MAX;
        assert_eq!(record.idle_ms(i64::MIN), i64::MIN);
    }

    #[test]
    fn small_clock_skew_keeps_the_session() {
        let policy = SessionPolicy::default();
        let mut record = fresh();
        record.started = NOW + 5_000;
        record.last_activity = NOW + 5_000;
        assert!(policy.is_valid(Some(&record), NOW));
    }

    #[test]
    fn policy_follows_config() {
        let cfg = SessionTrackingConfig {
            inactivity_timeout_ms: 1_000,
            absolute_lifetime_ms: 5_000,
            ..Default::default()
        };
        let policy = SessionPolicy::from_config(&cfg);
        let mut record = fresh();
        record.last_activity = NOW - 999;
        assert!(policy.is_valid(Some(&record), NOW));
        record.last_activity = NOW - 1_000;
        assert!(!policy.is_valid(Some(&record), NOW));
    }

    #[test]
    fn touched_only_moves_last_activity() {
        let record = fresh();
        let later = record.touched(NOW + 10);
        assert_eq!(later.session_id, record.session_id);
        assert_eq!(later.started, NOW);
        assert_eq!(later.last_activity, NOW + 10);
    }

    #[test]
    fn serializes_camel_case() {
        let record = fresh().with_meta(SessionMeta::new("123"));
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["sessionId"], "123");
        assert_eq!(json["lastActivity"], NOW);
        assert_eq!(json["sessionMeta"]["id"], "123");

        let bare = serde_json::to_value(fresh()).unwrap();
        assert!(bare.get("sessionMeta").is_none());
    }
}
