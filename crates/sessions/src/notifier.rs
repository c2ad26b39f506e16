//! Session change notification.
//!
//! One optional callback, invoked synchronously exactly once per rotation.
//! A failing callback never affects the session itself: errors and panics
//! are logged and swallowed.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tm_domain::trace::TraceEvent;

use crate::metadata::SessionMeta;

pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

/// Receives `(previous, next)` on every rotation.  `previous` is `None` when
/// there was no earlier session.
pub type SessionChangeCallback =
    Arc<dyn Fn(Option<&SessionMeta>, &SessionMeta) -> Result<(), CallbackError> + Send + Sync>;

#[derive(Clone, Default)]
pub struct ChangeNotifier {
    callback: Option<SessionChangeCallback>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_callback<F>(callback: F) -> Self
    where
        F: Fn(Option<&SessionMeta>, &SessionMeta) -> Result<(), CallbackError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            callback: Some(Arc::new(callback)),
        }
    }

    pub fn is_registered(&self) -> bool {
        self.callback.is_some()
    }

    /// Run the callback.  Returns `false` if it failed.
    pub fn notify(&self, previous: Option<&SessionMeta>, next: &SessionMeta) -> bool {
        let Some(callback) = &self.callback else {
            return true;
        };

        let error = match catch_unwind(AssertUnwindSafe(|| callback(previous, next))) {
            Ok(Ok(())) => return true,
            Ok(Err(e)) => e.to_string(),
            Err(payload) => panic_message(payload.as_ref()),
        };

        tracing::warn!(
            session_id = %next.id,
            error = %error,
            "session change callback failed"
        );
        TraceEvent::SessionChangeCallbackFailed {
            session_id: next.id.clone(),
            error,
        }
        .emit();
        false
    }
}

impl std::fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("registered", &self.is_registered())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn unregistered_is_a_noop() {
        let notifier = ChangeNotifier::new();
        assert!(!notifier.is_registered());
        assert!(notifier.notify(None, &SessionMeta::new("a")));
    }

    #[test]
    fn passes_both_snapshots() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let notifier = ChangeNotifier::with_callback(move |prev, next| {
            sink.lock()
                .push((prev.map(|m| m.id.clone()), next.id.clone()));
            Ok(())
        });

        assert!(notifier.notify(None, &SessionMeta::new("a")));
        assert!(notifier.notify(Some(&SessionMeta::new("a")), &SessionMeta::new("b")));
        assert_eq!(
            *seen.lock(),
            vec![(None, "a".to_string()), (Some("a".to_string()), "b".to_string())]
        );
    }

    #[test]
    fn errors_are_swallowed() {
        let notifier = ChangeNotifier::with_callback(|_, _| Err("boom".into()));
        assert!(!notifier.notify(None, &SessionMeta::new("a")));
    }

    #[test]
    fn panics_are_swallowed() {
        let notifier = ChangeNotifier::with_callback(|_, _| panic!("kaboom"));
        assert!(!notifier.notify(None, &SessionMeta::new("a")));
    }
}
