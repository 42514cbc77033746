//! Keeps in-flight sessions alive until they have reported a verdict.

use crate::session::{ScriptSession, SessionId};
use crate::verdict::Verdict;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tracing::debug;

struct SessionEntry {
    requested_url: String,
}

#[derive(Default)]
struct Inner {
    sessions: Mutex<HashMap<SessionId, SessionEntry>>,
    idle: Notify,
}

/// The set of sessions that have been started but not yet concluded.
///
/// An entry is added by [`launch`](Self::launch) and removed exactly once,
/// right before the session's completion handler runs. The registry is only
/// about liveness; sessions never coordinate through it.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<Inner>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<SessionId, SessionEntry>> {
        self.inner
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Register and start `session`. Must be called from within a tokio runtime.
    pub fn launch<F>(&self, session: ScriptSession, on_complete: F) -> SessionId
    where
        F: FnOnce(Verdict) + Send + 'static,
    {
        let id = session.id();
        self.sessions().insert(
            id,
            SessionEntry {
                requested_url: session.requested_url().to_string(),
            },
        );
        debug!(session = %id, "session registered");

        // Lives inside the session task; a cancelled task still unregisters.
        let registration = Registration {
            registry: self.clone(),
            id,
        };
        session.run(move |verdict| {
            drop(registration);
            on_complete(verdict);
        });
        id
    }

    fn remove(&self, id: SessionId) {
        let (removed, now_empty) = {
            let mut sessions = self.sessions();
            let removed = sessions.remove(&id).is_some();
            (removed, sessions.is_empty())
        };
        if !removed {
            return;
        }
        debug!(session = %id, "session unregistered");
        if now_empty {
            self.inner.idle.notify_waiters();
        }
    }

    pub fn len(&self) -> usize {
        self.sessions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions().is_empty()
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions().contains_key(&id)
    }

    /// Ids and requested URLs of every live session.
    pub fn in_flight(&self) -> Vec<(SessionId, String)> {
        let mut live: Vec<_> = self
            .sessions()
            .iter()
            .map(|(id, entry)| (*id, entry.requested_url.clone()))
            .collect();
        live.sort();
        live
    }

    /// Resolve once no session is in flight.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.is_empty() {
                return;
            }
            notified.await;
        }
    }
}

/// Removes its session from the registry when dropped.
struct Registration {
    registry: SessionRegistry,
    id: SessionId,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.remove(self.id);
    }
}
