//! Session Store
//!
//! Registry of call sessions keyed by call id. Each session sits behind its
//! own async mutex so unrelated calls never contend, while two events for the
//! same call are strictly serialized.

use crate::application::record_session_events;
use crate::domain::call::CallSession;
use crate::domain::lead::LeadProfile;
use crate::domain::shared::error::CallError;
use crate::domain::shared::result::Result;
use crate::domain::shared::value_objects::CallId;
use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::BoxFuture;
use metrics::counter;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

struct SessionSlot {
    session: Mutex<CallSession>,
    /// Set as soon as a call-ended event arrives, before it gets the lock
    hangup_signalled: AtomicBool,
}

pub struct SessionStore {
    sessions: DashMap<CallId, Arc<SessionSlot>>,
    retention: Duration,
    max_age: Duration,
}

impl SessionStore {
    /// `retention` is how long a terminated session stays addressable.
    /// `max_age` bounds sessions that never see a terminating event.
    pub fn new(retention: Duration, max_age: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            retention,
            max_age,
        }
    }

    /// Register a new session in `INITIATED`
    pub fn create(&self, id: CallId, lead: LeadProfile) -> Result<CallSession> {
        match self.sessions.entry(id) {
            Entry::Occupied(_) => Err(CallError::Validation(format!(
                "session {} already exists",
                id
            ))),
            Entry::Vacant(vacant) => {
                let session = CallSession::new(id, lead);
                vacant.insert(Arc::new(SessionSlot {
                    session: Mutex::new(session.clone()),
                    hangup_signalled: AtomicBool::new(false),
                }));
                info!(call_id = %id, "Session created");
                Ok(session)
            }
        }
    }

    /// Snapshot of a session. Waits for any in-flight mutation to finish.
    pub async fn get(&self, id: &CallId) -> Result<CallSession> {
        let slot = self.slot(id)?;
        let session = slot.session.lock().await;
        self.ensure_addressable(&session, Utc::now())?;
        Ok(session.clone())
    }

    /// Run `f` with exclusive access to the session.
    ///
    /// `f` works on a draft copy. The draft replaces the stored session only
    /// when `f` returns `Ok`, so a failed handler leaves no partial update.
    pub async fn with_lock<T, E, F>(&self, id: &CallId, f: F) -> std::result::Result<T, E>
    where
        F: for<'s> FnOnce(&'s mut CallSession) -> BoxFuture<'s, std::result::Result<T, E>>,
        E: From<CallError>,
    {
        let slot = self.slot(id)?;
        let mut stored = slot.session.lock().await;
        self.ensure_addressable(&stored, Utc::now())?;

        let mut draft = stored.clone();
        let output = f(&mut draft).await?;
        *stored = draft;

        Ok(output)
    }

    /// Flag the session as hung up by the remote side
    pub fn signal_hangup(&self, id: &CallId) {
        if let Some(slot) = self.sessions.get(id) {
            slot.hangup_signalled.store(true, Ordering::SeqCst);
        }
    }

    pub fn hangup_signalled(&self, id: &CallId) -> bool {
        self.sessions
            .get(id)
            .is_some_and(|slot| slot.hangup_signalled.load(Ordering::SeqCst))
    }

    /// Whether a session is known and not yet terminated.
    ///
    /// A session that is busy processing an event counts as live.
    pub fn is_live(&self, id: &CallId) -> bool {
        let Some(slot) = self.sessions.get(id).map(|s| Arc::clone(s.value())) else {
            return false;
        };
        let live = match slot.session.try_lock() {
            Ok(session) => !session.is_terminal(),
            Err(_) => true,
        };
        live
    }

    /// Drop sessions whose retention window has passed, and fail sessions
    /// older than the maximum call age. Returns how many were removed.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, slot| {
            let keep = match slot.session.try_lock() {
                Ok(mut session) => self.keep(&mut session, now),
                Err(_) => true,
            };
            keep
        });
        before.saturating_sub(self.sessions.len())
    }

    fn keep(&self, session: &mut CallSession, now: DateTime<Utc>) -> bool {
        if session.is_stale(self.max_age, now) {
            warn!(call_id = %session.id(), state = %session.state(), "Session never terminated, failing and sweeping it");
            counter!("callpilot_stale_sessions_total").increment(1);
            match session.fail() {
                Ok(()) => record_session_events(&session.take_events()),
                Err(e) => warn!(call_id = %session.id(), "Could not fail stale session: {}", e),
            }
            return false;
        }

        let expired = session.is_expired(self.retention, now);
        if expired {
            debug!(call_id = %session.id(), "Sweeping expired session");
        }
        !expired
    }

    /// Identifiers of every tracked session
    pub fn ids(&self) -> Vec<CallId> {
        self.sessions.iter().map(|entry| *entry.key()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn slot(&self, id: &CallId) -> Result<Arc<SessionSlot>> {
        self.sessions
            .get(id)
            .map(|slot| Arc::clone(slot.value()))
            .ok_or_else(|| CallError::SessionNotFound(id.to_string()))
    }

    fn ensure_addressable(&self, session: &CallSession, now: DateTime<Utc>) -> Result<()> {
        if session.is_expired(self.retention, now) {
            return Err(CallError::SessionExpired(session.id().to_string()));
        }
        Ok(())
    }
}
