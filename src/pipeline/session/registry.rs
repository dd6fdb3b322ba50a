//! Per-source session registry with inactivity eviction.
//!
//! All mutation and iteration happens inside one mutex held for a single
//! operation. The registry exposes only two ways in: an atomic
//! "upsert-and-maybe-evict" for the driving context and read-only snapshots
//! for everybody else. Resource construction runs outside the lock; evicted
//! resources are handed back to the caller, to be released after the lock
//! is gone.

use crate::config::SourceTimeout;
use crate::error::{MediaFlowError, Result};
use crate::pipeline::id::SourceId;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Bookkeeping for one live source.
#[derive(Debug)]
pub struct Session<R> {
    source_id: SourceId,
    created_at: Duration,
    last_active: Duration,
    messages: u64,
    resource: R,
}

impl<R> Session<R> {
    fn new(source_id: SourceId, now: Duration, resource: R) -> Self {
        Self {
            source_id,
            created_at: now,
            last_active: now,
            messages: 1,
            resource,
        }
    }

    fn refresh(&mut self, now: Duration) {
        self.last_active = now;
        self.messages += 1;
    }

    fn into_evicted(self, now: Duration) -> EvictedSession<R> {
        EvictedSession {
            source_id: self.source_id,
            idle_for: now.saturating_sub(self.last_active),
            resource: self.resource,
        }
    }

    fn info(&self) -> SessionInfo {
        SessionInfo {
            source_id: self.source_id,
            created_at: self.created_at,
            last_active: self.last_active,
            messages: self.messages,
        }
    }
}

/// Read-only view of a session, safe to hand to other contexts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionInfo {
    pub source_id: SourceId,
    pub created_at: Duration,
    pub last_active: Duration,
    pub messages: u64,
}

/// A session removed from the registry, with the resource it owned.
#[derive(Debug)]
pub struct EvictedSession<R> {
    pub source_id: SourceId,
    pub idle_for: Duration,
    pub resource: R,
}

/// Outcome of [`SessionRegistry::upsert_and_evict`].
#[derive(Debug)]
pub struct Upsert<R, T> {
    /// A new session was created for the source.
    pub created: bool,
    /// Whatever the touch closure returned.
    pub value: T,
    /// Sessions that timed out, in source order.
    pub evicted: Vec<EvictedSession<R>>,
    /// A resource built for a session that appeared concurrently; never stored.
    pub superseded: Option<R>,
}

pub struct SessionRegistry<R> {
    timeout: Duration,
    sessions: Mutex<BTreeMap<SourceId, Session<R>>>,
}

impl<R> SessionRegistry<R> {
    pub fn new(timeout: SourceTimeout) -> Self {
        Self {
            timeout: timeout.as_duration(),
            sessions: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<SourceId, Session<R>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record activity for `source_id` at `now`, evicting every session idle
    /// for longer than the timeout.
    ///
    /// A source that is unknown, or whose own session has already expired,
    /// gets a brand-new session with a resource from `create`; the stale
    /// session is reported as evicted, never revived. `create` runs without
    /// the lock held, and if it fails nothing changes, not even the eviction
    /// scan. `touch` runs under the lock on the session's resource and must
    /// not block.
    pub fn upsert_and_evict<T, C, F>(
        &self,
        source_id: SourceId,
        now: Duration,
        create: C,
        touch: F,
    ) -> Result<Upsert<R, T>>
    where
        C: FnOnce() -> Result<R>,
        F: FnOnce(&mut R) -> T,
    {
        let mut sessions = self.lock();
        let needs_resource = sessions
            .get(&source_id)
            .map_or(true, |s| self.is_expired(s, now));

        let mut fresh = None;
        if needs_resource {
            drop(sessions);
            fresh = Some(create()?);
            sessions = self.lock();
        }

        // Nothing is removed until the upsert is known to succeed.
        let mut evicted = Vec::new();
        let (created, superseded, value) = match (sessions.entry(source_id), fresh) {
            (Entry::Occupied(entry), fresh) if !self.is_expired(entry.get(), now) => {
                let session = entry.into_mut();
                session.refresh(now);
                (false, fresh, touch(&mut session.resource))
            }
            (Entry::Occupied(entry), Some(resource)) => {
                let session = entry.into_mut();
                let stale = std::mem::replace(session, Session::new(source_id, now, resource));
                evicted.push(stale.into_evicted(now));
                (true, None, touch(&mut session.resource))
            }
            (Entry::Vacant(entry), Some(resource)) => {
                let session = entry.insert(Session::new(source_id, now, resource));
                (true, None, touch(&mut session.resource))
            }
            (_, None) => {
                return Err(MediaFlowError::external(format!(
                    "session {} expired during upsert",
                    source_id
                )));
            }
        };
        evicted.extend(Self::evict_expired(&mut sessions, now, self.timeout));
        evicted.sort_by_key(|e| e.source_id);
        drop(sessions);

        Ok(Upsert {
            created,
            value,
            evicted,
            superseded,
        })
    }

    fn is_expired(&self, session: &Session<R>, now: Duration) -> bool {
        now.saturating_sub(session.last_active) > self.timeout
    }

    fn evict_expired(
        sessions: &mut BTreeMap<SourceId, Session<R>>,
        now: Duration,
        timeout: Duration,
    ) -> Vec<EvictedSession<R>> {
        let expired: Vec<SourceId> = sessions
            .values()
            .filter(|s| now.saturating_sub(s.last_active) > timeout)
            .map(|s| s.source_id)
            .collect();

        expired
            .into_iter()
            .filter_map(|id| sessions.remove(&id))
            .map(|s| s.into_evicted(now))
            .collect()
    }

    /// Whether `source_id` has a session that has not timed out at `now`.
    pub fn is_live(&self, source_id: SourceId, now: Duration) -> bool {
        self.lock()
            .get(&source_id)
            .is_some_and(|s| !self.is_expired(s, now))
    }

    /// Run `f` on a session's resource under the lock.
    pub fn with_resource<T>(&self, source_id: SourceId, f: impl FnOnce(&mut R) -> T) -> Option<T> {
        self.lock()
            .get_mut(&source_id)
            .map(|session| f(&mut session.resource))
    }

    /// Remove every session, e.g. on component teardown.
    pub fn drain(&self, now: Duration) -> Vec<EvictedSession<R>> {
        let sessions = std::mem::take(&mut *self.lock());
        sessions
            .into_values()
            .map(|s| s.into_evicted(now))
            .collect()
    }

    /// Source ids currently tracked.
    pub fn snapshot(&self) -> BTreeSet<SourceId> {
        self.lock().keys().copied().collect()
    }

    pub fn session_info(&self, source_id: SourceId) -> Option<SessionInfo> {
        self.lock().get(&source_id).map(Session::info)
    }

    pub fn contains(&self, source_id: SourceId) -> bool {
        self.lock().contains_key(&source_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Administrative queries, callable from any context.
pub trait SourceQuery: Send + Sync {
    fn active_sources(&self) -> BTreeSet<SourceId>;

    fn session_info(&self, source_id: SourceId) -> Option<SessionInfo>;
}

impl<R: Send> SourceQuery for SessionRegistry<R> {
    fn active_sources(&self) -> BTreeSet<SourceId> {
        self.snapshot()
    }

    fn session_info(&self, source_id: SourceId) -> Option<SessionInfo> {
        SessionRegistry::session_info(self, source_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn secs(s: f64) -> Duration {
        Duration::from_secs_f64(s)
    }

    fn registry(timeout: f64) -> SessionRegistry<String> {
        SessionRegistry::new(SourceTimeout::from_secs_f64(timeout).unwrap())
    }

    fn upsert(
        reg: &SessionRegistry<String>,
        id: SourceId,
        now: f64,
    ) -> Upsert<String, ()> {
        reg.upsert_and_evict(id, secs(now), || Ok(format!("res-{}", id)), |_| ())
            .unwrap()
    }

    #[test]
    fn test_first_message_creates_session() {
        let reg = registry(2.0);
        let up = upsert(&reg, 7, 0.0);
        assert!(up.created);
        assert!(up.evicted.is_empty());
        assert_eq!(reg.snapshot().into_iter().collect::<Vec<_>>(), vec![7]);
    }

    #[test]
    fn test_refresh_does_not_recreate() {
        let reg = registry(2.0);
        upsert(&reg, 7, 0.0);
        let up = upsert(&reg, 7, 1.0);
        assert!(!up.created);
        let info = reg.session_info(7).unwrap();
        assert_eq!(info.last_active, secs(1.0));
        assert_eq!(info.messages, 2);
    }

    #[test]
    fn test_idle_session_evicted_on_other_source_push() {
        let reg = registry(2.0);
        upsert(&reg, 7, 0.0);
        upsert(&reg, 7, 1.0);
        let up = upsert(&reg, 9, 3.5);
        assert!(up.created);
        assert_eq!(up.evicted.len(), 1);
        assert_eq!(up.evicted[0].source_id, 7);
        assert_eq!(up.evicted[0].resource, "res-7");
        assert_eq!(up.evicted[0].idle_for, secs(2.5));
        assert!(!reg.contains(7));
    }

    #[test]
    fn test_returning_source_is_not_resurrected() {
        let reg = registry(2.0);
        upsert(&reg, 7, 0.0);
        let up = reg
            .upsert_and_evict(7, secs(10.0), || Ok("second".to_string()), |r| r.clone())
            .unwrap();
        assert!(up.created);
        assert_eq!(up.value, "second");
        assert_eq!(up.evicted.len(), 1);
        assert_eq!(up.evicted[0].resource, "res-7");
        assert_eq!(reg.session_info(7).unwrap().created_at, secs(10.0));
    }

    #[test]
    fn test_exactly_timeout_is_not_expired() {
        let reg = registry(2.0);
        upsert(&reg, 1, 0.0);
        let up = upsert(&reg, 2, 2.0);
        assert!(up.evicted.is_empty());
    }

    #[test]
    fn test_failed_create_changes_nothing() {
        let reg = registry(1.0);
        upsert(&reg, 1, 0.0);
        let err = reg
            .upsert_and_evict(
                2,
                secs(5.0),
                || Err(MediaFlowError::unavailable("no voices left")),
                |_| (),
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceUnavailable);
        // The stale session survives because the scan never ran.
        assert!(reg.contains(1));
        assert!(!reg.contains(2));
    }

    #[test]
    fn test_session_drained_while_creating_is_recreated() {
        let reg = registry(1.0);
        upsert(&reg, 1, 0.0);
        upsert(&reg, 2, 0.0);

        // Another context tears everything down while the resource is built.
        let mut drained = Vec::new();
        let up = reg
            .upsert_and_evict(
                1,
                secs(5.0),
                || {
                    drained = reg.drain(secs(5.0));
                    Ok("fresh".to_string())
                },
                |r| r.clone(),
            )
            .unwrap();

        assert!(up.created);
        assert_eq!(up.value, "fresh");
        assert!(up.evicted.is_empty());
        assert_eq!(drained.len(), 2);
        assert_eq!(reg.snapshot().into_iter().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn test_session_created_while_creating_supersedes() {
        let reg = registry(1.0);
        let up = reg
            .upsert_and_evict(
                3,
                secs(0.0),
                || {
                    upsert(&reg, 3, 0.0);
                    Ok("late".to_string())
                },
                |r| r.clone(),
            )
            .unwrap();

        assert!(!up.created);
        assert_eq!(up.value, "res-3");
        assert_eq!(up.superseded.as_deref(), Some("late"));
        assert_eq!(reg.session_info(3).unwrap().messages, 2);
    }

    #[test]
    fn test_own_stale_session_reported_with_others_in_order() {
        let reg = registry(1.0);
        upsert(&reg, 2, 0.0);
        upsert(&reg, 5, 0.0);
        let up = upsert(&reg, 5, 3.0);
        let ids: Vec<_> = up.evicted.iter().map(|e| e.source_id).collect();
        assert_eq!(ids, vec![2, 5]);
        assert_eq!(reg.snapshot().into_iter().collect::<Vec<_>>(), vec![5]);
    }

    #[test]
    fn test_is_live() {
        let reg = registry(1.0);
        upsert(&reg, 1, 0.0);
        assert!(reg.is_live(1, secs(1.0)));
        assert!(!reg.is_live(1, secs(1.5)));
        assert!(!reg.is_live(2, secs(0.0)));
    }

    #[test]
    fn test_touch_sees_resource() {
        let reg = registry(1.0);
        let up = reg
            .upsert_and_evict(4, secs(0.0), || Ok("abc".to_string()), |r| r.len())
            .unwrap();
        assert_eq!(up.value, 3);
        assert_eq!(reg.with_resource(4, |r| r.clone()), Some("abc".to_string()));
        assert_eq!(reg.with_resource(5, |r| r.clone()), None);
    }

    #[test]
    fn test_drain_empties_registry() {
        let reg = registry(1.0);
        upsert(&reg, 1, 0.0);
        upsert(&reg, 2, 0.5);
        let drained = reg.drain(secs(0.5));
        assert_eq!(drained.len(), 2);
        assert!(reg.is_empty());
    }
}
