//! Multi-source sink bookkeeping: registry + resources + observers.
//!
//! `SourceSessions` is what a sink calls once per `push`. It asks the
//! registry to upsert the sender's session and evict stale ones, releases
//! evicted resources once the registry lock is gone, and only then raises
//! the batched notifications.

use crate::config::SourceTimeout;
use crate::error::{MediaFlowError, Result};
use crate::pipeline::clock::Clock;
use crate::pipeline::id::SourceId;
use crate::pipeline::session::events::SessionObserver;
use crate::pipeline::session::registry::{SessionInfo, SessionRegistry, SourceQuery, Upsert};
use std::collections::BTreeSet;
use std::sync::Arc;

/// External collaborator that owns whatever a session holds on to.
///
/// `release` must not call back into the sink that owns the registry.
pub trait SessionResources: Send {
    type Handle: Send + 'static;

    /// Allocate the resource for a new source.
    fn acquire(&mut self, source_id: SourceId) -> Result<Self::Handle>;

    /// Tear down a resource whose session is gone.
    fn release(&mut self, source_id: SourceId, handle: Self::Handle);
}

/// Cloneable handle for listing the sources a sink currently knows about.
#[derive(Clone)]
pub struct SourceDirectory {
    query: Arc<dyn SourceQuery>,
}

impl SourceDirectory {
    pub fn list_active_sources(&self) -> BTreeSet<SourceId> {
        self.query.active_sources()
    }

    pub fn session_info(&self, source_id: SourceId) -> Option<SessionInfo> {
        self.query.session_info(source_id)
    }
}

impl std::fmt::Debug for SourceDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceDirectory").finish_non_exhaustive()
    }
}

pub struct SourceSessions<P: SessionResources> {
    registry: Arc<SessionRegistry<P::Handle>>,
    resources: P,
    observers: Vec<Arc<dyn SessionObserver>>,
    clock: Arc<dyn Clock>,
}

impl<P: SessionResources> SourceSessions<P> {
    pub fn new(
        timeout: SourceTimeout,
        resources: P,
        observers: Vec<Arc<dyn SessionObserver>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry: Arc::new(SessionRegistry::new(timeout)),
            resources,
            observers,
            clock,
        }
    }

    pub fn directory(&self) -> SourceDirectory {
        SourceDirectory {
            query: self.registry.clone(),
        }
    }

    pub fn registry(&self) -> &SessionRegistry<P::Handle> {
        &self.registry
    }

    pub fn resources(&self) -> &P {
        &self.resources
    }

    pub fn resources_mut(&mut self) -> &mut P {
        &mut self.resources
    }

    /// Note a message from `source_id`; `touch` runs on its session handle.
    ///
    /// On error (the resource could not be acquired) nothing changed.
    pub fn record_activity<T>(
        &mut self,
        source_id: SourceId,
        touch: impl FnOnce(&mut P::Handle) -> T,
    ) -> Result<T> {
        let now = self.clock.now();
        let resources = &mut self.resources;
        let upsert = self.registry.upsert_and_evict(
            source_id,
            now,
            || resources.acquire(source_id),
            touch,
        )?;
        Ok(self.settle(source_id, upsert))
    }

    /// Hand a message to the source's resource, then note the activity.
    ///
    /// `send` gets the live session's handle (under the registry lock, so it
    /// must not block) or, for a source without a live session, a freshly
    /// acquired one. If `send` fails nothing is recorded: no session is
    /// created, refreshed or evicted, a fresh handle is released again and
    /// observers hear nothing.
    pub fn deliver<T>(
        &mut self,
        source_id: SourceId,
        send: impl FnOnce(&mut P, &mut P::Handle) -> Result<T>,
    ) -> Result<T> {
        let now = self.clock.now();

        if self.registry.is_live(source_id, now) {
            let resources = &mut self.resources;
            let sent = self
                .registry
                .with_resource(source_id, |handle| send(resources, handle));
            let value = sent.ok_or_else(|| {
                MediaFlowError::external(format!("session {} vanished during delivery", source_id))
            })??;
            let upsert = self.registry.upsert_and_evict(
                source_id,
                now,
                || {
                    Err(MediaFlowError::external(format!(
                        "session {} vanished during delivery",
                        source_id
                    )))
                },
                |_| (),
            )?;
            self.settle(source_id, upsert);
            return Ok(value);
        }

        let mut handle = self.resources.acquire(source_id)?;
        let value = match send(&mut self.resources, &mut handle) {
            Ok(value) => value,
            Err(e) => {
                self.resources.release(source_id, handle);
                return Err(e);
            }
        };
        let upsert = self
            .registry
            .upsert_and_evict(source_id, now, move || Ok(handle), |_| ())?;
        self.settle(source_id, upsert);
        Ok(value)
    }

    /// Release what an upsert displaced, then notify observers.
    fn settle<T>(&mut self, source_id: SourceId, upsert: Upsert<P::Handle, T>) -> T {
        if let Some(extra) = upsert.superseded {
            self.resources.release(source_id, extra);
        }

        let mut removed = Vec::with_capacity(upsert.evicted.len());
        for evicted in upsert.evicted {
            tracing::debug!(
                "Source {} idle for {:?}, removing session",
                evicted.source_id,
                evicted.idle_for
            );
            self.resources.release(evicted.source_id, evicted.resource);
            removed.push(evicted.source_id);
        }

        // Removals first: a source returning after its timeout reads as
        // removed-then-new.
        for id in removed {
            for observer in &self.observers {
                observer.on_removed_source(id);
            }
        }
        if upsert.created {
            tracing::debug!("New source {}", source_id);
            for observer in &self.observers {
                observer.on_new_source(source_id);
            }
        }

        upsert.value
    }

    /// Drop every session, releasing resources and notifying observers.
    pub fn close_all(&mut self) -> usize {
        let drained = self.registry.drain(self.clock.now());
        let count = drained.len();
        for session in drained {
            self.resources.release(session.source_id, session.resource);
            for observer in &self.observers {
                observer.on_removed_source(session.source_id);
            }
        }
        count
    }

    /// Close every session and hand the resource provider back.
    pub fn into_resources(mut self) -> P {
        self.close_all();
        self.resources
    }
}
