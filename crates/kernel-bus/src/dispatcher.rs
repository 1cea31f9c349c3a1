//! # Event Dispatcher
//!
//! Pattern-matching publish/subscribe router used as the node's
//! intra-process notification bus.
//!
//! ## Dispatch Modes
//!
//! | Mode | Ordering | Listener failure |
//! |------|----------|------------------|
//! | `dispatch` | concurrent, interleaved on the caller's task | logged, siblings unaffected |
//! | `dispatch_seq` | registration order, one at a time | aborts the rest, returned to caller |
//! | `dispatch_sync` | registration order, never suspends | logged |
//!
//! Matched listeners are always ordered by registration, across every
//! pattern that matched (including `"*"`).

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::future::{join_all, BoxFuture};
use futures::task::noop_waker_ref;
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::events::Event;
use crate::listener::{
    same_listener, EventListener, ListenerError, ListenerHandle, ListenerId, ListenerRef,
    ListenerResult, OnceListener,
};
use crate::pattern::EventPattern;

/// Error surfaced by sequential dispatch.
#[derive(Debug, Error)]
#[error("listener {listener} for event '{event}' failed: {source}")]
pub struct DispatchError {
    /// The dispatched event name.
    pub event: String,
    /// The registration that failed.
    pub listener: ListenerId,
    /// What the listener returned.
    pub source: ListenerError,
}

/// Contract of an event dispatcher.
///
/// `pattern` arguments of the query and `forget` methods address the exact
/// pattern a listener was registered under; they are not matched as globs.
#[async_trait]
pub trait EventDispatcher: Send + Sync {
    /// Register `listener` under `pattern`. Every call adds a new registration.
    fn listen(&self, pattern: &str, listener: ListenerRef) -> ListenerHandle;

    /// Register several listeners, in order.
    fn listen_many(&self, listeners: Vec<(String, ListenerRef)>) -> Vec<ListenerHandle> {
        listeners
            .into_iter()
            .map(|(pattern, listener)| self.listen(&pattern, listener))
            .collect()
    }

    /// Register a listener that runs for the first matching event only.
    fn listen_once(&self, pattern: &str, listener: ListenerRef) -> ListenerHandle;

    /// Remove `listener` from `pattern`, or every listener of `pattern` when
    /// `listener` is `None`. Returns how many registrations were removed.
    fn forget(&self, pattern: &str, listener: Option<&ListenerRef>) -> usize;

    /// Apply `forget` to each entry.
    fn forget_many(&self, entries: Vec<(String, Option<ListenerRef>)>) -> usize {
        entries
            .iter()
            .map(|(pattern, listener)| self.forget(pattern, listener.as_ref()))
            .sum()
    }

    /// Remove every listener.
    fn flush(&self);

    /// Listeners registered under `pattern`, or all listeners.
    fn get_listeners(&self, pattern: Option<&str>) -> Vec<ListenerRef>;

    /// Whether anything is registered under `pattern`.
    fn has_listeners(&self, pattern: &str) -> bool {
        self.count_listeners(Some(pattern)) > 0
    }

    /// Number of registrations under `pattern`, or in total.
    fn count_listeners(&self, pattern: Option<&str>) -> usize;

    /// Run every matching listener concurrently and wait for all of them.
    async fn dispatch(&self, event: &str, payload: Value);

    /// Run matching listeners one after another, stopping at the first error.
    async fn dispatch_seq(&self, event: &str, payload: Value) -> Result<(), DispatchError>;

    /// Start matching listeners in order without suspending the caller.
    fn dispatch_sync(&self, event: &str, payload: Value);

    /// `dispatch` each event in order.
    async fn dispatch_many(&self, events: Vec<(String, Value)>) {
        for (event, payload) in events {
            self.dispatch(&event, payload).await;
        }
    }

    /// `dispatch_seq` each event in order, stopping at the first error.
    async fn dispatch_many_seq(&self, events: Vec<(String, Value)>) -> Result<(), DispatchError> {
        for (event, payload) in events {
            self.dispatch_seq(&event, payload).await?;
        }
        Ok(())
    }

    /// `dispatch_sync` each event in order.
    fn dispatch_many_sync(&self, events: Vec<(String, Value)>) {
        for (event, payload) in events {
            self.dispatch_sync(&event, payload);
        }
    }
}

#[derive(Clone)]
struct Registration {
    id: ListenerId,
    listener: ListenerRef,
}

struct Slot {
    pattern: EventPattern,
    registrations: Vec<Registration>,
}

/// Listener storage shared between the dispatcher and outstanding handles.
pub(crate) struct ListenerTable {
    slots: RwLock<IndexMap<String, Slot>>,
    next_id: AtomicU64,
}

impl ListenerTable {
    fn new() -> Self {
        Self {
            slots: RwLock::new(IndexMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    fn insert(&self, pattern: &str, listener: ListenerRef) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut slots = self.slots.write();
        slots
            .entry(pattern.to_string())
            .or_insert_with(|| Slot {
                pattern: EventPattern::compile(pattern),
                registrations: Vec::new(),
            })
            .registrations
            .push(Registration { id, listener });
        id
    }

    pub(crate) fn remove(&self, pattern: &str, id: ListenerId) -> bool {
        let mut slots = self.slots.write();
        let Some(slot) = slots.get_mut(pattern) else {
            return false;
        };

        let before = slot.registrations.len();
        slot.registrations.retain(|r| r.id != id);
        let removed = slot.registrations.len() != before;

        if slot.registrations.is_empty() {
            slots.shift_remove(pattern);
        }
        removed
    }

    fn forget(&self, pattern: &str, listener: Option<&ListenerRef>) -> usize {
        let mut slots = self.slots.write();
        let Some(slot) = slots.get_mut(pattern) else {
            return 0;
        };

        let before = slot.registrations.len();
        match listener {
            Some(listener) => slot
                .registrations
                .retain(|r| !same_listener(&r.listener, listener)),
            None => slot.registrations.clear(),
        }
        let removed = before - slot.registrations.len();

        if slot.registrations.is_empty() {
            slots.shift_remove(pattern);
        }
        removed
    }

    /// Snapshot of every registration matching `event`, in registration order.
    fn matching(&self, event: &str) -> Vec<Registration> {
        let slots = self.slots.read();
        let mut matched: Vec<Registration> = slots
            .values()
            .filter(|slot| slot.pattern.matches(event))
            .flat_map(|slot| slot.registrations.iter().cloned())
            .collect();
        matched.sort_by_key(|r| r.id);
        matched
    }

    fn listeners(&self, pattern: Option<&str>) -> Vec<ListenerRef> {
        let slots = self.slots.read();
        let mut registrations: Vec<&Registration> = match pattern {
            Some(pattern) => slots
                .get(pattern)
                .map(|slot| slot.registrations.iter().collect())
                .unwrap_or_default(),
            None => slots.values().flat_map(|s| s.registrations.iter()).collect(),
        };
        registrations.sort_by_key(|r| r.id);
        registrations.into_iter().map(|r| r.listener.clone()).collect()
    }

    fn count(&self, pattern: Option<&str>) -> usize {
        let slots = self.slots.read();
        match pattern {
            Some(pattern) => slots.get(pattern).map_or(0, |s| s.registrations.len()),
            None => slots.values().map(|s| s.registrations.len()).sum(),
        }
    }

    fn clear(&self) {
        self.slots.write().clear();
    }
}

/// In-memory dispatcher.
///
/// Cheap to share behind an `Arc`; all state is internally synchronized.
pub struct MemoryEventDispatcher {
    table: Arc<ListenerTable>,
    /// Total events dispatched, across all modes.
    events_dispatched: AtomicU64,
}

impl MemoryEventDispatcher {
    /// Create an empty dispatcher.
    #[must_use]
    pub fn new() -> Self {
        Self {
            table: Arc::new(ListenerTable::new()),
            events_dispatched: AtomicU64::new(0),
        }
    }

    /// Total number of events dispatched so far.
    #[must_use]
    pub fn events_dispatched(&self) -> u64 {
        self.events_dispatched.load(Ordering::Relaxed)
    }

    fn prepare(&self, event: &str) -> Vec<Registration> {
        self.events_dispatched.fetch_add(1, Ordering::Relaxed);
        let matched = self.table.matching(event);
        debug!(event, listeners = matched.len(), "Dispatching event");
        matched
    }
}

impl Default for MemoryEventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventDispatcher for MemoryEventDispatcher {
    fn listen(&self, pattern: &str, listener: ListenerRef) -> ListenerHandle {
        let id = self.table.insert(pattern, listener);
        debug!(pattern, listener = %id, "Listener registered");
        ListenerHandle::new(id, pattern.to_string(), Arc::downgrade(&self.table))
    }

    fn listen_once(&self, pattern: &str, listener: ListenerRef) -> ListenerHandle {
        let once = Arc::new(OnceListener::new(listener));
        let handle = self.listen(pattern, once.clone());
        once.arm(handle.clone());
        handle
    }

    fn forget(&self, pattern: &str, listener: Option<&ListenerRef>) -> usize {
        let removed = self.table.forget(pattern, listener);
        debug!(pattern, removed, "Listeners forgotten");
        removed
    }

    fn flush(&self) {
        self.table.clear();
        debug!("All listeners flushed");
    }

    fn get_listeners(&self, pattern: Option<&str>) -> Vec<ListenerRef> {
        self.table.listeners(pattern)
    }

    fn count_listeners(&self, pattern: Option<&str>) -> usize {
        self.table.count(pattern)
    }

    async fn dispatch(&self, event: &str, payload: Value) {
        let matched = self.prepare(event);
        if matched.is_empty() {
            return;
        }

        let envelope = Event::new(event, payload);
        let results = join_all(matched.iter().map(|r| {
            let envelope = &envelope;
            async move { (r.id, r.listener.handle(envelope).await) }
        }))
        .await;

        for (id, result) in results {
            if let Err(e) = result {
                warn!(event, listener = %id, error = %e, "Event listener failed");
            }
        }
    }

    async fn dispatch_seq(&self, event: &str, payload: Value) -> Result<(), DispatchError> {
        let matched = self.prepare(event);
        let envelope = Event::new(event, payload);

        for registration in matched {
            if let Err(source) = registration.listener.handle(&envelope).await {
                warn!(event, listener = %registration.id, error = %source, "Sequential dispatch aborted");
                return Err(DispatchError {
                    event: event.to_string(),
                    listener: registration.id,
                    source,
                });
            }
        }
        Ok(())
    }

    fn dispatch_sync(&self, event: &str, payload: Value) {
        let matched = self.prepare(event);
        let envelope = Arc::new(Event::new(event, payload));

        for registration in matched {
            let id = registration.id;
            let listener = registration.listener;
            let envelope = Arc::clone(&envelope);
            let mut task: BoxFuture<'static, ListenerResult> =
                Box::pin(async move { listener.handle(&envelope).await });

            let mut cx = Context::from_waker(noop_waker_ref());
            match task.as_mut().poll(&mut cx) {
                Poll::Ready(Ok(())) => {}
                Poll::Ready(Err(e)) => {
                    warn!(event, listener = %id, error = %e, "Event listener failed");
                }
                Poll::Pending => detach(event, id, task),
            }
        }
    }
}

/// Hand the unfinished part of a synchronously-started listener to the runtime.
fn detach(event: &str, id: ListenerId, task: BoxFuture<'static, ListenerResult>) {
    match tokio::runtime::Handle::try_current() {
        Ok(runtime) => {
            let event = event.to_string();
            runtime.spawn(async move {
                if let Err(e) = task.await {
                    warn!(event = %event, listener = %id, error = %e, "Event listener failed");
                }
            });
        }
        Err(_) => {
            debug!(event, listener = %id, "No runtime available, suspended listener dropped");
        }
    }
}
