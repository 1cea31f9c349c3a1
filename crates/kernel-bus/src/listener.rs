//! # Event Listeners
//!
//! Listener trait, closure adapter, and the handle returned by every
//! subscription.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;

use crate::dispatcher::ListenerTable;
use crate::events::Event;

/// Error returned by a listener.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// The listener rejected the event.
    #[error("{0}")]
    Failed(String),

    /// Any other failure raised inside the listener.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ListenerError {
    /// Shorthand for [`ListenerError::Failed`].
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Result of handling one event.
pub type ListenerResult = Result<(), ListenerError>;

/// Something that reacts to dispatched events.
#[async_trait]
pub trait EventListener: Send + Sync {
    /// Handle one event.
    async fn handle(&self, event: &Event) -> ListenerResult;
}

/// Shared listener reference. Identity (for `forget`) is the allocation.
pub type ListenerRef = Arc<dyn EventListener>;

/// Compare two listener references by allocation.
#[must_use]
pub fn same_listener(a: &ListenerRef, b: &ListenerRef) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a).cast::<()>(),
        Arc::as_ptr(b).cast::<()>(),
    )
}

/// Adapter turning an async closure into a listener.
pub struct FnListener<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> EventListener for FnListener<F>
where
    F: Fn(Event) -> Fut + Send + Sync,
    Fut: Future<Output = ListenerResult> + Send,
{
    async fn handle(&self, event: &Event) -> ListenerResult {
        (self.f)(event.clone()).await
    }
}

/// Build a listener from an async closure.
///
/// ```ignore
/// let listener = listener_fn(|event| async move {
///     tracing::info!(event = %event.name, "seen");
///     Ok(())
/// });
/// ```
pub fn listener_fn<F, Fut>(f: F) -> ListenerRef
where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ListenerResult> + Send + 'static,
{
    Arc::new(FnListener { f })
}

/// Monotonic registration number. Also the dispatch order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(pub(crate) u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Capability to remove exactly one registration.
///
/// Dropping the handle does NOT unsubscribe; call [`ListenerHandle::unsubscribe`].
#[derive(Clone)]
pub struct ListenerHandle {
    id: ListenerId,
    pattern: String,
    table: Weak<ListenerTable>,
    active: Arc<AtomicBool>,
}

impl ListenerHandle {
    pub(crate) fn new(id: ListenerId, pattern: String, table: Weak<ListenerTable>) -> Self {
        Self {
            id,
            pattern,
            table,
            active: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Remove this registration. Returns `true` only for the call that removed it.
    pub fn unsubscribe(&self) -> bool {
        if !self.active.swap(false, Ordering::AcqRel) {
            return false;
        }
        self.table
            .upgrade()
            .is_some_and(|table| table.remove(&self.pattern, self.id))
    }

    /// Whether `unsubscribe` has not been called yet.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Registration id.
    #[must_use]
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Pattern this registration was made under.
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

impl fmt::Debug for ListenerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerHandle")
            .field("id", &self.id)
            .field("pattern", &self.pattern)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Wrapper used by `listen_once`: unsubscribes before the wrapped listener runs.
pub(crate) struct OnceListener {
    inner: ListenerRef,
    fired: AtomicBool,
    handle: Mutex<Option<ListenerHandle>>,
}

impl OnceListener {
    pub(crate) fn new(inner: ListenerRef) -> Self {
        Self {
            inner,
            fired: AtomicBool::new(false),
            handle: Mutex::new(None),
        }
    }

    /// Attach the handle of the registration made for this wrapper.
    pub(crate) fn arm(&self, handle: ListenerHandle) {
        if self.fired.load(Ordering::Acquire) {
            // Fired between registration and arming.
            handle.unsubscribe();
            return;
        }
        *self.handle.lock() = Some(handle);
    }
}

#[async_trait]
impl EventListener for OnceListener {
    async fn handle(&self, event: &Event) -> ListenerResult {
        if self.fired.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            handle.unsubscribe();
        }

        self.inner.handle(event).await
    }
}
