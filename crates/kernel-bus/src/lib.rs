//! # Kernel Bus - Event Dispatcher for the Node Kernel
//!
//! Pattern-matching publish/subscribe router. The service-provider lifecycle
//! is driven by it, and every other part of the node may use it as a plain
//! notification bus: it knows nothing about providers.
//!
//! ```text
//!   dispatch("block.applied")
//!            │
//!            ▼
//!   ┌──────────────────┐   "*"            ┌────────────┐
//!   │ EventDispatcher  │ ───────────────→ │ listener 1 │
//!   │                  │   "block.*"      ├────────────┤
//!   │  pattern → [..]  │ ───────────────→ │ listener 2 │
//!   │                  │   "block.applied"├────────────┤
//!   │                  │ ───────────────→ │ listener 3 │
//!   └──────────────────┘                  └────────────┘
//! ```
//!
//! Listeners are invoked in registration order regardless of which pattern
//! matched. See [`dispatcher`] for the three dispatch modes.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod dispatcher;
pub mod driver;
pub mod events;
pub mod listener;
pub mod pattern;

// Re-export main types
pub use dispatcher::{DispatchError, EventDispatcher, MemoryEventDispatcher};
pub use driver::{DispatcherDriver, DriverError};
pub use events::{Event, KernelEvent, BLOCK_APPLIED, PROVIDER_BOOTED};
pub use listener::{
    listener_fn, EventListener, ListenerError, ListenerHandle, ListenerId, ListenerRef,
    ListenerResult,
};
pub use pattern::{EventPattern, WILDCARD};
