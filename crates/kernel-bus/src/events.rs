//! # Kernel Events
//!
//! The dispatcher itself only knows about [`Event`]: a name plus an opaque JSON
//! payload. Event names owned by the kernel are listed here together with the
//! typed [`KernelEvent`] view over their payloads, so producers and consumers
//! agree on one shape per event.

use serde_json::{json, Value};

/// Emitted by the node every time a block has been applied to state.
pub const BLOCK_APPLIED: &str = "block.applied";

/// A service provider finished booting. Payload: `{"name": string}`.
pub const PROVIDER_BOOTED: &str = "kernel.provider.booted";

/// A service provider was disposed. Payload: `{"name": string}`.
pub const PROVIDER_DISPOSED: &str = "kernel.provider.disposed";

/// A service provider was registered but not booted. Payload: `{"name": string}`.
pub const PROVIDER_DEFERRED: &str = "kernel.provider.deferred";

/// A service provider was marked as failed. Payload: `{"name": string, "reason": string}`.
pub const PROVIDER_FAILED: &str = "kernel.provider.failed";

/// A bootstrap stage is about to run. Payload: `{"stage": string}`.
pub const BOOTSTRAPPING: &str = "kernel.bootstrapping";

/// A bootstrap stage completed. Payload: `{"stage": string}`.
pub const BOOTSTRAPPED: &str = "kernel.bootstrapped";

/// The kernel is shutting down. Payload: `{"reason": string | null}`.
pub const TERMINATING: &str = "kernel.terminating";

/// Maintenance mode was switched. Payload: `true` when entering, `false` when leaving.
pub const MAINTENANCE: &str = "kernel.maintenance";

/// An event as seen by listeners.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// The concrete event name (never a pattern).
    pub name: String,
    /// Event payload, `Value::Null` when the producer has nothing to attach.
    pub payload: Value,
}

impl Event {
    /// Create a new event.
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }

    /// Read a string field from an object payload.
    #[must_use]
    pub fn str_field(&self, field: &str) -> Option<&str> {
        self.payload.get(field).and_then(Value::as_str)
    }
}

/// Typed view over the events the kernel emits and consumes.
#[derive(Debug, Clone, PartialEq)]
pub enum KernelEvent {
    /// A block was applied. The payload is owned by the node and passed through.
    BlockApplied(Value),
    /// A provider booted.
    ProviderBooted { name: String },
    /// A provider was disposed.
    ProviderDisposed { name: String },
    /// A provider was deferred.
    ProviderDeferred { name: String },
    /// A provider failed and is excluded from further evaluation.
    ProviderFailed { name: String, reason: String },
    /// A bootstrap stage is starting.
    Bootstrapping { stage: String },
    /// A bootstrap stage finished.
    Bootstrapped { stage: String },
    /// The kernel is terminating.
    Terminating { reason: Option<String> },
    /// The node entered (`true`) or left (`false`) maintenance mode.
    Maintenance(bool),
}

impl KernelEvent {
    /// The event name this variant is dispatched under.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::BlockApplied(_) => BLOCK_APPLIED,
            Self::ProviderBooted { .. } => PROVIDER_BOOTED,
            Self::ProviderDisposed { .. } => PROVIDER_DISPOSED,
            Self::ProviderDeferred { .. } => PROVIDER_DEFERRED,
            Self::ProviderFailed { .. } => PROVIDER_FAILED,
            Self::Bootstrapping { .. } => BOOTSTRAPPING,
            Self::Bootstrapped { .. } => BOOTSTRAPPED,
            Self::Terminating { .. } => TERMINATING,
            Self::Maintenance(_) => MAINTENANCE,
        }
    }

    /// Serialize the payload for dispatch.
    #[must_use]
    pub fn payload(&self) -> Value {
        match self {
            Self::BlockApplied(block) => block.clone(),
            Self::ProviderBooted { name }
            | Self::ProviderDisposed { name }
            | Self::ProviderDeferred { name } => json!({ "name": name }),
            Self::ProviderFailed { name, reason } => json!({ "name": name, "reason": reason }),
            Self::Bootstrapping { stage } | Self::Bootstrapped { stage } => {
                json!({ "stage": stage })
            }
            Self::Terminating { reason } => json!({ "reason": reason }),
            Self::Maintenance(enabled) => Value::Bool(*enabled),
        }
    }

    /// Convert into a dispatchable `(name, payload)` pair.
    #[must_use]
    pub fn into_parts(self) -> (String, Value) {
        (self.name().to_string(), self.payload())
    }

    /// Interpret an event as a kernel event.
    ///
    /// Returns `None` for names the kernel does not own or for payloads that
    /// violate the documented shape.
    #[must_use]
    pub fn parse(event: &Event) -> Option<Self> {
        let name = || event.str_field("name").map(str::to_string);
        let stage = || event.str_field("stage").map(str::to_string);

        match event.name.as_str() {
            BLOCK_APPLIED => Some(Self::BlockApplied(event.payload.clone())),
            PROVIDER_BOOTED => name().map(|name| Self::ProviderBooted { name }),
            PROVIDER_DISPOSED => name().map(|name| Self::ProviderDisposed { name }),
            PROVIDER_DEFERRED => name().map(|name| Self::ProviderDeferred { name }),
            PROVIDER_FAILED => Some(Self::ProviderFailed {
                name: name()?,
                reason: event.str_field("reason").unwrap_or_default().to_string(),
            }),
            BOOTSTRAPPING => stage().map(|stage| Self::Bootstrapping { stage }),
            BOOTSTRAPPED => stage().map(|stage| Self::Bootstrapped { stage }),
            TERMINATING => Some(Self::Terminating {
                reason: event.str_field("reason").map(str::to_string),
            }),
            MAINTENANCE => event.payload.as_bool().map(Self::Maintenance),
            _ => None,
        }
    }
}

impl From<KernelEvent> for Event {
    fn from(event: KernelEvent) -> Self {
        let (name, payload) = event.into_parts();
        Self { name, payload }
    }
}
