//! # Service Provider Registry
//!
//! Holds every discovered provider together with its resolved configuration
//! and lifecycle status. Insertion order is discovery order; teardown walks it
//! in reverse.
//!
//! ```text
//!                 register()            boot()
//! Unregistered ───────────────► Registered ─────────► Loaded
//!       │                           │                 ▲   │
//!       │ fail()                    │ defer()  boot() │   │ dispose()
//!       ▼                           ▼                 │   ▼
//!    Failed ◄──────────────────── Deferred ◄──────────────┘
//!  (absorbing)        fail()
//! ```
//!
//! The registry only performs the transition it is asked for. Deciding *when*
//! to boot or dispose belongs to the lifecycle controller; deciding whether a
//! failure is fatal belongs to its caller. Provider errors are always returned.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use kernel_bus::EventDispatcher;
use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, info};

use crate::providers::provider::within;
use crate::providers::{LifecycleOp, ProviderConfig, ProviderContext, ProviderError, ProviderRef};

/// Lifecycle status of a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderStatus {
    /// Discovered, not registered (filtered out or not yet processed).
    Unregistered,
    /// Registered, not yet evaluated for boot.
    Registered,
    /// Booted and running.
    Loaded,
    /// Registered but not running. May boot on a later event.
    Deferred,
    /// Excluded from any further lifecycle evaluation.
    Failed,
}

impl fmt::Display for ProviderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unregistered => "unregistered",
            Self::Registered => "registered",
            Self::Loaded => "loaded",
            Self::Deferred => "deferred",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Registry errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No provider with this name was discovered.
    #[error("Service provider {0} is not known to the registry")]
    UnknownProvider(String),

    /// A provider with this name was already discovered.
    #[error("Service provider {0} is already registered")]
    Duplicate(String),

    /// `boot` on a provider that is already running.
    #[error("Service provider {0} is already loaded")]
    AlreadyLoaded(String),

    /// `dispose` on a provider that is not running.
    #[error("Service provider {0} is not loaded")]
    NotLoaded(String),

    /// The provider's own lifecycle call failed.
    #[error("Service provider {name} failed: {source}")]
    Provider {
        /// Provider name.
        name: String,
        /// Error returned by the provider.
        #[source]
        source: ProviderError,
    },
}

impl RegistryError {
    /// Name of the provider the error is about.
    #[must_use]
    pub fn provider(&self) -> Option<&str> {
        match self {
            Self::UnknownProvider(name)
            | Self::Duplicate(name)
            | Self::AlreadyLoaded(name)
            | Self::NotLoaded(name)
            | Self::Provider { name, .. } => Some(name),
        }
    }
}

struct Entry {
    provider: ProviderRef,
    config: RwLock<ProviderConfig>,
    status: RwLock<ProviderStatus>,
    /// Serializes lifecycle calls into the provider.
    gate: tokio::sync::Mutex<()>,
}

impl Entry {
    fn status(&self) -> ProviderStatus {
        *self.status.read()
    }

    fn set_status(&self, status: ProviderStatus) {
        *self.status.write() = status;
    }
}

/// The central provider registry.
pub struct ServiceProviderRegistry {
    entries: RwLock<IndexMap<String, Arc<Entry>>>,
    events: Arc<dyn EventDispatcher>,
    deadline: Duration,
}

impl ServiceProviderRegistry {
    /// Create an empty registry. Every provider call is bounded by `deadline`.
    pub fn new(events: Arc<dyn EventDispatcher>, deadline: Duration) -> Self {
        Self {
            entries: RwLock::new(IndexMap::new()),
            events,
            deadline,
        }
    }

    /// Add a discovered provider with its resolved configuration.
    pub fn insert(&self, provider: ProviderRef, config: ProviderConfig) -> Result<(), RegistryError> {
        let name = provider.name().to_string();
        let mut entries = self.entries.write();
        if entries.contains_key(&name) {
            return Err(RegistryError::Duplicate(name));
        }

        debug!(provider = %name, "Discovered service provider");
        entries.insert(
            name,
            Arc::new(Entry {
                provider,
                config: RwLock::new(config),
                status: RwLock::new(ProviderStatus::Unregistered),
                gate: tokio::sync::Mutex::new(()),
            }),
        );
        Ok(())
    }

    fn entry(&self, name: &str) -> Result<Arc<Entry>, RegistryError> {
        self.entries
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownProvider(name.to_string()))
    }

    fn context_for(&self, name: &str, entry: &Entry) -> ProviderContext {
        ProviderContext::new(name, entry.config.read().clone(), Arc::clone(&self.events))
    }

    /// Call `register()` on the provider. Success moves it to `Registered`.
    pub async fn register(&self, name: &str) -> Result<(), RegistryError> {
        let entry = self.entry(name)?;
        let _gate = entry.gate.lock().await;

        let ctx = self.context_for(name, &entry);
        self.call(name, LifecycleOp::Register, entry.provider.register(&ctx))
            .await?;

        entry.set_status(ProviderStatus::Registered);
        info!(provider = %name, "Registered service provider");
        Ok(())
    }

    /// Call `boot()` on the provider. Success moves it to `Loaded`.
    pub async fn boot(&self, name: &str) -> Result<(), RegistryError> {
        let entry = self.entry(name)?;
        let _gate = entry.gate.lock().await;

        if entry.status() == ProviderStatus::Loaded {
            return Err(RegistryError::AlreadyLoaded(name.to_string()));
        }

        let ctx = self.context_for(name, &entry);
        self.call(name, LifecycleOp::Boot, entry.provider.boot(&ctx))
            .await?;

        entry.set_status(ProviderStatus::Loaded);
        info!(provider = %name, "Booted service provider");
        Ok(())
    }

    /// Call `dispose()` on the provider. Success moves it to `Deferred`.
    pub async fn dispose(&self, name: &str) -> Result<(), RegistryError> {
        let entry = self.entry(name)?;
        let _gate = entry.gate.lock().await;

        if entry.status() != ProviderStatus::Loaded {
            return Err(RegistryError::NotLoaded(name.to_string()));
        }

        let ctx = self.context_for(name, &entry);
        self.call(name, LifecycleOp::Dispose, entry.provider.dispose(&ctx))
            .await?;

        entry.set_status(ProviderStatus::Deferred);
        info!(provider = %name, "Disposed service provider");
        Ok(())
    }

    async fn call(
        &self,
        name: &str,
        operation: LifecycleOp,
        call: impl std::future::Future<Output = Result<(), ProviderError>>,
    ) -> Result<(), RegistryError> {
        within(operation, self.deadline, call)
            .await
            .and_then(|result| result)
            .map_err(|source| RegistryError::Provider {
                name: name.to_string(),
                source,
            })
    }

    /// Mark the provider as failed. Idempotent.
    pub fn fail(&self, name: &str) -> Result<(), RegistryError> {
        let entry = self.entry(name)?;
        if entry.status() != ProviderStatus::Failed {
            entry.set_status(ProviderStatus::Failed);
            debug!(provider = %name, "Marked service provider as failed");
        }
        Ok(())
    }

    /// Mark the provider as deferred. Idempotent; never overrides `Failed`.
    pub fn defer(&self, name: &str) -> Result<(), RegistryError> {
        let entry = self.entry(name)?;
        match entry.status() {
            ProviderStatus::Failed | ProviderStatus::Deferred => Ok(()),
            ProviderStatus::Loaded => Err(RegistryError::AlreadyLoaded(name.to_string())),
            ProviderStatus::Unregistered | ProviderStatus::Registered => {
                entry.set_status(ProviderStatus::Deferred);
                debug!(provider = %name, "Deferred service provider");
                Ok(())
            }
        }
    }

    /// Replace the provider's resolved configuration.
    pub fn set_config(&self, name: &str, config: ProviderConfig) -> Result<(), RegistryError> {
        let entry = self.entry(name)?;
        *entry.config.write() = config;
        Ok(())
    }

    /// Whether the provider was discovered, whatever its status.
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    /// Current status, `None` for unknown providers.
    #[must_use]
    pub fn status(&self, name: &str) -> Option<ProviderStatus> {
        self.entries.read().get(name).map(|entry| entry.status())
    }

    /// Whether the provider is running.
    #[must_use]
    pub fn loaded(&self, name: &str) -> bool {
        self.status(name) == Some(ProviderStatus::Loaded)
    }

    /// Whether the provider failed.
    #[must_use]
    pub fn failed(&self, name: &str) -> bool {
        self.status(name) == Some(ProviderStatus::Failed)
    }

    /// Whether the provider is deferred.
    #[must_use]
    pub fn deferred(&self, name: &str) -> bool {
        self.status(name) == Some(ProviderStatus::Deferred)
    }

    /// Whether the provider registered and has not failed.
    #[must_use]
    pub fn registered(&self, name: &str) -> bool {
        matches!(
            self.status(name),
            Some(ProviderStatus::Registered | ProviderStatus::Loaded | ProviderStatus::Deferred)
        )
    }

    /// The provider itself.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<ProviderRef> {
        self.entries
            .read()
            .get(name)
            .map(|entry| Arc::clone(&entry.provider))
    }

    /// The provider's resolved configuration.
    #[must_use]
    pub fn config(&self, name: &str) -> Option<ProviderConfig> {
        self.entries
            .read()
            .get(name)
            .map(|entry| entry.config.read().clone())
    }

    /// Build the context handed to the provider's lifecycle calls.
    pub fn context(&self, name: &str) -> Result<ProviderContext, RegistryError> {
        let entry = self.entry(name)?;
        Ok(self.context_for(name, &entry))
    }

    /// All providers in discovery order.
    #[must_use]
    pub fn providers(&self) -> Vec<(String, ProviderRef)> {
        self.entries
            .read()
            .iter()
            .map(|(name, entry)| (name.clone(), Arc::clone(&entry.provider)))
            .collect()
    }

    /// Names with the given status, in discovery order.
    #[must_use]
    pub fn names_with(&self, status: ProviderStatus) -> Vec<String> {
        self.entries
            .read()
            .iter()
            .filter(|(_, entry)| entry.status() == status)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Running providers in discovery order.
    #[must_use]
    pub fn all_loaded(&self) -> Vec<String> {
        self.names_with(ProviderStatus::Loaded)
    }

    /// Every provider with its status, in discovery order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(String, ProviderStatus)> {
        self.entries
            .read()
            .iter()
            .map(|(name, entry)| (name.clone(), entry.status()))
            .collect()
    }

    /// Number of discovered providers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether no provider was discovered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Print registry status.
    pub fn print_status(&self) {
        info!("===========================================");
        info!("  SERVICE PROVIDER STATUS");
        info!("===========================================");

        for (name, status) in self.snapshot() {
            let icon = match status {
                ProviderStatus::Loaded => "✅",
                ProviderStatus::Deferred => "⏸️ ",
                ProviderStatus::Failed => "❌",
                ProviderStatus::Unregistered => "⏹️ ",
                ProviderStatus::Registered => "⏳",
            };
            info!("  {} {:30} {}", icon, name, status);
        }

        info!("===========================================");
    }
}

impl fmt::Debug for ServiceProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceProviderRegistry")
            .field("providers", &self.snapshot())
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}
