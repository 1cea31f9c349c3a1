//! # Service Provider
//!
//! The contract every pluggable unit implements. A provider owns one piece of
//! node functionality and is driven through `register -> boot -> dispose` by
//! the kernel. Whether it is booted at all, and when it is disposed again, is
//! decided by its `boot_when`/`dispose_when` predicates, which the kernel
//! re-evaluates whenever a block is applied or another provider boots.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kernel_bus::EventDispatcher;
use serde_json::{Map, Value};
use thiserror::Error;

use super::config::ProviderConfig;
use super::manifest::ProviderManifest;
use super::schema::ConfigSchema;

/// Provider lifecycle step, used to label deadlines and errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleOp {
    /// `required()`
    Required,
    /// `register()`
    Register,
    /// `boot()`
    Boot,
    /// `dispose()`
    Dispose,
    /// `boot_when()`
    BootWhen,
    /// `dispose_when()`
    DisposeWhen,
}

impl fmt::Display for LifecycleOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Required => "required",
            Self::Register => "register",
            Self::Boot => "boot",
            Self::Dispose => "dispose",
            Self::BootWhen => "boot_when",
            Self::DisposeWhen => "dispose_when",
        };
        f.write_str(name)
    }
}

/// Error raised by a provider lifecycle call.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider reported a failure.
    #[error("{0}")]
    Failed(String),

    /// The call did not complete within the lifecycle deadline.
    #[error("{operation} did not complete within {after:?}")]
    Timeout {
        /// Step that timed out.
        operation: LifecycleOp,
        /// Deadline that elapsed.
        after: Duration,
    },

    /// Any other failure raised inside the provider.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ProviderError {
    /// Shorthand for [`ProviderError::Failed`].
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Everything a provider may touch during a lifecycle call.
#[derive(Clone)]
pub struct ProviderContext {
    name: String,
    config: ProviderConfig,
    events: Arc<dyn EventDispatcher>,
}

impl ProviderContext {
    /// Build a context.
    pub fn new(name: impl Into<String>, config: ProviderConfig, events: Arc<dyn EventDispatcher>) -> Self {
        Self {
            name: name.into(),
            config,
            events,
        }
    }

    /// Name of the provider this context belongs to.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The provider's resolved configuration.
    #[must_use]
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// The kernel's event dispatcher.
    #[must_use]
    pub fn events(&self) -> &Arc<dyn EventDispatcher> {
        &self.events
    }
}

impl fmt::Debug for ProviderContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderContext")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// A pluggable unit of node functionality.
#[async_trait]
pub trait ServiceProvider: Send + Sync {
    /// Static identity and dependencies.
    fn manifest(&self) -> &ProviderManifest;

    /// Registry key.
    fn name(&self) -> &str {
        &self.manifest().name
    }

    /// Schema the resolved configuration must satisfy.
    fn config_schema(&self) -> Option<ConfigSchema> {
        None
    }

    /// Configuration defaults, overlaid by discovery options and overrides.
    fn config_defaults(&self) -> Map<String, Value> {
        Map::new()
    }

    /// Whether a failure of this provider must abort startup.
    async fn required(&self, _ctx: &ProviderContext) -> bool {
        self.manifest().required
    }

    /// Register services. Runs once, before any boot.
    async fn register(&self, ctx: &ProviderContext) -> Result<(), ProviderError>;

    /// Start the provider.
    async fn boot(&self, ctx: &ProviderContext) -> Result<(), ProviderError>;

    /// Stop the provider. It may be booted again later.
    async fn dispose(&self, ctx: &ProviderContext) -> Result<(), ProviderError>;

    /// Whether the provider should be running. `causing` names the provider
    /// whose boot triggered this evaluation, if any.
    async fn boot_when(&self, _ctx: &ProviderContext, _causing: Option<&str>) -> bool {
        true
    }

    /// Whether a running provider should be stopped.
    async fn dispose_when(&self, _ctx: &ProviderContext, _causing: Option<&str>) -> bool {
        false
    }
}

/// Shared provider reference.
pub type ProviderRef = Arc<dyn ServiceProvider>;

/// Run a provider call under the lifecycle deadline.
pub(crate) async fn within<T>(
    operation: LifecycleOp,
    limit: Duration,
    call: impl Future<Output = T>,
) -> Result<T, ProviderError> {
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| ProviderError::Timeout {
            operation,
            after: limit,
        })
}
