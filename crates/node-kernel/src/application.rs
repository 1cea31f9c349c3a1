//! # Kernel
//!
//! The application value tying the event dispatcher, the provider registry and
//! the bootstrap stages together. There is no global instance: the binary
//! builds one `Kernel` and hands references to whoever needs them.
//!
//! ## Startup Sequence
//!
//! 1. Discover providers ([`Kernel::add_provider`] / [`Kernel::load_catalog`])
//! 2. `register` stage: validate configuration and dependencies, register
//! 3. `boot` stage: boot or defer, subscribe lifecycle watchers
//!
//! Each stage is announced with `kernel.bootstrapping` / `kernel.bootstrapped`;
//! [`Kernel::before_bootstrapping`] and [`Kernel::after_bootstrapping`] hook a
//! single stage. A fatal error terminates the kernel before it is returned.
//!
//! Maintenance mode is an in-memory flag announced on `kernel.maintenance`.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use kernel_bus::events::{BOOTSTRAPPED, BOOTSTRAPPING};
use kernel_bus::{
    Event, EventDispatcher, EventListener, KernelEvent, ListenerHandle, ListenerRef,
    ListenerResult,
};

use crate::bootstrap::{LifecycleController, RegistrationPipeline};
use crate::config::KernelConfig;
use crate::error::KernelError;
use crate::providers::{
    ConfigValidator, ProviderCatalog, ProviderConfig, ProviderRef, SchemaValidator,
    SemverChecker, VersionChecker,
};
use crate::registry::ServiceProviderRegistry;
use crate::shutdown::ShutdownSignal;

/// Builder for [`Kernel`] with replaceable collaborators.
pub struct KernelBuilder {
    config: KernelConfig,
    events: Option<Arc<dyn EventDispatcher>>,
    validator: Option<Arc<dyn ConfigValidator>>,
    versions: Option<Arc<dyn VersionChecker>>,
    shutdown: Option<ShutdownSignal>,
}

impl KernelBuilder {
    /// Use this dispatcher instead of the configured driver.
    #[must_use]
    pub fn events(mut self, events: Arc<dyn EventDispatcher>) -> Self {
        self.events = Some(events);
        self
    }

    /// Use this configuration validator.
    #[must_use]
    pub fn validator(mut self, validator: Arc<dyn ConfigValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Use this version checker.
    #[must_use]
    pub fn version_checker(mut self, versions: Arc<dyn VersionChecker>) -> Self {
        self.versions = Some(versions);
        self
    }

    /// Share an existing shutdown signal.
    #[must_use]
    pub fn shutdown(mut self, shutdown: ShutdownSignal) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Validate the configuration and build the kernel.
    pub fn build(self) -> Result<Kernel, KernelError> {
        self.config.validate()?;

        let events = self
            .events
            .unwrap_or_else(|| self.config.dispatcher.create());
        let shutdown = self.shutdown.unwrap_or_default();
        let registry = Arc::new(ServiceProviderRegistry::new(
            Arc::clone(&events),
            self.config.lifecycle_timeout,
        ));
        let lifecycle = LifecycleController::new(
            Arc::clone(&registry),
            Arc::clone(&events),
            shutdown.clone(),
            self.config.lifecycle_timeout,
        );

        info!(
            driver = %self.config.dispatcher,
            lifecycle_timeout = ?self.config.lifecycle_timeout,
            "Creating node kernel"
        );

        Ok(Kernel {
            config: self.config,
            events,
            registry,
            validator: self.validator.unwrap_or_else(|| Arc::new(SchemaValidator)),
            versions: self.versions.unwrap_or_else(|| Arc::new(SemverChecker)),
            lifecycle,
            shutdown,
            booted: AtomicBool::new(false),
            maintenance: AtomicBool::new(false),
        })
    }
}

/// The node kernel.
pub struct Kernel {
    config: KernelConfig,
    events: Arc<dyn EventDispatcher>,
    registry: Arc<ServiceProviderRegistry>,
    validator: Arc<dyn ConfigValidator>,
    versions: Arc<dyn VersionChecker>,
    lifecycle: LifecycleController,
    shutdown: ShutdownSignal,
    booted: AtomicBool,
    maintenance: AtomicBool,
}

impl Kernel {
    /// Build a kernel with default collaborators.
    pub fn new(config: KernelConfig) -> Result<Self, KernelError> {
        Self::builder(config).build()
    }

    /// Start building a kernel.
    #[must_use]
    pub fn builder(config: KernelConfig) -> KernelBuilder {
        KernelBuilder {
            config,
            events: None,
            validator: None,
            versions: None,
            shutdown: None,
        }
    }

    /// Discover a provider.
    ///
    /// Its configuration is its defaults, overlaid by `options`, overlaid by the
    /// kernel-level overrides for its name.
    pub fn add_provider(&self, provider: ProviderRef, options: &Value) -> Result<(), KernelError> {
        let name = provider.name().to_string();
        let config = ProviderConfig::resolve(
            provider.config_defaults(),
            &[options, self.config.overrides_for(&name)],
        );
        self.registry.insert(provider, config)?;
        Ok(())
    }

    /// Discover every `(package, options)` pair through `catalog`.
    pub fn load_catalog(
        &self,
        catalog: &ProviderCatalog,
        packages: &[(String, Value)],
    ) -> Result<(), KernelError> {
        for (package, options) in packages {
            let provider = catalog.resolve(package, options)?;
            info!(package = %package, provider = %provider.name(), "Loaded provider package");
            self.add_provider(provider, options)?;
        }
        Ok(())
    }

    /// Register and boot the discovered providers.
    pub async fn bootstrap(&self) -> Result<(), KernelError> {
        info!(providers = self.registry.len(), "Bootstrapping node kernel");

        if let Err(err) = self.run_stages().await {
            self.terminate(Some("bootstrap failed"), Some(&err)).await;
            return Err(err);
        }

        self.booted.store(true, Ordering::Release);
        info!(loaded = self.registry.all_loaded().len(), "Node kernel bootstrapped");
        Ok(())
    }

    async fn run_stages(&self) -> Result<(), KernelError> {
        self.stage("register", async {
            let pipeline = RegistrationPipeline::new(
                &self.registry,
                self.events.as_ref(),
                &self.config,
                self.validator.as_ref(),
                self.versions.as_ref(),
            );
            pipeline.run().await.map(|_| ())
        })
        .await?;

        self.stage("boot", self.lifecycle.boot_providers()).await
    }

    async fn stage<F>(&self, stage: &str, work: F) -> Result<(), KernelError>
    where
        F: Future<Output = Result<(), KernelError>>,
    {
        self.announce(KernelEvent::Bootstrapping {
            stage: stage.to_string(),
        })
        .await;

        work.await?;

        self.announce(KernelEvent::Bootstrapped {
            stage: stage.to_string(),
        })
        .await;
        Ok(())
    }

    async fn announce(&self, event: KernelEvent) {
        let (name, payload) = event.into_parts();
        self.events.dispatch(&name, payload).await;
    }

    /// Dispose every loaded provider and run the boot stage again.
    pub async fn reboot(&self) -> Result<(), KernelError> {
        info!("Rebooting node kernel");
        self.booted.store(false, Ordering::Release);
        self.lifecycle.detach();
        self.lifecycle.dispose_providers().await;

        if let Err(err) = self.stage("boot", self.lifecycle.boot_providers()).await {
            self.terminate(Some("reboot failed"), Some(&err)).await;
            return Err(err);
        }

        self.booted.store(true, Ordering::Release);
        info!("Node kernel rebooted");
        Ok(())
    }

    /// Stop the kernel: dispose loaded providers in reverse discovery order and
    /// request process shutdown. Disposal errors are logged only.
    pub async fn terminate(&self, reason: Option<&str>, error: Option<&KernelError>) {
        self.booted.store(false, Ordering::Release);

        match error {
            Some(err) => error!(reason = ?reason, error = %err, "Terminating node kernel"),
            None => info!(reason = ?reason, "Terminating node kernel"),
        }

        self.announce(KernelEvent::Terminating {
            reason: reason.map(str::to_string),
        })
        .await;

        self.lifecycle.detach();
        let failures = self.lifecycle.dispose_providers().await;
        if !failures.is_empty() {
            warn!(failures = failures.len(), "Some service providers failed to dispose");
        }

        self.shutdown.request(reason.unwrap_or("terminated"));
    }

    /// Run `listener` when `stage` is about to start.
    pub fn before_bootstrapping(&self, stage: &str, listener: ListenerRef) -> ListenerHandle {
        self.events.listen(BOOTSTRAPPING, StageListener::wrap(stage, listener))
    }

    /// Run `listener` once `stage` has completed.
    pub fn after_bootstrapping(&self, stage: &str, listener: ListenerRef) -> ListenerHandle {
        self.events.listen(BOOTSTRAPPED, StageListener::wrap(stage, listener))
    }

    /// Put the node into maintenance mode.
    pub async fn enable_maintenance(&self) {
        self.set_maintenance(true).await;
    }

    /// Bring the node out of maintenance mode.
    pub async fn disable_maintenance(&self) {
        self.set_maintenance(false).await;
    }

    async fn set_maintenance(&self, enabled: bool) {
        if self.maintenance.swap(enabled, Ordering::AcqRel) == enabled {
            debug!(enabled, "Maintenance mode unchanged");
            return;
        }
        info!(enabled, "Maintenance mode changed");
        self.announce(KernelEvent::Maintenance(enabled)).await;
    }

    #[must_use]
    pub fn is_down_for_maintenance(&self) -> bool {
        self.maintenance.load(Ordering::Acquire)
    }

    /// Whether bootstrap completed and the kernel has not terminated since.
    #[must_use]
    pub fn is_booted(&self) -> bool {
        self.booted.load(Ordering::Acquire)
    }

    /// The event dispatcher.
    #[must_use]
    pub fn events(&self) -> &Arc<dyn EventDispatcher> {
        &self.events
    }

    /// The provider registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<ServiceProviderRegistry> {
        &self.registry
    }

    /// The shutdown signal.
    #[must_use]
    pub fn shutdown(&self) -> &ShutdownSignal {
        &self.shutdown
    }

    /// The kernel configuration.
    #[must_use]
    pub fn config(&self) -> &KernelConfig {
        &self.config
    }
}

/// Forwards stage announcements for one stage only.
struct StageListener {
    stage: String,
    inner: ListenerRef,
}

impl StageListener {
    fn wrap(stage: &str, inner: ListenerRef) -> ListenerRef {
        Arc::new(Self {
            stage: stage.to_string(),
            inner,
        })
    }
}

#[async_trait]
impl EventListener for StageListener {
    async fn handle(&self, event: &Event) -> ListenerResult {
        if event.str_field("stage") != Some(self.stage.as_str()) {
            return Ok(());
        }
        self.inner.handle(event).await
    }
}
