//! # Provider Lifecycle
//!
//! After registration every provider is evaluated once: booted when its
//! `boot_when` predicate holds, deferred otherwise. Each provider then gets a
//! [`ProviderWatcher`] subscribed to block and provider-boot events, which
//! re-evaluates the predicates and boots or disposes the provider as the node
//! changes.
//!
//! ```text
//!   block.applied ─────────┐
//!                          ▼
//!   kernel.provider.booted ──► ProviderWatcher(name) ──► registry.boot/dispose
//!          ▲                                                   │
//!          └─────────────── dispatched after a boot ───────────┘
//! ```
//!
//! Lifecycle calls for one provider never overlap. An event reaching a watcher
//! while it is already evaluating (for example one dispatched from inside the
//! provider's own `boot`) is queued and evaluated once the running evaluation
//! has finished, so a provider can dispatch from its lifecycle hooks.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use kernel_bus::{
    Event, EventDispatcher, EventListener, KernelEvent, ListenerError, ListenerHandle,
    ListenerRef, ListenerResult, BLOCK_APPLIED, PROVIDER_BOOTED,
};

use crate::error::KernelError;
use crate::providers::provider::within;
use crate::providers::{LifecycleOp, ProviderContext, ProviderError, ProviderRef};
use crate::registry::{ProviderStatus, RegistryError, ServiceProviderRegistry};
use crate::shutdown::ShutdownSignal;

/// Boots, defers and disposes registered providers.
pub struct LifecycleController {
    registry: Arc<ServiceProviderRegistry>,
    events: Arc<dyn EventDispatcher>,
    shutdown: ShutdownSignal,
    deadline: Duration,
    watchers: Mutex<Vec<ListenerHandle>>,
}

impl LifecycleController {
    /// Create a controller. Every provider call is bounded by `deadline`.
    pub fn new(
        registry: Arc<ServiceProviderRegistry>,
        events: Arc<dyn EventDispatcher>,
        shutdown: ShutdownSignal,
        deadline: Duration,
    ) -> Self {
        Self {
            registry,
            events,
            shutdown,
            deadline,
            watchers: Mutex::new(Vec::new()),
        }
    }

    /// Evaluate every registered provider once and subscribe its watcher.
    ///
    /// Existing watchers are unsubscribed first, so this is also the second
    /// half of a reboot.
    pub async fn boot_providers(&self) -> Result<(), KernelError> {
        self.detach();

        for (name, status) in self.registry.snapshot() {
            if !matches!(
                status,
                ProviderStatus::Registered | ProviderStatus::Loaded | ProviderStatus::Deferred
            ) {
                continue;
            }

            let watcher = Arc::new(ProviderWatcher {
                name,
                registry: Arc::clone(&self.registry),
                events: Arc::clone(&self.events),
                shutdown: self.shutdown.clone(),
                deadline: self.deadline,
                evaluations: Mutex::new(Evaluations::default()),
            });

            watcher.evaluate(None).await?;
            self.watch(watcher);
        }

        Ok(())
    }

    fn watch(&self, watcher: Arc<ProviderWatcher>) {
        let listener: ListenerRef = watcher;
        let handles = self.events.listen_many(vec![
            (BLOCK_APPLIED.to_string(), Arc::clone(&listener)),
            (PROVIDER_BOOTED.to_string(), listener),
        ]);
        self.watchers.lock().extend(handles);
    }

    /// Unsubscribe every watcher. Returns how many registrations were removed.
    pub fn detach(&self) -> usize {
        let handles: Vec<_> = self.watchers.lock().drain(..).collect();
        handles.iter().filter(|handle| handle.unsubscribe()).count()
    }

    /// Number of active watcher registrations.
    #[must_use]
    pub fn watching(&self) -> usize {
        self.watchers.lock().len()
    }

    /// Dispose every loaded provider, most recently discovered first.
    ///
    /// Errors are logged and returned; disposal continues with the next provider.
    pub async fn dispose_providers(&self) -> Vec<RegistryError> {
        let mut errors = Vec::new();

        for name in self.registry.all_loaded().into_iter().rev() {
            match self.registry.dispose(&name).await {
                Ok(()) => {
                    let (event, payload) = KernelEvent::ProviderDisposed { name }.into_parts();
                    self.events.dispatch(&event, payload).await;
                }
                Err(e) => {
                    warn!(provider = %name, error = %e, "Failed to dispose service provider");
                    errors.push(e);
                }
            }
        }

        errors
    }
}

/// Per-provider listener re-evaluating `boot_when`/`dispose_when`.
pub struct ProviderWatcher {
    name: String,
    registry: Arc<ServiceProviderRegistry>,
    events: Arc<dyn EventDispatcher>,
    shutdown: ShutdownSignal,
    deadline: Duration,
    evaluations: Mutex<Evaluations>,
}

/// Evaluation in progress plus the triggers that arrived during it.
#[derive(Default)]
struct Evaluations {
    running: bool,
    pending: VecDeque<Option<String>>,
}

enum Transition {
    Boot,
    Dispose,
}

impl ProviderWatcher {
    /// Name of the watched provider.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    async fn evaluate(&self, causing: Option<&str>) -> Result<(), KernelError> {
        {
            let mut evaluations = self.evaluations.lock();
            if evaluations.running {
                debug!(provider = %self.name, causing = ?causing, "Evaluation running, queued");
                evaluations.pending.push_back(causing.map(str::to_string));
                return Ok(());
            }
            evaluations.running = true;
        }

        let mut causing = causing.map(str::to_string);
        loop {
            let announcement = match self.step(causing.as_deref()).await {
                Ok(announcement) => announcement,
                Err(err) => {
                    let mut evaluations = self.evaluations.lock();
                    evaluations.running = false;
                    evaluations.pending.clear();
                    return Err(err);
                }
            };

            if let Some(event) = announcement {
                let (event, payload) = event.into_parts();
                self.events.dispatch(&event, payload).await;
            }

            let next = {
                let mut evaluations = self.evaluations.lock();
                let next = evaluations.pending.pop_front();
                if next.is_none() {
                    evaluations.running = false;
                }
                next
            };
            match next {
                Some(next) => causing = next,
                None => return Ok(()),
            }
        }
    }

    async fn step(&self, causing: Option<&str>) -> Result<Option<KernelEvent>, KernelError> {
        let Some(provider) = self.registry.get(&self.name) else {
            return Ok(None);
        };
        let ctx = self.registry.context(&self.name)?;

        match self.registry.status(&self.name) {
            Some(ProviderStatus::Loaded) => {
                let dispose = within(
                    LifecycleOp::DisposeWhen,
                    self.deadline,
                    provider.dispose_when(&ctx, causing),
                )
                .await;

                match dispose {
                    Ok(false) => Ok(None),
                    Ok(true) => match self.registry.dispose(&self.name).await {
                        Ok(()) => Ok(Some(KernelEvent::ProviderDisposed {
                            name: self.name.clone(),
                        })),
                        Err(e) => self.failure(&provider, &ctx, Transition::Dispose, e).await,
                    },
                    Err(e) => {
                        let e = self.provider_error(e);
                        self.failure(&provider, &ctx, Transition::Dispose, e).await
                    }
                }
            }
            Some(status @ (ProviderStatus::Registered | ProviderStatus::Deferred)) => {
                let boot = within(
                    LifecycleOp::BootWhen,
                    self.deadline,
                    provider.boot_when(&ctx, causing),
                )
                .await;

                match boot {
                    Ok(true) => match self.registry.boot(&self.name).await {
                        Ok(()) => Ok(Some(KernelEvent::ProviderBooted {
                            name: self.name.clone(),
                        })),
                        Err(e) => self.failure(&provider, &ctx, Transition::Boot, e).await,
                    },
                    Ok(false) if status == ProviderStatus::Registered => {
                        self.registry.defer(&self.name)?;
                        info!(provider = %self.name, "Deferred service provider");
                        Ok(Some(KernelEvent::ProviderDeferred {
                            name: self.name.clone(),
                        }))
                    }
                    Ok(false) => Ok(None),
                    Err(e) => {
                        let e = self.provider_error(e);
                        self.failure(&provider, &ctx, Transition::Boot, e).await
                    }
                }
            }
            Some(ProviderStatus::Failed | ProviderStatus::Unregistered) | None => Ok(None),
        }
    }

    fn provider_error(&self, source: ProviderError) -> RegistryError {
        RegistryError::Provider {
            name: self.name.clone(),
            source,
        }
    }

    async fn failure(
        &self,
        provider: &ProviderRef,
        ctx: &ProviderContext,
        transition: Transition,
        source: RegistryError,
    ) -> Result<Option<KernelEvent>, KernelError> {
        let required = within(LifecycleOp::Required, self.deadline, provider.required(ctx))
            .await
            .unwrap_or(true);

        self.registry.fail(&self.name)?;

        if required {
            let name = self.name.clone();
            return Err(match transition {
                Transition::Boot => KernelError::BootFailed { name, source },
                Transition::Dispose => KernelError::DisposeFailed { name, source },
            });
        }

        warn!(provider = %self.name, error = %source, "Optional service provider failed");
        Ok(Some(KernelEvent::ProviderFailed {
            name: self.name.clone(),
            reason: source.to_string(),
        }))
    }
}

#[async_trait]
impl EventListener for ProviderWatcher {
    async fn handle(&self, event: &Event) -> ListenerResult {
        let causing = match KernelEvent::parse(event) {
            Some(KernelEvent::BlockApplied(_)) => None,
            // Own announcement: the evaluation that booted the provider already ran.
            Some(KernelEvent::ProviderBooted { name }) if name == self.name => return Ok(()),
            Some(KernelEvent::ProviderBooted { name }) => Some(name),
            _ => {
                debug!(provider = %self.name, event = %event.name, "Ignoring event");
                return Ok(());
            }
        };

        match self.evaluate(causing.as_deref()).await {
            Ok(()) => Ok(()),
            Err(err) => {
                error!(provider = %self.name, error = %err, "Required service provider failed");
                self.shutdown.request(err.to_string());
                Err(ListenerError::Other(anyhow::Error::new(err)))
            }
        }
    }
}
