//! # Registration Pipeline
//!
//! Runs once per bootstrap, over the discovered providers in discovery order:
//!
//! 1. include/exclude filters
//! 2. requiredness (`ServiceProvider::required`)
//! 3. configuration schema validation
//! 4. dependency presence and version ranges
//! 5. `register()`
//!
//! A failing optional provider is marked failed and skipped. A failing required
//! provider stops the pipeline with the error that describes it.

use tracing::{debug, info, warn};

use kernel_bus::{EventDispatcher, KernelEvent};

use crate::config::KernelConfig;
use crate::error::KernelError;
use crate::providers::provider::within;
use crate::providers::{
    ConfigValidator, LifecycleOp, ProviderConfig, ProviderRef, VersionChecker,
};
use crate::registry::{ProviderStatus, ServiceProviderRegistry};

/// What happened to the providers during one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationReport {
    /// Providers that registered successfully.
    pub registered: Vec<String>,
    /// Optional providers that were marked failed.
    pub failed: Vec<String>,
    /// Providers filtered out by include/exclude.
    pub skipped: Vec<String>,
}

enum Outcome {
    Registered,
    Failed,
}

/// Validates and registers discovered providers.
pub struct RegistrationPipeline<'a> {
    registry: &'a ServiceProviderRegistry,
    events: &'a dyn EventDispatcher,
    config: &'a KernelConfig,
    validator: &'a dyn ConfigValidator,
    versions: &'a dyn VersionChecker,
}

impl<'a> RegistrationPipeline<'a> {
    /// Create a pipeline over `registry`.
    pub fn new(
        registry: &'a ServiceProviderRegistry,
        events: &'a dyn EventDispatcher,
        config: &'a KernelConfig,
        validator: &'a dyn ConfigValidator,
        versions: &'a dyn VersionChecker,
    ) -> Self {
        Self {
            registry,
            events,
            config,
            validator,
            versions,
        }
    }

    /// Register every provider that has not been processed yet.
    pub async fn run(&self) -> Result<RegistrationReport, KernelError> {
        let mut report = RegistrationReport::default();

        for (name, provider) in self.registry.providers() {
            if self.registry.status(&name) != Some(ProviderStatus::Unregistered) {
                continue;
            }

            if !self.config.is_enabled(&name) {
                debug!(provider = %name, "Skipping filtered service provider");
                report.skipped.push(name);
                continue;
            }

            match self.register_one(&name, &provider).await? {
                Outcome::Registered => report.registered.push(name),
                Outcome::Failed => report.failed.push(name),
            }
        }

        info!(
            registered = report.registered.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            "Service provider registration complete"
        );
        Ok(report)
    }

    async fn register_one(&self, name: &str, provider: &ProviderRef) -> Result<Outcome, KernelError> {
        let deadline = self.config.lifecycle_timeout;
        let ctx = self.registry.context(name)?;

        let required = within(LifecycleOp::Required, deadline, provider.required(&ctx))
            .await
            .map_err(|source| KernelError::CannotBeRegistered {
                name: name.to_string(),
                source: Box::new(source),
            })?;

        if let Some(schema) = provider.config_schema().filter(|schema| !schema.is_empty()) {
            let validation = self.validator.validate(&ctx.config().to_value(), &schema);

            if !validation.is_valid() {
                let err = KernelError::ConfigurationInvalid {
                    name: name.to_string(),
                    details: validation.describe(),
                    errors: validation.errors,
                };
                if required {
                    return Err(KernelError::CannotBeRegistered {
                        name: name.to_string(),
                        source: Box::new(err),
                    });
                }
                self.fail(name, &err).await?;
                return Ok(Outcome::Failed);
            }

            self.registry
                .set_config(name, ProviderConfig::from_value(validation.value))?;
        }

        for dependency in &provider.manifest().dependencies {
            let Some(target) = self.registry.get(&dependency.name) else {
                let dependency_required =
                    match within(LifecycleOp::Required, deadline, dependency.required.evaluate()).await {
                        Ok(required) => required,
                        Err(e) => {
                            warn!(
                                provider = %name,
                                dependency = %dependency.name,
                                error = %e,
                                "Dependency requirement undecided, treating it as required"
                            );
                            true
                        }
                    };

                if dependency_required {
                    self.registry.fail(name)?;
                    return Err(KernelError::RequiredDependencyMissing {
                        name: name.to_string(),
                        dependency: dependency.name.clone(),
                    });
                }

                let err = KernelError::OptionalDependencyMissing {
                    name: name.to_string(),
                    dependency: dependency.name.clone(),
                };
                self.fail(name, &err).await?;
                return Ok(Outcome::Failed);
            };

            if let Some(range) = &dependency.version {
                let version = &target.manifest().version;
                if !self.versions.satisfies(version, range) {
                    self.registry.fail(name)?;
                    return Err(KernelError::DependencyVersionMismatch {
                        name: name.to_string(),
                        dependency: dependency.name.clone(),
                        range: range.clone(),
                        version: version.clone(),
                    });
                }
            }
        }

        if let Err(source) = self.registry.register(name).await {
            let err = KernelError::CannotBeRegistered {
                name: name.to_string(),
                source: Box::new(source),
            };
            if required {
                return Err(err);
            }
            self.fail(name, &err).await?;
            return Ok(Outcome::Failed);
        }

        Ok(Outcome::Registered)
    }

    async fn fail(&self, name: &str, err: &KernelError) -> Result<(), KernelError> {
        self.registry.fail(name)?;
        warn!(provider = %name, error = %err, "Optional service provider failed to register");

        let (event, payload) = KernelEvent::ProviderFailed {
            name: name.to_string(),
            reason: err.to_string(),
        }
        .into_parts();
        self.events.dispatch(&event, payload).await;
        Ok(())
    }
}
