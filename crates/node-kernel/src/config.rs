//! # Kernel Configuration
//!
//! Runtime parameters of the kernel. All values have defaults and can be
//! overridden from the environment:
//!
//! | Variable | Meaning |
//! |---|---|
//! | `NODE_KERNEL_INCLUDE` | comma list; only these providers register |
//! | `NODE_KERNEL_EXCLUDE` | comma list; these providers never register |
//! | `NODE_KERNEL_LIFECYCLE_TIMEOUT_SECS` | deadline for each provider call |
//! | `NODE_KERNEL_EVENTS_DRIVER` | event dispatcher driver (`memory`) |
//! | `NODE_KERNEL_PROVIDERS` | comma list of packages the binary loads |
//! | `NODE_KERNEL_PROVIDER_<NAME>` | JSON object merged into that provider's config |

use std::collections::HashMap;
use std::time::Duration;

use kernel_bus::DispatcherDriver;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

const ENV_PREFIX: &str = "NODE_KERNEL_";
const PROVIDER_OVERRIDE_PREFIX: &str = "NODE_KERNEL_PROVIDER_";

/// Default deadline for a single provider lifecycle call.
pub const DEFAULT_LIFECYCLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The lifecycle deadline is zero.
    #[error("lifecycle timeout must be greater than zero")]
    ZeroTimeout,

    /// A provider is both included and excluded.
    #[error("service provider {0} is both included and excluded")]
    IncludedAndExcluded(String),
}

/// Complete kernel configuration.
#[derive(Debug, Clone)]
pub struct KernelConfig {
    /// When non-empty, only these providers register.
    pub include: Vec<String>,
    /// These providers never register.
    pub exclude: Vec<String>,
    /// Deadline applied to every provider call.
    pub lifecycle_timeout: Duration,
    /// Event dispatcher implementation.
    pub dispatcher: DispatcherDriver,
    /// Per-provider configuration overrides, keyed by provider name.
    pub provider_overrides: HashMap<String, Value>,
    /// Packages to load, with their discovery options.
    pub providers: Vec<(String, Value)>,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            include: Vec::new(),
            exclude: Vec::new(),
            lifecycle_timeout: DEFAULT_LIFECYCLE_TIMEOUT,
            dispatcher: DispatcherDriver::default(),
            provider_overrides: HashMap::new(),
            providers: Vec::new(),
        }
    }
}

impl KernelConfig {
    /// Load from environment variables.
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    /// Load from an explicit set of variables.
    pub fn from_vars<I>(vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut config = Self::default();

        for (key, value) in vars {
            if let Some(provider) = key.strip_prefix(PROVIDER_OVERRIDE_PREFIX) {
                let name = provider.to_lowercase().replace('_', "-");
                match serde_json::from_str::<Value>(&value) {
                    Ok(overrides @ Value::Object(_)) => {
                        config.provider_overrides.insert(name, overrides);
                    }
                    Ok(_) => warn!(key = %key, "Provider override is not a JSON object, ignoring"),
                    Err(e) => warn!(key = %key, error = %e, "Invalid provider override, ignoring"),
                }
                continue;
            }

            let Some(setting) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };

            match setting {
                "INCLUDE" => config.include = split_list(&value),
                "EXCLUDE" => config.exclude = split_list(&value),
                "PROVIDERS" => {
                    config.providers = split_list(&value)
                        .into_iter()
                        .map(|package| (package, Value::Null))
                        .collect();
                }
                "LIFECYCLE_TIMEOUT_SECS" => match value.trim().parse::<u64>() {
                    Ok(secs) => config.lifecycle_timeout = Duration::from_secs(secs),
                    Err(e) => warn!(key = %key, error = %e, "Invalid lifecycle timeout, using default"),
                },
                "EVENTS_DRIVER" => match value.parse() {
                    Ok(driver) => config.dispatcher = driver,
                    Err(e) => warn!(key = %key, error = %e, "Unknown events driver, using default"),
                },
                _ => {}
            }
        }

        config
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lifecycle_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }

        if let Some(name) = self.include.iter().find(|name| self.exclude.contains(name)) {
            return Err(ConfigError::IncludedAndExcluded(name.clone()));
        }

        Ok(())
    }

    /// Whether the include/exclude filters allow `name` to register.
    #[must_use]
    pub fn is_enabled(&self, name: &str) -> bool {
        if !self.include.is_empty() && !self.include.iter().any(|n| n == name) {
            return false;
        }
        !self.exclude.iter().any(|n| n == name)
    }

    /// Overrides for one provider, `Value::Null` when there are none.
    #[must_use]
    pub fn overrides_for(&self, name: &str) -> &Value {
        self.provider_overrides.get(name).unwrap_or(&Value::Null)
    }

    /// Add a package to load, builder style.
    #[must_use]
    pub fn with_provider(mut self, package: impl Into<String>, options: Value) -> Self {
        self.providers.push((package.into(), options));
        self
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
