//! # Provider Configuration
//!
//! Resolved configuration handed to a provider. Built from the provider's own
//! defaults, the options it was discovered with and any kernel-level overrides,
//! in that order. Objects are merged deeply, everything else is replaced.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::warn;

/// Configuration values of one provider.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderConfig {
    values: Map<String, Value>,
}

impl ProviderConfig {
    /// Wrap a set of values.
    #[must_use]
    pub fn new(values: Map<String, Value>) -> Self {
        Self { values }
    }

    /// Build from an arbitrary JSON value.
    ///
    /// Only objects carry configuration. `null` yields an empty config; any
    /// other value is logged and ignored.
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(values) => Self { values },
            Value::Null => Self::default(),
            other => {
                warn!(value = %other, "Ignoring non-object provider configuration");
                Self::default()
            }
        }
    }

    /// Layer `defaults`, then every overlay in order.
    #[must_use]
    pub fn resolve(defaults: Map<String, Value>, overlays: &[&Value]) -> Self {
        let mut config = Self::new(defaults);
        for overlay in overlays {
            match overlay {
                Value::Object(values) => config.merge(values),
                Value::Null => {}
                other => warn!(value = %other, "Ignoring non-object configuration overlay"),
            }
        }
        config
    }

    /// Look up a value by key. Dotted keys walk nested objects: `"server.port"`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        let mut segments = key.split('.');
        let mut current = self.values.get(segments.next()?)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// Look up and deserialize a value.
    #[must_use]
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get(key)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    /// Whether a value exists under `key`.
    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Set a top-level value.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    /// Deep-merge `overrides` into this configuration.
    pub fn merge(&mut self, overrides: &Map<String, Value>) {
        merge_into(&mut self.values, overrides);
    }

    /// All values.
    #[must_use]
    pub fn all(&self) -> &Map<String, Value> {
        &self.values
    }

    /// The configuration as a JSON object.
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::Object(self.values.clone())
    }
}

fn merge_into(target: &mut Map<String, Value>, overrides: &Map<String, Value>) {
    for (key, value) in overrides {
        match (target.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                merge_into(existing, incoming);
            }
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}
