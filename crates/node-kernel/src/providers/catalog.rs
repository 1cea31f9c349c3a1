//! # Provider Catalog
//!
//! Compile-time table from package id to provider constructor. The kernel is
//! told which packages to load (with their options) and looks each one up
//! here, so every loadable provider is linked into the binary explicitly.

use indexmap::IndexMap;
use serde_json::Value;

use super::provider::ProviderRef;
use crate::error::KernelError;

/// Builds a provider from its discovery options.
pub type ProviderConstructor = fn(&Value) -> ProviderRef;

/// Package id to constructor table.
#[derive(Debug, Clone, Default)]
pub struct ProviderCatalog {
    constructors: IndexMap<String, ProviderConstructor>,
}

impl ProviderCatalog {
    /// An empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a package, builder style.
    #[must_use]
    pub fn with(mut self, package: impl Into<String>, constructor: ProviderConstructor) -> Self {
        self.register(package, constructor);
        self
    }

    /// Add a package. A later registration under the same id replaces the earlier one.
    pub fn register(&mut self, package: impl Into<String>, constructor: ProviderConstructor) {
        self.constructors.insert(package.into(), constructor);
    }

    /// Whether `package` is known.
    #[must_use]
    pub fn contains(&self, package: &str) -> bool {
        self.constructors.contains_key(package)
    }

    /// Known package ids in registration order.
    pub fn packages(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }

    /// Construct the provider of `package`.
    pub fn resolve(&self, package: &str, options: &Value) -> Result<ProviderRef, KernelError> {
        let constructor = self
            .constructors
            .get(package)
            .ok_or_else(|| KernelError::UnknownPackage(package.to_string()))?;
        Ok(constructor(options))
    }
}
