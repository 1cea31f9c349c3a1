//! # Service Providers
//!
//! Everything that describes a provider: the [`ServiceProvider`] trait, its
//! manifest and dependencies, configuration and its schema, version checks and
//! the catalog the kernel discovers providers from.

pub mod catalog;
pub mod config;
pub mod manifest;
pub mod provider;
pub mod schema;
pub mod version;

pub use catalog::{ProviderCatalog, ProviderConstructor};
pub use config::ProviderConfig;
pub use manifest::{Dependency, ProviderManifest, Requirement, RequirementFn};
pub use provider::{LifecycleOp, ProviderContext, ProviderError, ProviderRef, ServiceProvider};
pub use schema::{ConfigSchema, ConfigValidator, FieldKind, FieldRule, SchemaValidator, Validation};
pub use version::{SemverChecker, VersionChecker};
