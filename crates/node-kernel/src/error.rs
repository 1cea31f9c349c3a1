//! # Kernel Errors
//!
//! Errors surfaced by registration, boot and teardown. Anything returned from
//! [`crate::Kernel::bootstrap`] has already terminated the kernel; conditions
//! that only degrade a single optional provider are logged instead.

use std::collections::BTreeMap;

use kernel_bus::DriverError;
use semver::{Version, VersionReq};
use thiserror::Error;

use crate::config::ConfigError;
use crate::registry::RegistryError;

/// Boxed error used as the cause of a failed registration.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised by the kernel.
#[derive(Debug, Error)]
pub enum KernelError {
    /// The provider's configuration does not satisfy its schema.
    #[error("Service provider {name} has an invalid configuration: {details}")]
    ConfigurationInvalid {
        /// Provider name.
        name: String,
        /// Validator messages joined into one line.
        details: String,
        /// Validator messages per field.
        errors: BTreeMap<String, Vec<String>>,
    },

    /// A required dependency is not known to the registry.
    #[error(
        "The \"{dependency}\" package is required but missing. \
         Please make sure it is installed to take advantage of {name}."
    )]
    RequiredDependencyMissing {
        /// Dependent provider.
        name: String,
        /// Missing dependency.
        dependency: String,
    },

    /// An optional dependency is not known to the registry. Logged, never returned.
    #[error(
        "The \"{dependency}\" package is missing. \
         Please make sure it is installed to take advantage of {name}."
    )]
    OptionalDependencyMissing {
        /// Dependent provider.
        name: String,
        /// Missing dependency.
        dependency: String,
    },

    /// A dependency is present but outside the requested range.
    #[error(
        "Expected \"{dependency}\" to satisfy \"{range}\" but received \"{version}\" \
         (required by {name})"
    )]
    DependencyVersionMismatch {
        /// Dependent provider.
        name: String,
        /// The dependency.
        dependency: String,
        /// Requested range.
        range: VersionReq,
        /// Version actually present.
        version: Version,
    },

    /// A required provider could not be registered.
    #[error("Service provider {name} cannot be registered: {source}")]
    CannotBeRegistered {
        /// Provider name.
        name: String,
        /// Underlying cause.
        #[source]
        source: BoxError,
    },

    /// A required provider failed to boot.
    #[error("Service provider {name} failed to boot: {source}")]
    BootFailed {
        /// Provider name.
        name: String,
        /// Underlying cause.
        #[source]
        source: RegistryError,
    },

    /// A required provider failed to dispose.
    #[error("Service provider {name} failed to dispose: {source}")]
    DisposeFailed {
        /// Provider name.
        name: String,
        /// Underlying cause.
        #[source]
        source: RegistryError,
    },

    /// Registry precondition violation.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// A package id is not in the provider catalog.
    #[error("Unknown provider package: {0}")]
    UnknownPackage(String),

    /// Invalid kernel configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Unknown dispatcher driver.
    #[error(transparent)]
    Driver(#[from] DriverError),
}

impl KernelError {
    /// Name of the provider the error is about, if any.
    #[must_use]
    pub fn provider(&self) -> Option<&str> {
        match self {
            Self::ConfigurationInvalid { name, .. }
            | Self::RequiredDependencyMissing { name, .. }
            | Self::OptionalDependencyMissing { name, .. }
            | Self::DependencyVersionMismatch { name, .. }
            | Self::CannotBeRegistered { name, .. }
            | Self::BootFailed { name, .. }
            | Self::DisposeFailed { name, .. } => Some(name),
            Self::Registry(err) => err.provider(),
            Self::UnknownPackage(_) | Self::Config(_) | Self::Driver(_) => None,
        }
    }
}
