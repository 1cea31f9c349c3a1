//! # Provider Manifest
//!
//! Static description of a service provider: its unique name, its version and
//! the other providers it depends on.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use semver::{Version, VersionReq};

/// Static identity and dependency list of a provider.
#[derive(Debug, Clone)]
pub struct ProviderManifest {
    /// Unique name, the sole registry key.
    pub name: String,
    /// Provider version, checked against dependents' ranges.
    pub version: Version,
    /// Providers this one relies on.
    pub dependencies: Vec<Dependency>,
    /// Whether a failure of this provider aborts startup.
    pub required: bool,
}

impl ProviderManifest {
    /// Create an optional provider manifest with no dependencies.
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        Self {
            name: name.into(),
            version,
            dependencies: Vec::new(),
            required: false,
        }
    }

    /// Create a manifest from a version string.
    pub fn parse(name: impl Into<String>, version: &str) -> Result<Self, semver::Error> {
        Ok(Self::new(name, Version::parse(version)?))
    }

    /// Add a dependency.
    #[must_use]
    pub fn with_dependency(mut self, dependency: Dependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    /// Mark the provider as required (or not).
    #[must_use]
    pub fn with_required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }
}

/// A dependency on another provider.
#[derive(Debug, Clone)]
pub struct Dependency {
    /// Name of the provider depended upon.
    pub name: String,
    /// Range the dependency's version must satisfy, if any.
    pub version: Option<VersionReq>,
    /// Whether the dependency must be present.
    pub required: Requirement,
}

impl Dependency {
    /// A dependency that must be present.
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
            required: Requirement::Always,
        }
    }

    /// A dependency that may be absent.
    pub fn optional(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
            required: Requirement::Never,
        }
    }

    /// A dependency whose requiredness is decided at registration time.
    pub fn when<F, Fut>(name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        Self {
            name: name.into(),
            version: None,
            required: Requirement::When(Arc::new(move || predicate().boxed())),
        }
    }

    /// Constrain the dependency's version.
    #[must_use]
    pub fn with_version(mut self, range: VersionReq) -> Self {
        self.version = Some(range);
        self
    }

    /// Constrain the dependency's version from a range string such as `">=2.0.0"`.
    pub fn with_range(self, range: &str) -> Result<Self, semver::Error> {
        Ok(self.with_version(VersionReq::parse(range)?))
    }
}

/// Async predicate deciding whether a dependency is required.
pub type RequirementFn = Arc<dyn Fn() -> BoxFuture<'static, bool> + Send + Sync>;

/// How a dependency's requiredness is determined.
#[derive(Clone)]
pub enum Requirement {
    /// Always required.
    Always,
    /// Never required.
    Never,
    /// Decided by an async predicate.
    When(RequirementFn),
}

impl Requirement {
    /// Resolve the requirement.
    pub async fn evaluate(&self) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::When(predicate) => predicate().await,
        }
    }
}

impl fmt::Debug for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Always => f.write_str("Always"),
            Self::Never => f.write_str("Never"),
            Self::When(_) => f.write_str("When(..)"),
        }
    }
}
