//! # Node Kernel Library
//!
//! Service-provider lifecycle orchestration for the node. The main entry point
//! is the `main.rs` binary; this library exposes the kernel for embedding and
//! testing.
//!
//! ## Architecture
//!
//! ```text
//!  ProviderCatalog ──► Kernel::add_provider ──► ServiceProviderRegistry
//!                                                   │         ▲
//!                                                   ▼         │
//!                          RegistrationPipeline (filters, schema, deps, register)
//!                                                   │
//!                                                   ▼
//!                          LifecycleController ──► ProviderWatcher per provider
//!                                                   │         ▲
//!                                                   ▼         │
//!                                          EventDispatcher (kernel-bus)
//! ```
//!
//! - Providers never call each other through the kernel; they observe each
//!   other through events on the shared dispatcher.
//! - Provider status lives in exactly one place, the registry.
//! - Every provider call runs under the configured lifecycle deadline.

#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]

pub mod application;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod providers;
pub mod registry;
pub mod shutdown;
pub mod telemetry;

// Re-export main types
pub use application::{Kernel, KernelBuilder};
pub use config::{ConfigError, KernelConfig};
pub use error::KernelError;
pub use providers::{
    Dependency, ProviderCatalog, ProviderConfig, ProviderContext, ProviderError, ProviderManifest,
    ProviderRef, ServiceProvider,
};
pub use registry::{ProviderStatus, RegistryError, ServiceProviderRegistry};
pub use shutdown::ShutdownSignal;
