//! # Node Kernel
//!
//! Process entry point: loads configuration, discovers the configured provider
//! packages, bootstraps the kernel and keeps it running until Ctrl+C or until
//! a required provider requests shutdown.
//!
//! ## Startup Sequence
//!
//! 1. Initialize tracing
//! 2. Load and validate configuration (from env)
//! 3. Resolve provider packages through the catalog
//! 4. Bootstrap (register, then boot)
//! 5. Wait for a shutdown request, then terminate

use anyhow::{Context, Result};
use tracing::info;

use node_kernel::telemetry::{init_tracing, TelemetryConfig};
use node_kernel::{Kernel, KernelConfig, ProviderCatalog};

/// Provider packages linked into this binary.
fn catalog() -> ProviderCatalog {
    ProviderCatalog::new()
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_tracing(&TelemetryConfig::from_env()).context("failed to initialize tracing")?;

    // Load configuration
    let config = KernelConfig::from_env();
    config.validate().context("invalid kernel configuration")?;
    let packages = config.providers.clone();

    let kernel = Kernel::new(config).context("failed to create kernel")?;
    kernel
        .load_catalog(&catalog(), &packages)
        .context("failed to load provider packages")?;

    kernel.bootstrap().await.context("bootstrap failed")?;
    kernel.registry().print_status();

    // Keep the node running
    info!("Node kernel is running. Press Ctrl+C to stop.");
    let reason = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for Ctrl+C")?;
            "received Ctrl+C".to_string()
        }
        reason = kernel.shutdown().wait() => reason,
    };

    // Graceful shutdown
    kernel.terminate(Some(&reason), None).await;
    info!("Node kernel stopped");

    Ok(())
}
