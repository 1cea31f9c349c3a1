//! # Registration Scenarios
//!
//! Provider discovery through bootstrap's `register` stage:
//!
//! 1. **Dependency versions**: an unsatisfied range aborts startup
//! 2. **Missing dependencies**: required aborts, optional only fails the dependent
//! 3. **Required vs optional failures**: a required failure halts before any
//!    later provider boots, an optional one is contained

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use node_kernel::providers::{ConfigSchema, FieldKind, FieldRule};
    use node_kernel::{
        Dependency, KernelConfig, KernelError, ProviderCatalog, ProviderRef, ProviderStatus,
    };

    use crate::support::{kernel, kernel_with, record_events, Journal, StubProvider};

    // =============================================================================
    // DEPENDENCY VERSIONS
    // =============================================================================

    /// A dependency older than the requested range aborts bootstrap.
    #[tokio::test]
    async fn test_dependency_version_mismatch_aborts_bootstrap() {
        // Setup: p2p 1.0.0, api wants p2p >=2.0.0
        let journal = Journal::new();
        let kernel = kernel();
        kernel
            .add_provider(
                StubProvider::builder("core-p2p", "1.0.0").journal(&journal).build(),
                &Value::Null,
            )
            .unwrap();
        kernel
            .add_provider(
                StubProvider::builder("core-api", "1.0.0")
                    .depends_on(Dependency::required("core-p2p").with_range(">=2.0.0").unwrap())
                    .journal(&journal)
                    .build(),
                &Value::Null,
            )
            .unwrap();

        // Act
        let err = kernel.bootstrap().await.unwrap_err();

        // Assert: error names both sides, nothing booted, kernel terminated
        match &err {
            KernelError::DependencyVersionMismatch {
                name,
                dependency,
                version,
                range,
            } => {
                assert_eq!(name, "core-api");
                assert_eq!(dependency, "core-p2p");
                assert_eq!(version.to_string(), "1.0.0");
                assert_eq!(range.to_string(), ">=2.0.0");
            }
            other => panic!("Expected DependencyVersionMismatch, got {other}"),
        }
        assert!(kernel.registry().failed("core-api"));
        assert_eq!(journal.count_prefix("core-p2p:boot"), 0);
        assert!(!kernel.is_booted());
        assert!(kernel.shutdown().is_requested());
    }

    /// The same graph boots once the dependency satisfies the range.
    #[tokio::test]
    async fn test_dependency_version_satisfied_boots_both() {
        let kernel = kernel();
        kernel
            .add_provider(StubProvider::builder("core-p2p", "2.1.0").build(), &Value::Null)
            .unwrap();
        kernel
            .add_provider(
                StubProvider::builder("core-api", "1.0.0")
                    .depends_on(Dependency::required("core-p2p").with_range(">=2.0.0").unwrap())
                    .build(),
                &Value::Null,
            )
            .unwrap();

        kernel.bootstrap().await.unwrap();

        assert!(kernel.is_booted());
        assert_eq!(kernel.registry().all_loaded(), vec!["core-p2p", "core-api"]);
    }

    // =============================================================================
    // MISSING DEPENDENCIES
    // =============================================================================

    /// A missing optional dependency fails only the dependent provider.
    #[tokio::test]
    async fn test_missing_optional_dependency_fails_only_dependent() {
        let kernel = kernel();
        kernel
            .add_provider(
                StubProvider::builder("core-webhooks", "1.0.0")
                    .depends_on(Dependency::optional("core-api"))
                    .build(),
                &Value::Null,
            )
            .unwrap();
        kernel
            .add_provider(StubProvider::builder("core-p2p", "1.0.0").build(), &Value::Null)
            .unwrap();

        kernel.bootstrap().await.unwrap();

        assert!(kernel.registry().failed("core-webhooks"));
        assert!(kernel.registry().loaded("core-p2p"));
        assert!(kernel.is_booted());
    }

    /// A missing required dependency aborts bootstrap and names both providers.
    #[tokio::test]
    async fn test_missing_required_dependency_aborts_bootstrap() {
        let kernel = kernel();
        kernel
            .add_provider(
                StubProvider::builder("core-webhooks", "1.0.0")
                    .depends_on(Dependency::required("core-api"))
                    .build(),
                &Value::Null,
            )
            .unwrap();

        let err = kernel.bootstrap().await.unwrap_err();

        assert!(matches!(
            err,
            KernelError::RequiredDependencyMissing { ref name, ref dependency }
                if name == "core-webhooks" && dependency == "core-api"
        ));
        let message = err.to_string();
        assert!(message.contains("core-webhooks"));
        assert!(message.contains("core-api"));
    }

    /// A filtered-out dependency still counts as discovered.
    #[tokio::test]
    async fn test_excluded_dependency_is_still_known() {
        let kernel = kernel_with(KernelConfig {
            exclude: vec!["core-p2p".into()],
            ..KernelConfig::default()
        });
        kernel
            .add_provider(StubProvider::builder("core-p2p", "1.0.0").build(), &Value::Null)
            .unwrap();
        kernel
            .add_provider(
                StubProvider::builder("core-api", "1.0.0")
                    .depends_on(Dependency::required("core-p2p"))
                    .build(),
                &Value::Null,
            )
            .unwrap();

        kernel.bootstrap().await.unwrap();

        assert_eq!(
            kernel.registry().status("core-p2p"),
            Some(ProviderStatus::Unregistered)
        );
        assert!(kernel.registry().loaded("core-api"));
    }

    // =============================================================================
    // REQUIRED VS OPTIONAL FAILURES
    // =============================================================================

    /// A required provider failing to register stops startup before anything boots.
    #[tokio::test]
    async fn test_required_register_failure_halts_startup() {
        let journal = Journal::new();
        let kernel = kernel();
        kernel
            .add_provider(
                StubProvider::builder("core-database", "1.0.0")
                    .required()
                    .fail_register()
                    .journal(&journal)
                    .build(),
                &Value::Null,
            )
            .unwrap();
        kernel
            .add_provider(
                StubProvider::builder("core-api", "1.0.0").journal(&journal).build(),
                &Value::Null,
            )
            .unwrap();

        let err = kernel.bootstrap().await.unwrap_err();

        assert!(matches!(err, KernelError::CannotBeRegistered { ref name, .. } if name == "core-database"));
        assert!(!journal.contains("core-api:register"));
        assert!(!journal.contains("core-api:boot"));
        assert!(kernel.registry().all_loaded().is_empty());
    }

    /// An optional provider failing to register is contained.
    #[tokio::test]
    async fn test_optional_register_failure_is_contained() {
        let kernel = kernel();
        kernel
            .add_provider(
                StubProvider::builder("core-webhooks", "1.0.0").fail_register().build(),
                &Value::Null,
            )
            .unwrap();
        kernel
            .add_provider(StubProvider::builder("core-api", "1.0.0").build(), &Value::Null)
            .unwrap();

        kernel.bootstrap().await.unwrap();

        assert!(kernel.registry().failed("core-webhooks"));
        assert!(kernel.registry().loaded("core-api"));
    }

    /// A required provider failing to boot stops the boot pass.
    #[tokio::test]
    async fn test_required_boot_failure_halts_startup() {
        let journal = Journal::new();
        let kernel = kernel();
        kernel
            .add_provider(
                StubProvider::builder("core-database", "1.0.0")
                    .required()
                    .fail_boot()
                    .journal(&journal)
                    .build(),
                &Value::Null,
            )
            .unwrap();
        kernel
            .add_provider(
                StubProvider::builder("core-api", "1.0.0").journal(&journal).build(),
                &Value::Null,
            )
            .unwrap();

        let err = kernel.bootstrap().await.unwrap_err();

        assert!(matches!(err, KernelError::BootFailed { ref name, .. } if name == "core-database"));
        assert!(journal.contains("core-api:register"));
        assert!(!journal.contains("core-api:boot"));
        assert!(!kernel.is_booted());
    }

    /// An optional provider failing to boot is marked failed; later providers boot.
    #[tokio::test]
    async fn test_optional_boot_failure_is_contained() {
        let kernel = kernel();
        let failures = Journal::new();
        record_events(kernel.events(), "kernel.provider.failed", &failures);

        kernel
            .add_provider(
                StubProvider::builder("core-webhooks", "1.0.0").fail_boot().build(),
                &Value::Null,
            )
            .unwrap();
        kernel
            .add_provider(StubProvider::builder("core-api", "1.0.0").build(), &Value::Null)
            .unwrap();

        kernel.bootstrap().await.unwrap();

        assert!(kernel.registry().failed("core-webhooks"));
        assert!(kernel.registry().loaded("core-api"));
        assert_eq!(failures.entries(), vec!["kernel.provider.failed:core-webhooks"]);
    }

    // =============================================================================
    // CONFIGURATION
    // =============================================================================

    /// Config layers merge and the schema validator fills defaults.
    #[tokio::test]
    async fn test_configuration_is_resolved_and_validated() {
        let mut config = KernelConfig::default();
        config
            .provider_overrides
            .insert("core-api".into(), json!({ "port": "4100" }));
        let kernel = kernel_with(config);

        let schema = ConfigSchema::new()
            .field("host", FieldRule::new(FieldKind::String).required())
            .field("port", FieldRule::new(FieldKind::Integer))
            .field(
                "cors",
                FieldRule::new(FieldKind::Boolean).default_value(json!(false)),
            );
        kernel
            .add_provider(
                StubProvider::builder("core-api", "1.0.0")
                    .defaults(json!({ "host": "0.0.0.0", "port": 4003 }))
                    .schema(schema)
                    .build(),
                &json!({ "host": "127.0.0.1" }),
            )
            .unwrap();

        kernel.bootstrap().await.unwrap();

        let resolved = kernel.registry().config("core-api").unwrap();
        assert_eq!(
            resolved.to_value(),
            json!({ "host": "127.0.0.1", "port": 4100, "cors": false })
        );
    }

    /// A required provider with an invalid configuration aborts bootstrap.
    #[tokio::test]
    async fn test_invalid_configuration_of_required_provider() {
        let kernel = kernel();
        kernel
            .add_provider(
                StubProvider::builder("core-api", "1.0.0")
                    .required()
                    .schema(
                        ConfigSchema::new()
                            .field("host", FieldRule::new(FieldKind::String).required()),
                    )
                    .build(),
                &Value::Null,
            )
            .unwrap();

        let err = kernel.bootstrap().await.unwrap_err();

        assert!(matches!(err, KernelError::CannotBeRegistered { ref name, .. } if name == "core-api"));
        assert!(err.to_string().contains("\"host\" is required"));
    }

    // =============================================================================
    // DISCOVERY
    // =============================================================================

    /// Packages are resolved through the catalog and keep discovery order.
    #[tokio::test]
    async fn test_catalog_discovery() {
        let catalog = ProviderCatalog::new()
            .with("@node/p2p", |_| {
                let provider: ProviderRef = StubProvider::builder("core-p2p", "1.0.0").build();
                provider
            })
            .with("@node/api", |options| {
                let name = options["name"].as_str().unwrap_or("core-api");
                let provider: ProviderRef = StubProvider::builder(name, "1.0.0").build();
                provider
            });

        let kernel = kernel();
        let stages = Journal::new();
        record_events(kernel.events(), "kernel.bootstrap*", &stages);

        kernel
            .load_catalog(
                &catalog,
                &[
                    ("@node/api".to_string(), json!({ "name": "core-api-v2" })),
                    ("@node/p2p".to_string(), Value::Null),
                ],
            )
            .unwrap();
        kernel.bootstrap().await.unwrap();

        assert_eq!(kernel.registry().all_loaded(), vec!["core-api-v2", "core-p2p"]);
        assert_eq!(
            stages.entries(),
            vec![
                "kernel.bootstrapping:register",
                "kernel.bootstrapped:register",
                "kernel.bootstrapping:boot",
                "kernel.bootstrapped:boot",
            ]
        );
    }
}
