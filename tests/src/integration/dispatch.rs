//! # Dispatcher Scenarios
//!
//! The kernel and its providers share one dispatcher. These tests observe the
//! kernel from the outside through it, the way a provider would.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::{json, Value};

    use kernel_bus::{
        listener_fn, Event, EventDispatcher, ListenerError, MemoryEventDispatcher, BLOCK_APPLIED,
    };
    use node_kernel::{Kernel, KernelConfig};

    use crate::support::{kernel, record_events, Journal, StubProvider, Switch};

    // =============================================================================
    // PROVIDER EVENTS
    // =============================================================================

    /// Every provider transition is announced under `kernel.provider.*`.
    #[tokio::test]
    async fn test_provider_transitions_are_announced() {
        let kernel = kernel();
        let seen = Journal::new();
        record_events(kernel.events(), "kernel.provider.*", &seen);

        let ready = Switch::new(false);
        kernel
            .add_provider(StubProvider::builder("core-p2p", "1.0.0").build(), &Value::Null)
            .unwrap();
        kernel
            .add_provider(
                StubProvider::builder("core-forger", "1.0.0")
                    .boot_when_switch(&ready)
                    .build(),
                &Value::Null,
            )
            .unwrap();
        kernel
            .add_provider(
                StubProvider::builder("core-webhooks", "1.0.0").fail_boot().build(),
                &Value::Null,
            )
            .unwrap();

        kernel.bootstrap().await.unwrap();
        ready.on();
        kernel.events().dispatch(BLOCK_APPLIED, Value::Null).await;
        kernel.terminate(None, None).await;

        assert_eq!(
            seen.entries(),
            vec![
                "kernel.provider.booted:core-p2p",
                "kernel.provider.deferred:core-forger",
                "kernel.provider.failed:core-webhooks",
                "kernel.provider.booted:core-forger",
                "kernel.provider.disposed:core-forger",
                "kernel.provider.disposed:core-p2p",
            ]
        );
    }

    /// A provider can wait for one block with a once-listener.
    #[tokio::test]
    async fn test_listen_once_on_block_applied() {
        let kernel = kernel();
        let heights = Journal::new();
        let recorder = heights.clone();
        kernel.events().listen_once(
            "block.*",
            listener_fn(move |event: Event| {
                let recorder = recorder.clone();
                async move {
                    recorder.record(event.payload["height"].to_string());
                    Ok(())
                }
            }),
        );

        for height in 1..=3 {
            kernel
                .events()
                .dispatch(BLOCK_APPLIED, json!({ "height": height }))
                .await;
        }

        assert_eq!(heights.entries(), vec!["1"]);
        assert!(!kernel.events().has_listeners("block.*"));
    }

    // =============================================================================
    // FAILING LISTENERS
    // =============================================================================

    /// A failing observer does not disturb the kernel's own watchers.
    #[tokio::test]
    async fn test_failing_observer_does_not_block_watchers() {
        let kernel = kernel();
        kernel.events().listen(
            BLOCK_APPLIED,
            listener_fn(|_: Event| async { Err(ListenerError::failed("observer broke")) }),
        );

        let ready = Switch::new(false);
        kernel
            .add_provider(
                StubProvider::builder("core-forger", "1.0.0")
                    .boot_when_switch(&ready)
                    .build(),
                &Value::Null,
            )
            .unwrap();
        kernel.bootstrap().await.unwrap();

        ready.on();
        kernel.events().dispatch(BLOCK_APPLIED, Value::Null).await;

        assert!(kernel.registry().loaded("core-forger"));
    }

    /// Sequential dispatch surfaces the first listener failure.
    #[tokio::test]
    async fn test_sequential_dispatch_reports_failure() {
        let kernel = kernel();
        let journal = Journal::new();
        let first = journal.clone();
        let last = journal.clone();

        kernel.events().listen(
            "node.sync.*",
            listener_fn(move |event: Event| {
                let first = first.clone();
                async move {
                    first.record(format!("first:{}", event.name));
                    Ok(())
                }
            }),
        );
        kernel.events().listen(
            "node.sync.*",
            listener_fn(|_: Event| async { Err(ListenerError::failed("not synced")) }),
        );
        kernel.events().listen(
            "node.sync.*",
            listener_fn(move |_: Event| {
                let last = last.clone();
                async move {
                    last.record("last");
                    Ok(())
                }
            }),
        );

        let err = kernel
            .events()
            .dispatch_seq("node.sync.started", Value::Null)
            .await
            .unwrap_err();

        assert_eq!(err.event, "node.sync.started");
        assert!(err.to_string().contains("not synced"));
        assert_eq!(journal.entries(), vec!["first:node.sync.started"]);
    }

    // =============================================================================
    // SHARED DISPATCHER
    // =============================================================================

    /// A kernel can be built around a dispatcher owned by the embedding node.
    #[tokio::test]
    async fn test_kernel_on_shared_dispatcher() {
        let events: Arc<dyn EventDispatcher> = Arc::new(MemoryEventDispatcher::new());
        let kernel = Kernel::builder(KernelConfig::default())
            .events(Arc::clone(&events))
            .build()
            .unwrap();

        let ready = Switch::new(false);
        kernel
            .add_provider(
                StubProvider::builder("core-forger", "1.0.0")
                    .boot_when_switch(&ready)
                    .build(),
                &Value::Null,
            )
            .unwrap();
        kernel.bootstrap().await.unwrap();
        assert_eq!(events.count_listeners(Some(BLOCK_APPLIED)), 1);

        ready.on();
        events.dispatch(BLOCK_APPLIED, Value::Null).await;
        assert!(kernel.registry().loaded("core-forger"));

        kernel.terminate(None, None).await;
        assert_eq!(events.count_listeners(Some(BLOCK_APPLIED)), 0);
    }

    // =============================================================================
    // KERNEL HOOKS
    // =============================================================================

    /// Stage hooks see only their stage; maintenance changes are announced.
    #[tokio::test]
    async fn test_stage_hooks_and_maintenance() {
        let kernel = kernel();
        let seen = Journal::new();
        record_events(kernel.events(), "kernel.maintenance", &seen);

        let before = seen.clone();
        kernel.before_bootstrapping(
            "boot",
            listener_fn(move |_: Event| {
                let before = before.clone();
                async move {
                    before.record("before:boot");
                    Ok(())
                }
            }),
        );
        kernel
            .add_provider(StubProvider::builder("core-p2p", "1.0.0").build(), &Value::Null)
            .unwrap();

        kernel.bootstrap().await.unwrap();
        kernel.enable_maintenance().await;
        assert!(kernel.is_down_for_maintenance());
        kernel.disable_maintenance().await;

        assert!(!kernel.is_down_for_maintenance());
        assert_eq!(
            seen.entries(),
            vec!["before:boot", "kernel.maintenance", "kernel.maintenance"]
        );
    }
}
