//! # Test Fixtures
//!
//! Configurable stub providers, a shared call journal and an event recorder,
//! used by every integration scenario.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use semver::Version;
use serde_json::{Map, Value};

use kernel_bus::{listener_fn, Event, EventDispatcher, ListenerHandle};
use node_kernel::providers::ConfigSchema;
use node_kernel::{
    Dependency, Kernel, KernelConfig, ProviderContext, ProviderError, ProviderManifest,
    ServiceProvider,
};

// =============================================================================
// JOURNAL
// =============================================================================

/// Ordered log of provider calls and observed events, shared between fixtures.
#[derive(Clone, Default)]
pub struct Journal {
    entries: Arc<Mutex<Vec<String>>>,
}

impl Journal {
    /// Create an empty journal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry.
    pub fn record(&self, entry: impl Into<String>) {
        self.entries.lock().push(entry.into());
    }

    /// Snapshot of all entries.
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    /// Number of entries equal to `entry`.
    pub fn count(&self, entry: &str) -> usize {
        self.entries.lock().iter().filter(|e| *e == entry).count()
    }

    /// Number of entries starting with `prefix`.
    pub fn count_prefix(&self, prefix: &str) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.starts_with(prefix))
            .count()
    }

    /// Position of the first entry equal to `entry`.
    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries.lock().iter().position(|e| e == entry)
    }

    /// Whether `entry` was recorded.
    pub fn contains(&self, entry: &str) -> bool {
        self.position(entry).is_some()
    }
}

// =============================================================================
// SWITCHES
// =============================================================================

/// Flag flipped by a test to change a predicate's answer between events.
#[derive(Clone, Default)]
pub struct Switch(Arc<AtomicBool>);

impl Switch {
    /// A switch in the given position.
    pub fn new(on: bool) -> Self {
        Self(Arc::new(AtomicBool::new(on)))
    }

    /// Turn on.
    pub fn on(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Turn off.
    pub fn off(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    /// Current position.
    pub fn get(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Predicate over the name of the provider whose boot caused the evaluation.
pub type Predicate = Arc<dyn Fn(Option<&str>) -> bool + Send + Sync>;

// =============================================================================
// STUB PROVIDER
// =============================================================================

/// Provider that records every call in a [`Journal`].
///
/// Journal entries: `"<name>:register"`, `"<name>:boot"`, `"<name>:dispose"`,
/// `"<name>:boot_when(<causing>)"`, `"<name>:dispose_when(<causing>)"` with
/// `-` for no causing provider.
pub struct StubProvider {
    manifest: ProviderManifest,
    schema: Option<ConfigSchema>,
    defaults: Map<String, Value>,
    boot_when: Predicate,
    dispose_when: Predicate,
    fail_register: bool,
    fail_boot: Switch,
    fail_dispose: bool,
    announce_on_boot: Option<String>,
    journal: Journal,
}

impl StubProvider {
    /// Start building a stub.
    pub fn builder(name: &str, version: &str) -> StubBuilder {
        StubBuilder {
            manifest: ProviderManifest::new(
                name,
                Version::parse(version).unwrap_or_else(|_| Version::new(1, 0, 0)),
            ),
            schema: None,
            defaults: Map::new(),
            boot_when: Arc::new(|_: Option<&str>| true),
            dispose_when: Arc::new(|_: Option<&str>| false),
            fail_register: false,
            fail_boot: Switch::new(false),
            fail_dispose: false,
            announce_on_boot: None,
            journal: Journal::new(),
        }
    }

    fn record(&self, call: &str) {
        self.journal.record(format!("{}:{call}", self.manifest.name));
    }
}

#[async_trait]
impl ServiceProvider for StubProvider {
    fn manifest(&self) -> &ProviderManifest {
        &self.manifest
    }

    fn config_schema(&self) -> Option<ConfigSchema> {
        self.schema.clone()
    }

    fn config_defaults(&self) -> Map<String, Value> {
        self.defaults.clone()
    }

    async fn register(&self, _ctx: &ProviderContext) -> Result<(), ProviderError> {
        self.record("register");
        if self.fail_register {
            return Err(ProviderError::failed("register failed"));
        }
        Ok(())
    }

    async fn boot(&self, ctx: &ProviderContext) -> Result<(), ProviderError> {
        self.record("boot");
        if self.fail_boot.get() {
            return Err(ProviderError::failed("boot failed"));
        }
        if let Some(event) = &self.announce_on_boot {
            ctx.events().dispatch(event, Value::Null).await;
        }
        Ok(())
    }

    async fn dispose(&self, _ctx: &ProviderContext) -> Result<(), ProviderError> {
        self.record("dispose");
        if self.fail_dispose {
            return Err(ProviderError::failed("dispose failed"));
        }
        Ok(())
    }

    async fn boot_when(&self, _ctx: &ProviderContext, causing: Option<&str>) -> bool {
        self.record(&format!("boot_when({})", causing.unwrap_or("-")));
        (self.boot_when)(causing)
    }

    async fn dispose_when(&self, _ctx: &ProviderContext, causing: Option<&str>) -> bool {
        self.record(&format!("dispose_when({})", causing.unwrap_or("-")));
        (self.dispose_when)(causing)
    }
}

/// Builder for [`StubProvider`].
pub struct StubBuilder {
    manifest: ProviderManifest,
    schema: Option<ConfigSchema>,
    defaults: Map<String, Value>,
    boot_when: Predicate,
    dispose_when: Predicate,
    fail_register: bool,
    fail_boot: Switch,
    fail_dispose: bool,
    announce_on_boot: Option<String>,
    journal: Journal,
}

impl StubBuilder {
    /// Failures of this provider abort startup.
    pub fn required(mut self) -> Self {
        self.manifest.required = true;
        self
    }

    /// Add a dependency.
    pub fn depends_on(mut self, dependency: Dependency) -> Self {
        self.manifest.dependencies.push(dependency);
        self
    }

    /// Configuration schema.
    pub fn schema(mut self, schema: ConfigSchema) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Configuration defaults.
    pub fn defaults(mut self, defaults: Value) -> Self {
        if let Value::Object(map) = defaults {
            self.defaults = map;
        }
        self
    }

    /// `boot_when` answer.
    pub fn boot_when(mut self, predicate: impl Fn(Option<&str>) -> bool + Send + Sync + 'static) -> Self {
        self.boot_when = Arc::new(predicate);
        self
    }

    /// `boot_when` follows a switch.
    pub fn boot_when_switch(self, switch: &Switch) -> Self {
        let switch = switch.clone();
        self.boot_when(move |_: Option<&str>| switch.get())
    }

    /// `dispose_when` follows a switch.
    pub fn dispose_when_switch(mut self, switch: &Switch) -> Self {
        let switch = switch.clone();
        self.dispose_when = Arc::new(move |_: Option<&str>| switch.get());
        self
    }

    /// `register()` fails.
    pub fn fail_register(mut self) -> Self {
        self.fail_register = true;
        self
    }

    /// `boot()` fails.
    pub fn fail_boot(self) -> Self {
        self.fail_boot.on();
        self
    }

    /// `boot()` fails while the switch is on.
    pub fn fail_boot_switch(mut self, switch: &Switch) -> Self {
        self.fail_boot = switch.clone();
        self
    }

    /// `dispose()` fails.
    pub fn fail_dispose(mut self) -> Self {
        self.fail_dispose = true;
        self
    }

    /// `boot()` dispatches `event` on the kernel's dispatcher before returning.
    pub fn announce_on_boot(mut self, event: &str) -> Self {
        self.announce_on_boot = Some(event.to_string());
        self
    }

    /// Record calls in `journal`.
    pub fn journal(mut self, journal: &Journal) -> Self {
        self.journal = journal.clone();
        self
    }

    /// Finish the stub.
    pub fn build(self) -> Arc<StubProvider> {
        Arc::new(StubProvider {
            manifest: self.manifest,
            schema: self.schema,
            defaults: self.defaults,
            boot_when: self.boot_when,
            dispose_when: self.dispose_when,
            fail_register: self.fail_register,
            fail_boot: self.fail_boot,
            fail_dispose: self.fail_dispose,
            announce_on_boot: self.announce_on_boot,
            journal: self.journal,
        })
    }
}

// =============================================================================
// KERNEL AND EVENTS
// =============================================================================

/// Kernel with a short lifecycle deadline.
pub fn kernel() -> Kernel {
    kernel_with(KernelConfig::default())
}

/// Kernel with the given configuration and a short lifecycle deadline.
pub fn kernel_with(config: KernelConfig) -> Kernel {
    let config = KernelConfig {
        lifecycle_timeout: Duration::from_secs(2),
        ..config
    };
    match Kernel::new(config) {
        Ok(kernel) => kernel,
        Err(e) => panic!("failed to build kernel: {e}"),
    }
}

/// Record every event matching `pattern` into `journal` as
/// `"<event>"` or `"<event>:<name|stage>"`.
pub fn record_events(
    events: &Arc<dyn EventDispatcher>,
    pattern: &str,
    journal: &Journal,
) -> ListenerHandle {
    let journal = journal.clone();
    events.listen(
        pattern,
        listener_fn(move |event: Event| {
            let journal = journal.clone();
            async move {
                let detail = event.str_field("name").or_else(|| event.str_field("stage"));
                match detail {
                    Some(detail) => journal.record(format!("{}:{detail}", event.name)),
                    None => journal.record(event.name.clone()),
                }
                Ok(())
            }
        }),
    )
}
