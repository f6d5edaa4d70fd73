//! Shared fixtures for coordinator tests.

use super::LifecycleCoordinator;
use locator_host::implementations::memory::{MemoryHost, ModuleDefinition};
use locator_host::{EventBus, ModuleHost};
use locator_registry::implementations::memory::MemoryLocator;
use locator_registry::SharedLocator;
use locator_types::{
	FactoryResolver, Module, ModuleError, ModuleEvent, ModuleId, ModuleState, Pattern,
	ResourceRef, TypeHandle,
};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

pub const NAMESPACE: &str = "META-INF/services/";

/// A locator call observed by [`RecordingLocator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
	pub register: bool,
	pub factory_id: String,
	pub module: ModuleId,
	pub removed: bool,
}

/// Memory locator that records every register and unregister call.
#[derive(Default)]
pub struct RecordingLocator {
	inner: MemoryLocator,
	calls: Mutex<Vec<Call>>,
}

impl RecordingLocator {
	pub fn calls(&self) -> Vec<Call> {
		self.calls.lock().unwrap().clone()
	}

	pub fn registers(&self) -> Vec<Call> {
		self.calls().into_iter().filter(|call| call.register).collect()
	}

	pub fn unregisters(&self) -> Vec<Call> {
		self.calls()
			.into_iter()
			.filter(|call| !call.register)
			.collect()
	}

	pub fn register_count(&self) -> usize {
		self.registers().len()
	}

	/// Modules that still have at least one resolver registered.
	pub fn origins(&self) -> Vec<ModuleId> {
		self.snapshot().into_values().flatten().collect()
	}

	pub fn clear(&self) {
		self.calls.lock().unwrap().clear();
	}
}

impl SharedLocator for RecordingLocator {
	fn register(&self, factory_id: &str, resolver: FactoryResolver) {
		self.calls.lock().unwrap().push(Call {
			register: true,
			factory_id: factory_id.to_string(),
			module: resolver.origin(),
			removed: false,
		});
		self.inner.register(factory_id, resolver);
	}

	fn unregister(&self, factory_id: &str, resolver: &FactoryResolver) -> bool {
		let removed = self.inner.unregister(factory_id, resolver);
		self.calls.lock().unwrap().push(Call {
			register: false,
			factory_id: factory_id.to_string(),
			module: resolver.origin(),
			removed,
		});
		removed
	}

	fn locate(&self, factory_id: &str) -> Option<FactoryResolver> {
		self.inner.locate(factory_id)
	}

	fn locate_all(&self, factory_id: &str) -> Vec<FactoryResolver> {
		self.inner.locate_all(factory_id)
	}

	fn snapshot(&self) -> BTreeMap<String, Vec<ModuleId>> {
		self.inner.snapshot()
	}
}

/// Module whose resource listing always fails.
pub struct FailingModule(pub ModuleId);

impl Module for FailingModule {
	fn id(&self) -> ModuleId {
		self.0
	}

	fn name(&self) -> &str {
		"failing"
	}

	fn state(&self) -> ModuleState {
		ModuleState::Resolved
	}

	fn find_entries(
		&self,
		_path: &str,
		_pattern: Option<&Pattern>,
		_recursive: bool,
	) -> Result<Vec<ResourceRef>, ModuleError> {
		Err(ModuleError::Io(std::io::Error::other("storage unavailable")))
	}

	fn open_resource(
		&self,
		resource: &ResourceRef,
	) -> Result<Box<dyn std::io::Read + Send>, ModuleError> {
		Err(ModuleError::NotFound(resource.path.clone()))
	}

	fn load_type(&self, name: &str) -> Result<TypeHandle, ModuleError> {
		Err(ModuleError::ClassLoad {
			name: name.to_string(),
			module: self.0,
		})
	}
}

/// Host with a fixed module list and an event stream nobody publishes on.
pub struct StaticHost {
	modules: Vec<Arc<dyn Module>>,
	event_bus: EventBus,
}

impl StaticHost {
	pub fn new(modules: Vec<Arc<dyn Module>>) -> Self {
		Self {
			modules,
			event_bus: EventBus::default(),
		}
	}
}

impl ModuleHost for StaticHost {
	fn modules(&self) -> Vec<Arc<dyn Module>> {
		self.modules.clone()
	}

	fn module(&self, id: ModuleId) -> Option<Arc<dyn Module>> {
		self.modules.iter().find(|module| module.id() == id).cloned()
	}

	fn subscribe(&self) -> broadcast::Receiver<ModuleEvent> {
		self.event_bus.subscribe()
	}
}

pub trait ModuleLookup {
	fn module_arc(&self, id: ModuleId) -> Arc<dyn Module>;
}

impl ModuleLookup for MemoryHost {
	fn module_arc(&self, id: ModuleId) -> Arc<dyn Module> {
		self.module(id).expect("module is installed")
	}
}

pub fn widget_module() -> ModuleDefinition {
	ModuleDefinition::new("widgets").factory(NAMESPACE, "widget", "com.acme.WidgetFactory")
}

pub fn fixture() -> (Arc<MemoryHost>, Arc<RecordingLocator>, LifecycleCoordinator) {
	fixture_with_bus(EventBus::default())
}

pub fn fixture_with_bus(
	event_bus: EventBus,
) -> (Arc<MemoryHost>, Arc<RecordingLocator>, LifecycleCoordinator) {
	let host = Arc::new(MemoryHost::with_event_bus(event_bus));
	let locator = Arc::new(RecordingLocator::default());
	let coordinator = LifecycleCoordinator::new(host.clone(), locator.clone());
	(host, locator, coordinator)
}

/// Waits until `condition` holds, failing the test after five seconds.
pub async fn eventually<F: Fn() -> bool>(condition: F) {
	tokio::time::timeout(Duration::from_secs(5), async {
		while !condition() {
			tokio::time::sleep(Duration::from_millis(5)).await;
		}
	})
	.await
	.expect("condition not reached in time");
}
