//! In-memory module host implementation.
//!
//! Modules are defined programmatically (or inline in configuration) and their
//! lifecycle is driven through explicit calls. Every state change is published
//! on the host's event bus, which makes this host the natural fixture for
//! exercising lifecycle handling without touching the filesystem.

use crate::utils::list_entries;
use crate::{EventBus, HostError, HostFactory, HostRegistry, ModuleHost, StateCell};
use locator_types::{
	ImplementationRegistry, Module, ModuleError, ModuleEvent, ModuleEventKind, ModuleId,
	ModuleState, Pattern, ResourceRef, TypeHandle,
};
use parking_lot::RwLock;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::io::{Cursor, Read};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Content of a module before it is installed.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModuleDefinition {
	pub name: String,
	/// Resource path to content.
	#[serde(default)]
	pub resources: BTreeMap<String, String>,
	/// Type names the module can load.
	#[serde(default)]
	pub exports: BTreeSet<String>,
}

impl ModuleDefinition {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			..Default::default()
		}
	}

	/// Adds a resource at the given path.
	pub fn resource(mut self, path: impl Into<String>, content: impl Into<String>) -> Self {
		self.resources.insert(path.into(), content.into());
		self
	}

	/// Declares a loadable type.
	pub fn export(mut self, type_name: impl Into<String>) -> Self {
		self.exports.insert(type_name.into());
		self
	}

	/// Adds a factory descriptor under `namespace` and exports its type.
	pub fn factory(self, namespace: &str, factory_id: &str, type_name: &str) -> Self {
		let path = format!("{}{}", crate::utils::namespace_prefix(namespace), factory_id);
		self.resource(path, format!("{}\n", type_name))
			.export(type_name)
	}
}

/// A module held by the [`MemoryHost`].
#[derive(Debug)]
pub struct MemoryModule {
	id: ModuleId,
	definition: ModuleDefinition,
	state: StateCell,
}

impl Module for MemoryModule {
	fn id(&self) -> ModuleId {
		self.id
	}

	fn name(&self) -> &str {
		&self.definition.name
	}

	fn state(&self) -> ModuleState {
		self.state.get()
	}

	fn find_entries(
		&self,
		path: &str,
		pattern: Option<&Pattern>,
		recursive: bool,
	) -> Result<Vec<ResourceRef>, ModuleError> {
		Ok(list_entries(
			self.definition.resources.keys().map(String::as_str),
			path,
			pattern,
			recursive,
		))
	}

	fn open_resource(&self, resource: &ResourceRef) -> Result<Box<dyn Read + Send>, ModuleError> {
		self.definition
			.resources
			.get(&resource.path)
			.map(|content| Box::new(Cursor::new(content.clone().into_bytes())) as Box<dyn Read + Send>)
			.ok_or_else(|| ModuleError::NotFound(resource.path.clone()))
	}

	fn load_type(&self, name: &str) -> Result<TypeHandle, ModuleError> {
		if self.state().is_resolved() && self.definition.exports.contains(name) {
			Ok(TypeHandle {
				name: name.to_string(),
				module: self.id,
			})
		} else {
			Err(ModuleError::ClassLoad {
				name: name.to_string(),
				module: self.id,
			})
		}
	}
}

/// Module host whose lifecycle is driven by method calls.
pub struct MemoryHost {
	modules: RwLock<BTreeMap<ModuleId, Arc<MemoryModule>>>,
	next_id: AtomicU64,
	event_bus: EventBus,
}

impl Default for MemoryHost {
	fn default() -> Self {
		Self::new()
	}
}

impl MemoryHost {
	pub fn new() -> Self {
		Self::with_event_bus(EventBus::default())
	}

	pub fn with_event_bus(event_bus: EventBus) -> Self {
		Self {
			modules: RwLock::new(BTreeMap::new()),
			next_id: AtomicU64::new(1),
			event_bus,
		}
	}

	/// Installs a module and returns its id.
	pub fn install(&self, definition: ModuleDefinition) -> ModuleId {
		let id = ModuleId(self.next_id.fetch_add(1, Ordering::Relaxed));
		let module = Arc::new(MemoryModule {
			id,
			definition,
			state: StateCell::new(ModuleState::Installed),
		});
		self.modules.write().insert(id, Arc::clone(&module));
		tracing::debug!(module_id = %id, module = %module.name(), "Installed module");
		self.publish(module, ModuleEventKind::Installed);
		id
	}

	/// Makes the module's types loadable. Resolving a resolved module is a no-op.
	pub fn resolve(&self, id: ModuleId) -> Result<(), HostError> {
		let module = self.get(id)?;
		if module.state().is_resolved() {
			return Ok(());
		}
		module.state.set(ModuleState::Resolved);
		self.publish(module, ModuleEventKind::Resolved);
		Ok(())
	}

	/// Starts the module, resolving it first if needed.
	pub fn start(&self, id: ModuleId) -> Result<(), HostError> {
		self.resolve(id)?;
		let module = self.get(id)?;
		if module.state() == ModuleState::Active {
			return Ok(());
		}
		module.state.set(ModuleState::Active);
		self.publish(module, ModuleEventKind::Started);
		Ok(())
	}

	/// Stops an active module, leaving it resolved.
	pub fn stop(&self, id: ModuleId) -> Result<(), HostError> {
		let module = self.get(id)?;
		if module.state() != ModuleState::Active {
			return Ok(());
		}
		module.state.set(ModuleState::Resolved);
		self.publish(module, ModuleEventKind::Stopped);
		Ok(())
	}

	/// Returns the module to the installed state. No-op if not resolved.
	pub fn unresolve(&self, id: ModuleId) -> Result<(), HostError> {
		let module = self.get(id)?;
		if !module.state().is_resolved() {
			return Ok(());
		}
		module.state.set(ModuleState::Installed);
		self.publish(module, ModuleEventKind::Unresolved);
		Ok(())
	}

	/// Removes the module, unresolving it first if needed.
	pub fn uninstall(&self, id: ModuleId) -> Result<(), HostError> {
		self.unresolve(id)?;
		let module = self
			.modules
			.write()
			.remove(&id)
			.ok_or(HostError::UnknownModule(id))?;
		module.state.set(ModuleState::Uninstalled);
		tracing::debug!(module_id = %id, module = %module.name(), "Uninstalled module");
		self.publish(module, ModuleEventKind::Uninstalled);
		Ok(())
	}

	/// Replaces the module's content, keeping its id.
	///
	/// A resolved module is unresolved before the swap and resolved again after
	/// it, so observers see the old content withdrawn and the new one published.
	pub fn update(&self, id: ModuleId, definition: ModuleDefinition) -> Result<(), HostError> {
		let was_resolved = self.get(id)?.state().is_resolved();
		self.unresolve(id)?;

		let module = Arc::new(MemoryModule {
			id,
			definition,
			state: StateCell::new(ModuleState::Installed),
		});
		self.modules.write().insert(id, Arc::clone(&module));
		self.publish(module, ModuleEventKind::Updated);

		if was_resolved {
			self.resolve(id)?;
		}
		Ok(())
	}

	/// Publishes an event for a module without changing its state.
	///
	/// Mirrors hosts that redeliver notifications.
	pub fn replay(&self, id: ModuleId, kind: ModuleEventKind) -> Result<(), HostError> {
		let module = self.get(id)?;
		self.publish(module, kind);
		Ok(())
	}

	fn get(&self, id: ModuleId) -> Result<Arc<MemoryModule>, HostError> {
		self.modules
			.read()
			.get(&id)
			.cloned()
			.ok_or(HostError::UnknownModule(id))
	}

	fn publish(&self, module: Arc<MemoryModule>, kind: ModuleEventKind) {
		self.event_bus.publish(ModuleEvent::new(module, kind));
	}
}

impl ModuleHost for MemoryHost {
	fn modules(&self) -> Vec<Arc<dyn Module>> {
		self.modules
			.read()
			.values()
			.map(|module| Arc::clone(module) as Arc<dyn Module>)
			.collect()
	}

	fn module(&self, id: ModuleId) -> Option<Arc<dyn Module>> {
		self.modules
			.read()
			.get(&id)
			.map(|module| Arc::clone(module) as Arc<dyn Module>)
	}

	fn subscribe(&self) -> broadcast::Receiver<ModuleEvent> {
		self.event_bus.subscribe()
	}
}

#[derive(Debug, Default, Deserialize)]
struct MemoryHostConfig {
	#[serde(default)]
	modules: Vec<ModuleDefinition>,
}

/// Factory function to create a memory host from configuration.
///
/// Configuration parameters:
/// - `modules`: optional array of module definitions (`name`, `resources`,
///   `exports`). Each is installed and resolved in order.
pub fn create_host(config: &toml::Value) -> Result<Box<dyn ModuleHost>, HostError> {
	let config: MemoryHostConfig = config
		.clone()
		.try_into()
		.map_err(|e: toml::de::Error| HostError::Configuration(e.message().to_string()))?;

	let host = MemoryHost::new();
	for definition in config.modules {
		if definition.name.is_empty() {
			return Err(HostError::Configuration(
				"memory host modules must have a name".into(),
			));
		}
		let id = host.install(definition);
		host.resolve(id)?;
	}
	Ok(Box::new(host))
}

/// Registry for the memory host implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "memory";
	type Factory = HostFactory;

	fn factory() -> Self::Factory {
		create_host
	}
}

impl HostRegistry for Registry {}
