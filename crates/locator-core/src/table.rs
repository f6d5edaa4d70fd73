//! Per-module record of published factory bindings.
//!
//! The table maps a module to the resolvers it has published, keyed by factory
//! identifier. Resolvers accumulate across discovery passes so that repeated
//! activations of a module can be withdrawn completely. A module only has an
//! entry while it has at least one binding; empty entries are never stored.
//! Each entry also remembers the module instance that last contributed to it,
//! so a host replacing a module under the same id can be detected.
//!
//! The table performs no locking of its own. The coordinator owns it and
//! serialises every access together with the matching locator call.

use locator_types::{FactoryResolver, Module, ModuleId};
use std::collections::HashMap;
use std::sync::Arc;

/// Bindings contributed by a single module.
pub type ModuleBindings = HashMap<String, Vec<FactoryResolver>>;

struct ModuleEntry {
	source: Arc<dyn Module>,
	bindings: ModuleBindings,
}

#[derive(Default)]
pub struct ModuleBindingTable {
	modules: HashMap<ModuleId, ModuleEntry>,
}

impl ModuleBindingTable {
	pub fn new() -> Self {
		Self::default()
	}

	/// Records a binding, creating the module's entry on first use.
	pub fn put(
		&mut self,
		module: &Arc<dyn Module>,
		factory_id: impl Into<String>,
		resolver: FactoryResolver,
	) {
		let entry = self
			.modules
			.entry(module.id())
			.or_insert_with(|| ModuleEntry {
				source: Arc::clone(module),
				bindings: ModuleBindings::new(),
			});
		if !Arc::ptr_eq(&entry.source, module) {
			entry.source = Arc::clone(module);
		}
		entry
			.bindings
			.entry(factory_id.into())
			.or_default()
			.push(resolver);
	}

	pub fn get_all(&self, module: ModuleId) -> Option<&ModuleBindings> {
		self.modules.get(&module).map(|entry| &entry.bindings)
	}

	/// Removes and returns every binding of the module.
	pub fn remove_all(&mut self, module: ModuleId) -> Option<ModuleBindings> {
		self.modules.remove(&module).map(|entry| entry.bindings)
	}

	/// Module instance that last contributed bindings under this id.
	pub fn source(&self, module: ModuleId) -> Option<&Arc<dyn Module>> {
		self.modules.get(&module).map(|entry| &entry.source)
	}

	pub fn contains(&self, module: ModuleId) -> bool {
		self.modules.contains_key(&module)
	}

	/// Returns some module that still has bindings, in no particular order.
	pub fn any_module(&self) -> Option<ModuleId> {
		self.modules.keys().next().copied()
	}

	pub fn module_ids(&self) -> Vec<ModuleId> {
		let mut ids: Vec<_> = self.modules.keys().copied().collect();
		ids.sort();
		ids
	}

	pub fn len(&self) -> usize {
		self.modules.len()
	}

	pub fn is_empty(&self) -> bool {
		self.modules.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use locator_host::implementations::memory::{MemoryHost, ModuleDefinition};
	use locator_host::ModuleHost;
	use locator_types::TypeHandle;

	fn resolver(module: ModuleId) -> FactoryResolver {
		FactoryResolver::new(module, "META-INF/services/widget", move || {
			Ok(TypeHandle {
				name: "com.acme.WidgetFactory".into(),
				module,
			})
		})
	}

	fn modules(count: usize) -> Vec<Arc<dyn Module>> {
		let host = MemoryHost::new();
		(0..count)
			.map(|index| {
				let id = host.install(ModuleDefinition::new(format!("module-{}", index)));
				host.module(id).unwrap()
			})
			.collect()
	}

	#[test]
	fn test_put_creates_entry() {
		let module = modules(1).remove(0);
		let mut table = ModuleBindingTable::new();
		assert!(table.get_all(module.id()).is_none());

		table.put(&module, "widget", resolver(module.id()));
		assert!(table.contains(module.id()));
		assert_eq!(table.get_all(module.id()).unwrap()["widget"].len(), 1);
		assert!(Arc::ptr_eq(table.source(module.id()).unwrap(), &module));
	}

	#[test]
	fn test_put_accumulates_per_identifier() {
		let module = modules(1).remove(0);
		let mut table = ModuleBindingTable::new();
		let first = resolver(module.id());
		let second = resolver(module.id());
		table.put(&module, "widget", first.clone());
		table.put(&module, "widget", second.clone());

		assert_eq!(
			table.get_all(module.id()).unwrap()["widget"],
			vec![first, second]
		);
		assert_eq!(table.len(), 1);
	}

	#[test]
	fn test_put_tracks_latest_instance() {
		let host = MemoryHost::new();
		let id = host.install(ModuleDefinition::new("widgets"));
		let original = host.module(id).unwrap();
		host.update(id, ModuleDefinition::new("gadgets")).unwrap();
		let replacement = host.module(id).unwrap();
		assert!(!Arc::ptr_eq(&original, &replacement));

		let mut table = ModuleBindingTable::new();
		table.put(&original, "widget", resolver(id));
		table.put(&replacement, "gadget", resolver(id));

		assert!(Arc::ptr_eq(table.source(id).unwrap(), &replacement));
		assert_eq!(table.get_all(id).unwrap().len(), 2);
	}

	#[test]
	fn test_remove_all_clears_entry() {
		let modules = modules(2);
		let (first, second) = (modules[0].id(), modules[1].id());
		let mut table = ModuleBindingTable::new();
		table.put(&modules[0], "widget", resolver(first));
		table.put(&modules[0], "audit", resolver(first));
		table.put(&modules[1], "widget", resolver(second));

		let removed = table.remove_all(first).unwrap();
		assert_eq!(removed.len(), 2);
		assert!(!table.contains(first));
		assert!(table.source(first).is_none());
		assert!(table.remove_all(first).is_none());
		assert_eq!(table.module_ids(), vec![second]);
		assert_eq!(table.any_module(), Some(second));
	}

	#[test]
	fn test_empty_table() {
		let table = ModuleBindingTable::new();
		assert!(table.is_empty());
		assert!(table.any_module().is_none());
	}
}
