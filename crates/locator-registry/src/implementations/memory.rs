//! In-memory shared locator implementation.
//!
//! Resolvers are kept per identifier in registration order. The most recently
//! registered resolver wins on [`SharedLocator::locate`], so a freshly
//! resolved module shadows older contributors until it is withdrawn.

use crate::{LocatorFactory, LocatorRegistry, RegistryError, SharedLocator};
use dashmap::DashMap;
use locator_types::{FactoryResolver, ImplementationRegistry, ModuleId};
use std::collections::BTreeMap;

/// Concurrent in-memory locator.
#[derive(Default)]
pub struct MemoryLocator {
	factories: DashMap<String, Vec<FactoryResolver>>,
}

impl MemoryLocator {
	pub fn new() -> Self {
		Self::default()
	}
}

impl SharedLocator for MemoryLocator {
	fn register(&self, factory_id: &str, resolver: FactoryResolver) {
		self.factories
			.entry(factory_id.to_string())
			.or_default()
			.push(resolver);
	}

	fn unregister(&self, factory_id: &str, resolver: &FactoryResolver) -> bool {
		let removed = match self.factories.get_mut(factory_id) {
			Some(mut resolvers) => match resolvers.iter().position(|r| r.same_as(resolver)) {
				Some(index) => {
					resolvers.remove(index);
					true
				}
				None => false,
			},
			None => false,
		};

		// The shard guard above is released before touching the map again
		if removed {
			self.factories
				.remove_if(factory_id, |_, resolvers| resolvers.is_empty());
		}
		removed
	}

	fn locate(&self, factory_id: &str) -> Option<FactoryResolver> {
		self.factories
			.get(factory_id)
			.and_then(|resolvers| resolvers.last().cloned())
	}

	fn locate_all(&self, factory_id: &str) -> Vec<FactoryResolver> {
		self.factories
			.get(factory_id)
			.map(|resolvers| resolvers.clone())
			.unwrap_or_default()
	}

	fn snapshot(&self) -> BTreeMap<String, Vec<ModuleId>> {
		self.factories
			.iter()
			.map(|entry| {
				let origins = entry.value().iter().map(|r| r.origin()).collect();
				(entry.key().clone(), origins)
			})
			.collect()
	}
}

/// Factory function to create a memory locator from configuration.
///
/// Configuration parameters:
/// - None required for the memory locator
pub fn create_locator(config: &toml::Value) -> Result<Box<dyn SharedLocator>, RegistryError> {
	if !config.is_table() {
		return Err(RegistryError::Configuration(
			"memory locator configuration must be a table".into(),
		));
	}
	Ok(Box::new(MemoryLocator::new()))
}

/// Registry for the memory locator implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "memory";
	type Factory = LocatorFactory;

	fn factory() -> Self::Factory {
		create_locator
	}
}

impl LocatorRegistry for Registry {}
