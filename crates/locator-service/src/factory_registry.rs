//! Dynamic factory registry for locator implementations.
//!
//! Collects the factory functions of every module host and shared locator
//! implementation so they can be selected by name from configuration.

use locator_config::Config;
use locator_core::{CoordinatorBuilder, LifecycleCoordinator, LocatorFactories};
use locator_host::HostFactory;
use locator_registry::LocatorFactory;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Global registry for all implementation factories
#[derive(Default)]
pub struct FactoryRegistry {
	pub host: HashMap<String, HostFactory>,
	pub registry: HashMap<String, LocatorFactory>,
}

impl FactoryRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn register_host(&mut self, name: impl Into<String>, factory: HostFactory) {
		self.host.insert(name.into(), factory);
	}

	pub fn register_locator(&mut self, name: impl Into<String>, factory: LocatorFactory) {
		self.registry.insert(name.into(), factory);
	}
}

static REGISTRY: OnceLock<FactoryRegistry> = OnceLock::new();

/// Initialize the global registry with all available implementations
pub fn initialize_registry() -> &'static FactoryRegistry {
	REGISTRY.get_or_init(|| {
		let mut registry = FactoryRegistry::new();

		for (name, factory) in locator_host::get_all_implementations() {
			tracing::debug!("Registering host implementation: {}", name);
			registry.register_host(name, factory);
		}

		for (name, factory) in locator_registry::get_all_implementations() {
			tracing::debug!("Registering registry implementation: {}", name);
			registry.register_locator(name, factory);
		}

		registry
	})
}

/// Selects the factories named in `configured`, failing on unknown names.
fn select<F: Copy>(
	available: &HashMap<String, F>,
	configured: &HashMap<String, toml::Value>,
	kind: &str,
) -> Result<HashMap<String, F>, String> {
	let mut factories = HashMap::new();
	for name in configured.keys() {
		match available.get(name) {
			Some(factory) => {
				factories.insert(name.clone(), *factory);
			}
			None => {
				let mut names: Vec<_> = available.keys().cloned().collect();
				names.sort();
				return Err(format!(
					"Unknown {} implementation '{}'. Available: [{}]",
					kind,
					name,
					names.join(", ")
				));
			}
		}
	}
	Ok(factories)
}

/// Build a coordinator using the registry and config
pub fn build_coordinator_from_config(
	config: Config,
) -> Result<LifecycleCoordinator, Box<dyn std::error::Error>> {
	let registry = initialize_registry();

	let factories = LocatorFactories {
		host_factories: select(&registry.host, &config.host.implementations, "host")?,
		locator_factories: select(
			&registry.registry,
			&config.registry.implementations,
			"registry",
		)?,
	};

	Ok(CoordinatorBuilder::new(config).build(factories)?)
}
