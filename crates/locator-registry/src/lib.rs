//! Shared locator module for the factory locator system.
//!
//! The shared locator is the process-wide table that maps factory identifiers to
//! deferred resolvers. Any number of contributors may register resolvers for the
//! same identifier; removal is exact-match on the resolver instance. Which of
//! several resolvers a caller receives is the locator's own policy.

use locator_types::{FactoryResolver, ImplementationRegistry, ModuleId, ResolutionError, TypeHandle};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod memory;
}

/// Errors that can occur during locator operations.
#[derive(Debug, Error)]
pub enum RegistryError {
	/// Error that occurs when no resolver is registered for an identifier.
	#[error("No factory registered for '{0}'")]
	NotFound(String),
	/// Error that occurs when a registered resolver fails to load its type.
	#[error("Resolution error: {0}")]
	Resolution(#[from] ResolutionError),
	/// Error that occurs during configuration validation.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Trait defining the interface for shared locator backends.
///
/// Implementations must be safe to call concurrently from several
/// contributors; no caller-side locking is assumed.
pub trait SharedLocator: Send + Sync {
	/// Adds a resolver under the given identifier. Duplicates are kept.
	fn register(&self, factory_id: &str, resolver: FactoryResolver);

	/// Removes one resolver that is the same instance as `resolver`.
	///
	/// Returns whether anything was removed. Other resolvers registered for the
	/// identifier are left untouched.
	fn unregister(&self, factory_id: &str, resolver: &FactoryResolver) -> bool;

	/// Returns the resolver callers should use for the identifier, if any.
	fn locate(&self, factory_id: &str) -> Option<FactoryResolver>;

	/// Returns every resolver registered for the identifier in registration order.
	fn locate_all(&self, factory_id: &str) -> Vec<FactoryResolver>;

	/// Returns the contributing modules for every registered identifier.
	fn snapshot(&self) -> BTreeMap<String, Vec<ModuleId>>;
}

/// Type alias for locator factory functions.
pub type LocatorFactory = fn(&toml::Value) -> Result<Box<dyn SharedLocator>, RegistryError>;

/// Registry trait for locator implementations.
pub trait LocatorRegistry: ImplementationRegistry<Factory = LocatorFactory> {}

/// Get all registered locator implementations.
///
/// Returns a vector of (name, factory) tuples for all available locator implementations.
pub fn get_all_implementations() -> Vec<(&'static str, LocatorFactory)> {
	use implementations::memory;

	vec![(memory::Registry::NAME, memory::Registry::factory())]
}

/// High-level service used by client code to obtain factory types.
pub struct RegistryService {
	locator: Arc<dyn SharedLocator>,
}

impl RegistryService {
	pub fn new(locator: Arc<dyn SharedLocator>) -> Self {
		Self { locator }
	}

	/// Returns the underlying locator.
	pub fn locator(&self) -> &Arc<dyn SharedLocator> {
		&self.locator
	}

	/// Locates the resolver for `factory_id` and loads its type.
	pub fn resolve(&self, factory_id: &str) -> Result<TypeHandle, RegistryError> {
		let resolver = self
			.locator
			.locate(factory_id)
			.ok_or_else(|| RegistryError::NotFound(factory_id.to_string()))?;
		Ok(resolver.resolve()?)
	}

	/// Loads the type of every resolver registered for `factory_id`.
	///
	/// Resolvers that fail are skipped with a warning so one broken contributor
	/// does not hide the others.
	pub fn resolve_all(&self, factory_id: &str) -> Vec<TypeHandle> {
		self.locator
			.locate_all(factory_id)
			.into_iter()
			.filter_map(|resolver| match resolver.resolve() {
				Ok(handle) => Some(handle),
				Err(e) => {
					tracing::warn!(
						factory_id = %factory_id,
						module_id = %resolver.origin(),
						error = %e,
						"Skipping factory that failed to resolve"
					);
					None
				}
			})
			.collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use implementations::memory::MemoryLocator;

	fn resolver(module: u64, name: &'static str) -> FactoryResolver {
		FactoryResolver::new(ModuleId(module), "META-INF/services/widget", move || {
			Ok(TypeHandle {
				name: name.to_string(),
				module: ModuleId(module),
			})
		})
	}

	fn failing(module: u64) -> FactoryResolver {
		FactoryResolver::new(ModuleId(module), "META-INF/services/widget", || {
			Err(ResolutionError::EmptyDescriptor(
				"META-INF/services/widget".into(),
			))
		})
	}

	#[test]
	fn test_resolve_unknown_identifier() {
		let service = RegistryService::new(Arc::new(MemoryLocator::new()));
		assert!(matches!(
			service.resolve("widget"),
			Err(RegistryError::NotFound(id)) if id == "widget"
		));
	}

	#[test]
	fn test_resolve_uses_located_resolver() {
		let locator = Arc::new(MemoryLocator::new());
		locator.register("widget", resolver(1, "com.acme.WidgetFactory"));
		let service = RegistryService::new(locator);

		let handle = service.resolve("widget").unwrap();
		assert_eq!(handle.name, "com.acme.WidgetFactory");
	}

	#[test]
	fn test_resolution_failure_is_reported() {
		let locator = Arc::new(MemoryLocator::new());
		locator.register("widget", failing(1));
		let service = RegistryService::new(locator);

		assert!(matches!(
			service.resolve("widget"),
			Err(RegistryError::Resolution(_))
		));
	}

	#[test]
	fn test_resolve_all_skips_failures() {
		let locator = Arc::new(MemoryLocator::new());
		locator.register("widget", resolver(1, "com.acme.WidgetFactory"));
		locator.register("widget", failing(2));
		locator.register("widget", resolver(3, "org.other.Widget"));
		let service = RegistryService::new(locator);

		let names: Vec<_> = service
			.resolve_all("widget")
			.into_iter()
			.map(|handle| handle.name)
			.collect();
		assert_eq!(names, vec!["com.acme.WidgetFactory", "org.other.Widget"]);
	}

	#[test]
	fn test_all_implementations_are_listed() {
		let names: Vec<_> = get_all_implementations()
			.into_iter()
			.map(|(name, _)| name)
			.collect();
		assert_eq!(names, vec!["memory"]);
	}
}
