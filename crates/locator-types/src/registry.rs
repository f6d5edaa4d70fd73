//! Registry trait for self-registering implementations.
//!
//! Pluggable components (module hosts, shared locators) expose a `Registry`
//! struct implementing this trait so the service can build them by the name
//! used in configuration.

/// Base trait for implementation registries.
pub trait ImplementationRegistry {
	/// The name used in configuration files to reference this implementation.
	///
	/// This must match the key used in the TOML configuration, for example
	/// "memory" for `registry.implementations.memory` or "directory" for
	/// `host.implementations.directory`.
	const NAME: &'static str;

	/// The factory function type this implementation provides.
	type Factory;

	/// Get the factory function for this implementation.
	fn factory() -> Self::Factory;
}
