//! Builder pattern for constructing lifecycle coordinators.
//!
//! Composes a LifecycleCoordinator from a module host and a shared locator,
//! both created through factory functions selected by the configuration.

use crate::engine::LifecycleCoordinator;
use locator_config::Config;
use locator_discovery::DescriptorReader;
use locator_host::{HostError, ModuleHost};
use locator_registry::{RegistryError, SharedLocator};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during coordinator construction.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Missing required component: {0}")]
	MissingComponent(String),
}

/// Factory functions for the pluggable parts of a coordinator, keyed by
/// implementation name.
pub struct LocatorFactories<HF, LF> {
	pub host_factories: HashMap<String, HF>,
	pub locator_factories: HashMap<String, LF>,
}

/// Builder for constructing a LifecycleCoordinator with pluggable implementations.
pub struct CoordinatorBuilder {
	config: Config,
}

impl CoordinatorBuilder {
	pub fn new(config: Config) -> Self {
		Self { config }
	}

	/// Builds the coordinator from the primary host and registry implementations.
	///
	/// Every configured implementation with a known factory is instantiated so
	/// configuration mistakes surface early; only the primary ones are kept.
	pub fn build<HF, LF>(
		self,
		factories: LocatorFactories<HF, LF>,
	) -> Result<LifecycleCoordinator, BuilderError>
	where
		HF: Fn(&toml::Value) -> Result<Box<dyn ModuleHost>, HostError>,
		LF: Fn(&toml::Value) -> Result<Box<dyn SharedLocator>, RegistryError>,
	{
		let mut hosts = HashMap::new();
		for (name, config) in &self.config.host.implementations {
			let Some(factory) = factories.host_factories.get(name) else {
				tracing::warn!(component = "host", implementation = %name, "No factory registered");
				continue;
			};
			match factory(config) {
				Ok(host) => {
					let is_primary = &self.config.host.primary == name;
					tracing::info!(component = "host", implementation = %name, enabled = %is_primary, "Loaded");
					hosts.insert(name.clone(), host);
				}
				Err(e) => {
					tracing::error!(
						component = "host",
						implementation = %name,
						error = %e,
						"Failed to create module host"
					);
					return Err(BuilderError::Config(format!(
						"Failed to create host implementation '{}': {}",
						name, e
					)));
				}
			}
		}

		let primary_host = &self.config.host.primary;
		let host: Arc<dyn ModuleHost> = hosts
			.remove(primary_host)
			.map(Arc::from)
			.ok_or_else(|| BuilderError::MissingComponent(format!("host '{}'", primary_host)))?;

		let mut locators = HashMap::new();
		for (name, config) in &self.config.registry.implementations {
			let Some(factory) = factories.locator_factories.get(name) else {
				tracing::warn!(component = "registry", implementation = %name, "No factory registered");
				continue;
			};
			match factory(config) {
				Ok(locator) => {
					let is_primary = &self.config.registry.primary == name;
					tracing::info!(component = "registry", implementation = %name, enabled = %is_primary, "Loaded");
					locators.insert(name.clone(), locator);
				}
				Err(e) => {
					tracing::error!(
						component = "registry",
						implementation = %name,
						error = %e,
						"Failed to create shared locator"
					);
					return Err(BuilderError::Config(format!(
						"Failed to create registry implementation '{}': {}",
						name, e
					)));
				}
			}
		}

		let primary_registry = &self.config.registry.primary;
		let locator: Arc<dyn SharedLocator> = locators
			.remove(primary_registry)
			.map(Arc::from)
			.ok_or_else(|| {
				BuilderError::MissingComponent(format!("registry '{}'", primary_registry))
			})?;

		let reader = DescriptorReader::new(
			self.config.locator.namespace.clone(),
			&self.config.locator.pattern,
		)
		.map_err(|e| BuilderError::Config(e.to_string()))?;
		tracing::debug!(
			namespace = %reader.namespace(),
			pattern = %reader.pattern(),
			"Configured descriptor reader"
		);

		Ok(LifecycleCoordinator::with_reader(host, locator, reader))
	}
}
