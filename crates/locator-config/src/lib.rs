//! Configuration module for the factory locator system.
//!
//! This module provides structures and utilities for managing locator
//! configuration. Configuration is loaded from TOML, environment variable
//! references of the form `${VAR}` or `${VAR:-default}` are expanded before
//! parsing, and the result is validated before use.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Extract just the message without the huge input dump
		let message = err.message().to_string();
		ConfigError::Parse(message)
	}
}

/// Main configuration structure for the locator.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Configuration specific to this locator instance.
	pub locator: LocatorConfig,
	/// Configuration for the module host.
	pub host: HostConfig,
	/// Configuration for the shared locator backend.
	pub registry: RegistryConfig,
}

/// Configuration specific to the locator instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LocatorConfig {
	/// Identifier used in logs.
	pub id: String,
	/// Namespace scanned for factory descriptors inside each module.
	#[serde(default = "default_namespace")]
	pub namespace: String,
	/// Pattern selecting descriptors within the namespace.
	#[serde(default = "default_pattern")]
	pub pattern: String,
}

fn default_namespace() -> String {
	"META-INF/services/".to_string()
}

fn default_pattern() -> String {
	"*".to_string()
}

/// Configuration for the module host.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HostConfig {
	/// Which implementation to use.
	pub primary: String,
	/// Map of host implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
	/// Seconds between host refreshes. 0 disables polling.
	#[serde(default)]
	pub poll_interval_seconds: u64,
}

/// Configuration for the shared locator backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RegistryConfig {
	/// Which implementation to use.
	pub primary: String,
	/// Map of locator implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// Resolves environment variables in a string.
///
/// Replaces ${VAR_NAME} with the value of the environment variable VAR_NAME.
/// Supports default values with ${VAR_NAME:-default_value}.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	// Limit input size to keep the regex scan bounded
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut missing = None;
	let result = re.replace_all(input, |caps: &regex::Captures| {
		let var_name = &caps[1];
		match std::env::var(var_name) {
			Ok(value) => value,
			Err(_) => match caps.get(2) {
				Some(default) => default.as_str().to_string(),
				None => {
					missing.get_or_insert_with(|| var_name.to_string());
					String::new()
				}
			},
		}
	});

	if let Some(var_name) = missing {
		return Err(ConfigError::Validation(format!(
			"Environment variable '{}' not found",
			var_name
		)));
	}
	Ok(result.into_owned())
}

impl Config {
	/// Loads configuration from a file asynchronously.
	pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		let content = tokio::fs::read_to_string(path).await.map_err(|e| {
			ConfigError::Io(std::io::Error::new(
				e.kind(),
				format!("Cannot read {}: {}", path.display(), e),
			))
		})?;
		content.parse()
	}

	/// Validates the configuration to ensure all required fields are properly set.
	///
	/// - Ensures the locator ID is not empty
	/// - Checks the namespace is a non-empty path ending in `/`
	/// - Verifies the primary host and registry implementations are configured
	fn validate(&self) -> Result<(), ConfigError> {
		if self.locator.id.is_empty() {
			return Err(ConfigError::Validation("Locator ID cannot be empty".into()));
		}

		if self.locator.namespace.trim_matches('/').is_empty() {
			return Err(ConfigError::Validation(
				"Descriptor namespace cannot be empty".into(),
			));
		}
		if !self.locator.namespace.ends_with('/') {
			return Err(ConfigError::Validation(format!(
				"Descriptor namespace '{}' must end with '/'",
				self.locator.namespace
			)));
		}
		if self.locator.pattern.is_empty() {
			return Err(ConfigError::Validation(
				"Descriptor pattern cannot be empty".into(),
			));
		}
		if let Err(e) = glob::Pattern::new(&self.locator.pattern) {
			return Err(ConfigError::Validation(format!(
				"Descriptor pattern '{}' is invalid: {}",
				self.locator.pattern, e
			)));
		}

		if !self
			.host
			.implementations
			.contains_key(&self.host.primary)
		{
			return Err(ConfigError::Validation(format!(
				"Primary host '{}' has no entry in [host.implementations]",
				self.host.primary
			)));
		}

		if !self
			.registry
			.implementations
			.contains_key(&self.registry.primary)
		{
			return Err(ConfigError::Validation(format!(
				"Primary registry '{}' has no entry in [registry.implementations]",
				self.registry.primary
			)));
		}

		Ok(())
	}

	/// Returns the configuration table of the primary host implementation.
	pub fn primary_host(&self) -> Option<&toml::Value> {
		self.host.implementations.get(&self.host.primary)
	}

	/// Returns the configuration table of the primary registry implementation.
	pub fn primary_registry(&self) -> Option<&toml::Value> {
		self.registry.implementations.get(&self.registry.primary)
	}
}

impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}
