//! Module host abstractions for the factory locator system.
//!
//! A module host owns modules, assigns their identities and publishes lifecycle
//! events. The locator consumes hosts through [`ModuleHost`]: it lists the
//! currently known modules once when it attaches and then follows the event
//! stream returned by [`ModuleHost::subscribe`].

use locator_types::{ImplementationRegistry, Module, ModuleEvent, ModuleId, ModuleState};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;

pub mod event_bus;
pub mod utils;

/// Re-export implementations
pub mod implementations {
	pub mod directory;
	pub mod memory;
}

pub use event_bus::EventBus;

/// Errors that can occur during module host operations.
#[derive(Debug, Error)]
pub enum HostError {
	/// Error that occurs when an operation names a module the host does not know.
	#[error("Unknown module: {0}")]
	UnknownModule(ModuleId),
	/// Error that occurs while scanning module storage.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when a module manifest cannot be parsed.
	#[error("Invalid manifest {path}: {message}")]
	Manifest { path: String, message: String },
	/// Error that occurs during configuration validation.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Trait defining the interface for module hosts.
pub trait ModuleHost: Send + Sync {
	/// Returns every module currently known to the host, in id order.
	fn modules(&self) -> Vec<Arc<dyn Module>>;

	/// Returns a single module by id.
	fn module(&self, id: ModuleId) -> Option<Arc<dyn Module>>;

	/// Subscribes to lifecycle events published after this call.
	fn subscribe(&self) -> broadcast::Receiver<ModuleEvent>;

	/// Re-synchronises the host with its backing storage.
	///
	/// Returns the number of lifecycle changes applied. Hosts that are driven
	/// programmatically have nothing to refresh and return Ok(0).
	fn refresh(&self) -> Result<usize, HostError> {
		Ok(0)
	}
}

/// Type alias for host factory functions.
pub type HostFactory = fn(&toml::Value) -> Result<Box<dyn ModuleHost>, HostError>;

/// Registry trait for module host implementations.
pub trait HostRegistry: ImplementationRegistry<Factory = HostFactory> {}

/// Get all registered module host implementations.
///
/// Returns a vector of (name, factory) tuples for all available host implementations.
pub fn get_all_implementations() -> Vec<(&'static str, HostFactory)> {
	use implementations::{directory, memory};

	vec![
		(directory::Registry::NAME, directory::Registry::factory()),
		(memory::Registry::NAME, memory::Registry::factory()),
	]
}

/// Lock-free holder for a module's lifecycle state.
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
	pub(crate) fn new(state: ModuleState) -> Self {
		Self(AtomicU8::new(Self::encode(state)))
	}

	pub(crate) fn get(&self) -> ModuleState {
		match self.0.load(Ordering::Acquire) {
			0 => ModuleState::Installed,
			1 => ModuleState::Resolved,
			2 => ModuleState::Active,
			_ => ModuleState::Uninstalled,
		}
	}

	pub(crate) fn set(&self, state: ModuleState) {
		self.0.store(Self::encode(state), Ordering::Release);
	}

	fn encode(state: ModuleState) -> u8 {
		match state {
			ModuleState::Installed => 0,
			ModuleState::Resolved => 1,
			ModuleState::Active => 2,
			ModuleState::Uninstalled => 3,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_state_cell_round_trips_every_state() {
		let cell = StateCell::new(ModuleState::Installed);
		for state in [
			ModuleState::Resolved,
			ModuleState::Active,
			ModuleState::Uninstalled,
			ModuleState::Installed,
		] {
			cell.set(state);
			assert_eq!(cell.get(), state);
		}
	}

	#[test]
	fn test_all_implementations_are_listed() {
		let names: Vec<_> = get_all_implementations()
			.into_iter()
			.map(|(name, _)| name)
			.collect();
		assert_eq!(names, vec!["directory", "memory"]);
	}
}
