//! Module identity and capabilities.
//!
//! A module is an independently loadable unit of code owned by a module host.
//! The locator never creates or destroys modules; it only observes them through
//! the [`Module`] trait to enumerate descriptor resources and load types by name.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Read;
use thiserror::Error;

/// Shell-style pattern that resource names are matched against.
pub use glob::Pattern;

/// Stable identity assigned to a module by its host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleId(pub u64);

impl fmt::Display for ModuleId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl From<u64> for ModuleId {
	fn from(id: u64) -> Self {
		Self(id)
	}
}

/// Lifecycle state of a module as tracked by its host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleState {
	/// Known to the host but its dependencies are not wired.
	Installed,
	/// Dependencies are wired and types can be loaded.
	Resolved,
	/// Resolved and started.
	Active,
	/// Removed from the host. Terminal.
	Uninstalled,
}

impl ModuleState {
	/// Returns true if types can currently be loaded from the module.
	pub fn is_resolved(&self) -> bool {
		matches!(self, ModuleState::Resolved | ModuleState::Active)
	}
}

impl fmt::Display for ModuleState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let label = match self {
			ModuleState::Installed => "installed",
			ModuleState::Resolved => "resolved",
			ModuleState::Active => "active",
			ModuleState::Uninstalled => "uninstalled",
		};
		f.write_str(label)
	}
}

/// Reference to a resource entry inside a module.
///
/// Paths are `/`-separated and relative to the module root. An entry that
/// represents a nested namespace (a directory) ends with `/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceRef {
	pub path: String,
}

impl ResourceRef {
	pub fn new(path: impl Into<String>) -> Self {
		Self { path: path.into() }
	}

	/// Returns true if this entry is a nested namespace rather than a resource.
	pub fn is_namespace(&self) -> bool {
		self.path.ends_with('/')
	}

	/// Final path segment of the entry.
	pub fn name(&self) -> &str {
		match self.path.rfind('/') {
			Some(index) => &self.path[index + 1..],
			None => &self.path,
		}
	}
}

impl fmt::Display for ResourceRef {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.path)
	}
}

/// A type successfully loaded from a module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeHandle {
	/// Fully qualified type name.
	pub name: String,
	/// Module that provided the type.
	pub module: ModuleId,
}

impl fmt::Display for TypeHandle {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}@{}", self.name, self.module)
	}
}

/// Errors raised by module capabilities.
#[derive(Debug, Error)]
pub enum ModuleError {
	/// Error that occurs while listing or reading module resources.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when a referenced resource does not exist.
	#[error("Resource not found: {0}")]
	NotFound(String),
	/// Error that occurs when a type cannot be loaded from the module.
	#[error("Type '{name}' cannot be loaded from module {module}")]
	ClassLoad { name: String, module: ModuleId },
}

/// Capabilities the locator needs from a module.
///
/// Implementations must be cheap to query; resource listing and reads are
/// treated as fast local I/O.
pub trait Module: Send + Sync {
	/// Host-assigned identity.
	fn id(&self) -> ModuleId;

	/// Human readable name, used in logs.
	fn name(&self) -> &str;

	/// Current lifecycle state.
	fn state(&self) -> ModuleState;

	/// Lists entries under `path` whose final segment matches `pattern`.
	///
	/// Without a pattern every entry is listed. Nested namespaces are returned
	/// with a trailing `/` and are only descended into when `recursive` is set.
	/// A missing `path` yields an empty list.
	fn find_entries(
		&self,
		path: &str,
		pattern: Option<&Pattern>,
		recursive: bool,
	) -> Result<Vec<ResourceRef>, ModuleError>;

	/// Opens a resource previously returned by [`Module::find_entries`].
	fn open_resource(&self, resource: &ResourceRef) -> Result<Box<dyn Read + Send>, ModuleError>;

	/// Loads a type by its fully qualified name.
	fn load_type(&self, name: &str) -> Result<TypeHandle, ModuleError>;
}
