//! Directory-backed module host implementation.
//!
//! Every sub-directory of the configured root is a module. Its resources are the
//! files below it, addressed by `/`-separated paths relative to the module
//! directory. An optional `module.toml` manifest names the module and lists the
//! types it can load:
//!
//! ```toml
//! name = "widgets"
//! exports = ["com.acme.WidgetFactory"]
//! ```
//!
//! [`DirectoryHost::rescan`] reconciles the host with the directory contents,
//! installing and resolving new modules and withdrawing vanished ones.

use crate::utils::{matches_pattern, namespace_prefix};
use crate::{EventBus, HostError, HostFactory, HostRegistry, ModuleHost, StateCell};
use locator_types::{
	ImplementationRegistry, Module, ModuleError, ModuleEvent, ModuleEventKind, ModuleId,
	ModuleState, Pattern, ResourceRef, TypeHandle,
};
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;
use walkdir::WalkDir;

/// File name of the optional per-module manifest.
pub const MANIFEST_FILE: &str = "module.toml";

#[derive(Debug, Default, Deserialize)]
struct ModuleManifest {
	name: Option<String>,
	#[serde(default)]
	exports: BTreeSet<String>,
}

/// A module backed by a directory.
#[derive(Debug)]
pub struct DirectoryModule {
	id: ModuleId,
	name: String,
	dir: PathBuf,
	exports: BTreeSet<String>,
	state: StateCell,
}

impl DirectoryModule {
	/// Directory holding the module's resources.
	pub fn dir(&self) -> &Path {
		&self.dir
	}

	/// Maps a `/`-separated resource path onto the module directory.
	///
	/// Returns None for paths that would escape the module directory.
	fn resolve_path(&self, path: &str) -> Option<PathBuf> {
		let relative = Path::new(path.trim_matches('/'));
		if relative
			.components()
			.any(|component| !matches!(component, Component::Normal(_)))
		{
			return None;
		}
		Some(self.dir.join(relative))
	}

	/// Walks `dir` in file name order, reporting sub-directories as namespace entries.
	fn collect_entries(
		dir: &Path,
		prefix: &str,
		pattern: Option<&Pattern>,
		recursive: bool,
	) -> Result<Vec<ResourceRef>, ModuleError> {
		let walker = WalkDir::new(dir)
			.min_depth(1)
			.max_depth(if recursive { usize::MAX } else { 1 })
			.sort_by_file_name();

		let mut entries = Vec::new();
		for entry in walker {
			let entry = entry.map_err(std::io::Error::from)?;
			let name = entry.file_name().to_string_lossy();
			if !matches_pattern(&name, pattern) {
				continue;
			}
			let Ok(relative) = entry.path().strip_prefix(dir) else {
				continue;
			};
			let relative = relative
				.components()
				.map(|component| component.as_os_str().to_string_lossy())
				.collect::<Vec<_>>()
				.join("/");
			if entry.file_type().is_dir() {
				entries.push(ResourceRef::new(format!("{}{}/", prefix, relative)));
			} else {
				entries.push(ResourceRef::new(format!("{}{}", prefix, relative)));
			}
		}
		Ok(entries)
	}
}

impl Module for DirectoryModule {
	fn id(&self) -> ModuleId {
		self.id
	}

	fn name(&self) -> &str {
		&self.name
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
		let Some(dir) = self.resolve_path(path) else {
			return Ok(Vec::new());
		};
		if !dir.is_dir() {
			return Ok(Vec::new());
		}

		Self::collect_entries(&dir, &namespace_prefix(path), pattern, recursive)
	}

	fn open_resource(&self, resource: &ResourceRef) -> Result<Box<dyn Read + Send>, ModuleError> {
		let path = self
			.resolve_path(&resource.path)
			.filter(|path| path.is_file())
			.ok_or_else(|| ModuleError::NotFound(resource.path.clone()))?;
		Ok(Box::new(fs::File::open(path)?))
	}

	fn load_type(&self, name: &str) -> Result<TypeHandle, ModuleError> {
		if self.state().is_resolved() && self.exports.contains(name) {
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

#[derive(Default)]
struct HostState {
	modules: BTreeMap<ModuleId, Arc<DirectoryModule>>,
	by_dir: BTreeMap<String, ModuleId>,
	next_id: u64,
}

/// Module host mirroring the sub-directories of a root directory.
pub struct DirectoryHost {
	root: PathBuf,
	state: Mutex<HostState>,
	event_bus: EventBus,
}

impl DirectoryHost {
	/// Creates a host for `root`. No modules are known until [`Self::rescan`].
	pub fn new(root: impl Into<PathBuf>) -> Self {
		Self::with_event_bus(root, EventBus::default())
	}

	pub fn with_event_bus(root: impl Into<PathBuf>, event_bus: EventBus) -> Self {
		Self {
			root: root.into(),
			state: Mutex::new(HostState {
				next_id: 1,
				..Default::default()
			}),
			event_bus,
		}
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	/// Reconciles known modules with the directories under the root.
	///
	/// New directories are installed and, if their manifest parses, resolved.
	/// Modules whose directory disappeared are unresolved and uninstalled.
	/// Returns the number of modules added or removed.
	pub fn rescan(&self) -> Result<usize, HostError> {
		let mut present = BTreeSet::new();
		for entry in fs::read_dir(&self.root)? {
			let entry = entry?;
			if entry.file_type()?.is_dir() {
				present.insert(entry.file_name().to_string_lossy().into_owned());
			}
		}

		// Events are published while holding the state lock so subscribers see
		// them in the same order the state changed.
		let mut state = self.state.lock();
		let mut changes = 0;

		let vanished: Vec<(String, ModuleId)> = state
			.by_dir
			.iter()
			.filter(|(dir, _)| !present.contains(*dir))
			.map(|(dir, id)| (dir.clone(), *id))
			.collect();
		for (dir, id) in vanished {
			state.by_dir.remove(&dir);
			if let Some(module) = state.modules.remove(&id) {
				self.withdraw(module);
				changes += 1;
			}
		}

		for dir in present {
			if state.by_dir.contains_key(&dir) {
				continue;
			}
			let id = ModuleId(state.next_id);
			state.next_id += 1;

			let path = self.root.join(&dir);
			let manifest = read_manifest(&path);
			let module = Arc::new(DirectoryModule {
				id,
				name: manifest
					.as_ref()
					.ok()
					.and_then(|manifest| manifest.name.clone())
					.unwrap_or_else(|| dir.clone()),
				dir: path,
				exports: manifest
					.as_ref()
					.map(|manifest| manifest.exports.clone())
					.unwrap_or_default(),
				state: StateCell::new(ModuleState::Installed),
			});
			state.by_dir.insert(dir, id);
			state.modules.insert(id, Arc::clone(&module));
			changes += 1;

			tracing::debug!(module_id = %id, module = %module.name(), "Installed module");
			self.publish(&module, ModuleEventKind::Installed);

			match manifest {
				Ok(_) => {
					module.state.set(ModuleState::Resolved);
					self.publish(&module, ModuleEventKind::Resolved);
				}
				Err(e) => {
					tracing::warn!(
						module_id = %id,
						module = %module.name(),
						error = %e,
						"Module left unresolved"
					);
				}
			}
		}

		Ok(changes)
	}

	fn withdraw(&self, module: Arc<DirectoryModule>) {
		if module.state().is_resolved() {
			module.state.set(ModuleState::Installed);
			self.publish(&module, ModuleEventKind::Unresolved);
		}
		module.state.set(ModuleState::Uninstalled);
		tracing::debug!(module_id = %module.id, module = %module.name(), "Uninstalled module");
		self.publish(&module, ModuleEventKind::Uninstalled);
	}

	fn publish(&self, module: &Arc<DirectoryModule>, kind: ModuleEventKind) {
		let module: Arc<dyn Module> = Arc::clone(module) as Arc<dyn Module>;
		self.event_bus.publish(ModuleEvent::new(module, kind));
	}
}

impl ModuleHost for DirectoryHost {
	fn modules(&self) -> Vec<Arc<dyn Module>> {
		self.state
			.lock()
			.modules
			.values()
			.map(|module| Arc::clone(module) as Arc<dyn Module>)
			.collect()
	}

	fn module(&self, id: ModuleId) -> Option<Arc<dyn Module>> {
		self.state
			.lock()
			.modules
			.get(&id)
			.map(|module| Arc::clone(module) as Arc<dyn Module>)
	}

	fn subscribe(&self) -> broadcast::Receiver<ModuleEvent> {
		self.event_bus.subscribe()
	}

	fn refresh(&self) -> Result<usize, HostError> {
		self.rescan()
	}
}

/// Reads the module manifest, treating a missing file as an empty manifest.
fn read_manifest(dir: &Path) -> Result<ModuleManifest, HostError> {
	let path = dir.join(MANIFEST_FILE);
	if !path.exists() {
		return Ok(ModuleManifest::default());
	}
	let content = fs::read_to_string(&path)?;
	toml::from_str(&content).map_err(|e| HostError::Manifest {
		path: path.display().to_string(),
		message: e.message().to_string(),
	})
}

#[derive(Debug, Deserialize)]
struct DirectoryHostConfig {
	root: PathBuf,
	#[serde(default = "default_event_capacity")]
	event_capacity: usize,
}

fn default_event_capacity() -> usize {
	crate::event_bus::DEFAULT_CAPACITY
}

/// Factory function to create a directory host from configuration.
///
/// Configuration parameters:
/// - `root`: directory whose sub-directories are modules (required)
/// - `event_capacity`: events buffered per subscriber (default 1024)
///
/// The root is scanned once before the host is returned.
pub fn create_host(config: &toml::Value) -> Result<Box<dyn ModuleHost>, HostError> {
	let config: DirectoryHostConfig = config
		.clone()
		.try_into()
		.map_err(|e: toml::de::Error| HostError::Configuration(e.message().to_string()))?;

	if !config.root.is_dir() {
		return Err(HostError::Configuration(format!(
			"module root '{}' is not a directory",
			config.root.display()
		)));
	}

	let host = DirectoryHost::with_event_bus(config.root, EventBus::new(config.event_capacity));
	let count = host.rescan()?;
	tracing::info!(root = %host.root().display(), count, "Scanned module directory");
	Ok(Box::new(host))
}

/// Registry for the directory host implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "directory";
	type Factory = HostFactory;

	fn factory() -> Self::Factory {
		create_host
	}
}

impl HostRegistry for Registry {}
