//! Factory descriptor discovery for the locator system.
//!
//! A module contributes factories by shipping descriptor resources directly under
//! a well-known namespace (`META-INF/services/` by default). The resource name is
//! the factory identifier and its first line is the fully qualified name of the
//! type to load. Discovery only enumerates descriptors; reading the descriptor
//! and loading the type are deferred to the returned [`FactoryResolver`]s.

use locator_types::{
	FactoryResolver, Module, ModuleError, ModuleId, Pattern, ResolutionError, ResourceRef,
};
use std::io::{BufRead, BufReader, Read};
use std::sync::Arc;
use thiserror::Error;

/// Namespace scanned for descriptors unless configured otherwise.
pub const DEFAULT_NAMESPACE: &str = "META-INF/services/";

/// Pattern matching every descriptor in the namespace.
pub const DEFAULT_PATTERN: &str = "*";

/// Longest descriptor line read when resolving, in bytes.
pub const MAX_DESCRIPTOR_LINE: u64 = 4096;

/// Errors that can occur while enumerating a module's descriptors.
#[derive(Debug, Error)]
pub enum DiscoveryError {
	/// Error that occurs when the module's resources cannot be listed.
	#[error("Failed to list descriptors of module {module}: {source}")]
	Io {
		module: ModuleId,
		#[source]
		source: ModuleError,
	},
	/// Error that occurs when the descriptor pattern is not a valid glob.
	#[error("Invalid descriptor pattern '{pattern}': {source}")]
	InvalidPattern {
		pattern: String,
		#[source]
		source: glob::PatternError,
	},
}

/// Enumerates factory descriptors contributed by modules.
#[derive(Debug, Clone)]
pub struct DescriptorReader {
	namespace: String,
	/// Compiled entry filter; `None` matches every entry.
	pattern: Option<Pattern>,
}

impl Default for DescriptorReader {
	fn default() -> Self {
		Self {
			namespace: DEFAULT_NAMESPACE.to_string(),
			pattern: None,
		}
	}
}

impl DescriptorReader {
	/// Creates a reader scanning `namespace` for entries matching `pattern`.
	pub fn new(namespace: impl Into<String>, pattern: &str) -> Result<Self, DiscoveryError> {
		let pattern = if pattern == DEFAULT_PATTERN {
			None
		} else {
			let compiled = Pattern::new(pattern).map_err(|source| DiscoveryError::InvalidPattern {
				pattern: pattern.to_string(),
				source,
			})?;
			Some(compiled)
		};
		Ok(Self {
			namespace: namespace.into(),
			pattern,
		})
	}

	pub fn namespace(&self) -> &str {
		&self.namespace
	}

	pub fn pattern(&self) -> &str {
		self.pattern.as_ref().map_or(DEFAULT_PATTERN, Pattern::as_str)
	}

	/// Lists the module's descriptors.
	///
	/// The listing itself happens eagerly so I/O failures surface here; the
	/// returned sequence builds one resolver per descriptor as it is iterated and
	/// never loads a type. A module without the namespace yields an empty sequence.
	pub fn discover(&self, module: &Arc<dyn Module>) -> Result<Descriptors, DiscoveryError> {
		let entries = module
			.find_entries(&self.namespace, self.pattern.as_ref(), false)
			.map_err(|source| DiscoveryError::Io {
				module: module.id(),
				source,
			})?;

		tracing::trace!(
			module_id = %module.id(),
			count = entries.len(),
			namespace = %self.namespace,
			"Listed descriptor entries"
		);

		Ok(Descriptors {
			module: Arc::clone(module),
			entries: entries.into_iter(),
		})
	}
}

/// Lazy, single-pass sequence of `(factory_id, resolver)` pairs for one module.
pub struct Descriptors {
	module: Arc<dyn Module>,
	entries: std::vec::IntoIter<ResourceRef>,
}

impl Iterator for Descriptors {
	type Item = (String, FactoryResolver);

	fn next(&mut self) -> Option<Self::Item> {
		loop {
			let entry = self.entries.next()?;
			if entry.is_namespace() {
				continue;
			}
			let factory_id = entry.name().to_string();
			if factory_id.is_empty() {
				continue;
			}
			let resolver = deferred_resolver(Arc::clone(&self.module), entry);
			return Some((factory_id, resolver));
		}
	}
}

/// Builds a resolver that reads the descriptor and loads the named type on call.
fn deferred_resolver(module: Arc<dyn Module>, resource: ResourceRef) -> FactoryResolver {
	let origin = module.id();
	let descriptor = resource.path.clone();
	FactoryResolver::new(origin, descriptor, move || {
		let type_name = read_type_name(module.as_ref(), &resource)?;
		module
			.load_type(&type_name)
			.map_err(|source| ResolutionError::TypeLoad {
				name: type_name,
				source,
			})
	})
}

/// Reads the first line of a descriptor as a type name.
fn read_type_name(module: &dyn Module, resource: &ResourceRef) -> Result<String, ResolutionError> {
	let io_error = |message: String| ResolutionError::Io {
		descriptor: resource.path.clone(),
		message,
	};

	let stream = module
		.open_resource(resource)
		.map_err(|e| io_error(e.to_string()))?;
	let mut reader = BufReader::new(stream.take(MAX_DESCRIPTOR_LINE));
	let mut line = Vec::new();
	reader
		.read_until(b'\n', &mut line)
		.map_err(|e| io_error(e.to_string()))?;
	if line.len() as u64 == MAX_DESCRIPTOR_LINE && line.last() != Some(&b'\n') {
		return Err(io_error(format!(
			"first line exceeds {} bytes",
			MAX_DESCRIPTOR_LINE
		)));
	}

	let line =
		String::from_utf8(line).map_err(|_| ResolutionError::Encoding(resource.path.clone()))?;
	let type_name = line.trim();
	if type_name.is_empty() {
		return Err(ResolutionError::EmptyDescriptor(resource.path.clone()));
	}
	Ok(type_name.to_string())
}
