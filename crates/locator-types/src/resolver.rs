//! Deferred type resolvers.
//!
//! A [`FactoryResolver`] is the value published under a factory identifier. It
//! captures everything needed to load the target type later, so discovery never
//! pays the loading cost. Resolvers compare by identity: clones are equal, but
//! two resolvers built from the same descriptor in different discovery passes
//! are not. Exact-match withdrawal from the shared locator relies on this.

use crate::{ModuleError, ModuleId, TypeHandle};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors that occur when a deferred resolver is invoked.
#[derive(Debug, Error)]
pub enum ResolutionError {
	/// Error that occurs when the descriptor cannot be opened or read.
	#[error("Failed to read descriptor '{descriptor}': {message}")]
	Io { descriptor: String, message: String },
	/// Error that occurs when the descriptor has no type name line.
	#[error("Descriptor '{0}' does not name a type")]
	EmptyDescriptor(String),
	/// Error that occurs when the descriptor is not valid UTF-8.
	#[error("Descriptor '{0}' is not valid UTF-8")]
	Encoding(String),
	/// Error that occurs when the owning module cannot load the named type.
	#[error("Failed to load type '{name}': {source}")]
	TypeLoad {
		name: String,
		#[source]
		source: ModuleError,
	},
}

type ResolveFn = dyn Fn() -> Result<TypeHandle, ResolutionError> + Send + Sync;

struct ResolverInner {
	origin: ModuleId,
	descriptor: String,
	resolve: Box<ResolveFn>,
}

/// Zero-argument operation that loads a factory type on demand.
#[derive(Clone)]
pub struct FactoryResolver {
	inner: Arc<ResolverInner>,
}

impl FactoryResolver {
	/// Creates a resolver contributed by `origin` from the given descriptor path.
	pub fn new<F>(origin: ModuleId, descriptor: impl Into<String>, resolve: F) -> Self
	where
		F: Fn() -> Result<TypeHandle, ResolutionError> + Send + Sync + 'static,
	{
		Self {
			inner: Arc::new(ResolverInner {
				origin,
				descriptor: descriptor.into(),
				resolve: Box::new(resolve),
			}),
		}
	}

	/// Module that contributed this resolver.
	pub fn origin(&self) -> ModuleId {
		self.inner.origin
	}

	/// Descriptor path the resolver was read from.
	pub fn descriptor(&self) -> &str {
		&self.inner.descriptor
	}

	/// Loads the target type.
	pub fn resolve(&self) -> Result<TypeHandle, ResolutionError> {
		(self.inner.resolve)()
	}

	/// Returns true if both handles refer to the same resolver instance.
	pub fn same_as(&self, other: &FactoryResolver) -> bool {
		Arc::ptr_eq(&self.inner, &other.inner)
	}
}

impl PartialEq for FactoryResolver {
	fn eq(&self, other: &Self) -> bool {
		self.same_as(other)
	}
}

impl Eq for FactoryResolver {}

impl fmt::Debug for FactoryResolver {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("FactoryResolver")
			.field("origin", &self.inner.origin)
			.field("descriptor", &self.inner.descriptor)
			.finish()
	}
}
