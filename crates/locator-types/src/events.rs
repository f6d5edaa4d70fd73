//! Event types for module lifecycle notifications.
//!
//! Module hosts publish a [`ModuleEvent`] for every state change. Consumers only
//! act on the transitions that change type visibility: a module becoming
//! resolved or becoming unresolved.

use crate::Module;
use std::fmt;
use std::sync::Arc;

/// Kinds of lifecycle changes a host reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleEventKind {
	Installed,
	Resolved,
	Started,
	Stopped,
	Unresolved,
	Uninstalled,
	Updated,
}

/// Transition relevant to factory visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
	/// The module's types became loadable.
	BecameActive,
	/// The module's types are no longer loadable.
	BecameInactive,
	/// Any other change; ignored by the locator.
	Other,
}

impl ModuleEventKind {
	/// Maps a host event onto the transition the locator cares about.
	pub fn transition(&self) -> Transition {
		match self {
			ModuleEventKind::Resolved => Transition::BecameActive,
			ModuleEventKind::Unresolved => Transition::BecameInactive,
			_ => Transition::Other,
		}
	}
}

/// A lifecycle change of a single module.
#[derive(Clone)]
pub struct ModuleEvent {
	pub module: Arc<dyn Module>,
	pub kind: ModuleEventKind,
}

impl ModuleEvent {
	pub fn new(module: Arc<dyn Module>, kind: ModuleEventKind) -> Self {
		Self { module, kind }
	}

	pub fn transition(&self) -> Transition {
		self.kind.transition()
	}
}

impl fmt::Debug for ModuleEvent {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ModuleEvent")
			.field("module", &self.module.id())
			.field("name", &self.module.name())
			.field("kind", &self.kind)
			.finish()
	}
}
