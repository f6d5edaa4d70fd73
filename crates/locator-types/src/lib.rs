//! Common types module for the factory locator system.
//!
//! This module defines the vocabulary shared by every locator component: module
//! identity and capabilities, lifecycle events emitted by a module host, and the
//! deferred resolvers that are published under factory identifiers.

/// Lifecycle event types emitted by module hosts.
pub mod events;
/// Module identity, state and the capability trait hosts implement.
pub mod module;
/// Self-registration trait for pluggable implementations.
pub mod registry;
/// Deferred type resolvers published to the shared locator.
pub mod resolver;

// Re-export all types for convenient access
pub use events::*;
pub use module::*;
pub use registry::*;
pub use resolver::*;
