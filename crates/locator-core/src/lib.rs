//! Core of the factory locator system.
//!
//! The [`LifecycleCoordinator`] keeps a shared locator in sync with the modules of
//! a module host. When a module becomes resolved its factory descriptors are
//! discovered and published; when it becomes unresolved everything it
//! contributed is withdrawn again. The [`ModuleBindingTable`] remembers which
//! resolvers came from which module so withdrawal is exact.

pub mod builder;
pub mod engine;
pub mod table;

pub use builder::{BuilderError, CoordinatorBuilder, LocatorFactories};
pub use engine::{CoordinatorError, LifecycleCoordinator, ReconcileSummary};
pub use table::ModuleBindingTable;
