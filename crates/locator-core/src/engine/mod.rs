//! Lifecycle coordinator that keeps the shared locator in sync with module state.
//!
//! The coordinator reacts to two transitions only. A module becoming resolved
//! has its descriptors discovered, recorded in the binding table and registered
//! with the locator. A module becoming unresolved has its whole table entry
//! removed and every recorded resolver unregistered. All mutations, together
//! with the locator calls that pair with them, run under one lock.

pub mod lifecycle;

pub use lifecycle::ReconcileSummary;

#[cfg(test)]
pub(crate) mod testing;

use crate::table::ModuleBindingTable;
use locator_discovery::{DescriptorReader, DiscoveryError};
use locator_host::ModuleHost;
use locator_registry::SharedLocator;
use locator_types::{FactoryResolver, Module, ModuleEvent, ModuleId, Transition};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Errors that can occur during coordinator operations.
#[derive(Debug, Error)]
pub enum CoordinatorError {
	/// Error that occurs when starting a coordinator that is already attached.
	#[error("Coordinator is already attached to the module host")]
	AlreadyStarted,
	/// Error that occurs when a module's descriptors cannot be listed.
	#[error("Discovery error: {0}")]
	Discovery(#[from] DiscoveryError),
}

/// State guarded by the coordinator lock.
#[derive(Default)]
pub(crate) struct CoordinatorState {
	pub(crate) table: ModuleBindingTable,
	/// Whether events from the host are currently acted on.
	pub(crate) attached: bool,
	pub(crate) listener: Option<JoinHandle<()>>,
}

struct CoordinatorInner {
	host: Arc<dyn ModuleHost>,
	locator: Arc<dyn SharedLocator>,
	reader: DescriptorReader,
	state: Mutex<CoordinatorState>,
}

/// Publishes module factories to a shared locator for as long as the module is resolved.
///
/// Cloning yields another handle to the same coordinator.
#[derive(Clone)]
pub struct LifecycleCoordinator {
	inner: Arc<CoordinatorInner>,
}

impl LifecycleCoordinator {
	/// Creates a coordinator scanning the default descriptor namespace.
	pub fn new(host: Arc<dyn ModuleHost>, locator: Arc<dyn SharedLocator>) -> Self {
		Self::with_reader(host, locator, DescriptorReader::default())
	}

	pub fn with_reader(
		host: Arc<dyn ModuleHost>,
		locator: Arc<dyn SharedLocator>,
		reader: DescriptorReader,
	) -> Self {
		Self {
			inner: Arc::new(CoordinatorInner {
				host,
				locator,
				reader,
				state: Mutex::new(CoordinatorState::default()),
			}),
		}
	}

	pub fn host(&self) -> &Arc<dyn ModuleHost> {
		&self.inner.host
	}

	pub fn locator(&self) -> &Arc<dyn SharedLocator> {
		&self.inner.locator
	}

	pub fn reader(&self) -> &DescriptorReader {
		&self.inner.reader
	}

	/// Returns whether the coordinator is following host events.
	pub async fn is_attached(&self) -> bool {
		self.inner.state.lock().await.attached
	}

	/// Modules that currently have bindings, in id order.
	pub async fn registered_modules(&self) -> Vec<ModuleId> {
		self.inner.state.lock().await.table.module_ids()
	}

	/// Resolvers the module has published, keyed by factory identifier.
	pub async fn bindings(&self, module: ModuleId) -> BTreeMap<String, Vec<FactoryResolver>> {
		self.inner
			.state
			.lock()
			.await
			.table
			.get_all(module)
			.map(|bindings| {
				bindings
					.iter()
					.map(|(id, resolvers)| (id.clone(), resolvers.clone()))
					.collect()
			})
			.unwrap_or_default()
	}

	/// Applies a single lifecycle event.
	///
	/// Events received while detached are ignored. A discovery failure is
	/// returned to the caller and leaves every other module untouched.
	pub async fn handle_event(&self, event: &ModuleEvent) -> Result<(), CoordinatorError> {
		let mut state = self.inner.state.lock().await;
		if !state.attached {
			tracing::trace!(?event, "Ignoring event while detached");
			return Ok(());
		}

		match event.transition() {
			Transition::BecameActive => {
				self.register_module(&mut state.table, &event.module)?;
			}
			Transition::BecameInactive => {
				self.unregister_module(&mut state.table, event.module.id());
			}
			Transition::Other => {}
		}
		Ok(())
	}

	/// Discovers the module's descriptors and publishes them.
	///
	/// Returns the number of bindings published. Within one pass the last
	/// descriptor for an identifier wins; across passes bindings accumulate.
	pub(crate) fn register_module(
		&self,
		table: &mut ModuleBindingTable,
		module: &Arc<dyn Module>,
	) -> Result<usize, DiscoveryError> {
		let module_id = module.id();
		if table.contains(module_id) {
			tracing::debug!(
				module_id = %module_id,
				module = %module.name(),
				"Module already has bindings, registering additively"
			);
		}

		let discovered: BTreeMap<String, FactoryResolver> =
			self.inner.reader.discover(module)?.collect();
		if discovered.is_empty() {
			tracing::debug!(
				module_id = %module_id,
				module = %module.name(),
				"No factory descriptors found"
			);
			return Ok(0);
		}

		let count = discovered.len();
		for (factory_id, resolver) in discovered {
			table.put(module, factory_id.clone(), resolver.clone());
			self.inner.locator.register(&factory_id, resolver);
			tracing::debug!(module_id = %module_id, factory_id = %factory_id, "Registered factory");
		}

		tracing::info!(
			module_id = %module_id,
			module = %module.name(),
			count,
			"Registered module factories"
		);
		Ok(count)
	}

	/// Withdraws everything the module published. Returns the number of resolvers removed.
	pub(crate) fn unregister_module(&self, table: &mut ModuleBindingTable, module_id: ModuleId) -> usize {
		let Some(bindings) = table.remove_all(module_id) else {
			tracing::debug!(module_id = %module_id, "No bindings to withdraw");
			return 0;
		};

		let mut count = 0;
		for (factory_id, resolvers) in bindings {
			for resolver in resolvers {
				if !self.inner.locator.unregister(&factory_id, &resolver) {
					tracing::warn!(
						module_id = %module_id,
						factory_id = %factory_id,
						"Locator held no matching registration"
					);
				}
				count += 1;
			}
		}

		tracing::info!(module_id = %module_id, count, "Withdrew module factories");
		count
	}
}

#[cfg(test)]
mod tests {
	use super::testing::*;
	use super::*;
	use locator_host::implementations::memory::ModuleDefinition;
	use locator_types::{ModuleEventKind, TypeHandle};

	#[tokio::test]
	async fn test_unresolve_leaves_no_orphans() {
		let (host, locator, coordinator) = fixture();
		coordinator.start().await.unwrap();

		let id = host.install(
			ModuleDefinition::new("widgets")
				.factory(NAMESPACE, "widget", "com.acme.WidgetFactory")
				.factory(NAMESPACE, "gadget", "com.acme.GadgetFactory"),
		);
		host.resolve(id).unwrap();
		eventually(|| locator.register_count() == 2).await;

		host.replay(id, ModuleEventKind::Resolved).unwrap();
		eventually(|| locator.register_count() == 4).await;

		host.unresolve(id).unwrap();
		eventually(|| locator.snapshot().is_empty()).await;

		assert!(coordinator.registered_modules().await.is_empty());
		let unregisters = locator.unregisters();
		assert_eq!(unregisters.len(), 4);
		assert!(unregisters.iter().all(|call| call.removed));
		assert!(locator.origins().iter().all(|origin| *origin != id));
	}

	#[tokio::test]
	async fn test_empty_module_creates_no_entry() {
		let (host, locator, coordinator) = fixture();
		coordinator.start().await.unwrap();

		let empty = host.install(ModuleDefinition::new("empty").resource("README", "docs"));
		host.resolve(empty).unwrap();
		let widgets = host.install(widget_module());
		host.resolve(widgets).unwrap();
		eventually(|| locator.register_count() == 1).await;

		assert_eq!(coordinator.registered_modules().await, vec![widgets]);
		assert_eq!(locator.calls().len(), 1);
		assert!(coordinator.bindings(empty).await.is_empty());
	}

	#[tokio::test]
	async fn test_repeated_activation_is_additive() {
		let (host, locator, coordinator) = fixture();
		coordinator.start().await.unwrap();

		let id = host.install(widget_module());
		host.resolve(id).unwrap();
		eventually(|| locator.register_count() == 1).await;
		host.replay(id, ModuleEventKind::Resolved).unwrap();
		eventually(|| locator.register_count() == 2).await;

		let registered = locator.locate_all("widget");
		assert_eq!(registered.len(), 2);
		assert_ne!(registered[0], registered[1]);

		let bindings = coordinator.bindings(id).await;
		assert_eq!(bindings["widget"], registered);
	}

	#[tokio::test]
	async fn test_other_transitions_are_ignored() {
		let (host, locator, coordinator) = fixture();
		let id = host.install(widget_module());
		host.resolve(id).unwrap();
		coordinator.start().await.unwrap();

		host.start(id).unwrap();
		host.stop(id).unwrap();
		host.replay(id, ModuleEventKind::Updated).unwrap();
		host.replay(id, ModuleEventKind::Installed).unwrap();
		host.unresolve(id).unwrap();
		eventually(|| locator.snapshot().is_empty()).await;

		assert_eq!(locator.register_count(), 1);
		assert_eq!(locator.unregisters().len(), 1);
	}

	#[tokio::test]
	async fn test_unresolve_without_bindings_is_noop() {
		let (host, locator, coordinator) = fixture();
		coordinator.start().await.unwrap();

		let idle = host.install(widget_module());
		host.replay(idle, ModuleEventKind::Unresolved).unwrap();
		let widgets = host.install(widget_module());
		host.resolve(widgets).unwrap();
		eventually(|| locator.register_count() == 1).await;

		assert!(locator.unregisters().is_empty());
	}

	#[tokio::test]
	async fn test_events_ignored_while_detached() {
		let (host, locator, coordinator) = fixture();
		let id = host.install(widget_module());
		host.resolve(id).unwrap();
		let module = host.module_arc(id);

		coordinator
			.handle_event(&ModuleEvent::new(module, ModuleEventKind::Resolved))
			.await
			.unwrap();

		assert!(locator.calls().is_empty());
		assert!(coordinator.registered_modules().await.is_empty());
	}

	#[tokio::test]
	async fn test_discovery_failure_is_isolated() {
		let (host, locator, coordinator) = fixture();
		let id = host.install(widget_module());
		host.resolve(id).unwrap();
		coordinator.start().await.unwrap();

		let failing: Arc<dyn Module> = Arc::new(FailingModule(ModuleId(99)));
		let result = coordinator
			.handle_event(&ModuleEvent::new(
				failing.clone(),
				ModuleEventKind::Resolved,
			))
			.await;
		assert!(matches!(result, Err(CoordinatorError::Discovery(_))));

		// Other modules keep their bindings and can still be withdrawn
		assert_eq!(coordinator.registered_modules().await, vec![id]);
		coordinator
			.handle_event(&ModuleEvent::new(
				host.module_arc(id),
				ModuleEventKind::Unresolved,
			))
			.await
			.unwrap();
		assert!(locator.snapshot().is_empty());
	}

	#[tokio::test]
	async fn test_registered_resolver_loads_descriptor_type() {
		let (host, locator, coordinator) = fixture();
		let id = host.install(widget_module());
		host.resolve(id).unwrap();
		coordinator.start().await.unwrap();

		let resolver = locator.locate("widget").unwrap();
		assert_eq!(resolver.origin(), id);
		assert_eq!(
			resolver.resolve().unwrap(),
			TypeHandle {
				name: "com.acme.WidgetFactory".into(),
				module: id,
			}
		);
	}

	#[tokio::test]
	async fn test_nested_namespaces_are_not_factories() {
		let (host, locator, coordinator) = fixture();
		let id = host.install(
			widget_module().resource("META-INF/services/nested/inner", "com.acme.Inner"),
		);
		host.resolve(id).unwrap();
		coordinator.start().await.unwrap();

		let snapshot = locator.snapshot();
		assert_eq!(snapshot.keys().collect::<Vec<_>>(), vec!["widget"]);
		assert_eq!(locator.register_count(), 1);
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
	async fn test_concurrent_events_and_stop_leave_nothing_behind() {
		let (host, locator, coordinator) = fixture();
		let modules: Vec<Arc<dyn Module>> = (0..8)
			.map(|index| {
				let name = format!("module-{}", index);
				let id = host.install(
					ModuleDefinition::new(name.clone()).factory(NAMESPACE, &name, "com.acme.Factory"),
				);
				host.module_arc(id)
			})
			.collect();

		let mut tasks = Vec::new();
		for module in &modules {
			let coordinator = coordinator.clone();
			let module = Arc::clone(module);
			tasks.push(tokio::spawn(async move {
				// Ends on a resolve so a late stop still has bindings to withdraw
				for round in 0..=50 {
					let kind = if round % 2 == 0 {
						ModuleEventKind::Resolved
					} else {
						ModuleEventKind::Unresolved
					};
					coordinator
						.handle_event(&ModuleEvent::new(Arc::clone(&module), kind))
						.await
						.unwrap();
					tokio::task::yield_now().await;
				}
			}));
		}

		coordinator.start().await.unwrap();
		let stopper = {
			let coordinator = coordinator.clone();
			tokio::spawn(async move { coordinator.stop().await })
		};

		for task in tasks {
			task.await.unwrap();
		}
		stopper.await.unwrap();

		assert!(locator.snapshot().is_empty());
		assert!(coordinator.registered_modules().await.is_empty());
		assert!(!coordinator.is_attached().await);
		assert_eq!(
			locator.registers().len(),
			locator.unregisters().len()
		);
	}
}
