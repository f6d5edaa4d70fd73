//! Lifecycle management for the coordinator.
//!
//! Handles attaching to the module host, the event listener task, and the
//! shutdown procedure that withdraws every binding before detaching.

use super::{CoordinatorError, LifecycleCoordinator};
use locator_types::{Module, ModuleEvent, ModuleId};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};

/// Outcome of reconciling the binding table against the host.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileSummary {
	/// Modules whose factories were newly published.
	pub registered: usize,
	/// Modules whose factories were withdrawn.
	pub withdrawn: usize,
}

impl LifecycleCoordinator {
	/// Attaches to the module host.
	///
	/// Subscribes to host events first, then publishes the factories of every
	/// module the host already knows about, whatever its state, and finally
	/// spawns the listener that follows subsequent events. Modules whose
	/// descriptors cannot be listed are skipped. Returns the number of modules
	/// that published at least one factory.
	pub async fn start(&self) -> Result<usize, CoordinatorError> {
		let mut state = self.inner.state.lock().await;
		if state.attached {
			return Err(CoordinatorError::AlreadyStarted);
		}

		let receiver = self.inner.host.subscribe();
		state.attached = true;

		let mut registered = 0;
		for module in self.inner.host.modules() {
			match self.register_module(&mut state.table, &module) {
				Ok(0) => {}
				Ok(_) => registered += 1,
				Err(e) => {
					tracing::warn!(
						module_id = %module.id(),
						module = %module.name(),
						error = %e,
						"Skipping module during startup"
					);
				}
			}
		}

		state.listener = Some(tokio::spawn(self.clone().listen(receiver)));
		tracing::info!(modules = registered, "Attached to module host");
		Ok(registered)
	}

	/// Withdraws every published factory and detaches from the module host.
	///
	/// Safe to call repeatedly; with nothing registered it makes no locator
	/// calls. Returns the number of modules withdrawn.
	pub async fn stop(&self) -> usize {
		let mut state = self.inner.state.lock().await;

		let mut withdrawn = 0;
		while let Some(module_id) = state.table.any_module() {
			self.unregister_module(&mut state.table, module_id);
			withdrawn += 1;
		}

		state.attached = false;
		if let Some(listener) = state.listener.take() {
			listener.abort();
			tracing::info!(modules = withdrawn, "Detached from module host");
		}
		withdrawn
	}

	/// Brings the binding table in line with the host's current module states.
	///
	/// Used when events were missed, so it judges by current state rather than
	/// by the startup rule: modules that vanished, are no longer resolved, or
	/// were replaced by a new instance under the same id are withdrawn, and
	/// resolved modules without bindings are published.
	pub async fn reconcile(&self) -> ReconcileSummary {
		let mut state = self.inner.state.lock().await;
		let mut summary = ReconcileSummary::default();
		if !state.attached {
			return summary;
		}

		let resolved: BTreeMap<ModuleId, Arc<dyn Module>> = self
			.inner
			.host
			.modules()
			.into_iter()
			.filter(|module| module.state().is_resolved())
			.map(|module| (module.id(), module))
			.collect();

		for module_id in state.table.module_ids() {
			let current = match (resolved.get(&module_id), state.table.source(module_id)) {
				(Some(module), Some(source)) => Arc::ptr_eq(module, source),
				_ => false,
			};
			if !current {
				self.unregister_module(&mut state.table, module_id);
				summary.withdrawn += 1;
			}
		}

		for (module_id, module) in &resolved {
			if state.table.contains(*module_id) {
				continue;
			}
			match self.register_module(&mut state.table, module) {
				Ok(0) => {}
				Ok(_) => summary.registered += 1,
				Err(e) => {
					tracing::warn!(
						module_id = %module_id,
						error = %e,
						"Failed to publish module during reconciliation"
					);
				}
			}
		}

		tracing::info!(
			registered = summary.registered,
			withdrawn = summary.withdrawn,
			"Reconciled with module host"
		);
		summary
	}

	/// Follows host events until the stream closes or the task is aborted.
	async fn listen(self, mut receiver: broadcast::Receiver<ModuleEvent>) {
		loop {
			match receiver.recv().await {
				Ok(event) => {
					if let Err(e) = self.handle_event(&event).await {
						tracing::warn!(
							module_id = %event.module.id(),
							module = %event.module.name(),
							error = %e,
							"Failed to apply module event"
						);
					}
				}
				Err(RecvError::Lagged(skipped)) => {
					tracing::warn!(skipped, "Missed module events, reconciling");
					self.reconcile().await;
				}
				Err(RecvError::Closed) => {
					tracing::debug!("Module host event stream closed");
					break;
				}
			}
		}
	}
}
