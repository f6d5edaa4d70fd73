//! Broadcast channel carrying module lifecycle events.

use locator_types::ModuleEvent;
use tokio::sync::broadcast;

/// Default number of events buffered per subscriber.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Event bus used by hosts to publish lifecycle events.
///
/// Cloning the bus yields another handle to the same channel.
#[derive(Clone)]
pub struct EventBus {
	sender: broadcast::Sender<ModuleEvent>,
}

impl Default for EventBus {
	fn default() -> Self {
		Self::new(DEFAULT_CAPACITY)
	}
}

impl EventBus {
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity.max(1));
		Self { sender }
	}

	/// Publishes an event and returns how many subscribers will see it.
	///
	/// Publishing with no subscribers is not an error; the event is dropped.
	pub fn publish(&self, event: ModuleEvent) -> usize {
		tracing::trace!(?event, "Publishing module event");
		self.sender.send(event).unwrap_or(0)
	}

	pub fn subscribe(&self) -> broadcast::Receiver<ModuleEvent> {
		self.sender.subscribe()
	}
}
