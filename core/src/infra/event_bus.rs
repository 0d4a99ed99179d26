//! Event bus for outbox activity
//!
//! Every state transition a queued mutation goes through is published here so
//! hosts can observe the outbox without polling it. Discards are the one
//! place the outbox drops user data, so they are flagged critical.

use crate::domain::MutationId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

/// Events emitted by the queue, the sync engine and the service loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboxEvent {
	/// A mutation was persisted to the outbox
	MutationEnqueued {
		mutation_id: MutationId,
		mutation_type: String,
	},

	/// The remote confirmed a mutation and it left the outbox
	MutationApplied {
		mutation_id: MutationId,
		mutation_type: String,
	},

	/// A mutation's parent is not on the remote yet; it waits until `next_attempt`
	MutationDeferred {
		mutation_id: MutationId,
		attempts: u32,
		next_attempt: DateTime<Utc>,
	},

	/// A mutation exhausted its dependency retries and was dropped
	MutationDiscarded {
		mutation_id: MutationId,
		mutation_type: String,
		entity_id: String,
		attempts: u32,
		last_error: Option<String>,
	},

	/// One drain pass finished
	DrainCompleted {
		processed: usize,
		errors: usize,
		deferred: usize,
		discarded: usize,
	},
}

impl OutboxEvent {
	/// Get a human-readable event type name
	pub fn event_type(&self) -> &'static str {
		match self {
			OutboxEvent::MutationEnqueued { .. } => "MutationEnqueued",
			OutboxEvent::MutationApplied { .. } => "MutationApplied",
			OutboxEvent::MutationDeferred { .. } => "MutationDeferred",
			OutboxEvent::MutationDiscarded { .. } => "MutationDiscarded",
			OutboxEvent::DrainCompleted { .. } => "DrainCompleted",
		}
	}

	/// Critical events record data loss and must be surfaced
	pub fn is_critical(&self) -> bool {
		matches!(self, OutboxEvent::MutationDiscarded { .. })
	}
}

/// Broadcast bus for `OutboxEvent`s
#[derive(Debug, Clone)]
pub struct OutboxEventBus {
	sender: broadcast::Sender<OutboxEvent>,
}

impl OutboxEventBus {
	pub fn new() -> Self {
		Self::with_capacity(1024)
	}

	pub fn with_capacity(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	/// Emit an event to all subscribers
	///
	/// Returns the number of active subscribers that received the event.
	pub fn emit(&self, event: OutboxEvent) -> usize {
		let event_type = event.event_type();
		let critical = event.is_critical();

		match self.sender.send(event) {
			Ok(count) => {
				debug!(
					event_type,
					subscribers = count,
					critical,
					"Outbox event emitted"
				);
				count
			}
			Err(_) => {
				// No subscribers is normal when the host does not observe the outbox
				debug!(event_type, "Outbox event emitted but no subscribers");
				0
			}
		}
	}

	pub fn subscribe(&self) -> broadcast::Receiver<OutboxEvent> {
		self.sender.subscribe()
	}

	pub fn subscriber_count(&self) -> usize {
		self.sender.receiver_count()
	}
}

impl Default for OutboxEventBus {
	fn default() -> Self {
		Self::new()
	}
}
