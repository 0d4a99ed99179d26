//! Durable mutation queue
//!
//! The queue is the single source of truth for work the remote has not
//! confirmed yet. A record stays here from `enqueue` until it is applied or
//! discarded.

use crate::domain::{Mutation, MutationId, MutationPayload};
use crate::error::Result;
use crate::infra::{OutboxEvent, OutboxEventBus, QueueStore, TimeSource};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct MutationQueue {
	store: Arc<dyn QueueStore>,
	time: Arc<dyn TimeSource>,
	events: OutboxEventBus,
}

impl MutationQueue {
	pub fn new(store: Arc<dyn QueueStore>, time: Arc<dyn TimeSource>, events: OutboxEventBus) -> Self {
		Self { store, time, events }
	}

	/// Persist a new mutation stamped with the current time
	pub fn enqueue(&self, payload: MutationPayload) -> Result<MutationId> {
		let mutation = Mutation::new(payload, self.time.now());
		self.store.put_mutation(&mutation)?;

		let mutation_type = mutation.mutation_type();
		info!(
			mutation_id = %mutation.id,
			mutation_type = %mutation_type,
			entity_id = mutation.payload.entity_id(),
			"Mutation enqueued"
		);
		self.events.emit(OutboxEvent::MutationEnqueued {
			mutation_id: mutation.id,
			mutation_type: mutation_type.to_string(),
		});

		Ok(mutation.id)
	}

	/// Remove a mutation; removing an unknown id is a no-op
	pub fn dequeue(&self, id: MutationId) -> Result<bool> {
		let removed = self.store.delete_mutation(id)?;
		if removed {
			debug!(mutation_id = %id, "Mutation dequeued");
		}
		Ok(removed)
	}

	/// Every queued mutation, in no particular order
	pub fn list_pending(&self) -> Result<Vec<Mutation>> {
		Ok(self.store.all_mutations()?)
	}

	pub fn get(&self, id: MutationId) -> Result<Option<Mutation>> {
		Ok(self.store.get_mutation(id)?)
	}

	/// Persist an in-place change; returns `false` if the record is gone
	pub fn update(&self, mutation: &Mutation) -> Result<bool> {
		Ok(self.store.update_mutation(mutation)?)
	}

	/// Mutations eligible at `now`, oldest first
	pub fn eligible(&self, now: DateTime<Utc>) -> Result<Vec<Mutation>> {
		let mut mutations: Vec<_> = self
			.list_pending()?
			.into_iter()
			.filter(|mutation| mutation.is_eligible(now))
			.collect();
		mutations.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
		Ok(mutations)
	}

	/// Delete records this build cannot decode, returning their keys
	pub fn purge_undecodable(&self) -> Result<Vec<String>> {
		let purged = self.store.purge_undecodable()?;
		for key in &purged {
			warn!(key = %key, "Purged undecodable mutation");
		}
		Ok(purged)
	}

	pub fn len(&self) -> Result<usize> {
		Ok(self.store.all_mutations()?.len())
	}

	pub fn is_empty(&self) -> Result<bool> {
		Ok(self.len()? == 0)
	}
}
