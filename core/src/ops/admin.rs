//! Administrative operations and diagnostics
//!
//! Manual escape hatches for a stuck outbox: dropping queued mutations by
//! type, id or target entity, and clearing cached partitions.

use crate::domain::{EntityTable, Mutation, MutationId, MutationType};
use crate::error::Result;
use crate::infra::{MirrorStore, TimeSource};
use crate::service::outbox::{registry, AttachmentStaging, MutationQueue};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

pub struct OutboxAdmin {
	queue: Arc<MutationQueue>,
	staging: Arc<AttachmentStaging>,
	mirror: Arc<dyn MirrorStore>,
}

impl OutboxAdmin {
	pub fn new(
		queue: Arc<MutationQueue>,
		staging: Arc<AttachmentStaging>,
		mirror: Arc<dyn MirrorStore>,
	) -> Self {
		Self {
			queue,
			staging,
			mirror,
		}
	}

	/// Drop every queued mutation of `mutation_type`
	pub fn purge_by_type(&self, mutation_type: MutationType) -> Result<usize> {
		let removed = self.remove_where(|mutation| mutation.mutation_type() == mutation_type)?;
		info!(%mutation_type, removed, "Purged queued mutations by type");
		Ok(removed)
	}

	/// Remove cached rows of the given partitions
	pub fn clear_partitions(&self, table: EntityTable, partition_keys: &[&str]) -> Result<usize> {
		let mut removed = 0;
		for partition_key in partition_keys {
			for row in self.mirror.list_partition(table, partition_key)? {
				if self.mirror.delete(table, &row.id)? {
					removed += 1;
				}
			}
		}
		info!(%table, partitions = partition_keys.len(), removed, "Cleared cached partitions");
		Ok(removed)
	}

	pub fn remove_mutation(&self, id: MutationId) -> Result<bool> {
		let Some(mutation) = self.queue.get(id)? else {
			return Ok(false);
		};
		let removed = self.drop_mutation(&mutation)?;
		if removed {
			info!(mutation_id = %id, "Removed queued mutation");
		}
		Ok(removed)
	}

	/// Drop queued mutations of `mutation_type` targeting `entity_id`
	pub fn remove_by_payload_id(&self, mutation_type: MutationType, entity_id: &str) -> Result<usize> {
		let removed = self.remove_where(|mutation| {
			mutation.mutation_type() == mutation_type && mutation.payload.entity_id() == entity_id
		})?;
		info!(%mutation_type, entity_id, removed, "Removed queued mutations for entity");
		Ok(removed)
	}

	/// Drop queued records that can no longer be decoded
	///
	/// Their payloads are unreadable, so staged attachments they may reference
	/// are left to the orphan sweep.
	pub fn purge_undecodable(&self) -> Result<usize> {
		let purged = self.queue.purge_undecodable()?.len();
		info!(purged, "Purged undecodable queued mutations");
		Ok(purged)
	}

	fn remove_where(&self, predicate: impl Fn(&Mutation) -> bool) -> Result<usize> {
		let mut removed = 0;
		for mutation in self.queue.list_pending()?.iter().filter(|m| predicate(m)) {
			if self.drop_mutation(mutation)? {
				removed += 1;
			}
		}
		Ok(removed)
	}

	fn drop_mutation(&self, mutation: &Mutation) -> Result<bool> {
		let removed = self.queue.dequeue(mutation.id)?;
		if removed {
			for key in registry::staged_keys(&mutation.payload) {
				self.staging.release(&key)?;
			}
		}
		Ok(removed)
	}
}

/// Point-in-time view of the outbox
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiagnosticsSnapshot {
	/// Keyed by the mutation type name
	pub pending_by_type: BTreeMap<String, usize>,
	/// Mutations waiting out a dependency backoff
	pub deferred: usize,
	pub oldest: Option<DateTime<Utc>>,
	pub staged_count: usize,
}

impl DiagnosticsSnapshot {
	pub fn pending(&self) -> usize {
		self.pending_by_type.values().sum()
	}
}

/// Inspection hooks a host can attach to the drain service
pub trait Diagnostics: Send + Sync {
	fn snapshot(&self) -> Result<DiagnosticsSnapshot>;

	/// Log every pending mutation with its retry state
	fn log_pending(&self) -> Result<()>;
}

pub struct OutboxDiagnostics {
	queue: Arc<MutationQueue>,
	staging: Arc<AttachmentStaging>,
	time: Arc<dyn TimeSource>,
}

impl OutboxDiagnostics {
	pub fn new(
		queue: Arc<MutationQueue>,
		staging: Arc<AttachmentStaging>,
		time: Arc<dyn TimeSource>,
	) -> Self {
		Self {
			queue,
			staging,
			time,
		}
	}
}

impl Diagnostics for OutboxDiagnostics {
	fn snapshot(&self) -> Result<DiagnosticsSnapshot> {
		let now = self.time.now();
		let pending = self.queue.list_pending()?;

		let mut snapshot = DiagnosticsSnapshot {
			staged_count: self.staging.staged_count()?,
			..Default::default()
		};
		for mutation in &pending {
			*snapshot
				.pending_by_type
				.entry(mutation.mutation_type().to_string())
				.or_default() += 1;
			if !mutation.is_eligible(now) {
				snapshot.deferred += 1;
			}
		}
		snapshot.oldest = pending.iter().map(|mutation| mutation.created_at).min();

		Ok(snapshot)
	}

	fn log_pending(&self) -> Result<()> {
		let mut pending = self.queue.list_pending()?;
		pending.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

		warn!(pending = pending.len(), "Outbox has pending mutations");
		for mutation in &pending {
			warn!(
				mutation_id = %mutation.id,
				mutation_type = %mutation.mutation_type(),
				entity_id = mutation.payload.entity_id(),
				attempts = mutation.attempts,
				next_attempt = ?mutation.next_attempt,
				last_error = mutation.last_error.as_deref().unwrap_or_default(),
				"Pending mutation"
			);
		}
		Ok(())
	}
}
