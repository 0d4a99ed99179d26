//! Connectivity-aware writes
//!
//! Application writes try the remote first. Anything short of a validation
//! rejection falls back to the outbox, with the change written through to the
//! mirror so reads reflect it immediately.

use crate::domain::{EntityKey, EntityRow, EntityTable, MutationId, MutationPayload};
use crate::error::{Error, Result};
use crate::infra::{Connectivity, MirrorStore, TimeSource};
use crate::service::outbox::{handler, MutationQueue, RemoteApplier};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome {
	/// Confirmed remotely; carries the stored row for upserts
	Applied(Option<EntityRow>),
	/// Deferred to the outbox
	Queued(MutationId),
}

impl WriteOutcome {
	pub fn is_queued(&self) -> bool {
		matches!(self, WriteOutcome::Queued(_))
	}
}

pub struct AwareWriter {
	applier: Arc<RemoteApplier>,
	queue: Arc<MutationQueue>,
	mirror: Arc<dyn MirrorStore>,
	connectivity: Arc<dyn Connectivity>,
	time: Arc<dyn TimeSource>,
}

impl AwareWriter {
	pub fn new(
		applier: Arc<RemoteApplier>,
		queue: Arc<MutationQueue>,
		mirror: Arc<dyn MirrorStore>,
		connectivity: Arc<dyn Connectivity>,
		time: Arc<dyn TimeSource>,
	) -> Self {
		Self {
			applier,
			queue,
			mirror,
			connectivity,
			time,
		}
	}

	pub async fn save(&self, table: EntityTable, row: EntityRow) -> Result<WriteOutcome> {
		self.submit(MutationPayload::upsert(table, row)).await
	}

	pub async fn remove(&self, table: EntityTable, id: impl Into<String>) -> Result<WriteOutcome> {
		self.submit(MutationPayload::delete(table, EntityKey::new(id)))
			.await
	}

	/// Apply `payload` remotely, or queue it when that is not possible
	///
	/// Validation errors are returned to the caller and nothing is queued.
	pub async fn submit(&self, mut payload: MutationPayload) -> Result<WriteOutcome> {
		let handler = handler(payload.mutation_type());

		if let Some(row) = payload.row_mut() {
			let previous = self
				.mirror
				.get(handler.table, &row.id)?
				.map(|cached| cached.version);
			row.touch(previous, self.time.now());
		}

		let mut uploaded = Vec::new();
		if self.connectivity.is_online() {
			match self.try_remote(&mut payload, &mut uploaded).await {
				Ok(row) => {
					self.applier.release(&uploaded)?;
					return Ok(WriteOutcome::Applied(row));
				}
				// Staged bytes stay put so the caller can retry the same row
				Err(e) if e.is_validation() => return Err(e),
				Err(Error::Remote(e)) => {
					warn!(
						mutation_type = %handler.mutation_type,
						entity_id = payload.entity_id(),
						error = %e,
						"Remote write failed, queueing"
					);
				}
				Err(e) => return Err(e),
			}
		}

		// Queued with any durable references already substituted
		let id = self.queue.enqueue(payload.clone())?;
		self.applier.release(&uploaded)?;

		match payload.row() {
			Some(row) => self.mirror.put(handler.table, row)?,
			None => {
				self.mirror.delete(handler.table, payload.entity_id())?;
			}
		}
		debug!(mutation_id = %id, table = %handler.table, "Wrote through to mirror");

		Ok(WriteOutcome::Queued(id))
	}

	async fn try_remote(
		&self,
		payload: &mut MutationPayload,
		uploaded: &mut Vec<String>,
	) -> Result<Option<EntityRow>> {
		*uploaded = self.applier.resolve_attachments(payload).await?;
		self.applier.write(payload).await
	}
}
