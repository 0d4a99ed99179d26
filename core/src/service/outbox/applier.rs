//! Remote write path shared by the sync engine and aware operations

use super::registry::{self, MutationHandler};
use super::staging::AttachmentStaging;
use crate::domain::{EntityRow, MutationPayload};
use crate::error::Result;
use crate::infra::{BlobStore, MirrorStore, RemoteStore, TimeSource};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct RemoteApplier {
	remote: Arc<dyn RemoteStore>,
	blobs: Arc<dyn BlobStore>,
	mirror: Arc<dyn MirrorStore>,
	staging: Arc<AttachmentStaging>,
	time: Arc<dyn TimeSource>,
}

impl RemoteApplier {
	pub fn new(
		remote: Arc<dyn RemoteStore>,
		blobs: Arc<dyn BlobStore>,
		mirror: Arc<dyn MirrorStore>,
		staging: Arc<AttachmentStaging>,
		time: Arc<dyn TimeSource>,
	) -> Self {
		Self {
			remote,
			blobs,
			mirror,
			staging,
			time,
		}
	}

	/// Upload staged attachments and substitute their durable references
	///
	/// Returns the staged keys whose bytes were uploaded. The caller persists
	/// the substituted payload and then hands the keys to `release`. A staged
	/// reference whose bytes are gone is cleared to null.
	pub async fn resolve_attachments(&self, payload: &mut MutationPayload) -> Result<Vec<String>> {
		let handler = registry::handler(payload.mutation_type());
		let staged = handler.staged_attachments(payload);
		if staged.is_empty() {
			return Ok(Vec::new());
		}

		let mut uploaded = Vec::with_capacity(staged.len());
		let mut substitutions = Vec::with_capacity(staged.len());

		for (field, attachment) in staged {
			match self.staging.resolve(&attachment.staged_key)? {
				Some(bytes) => {
					let blob = self.blobs.upload(&attachment.path, bytes).await?;
					debug!(
						field,
						path = %blob.path,
						staged_key = %attachment.staged_key,
						"Uploaded staged attachment"
					);
					substitutions.push((field, Value::String(blob.public_ref)));
					uploaded.push(attachment.staged_key);
				}
				None => {
					warn!(
						field,
						entity_id = payload.entity_id(),
						staged_key = %attachment.staged_key,
						"Staged attachment missing, clearing field"
					);
					substitutions.push((field, Value::Null));
				}
			}
		}

		if let Some(row) = payload.row_mut() {
			for (field, value) in substitutions {
				row.set(field, value);
			}
		}

		Ok(uploaded)
	}

	/// Release staged copies after their substituted payload was persisted
	pub fn release(&self, keys: &[String]) -> Result<()> {
		for key in keys {
			self.staging.release(key)?;
		}
		Ok(())
	}

	/// Perform the remote write and confirm it in the mirror
	///
	/// Returns the confirmed row for upserts. Once the remote accepted the
	/// write, a mirror failure is logged and not returned.
	pub async fn write(&self, payload: &MutationPayload) -> Result<Option<EntityRow>> {
		let handler = registry::handler(payload.mutation_type());
		debug!(
			table = %handler.table,
			operation = %handler.operation,
			entity_id = payload.entity_id(),
			"Writing to remote"
		);

		match payload.row() {
			Some(row) => self.upsert(handler, row).await.map(Some),
			None => {
				self.delete(handler, payload.entity_id()).await?;
				Ok(None)
			}
		}
	}

	async fn upsert(&self, handler: &MutationHandler, row: &EntityRow) -> Result<EntityRow> {
		let confirmed = self
			.remote
			.upsert(handler.table, row.to_value()?, handler.conflict_key)
			.await?;

		let mut stored = EntityRow::from_value(confirmed).unwrap_or_else(|e| {
			debug!(error = %e, "Remote returned an unparseable row, keeping the local one");
			row.clone()
		});

		// The remote has the write now; a stale mirror heals on the next fetch
		let previous = self
			.mirror
			.get(handler.table, &stored.id)
			.unwrap_or_else(|e| {
				warn!(table = %handler.table, id = %stored.id, error = %e, "Mirror read failed");
				None
			})
			.map(|cached| cached.version);
		stored.touch(previous, self.time.now());
		if let Err(e) = self.mirror.put(handler.table, &stored) {
			warn!(table = %handler.table, id = %stored.id, error = %e, "Mirror confirmation failed");
		}

		Ok(stored)
	}

	async fn delete(&self, handler: &MutationHandler, id: &str) -> Result<()> {
		self.remote.delete(handler.table, id).await?;
		if let Err(e) = self.mirror.delete(handler.table, id) {
			warn!(table = %handler.table, id, error = %e, "Mirror confirmation failed");
		}
		Ok(())
	}
}
