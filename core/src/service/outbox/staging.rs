//! Attachment staging
//!
//! Binary payloads (menu item images) are staged locally before the mutation
//! referencing them is queued. The row field carries a `StagedAttachmentRef`
//! until the engine uploads the bytes and swaps in the durable reference.

use crate::domain::EntityRow;
use crate::error::Result;
use crate::infra::{StagingStore, TimeSource};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Placeholder stored in an attachment field while the bytes are staged
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedAttachmentRef {
	pub staged_key: String,
	/// Destination path in the blob store
	pub path: String,
}

impl StagedAttachmentRef {
	pub fn to_value(&self) -> Value {
		serde_json::json!({
			"staged_key": self.staged_key,
			"path": self.path,
		})
	}

	/// Parse a field value, `None` for anything that is not a staged reference
	pub fn from_value(value: &Value) -> Option<Self> {
		if !value.is_object() {
			return None;
		}
		serde_json::from_value(value.clone()).ok()
	}
}

pub struct AttachmentStaging {
	store: Arc<dyn StagingStore>,
	time: Arc<dyn TimeSource>,
}

impl AttachmentStaging {
	pub fn new(store: Arc<dyn StagingStore>, time: Arc<dyn TimeSource>) -> Self {
		Self { store, time }
	}

	/// Store `bytes` under a fresh key
	pub fn stage(&self, bytes: &[u8]) -> Result<String> {
		let key = Uuid::new_v4().to_string();
		self.store.put_blob(&key, bytes, self.time.now())?;
		debug!(staged_key = %key, size = bytes.len(), "Staged attachment");
		Ok(key)
	}

	/// Stage `bytes` and point `field` of `row` at them
	pub fn stage_into(
		&self,
		row: &mut EntityRow,
		field: &str,
		path: impl Into<String>,
		bytes: &[u8],
	) -> Result<StagedAttachmentRef> {
		let staged = StagedAttachmentRef {
			staged_key: self.stage(bytes)?,
			path: path.into(),
		};
		row.set(field, staged.to_value());
		Ok(staged)
	}

	pub fn resolve(&self, key: &str) -> Result<Option<Vec<u8>>> {
		Ok(self.store.get_blob(key)?)
	}

	/// Drop a staged blob; releasing an unknown key is a no-op
	pub fn release(&self, key: &str) -> Result<bool> {
		let released = self.store.delete_blob(key)?;
		if released {
			debug!(staged_key = %key, "Released staged attachment");
		}
		Ok(released)
	}

	pub fn staged_count(&self) -> Result<usize> {
		Ok(self.store.staged_keys()?.len())
	}

	/// Release staged blobs older than `grace` that no pending mutation references
	pub fn sweep_orphans(&self, referenced: &HashSet<String>, grace: Duration) -> Result<usize> {
		let now = self.time.now();
		let mut released = 0;

		for (key, staged_at) in self.store.staged_keys()? {
			if referenced.contains(&key) || now - staged_at < grace {
				continue;
			}
			if self.store.delete_blob(&key)? {
				released += 1;
			}
		}

		if released > 0 {
			info!(released, "Swept orphaned staged attachments");
		}

		Ok(released)
	}
}
