//! Local persistence
//!
//! Three keyed stores back the outbox:
//! - `MirrorStore` holds cached entity rows, indexed by partition and by
//!   (partition, status)
//! - `QueueStore` holds pending mutations
//! - `StagingStore` holds attachment bytes waiting for upload
//!
//! Calls are synchronous: local reads and writes are fast and are never
//! cancelled mid-way. Each call is atomic for the record it touches.

mod memory;
mod redb_store;

pub use memory::MemoryStore;
pub use redb_store::RedbStore;

use crate::domain::{EntityRow, EntityTable, Mutation, MutationId};
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
	#[error("database error: {0}")]
	Database(#[from] redb::DatabaseError),

	#[error("transaction error: {0}")]
	Transaction(#[from] redb::TransactionError),

	#[error("table error: {0}")]
	Table(#[from] redb::TableError),

	#[error("storage error: {0}")]
	Storage(#[from] redb::StorageError),

	#[error("commit error: {0}")]
	Commit(#[from] redb::CommitError),

	#[error("serialization error: {0}")]
	Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Durable cache of remote rows
pub trait MirrorStore: Send + Sync {
	fn get(&self, table: EntityTable, id: &str) -> Result<Option<EntityRow>>;

	/// Insert or replace a row, keeping the secondary indexes in step
	fn put(&self, table: EntityTable, row: &EntityRow) -> Result<()>;

	/// Returns whether a row was removed
	fn delete(&self, table: EntityTable, id: &str) -> Result<bool>;

	fn list(&self, table: EntityTable) -> Result<Vec<EntityRow>>;

	/// Rows whose partition field equals `partition_key`
	fn list_partition(&self, table: EntityTable, partition_key: &str) -> Result<Vec<EntityRow>>;

	/// Rows of a partition with the given status
	fn list_partition_status(
		&self,
		table: EntityTable,
		partition_key: &str,
		status: &str,
	) -> Result<Vec<EntityRow>>;
}

/// Persistence for the outbox
pub trait QueueStore: Send + Sync {
	fn put_mutation(&self, mutation: &Mutation) -> Result<()>;

	/// Overwrite a mutation only if it is still queued
	///
	/// Returns `false` when the record was removed in the meantime, so a
	/// concurrent purge is never undone by a late update.
	fn update_mutation(&self, mutation: &Mutation) -> Result<bool>;

	fn get_mutation(&self, id: MutationId) -> Result<Option<Mutation>>;

	/// Returns whether a record was removed
	fn delete_mutation(&self, id: MutationId) -> Result<bool>;

	/// Every decodable mutation; records that fail to decode are skipped
	fn all_mutations(&self) -> Result<Vec<Mutation>>;

	/// Delete records `all_mutations` skips, returning their keys
	fn purge_undecodable(&self) -> Result<Vec<String>>;
}

/// Binary payloads staged for later upload
pub trait StagingStore: Send + Sync {
	fn put_blob(&self, key: &str, bytes: &[u8], staged_at: DateTime<Utc>) -> Result<()>;

	fn get_blob(&self, key: &str) -> Result<Option<Vec<u8>>>;

	/// Returns whether a blob was removed
	fn delete_blob(&self, key: &str) -> Result<bool>;

	/// Every staged key with the time it was staged
	fn staged_keys(&self) -> Result<Vec<(String, DateTime<Utc>)>>;
}
