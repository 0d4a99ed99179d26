//! Local store that fails selected calls, backed by `MemoryStore`

use chrono::{DateTime, Utc};
use outbox_core::{
	domain::{EntityRow, EntityTable, Mutation, MutationId},
	infra::{MemoryStore, MirrorStore, QueueStore, StagingStore, StoreError},
};
use parking_lot::Mutex;
use std::collections::HashSet;

type Result<T> = std::result::Result<T, StoreError>;

fn injected(what: &str) -> StoreError {
	StoreError::Storage(redb::StorageError::Corrupted(format!("injected {what} failure")))
}

#[derive(Default)]
pub struct FailingStore {
	inner: MemoryStore,
	mirror_put_failures: Mutex<HashSet<EntityTable>>,
	blob_read_failures: Mutex<bool>,
}

impl FailingStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Fail every mirror write to `table`
	pub fn fail_mirror_puts(&self, table: EntityTable) {
		self.mirror_put_failures.lock().insert(table);
	}

	/// Fail every staged blob read
	pub fn fail_blob_reads(&self) {
		*self.blob_read_failures.lock() = true;
	}
}

impl MirrorStore for FailingStore {
	fn get(&self, table: EntityTable, id: &str) -> Result<Option<EntityRow>> {
		self.inner.get(table, id)
	}

	fn put(&self, table: EntityTable, row: &EntityRow) -> Result<()> {
		if self.mirror_put_failures.lock().contains(&table) {
			return Err(injected("mirror put"));
		}
		self.inner.put(table, row)
	}

	fn delete(&self, table: EntityTable, id: &str) -> Result<bool> {
		self.inner.delete(table, id)
	}

	fn list(&self, table: EntityTable) -> Result<Vec<EntityRow>> {
		self.inner.list(table)
	}

	fn list_partition(&self, table: EntityTable, partition_key: &str) -> Result<Vec<EntityRow>> {
		self.inner.list_partition(table, partition_key)
	}

	fn list_partition_status(
		&self,
		table: EntityTable,
		partition_key: &str,
		status: &str,
	) -> Result<Vec<EntityRow>> {
		self.inner.list_partition_status(table, partition_key, status)
	}
}

impl QueueStore for FailingStore {
	fn put_mutation(&self, mutation: &Mutation) -> Result<()> {
		self.inner.put_mutation(mutation)
	}

	fn update_mutation(&self, mutation: &Mutation) -> Result<bool> {
		self.inner.update_mutation(mutation)
	}

	fn get_mutation(&self, id: MutationId) -> Result<Option<Mutation>> {
		self.inner.get_mutation(id)
	}

	fn delete_mutation(&self, id: MutationId) -> Result<bool> {
		self.inner.delete_mutation(id)
	}

	fn all_mutations(&self) -> Result<Vec<Mutation>> {
		self.inner.all_mutations()
	}

	fn purge_undecodable(&self) -> Result<Vec<String>> {
		self.inner.purge_undecodable()
	}
}

impl StagingStore for FailingStore {
	fn put_blob(&self, key: &str, bytes: &[u8], staged_at: DateTime<Utc>) -> Result<()> {
		self.inner.put_blob(key, bytes, staged_at)
	}

	fn get_blob(&self, key: &str) -> Result<Option<Vec<u8>>> {
		if *self.blob_read_failures.lock() {
			return Err(injected("blob read"));
		}
		self.inner.get_blob(key)
	}

	fn delete_blob(&self, key: &str) -> Result<bool> {
		self.inner.delete_blob(key)
	}

	fn staged_keys(&self) -> Result<Vec<(String, DateTime<Utc>)>> {
		self.inner.staged_keys()
	}
}
