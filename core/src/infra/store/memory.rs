use super::{MirrorStore, QueueStore, Result, StagingStore};
use crate::domain::{EntityRow, EntityTable, Mutation, MutationId};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

/// Volatile store for tests and hosts that do not need durability
#[derive(Debug, Default)]
pub struct MemoryStore {
	rows: RwLock<HashMap<EntityTable, BTreeMap<String, EntityRow>>>,
	mutations: RwLock<HashMap<MutationId, Mutation>>,
	blobs: RwLock<HashMap<String, (Vec<u8>, DateTime<Utc>)>>,
}

impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}

	fn filtered(&self, table: EntityTable, keep: impl Fn(&EntityRow) -> bool) -> Vec<EntityRow> {
		self.rows
			.read()
			.get(&table)
			.map(|rows| rows.values().filter(|row| keep(row)).cloned().collect())
			.unwrap_or_default()
	}
}

impl MirrorStore for MemoryStore {
	fn get(&self, table: EntityTable, id: &str) -> Result<Option<EntityRow>> {
		Ok(self
			.rows
			.read()
			.get(&table)
			.and_then(|rows| rows.get(id))
			.cloned())
	}

	fn put(&self, table: EntityTable, row: &EntityRow) -> Result<()> {
		self.rows
			.write()
			.entry(table)
			.or_default()
			.insert(row.id.clone(), row.clone());
		Ok(())
	}

	fn delete(&self, table: EntityTable, id: &str) -> Result<bool> {
		Ok(self
			.rows
			.write()
			.get_mut(&table)
			.and_then(|rows| rows.remove(id))
			.is_some())
	}

	fn list(&self, table: EntityTable) -> Result<Vec<EntityRow>> {
		Ok(self.filtered(table, |_| true))
	}

	fn list_partition(&self, table: EntityTable, partition_key: &str) -> Result<Vec<EntityRow>> {
		Ok(self.filtered(table, |row| {
			row.partition_key(table) == Some(partition_key)
		}))
	}

	fn list_partition_status(
		&self,
		table: EntityTable,
		partition_key: &str,
		status: &str,
	) -> Result<Vec<EntityRow>> {
		Ok(self.filtered(table, |row| {
			row.partition_key(table) == Some(partition_key) && row.status() == Some(status)
		}))
	}
}

impl QueueStore for MemoryStore {
	fn put_mutation(&self, mutation: &Mutation) -> Result<()> {
		self.mutations.write().insert(mutation.id, mutation.clone());
		Ok(())
	}

	fn update_mutation(&self, mutation: &Mutation) -> Result<bool> {
		let mut mutations = self.mutations.write();
		match mutations.get_mut(&mutation.id) {
			Some(existing) => {
				*existing = mutation.clone();
				Ok(true)
			}
			None => Ok(false),
		}
	}

	fn get_mutation(&self, id: MutationId) -> Result<Option<Mutation>> {
		Ok(self.mutations.read().get(&id).cloned())
	}

	fn delete_mutation(&self, id: MutationId) -> Result<bool> {
		Ok(self.mutations.write().remove(&id).is_some())
	}

	fn all_mutations(&self) -> Result<Vec<Mutation>> {
		Ok(self.mutations.read().values().cloned().collect())
	}

	/// Records are kept decoded, so there is never anything to purge
	fn purge_undecodable(&self) -> Result<Vec<String>> {
		Ok(Vec::new())
	}
}

impl StagingStore for MemoryStore {
	fn put_blob(&self, key: &str, bytes: &[u8], staged_at: DateTime<Utc>) -> Result<()> {
		self.blobs
			.write()
			.insert(key.to_string(), (bytes.to_vec(), staged_at));
		Ok(())
	}

	fn get_blob(&self, key: &str) -> Result<Option<Vec<u8>>> {
		Ok(self.blobs.read().get(key).map(|(bytes, _)| bytes.clone()))
	}

	fn delete_blob(&self, key: &str) -> Result<bool> {
		Ok(self.blobs.write().remove(key).is_some())
	}

	fn staged_keys(&self) -> Result<Vec<(String, DateTime<Utc>)>> {
		Ok(self
			.blobs
			.read()
			.iter()
			.map(|(key, (_, staged_at))| (key.clone(), *staged_at))
			.collect())
	}
}
