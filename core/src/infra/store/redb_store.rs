use super::{MirrorStore, QueueStore, Result, StagingStore};
use crate::domain::{EntityRow, EntityTable, Mutation, MutationId};
use chrono::{DateTime, Utc};
use redb::{
	AccessGuard, Database, MultimapTable, MultimapTableDefinition, ReadableTable,
	TableDefinition,
};
use serde::de::DeserializeOwned;
use std::path::Path;
use tracing::{info, warn};

/// (table, id) -> JSON encoded row
const ROWS: TableDefinition<(&str, &str), &[u8]> = TableDefinition::new("mirror_rows");
/// (table, partition) -> ids
const PARTITION_INDEX: MultimapTableDefinition<(&str, &str), &str> =
	MultimapTableDefinition::new("mirror_partition_index");
/// (table, partition, status) -> ids
const STATUS_INDEX: MultimapTableDefinition<(&str, &str, &str), &str> =
	MultimapTableDefinition::new("mirror_status_index");

const MUTATIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("outbox_mutations");

const STAGED_BLOBS: TableDefinition<&str, &[u8]> = TableDefinition::new("staged_blobs");
/// key -> staged_at in unix millis
const STAGED_AT: TableDefinition<&str, i64> = TableDefinition::new("staged_at");

type PartitionIndex<'txn> = MultimapTable<'txn, (&'static str, &'static str), &'static str>;
type StatusIndex<'txn> =
	MultimapTable<'txn, (&'static str, &'static str, &'static str), &'static str>;

/// Single-file store backing the mirror, the outbox and attachment staging
pub struct RedbStore {
	db: Database,
}

impl RedbStore {
	/// Open or create the database at `path`, creating every table up front so
	/// read transactions never hit a missing table.
	pub fn open(path: impl AsRef<Path>) -> Result<Self> {
		let path = path.as_ref();
		let db = Database::create(path)?;

		let txn = db.begin_write()?;
		{
			txn.open_table(ROWS)?;
			txn.open_multimap_table(PARTITION_INDEX)?;
			txn.open_multimap_table(STATUS_INDEX)?;
			txn.open_table(MUTATIONS)?;
			txn.open_table(STAGED_BLOBS)?;
			txn.open_table(STAGED_AT)?;
		}
		txn.commit()?;

		info!(path = %path.display(), "Opened outbox store");

		Ok(Self { db })
	}

	fn rows_by_ids(
		&self,
		table: EntityTable,
		ids: impl IntoIterator<Item = String>,
	) -> Result<Vec<EntityRow>> {
		let txn = self.db.begin_read()?;
		let rows = txn.open_table(ROWS)?;

		let mut found = Vec::new();
		for id in ids {
			if let Some(row) = decode(rows.get((table.as_ref(), id.as_str()))?)? {
				found.push(row);
			}
		}
		Ok(found)
	}
}

fn decode<T: DeserializeOwned>(guard: Option<AccessGuard<'_, &'static [u8]>>) -> Result<Option<T>> {
	match guard {
		Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
		None => Ok(None),
	}
}

fn index_row(
	partitions: &mut PartitionIndex<'_>,
	statuses: &mut StatusIndex<'_>,
	table: EntityTable,
	row: &EntityRow,
) -> Result<()> {
	let table_name = table.as_ref();
	if let Some(partition) = row.partition_key(table) {
		partitions.insert((table_name, partition), row.id.as_str())?;
		if let Some(status) = row.status() {
			statuses.insert((table_name, partition, status), row.id.as_str())?;
		}
	}
	Ok(())
}

fn unindex_row(
	partitions: &mut PartitionIndex<'_>,
	statuses: &mut StatusIndex<'_>,
	table: EntityTable,
	row: &EntityRow,
) -> Result<()> {
	let table_name = table.as_ref();
	if let Some(partition) = row.partition_key(table) {
		partitions.remove((table_name, partition), row.id.as_str())?;
		if let Some(status) = row.status() {
			statuses.remove((table_name, partition, status), row.id.as_str())?;
		}
	}
	Ok(())
}

impl MirrorStore for RedbStore {
	fn get(&self, table: EntityTable, id: &str) -> Result<Option<EntityRow>> {
		let txn = self.db.begin_read()?;
		let rows = txn.open_table(ROWS)?;
		decode(rows.get((table.as_ref(), id))?)
	}

	fn put(&self, table: EntityTable, row: &EntityRow) -> Result<()> {
		let bytes = serde_json::to_vec(row)?;
		let table_name = table.as_ref();

		let txn = self.db.begin_write()?;
		{
			let mut rows = txn.open_table(ROWS)?;
			let previous: Option<EntityRow> = decode(rows.get((table_name, row.id.as_str()))?)?;
			rows.insert((table_name, row.id.as_str()), bytes.as_slice())?;

			let mut partitions = txn.open_multimap_table(PARTITION_INDEX)?;
			let mut statuses = txn.open_multimap_table(STATUS_INDEX)?;
			if let Some(previous) = previous {
				unindex_row(&mut partitions, &mut statuses, table, &previous)?;
			}
			index_row(&mut partitions, &mut statuses, table, row)?;
		}
		txn.commit()?;

		Ok(())
	}

	fn delete(&self, table: EntityTable, id: &str) -> Result<bool> {
		let txn = self.db.begin_write()?;
		let removed = {
			let mut rows = txn.open_table(ROWS)?;
			let previous: Option<EntityRow> = decode(rows.remove((table.as_ref(), id))?)?;

			match previous {
				Some(previous) => {
					let mut partitions = txn.open_multimap_table(PARTITION_INDEX)?;
					let mut statuses = txn.open_multimap_table(STATUS_INDEX)?;
					unindex_row(&mut partitions, &mut statuses, table, &previous)?;
					true
				}
				None => false,
			}
		};
		txn.commit()?;

		Ok(removed)
	}

	fn list(&self, table: EntityTable) -> Result<Vec<EntityRow>> {
		let table_name = table.as_ref();
		let txn = self.db.begin_read()?;
		let rows = txn.open_table(ROWS)?;

		let mut found = Vec::new();
		for entry in rows.range((table_name, "")..)? {
			let (key, value) = entry?;
			if key.value().0 != table_name {
				break;
			}
			found.push(serde_json::from_slice(value.value())?);
		}
		Ok(found)
	}

	fn list_partition(&self, table: EntityTable, partition_key: &str) -> Result<Vec<EntityRow>> {
		let ids = {
			let txn = self.db.begin_read()?;
			let index = txn.open_multimap_table(PARTITION_INDEX)?;
			index
				.get((table.as_ref(), partition_key))?
				.map(|id| id.map(|id| id.value().to_string()))
				.collect::<std::result::Result<Vec<_>, _>>()?
		};
		self.rows_by_ids(table, ids)
	}

	fn list_partition_status(
		&self,
		table: EntityTable,
		partition_key: &str,
		status: &str,
	) -> Result<Vec<EntityRow>> {
		let ids = {
			let txn = self.db.begin_read()?;
			let index = txn.open_multimap_table(STATUS_INDEX)?;
			index
				.get((table.as_ref(), partition_key, status))?
				.map(|id| id.map(|id| id.value().to_string()))
				.collect::<std::result::Result<Vec<_>, _>>()?
		};
		self.rows_by_ids(table, ids)
	}
}

impl QueueStore for RedbStore {
	fn put_mutation(&self, mutation: &Mutation) -> Result<()> {
		let bytes = serde_json::to_vec(mutation)?;
		let key = mutation.id.to_string();

		let txn = self.db.begin_write()?;
		{
			let mut table = txn.open_table(MUTATIONS)?;
			table.insert(key.as_str(), bytes.as_slice())?;
		}
		txn.commit()?;

		Ok(())
	}

	fn update_mutation(&self, mutation: &Mutation) -> Result<bool> {
		let bytes = serde_json::to_vec(mutation)?;
		let key = mutation.id.to_string();

		let txn = self.db.begin_write()?;
		let exists = {
			let mut table = txn.open_table(MUTATIONS)?;
			let exists = table.get(key.as_str())?.is_some();
			if exists {
				table.insert(key.as_str(), bytes.as_slice())?;
			}
			exists
		};
		txn.commit()?;

		Ok(exists)
	}

	fn get_mutation(&self, id: MutationId) -> Result<Option<Mutation>> {
		let key = id.to_string();
		let txn = self.db.begin_read()?;
		let table = txn.open_table(MUTATIONS)?;
		decode(table.get(key.as_str())?)
	}

	fn delete_mutation(&self, id: MutationId) -> Result<bool> {
		let key = id.to_string();

		let txn = self.db.begin_write()?;
		let removed = {
			let mut table = txn.open_table(MUTATIONS)?;
			let removed = table.remove(key.as_str())?;
			removed.is_some()
		};
		txn.commit()?;

		Ok(removed)
	}

	fn all_mutations(&self) -> Result<Vec<Mutation>> {
		let txn = self.db.begin_read()?;
		let table = txn.open_table(MUTATIONS)?;

		let mut mutations = Vec::new();
		for entry in table.iter()? {
			let (key, value) = entry?;
			match serde_json::from_slice(value.value()) {
				Ok(mutation) => mutations.push(mutation),
				Err(e) => warn!(key = key.value(), error = %e, "Skipping undecodable mutation"),
			}
		}
		Ok(mutations)
	}

	fn purge_undecodable(&self) -> Result<Vec<String>> {
		let txn = self.db.begin_write()?;
		let purged = {
			let mut table = txn.open_table(MUTATIONS)?;
			let mut undecodable = Vec::new();
			for entry in table.iter()? {
				let (key, value) = entry?;
				if serde_json::from_slice::<Mutation>(value.value()).is_err() {
					undecodable.push(key.value().to_string());
				}
			}
			for key in &undecodable {
				table.remove(key.as_str())?;
			}
			undecodable
		};
		txn.commit()?;

		Ok(purged)
	}
}

impl StagingStore for RedbStore {
	fn put_blob(&self, key: &str, bytes: &[u8], staged_at: DateTime<Utc>) -> Result<()> {
		let txn = self.db.begin_write()?;
		{
			let mut blobs = txn.open_table(STAGED_BLOBS)?;
			blobs.insert(key, bytes)?;
			let mut staged = txn.open_table(STAGED_AT)?;
			staged.insert(key, staged_at.timestamp_millis())?;
		}
		txn.commit()?;

		Ok(())
	}

	fn get_blob(&self, key: &str) -> Result<Option<Vec<u8>>> {
		let txn = self.db.begin_read()?;
		let blobs = txn.open_table(STAGED_BLOBS)?;
		let bytes = blobs.get(key)?.map(|guard| guard.value().to_vec());
		Ok(bytes)
	}

	fn delete_blob(&self, key: &str) -> Result<bool> {
		let txn = self.db.begin_write()?;
		let removed = {
			let mut blobs = txn.open_table(STAGED_BLOBS)?;
			let removed = blobs.remove(key)?.is_some();
			let mut staged = txn.open_table(STAGED_AT)?;
			staged.remove(key)?;
			removed
		};
		txn.commit()?;

		Ok(removed)
	}

	fn staged_keys(&self) -> Result<Vec<(String, DateTime<Utc>)>> {
		let txn = self.db.begin_read()?;
		let staged = txn.open_table(STAGED_AT)?;

		let mut keys = Vec::new();
		for entry in staged.iter()? {
			let (key, staged_at) = entry?;
			let staged_at =
				DateTime::<Utc>::from_timestamp_millis(staged_at.value()).unwrap_or_default();
			keys.push((key.value().to_string(), staged_at));
		}
		Ok(keys)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::domain::MutationPayload;
	use pretty_assertions::assert_eq;
	use tempfile::TempDir;

	fn put_raw_mutation(store: &RedbStore, key: &str, bytes: &[u8]) {
		let txn = store.db.begin_write().unwrap();
		{
			let mut table = txn.open_table(MUTATIONS).unwrap();
			table.insert(key, bytes).unwrap();
		}
		txn.commit().unwrap();
	}

	fn open_store() -> (TempDir, RedbStore) {
		let dir = tempfile::tempdir().unwrap();
		let store = RedbStore::open(dir.path().join("outbox.redb")).unwrap();
		(dir, store)
	}

	fn order(id: &str, shift: &str, status: &str) -> EntityRow {
		EntityRow::new(id)
			.with("shift_id", shift)
			.with("status", status)
	}

	fn ids(mut rows: Vec<EntityRow>) -> Vec<String> {
		rows.sort_by(|a, b| a.id.cmp(&b.id));
		rows.into_iter().map(|row| row.id).collect()
	}

	#[test]
	fn test_put_get_delete_row() {
		let (_dir, store) = open_store();
		let row = order("o-1", "s-1", "open");

		store.put(EntityTable::Orders, &row).unwrap();
		assert_eq!(store.get(EntityTable::Orders, "o-1").unwrap(), Some(row));
		assert_eq!(store.get(EntityTable::Payments, "o-1").unwrap(), None);

		assert!(store.delete(EntityTable::Orders, "o-1").unwrap());
		assert!(!store.delete(EntityTable::Orders, "o-1").unwrap());
		assert!(store.list_partition(EntityTable::Orders, "s-1").unwrap().is_empty());
	}

	#[test]
	fn test_list_is_scoped_to_table() {
		let (_dir, store) = open_store();
		store.put(EntityTable::Orders, &order("o-1", "s-1", "open")).unwrap();
		store.put(EntityTable::Orders, &order("o-2", "s-2", "open")).unwrap();
		store
			.put(EntityTable::OrderItems, &EntityRow::new("i-1").with("order_id", "o-1"))
			.unwrap();
		store.put(EntityTable::Payments, &EntityRow::new("p-1")).unwrap();

		assert_eq!(ids(store.list(EntityTable::Orders).unwrap()), vec!["o-1", "o-2"]);
		assert_eq!(ids(store.list(EntityTable::OrderItems).unwrap()), vec!["i-1"]);
		assert!(store.list(EntityTable::Shifts).unwrap().is_empty());
	}

	#[test]
	fn test_indexes_follow_partition_and_status_changes() {
		let (_dir, store) = open_store();
		store.put(EntityTable::Orders, &order("o-1", "s-1", "open")).unwrap();
		store.put(EntityTable::Orders, &order("o-2", "s-1", "paid")).unwrap();

		assert_eq!(
			ids(store.list_partition(EntityTable::Orders, "s-1").unwrap()),
			vec!["o-1", "o-2"]
		);
		assert_eq!(
			ids(store.list_partition_status(EntityTable::Orders, "s-1", "open").unwrap()),
			vec!["o-1"]
		);

		// Move o-1 to another shift and close it
		store.put(EntityTable::Orders, &order("o-1", "s-2", "paid")).unwrap();

		assert_eq!(ids(store.list_partition(EntityTable::Orders, "s-1").unwrap()), vec!["o-2"]);
		assert_eq!(ids(store.list_partition(EntityTable::Orders, "s-2").unwrap()), vec!["o-1"]);
		assert!(store
			.list_partition_status(EntityTable::Orders, "s-1", "open")
			.unwrap()
			.is_empty());
		assert_eq!(
			ids(store.list_partition_status(EntityTable::Orders, "s-2", "paid").unwrap()),
			vec!["o-1"]
		);
	}

	#[test]
	fn test_mutation_update_only_touches_existing_records() {
		let (_dir, store) = open_store();
		let mut mutation = Mutation::new(
			MutationPayload::UpsertShift(EntityRow::new("s-1")),
			Utc::now(),
		);
		store.put_mutation(&mutation).unwrap();

		mutation.attempts = 2;
		assert!(store.update_mutation(&mutation).unwrap());
		assert_eq!(store.get_mutation(mutation.id).unwrap().unwrap().attempts, 2);

		assert!(store.delete_mutation(mutation.id).unwrap());
		assert!(!store.update_mutation(&mutation).unwrap());
		assert!(store.all_mutations().unwrap().is_empty());
	}

	#[test]
	fn test_undecodable_mutation_is_skipped_then_purged() {
		let (_dir, store) = open_store();
		let valid = Mutation::new(
			MutationPayload::UpsertShift(EntityRow::new("s-1")),
			Utc::now(),
		);
		store.put_mutation(&valid).unwrap();
		put_raw_mutation(
			&store,
			"legacy-1",
			br#"{"id":"legacy-1","payload":{"type":"upsert_tab","data":{"id":"tab-1"}}}"#,
		);
		put_raw_mutation(&store, "garbage-1", b"not json");

		assert_eq!(store.all_mutations().unwrap(), vec![valid.clone()]);

		let mut purged = store.purge_undecodable().unwrap();
		purged.sort();
		assert_eq!(purged, vec!["garbage-1".to_string(), "legacy-1".to_string()]);
		assert!(store.purge_undecodable().unwrap().is_empty());
		assert_eq!(store.all_mutations().unwrap(), vec![valid]);
	}

	#[test]
	fn test_staged_blobs_roundtrip() {
		let (_dir, store) = open_store();
		let staged_at = DateTime::<Utc>::from_timestamp_millis(1_700_000_000_000).unwrap();

		store.put_blob("k-1", b"jpeg bytes", staged_at).unwrap();
		assert_eq!(store.get_blob("k-1").unwrap(), Some(b"jpeg bytes".to_vec()));
		assert_eq!(store.staged_keys().unwrap(), vec![("k-1".to_string(), staged_at)]);

		assert!(store.delete_blob("k-1").unwrap());
		assert_eq!(store.get_blob("k-1").unwrap(), None);
		assert!(store.staged_keys().unwrap().is_empty());
	}

	#[test]
	fn test_reopen_keeps_data() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("outbox.redb");

		let mutation = Mutation::new(
			MutationPayload::UpsertShift(EntityRow::new("s-1")),
			Utc::now(),
		);
		{
			let store = RedbStore::open(&path).unwrap();
			store.put_mutation(&mutation).unwrap();
		}

		let store = RedbStore::open(&path).unwrap();
		assert_eq!(store.all_mutations().unwrap(), vec![mutation]);
	}
}
