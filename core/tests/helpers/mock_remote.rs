//! In-process stand-ins for the remote system of record and the blob store

use async_trait::async_trait;
use outbox_core::{
	domain::EntityTable,
	infra::{BlobStore, Filter, RemoteError, RemoteStore, UploadedBlob},
};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Notify;

/// A remote write as seen by the mock, in call order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteWrite {
	Upsert { table: EntityTable, id: String },
	Delete { table: EntityTable, id: String },
}

impl RemoteWrite {
	pub fn id(&self) -> &str {
		match self {
			RemoteWrite::Upsert { id, .. } | RemoteWrite::Delete { id, .. } => id,
		}
	}
}

/// Pauses writes until released, to hold a drain in flight
#[derive(Clone, Default)]
pub struct WriteGate {
	pub entered: Arc<Notify>,
	pub release: Arc<Notify>,
}

/// Table store enforcing parent references the way the real remote does
#[derive(Default)]
pub struct MockRemote {
	tables: Mutex<HashMap<EntityTable, BTreeMap<String, Value>>>,
	writes: Mutex<Vec<RemoteWrite>>,
	queries: Mutex<Vec<EntityTable>>,
	write_failures: Mutex<VecDeque<RemoteError>>,
	query_failure: Mutex<Option<RemoteError>>,
	gate: Mutex<Option<WriteGate>>,
}

fn parent_fields(table: EntityTable) -> &'static [(&'static str, EntityTable)] {
	match table {
		EntityTable::Orders => &[("shift_id", EntityTable::Shifts)],
		EntityTable::OrderItems => &[("order_id", EntityTable::Orders)],
		EntityTable::Payments => &[
			("order_id", EntityTable::Orders),
			("shift_id", EntityTable::Shifts),
		],
		_ => &[],
	}
}

impl MockRemote {
	pub fn new() -> Self {
		Self::default()
	}

	/// Seed a row directly, bypassing write history
	pub fn insert(&self, table: EntityTable, row: Value) {
		let id = row["id"].as_str().unwrap_or_default().to_string();
		self.tables.lock().entry(table).or_default().insert(id, row);
	}

	pub fn remove(&self, table: EntityTable, id: &str) {
		if let Some(rows) = self.tables.lock().get_mut(&table) {
			rows.remove(id);
		}
	}

	pub fn row(&self, table: EntityTable, id: &str) -> Option<Value> {
		self.tables
			.lock()
			.get(&table)
			.and_then(|rows| rows.get(id))
			.cloned()
	}

	pub fn contains(&self, table: EntityTable, id: &str) -> bool {
		self.row(table, id).is_some()
	}

	pub fn writes(&self) -> Vec<RemoteWrite> {
		self.writes.lock().clone()
	}

	/// Writes that targeted `id`
	pub fn writes_for(&self, id: &str) -> Vec<RemoteWrite> {
		self.writes()
			.into_iter()
			.filter(|write| write.id() == id)
			.collect()
	}

	pub fn query_count(&self, table: EntityTable) -> usize {
		self.queries.lock().iter().filter(|t| **t == table).count()
	}

	/// Fail the next write with `error`
	pub fn fail_next_write(&self, error: RemoteError) {
		self.write_failures.lock().push_back(error);
	}

	/// Fail every query until cleared
	pub fn fail_queries(&self, error: Option<RemoteError>) {
		*self.query_failure.lock() = error;
	}

	pub fn gate_writes(&self) -> WriteGate {
		let gate = WriteGate::default();
		*self.gate.lock() = Some(gate.clone());
		gate
	}

	/// Stop pausing writes that have not reached the gate yet
	pub fn open_gate(&self) {
		*self.gate.lock() = None;
	}

	async fn before_write(&self, write: RemoteWrite) -> Result<(), RemoteError> {
		let gate = self.gate.lock().clone();
		if let Some(gate) = gate {
			gate.entered.notify_one();
			gate.release.notified().await;
		}

		self.writes.lock().push(write);
		match self.write_failures.lock().pop_front() {
			Some(error) => Err(error),
			None => Ok(()),
		}
	}

	fn check_parents(&self, table: EntityTable, row: &Value) -> Result<(), RemoteError> {
		let tables = self.tables.lock();
		let referenced: Vec<_> = parent_fields(table)
			.iter()
			.filter_map(|(field, parent)| row[*field].as_str().map(|id| (*field, *parent, id)))
			.collect();

		let resolved = referenced.iter().any(|(_, parent, id)| {
			tables
				.get(parent)
				.is_some_and(|rows| rows.contains_key(*id))
		});

		if referenced.is_empty() || resolved {
			Ok(())
		} else {
			Err(RemoteError::ForeignKeyViolation {
				table,
				detail: referenced
					.iter()
					.map(|(field, _, id)| format!("{field}={id}"))
					.collect::<Vec<_>>()
					.join(", "),
			})
		}
	}
}

#[async_trait]
impl RemoteStore for MockRemote {
	async fn upsert(
		&self,
		table: EntityTable,
		row: Value,
		conflict_key: &str,
	) -> Result<Value, RemoteError> {
		let id = row[conflict_key].as_str().unwrap_or_default().to_string();
		self.before_write(RemoteWrite::Upsert {
			table,
			id: id.clone(),
		})
		.await?;
		self.check_parents(table, &row)?;

		self.tables
			.lock()
			.entry(table)
			.or_default()
			.insert(id, row.clone());
		Ok(row)
	}

	async fn delete(&self, table: EntityTable, id: &str) -> Result<(), RemoteError> {
		self.before_write(RemoteWrite::Delete {
			table,
			id: id.to_string(),
		})
		.await?;
		self.remove(table, id);
		Ok(())
	}

	async fn query(&self, table: EntityTable, filters: &[Filter]) -> Result<Vec<Value>, RemoteError> {
		self.queries.lock().push(table);
		if let Some(error) = self.query_failure.lock().clone() {
			return Err(error);
		}

		Ok(self
			.tables
			.lock()
			.get(&table)
			.map(|rows| {
				rows.values()
					.filter(|row| filters.iter().all(|filter| filter.matches(row)))
					.cloned()
					.collect()
			})
			.unwrap_or_default())
	}
}

#[derive(Default)]
pub struct MockBlobStore {
	uploads: Mutex<Vec<(String, Vec<u8>)>>,
	failure: Mutex<Option<RemoteError>>,
}

impl MockBlobStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn uploads(&self) -> Vec<(String, Vec<u8>)> {
		self.uploads.lock().clone()
	}

	pub fn fail_uploads(&self, error: Option<RemoteError>) {
		*self.failure.lock() = error;
	}

	pub fn public_ref(path: &str) -> String {
		format!("https://blobs.test/{path}")
	}
}

#[async_trait]
impl BlobStore for MockBlobStore {
	async fn upload(&self, path: &str, bytes: Vec<u8>) -> Result<UploadedBlob, RemoteError> {
		if let Some(error) = self.failure.lock().clone() {
			return Err(error);
		}
		self.uploads.lock().push((path.to_string(), bytes));
		Ok(UploadedBlob {
			path: path.to_string(),
			public_ref: Self::public_ref(path),
		})
	}
}
