use crate::domain::entity::STATUS_FIELD;
use crate::domain::{EntityRow, EntityTable};
use crate::error::Result;
use crate::infra::{Connectivity, Filter, MirrorStore, RemoteStore};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of reconciling a partition with a remote snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceOutcome {
	Replaced { upserted: usize, deleted: usize },
	/// The remote returned nothing for a partition we hold rows for; the cache
	/// was left untouched
	PreservedSuspectedEmpty { cached: usize },
}

pub struct PartitionReconciler {
	mirror: Arc<dyn MirrorStore>,
	remote: Arc<dyn RemoteStore>,
	connectivity: Arc<dyn Connectivity>,
}

impl PartitionReconciler {
	pub fn new(
		mirror: Arc<dyn MirrorStore>,
		remote: Arc<dyn RemoteStore>,
		connectivity: Arc<dyn Connectivity>,
	) -> Self {
		Self {
			mirror,
			remote,
			connectivity,
		}
	}

	/// Make the cached partition set-equal to `rows`
	pub fn replace(
		&self,
		table: EntityTable,
		partition_key: &str,
		rows: &[EntityRow],
	) -> Result<ReplaceOutcome> {
		let cached = self.mirror.list_partition(table, partition_key)?;

		if rows.is_empty() && !cached.is_empty() {
			warn!(
				%table,
				partition_key,
				cached = cached.len(),
				"Remote returned an empty partition, keeping cached rows"
			);
			return Ok(ReplaceOutcome::PreservedSuspectedEmpty {
				cached: cached.len(),
			});
		}

		let fresh: HashSet<&str> = rows.iter().map(|row| row.id.as_str()).collect();
		let mut deleted = 0;
		for row in cached.iter().filter(|row| !fresh.contains(row.id.as_str())) {
			if self.mirror.delete(table, &row.id)? {
				deleted += 1;
			}
		}

		for row in rows {
			self.mirror.put(table, row)?;
		}

		debug!(%table, partition_key, upserted = rows.len(), deleted, "Partition replaced");

		Ok(ReplaceOutcome::Replaced {
			upserted: rows.len(),
			deleted,
		})
	}

	/// Upsert `rows` without removing anything
	pub fn merge(&self, table: EntityTable, rows: &[EntityRow]) -> Result<usize> {
		for row in rows {
			self.mirror.put(table, row)?;
		}
		debug!(%table, upserted = rows.len(), "Rows merged");
		Ok(rows.len())
	}

	/// Cached rows of a partition, optionally narrowed by `sub_filter`
	///
	/// Sorted by `created_at`, then id.
	pub fn cached_partition(
		&self,
		table: EntityTable,
		partition_key: &str,
		sub_filter: Option<&Filter>,
	) -> Result<Vec<EntityRow>> {
		let mut rows = match sub_filter {
			Some(filter) if filter.field == STATUS_FIELD && filter.value.is_string() => {
				let status = filter.value.as_str().unwrap_or_default();
				self.mirror
					.list_partition_status(table, partition_key, status)?
			}
			Some(filter) => self
				.mirror
				.list_partition(table, partition_key)?
				.into_iter()
				.filter(|row| row_matches(row, filter))
				.collect(),
			None => self.mirror.list_partition(table, partition_key)?,
		};
		sort_rows(&mut rows);
		Ok(rows)
	}

	/// Read a partition, refreshing the cache from the remote when online
	///
	/// An unfiltered fetch replaces the partition; a filtered one only merges,
	/// since rows outside the filter are not part of the result. Remote
	/// failures fall back to the cache.
	pub async fn fetch_partition(
		&self,
		table: EntityTable,
		partition_key: &str,
		sub_filter: Option<&Filter>,
	) -> Result<Vec<EntityRow>> {
		if !self.connectivity.is_online() {
			return self.cached_partition(table, partition_key, sub_filter);
		}

		let Some(partition_field) = table.partition_field() else {
			warn!(%table, "Table is not partitioned, serving cache");
			return self.cached_partition(table, partition_key, sub_filter);
		};

		let mut filters = vec![Filter::eq(partition_field, partition_key)];
		filters.extend(sub_filter.cloned());

		let fresh = match self.remote.query(table, &filters).await {
			Ok(values) => values
				.into_iter()
				.map(EntityRow::from_value)
				.collect::<serde_json::Result<Vec<_>>>(),
			Err(e) => {
				warn!(%table, partition_key, error = %e, "Partition fetch failed, serving cache");
				return self.cached_partition(table, partition_key, sub_filter);
			}
		};

		let mut fresh = match fresh {
			Ok(rows) => rows,
			Err(e) => {
				warn!(%table, partition_key, error = %e, "Remote rows unreadable, serving cache");
				return self.cached_partition(table, partition_key, sub_filter);
			}
		};

		if sub_filter.is_some() {
			self.merge(table, &fresh)?;
		} else if let ReplaceOutcome::PreservedSuspectedEmpty { .. } =
			self.replace(table, partition_key, &fresh)?
		{
			return self.cached_partition(table, partition_key, None);
		}

		sort_rows(&mut fresh);
		Ok(fresh)
	}
}

fn row_matches(row: &EntityRow, filter: &Filter) -> bool {
	if filter.field == "id" {
		return filter.value.as_str() == Some(row.id.as_str());
	}
	row.field(&filter.field) == Some(&filter.value)
}

fn sort_rows(rows: &mut [EntityRow]) {
	rows.sort_by(|a, b| {
		a.created_at()
			.cmp(&b.created_at())
			.then_with(|| a.id.cmp(&b.id))
	});
}
