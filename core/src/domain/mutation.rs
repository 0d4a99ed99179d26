//! Outbox mutations

use super::entity::{EntityKey, EntityRow, EntityTable};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use strum::{AsRefStr, Display, EnumDiscriminants, EnumIter, EnumString};
use uuid::Uuid;

/// Identifier of a queued mutation
///
/// UUIDv7; used as the tie breaker when two mutations share a `created_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MutationId(Uuid);

impl MutationId {
	pub fn new() -> Self {
		Self(Uuid::now_v7())
	}

	pub fn as_uuid(&self) -> Uuid {
		self.0
	}
}

impl Default for MutationId {
	fn default() -> Self {
		Self::new()
	}
}

impl From<Uuid> for MutationId {
	fn from(uuid: Uuid) -> Self {
		Self(uuid)
	}
}

impl fmt::Display for MutationId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		self.0.fmt(f)
	}
}

/// Payload of a mutation, one variant per remote operation
///
/// The variant is the closed type tag; `MutationType` is derived from it so
/// the tag and the payload shape can never disagree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, EnumDiscriminants)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
#[strum_discriminants(name(MutationType))]
#[strum_discriminants(derive(Hash, PartialOrd, Ord, Display, EnumString, AsRefStr, EnumIter))]
#[strum_discriminants(strum(serialize_all = "snake_case"))]
pub enum MutationPayload {
	UpsertShift(EntityRow),
	DeleteShift(EntityKey),
	UpsertDiningTable(EntityRow),
	DeleteDiningTable(EntityKey),
	UpsertMenuItem(EntityRow),
	DeleteMenuItem(EntityKey),
	UpsertOrder(EntityRow),
	DeleteOrder(EntityKey),
	UpsertOrderItem(EntityRow),
	DeleteOrderItem(EntityKey),
	UpsertPayment(EntityRow),
	DeletePayment(EntityKey),
}

impl MutationPayload {
	pub fn mutation_type(&self) -> MutationType {
		MutationType::from(self)
	}

	/// Upsert of `row` into `table`
	pub fn upsert(table: EntityTable, row: EntityRow) -> Self {
		match table {
			EntityTable::Shifts => Self::UpsertShift(row),
			EntityTable::DiningTables => Self::UpsertDiningTable(row),
			EntityTable::MenuItems => Self::UpsertMenuItem(row),
			EntityTable::Orders => Self::UpsertOrder(row),
			EntityTable::OrderItems => Self::UpsertOrderItem(row),
			EntityTable::Payments => Self::UpsertPayment(row),
		}
	}

	/// Delete of `key` from `table`
	pub fn delete(table: EntityTable, key: EntityKey) -> Self {
		match table {
			EntityTable::Shifts => Self::DeleteShift(key),
			EntityTable::DiningTables => Self::DeleteDiningTable(key),
			EntityTable::MenuItems => Self::DeleteMenuItem(key),
			EntityTable::Orders => Self::DeleteOrder(key),
			EntityTable::OrderItems => Self::DeleteOrderItem(key),
			EntityTable::Payments => Self::DeletePayment(key),
		}
	}

	/// Row carried by upsert variants
	pub fn row(&self) -> Option<&EntityRow> {
		match self {
			Self::UpsertShift(row)
			| Self::UpsertDiningTable(row)
			| Self::UpsertMenuItem(row)
			| Self::UpsertOrder(row)
			| Self::UpsertOrderItem(row)
			| Self::UpsertPayment(row) => Some(row),
			Self::DeleteShift(_)
			| Self::DeleteDiningTable(_)
			| Self::DeleteMenuItem(_)
			| Self::DeleteOrder(_)
			| Self::DeleteOrderItem(_)
			| Self::DeletePayment(_) => None,
		}
	}

	pub fn row_mut(&mut self) -> Option<&mut EntityRow> {
		match self {
			Self::UpsertShift(row)
			| Self::UpsertDiningTable(row)
			| Self::UpsertMenuItem(row)
			| Self::UpsertOrder(row)
			| Self::UpsertOrderItem(row)
			| Self::UpsertPayment(row) => Some(row),
			Self::DeleteShift(_)
			| Self::DeleteDiningTable(_)
			| Self::DeleteMenuItem(_)
			| Self::DeleteOrder(_)
			| Self::DeleteOrderItem(_)
			| Self::DeletePayment(_) => None,
		}
	}

	/// Primary key of the entity this mutation targets
	pub fn entity_id(&self) -> &str {
		match self {
			Self::UpsertShift(row)
			| Self::UpsertDiningTable(row)
			| Self::UpsertMenuItem(row)
			| Self::UpsertOrder(row)
			| Self::UpsertOrderItem(row)
			| Self::UpsertPayment(row) => &row.id,
			Self::DeleteShift(key)
			| Self::DeleteDiningTable(key)
			| Self::DeleteMenuItem(key)
			| Self::DeleteOrder(key)
			| Self::DeleteOrderItem(key)
			| Self::DeletePayment(key) => &key.id,
		}
	}
}

/// A unit of deferred work waiting for remote confirmation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mutation {
	pub id: MutationId,
	pub payload: MutationPayload,
	pub created_at: DateTime<Utc>,

	/// Failed dependency checks so far (transient failures are not counted)
	#[serde(default)]
	pub attempts: u32,

	/// Earliest time this mutation may be retried, `None` means eligible now
	#[serde(default)]
	pub next_attempt: Option<DateTime<Utc>>,

	#[serde(default)]
	pub last_error: Option<String>,
}

impl Mutation {
	pub fn new(payload: MutationPayload, created_at: DateTime<Utc>) -> Self {
		Self {
			id: MutationId::new(),
			payload,
			created_at,
			attempts: 0,
			next_attempt: None,
			last_error: None,
		}
	}

	pub fn mutation_type(&self) -> MutationType {
		self.payload.mutation_type()
	}

	pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
		self.next_attempt.map_or(true, |at| at <= now)
	}
}
