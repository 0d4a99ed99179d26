//! Cached entity rows and the tables they live in

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// Field holding the lifecycle status of a row, indexed together with the partition key
pub const STATUS_FIELD: &str = "status";

/// Field used as the stable secondary sort key for cached partitions
pub const CREATED_AT_FIELD: &str = "created_at";

/// Remote tables mirrored locally
///
/// The string form is the remote table name and the mirror store namespace.
#[derive(
	Debug,
	Clone,
	Copy,
	PartialEq,
	Eq,
	Hash,
	PartialOrd,
	Ord,
	Serialize,
	Deserialize,
	Display,
	EnumString,
	AsRefStr,
	EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EntityTable {
	Shifts,
	DiningTables,
	MenuItems,
	Orders,
	OrderItems,
	Payments,
}

impl EntityTable {
	/// Field that scopes rows of this table into partitions, if any
	pub fn partition_field(self) -> Option<&'static str> {
		match self {
			EntityTable::Orders | EntityTable::Payments => Some("shift_id"),
			EntityTable::OrderItems => Some("order_id"),
			EntityTable::Shifts | EntityTable::DiningTables | EntityTable::MenuItems => None,
		}
	}
}

/// Reference from a row to the parent record it depends on
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParentRef {
	pub table: EntityTable,
	pub id: String,
}

impl fmt::Display for ParentRef {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}({})", self.table, self.id)
	}
}

/// Primary key of a row, used as the payload of delete mutations
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityKey {
	pub id: String,
}

impl EntityKey {
	pub fn new(id: impl Into<String>) -> Self {
		Self { id: id.into() }
	}
}

/// Denormalized copy of a remote record
///
/// `version` is bumped on every local or remote-confirmed mutation and
/// `updated_at` is refreshed alongside it. Everything else the entity carries
/// lives in `fields`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRow {
	pub id: String,

	#[serde(default)]
	pub version: i64,

	#[serde(default = "Utc::now")]
	pub updated_at: DateTime<Utc>,

	#[serde(flatten)]
	pub fields: Map<String, Value>,
}

impl EntityRow {
	pub fn new(id: impl Into<String>) -> Self {
		Self {
			id: id.into(),
			version: 0,
			updated_at: Utc::now(),
			fields: Map::new(),
		}
	}

	/// Builder-style field setter
	pub fn with(mut self, field: &str, value: impl Into<Value>) -> Self {
		self.set(field, value);
		self
	}

	pub fn set(&mut self, field: &str, value: impl Into<Value>) {
		self.fields.insert(field.to_string(), value.into());
	}

	pub fn field(&self, field: &str) -> Option<&Value> {
		self.fields.get(field)
	}

	/// String value of a field, `None` when absent, null or not a string
	pub fn str_field(&self, field: &str) -> Option<&str> {
		self.fields.get(field).and_then(Value::as_str)
	}

	/// Partition key of this row within `table`
	pub fn partition_key(&self, table: EntityTable) -> Option<&str> {
		table
			.partition_field()
			.and_then(|field| self.str_field(field))
	}

	pub fn status(&self) -> Option<&str> {
		self.str_field(STATUS_FIELD)
	}

	/// Creation time of the record, if it carries a parseable one
	pub fn created_at(&self) -> Option<DateTime<Utc>> {
		self.str_field(CREATED_AT_FIELD)
			.and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
			.map(|dt| dt.with_timezone(&Utc))
	}

	/// Record a mutation: version moves past both its own and the previously
	/// stored version, and the timestamp is refreshed.
	pub fn touch(&mut self, previous_version: Option<i64>, now: DateTime<Utc>) {
		self.version = self.version.max(previous_version.unwrap_or(0)) + 1;
		self.updated_at = now;
	}

	pub fn to_value(&self) -> serde_json::Result<Value> {
		serde_json::to_value(self)
	}

	pub fn from_value(value: Value) -> serde_json::Result<Self> {
		serde_json::from_value(value)
	}
}
