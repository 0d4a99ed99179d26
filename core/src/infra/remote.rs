//! Remote system of record and blob store interfaces
//!
//! The transport binding lives in the host. Timeouts are its responsibility;
//! the outbox only needs to tell a referential-integrity rejection apart from
//! every other failure.

use crate::domain::EntityTable;
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Failures reported by the remote collaborators
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
	/// The write references a parent row the remote does not have
	#[error("referential integrity violation on {table}: {detail}")]
	ForeignKeyViolation { table: EntityTable, detail: String },

	#[error("network error: {0}")]
	Network(String),

	#[error("server error ({status}): {message}")]
	Server { status: u16, message: String },

	/// The remote rejected the payload itself; retrying it unchanged will not help
	#[error("validation error: {0}")]
	Validation(String),
}

impl RemoteError {
	pub fn is_foreign_key_violation(&self) -> bool {
		matches!(self, RemoteError::ForeignKeyViolation { .. })
	}

	pub fn is_validation(&self) -> bool {
		matches!(self, RemoteError::Validation(_))
	}
}

/// Equality filter for remote queries
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
	pub field: String,
	pub value: Value,
}

impl Filter {
	pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
		Self {
			field: field.into(),
			value: value.into(),
		}
	}

	/// Whether a remote row satisfies this filter
	pub fn matches(&self, row: &Value) -> bool {
		row.get(&self.field) == Some(&self.value)
	}
}

/// Tabular remote keyed by `id`
#[async_trait]
pub trait RemoteStore: Send + Sync {
	/// Insert or update `row`, resolving conflicts on `conflict_key`
	///
	/// Returns the row as stored by the remote.
	async fn upsert(
		&self,
		table: EntityTable,
		row: Value,
		conflict_key: &str,
	) -> Result<Value, RemoteError>;

	async fn delete(&self, table: EntityTable, id: &str) -> Result<(), RemoteError>;

	/// Rows of `table` matching every filter
	async fn query(&self, table: EntityTable, filters: &[Filter]) -> Result<Vec<Value>, RemoteError>;
}

/// Durable location of an uploaded attachment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedBlob {
	pub path: String,
	pub public_ref: String,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
	async fn upload(&self, path: &str, bytes: Vec<u8>) -> Result<UploadedBlob, RemoteError>;
}
