use crate::infra::{RemoteError, StoreError};
use thiserror::Error;

/// Errors surfaced by outbox operations
#[derive(Debug, Error)]
pub enum Error {
	#[error("local store error: {0}")]
	Store(#[from] StoreError),

	#[error("remote error: {0}")]
	Remote(#[from] RemoteError),

	#[error("serialization error: {0}")]
	Serialization(#[from] serde_json::Error),
}

impl Error {
	/// The remote rejected the payload itself
	pub fn is_validation(&self) -> bool {
		matches!(self, Error::Remote(err) if err.is_validation())
	}
}

pub type Result<T> = std::result::Result<T, Error>;
