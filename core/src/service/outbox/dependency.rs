use crate::domain::ParentRef;
use crate::infra::{Filter, RemoteStore};
use std::sync::Arc;
use tracing::{debug, warn};

/// Asks the remote whether referenced parents exist before a dependent write
pub struct DependencyChecker {
	remote: Arc<dyn RemoteStore>,
}

impl DependencyChecker {
	pub fn new(remote: Arc<dyn RemoteStore>) -> Self {
		Self { remote }
	}

	/// `true` if any of `parents` exists remotely
	///
	/// A failed query counts as unresolved for that reference; the remaining
	/// references are still checked.
	pub async fn exists(&self, parents: &[ParentRef]) -> bool {
		for parent in parents {
			match self
				.remote
				.query(parent.table, &[Filter::eq("id", parent.id.as_str())])
				.await
			{
				Ok(rows) if !rows.is_empty() => return true,
				Ok(_) => debug!(%parent, "Parent not found on remote"),
				Err(e) => warn!(%parent, error = %e, "Dependency check failed"),
			}
		}
		false
	}
}
