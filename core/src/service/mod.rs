//! Outbox and cache services

pub mod cache;
pub mod outbox;

use anyhow::Result;

/// Background service lifecycle
#[async_trait::async_trait]
pub trait Service: Send + Sync {
	fn name(&self) -> &'static str;

	fn is_running(&self) -> bool;

	async fn start(&self) -> Result<()>;

	/// Stop the service gracefully
	async fn stop(&self) -> Result<()>;
}
