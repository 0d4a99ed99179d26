use anyhow::Result;

/// Versioned on-disk configuration
pub trait Migrate {
	fn current_version(&self) -> u32;

	fn target_version() -> u32;

	/// Upgrade in place, one version step at a time, until the target is reached
	fn migrate(&mut self) -> Result<()>;
}
