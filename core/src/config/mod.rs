//! Outbox configuration

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

pub mod migration;

pub use migration::Migrate;

const CONFIG_FILE: &str = "outbox.json";

/// Persisted outbox configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxConfig {
	/// Config schema version
	pub version: u32,

	/// Directory holding the config file, the store and the logs
	pub data_dir: PathBuf,

	/// Default tracing level for this crate
	pub log_level: String,

	#[serde(default)]
	pub retry: RetryConfig,

	#[serde(default)]
	pub service: ServiceConfig,

	#[serde(default)]
	pub staging: StagingConfig,
}

/// Dependency retry policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
	/// Failed dependency checks before a mutation is discarded
	pub max_dependency_attempts: u32,

	pub backoff_base_secs: u64,

	/// Cap on the doubling exponent
	pub backoff_max_exponent: u32,
}

impl Default for RetryConfig {
	fn default() -> Self {
		Self {
			max_dependency_attempts: 3,
			backoff_base_secs: 15,
			backoff_max_exponent: 4,
		}
	}
}

impl RetryConfig {
	/// Delay before the next retry after `attempts` failed dependency checks
	///
	/// `base * 2^min(attempts - 1, max_exponent)`
	pub fn backoff_for(&self, attempts: u32) -> Duration {
		let exponent = attempts.saturating_sub(1).min(self.backoff_max_exponent);
		Duration::from_secs(self.backoff_base_secs.saturating_mul(1u64 << exponent))
	}
}

/// Background drain service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
	pub drain_interval_secs: u64,

	/// Drain as soon as connectivity comes back
	pub drain_on_reconnect: bool,
}

impl ServiceConfig {
	/// Interval between drain ticks, never shorter than a second
	pub fn drain_interval(&self) -> Duration {
		Duration::from_secs(self.drain_interval_secs.max(1))
	}
}

impl Default for ServiceConfig {
	fn default() -> Self {
		Self {
			drain_interval_secs: 30,
			drain_on_reconnect: true,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagingConfig {
	/// Age after which an unreferenced staged attachment is reclaimed
	pub orphan_grace_secs: u64,
}

impl Default for StagingConfig {
	fn default() -> Self {
		Self {
			orphan_grace_secs: 3600,
		}
	}
}

impl OutboxConfig {
	/// Load configuration from a data directory, creating a default one if missing
	pub fn load_from(data_dir: &Path) -> Result<Self> {
		let config_path = data_dir.join(CONFIG_FILE);

		if config_path.exists() {
			info!("Loading config from {:?}", config_path);
			let json = fs::read_to_string(&config_path)?;
			let mut config: OutboxConfig = serde_json::from_str(&json)?;

			if config.version != Self::target_version() {
				info!(
					"Migrating config from v{} to v{}",
					config.version,
					Self::target_version()
				);
				config.migrate()?;
				config.save()?;
			}

			Ok(config)
		} else {
			warn!("No config found, creating default at {:?}", config_path);
			let config = Self::default_with_dir(data_dir.to_path_buf());
			config.save()?;
			Ok(config)
		}
	}

	pub fn default_with_dir(data_dir: PathBuf) -> Self {
		Self {
			version: Self::target_version(),
			data_dir,
			log_level: "info".to_string(),
			retry: RetryConfig::default(),
			service: ServiceConfig::default(),
			staging: StagingConfig::default(),
		}
	}

	pub fn save(&self) -> Result<()> {
		fs::create_dir_all(&self.data_dir)?;

		let config_path = self.data_dir.join(CONFIG_FILE);
		let json = serde_json::to_string_pretty(self)?;
		fs::write(&config_path, json)?;
		info!("Saved config to {:?}", config_path);
		Ok(())
	}

	pub fn logs_dir(&self) -> PathBuf {
		self.data_dir.join("logs")
	}

	pub fn store_path(&self) -> PathBuf {
		self.data_dir.join("outbox.redb")
	}

	pub fn orphan_grace(&self) -> chrono::Duration {
		chrono::Duration::seconds(i64::try_from(self.staging.orphan_grace_secs).unwrap_or(i64::MAX))
	}
}

impl Migrate for OutboxConfig {
	fn current_version(&self) -> u32 {
		self.version
	}

	fn target_version() -> u32 {
		2
	}

	fn migrate(&mut self) -> Result<()> {
		match self.version {
			0 => {
				self.version = 1;
				self.migrate()
			}
			1 => {
				// v2 introduced orphan sweeping of staged attachments
				self.staging = StagingConfig::default();
				self.version = 2;
				Ok(())
			}
			2 => Ok(()),
			v => Err(anyhow!("Unknown config version: {}", v)),
		}
	}
}
