//! Tracing setup for hosts embedding the outbox

use anyhow::Result;
use std::fs;
use std::path::Path;
use tracing_appender::{
	non_blocking::WorkerGuard,
	rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install a global subscriber logging to stdout and to a daily rolling file
///
/// `RUST_LOG` wins over `default_level` when set. The returned guard flushes
/// the file writer on drop, so the host must keep it alive. Fails if a global
/// subscriber is already installed.
pub fn init_tracing(log_dir: &Path, default_level: &str) -> Result<WorkerGuard> {
	fs::create_dir_all(log_dir)?;

	let file_appender = RollingFileAppender::new(Rotation::DAILY, log_dir, "outbox.log");
	let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

	let env_filter = EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| EnvFilter::new(format!("warn,outbox_core={default_level}")));

	tracing_subscriber::registry()
		.with(env_filter)
		.with(
			fmt::layer()
				.with_target(true)
				.with_line_number(true)
				.with_writer(std::io::stdout),
		)
		.with(
			fmt::layer()
				.with_target(true)
				.with_line_number(true)
				.with_ansi(false)
				.with_writer(non_blocking),
		)
		.try_init()?;

	Ok(guard)
}
