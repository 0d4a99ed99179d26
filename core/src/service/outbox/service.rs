//! Background drain service
//!
//! Drains the outbox whenever connectivity comes back and on a fixed
//! interval. The interval tick also sweeps orphaned staged attachments.

use super::engine::SyncEngine;
use super::queue::MutationQueue;
use super::registry;
use super::staging::AttachmentStaging;
use crate::config::ServiceConfig;
use crate::infra::ConnectivityWatcher;
use crate::ops::Diagnostics;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

pub struct OutboxService {
	engine: Arc<SyncEngine>,
	queue: Arc<MutationQueue>,
	staging: Arc<AttachmentStaging>,
	config: ServiceConfig,
	orphan_grace: chrono::Duration,
	watcher: Mutex<Option<ConnectivityWatcher>>,
	diagnostics: Option<Arc<dyn Diagnostics>>,
	is_running: Arc<AtomicBool>,
	shutdown_tx: Mutex<Option<broadcast::Sender<()>>>,
}

impl OutboxService {
	pub fn new(
		engine: Arc<SyncEngine>,
		queue: Arc<MutationQueue>,
		staging: Arc<AttachmentStaging>,
		config: ServiceConfig,
		orphan_grace: chrono::Duration,
	) -> Self {
		Self {
			engine,
			queue,
			staging,
			config,
			orphan_grace,
			watcher: Mutex::new(None),
			diagnostics: None,
			is_running: Arc::new(AtomicBool::new(false)),
			shutdown_tx: Mutex::new(None),
		}
	}

	/// Drain on every connectivity-regained edge seen by `watcher`
	pub fn with_watcher(mut self, watcher: ConnectivityWatcher) -> Self {
		self.watcher = Mutex::new(Some(watcher));
		self
	}

	/// Dump outbox state whenever a drain reports errors
	pub fn with_diagnostics(mut self, diagnostics: Arc<dyn Diagnostics>) -> Self {
		self.diagnostics = Some(diagnostics);
		self
	}

	async fn run_loop(
		engine: Arc<SyncEngine>,
		queue: Arc<MutationQueue>,
		staging: Arc<AttachmentStaging>,
		diagnostics: Option<Arc<dyn Diagnostics>>,
		interval: Duration,
		orphan_grace: chrono::Duration,
		mut watcher: Option<ConnectivityWatcher>,
		mut shutdown_rx: broadcast::Receiver<()>,
	) {
		let mut ticker = tokio::time::interval(interval);
		ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

		loop {
			tokio::select! {
				_ = shutdown_rx.recv() => {
					info!("Outbox service loop shutting down");
					break;
				}
				regained = wait_regained(&mut watcher) => {
					if regained {
						debug!("Connectivity regained, draining outbox");
						Self::drain_once(&engine, diagnostics.as_deref()).await;
					} else {
						// Monitor dropped; fall back to interval draining
						watcher = None;
					}
				}
				_ = ticker.tick() => {
					Self::drain_once(&engine, diagnostics.as_deref()).await;
					Self::sweep_orphans(&queue, &staging, orphan_grace);
				}
			}
		}
	}

	async fn drain_once(engine: &SyncEngine, diagnostics: Option<&dyn Diagnostics>) {
		match engine.drain().await {
			Ok(report) if report.errors > 0 => {
				if let Some(diagnostics) = diagnostics {
					if let Err(e) = diagnostics.log_pending() {
						warn!(error = %e, "Failed to collect outbox diagnostics");
					}
				}
			}
			Ok(_) => {}
			Err(e) => warn!(error = %e, "Outbox drain failed"),
		}
	}

	fn sweep_orphans(queue: &MutationQueue, staging: &AttachmentStaging, grace: chrono::Duration) {
		let result = queue
			.list_pending()
			.and_then(|pending| {
				staging.sweep_orphans(&registry::referenced_staged_keys(&pending), grace)
			});
		if let Err(e) = result {
			warn!(error = %e, "Orphan sweep failed");
		}
	}
}

async fn wait_regained(watcher: &mut Option<ConnectivityWatcher>) -> bool {
	match watcher {
		Some(watcher) => watcher.regained().await,
		None => std::future::pending().await,
	}
}

#[async_trait]
impl crate::service::Service for OutboxService {
	fn name(&self) -> &'static str {
		"outbox_service"
	}

	fn is_running(&self) -> bool {
		self.is_running.load(Ordering::SeqCst)
	}

	async fn start(&self) -> Result<()> {
		if self.is_running.load(Ordering::SeqCst) {
			warn!("Outbox service already running");
			return Ok(());
		}

		info!("Starting outbox service");

		let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
		*self.shutdown_tx.lock().await = Some(shutdown_tx);

		let watcher = if self.config.drain_on_reconnect {
			self.watcher.lock().await.clone()
		} else {
			None
		};

		self.is_running.store(true, Ordering::SeqCst);

		tokio::spawn(Self::run_loop(
			self.engine.clone(),
			self.queue.clone(),
			self.staging.clone(),
			self.diagnostics.clone(),
			self.config.drain_interval(),
			self.orphan_grace,
			watcher,
			shutdown_rx,
		));

		info!(
			interval_secs = self.config.drain_interval_secs,
			drain_on_reconnect = self.config.drain_on_reconnect,
			"Outbox service started"
		);

		Ok(())
	}

	async fn stop(&self) -> Result<()> {
		if !self.is_running.load(Ordering::SeqCst) {
			return Ok(());
		}

		info!("Stopping outbox service");

		if let Some(shutdown_tx) = self.shutdown_tx.lock().await.take() {
			let _ = shutdown_tx.send(());
		}

		self.is_running.store(false, Ordering::SeqCst);

		info!("Outbox service stopped");

		Ok(())
	}
}
