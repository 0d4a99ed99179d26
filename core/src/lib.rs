//! Offline outbox and partition cache
//!
//! Keeps a client usable while it cannot reach its remote system of record.
//! Writes that fail or happen offline are queued durably and replayed once
//! connectivity returns, holding back writes whose parent rows the remote
//! does not have yet. Reads of partitioned tables are served from a local
//! mirror that is reconciled with the remote whenever it answers.

pub mod config;
pub mod domain;
pub mod error;
pub mod infra;
pub mod ops;
pub mod service;

pub use error::{Error, Result};

use config::{OutboxConfig, RetryConfig};
use infra::{
	BlobStore, Connectivity, ConnectivityWatcher, MirrorStore, OutboxEventBus, QueueStore,
	RedbStore, RemoteStore, StagingStore, SystemTimeSource, TimeSource,
};
use ops::{AwareWriter, OutboxAdmin, OutboxDiagnostics};
use service::cache::PartitionReconciler;
use service::outbox::{
	AttachmentStaging, DependencyChecker, MutationQueue, OutboxService, RemoteApplier, SyncEngine,
};
use std::sync::Arc;
use tracing::info;

/// Collaborators the outbox is wired from
#[derive(Clone)]
pub struct OutboxContext {
	pub mirror: Arc<dyn MirrorStore>,
	pub queue_store: Arc<dyn QueueStore>,
	pub staging_store: Arc<dyn StagingStore>,
	pub remote: Arc<dyn RemoteStore>,
	pub blobs: Arc<dyn BlobStore>,
	pub connectivity: Arc<dyn Connectivity>,
	pub time: Arc<dyn TimeSource>,
	pub events: OutboxEventBus,
}

impl OutboxContext {
	/// All three local stores backed by one redb file
	pub fn with_store(
		store: Arc<RedbStore>,
		remote: Arc<dyn RemoteStore>,
		blobs: Arc<dyn BlobStore>,
		connectivity: Arc<dyn Connectivity>,
	) -> Self {
		Self {
			mirror: store.clone(),
			queue_store: store.clone(),
			staging_store: store,
			remote,
			blobs,
			connectivity,
			time: Arc::new(SystemTimeSource),
			events: OutboxEventBus::new(),
		}
	}
}

/// Fully wired outbox
pub struct Outbox {
	context: OutboxContext,
	queue: Arc<MutationQueue>,
	staging: Arc<AttachmentStaging>,
	engine: Arc<SyncEngine>,
	reconciler: Arc<PartitionReconciler>,
	writer: Arc<AwareWriter>,
	admin: Arc<OutboxAdmin>,
}

impl Outbox {
	pub fn new(context: OutboxContext, retry: RetryConfig) -> Self {
		let queue = Arc::new(MutationQueue::new(
			context.queue_store.clone(),
			context.time.clone(),
			context.events.clone(),
		));
		let staging = Arc::new(AttachmentStaging::new(
			context.staging_store.clone(),
			context.time.clone(),
		));
		let applier = Arc::new(RemoteApplier::new(
			context.remote.clone(),
			context.blobs.clone(),
			context.mirror.clone(),
			staging.clone(),
			context.time.clone(),
		));
		let engine = Arc::new(SyncEngine::new(
			queue.clone(),
			DependencyChecker::new(context.remote.clone()),
			applier.clone(),
			context.connectivity.clone(),
			context.time.clone(),
			context.events.clone(),
			retry,
		));
		let reconciler = Arc::new(PartitionReconciler::new(
			context.mirror.clone(),
			context.remote.clone(),
			context.connectivity.clone(),
		));
		let writer = Arc::new(AwareWriter::new(
			applier,
			queue.clone(),
			context.mirror.clone(),
			context.connectivity.clone(),
			context.time.clone(),
		));
		let admin = Arc::new(OutboxAdmin::new(
			queue.clone(),
			staging.clone(),
			context.mirror.clone(),
		));

		Self {
			context,
			queue,
			staging,
			engine,
			reconciler,
			writer,
			admin,
		}
	}

	/// Open the redb store under the configured data directory
	pub fn open(
		config: &OutboxConfig,
		remote: Arc<dyn RemoteStore>,
		blobs: Arc<dyn BlobStore>,
		connectivity: Arc<dyn Connectivity>,
	) -> Result<Self> {
		let store = Arc::new(RedbStore::open(config.store_path())?);
		info!(data_dir = %config.data_dir.display(), "Outbox opened");
		Ok(Self::new(
			OutboxContext::with_store(store, remote, blobs, connectivity),
			config.retry.clone(),
		))
	}

	/// Background drain service; drains on reconnect when `watcher` is given
	pub fn service(&self, config: &OutboxConfig, watcher: Option<ConnectivityWatcher>) -> OutboxService {
		let service = OutboxService::new(
			self.engine.clone(),
			self.queue.clone(),
			self.staging.clone(),
			config.service.clone(),
			config.orphan_grace(),
		)
		.with_diagnostics(Arc::new(self.diagnostics()));

		match watcher {
			Some(watcher) => service.with_watcher(watcher),
			None => service,
		}
	}

	pub fn diagnostics(&self) -> OutboxDiagnostics {
		OutboxDiagnostics::new(
			self.queue.clone(),
			self.staging.clone(),
			self.context.time.clone(),
		)
	}

	pub fn queue(&self) -> &Arc<MutationQueue> {
		&self.queue
	}

	pub fn staging(&self) -> &Arc<AttachmentStaging> {
		&self.staging
	}

	pub fn engine(&self) -> &Arc<SyncEngine> {
		&self.engine
	}

	pub fn reconciler(&self) -> &Arc<PartitionReconciler> {
		&self.reconciler
	}

	pub fn writer(&self) -> &Arc<AwareWriter> {
		&self.writer
	}

	pub fn admin(&self) -> &Arc<OutboxAdmin> {
		&self.admin
	}

	pub fn mirror(&self) -> &Arc<dyn MirrorStore> {
		&self.context.mirror
	}

	pub fn events(&self) -> &OutboxEventBus {
		&self.context.events
	}
}
