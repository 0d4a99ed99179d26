//! Outbox wired against mock remotes, a redb store in a temp dir and a fake clock

use super::failing_store::FailingStore;
use super::mock_remote::{MockBlobStore, MockRemote};
use outbox_core::{
	config::RetryConfig,
	domain::{EntityRow, EntityTable, Mutation, MutationId},
	infra::{
		ConnectivityMonitor, FakeTimeSource, MirrorStore, OutboxEventBus, QueueStore, RedbStore,
		StagingStore,
	},
	Outbox, OutboxContext,
};
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;

pub struct OutboxHarness {
	pub dir: TempDir,
	pub remote: Arc<MockRemote>,
	pub blobs: Arc<MockBlobStore>,
	pub connectivity: Arc<ConnectivityMonitor>,
	pub time: Arc<FakeTimeSource>,
	pub outbox: Outbox,
}

impl OutboxHarness {
	pub fn online() -> Self {
		Self::build(true)
	}

	pub fn offline() -> Self {
		Self::build(false)
	}

	/// Outbox over the redb store at `dir/outbox.redb`, which may already hold data
	pub fn in_dir(dir: TempDir, online: bool) -> Self {
		let store = Arc::new(RedbStore::open(dir.path().join("outbox.redb")).expect("open store"));
		Self::assemble(dir, store.clone(), store.clone(), store, online)
	}

	/// Outbox whose local stores fail on demand
	pub fn with_failing_store(online: bool) -> (Self, Arc<FailingStore>) {
		let dir = tempfile::tempdir().expect("temp dir");
		let store = Arc::new(FailingStore::new());
		let harness = Self::assemble(dir, store.clone(), store.clone(), store.clone(), online);
		(harness, store)
	}

	fn build(online: bool) -> Self {
		Self::in_dir(tempfile::tempdir().expect("temp dir"), online)
	}

	fn assemble(
		dir: TempDir,
		mirror: Arc<dyn MirrorStore>,
		queue_store: Arc<dyn QueueStore>,
		staging_store: Arc<dyn StagingStore>,
		online: bool,
	) -> Self {
		let remote = Arc::new(MockRemote::new());
		let blobs = Arc::new(MockBlobStore::new());
		let connectivity = Arc::new(ConnectivityMonitor::new(online));
		let time = Arc::new(FakeTimeSource::default());

		let context = OutboxContext {
			mirror,
			queue_store,
			staging_store,
			remote: remote.clone(),
			blobs: blobs.clone(),
			connectivity: connectivity.clone(),
			time: time.clone(),
			events: OutboxEventBus::new(),
		};

		Self {
			dir,
			remote,
			blobs,
			connectivity,
			time,
			outbox: Outbox::new(context, RetryConfig::default()),
		}
	}

	pub fn pending(&self) -> Vec<Mutation> {
		self.outbox.queue().list_pending().expect("list pending")
	}

	pub fn mutation(&self, id: MutationId) -> Option<Mutation> {
		self.outbox.queue().get(id).expect("get mutation")
	}

	pub fn cached(&self, table: EntityTable, id: &str) -> Option<EntityRow> {
		self.outbox.mirror().get(table, id).expect("mirror get")
	}

	/// Move the clock past any backoff the queue could hold
	pub fn skip_backoff(&self) {
		self.time.advance_secs(241);
	}
}

pub fn shift(id: &str) -> EntityRow {
	EntityRow::new(id).with("status", "open")
}

pub fn order(id: &str, shift_id: &str) -> EntityRow {
	EntityRow::new(id)
		.with("shift_id", shift_id)
		.with("status", "open")
}

pub fn remote_order(id: &str, shift_id: &str, status: &str, created_at: &str) -> Value {
	serde_json::json!({
		"id": id,
		"shift_id": shift_id,
		"status": status,
		"created_at": created_at,
	})
}
