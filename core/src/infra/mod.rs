//! Infrastructure layer
//!
//! Everything the outbox talks to but does not own: local storage, the remote
//! system of record, connectivity, time, logging and the event bus.

pub mod connectivity;
pub mod event_bus;
pub mod logging;
pub mod remote;
pub mod store;
pub mod time_source;

pub use connectivity::{Connectivity, ConnectivityMonitor, ConnectivityWatcher};
pub use event_bus::{OutboxEvent, OutboxEventBus};
pub use remote::{BlobStore, Filter, RemoteError, RemoteStore, UploadedBlob};
pub use store::{MemoryStore, MirrorStore, QueueStore, RedbStore, StagingStore, StoreError};
pub use time_source::{FakeTimeSource, SystemTimeSource, TimeSource};
