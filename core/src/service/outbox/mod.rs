//! Offline outbox
//!
//! Writes that could not reach the remote are queued here and replayed by the
//! `SyncEngine` once connectivity returns. Mutations referencing a parent row
//! are held back until the remote has that parent.

pub mod applier;
pub mod dependency;
pub mod engine;
pub mod queue;
pub mod registry;
pub mod service;
pub mod staging;

pub use applier::RemoteApplier;
pub use dependency::DependencyChecker;
pub use engine::{DrainReport, SyncEngine};
pub use queue::MutationQueue;
pub use registry::{handler, MutationHandler, ParentField, RemoteOperation};
pub use service::OutboxService;
pub use staging::{AttachmentStaging, StagedAttachmentRef};
