//! Domain models for the offline outbox
//!
//! - `EntityRow` is the denormalized copy of a remote record kept in the mirror store
//! - `Mutation` is one unit of deferred work waiting in the outbox

pub mod entity;
pub mod mutation;

pub use entity::{EntityKey, EntityRow, EntityTable, ParentRef};
pub use mutation::{Mutation, MutationId, MutationPayload, MutationType};
