//! Partition cache
//!
//! Rows of partitioned tables (orders by shift, order items by order) are
//! cached per partition. A fresh remote snapshot either replaces a partition
//! or is merged into it.

pub mod reconciler;

pub use reconciler::{PartitionReconciler, ReplaceOutcome};
