//! Test helper modules for integration tests
#![allow(dead_code)]

pub mod failing_store;
pub mod mock_remote;
pub mod outbox_harness;

pub use failing_store::*;
pub use mock_remote::*;
pub use outbox_harness::*;
