//! Operations exposed to the host application

pub mod admin;
pub mod aware;

pub use admin::{Diagnostics, DiagnosticsSnapshot, OutboxAdmin, OutboxDiagnostics};
pub use aware::{AwareWriter, WriteOutcome};
