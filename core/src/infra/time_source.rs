//! Clock used for enqueue stamps, backoff deadlines and the orphan sweep

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use std::sync::Arc;

pub trait TimeSource: Send + Sync {
	fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
	fn now(&self) -> DateTime<Utc> {
		Utc::now()
	}
}

/// Manually advanced clock
///
/// Clones share one clock, so a test hands a copy to the outbox and keeps
/// another to move past backoff windows without sleeping.
///
/// ```rust
/// use outbox_core::infra::{FakeTimeSource, TimeSource};
///
/// let time = FakeTimeSource::default();
/// let start = time.now();
/// time.advance_secs(15);
/// assert_eq!((time.now() - start).num_seconds(), 15);
/// ```
#[derive(Debug, Clone)]
pub struct FakeTimeSource {
	now: Arc<RwLock<DateTime<Utc>>>,
}

impl FakeTimeSource {
	pub fn at(now: DateTime<Utc>) -> Self {
		Self {
			now: Arc::new(RwLock::new(now)),
		}
	}

	pub fn advance_secs(&self, secs: i64) {
		*self.now.write() += Duration::seconds(secs);
	}
}

impl Default for FakeTimeSource {
	/// 2023-11-14T22:13:20Z
	fn default() -> Self {
		Self::at(DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap_or_default())
	}
}

impl TimeSource for FakeTimeSource {
	fn now(&self) -> DateTime<Utc> {
		*self.now.read()
	}
}
