//! Outbox drain
//!
//! A drain pass applies eligible mutations strictly one after another, oldest
//! first. Each mutation ends the pass in exactly one state:
//!
//! - applied: confirmed remotely, written to the mirror and dequeued
//! - deferred: a parent is missing remotely; `attempts` grows and the record
//!   waits out an exponential backoff
//! - discarded: deferred too many times; dropped and reported
//! - failed: any other failure, remote or local; retried next pass
//!
//! A failure never stops the pass. Only reading the batch itself can fail a
//! drain.

use super::applier::RemoteApplier;
use super::dependency::DependencyChecker;
use super::queue::MutationQueue;
use super::registry;
use crate::config::RetryConfig;
use crate::domain::{Mutation, MutationId, ParentRef};
use crate::error::{Error, Result};
use crate::infra::{Connectivity, OutboxEvent, OutboxEventBus, TimeSource};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Counters for one drain pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
	pub processed: usize,
	pub errors: usize,
	pub deferred: usize,
	pub discarded: usize,
	/// Another drain was already running; nothing was done
	pub skipped: bool,
}

impl DrainReport {
	fn skipped() -> Self {
		Self {
			skipped: true,
			..Default::default()
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DrainOutcome {
	Applied,
	Deferred,
	Discarded,
	Failed,
}

pub struct SyncEngine {
	queue: Arc<MutationQueue>,
	checker: DependencyChecker,
	applier: Arc<RemoteApplier>,
	connectivity: Arc<dyn Connectivity>,
	time: Arc<dyn TimeSource>,
	events: OutboxEventBus,
	retry: RetryConfig,
	in_flight: Mutex<()>,
}

impl SyncEngine {
	pub fn new(
		queue: Arc<MutationQueue>,
		checker: DependencyChecker,
		applier: Arc<RemoteApplier>,
		connectivity: Arc<dyn Connectivity>,
		time: Arc<dyn TimeSource>,
		events: OutboxEventBus,
		retry: RetryConfig,
	) -> Self {
		Self {
			queue,
			checker,
			applier,
			connectivity,
			time,
			events,
			retry,
			in_flight: Mutex::new(()),
		}
	}

	/// Run one drain pass
	///
	/// Offline returns an empty report without touching the queue. A call
	/// overlapping a running pass returns a report flagged `skipped`.
	pub async fn drain(&self) -> Result<DrainReport> {
		if !self.connectivity.is_online() {
			debug!("Offline, not draining outbox");
			return Ok(DrainReport::default());
		}

		let Ok(_guard) = self.in_flight.try_lock() else {
			debug!("Drain already in progress");
			return Ok(DrainReport::skipped());
		};

		let batch = self.queue.eligible(self.time.now())?;
		let mut report = DrainReport::default();

		if !batch.is_empty() {
			info!(eligible = batch.len(), "Draining outbox");
		}

		for mutation in batch {
			let mutation_id = mutation.id;
			let outcome = match self.process(mutation).await {
				Ok(outcome) => outcome,
				Err(e) => {
					warn!(%mutation_id, error = %e, "Mutation failed locally, will retry");
					self.record_failure(mutation_id, &e);
					DrainOutcome::Failed
				}
			};

			match outcome {
				DrainOutcome::Applied => report.processed += 1,
				DrainOutcome::Deferred => report.deferred += 1,
				DrainOutcome::Discarded => report.discarded += 1,
				DrainOutcome::Failed => report.errors += 1,
			}
		}

		if report.processed + report.errors + report.deferred + report.discarded > 0 {
			info!(
				processed = report.processed,
				errors = report.errors,
				deferred = report.deferred,
				discarded = report.discarded,
				"Outbox drain completed"
			);
		}
		self.events.emit(OutboxEvent::DrainCompleted {
			processed: report.processed,
			errors: report.errors,
			deferred: report.deferred,
			discarded: report.discarded,
		});

		Ok(report)
	}

	async fn process(&self, mut mutation: Mutation) -> Result<DrainOutcome> {
		let handler = registry::handler(mutation.mutation_type());

		let parents = handler.parent_refs(&mutation.payload);
		if !parents.is_empty() && !self.checker.exists(&parents).await {
			return self.defer(mutation, missing_parents(&parents));
		}

		match self.apply(&mut mutation).await {
			Ok(()) => {
				self.queue.dequeue(mutation.id)?;
				debug!(
					mutation_id = %mutation.id,
					mutation_type = %handler.mutation_type,
					"Mutation applied"
				);
				self.events.emit(OutboxEvent::MutationApplied {
					mutation_id: mutation.id,
					mutation_type: handler.mutation_type.to_string(),
				});
				Ok(DrainOutcome::Applied)
			}
			Err(Error::Remote(e)) if e.is_foreign_key_violation() => {
				self.defer(mutation, e.to_string())
			}
			Err(Error::Remote(e)) => {
				warn!(
					mutation_id = %mutation.id,
					mutation_type = %handler.mutation_type,
					error = %e,
					"Remote write failed, will retry"
				);
				mutation.last_error = Some(e.to_string());
				self.queue.update(&mutation)?;
				Ok(DrainOutcome::Failed)
			}
			Err(e) => Err(e),
		}
	}

	/// Best effort; the store that just failed may refuse this too
	fn record_failure(&self, mutation_id: MutationId, error: &Error) {
		let result = self.queue.get(mutation_id).and_then(|mutation| match mutation {
			Some(mut mutation) => {
				mutation.last_error = Some(error.to_string());
				self.queue.update(&mutation)
			}
			None => Ok(false),
		});
		if let Err(e) = result {
			warn!(%mutation_id, error = %e, "Could not record mutation failure");
		}
	}

	async fn apply(&self, mutation: &mut Mutation) -> Result<()> {
		let uploaded = self
			.applier
			.resolve_attachments(&mut mutation.payload)
			.await?;
		if !uploaded.is_empty() {
			// Keep the durable references before dropping the staged bytes
			self.queue.update(mutation)?;
			self.applier.release(&uploaded)?;
		}

		self.applier.write(&mutation.payload).await?;
		Ok(())
	}

	fn defer(&self, mut mutation: Mutation, reason: String) -> Result<DrainOutcome> {
		mutation.attempts += 1;
		mutation.last_error = Some(reason);

		if mutation.attempts >= self.retry.max_dependency_attempts {
			self.discard(mutation)?;
			return Ok(DrainOutcome::Discarded);
		}

		let delay = chrono::Duration::from_std(self.retry.backoff_for(mutation.attempts))
			.unwrap_or_else(|_| chrono::Duration::zero());
		let next_attempt = self.time.now() + delay;
		mutation.next_attempt = Some(next_attempt);
		self.queue.update(&mutation)?;

		debug!(
			mutation_id = %mutation.id,
			attempts = mutation.attempts,
			%next_attempt,
			"Mutation deferred on missing parent"
		);
		self.events.emit(OutboxEvent::MutationDeferred {
			mutation_id: mutation.id,
			attempts: mutation.attempts,
			next_attempt,
		});

		Ok(DrainOutcome::Deferred)
	}

	fn discard(&self, mutation: Mutation) -> Result<()> {
		self.queue.dequeue(mutation.id)?;
		self.applier
			.release(&registry::staged_keys(&mutation.payload))?;

		let mutation_type = mutation.mutation_type();
		warn!(
			mutation_id = %mutation.id,
			mutation_type = %mutation_type,
			entity_id = mutation.payload.entity_id(),
			attempts = mutation.attempts,
			last_error = mutation.last_error.as_deref().unwrap_or_default(),
			"Discarding mutation after repeated missing-parent failures"
		);
		self.events.emit(OutboxEvent::MutationDiscarded {
			mutation_id: mutation.id,
			mutation_type: mutation_type.to_string(),
			entity_id: mutation.payload.entity_id().to_string(),
			attempts: mutation.attempts,
			last_error: mutation.last_error,
		});

		Ok(())
	}
}

fn missing_parents(parents: &[ParentRef]) -> String {
	let refs: Vec<_> = parents.iter().map(ToString::to_string).collect();
	format!("parent not found: {}", refs.join(", "))
}
