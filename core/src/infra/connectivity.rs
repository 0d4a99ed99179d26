//! Connectivity signal
//!
//! `Connectivity` is the level query the engine gates on. `ConnectivityMonitor`
//! is the host-driven implementation that also exposes the
//! "connectivity regained" edge the background service drains on.

use tokio::sync::watch;
use tracing::info;

pub trait Connectivity: Send + Sync {
	fn is_online(&self) -> bool;
}

/// Host-driven connectivity state
#[derive(Debug)]
pub struct ConnectivityMonitor {
	state: watch::Sender<bool>,
}

impl ConnectivityMonitor {
	pub fn new(online: bool) -> Self {
		let (state, _) = watch::channel(online);
		Self { state }
	}

	/// Record the current connectivity
	///
	/// Returns `true` when this call is an offline -> online transition.
	pub fn set_online(&self, online: bool) -> bool {
		let changed = self.state.send_if_modified(|current| {
			if *current == online {
				false
			} else {
				*current = online;
				true
			}
		});

		if changed {
			info!(online, "Connectivity changed");
		}

		changed && online
	}

	pub fn subscribe(&self) -> ConnectivityWatcher {
		ConnectivityWatcher {
			rx: self.state.subscribe(),
		}
	}
}

impl Connectivity for ConnectivityMonitor {
	fn is_online(&self) -> bool {
		*self.state.borrow()
	}
}

/// Receiver side of the connectivity-regained edge
#[derive(Debug, Clone)]
pub struct ConnectivityWatcher {
	rx: watch::Receiver<bool>,
}

impl ConnectivityWatcher {
	/// Wait for the next transition to online
	///
	/// Returns `false` once the monitor has been dropped and no further edges
	/// can arrive.
	pub async fn regained(&mut self) -> bool {
		loop {
			if self.rx.changed().await.is_err() {
				return false;
			}
			if *self.rx.borrow_and_update() {
				return true;
			}
		}
	}
}
