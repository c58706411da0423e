//! Per-container busy flag and processing state.
//!
//! Records live in an identity-keyed table owned by the tracker, never on the
//! container itself. Each record exists only from admission until the settle
//! window after completion; [`StateTracker::evict_all`] drops everything when
//! the host document is replaced.

use std::{
	sync::{
		Arc,
		atomic::{AtomicU64, Ordering},
	},
	time::Duration,
};

use dashmap::{DashMap, mapref::entry::Entry};

use crate::{ProcessingState, dom::NodeHandle};

#[derive(Clone, Copy, Debug)]
struct Record {
	busy: bool,
	state: ProcessingState,
	/// Distinguishes attempts on the same container, so a late release from an
	/// evicted attempt cannot clear a newer one
	generation: u64,
}

#[derive(Clone, Debug)]
pub struct StateTracker {
	records: Arc<DashMap<NodeHandle, Record>>,
	generations: Arc<AtomicU64>,
	settle: Duration,
}

impl StateTracker {
	pub fn new(settle: Duration) -> Self {
		Self {
			records: Arc::new(DashMap::new()),
			generations: Arc::new(AtomicU64::new(0)),
			settle,
		}
	}

	/// Start an attempt on `container` unless one is already running or settling.
	pub fn admit(&self, container: NodeHandle) -> Option<Attempt> {
		let generation = self.generations.fetch_add(1, Ordering::Relaxed);
		let record = Record {
			busy: true,
			state: ProcessingState::Pending,
			generation,
		};
		match self.records.entry(container) {
			Entry::Occupied(mut o) => {
				if o.get().busy {
					return None;
				}
				o.insert(record);
			}
			Entry::Vacant(v) => {
				v.insert(record);
			}
		}
		Some(Attempt {
			container,
			generation,
			tracker: self.clone(),
			finished: false,
		})
	}

	pub fn state(&self, container: NodeHandle) -> ProcessingState {
		self.records.get(&container).map(|r| r.state).unwrap_or(ProcessingState::Unset)
	}

	pub fn is_busy(&self, container: NodeHandle) -> bool {
		self.records.get(&container).is_some_and(|r| r.busy)
	}

	/// Forget every record, e.g. after navigation replaced the document
	pub fn evict_all(&self) {
		self.records.clear();
	}

	fn release(&self, container: NodeHandle, generation: u64) {
		self.records.remove_if(&container, |_, r| r.generation == generation);
	}

	fn record_outcome(&self, container: NodeHandle, generation: u64, state: ProcessingState) {
		if let Some(mut r) = self.records.get_mut(&container) {
			if r.generation == generation {
				r.state = state;
			}
		}
	}

	fn release_after_settle(&self, container: NodeHandle, generation: u64) {
		let tracker = self.clone();
		let settle = self.settle;
		match tokio::runtime::Handle::try_current() {
			Ok(handle) => {
				handle.spawn(async move {
					tokio::time::sleep(settle).await;
					tracker.release(container, generation);
				});
			}
			// No runtime left to wait on, nothing can start a new attempt either
			Err(_) => tracker.release(container, generation),
		}
	}
}

/// An admitted attempt. Completing it records the terminal state exactly once;
/// dropping it unfinished records [`ProcessingState::Error`].
#[derive(Debug)]
pub struct Attempt {
	container: NodeHandle,
	generation: u64,
	tracker: StateTracker,
	finished: bool,
}

impl Attempt {
	pub fn container(&self) -> NodeHandle {
		self.container
	}

	/// Record the terminal state; the container stays busy for the settle window.
	pub fn complete(mut self, state: ProcessingState) {
		self.finish(state);
	}

	/// Give the container back immediately without recording anything
	pub fn abandon(mut self) {
		self.finished = true;
		self.tracker.release(self.container, self.generation);
	}

	fn finish(&mut self, state: ProcessingState) {
		self.finished = true;
		tracing::debug!(container = %self.container, ?state, "attempt finished");
		self.tracker.record_outcome(self.container, self.generation, state);
		self.tracker.release_after_settle(self.container, self.generation);
	}
}

impl Drop for Attempt {
	fn drop(&mut self) {
		if !self.finished {
			self.finish(ProcessingState::Error);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const C: NodeHandle = NodeHandle(1);
	const SETTLE: Duration = Duration::from_millis(500);

	#[tokio::test(start_paused = true)]
	async fn second_attempt_is_rejected_while_busy() {
		let tracker = StateTracker::new(SETTLE);
		let attempt = tracker.admit(C).unwrap();
		assert_eq!(tracker.state(C), ProcessingState::Pending);
		assert!(tracker.admit(C).is_none());
		attempt.complete(ProcessingState::Filled);
		assert!(tracker.admit(C).is_none(), "still settling");
	}

	#[tokio::test(start_paused = true)]
	async fn busy_clears_only_after_settle_window() {
		let tracker = StateTracker::new(SETTLE);
		tracker.admit(C).unwrap().complete(ProcessingState::Uncertain);
		assert_eq!(tracker.state(C), ProcessingState::Uncertain);

		tokio::time::sleep(SETTLE - Duration::from_millis(1)).await;
		assert!(tracker.is_busy(C));

		tokio::time::sleep(Duration::from_millis(2)).await;
		assert!(!tracker.is_busy(C));
		assert_eq!(tracker.state(C), ProcessingState::Unset);
		assert!(tracker.admit(C).is_some());
	}

	#[tokio::test(start_paused = true)]
	async fn containers_are_independent() {
		let tracker = StateTracker::new(SETTLE);
		let _a = tracker.admit(NodeHandle(1)).unwrap();
		assert!(tracker.admit(NodeHandle(2)).is_some());
	}

	#[tokio::test(start_paused = true)]
	async fn dropped_attempt_ends_in_error_and_still_releases() {
		let tracker = StateTracker::new(SETTLE);
		drop(tracker.admit(C).unwrap());
		assert_eq!(tracker.state(C), ProcessingState::Error);
		tokio::time::sleep(SETTLE * 2).await;
		assert!(!tracker.is_busy(C));
	}

	#[tokio::test(start_paused = true)]
	async fn abandoned_attempt_releases_immediately() {
		let tracker = StateTracker::new(SETTLE);
		tracker.admit(C).unwrap().abandon();
		assert!(tracker.admit(C).is_some());
	}

	#[tokio::test(start_paused = true)]
	async fn stale_release_does_not_clear_newer_attempt() {
		let tracker = StateTracker::new(SETTLE);
		tracker.admit(C).unwrap().complete(ProcessingState::Filled);
		tracker.evict_all();
		let _fresh = tracker.admit(C).unwrap();
		tokio::time::sleep(SETTLE * 2).await;
		assert!(tracker.is_busy(C));
		assert_eq!(tracker.state(C), ProcessingState::Pending);
	}
}
