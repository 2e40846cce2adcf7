//! Per-direction request queues and the pending-job registry.
//!
//! The registry is shared by both directions, so a request key is never loaded
//! twice concurrently even when it is queued on both sides.

mod params_queue;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

pub use self::params_queue::{EnqueueMechanism, EnqueueOutcome, LoadParamsQueue, QueueElement};
use crate::types::{LoadDirection, RequestKey};

/// Registry entry for one request key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PendingJob {
	pub in_flight: bool,
	pub completed: bool,
}

/// Append and prepend queues plus the pending-job registry.
pub struct QueueManager<K> {
	append: LoadParamsQueue<K>,
	prepend: LoadParamsQueue<K>,
	pending: Mutex<FxHashMap<K, PendingJob>>,
}

impl<K: RequestKey> Default for QueueManager<K> {
	fn default() -> Self {
		Self::new()
	}
}

impl<K: RequestKey> QueueManager<K> {
	pub fn new() -> Self {
		Self {
			append: LoadParamsQueue::new(LoadDirection::Append),
			prepend: LoadParamsQueue::new(LoadDirection::Prepend),
			pending: Mutex::new(FxHashMap::default()),
		}
	}

	pub fn queue(&self, direction: LoadDirection) -> &LoadParamsQueue<K> {
		match direction {
			LoadDirection::Append => &self.append,
			LoadDirection::Prepend => &self.prepend,
		}
	}

	pub fn append_queue(&self) -> &LoadParamsQueue<K> {
		&self.append
	}

	pub fn prepend_queue(&self) -> &LoadParamsQueue<K> {
		&self.prepend
	}

	/// Registers a job for `key`. Returns `false` if one is already in flight.
	///
	/// Finished jobs stay visible until the next job is registered, then are pruned.
	pub fn add_pending_job(&self, key: K, in_flight: bool) -> bool {
		let mut pending = self.pending.lock();
		if pending.get(&key).is_some_and(|job| job.in_flight) {
			return false;
		}
		pending.retain(|_, job| job.in_flight);
		pending.insert(key, PendingJob { in_flight, completed: false });
		true
	}

	/// Number of registry entries, finished ones included.
	pub fn pending_len(&self) -> usize {
		self.pending.lock().len()
	}

	/// Updates a registered job. Unknown keys are ignored.
	pub fn update_existing_job(&self, key: &K, in_flight: bool, completed: bool) -> bool {
		match self.pending.lock().get_mut(key) {
			Some(job) => {
				*job = PendingJob { in_flight, completed };
				true
			}
			None => false,
		}
	}

	pub fn pending_job(&self, key: &K) -> Option<PendingJob> {
		self.pending.lock().get(key).copied()
	}

	/// Whether any registered job is still in flight.
	pub fn has_pending_jobs(&self) -> bool {
		self.pending.lock().values().any(|job| job.in_flight)
	}

	pub fn clear_pending_jobs(&self) {
		self.pending.lock().clear();
	}

	/// Resets both queues and the registry.
	pub fn clear(&self) {
		self.append.reset();
		self.prepend.reset();
		self.clear_pending_jobs();
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::types::LoadParams;

	#[test]
	fn at_most_one_in_flight_job_per_key() {
		let queues = QueueManager::<u32>::new();
		assert!(queues.add_pending_job(1, true));
		assert!(!queues.add_pending_job(1, true));
		assert!(queues.has_pending_jobs());

		assert!(queues.update_existing_job(&1, false, true));
		assert!(!queues.has_pending_jobs());
		assert_eq!(queues.pending_job(&1), Some(PendingJob { in_flight: false, completed: true }));
		assert!(queues.add_pending_job(1, true));
	}

	#[test]
	fn finished_jobs_are_pruned_on_next_registration() {
		let queues = QueueManager::<u32>::new();
		for key in 0..50 {
			assert!(queues.add_pending_job(key, true));
			queues.update_existing_job(&key, false, true);
		}
		assert_eq!(queues.pending_len(), 1);
		assert_eq!(queues.pending_job(&49), Some(PendingJob { in_flight: false, completed: true }));

		assert!(queues.add_pending_job(100, true));
		assert!(queues.add_pending_job(101, true));
		assert_eq!(queues.pending_len(), 2, "in-flight jobs are kept");
		assert_eq!(queues.pending_job(&49), None);
	}

	#[test]
	fn update_of_unknown_job_is_noop() {
		let queues = QueueManager::<u32>::new();
		assert!(!queues.update_existing_job(&7, false, true));
		assert_eq!(queues.pending_job(&7), None);
	}

	#[test]
	fn clear_resets_everything() {
		let queues = QueueManager::<u32>::new();
		queues
			.queue(LoadDirection::Append)
			.add_last(QueueElement::new(LoadParams::append(1), EnqueueMechanism::EnqueueRequest));
		queues.prepend_queue().mark_processed(LoadParams::prepend(0));
		queues.add_pending_job(1, true);

		queues.clear();
		assert!(queues.append_queue().is_empty());
		assert!(!queues.prepend_queue().is_processed(&LoadParams::prepend(0)));
		assert!(!queues.has_pending_jobs());
	}
}
