use std::collections::VecDeque;

use parking_lot::Mutex;
use rustc_hash::FxHashSet;

use crate::types::{LoadDirection, LoadParams, RequestKey};

/// Why an element entered a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnqueueMechanism {
	/// Caller asked for this page.
	EnqueueRequest,
	/// Continuation key returned by a successful load.
	NetworkLoadResponse,
	/// Eager first load of the pager.
	InitialLoad,
}

impl EnqueueMechanism {
	/// Explicit elements are drained without consulting the fetching strategy.
	pub const fn is_explicit(self) -> bool {
		!matches!(self, Self::NetworkLoadResponse)
	}

	pub const fn as_str(self) -> &'static str {
		match self {
			Self::EnqueueRequest => "enqueue_request",
			Self::NetworkLoadResponse => "network_load_response",
			Self::InitialLoad => "initial_load",
		}
	}
}

/// One queued page request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueElement<K> {
	pub params: LoadParams<K>,
	pub mechanism: EnqueueMechanism,
}

impl<K> QueueElement<K> {
	pub const fn new(params: LoadParams<K>, mechanism: EnqueueMechanism) -> Self {
		Self { params, mechanism }
	}
}

/// Outcome of adding an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
	Enqueued,
	/// A queued continuation with the same key became explicit.
	Upgraded,
	AlreadyQueued,
	AlreadyProcessed,
}

impl EnqueueOutcome {
	/// Whether the queue changed.
	pub const fn is_accepted(self) -> bool {
		matches!(self, Self::Enqueued | Self::Upgraded)
	}
}

struct QueueState<K> {
	queue: VecDeque<QueueElement<K>>,
	processed: FxHashSet<LoadParams<K>>,
}

/// Ordered, de-duplicating queue of page requests for one direction.
///
/// A key is queued at most once. Params that already loaded successfully are
/// remembered and rejected until [`LoadParamsQueue::reset`]. No operation fails;
/// duplicates are absorbed and reported through [`EnqueueOutcome`].
pub struct LoadParamsQueue<K> {
	direction: LoadDirection,
	state: Mutex<QueueState<K>>,
}

impl<K: RequestKey> LoadParamsQueue<K> {
	pub fn new(direction: LoadDirection) -> Self {
		Self {
			direction,
			state: Mutex::new(QueueState {
				queue: VecDeque::new(),
				processed: FxHashSet::default(),
			}),
		}
	}

	pub fn direction(&self) -> LoadDirection {
		self.direction
	}

	pub fn add_last(&self, element: QueueElement<K>) -> EnqueueOutcome {
		let mut state = self.state.lock();
		absorb_duplicate(&mut state, &element).unwrap_or_else(|| {
			state.queue.push_back(element);
			EnqueueOutcome::Enqueued
		})
	}

	pub fn add_first(&self, element: QueueElement<K>) -> EnqueueOutcome {
		let mut state = self.state.lock();
		absorb_duplicate(&mut state, &element).unwrap_or_else(|| {
			state.queue.push_front(element);
			EnqueueOutcome::Enqueued
		})
	}

	pub fn remove_first(&self) -> Option<QueueElement<K>> {
		self.state.lock().queue.pop_front()
	}

	pub fn remove_first_matching(&self, predicate: impl Fn(&QueueElement<K>) -> bool) -> Option<QueueElement<K>> {
		let mut state = self.state.lock();
		let index = state.queue.iter().position(predicate)?;
		state.queue.remove(index)
	}

	pub fn remove_last(&self) -> Option<QueueElement<K>> {
		self.state.lock().queue.pop_back()
	}

	pub fn remove_last_matching(&self, predicate: impl Fn(&QueueElement<K>) -> bool) -> Option<QueueElement<K>> {
		let mut state = self.state.lock();
		let index = state.queue.iter().rposition(predicate)?;
		state.queue.remove(index)
	}

	/// Pops the head while an explicit element is queued at or behind it.
	pub fn next_explicit(&self) -> Option<QueueElement<K>> {
		let mut state = self.state.lock();
		if state.queue.iter().any(|e| e.mechanism.is_explicit()) {
			state.queue.pop_front()
		} else {
			None
		}
	}

	/// Skips ahead to `element`.
	///
	/// Drops every element whose key lies before the target in this queue's
	/// direction, along with any element sharing the target key, then puts the
	/// target at the head. Returns how many elements were dropped.
	pub fn jump(&self, element: QueueElement<K>) -> usize {
		let direction = self.direction;
		let mut state = self.state.lock();
		if state.processed.contains(&element.params) {
			return 0;
		}
		let target = element.params.key.clone();
		let before = state.queue.len();
		state.queue.retain(|queued| {
			let behind = match direction {
				LoadDirection::Append => queued.params.key < target,
				LoadDirection::Prepend => queued.params.key > target,
			};
			!behind && queued.params.key != target
		});
		let dropped = before - state.queue.len();
		state.queue.push_front(element);
		dropped
	}

	/// Moves `element` to the head, replacing any queued element with the same key.
	pub fn promote(&self, element: QueueElement<K>) -> EnqueueOutcome {
		let mut state = self.state.lock();
		if state.processed.contains(&element.params) {
			return EnqueueOutcome::AlreadyProcessed;
		}
		let existed = match state.queue.iter().position(|e| e.params.key == element.params.key) {
			Some(index) => state.queue.remove(index).is_some(),
			None => false,
		};
		state.queue.push_front(element);
		if existed { EnqueueOutcome::Upgraded } else { EnqueueOutcome::Enqueued }
	}

	pub fn mark_processed(&self, params: LoadParams<K>) {
		self.state.lock().processed.insert(params);
	}

	/// Allows `params` to be queued again. Returns whether it was processed.
	pub fn forget_processed(&self, params: &LoadParams<K>) -> bool {
		self.state.lock().processed.remove(params)
	}

	pub fn is_processed(&self, params: &LoadParams<K>) -> bool {
		self.state.lock().processed.contains(params)
	}

	pub fn contains_key(&self, key: &K) -> bool {
		self.state.lock().queue.iter().any(|e| &e.params.key == key)
	}

	pub fn contains_explicit(&self) -> bool {
		self.state.lock().queue.iter().any(|e| e.mechanism.is_explicit())
	}

	pub fn peek_first(&self) -> Option<QueueElement<K>> {
		self.state.lock().queue.front().cloned()
	}

	pub fn snapshot(&self) -> Vec<QueueElement<K>> {
		self.state.lock().queue.iter().cloned().collect()
	}

	/// Keeps only the elements accepted by `keep`. Returns how many were dropped.
	pub fn retain(&self, keep: impl Fn(&QueueElement<K>) -> bool) -> usize {
		let mut state = self.state.lock();
		let before = state.queue.len();
		state.queue.retain(|element| keep(element));
		before - state.queue.len()
	}

	/// Drops queued elements; processed params are kept.
	pub fn clear(&self) {
		self.state.lock().queue.clear();
	}

	/// Drops queued elements and forgets processed params.
	pub fn reset(&self) {
		let mut state = self.state.lock();
		state.queue.clear();
		state.processed.clear();
	}

	pub fn size(&self) -> usize {
		self.state.lock().queue.len()
	}

	pub fn is_empty(&self) -> bool {
		self.state.lock().queue.is_empty()
	}

	pub fn is_not_empty(&self) -> bool {
		!self.is_empty()
	}
}

fn absorb_duplicate<K: RequestKey>(state: &mut QueueState<K>, element: &QueueElement<K>) -> Option<EnqueueOutcome> {
	if state.processed.contains(&element.params) {
		return Some(EnqueueOutcome::AlreadyProcessed);
	}
	let queued = state.queue.iter_mut().find(|e| e.params.key == element.params.key)?;
	if element.mechanism.is_explicit() && !queued.mechanism.is_explicit() {
		*queued = element.clone();
		return Some(EnqueueOutcome::Upgraded);
	}
	Some(EnqueueOutcome::AlreadyQueued)
}

#[cfg(test)]
mod tests {
	use proptest::prelude::*;

	use super::*;

	fn continuation(key: u32) -> QueueElement<u32> {
		QueueElement::new(LoadParams::append(key), EnqueueMechanism::NetworkLoadResponse)
	}

	fn request(key: u32) -> QueueElement<u32> {
		QueueElement::new(LoadParams::append(key), EnqueueMechanism::EnqueueRequest)
	}

	fn keys(queue: &LoadParamsQueue<u32>) -> Vec<u32> {
		queue.snapshot().into_iter().map(|e| e.params.key).collect()
	}

	#[test]
	fn forgotten_params_can_be_queued_again() {
		let queue = LoadParamsQueue::new(LoadDirection::Append);
		queue.mark_processed(LoadParams::append(2));
		assert!(queue.forget_processed(&LoadParams::append(2)));
		assert!(!queue.forget_processed(&LoadParams::append(2)));
		assert_eq!(queue.add_last(continuation(2)), EnqueueOutcome::Enqueued);
	}

	#[test]
	fn retain_drops_rejected_elements() {
		let queue = LoadParamsQueue::new(LoadDirection::Append);
		queue.add_last(continuation(1));
		queue.add_last(request(2));
		queue.add_last(continuation(3));
		assert_eq!(queue.retain(|e| e.mechanism.is_explicit()), 2);
		assert_eq!(keys(&queue), vec![2]);
	}

	#[test]
	fn duplicates_are_absorbed() {
		let queue = LoadParamsQueue::new(LoadDirection::Append);
		assert_eq!(queue.add_last(continuation(1)), EnqueueOutcome::Enqueued);
		assert_eq!(queue.add_last(continuation(1)), EnqueueOutcome::AlreadyQueued);
		assert_eq!(queue.add_first(continuation(1)), EnqueueOutcome::AlreadyQueued);
		assert_eq!(queue.size(), 1);

		queue.mark_processed(LoadParams::append(2));
		assert_eq!(queue.add_last(continuation(2)), EnqueueOutcome::AlreadyProcessed);
		assert_eq!(queue.size(), 1);
	}

	#[test]
	fn explicit_request_upgrades_queued_continuation() {
		let queue = LoadParamsQueue::new(LoadDirection::Append);
		queue.add_last(continuation(1));
		assert!(!queue.contains_explicit());
		assert_eq!(queue.add_last(request(1)), EnqueueOutcome::Upgraded);
		assert!(queue.contains_explicit());
		assert_eq!(queue.size(), 1);
	}

	#[test]
	fn next_explicit_drains_through_last_explicit() {
		let queue = LoadParamsQueue::new(LoadDirection::Append);
		queue.add_last(continuation(1));
		queue.add_last(request(2));
		queue.add_last(continuation(3));

		assert_eq!(queue.next_explicit().map(|e| e.params.key), Some(1));
		assert_eq!(queue.next_explicit().map(|e| e.params.key), Some(2));
		assert_eq!(queue.next_explicit(), None);
		assert_eq!(keys(&queue), vec![3]);
	}

	#[test]
	fn remove_by_predicate_from_either_end() {
		let queue = LoadParamsQueue::new(LoadDirection::Append);
		for key in [1, 2, 3, 4] {
			queue.add_last(continuation(key));
		}
		assert_eq!(queue.remove_first_matching(|e| e.params.key % 2 == 0).map(|e| e.params.key), Some(2));
		assert_eq!(queue.remove_last_matching(|e| e.params.key < 4).map(|e| e.params.key), Some(3));
		assert_eq!(queue.remove_last().map(|e| e.params.key), Some(4));
		assert_eq!(queue.remove_first().map(|e| e.params.key), Some(1));
		assert!(queue.is_empty());
	}

	#[test]
	fn append_jump_drops_lower_keys() {
		let queue = LoadParamsQueue::new(LoadDirection::Append);
		for key in [1, 2, 5, 8] {
			queue.add_last(continuation(key));
		}
		assert_eq!(queue.jump(request(5)), 3);
		assert_eq!(keys(&queue), vec![5, 8]);
		assert!(queue.peek_first().is_some_and(|e| e.mechanism.is_explicit()));
	}

	#[test]
	fn prepend_jump_drops_higher_keys() {
		let queue = LoadParamsQueue::new(LoadDirection::Prepend);
		for key in [9u32, 7, 4, 2] {
			queue.add_last(QueueElement::new(LoadParams::prepend(key), EnqueueMechanism::NetworkLoadResponse));
		}
		let dropped = queue.jump(QueueElement::new(LoadParams::prepend(4), EnqueueMechanism::EnqueueRequest));
		assert_eq!(dropped, 3);
		assert_eq!(keys(&queue), vec![4, 2]);
	}

	#[test]
	fn promote_moves_key_to_head() {
		let queue = LoadParamsQueue::new(LoadDirection::Append);
		queue.add_last(continuation(1));
		queue.add_last(continuation(2));
		assert_eq!(queue.promote(request(2)), EnqueueOutcome::Upgraded);
		assert_eq!(keys(&queue), vec![2, 1]);
		assert_eq!(queue.promote(request(3)), EnqueueOutcome::Enqueued);
		assert_eq!(keys(&queue), vec![3, 2, 1]);
	}

	#[test]
	fn reset_forgets_processed_params() {
		let queue = LoadParamsQueue::new(LoadDirection::Append);
		queue.add_last(continuation(1));
		queue.mark_processed(LoadParams::append(3));
		queue.clear();
		assert!(queue.is_empty());
		assert!(queue.is_processed(&LoadParams::append(3)));
		queue.reset();
		assert!(!queue.is_processed(&LoadParams::append(3)));
	}

	proptest! {
		#[test]
		fn re_enqueue_never_grows_queue(keys in proptest::collection::vec(0u32..16, 1..48)) {
			let queue = LoadParamsQueue::new(LoadDirection::Append);
			for key in &keys {
				queue.add_last(continuation(*key));
			}
			let size = queue.size();
			let distinct: FxHashSet<u32> = keys.iter().copied().collect();
			prop_assert_eq!(size, distinct.len());
			for key in &keys {
				queue.add_last(continuation(*key));
				queue.add_first(request(*key));
				prop_assert_eq!(queue.size(), size);
			}
		}
	}
}
