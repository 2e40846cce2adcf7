use tokio::sync::watch;

use crate::types::{Identifier, LoadDirection, RequestKey};

/// Extrema of accessed ids, requested keys and loaded ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchingState<Id, K> {
	pub min_item_accessed_so_far: Option<Id>,
	pub max_item_accessed_so_far: Option<Id>,
	pub min_request_so_far: Option<K>,
	pub max_request_so_far: Option<K>,
	pub min_item_loaded_so_far: Option<Id>,
	pub max_item_loaded_so_far: Option<Id>,
	/// Accessed id that last triggered a backward prefetch.
	pub current_backward_prefetch_offset: Option<Id>,
	/// Accessed id that last triggered a forward prefetch.
	pub current_forward_prefetch_offset: Option<Id>,
}

impl<Id, K> Default for FetchingState<Id, K> {
	fn default() -> Self {
		Self {
			min_item_accessed_so_far: None,
			max_item_accessed_so_far: None,
			min_request_so_far: None,
			max_request_so_far: None,
			min_item_loaded_so_far: None,
			max_item_loaded_so_far: None,
			current_backward_prefetch_offset: None,
			current_forward_prefetch_offset: None,
		}
	}
}

impl<Id: Clone, K> FetchingState<Id, K> {
	/// `(min, max)` accessed ids; a change here re-evaluates the fetching strategy.
	pub fn accessed(&self) -> (Option<Id>, Option<Id>) {
		(self.min_item_accessed_so_far.clone(), self.max_item_accessed_so_far.clone())
	}
}

/// Observable holder of [`FetchingState`].
///
/// Writers are serialized by the underlying `watch` channel; readers take a
/// cloned snapshot. Extremum updates are monotonic: a `max` only rises and a
/// `min` only falls. Observers are notified only when a value actually changes.
#[derive(Debug)]
pub struct FetchingStateHolder<Id, K> {
	state: watch::Sender<FetchingState<Id, K>>,
}

impl<Id: Identifier, K: RequestKey> Default for FetchingStateHolder<Id, K> {
	fn default() -> Self {
		Self::new(FetchingState::default())
	}
}

impl<Id: Identifier, K: RequestKey> FetchingStateHolder<Id, K> {
	pub fn new(initial: FetchingState<Id, K>) -> Self {
		let (state, _) = watch::channel(initial);
		Self { state }
	}

	pub fn state(&self) -> FetchingState<Id, K> {
		self.state.borrow().clone()
	}

	pub fn subscribe(&self) -> watch::Receiver<FetchingState<Id, K>> {
		self.state.subscribe()
	}

	/// Applies `reducer`, which returns whether it changed anything.
	pub fn update(&self, reducer: impl FnOnce(&mut FetchingState<Id, K>) -> bool) -> bool {
		self.state.send_if_modified(reducer)
	}

	pub fn update_max_item_accessed_so_far(&self, id: Id) -> bool {
		self.update(|s| raise(&mut s.max_item_accessed_so_far, id))
	}

	pub fn update_min_item_accessed_so_far(&self, id: Id) -> bool {
		self.update(|s| lower(&mut s.min_item_accessed_so_far, id))
	}

	/// Records an access at `id`, widening both accessed extrema as needed.
	pub fn record_access(&self, id: Id) -> bool {
		self.update(|s| {
			let lowered = lower(&mut s.min_item_accessed_so_far, id.clone());
			let raised = raise(&mut s.max_item_accessed_so_far, id);
			lowered | raised
		})
	}

	pub fn update_max_request_so_far(&self, key: K) -> bool {
		self.update(|s| raise(&mut s.max_request_so_far, key))
	}

	pub fn update_min_request_so_far(&self, key: K) -> bool {
		self.update(|s| lower(&mut s.min_request_so_far, key))
	}

	pub fn update_request_extrema(&self, key: &K) -> bool {
		self.update(|s| {
			let lowered = lower(&mut s.min_request_so_far, key.clone());
			let raised = raise(&mut s.max_request_so_far, key.clone());
			lowered | raised
		})
	}

	pub fn update_max_item_loaded_so_far(&self, id: Id) -> bool {
		self.update(|s| raise(&mut s.max_item_loaded_so_far, id))
	}

	pub fn update_min_item_loaded_so_far(&self, id: Id) -> bool {
		self.update(|s| lower(&mut s.min_item_loaded_so_far, id))
	}

	/// Widens the loaded extrema to cover `ids`.
	pub fn update_loaded_extrema(&self, ids: &[Id]) -> bool {
		let (Some(min), Some(max)) = (ids.iter().min(), ids.iter().max()) else {
			return false;
		};
		self.update(|s| {
			let lowered = lower(&mut s.min_item_loaded_so_far, min.clone());
			let raised = raise(&mut s.max_item_loaded_so_far, max.clone());
			lowered | raised
		})
	}

	/// Replaces the loaded extrema with those of `ids` after the window shrank
	/// at `trimmed`, and forgets that edge's prefetch offset.
	pub fn rebase_loaded_extrema(&self, ids: &[Id], trimmed: LoadDirection) -> bool {
		let min = ids.iter().min().cloned();
		let max = ids.iter().max().cloned();
		self.update(|s| {
			let offset = match trimmed {
				LoadDirection::Append => &mut s.current_forward_prefetch_offset,
				LoadDirection::Prepend => &mut s.current_backward_prefetch_offset,
			};
			let changed = s.min_item_loaded_so_far != min || s.max_item_loaded_so_far != max || offset.is_some();
			*offset = None;
			s.min_item_loaded_so_far = min;
			s.max_item_loaded_so_far = max;
			changed
		})
	}

	/// Records the accessed id that triggered a prefetch in `direction`.
	pub fn update_prefetch_offset(&self, direction: LoadDirection, anchor: Id) -> bool {
		self.update(|s| {
			let slot = match direction {
				LoadDirection::Append => &mut s.current_forward_prefetch_offset,
				LoadDirection::Prepend => &mut s.current_backward_prefetch_offset,
			};
			if slot.as_ref() == Some(&anchor) {
				return false;
			}
			*slot = Some(anchor);
			true
		})
	}

	pub fn reset(&self) {
		self.state.send_replace(FetchingState::default());
	}
}

fn raise<T: Ord>(slot: &mut Option<T>, candidate: T) -> bool {
	match slot {
		Some(current) if *current >= candidate => false,
		_ => {
			*slot = Some(candidate);
			true
		}
	}
}

fn lower<T: Ord>(slot: &mut Option<T>, candidate: T) -> bool {
	match slot {
		Some(current) if *current <= candidate => false,
		_ => {
			*slot = Some(candidate);
			true
		}
	}
}

#[cfg(test)]
mod tests {
	use proptest::prelude::*;

	use super::*;

	type Holder = FetchingStateHolder<i64, u32>;

	#[test]
	fn extrema_only_move_outward() {
		let holder = Holder::default();
		assert!(holder.update_max_item_accessed_so_far(10));
		assert!(!holder.update_max_item_accessed_so_far(4));
		assert!(holder.update_max_item_accessed_so_far(12));
		assert!(holder.update_min_item_accessed_so_far(10));
		assert!(!holder.update_min_item_accessed_so_far(11));
		assert!(holder.update_min_item_accessed_so_far(-3));

		let state = holder.state();
		assert_eq!(state.max_item_accessed_so_far, Some(12));
		assert_eq!(state.min_item_accessed_so_far, Some(-3));
	}

	#[test]
	fn loaded_extrema_cover_page() {
		let holder = Holder::default();
		assert!(holder.update_loaded_extrema(&[5, 3, 9]));
		assert!(!holder.update_loaded_extrema(&[4, 8]));
		assert!(!holder.update_loaded_extrema(&[]));
		let state = holder.state();
		assert_eq!((state.min_item_loaded_so_far, state.max_item_loaded_so_far), (Some(3), Some(9)));
	}

	#[test]
	fn rebase_shrinks_loaded_window() {
		let holder = Holder::default();
		holder.update_loaded_extrema(&[0, 29]);
		holder.update_prefetch_offset(LoadDirection::Prepend, 4);
		holder.update_prefetch_offset(LoadDirection::Append, 25);

		assert!(holder.rebase_loaded_extrema(&[10, 29], LoadDirection::Prepend));
		let state = holder.state();
		assert_eq!((state.min_item_loaded_so_far, state.max_item_loaded_so_far), (Some(10), Some(29)));
		assert_eq!(state.current_backward_prefetch_offset, None);
		assert_eq!(state.current_forward_prefetch_offset, Some(25));
		assert!(!holder.rebase_loaded_extrema(&[10, 29], LoadDirection::Prepend));
	}

	#[test]
	fn observers_only_see_real_changes() {
		let holder = Holder::default();
		let mut rx = holder.subscribe();
		holder.update_request_extrema(&4);
		assert!(rx.has_changed().unwrap_or(false));
		let _ = rx.borrow_and_update();

		holder.update_request_extrema(&4);
		assert!(!rx.has_changed().unwrap_or(true));
	}

	#[test]
	fn prefetch_offset_records_anchor_once() {
		let holder = Holder::default();
		assert!(holder.update_prefetch_offset(LoadDirection::Append, 7));
		assert!(!holder.update_prefetch_offset(LoadDirection::Append, 7));
		assert!(holder.update_prefetch_offset(LoadDirection::Prepend, 7));
		let state = holder.state();
		assert_eq!(state.current_forward_prefetch_offset, Some(7));
		assert_eq!(state.current_backward_prefetch_offset, Some(7));
	}

	proptest! {
		#[test]
		fn max_accessed_is_running_maximum(values in proptest::collection::vec(-1000i64..1000, 1..64)) {
			let holder = Holder::default();
			let mut expected = i64::MIN;
			for value in values {
				holder.update_max_item_accessed_so_far(value);
				expected = expected.max(value);
				prop_assert_eq!(holder.state().max_item_accessed_so_far, Some(expected));
			}
		}

		#[test]
		fn min_accessed_is_running_minimum(values in proptest::collection::vec(-1000i64..1000, 1..64)) {
			let holder = Holder::default();
			let mut expected = i64::MAX;
			for value in values {
				holder.update_min_item_accessed_so_far(value);
				expected = expected.min(value);
				prop_assert_eq!(holder.state().min_item_accessed_so_far, Some(expected));
			}
		}
	}
}
