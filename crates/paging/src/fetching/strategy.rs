use std::sync::Arc;

use crate::fetching::FetchingState;
use crate::load_state::LoadState;
use crate::paging_state::PagingState;
use crate::types::{Identifier, LoadDirection, LoadParams};

/// Detected ordering of the loaded ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListSort {
	Ascending,
	Descending,
	Unsorted,
}

/// Classifies the ordering of a loaded id list.
pub trait ListSortAnalyzer<Id>: Send + Sync {
	fn analyze(&self, ids: &[Option<Id>]) -> ListSort;
}

/// Scans non-null ids pairwise. Fewer than two ids count as ascending.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultListSortAnalyzer;

impl<Id: Identifier> ListSortAnalyzer<Id> for DefaultListSortAnalyzer {
	fn analyze(&self, ids: &[Option<Id>]) -> ListSort {
		let mut ascending = true;
		let mut descending = true;
		let mut previous: Option<&Id> = None;
		for id in ids.iter().flatten() {
			if let Some(prev) = previous {
				ascending &= prev <= id;
				descending &= prev >= id;
				if !ascending && !descending {
					return ListSort::Unsorted;
				}
			}
			previous = Some(id);
		}
		if ascending { ListSort::Ascending } else { ListSort::Descending }
	}
}

/// Decides whether a continuation request should be loaded now.
pub trait FetchingStrategy<Id, K>: Send + Sync {
	fn should_fetch_forward(&self, params: &LoadParams<K>, paging_state: &PagingState<Id>, fetching_state: &FetchingState<Id, K>) -> bool;

	fn should_fetch_backward(&self, params: &LoadParams<K>, paging_state: &PagingState<Id>, fetching_state: &FetchingState<Id, K>) -> bool;

	/// Accessed id an approved prefetch in `direction` is attributed to.
	///
	/// The coordinator records it as the current prefetch offset so one access
	/// triggers at most one prefetch.
	fn prefetch_anchor(&self, direction: LoadDirection, _paging_state: &PagingState<Id>, fetching_state: &FetchingState<Id, K>) -> Option<Id>
	where
		Id: Clone,
	{
		match direction {
			LoadDirection::Append => fetching_state.max_item_accessed_so_far.clone(),
			LoadDirection::Prepend => fetching_state.min_item_accessed_so_far.clone(),
		}
	}
}

/// Distance-based strategy.
///
/// Fetches forward once the accessed edge is within `prefetch_distance` ids of
/// the loaded edge, symmetric for backward. Which extremum is the "forward"
/// edge depends on the sort order reported by the analyzer; unsorted lists
/// fetch on any new access.
pub struct DefaultFetchingStrategy<Id> {
	prefetch_distance: usize,
	analyzer: Arc<dyn ListSortAnalyzer<Id>>,
}

impl<Id: Identifier> DefaultFetchingStrategy<Id> {
	pub fn new(prefetch_distance: usize) -> Self {
		Self {
			prefetch_distance,
			analyzer: Arc::new(DefaultListSortAnalyzer),
		}
	}

	#[must_use]
	pub fn with_analyzer(mut self, analyzer: Arc<dyn ListSortAnalyzer<Id>>) -> Self {
		self.analyzer = analyzer;
		self
	}

	fn decide<K>(&self, direction: LoadDirection, paging_state: &PagingState<Id>, fetching_state: &FetchingState<Id, K>) -> bool {
		if lane_blocked(paging_state.load_states().get(direction)) {
			return false;
		}
		let sort = self.analyzer.analyze(paging_state.ids());
		let (accessed, loaded, offset) = edges(sort, direction, fetching_state);
		let Some(accessed) = accessed else {
			return false;
		};
		if offset == Some(accessed) {
			return false;
		}
		let Some(loaded) = loaded else {
			return true;
		};
		let distance = match (sort, direction) {
			(ListSort::Unsorted, _) => return true,
			(ListSort::Ascending, LoadDirection::Append) | (ListSort::Descending, LoadDirection::Prepend) => loaded.distance(accessed),
			(ListSort::Ascending, LoadDirection::Prepend) | (ListSort::Descending, LoadDirection::Append) => accessed.distance(loaded),
		};
		distance <= i64::try_from(self.prefetch_distance).unwrap_or(i64::MAX)
	}
}

impl<Id: Identifier, K> FetchingStrategy<Id, K> for DefaultFetchingStrategy<Id> {
	fn should_fetch_forward(&self, _params: &LoadParams<K>, paging_state: &PagingState<Id>, fetching_state: &FetchingState<Id, K>) -> bool {
		self.decide(LoadDirection::Append, paging_state, fetching_state)
	}

	fn should_fetch_backward(&self, _params: &LoadParams<K>, paging_state: &PagingState<Id>, fetching_state: &FetchingState<Id, K>) -> bool {
		self.decide(LoadDirection::Prepend, paging_state, fetching_state)
	}

	fn prefetch_anchor(&self, direction: LoadDirection, paging_state: &PagingState<Id>, fetching_state: &FetchingState<Id, K>) -> Option<Id> {
		let sort = self.analyzer.analyze(paging_state.ids());
		edges(sort, direction, fetching_state).0.cloned()
	}
}

/// Loading, or finished with the end reached.
fn lane_blocked(state: &LoadState) -> bool {
	state.is_loading() || state.end_of_pagination_reached()
}

/// `(accessed edge, loaded edge, last prefetch offset)` for one direction.
fn edges<Id, K>(sort: ListSort, direction: LoadDirection, s: &FetchingState<Id, K>) -> (Option<&Id>, Option<&Id>, Option<&Id>) {
	let upper = (s.max_item_accessed_so_far.as_ref(), s.max_item_loaded_so_far.as_ref());
	let lower = (s.min_item_accessed_so_far.as_ref(), s.min_item_loaded_so_far.as_ref());
	let ((accessed, loaded), offset) = match (sort, direction) {
		(ListSort::Descending, LoadDirection::Append) => (lower, s.current_forward_prefetch_offset.as_ref()),
		(ListSort::Descending, LoadDirection::Prepend) => (upper, s.current_backward_prefetch_offset.as_ref()),
		(_, LoadDirection::Append) => (upper, s.current_forward_prefetch_offset.as_ref()),
		(_, LoadDirection::Prepend) => (lower, s.current_backward_prefetch_offset.as_ref()),
	};
	(accessed, loaded, offset)
}
