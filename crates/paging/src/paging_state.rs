//! Published paging state.
//!
//! [`PagingStateManager`] is the single writer of [`PagingState`]. Every update
//! builds a fresh snapshot from the latest one and publishes it twice: into a
//! `watch` channel (latest value, for readers that only care about "now") and
//! into a `broadcast` channel (every transition, for readers that need to see
//! `Loading` before `NotLoading`).
//!
//! # Invariants
//!
//! * `ids` never holds the same non-null id twice. Incoming ids already
//!   present in the list are dropped, the earlier position wins.
//! * Appended ids land after every existing id; prepended ids land before.
//! * Placeholder padding (`None`) only ever sits at the edge that is loading,
//!   and is removed by the next data or error update for that edge.
//! * Trimming to `max_size` drops ids from the edge opposite the merge and
//!   reopens that edge, so it can page back in.

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use tokio::sync::{broadcast, watch};

use crate::error::LoadError;
use crate::load_state::{CombinedLoadStates, LoadLane, LoadState};
use crate::types::{Identifier, LoadDirection};

/// Externally observed value: loaded ids (with `None` placeholders) plus load states.
#[derive(Debug, Clone, PartialEq)]
pub struct PagingState<Id> {
	ids: Arc<[Option<Id>]>,
	load_states: CombinedLoadStates,
}

impl<Id> Default for PagingState<Id> {
	fn default() -> Self {
		Self {
			ids: Arc::from(Vec::new()),
			load_states: CombinedLoadStates::default(),
		}
	}
}

impl<Id> PagingState<Id> {
	pub fn new(ids: Vec<Option<Id>>, load_states: CombinedLoadStates) -> Self {
		Self {
			ids: Arc::from(ids),
			load_states,
		}
	}

	pub fn ids(&self) -> &[Option<Id>] {
		&self.ids
	}

	/// Non-placeholder ids in order.
	pub fn loaded_ids(&self) -> impl Iterator<Item = &Id> {
		self.ids.iter().flatten()
	}

	pub fn load_states(&self) -> &CombinedLoadStates {
		&self.load_states
	}

	pub fn len(&self) -> usize {
		self.ids.len()
	}

	pub fn is_empty(&self) -> bool {
		self.ids.is_empty()
	}
}

/// Single-writer, many-reader container for [`PagingState`].
pub struct PagingStateManager<Id> {
	write: Mutex<()>,
	latest: watch::Sender<PagingState<Id>>,
	events: broadcast::Sender<PagingState<Id>>,
	placeholder_count: usize,
	max_size: Option<usize>,
}

impl<Id: Identifier> PagingStateManager<Id> {
	/// `placeholder_count` slots pad the loading edge; zero disables placeholders.
	pub fn new(initial: PagingState<Id>, placeholder_count: usize, max_size: Option<usize>, event_buffer: usize) -> Self {
		let (latest, _) = watch::channel(initial);
		let (events, _) = broadcast::channel(event_buffer.max(1));
		Self {
			write: Mutex::new(()),
			latest,
			events,
			placeholder_count,
			max_size,
		}
	}

	pub fn state(&self) -> PagingState<Id> {
		self.latest.borrow().clone()
	}

	pub fn watch(&self) -> watch::Receiver<PagingState<Id>> {
		self.latest.subscribe()
	}

	pub fn subscribe(&self) -> broadcast::Receiver<PagingState<Id>> {
		self.events.subscribe()
	}

	pub fn update_with_append_loading(&self) {
		self.update_with_loading(LoadDirection::Append);
	}

	pub fn update_with_prepend_loading(&self) {
		self.update_with_loading(LoadDirection::Prepend);
	}

	pub fn update_with_refresh_loading(&self) {
		self.publish(|ids, states| {
			states.refresh = LoadState::Loading;
			ids
		});
	}

	pub fn update_with_append_data(&self, incoming: Vec<Id>, end_of_pagination_reached: bool) -> bool {
		self.update_with_data(LoadDirection::Append, incoming, end_of_pagination_reached)
	}

	pub fn update_with_prepend_data(&self, incoming: Vec<Id>, end_of_pagination_reached: bool) -> bool {
		self.update_with_data(LoadDirection::Prepend, incoming, end_of_pagination_reached)
	}

	/// Publishes the result of a full (re)load: `incoming` is appended, refresh
	/// settles, and both edges record whether they reached the end.
	///
	/// Returns whether the head was trimmed to fit `max_size`.
	pub fn update_with_refresh_data(&self, incoming: Vec<Id>, prepend_end_reached: bool, append_end_reached: bool) -> bool {
		let max_size = self.max_size;
		let mut trimmed = false;
		self.publish(|mut ids, states| {
			strip_placeholders(&mut ids, LoadDirection::Append);
			merge(&mut ids, incoming, LoadDirection::Append);
			trimmed = trim_to(&mut ids, max_size, LoadDirection::Append);
			states.refresh = LoadState::incomplete();
			states.prepend = LoadState::not_loading(prepend_end_reached && !trimmed);
			states.append = LoadState::not_loading(append_end_reached);
			ids
		});
		trimmed
	}

	pub fn update_with_append_error(&self, cause: LoadError) {
		self.update_with_error(LoadLane::Append, cause);
	}

	pub fn update_with_prepend_error(&self, cause: LoadError) {
		self.update_with_error(LoadLane::Prepend, cause);
	}

	pub fn update_with_refresh_error(&self, cause: LoadError) {
		self.update_with_error(LoadLane::Refresh, cause);
	}

	pub fn update_with_loading(&self, direction: LoadDirection) {
		let padding = self.placeholder_count;
		self.publish(|mut ids, states| {
			states.set(direction, LoadState::Loading);
			if padding > 0 {
				strip_placeholders(&mut ids, direction);
				pad_placeholders(&mut ids, padding, direction);
			}
			ids
		});
	}

	/// Merges `incoming` at `direction`'s edge. Returns whether the opposite
	/// edge was trimmed to fit `max_size`; a trimmed edge is no longer complete.
	pub fn update_with_data(&self, direction: LoadDirection, incoming: Vec<Id>, end_of_pagination_reached: bool) -> bool {
		let max_size = self.max_size;
		let mut trimmed = false;
		self.publish(|mut ids, states| {
			strip_placeholders(&mut ids, direction);
			merge(&mut ids, incoming, direction);
			trimmed = trim_to(&mut ids, max_size, direction);
			states.set(direction, LoadState::not_loading(end_of_pagination_reached));
			let opposite = direction.opposite();
			if trimmed && !states.get(opposite).is_loading() {
				states.set(opposite, LoadState::incomplete());
			}
			ids
		});
		trimmed
	}

	pub fn update_with_error(&self, lane: LoadLane, cause: LoadError) {
		self.publish(|mut ids, states| {
			match lane {
				LoadLane::Append => strip_placeholders(&mut ids, LoadDirection::Append),
				LoadLane::Prepend => strip_placeholders(&mut ids, LoadDirection::Prepend),
				LoadLane::Refresh => {}
			}
			states.set(lane, LoadState::Error(cause));
			ids
		});
	}

	/// Puts one lane back to an earlier state, dropping any placeholder padding.
	pub fn restore_load_state(&self, lane: LoadLane, state: LoadState) {
		self.publish(|mut ids, states| {
			match lane {
				LoadLane::Append => strip_placeholders(&mut ids, LoadDirection::Append),
				LoadLane::Prepend => strip_placeholders(&mut ids, LoadDirection::Prepend),
				LoadLane::Refresh => {}
			}
			states.set(lane, state);
			ids
		});
	}

	pub fn reset(&self, state: PagingState<Id>) {
		let _guard = self.write.lock();
		self.latest.send_replace(state.clone());
		let _ = self.events.send(state);
	}

	fn publish(&self, update: impl FnOnce(Vec<Option<Id>>, &mut CombinedLoadStates) -> Vec<Option<Id>>) {
		let _guard = self.write.lock();
		let current = self.latest.borrow().clone();
		let mut load_states = current.load_states;
		let ids = update(current.ids.to_vec(), &mut load_states);
		let next = PagingState {
			ids: Arc::from(ids),
			load_states,
		};
		self.latest.send_replace(next.clone());
		let _ = self.events.send(next);
	}
}

fn strip_placeholders<Id>(ids: &mut Vec<Option<Id>>, edge: LoadDirection) {
	match edge {
		LoadDirection::Append => {
			while matches!(ids.last(), Some(None)) {
				ids.pop();
			}
		}
		LoadDirection::Prepend => {
			let leading = ids.iter().take_while(|slot| slot.is_none()).count();
			ids.drain(..leading);
		}
	}
}

fn pad_placeholders<Id>(ids: &mut Vec<Option<Id>>, count: usize, edge: LoadDirection) {
	match edge {
		LoadDirection::Append => ids.extend(std::iter::repeat_with(|| None).take(count)),
		LoadDirection::Prepend => {
			ids.splice(0..0, std::iter::repeat_with(|| None).take(count));
		}
	}
}

fn merge<Id: Identifier>(ids: &mut Vec<Option<Id>>, incoming: Vec<Id>, edge: LoadDirection) {
	let mut seen: FxHashSet<Id> = ids.iter().flatten().cloned().collect();
	let fresh: Vec<Option<Id>> = incoming.into_iter().filter(|id| seen.insert(id.clone())).map(Some).collect();
	match edge {
		LoadDirection::Append => ids.extend(fresh),
		LoadDirection::Prepend => {
			ids.splice(0..0, fresh);
		}
	}
}

/// Trims from the edge opposite the one just merged. Returns whether any id was dropped.
fn trim_to<Id>(ids: &mut Vec<Option<Id>>, max_size: Option<usize>, merged_edge: LoadDirection) -> bool {
	let Some(max) = max_size else {
		return false;
	};
	if ids.len() <= max {
		return false;
	}
	let excess = ids.len() - max;
	match merged_edge {
		LoadDirection::Append => {
			ids.drain(..excess);
		}
		LoadDirection::Prepend => ids.truncate(max),
	}
	true
}
