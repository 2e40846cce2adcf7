use crate::error::LoadError;
use crate::types::LoadDirection;

/// Load status of one lane.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadState {
	NotLoading { end_of_pagination_reached: bool },
	Loading,
	Error(LoadError),
}

impl LoadState {
	/// `NotLoading` with more data available.
	pub const fn incomplete() -> Self {
		Self::NotLoading {
			end_of_pagination_reached: false,
		}
	}

	/// `NotLoading` with the end of the data set reached.
	pub const fn complete() -> Self {
		Self::NotLoading {
			end_of_pagination_reached: true,
		}
	}

	pub const fn not_loading(end_of_pagination_reached: bool) -> Self {
		Self::NotLoading { end_of_pagination_reached }
	}

	pub const fn is_loading(&self) -> bool {
		matches!(self, Self::Loading)
	}

	pub const fn is_error(&self) -> bool {
		matches!(self, Self::Error(_))
	}

	pub const fn is_not_loading(&self) -> bool {
		matches!(self, Self::NotLoading { .. })
	}

	pub const fn end_of_pagination_reached(&self) -> bool {
		matches!(
			self,
			Self::NotLoading {
				end_of_pagination_reached: true
			}
		)
	}
}

impl Default for LoadState {
	fn default() -> Self {
		Self::incomplete()
	}
}

/// Names one of the three lanes in [`CombinedLoadStates`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadLane {
	Refresh,
	Prepend,
	Append,
}

impl From<LoadDirection> for LoadLane {
	fn from(direction: LoadDirection) -> Self {
		match direction {
			LoadDirection::Append => Self::Append,
			LoadDirection::Prepend => Self::Prepend,
		}
	}
}

/// Snapshot of the three independent load states.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CombinedLoadStates {
	pub refresh: LoadState,
	pub prepend: LoadState,
	pub append: LoadState,
}

impl CombinedLoadStates {
	pub fn get(&self, lane: impl Into<LoadLane>) -> &LoadState {
		match lane.into() {
			LoadLane::Refresh => &self.refresh,
			LoadLane::Prepend => &self.prepend,
			LoadLane::Append => &self.append,
		}
	}

	pub fn set(&mut self, lane: impl Into<LoadLane>, state: LoadState) {
		match lane.into() {
			LoadLane::Refresh => self.refresh = state,
			LoadLane::Prepend => self.prepend = state,
			LoadLane::Append => self.append = state,
		}
	}

	pub fn has_error(&self) -> bool {
		self.refresh.is_error() || self.prepend.is_error() || self.append.is_error()
	}

	pub fn is_idle(&self) -> bool {
		self.refresh.is_not_loading() && self.prepend.is_not_loading() && self.append.is_not_loading()
	}
}
