//! Prefetch bookkeeping and the decision of when a continuation is loaded.

mod state;
mod strategy;

pub use state::{FetchingState, FetchingStateHolder};
pub use strategy::{DefaultFetchingStrategy, DefaultListSortAnalyzer, FetchingStrategy, ListSort, ListSortAnalyzer};
