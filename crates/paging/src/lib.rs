#![cfg_attr(test, allow(unused_crate_dependencies))]
//! Incremental pagination engine.
//!
//! Pages are requested by opaque [`RequestKey`]s, loaded through a
//! [`PageSource`], normalized into an item cache plus page records, and
//! published as a [`PagingState`]: the ordered list of loaded item ids plus
//! the load state of the refresh, prepend and append lanes.
//!
//! # Main Types
//!
//! - [`Pager`] - owns the tasks and accepts [`PagingAction`]s
//! - [`NormalizedStore`] - item and page caches with optional [`Persistence`]
//! - [`QueueManager`] - per-direction request queues and the pending-job registry
//! - [`FetchingStrategy`] - decides when a continuation page is prefetched
//! - [`OperationPipeline`] - sort, filter, group, deduplicate and validate loaded pages
//! - [`ItemProvider`] - self-updating per-item handles
//!
//! # Architecture
//!
//! ```text
//! Pager
//! ├── action loop        PagingAction -> queues / pipeline / invalidate
//! ├── append lane        LoadParamsQueue -> middleware -> store -> PagingStateManager
//! ├── prepend lane       (same, other direction)
//! └── access watcher     FetchingState accessed extrema -> lane prefetch signal
//! ```
//!
//! Each lane processes its queue strictly in order; the two lanes run
//! independently. A key is never loaded twice at the same time.

pub mod config;
mod coordinator;
pub mod error;
pub mod fetching;
pub mod item;
pub mod load_state;
pub mod log;
pub mod operations;
pub mod pager;
pub mod paging_state;
pub mod queue;
pub mod store;
mod task;
#[cfg(test)]
mod testing;
mod token;
pub mod types;

pub use config::{ErrorHandlingStrategy, LogSeverity, PagingConfig, PagingSettings};
pub use coordinator::{ExponentialBackoff, Middleware, MiddlewareChain, Next, RetryPolicy};
pub use error::{ErrorCause, ItemUpdateError, LoadError, PagingError, PersistenceError, StoreError};
pub use fetching::{DefaultFetchingStrategy, DefaultListSortAnalyzer, FetchingState, FetchingStateHolder, FetchingStrategy, ListSort, ListSortAnalyzer};
pub use item::{ItemEvent, ItemLoadState, ItemProvider, ItemState, SelfUpdatingItem};
pub use load_state::{CombinedLoadStates, LoadLane, LoadState};
pub use log::{PagingLogger, TracingLogger};
pub use operations::{ItemSnapshot, Operation, OperationContext, OperationKind, OperationPipeline};
pub use pager::{Pager, PagerBuilder, PagingAction};
pub use paging_state::{PagingState, PagingStateManager};
pub use queue::{EnqueueMechanism, EnqueueOutcome, LoadParamsQueue, PendingJob, QueueElement, QueueManager};
pub use store::{
	EmptyReason, ItemUpdater, LoadSource, NormalizedStore, PageLoadState, PageRecord, PageSource, PageSourceFn, Persistence, PersistenceResult, SkipReason,
	page_source_fn,
};
pub use types::{DataOrigin, Identifier, Item, LoadDirection, LoadParams, LoadResult, LoadStrategy, PageData, RequestKey};

/// Result alias defaulting to [`PagingError`].
pub type Result<T, E = PagingError> = std::result::Result<T, E>;
