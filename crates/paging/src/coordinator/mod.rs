//! Loading coordinator.
//!
//! Each direction is served by one lane task that consumes [`LaneSignal`]s and
//! processes its queue strictly in order. A lane:
//!
//! 1. drains the queue up to and including the last explicit element
//!    (caller requests and the initial load);
//! 2. on [`LaneSignal::Force`], also loads the head continuation;
//! 3. on [`LaneSignal::Access`], asks the [`FetchingStrategy`] whether the head
//!    continuation should be prefetched, and loads at most one page if so.
//!
//! Loading one element registers a pending job, publishes `Loading`, runs the
//! middleware chain, resolves the page through the store (retrying under
//! [`ErrorHandlingStrategy::RetryLast`]) and publishes the outcome. Results
//! from a generation superseded by [`LoadingCoordinator::invalidate`] are
//! dropped.

mod middleware;
mod retry;

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub use self::middleware::{Middleware, MiddlewareChain, Next};
pub use self::retry::{ExponentialBackoff, RetryBookkeeper, RetryPolicy};
use crate::config::ErrorHandlingStrategy;
use crate::error::LoadError;
use crate::fetching::{FetchingStateHolder, FetchingStrategy};
use crate::load_state::{CombinedLoadStates, LoadLane};
use crate::log::PagingLogger;
use crate::operations::{ItemSnapshot, OperationPipeline};
use crate::paging_state::{PagingState, PagingStateManager};
use crate::queue::{EnqueueMechanism, QueueElement, QueueManager};
use crate::store::{EmptyReason, NormalizedStore, PageLoadState};
use crate::types::{Item, LoadDirection, LoadParams, LoadStrategy, RequestKey};

/// Wakes a lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LaneSignal {
	/// Drain explicit requests.
	Wake,
	/// Drain explicit requests, then load the head element regardless of strategy.
	Force,
	/// Accessed extrema moved; consult the fetching strategy.
	Access,
}

/// Bookkeeping for one element between dequeue and publish.
struct Job<K> {
	requested: LoadParams<K>,
	generation: u64,
	initial: bool,
	before: CombinedLoadStates,
}

pub(crate) struct LoadingCoordinator<K: RequestKey, V: Item> {
	pub(crate) store: NormalizedStore<K, V>,
	pub(crate) queues: Arc<QueueManager<K>>,
	pub(crate) paging: Arc<PagingStateManager<V::Id>>,
	pub(crate) fetching: Arc<FetchingStateHolder<V::Id, K>>,
	pub(crate) strategy: Arc<dyn FetchingStrategy<V::Id, K>>,
	pub(crate) pipeline: Arc<OperationPipeline<K, V>>,
	pub(crate) middleware: MiddlewareChain<K>,
	pub(crate) retries: RetryBookkeeper<K>,
	pub(crate) error_handling: ErrorHandlingStrategy,
	pub(crate) retry: RetryPolicy,
	pub(crate) logger: Arc<dyn PagingLogger>,
	/// Serializes publishing a result against invalidation.
	pub(crate) commit: Mutex<()>,
}

impl<K: RequestKey, V: Item> LoadingCoordinator<K, V> {
	pub(crate) async fn run_lane(self: Arc<Self>, direction: LoadDirection, mut signals: mpsc::UnboundedReceiver<LaneSignal>, cancel: CancellationToken) {
		loop {
			let signal = tokio::select! {
				biased;
				_ = cancel.cancelled() => break,
				signal = signals.recv() => match signal {
					Some(signal) => signal,
					None => break,
				},
			};
			tokio::select! {
				biased;
				_ = cancel.cancelled() => break,
				_ = self.drain(direction, signal) => {}
			}
		}
		tracing::debug!(direction = direction.as_str(), "paging.lane.exit");
	}

	pub(crate) async fn drain(&self, direction: LoadDirection, signal: LaneSignal) {
		let queue = self.queues.queue(direction);
		while let Some(element) = queue.next_explicit() {
			self.handle(element).await;
		}
		match signal {
			LaneSignal::Wake => {}
			LaneSignal::Force => {
				if let Some(element) = queue.remove_first() {
					self.handle(element).await;
				}
			}
			LaneSignal::Access => self.prefetch(direction).await,
		}
	}

	async fn prefetch(&self, direction: LoadDirection) {
		let queue = self.queues.queue(direction);
		let Some(head) = queue.peek_first() else {
			return;
		};
		let paging = self.paging.state();
		let fetching = self.fetching.state();
		let approved = match direction {
			LoadDirection::Append => self.strategy.should_fetch_forward(&head.params, &paging, &fetching),
			LoadDirection::Prepend => self.strategy.should_fetch_backward(&head.params, &paging, &fetching),
		};
		if !approved {
			return;
		}
		if let Some(anchor) = self.strategy.prefetch_anchor(direction, &paging, &fetching) {
			self.fetching.update_prefetch_offset(direction, anchor);
		}
		if let Some(element) = queue.remove_first() {
			self.handle(element).await;
		}
	}

	pub(crate) async fn handle(&self, element: QueueElement<K>) {
		let QueueElement { params: requested, mechanism } = element;
		let direction = requested.direction;
		let key = requested.key.clone();
		let generation = self.store.generation();

		if !self.queues.add_pending_job(key.clone(), true) {
			self.logger.debug(&format!("load of {key:?} already in flight, skipping"), None);
			return;
		}
		self.fetching.update_request_extrema(&key);

		let job = Job {
			initial: mechanism == EnqueueMechanism::InitialLoad,
			before: self.paging.state().load_states().clone(),
			requested,
			generation,
		};
		if job.initial {
			self.paging.update_with_refresh_loading();
		}
		self.paging.update_with_loading(direction);

		let params = self.middleware.run(job.requested.clone()).await;
		let terminal = self.load_with_retry(&params).await;
		tracing::debug!(
			direction = direction.as_str(),
			key = ?key,
			mechanism = mechanism.as_str(),
			outcome = terminal.as_str(),
			"paging.lane.load"
		);

		match terminal {
			PageLoadState::Success {
				snapshot, prev_key, next_key, ..
			} => self.on_success(&job, snapshot, prev_key, next_key),
			PageLoadState::Empty { reason } => self.on_empty(&job, &params.key, reason),
			PageLoadState::Error(cause) => self.on_error(&job, &params.key, cause).await,
			PageLoadState::SkippingLoad { .. } | PageLoadState::Processing | PageLoadState::Loading { .. } => self.restore(&job),
		}
		if self.store.is_current(generation) {
			self.queues.update_existing_job(&key, false, true);
		}
	}

	async fn load_with_retry(&self, params: &LoadParams<K>) -> PageLoadState<K, V> {
		let mut terminal = self.store.load_page_terminal(params.clone()).await;
		if self.error_handling == ErrorHandlingStrategy::RetryLast {
			while let PageLoadState::Error(cause) = &terminal {
				let attempt = self.retries.count(&params.key);
				if attempt >= self.retry.max_retries {
					break;
				}
				self.retries.increment(&params.key);
				self.logger.warn(
					&format!("load of {:?} failed, retry {} of {}", params.key, attempt + 1, self.retry.max_retries),
					Some(cause),
				);
				terminal = self.retry.backoff.execute(attempt, || self.store.load_page_terminal(params.clone())).await;
			}
		}
		self.retries.reset(&params.key);
		terminal
	}

	fn on_success(&self, job: &Job<K>, snapshot: ItemSnapshot<V>, prev_key: Option<K>, next_key: Option<K>) {
		let _commit = self.commit.lock();
		if !self.store.is_current(job.generation) {
			return;
		}
		let direction = job.requested.direction;
		let paging = self.paging.state();
		let fetching = self.fetching.state();
		let ids = self
			.pipeline
			.apply_operations(snapshot, Some(&job.requested.key), &paging, &fetching)
			.ids();
		self.fetching.update_loaded_extrema(&ids);

		let trimmed = if job.initial {
			let trimmed = self.paging.update_with_refresh_data(ids, prev_key.is_none(), next_key.is_none());
			self.enqueue_continuation(LoadDirection::Append, next_key, job.requested.strategy);
			self.enqueue_continuation(LoadDirection::Prepend, prev_key, job.requested.strategy);
			trimmed
		} else {
			let continuation = match direction {
				LoadDirection::Append => next_key,
				LoadDirection::Prepend => prev_key,
			};
			let trimmed = self.paging.update_with_data(direction, ids, continuation.is_none());
			self.enqueue_continuation(direction, continuation, job.requested.strategy);
			trimmed
		};
		self.queues.queue(direction).mark_processed(job.requested.clone());
		if trimmed {
			self.reopen_trimmed_edge(direction.opposite(), job.requested.strategy);
		}
	}

	/// Re-arms `edge` after `max_size` trimming dropped ids from it.
	///
	/// Queued continuations on that edge point past the dropped pages and are
	/// discarded. The page holding the new boundary id is queued again when it
	/// lost some of its ids, otherwise its neighbour on `edge` is.
	fn reopen_trimmed_edge(&self, edge: LoadDirection, strategy: LoadStrategy) {
		let kept: Vec<V::Id> = self.paging.state().loaded_ids().cloned().collect();
		self.fetching.rebase_loaded_extrema(&kept, edge);
		let queue = self.queues.queue(edge);
		queue.retain(|element| element.mechanism.is_explicit());

		let boundary = match edge {
			LoadDirection::Prepend => kept.first(),
			LoadDirection::Append => kept.last(),
		};
		let Some(boundary) = boundary else {
			return;
		};
		let Some((key, record)) = self
			.store
			.page_keys()
			.into_iter()
			.find_map(|key| self.store.page(&key).filter(|record| record.ids.contains(boundary)).map(|record| (key, record)))
		else {
			return;
		};
		let visible: FxHashSet<&V::Id> = kept.iter().collect();
		let target = if record.ids.iter().all(|id| visible.contains(id)) {
			match edge {
				LoadDirection::Prepend => record.prev_key,
				LoadDirection::Append => record.next_key,
			}
		} else {
			Some(key)
		};
		let Some(target) = target else {
			return;
		};
		let params = LoadParams::new(target, strategy, edge);
		queue.forget_processed(&params);
		let outcome = queue.add_first(QueueElement::new(params, EnqueueMechanism::NetworkLoadResponse));
		tracing::debug!(edge = edge.as_str(), outcome = ?outcome, "paging.queue.reopen");
	}

	fn on_empty(&self, job: &Job<K>, loaded_key: &K, reason: EmptyReason) {
		let _commit = self.commit.lock();
		if !self.store.is_current(job.generation) {
			return;
		}
		let end = reason == EmptyReason::EndOfPagination;
		if job.initial {
			// An empty anchor page can still have neighbours on the other side.
			let (prev_key, next_key) = match self.store.page(loaded_key) {
				Some(record) => (record.prev_key, record.next_key),
				None => (None, None),
			};
			self.paging.update_with_refresh_data(Vec::new(), end && prev_key.is_none(), end && next_key.is_none());
			self.enqueue_continuation(LoadDirection::Append, next_key, job.requested.strategy);
			self.enqueue_continuation(LoadDirection::Prepend, prev_key, job.requested.strategy);
		} else {
			self.paging.update_with_data(job.requested.direction, Vec::new(), end);
		}
		if end {
			self.queues.queue(job.requested.direction).mark_processed(job.requested.clone());
		}
	}

	async fn on_error(&self, job: &Job<K>, loaded_key: &K, cause: LoadError) {
		if !self.store.is_current(job.generation) {
			return;
		}
		if let Err(err) = self.store.clear_page(loaded_key).await {
			self.logger.warn("failed to clear page after load error", Some(&err));
		}
		let _commit = self.commit.lock();
		if !self.store.is_current(job.generation) {
			return;
		}
		let direction = job.requested.direction;
		match self.error_handling {
			ErrorHandlingStrategy::Ignore => {
				self.logger.debug(&format!("ignoring failed load of {:?}", job.requested.key), Some(&cause));
				self.restore_locked(job);
			}
			ErrorHandlingStrategy::RetryLast | ErrorHandlingStrategy::PassThrough => {
				self.logger.error(&format!("load of {:?} failed", job.requested.key), Some(&cause));
				if job.initial {
					self.paging.update_with_refresh_error(cause.clone());
				}
				self.paging.update_with_error(direction.into(), cause);
			}
		}
	}

	fn restore(&self, job: &Job<K>) {
		let _commit = self.commit.lock();
		if self.store.is_current(job.generation) {
			self.restore_locked(job);
		}
	}

	fn restore_locked(&self, job: &Job<K>) {
		let direction = job.requested.direction;
		self.paging.restore_load_state(direction.into(), job.before.get(direction).clone());
		if job.initial {
			self.paging.restore_load_state(LoadLane::Refresh, job.before.refresh.clone());
		}
	}

	fn enqueue_continuation(&self, direction: LoadDirection, key: Option<K>, strategy: LoadStrategy) {
		let Some(key) = key else {
			return;
		};
		let element = QueueElement::new(LoadParams::new(key, strategy, direction), EnqueueMechanism::NetworkLoadResponse);
		let outcome = self.queues.queue(direction).add_last(element);
		tracing::trace!(direction = direction.as_str(), outcome = ?outcome, "paging.queue.continuation");
	}

	/// Drops every cache, queue and state, then queues `initial` as a fresh initial load.
	pub(crate) async fn invalidate(&self, initial: LoadParams<K>) {
		{
			let _commit = self.commit.lock();
			self.store.invalidate_memory();
			self.queues.clear();
			self.retries.clear();
			self.fetching.reset();
			self.paging.reset(PagingState::default());
		}
		if let Err(err) = self.store.clear_persistence().await {
			self.logger.error("failed to clear persistence during invalidation", Some(&err));
			self.paging.update_with_refresh_error(LoadError::exception(err));
		}
		self.queues
			.append_queue()
			.add_last(QueueElement::new(initial, EnqueueMechanism::InitialLoad));
	}
}
