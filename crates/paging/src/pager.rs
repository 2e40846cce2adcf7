//! Pager façade.
//!
//! A [`Pager`] owns four tasks on its runtime: the action loop, one lane per
//! direction, and a watcher that turns accessed-extrema changes into
//! [`LaneSignal::Access`]. Callers talk to it through [`PagingAction`]s and
//! observe [`PagingState`] through `watch`, `broadcast` or a [`Stream`].

use std::sync::Arc;

use futures::Stream;
use futures::stream;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::config::PagingConfig;
use crate::coordinator::{LaneSignal, LoadingCoordinator, Middleware, MiddlewareChain, RetryBookkeeper};
use crate::error::PagingError;
use crate::fetching::{DefaultFetchingStrategy, FetchingState, FetchingStateHolder, FetchingStrategy};
use crate::item::{ItemProvider, SelfUpdatingItem};
use crate::log::{PagingLogger, TracingLogger};
use crate::operations::{Operation, OperationPipeline};
use crate::paging_state::{PagingState, PagingStateManager};
use crate::queue::{EnqueueMechanism, QueueElement, QueueManager};
use crate::store::{ItemUpdater, NormalizedStore, PageSource, Persistence};
use crate::task::{PagerTask, runtime_handle, spawn};
use crate::types::{Item, LoadDirection, LoadParams, LoadStrategy, RequestKey};

/// Command accepted by [`Pager::dispatch`].
pub enum PagingAction<K, V: Item> {
	/// Queues a caller request. `jump` drops queued requests before `key` first.
	Enqueue {
		key: K,
		direction: LoadDirection,
		strategy: LoadStrategy,
		jump: bool,
	},
	/// Moves `key` to the head of its queue.
	SkipQueue {
		key: K,
		direction: LoadDirection,
		strategy: LoadStrategy,
	},
	/// Loads the head of the queue regardless of the fetching strategy.
	ProcessQueue(LoadDirection),
	/// Drops all cached data and state, then reloads the initial key.
	Invalidate,
	AddOperation(Operation<K, V>),
	RemoveOperation(String),
}

impl<K, V: Item> PagingAction<K, V> {
	pub const fn as_str(&self) -> &'static str {
		match self {
			Self::Enqueue { .. } => "enqueue",
			Self::SkipQueue { .. } => "skip_queue",
			Self::ProcessQueue(_) => "process_queue",
			Self::Invalidate => "invalidate",
			Self::AddOperation(_) => "add_operation",
			Self::RemoveOperation(_) => "remove_operation",
		}
	}
}

#[derive(Clone)]
struct Lanes {
	append: mpsc::UnboundedSender<LaneSignal>,
	prepend: mpsc::UnboundedSender<LaneSignal>,
}

impl Lanes {
	fn signal(&self, direction: LoadDirection, signal: LaneSignal) {
		let lane = match direction {
			LoadDirection::Append => &self.append,
			LoadDirection::Prepend => &self.prepend,
		};
		if lane.send(signal).is_err() {
			tracing::trace!(direction = direction.as_str(), "paging.lane.closed");
		}
	}
}

struct ActionLoop<K: RequestKey, V: Item> {
	coordinator: Arc<LoadingCoordinator<K, V>>,
	lanes: Lanes,
	jump_threshold: Option<usize>,
	initial_key: K,
}

impl<K: RequestKey, V: Item> ActionLoop<K, V> {
	async fn run(self, mut actions: mpsc::UnboundedReceiver<PagingAction<K, V>>, cancel: CancellationToken) {
		loop {
			let action = tokio::select! {
				biased;
				_ = cancel.cancelled() => break,
				action = actions.recv() => match action {
					Some(action) => action,
					None => break,
				},
			};
			tracing::trace!(action = action.as_str(), "paging.action");
			self.apply(action).await;
		}
		tracing::debug!("paging.actions.exit");
	}

	async fn apply(&self, action: PagingAction<K, V>) {
		let coordinator = &self.coordinator;
		match action {
			PagingAction::Enqueue {
				key,
				direction,
				strategy,
				jump,
			} => {
				let queue = coordinator.queues.queue(direction);
				let element = QueueElement::new(LoadParams::new(key, strategy, direction), EnqueueMechanism::EnqueueRequest);
				let jump = jump || self.jump_threshold.is_some_and(|threshold| queue.size() >= threshold);
				if jump {
					let dropped = queue.jump(element);
					tracing::debug!(direction = direction.as_str(), dropped, "paging.queue.jump");
				} else {
					let outcome = queue.add_last(element);
					tracing::trace!(direction = direction.as_str(), outcome = ?outcome, "paging.queue.enqueue");
				}
				self.lanes.signal(direction, LaneSignal::Wake);
			}
			PagingAction::SkipQueue { key, direction, strategy } => {
				let element = QueueElement::new(LoadParams::new(key, strategy, direction), EnqueueMechanism::EnqueueRequest);
				let outcome = coordinator.queues.queue(direction).promote(element);
				tracing::trace!(direction = direction.as_str(), outcome = ?outcome, "paging.queue.skip");
				self.lanes.signal(direction, LaneSignal::Wake);
			}
			PagingAction::ProcessQueue(direction) => self.lanes.signal(direction, LaneSignal::Force),
			PagingAction::Invalidate => {
				coordinator.invalidate(LoadParams::append(self.initial_key.clone())).await;
				self.lanes.signal(LoadDirection::Append, LaneSignal::Wake);
			}
			PagingAction::AddOperation(operation) => coordinator.pipeline.add(operation),
			PagingAction::RemoveOperation(name) => {
				if !coordinator.pipeline.remove(&name) {
					coordinator.logger.debug(&format!("no operation named {name:?} to remove"), None);
				}
			}
		}
	}
}

async fn watch_access<Id: Clone + PartialEq, K>(mut fetching: watch::Receiver<FetchingState<Id, K>>, lanes: Lanes, cancel: CancellationToken) {
	let mut last = fetching.borrow_and_update().accessed();
	loop {
		tokio::select! {
			biased;
			_ = cancel.cancelled() => break,
			changed = fetching.changed() => if changed.is_err() {
				break;
			},
		}
		let accessed = fetching.borrow_and_update().accessed();
		if accessed == last {
			continue;
		}
		let min_moved = accessed.0 != last.0;
		let max_moved = accessed.1 != last.1;
		last = accessed;
		if max_moved {
			lanes.signal(LoadDirection::Append, LaneSignal::Access);
		}
		if min_moved {
			lanes.signal(LoadDirection::Prepend, LaneSignal::Access);
		}
	}
	tracing::debug!("paging.access_watcher.exit");
}

/// Builder for [`Pager`].
#[must_use]
pub struct PagerBuilder<K: RequestKey, V: Item> {
	config: PagingConfig<K>,
	source: Arc<dyn PageSource<K, V>>,
	persistence: Option<Arc<dyn Persistence<K, V>>>,
	updater: Option<Arc<dyn ItemUpdater<V>>>,
	strategy: Option<Arc<dyn FetchingStrategy<V::Id, K>>>,
	middleware: Vec<Arc<dyn Middleware<K>>>,
	operations: Vec<Operation<K, V>>,
	initial_state: PagingState<V::Id>,
	logger: Option<Arc<dyn PagingLogger>>,
}

impl<K: RequestKey, V: Item> PagerBuilder<K, V> {
	/// Local store consulted between the memory cache and the page source.
	pub fn persistence(mut self, persistence: Arc<dyn Persistence<K, V>>) -> Self {
		self.persistence = Some(persistence);
		self
	}

	/// Remote target for item updates sent through [`Pager::item`] handles.
	pub fn updater(mut self, updater: Arc<dyn ItemUpdater<V>>) -> Self {
		self.updater = Some(updater);
		self
	}

	/// Replaces the distance-based default strategy.
	pub fn strategy(mut self, strategy: Arc<dyn FetchingStrategy<V::Id, K>>) -> Self {
		self.strategy = Some(strategy);
		self
	}

	/// Appends a middleware; layers run in registration order before every load.
	pub fn middleware(mut self, layer: Arc<dyn Middleware<K>>) -> Self {
		self.middleware.push(layer);
		self
	}

	/// Appends an operation to the pipeline applied to every loaded page.
	pub fn operation(mut self, operation: Operation<K, V>) -> Self {
		self.operations.push(operation);
		self
	}

	/// State published before the initial load runs.
	pub fn initial_state(mut self, state: PagingState<V::Id>) -> Self {
		self.initial_state = state;
		self
	}

	/// Replaces the [`TracingLogger`] built from [`PagingConfig::logging`].
	pub fn logger(mut self, logger: Arc<dyn PagingLogger>) -> Self {
		self.logger = Some(logger);
		self
	}

	/// Validates the config, spawns the pager's tasks and queues the initial load.
	pub fn build(self) -> Result<Pager<K, V>, PagingError> {
		let config = self.config;
		config.validate()?;
		let handle = runtime_handle(config.runtime.as_ref())?;
		let logger = self.logger.unwrap_or_else(|| Arc::new(TracingLogger::new(config.logging)));

		let mut store = NormalizedStore::builder(self.source)
			.logger(Arc::clone(&logger))
			.also_load_from_network(config.also_load_from_network);
		if let Some(persistence) = self.persistence {
			store = store.persistence(persistence);
		}
		let store = store.build();

		let placeholders = if config.placeholders { config.page_size } else { 0 };
		let strategy = self
			.strategy
			.unwrap_or_else(|| Arc::new(DefaultFetchingStrategy::new(config.resolved_prefetch_distance())));
		let coordinator = Arc::new(LoadingCoordinator {
			store: store.clone(),
			queues: Arc::new(QueueManager::new()),
			paging: Arc::new(PagingStateManager::new(self.initial_state, placeholders, config.max_size, config.event_buffer)),
			fetching: Arc::new(FetchingStateHolder::default()),
			strategy,
			pipeline: Arc::new(OperationPipeline::new(self.operations)),
			middleware: MiddlewareChain::new(self.middleware),
			retries: RetryBookkeeper::new(),
			error_handling: config.error_handling,
			retry: config.retry.clone(),
			logger: Arc::clone(&logger),
			commit: parking_lot::Mutex::new(()),
		});

		let cancel = CancellationToken::new();
		let (append_tx, append_rx) = mpsc::unbounded_channel();
		let (prepend_tx, prepend_rx) = mpsc::unbounded_channel();
		let lanes = Lanes {
			append: append_tx,
			prepend: prepend_tx,
		};
		for (direction, signals) in [(LoadDirection::Append, append_rx), (LoadDirection::Prepend, prepend_rx)] {
			spawn(
				&handle,
				PagerTask::Lane(direction),
				Arc::clone(&coordinator).run_lane(direction, signals, cancel.clone()),
			);
		}
		spawn(
			&handle,
			PagerTask::AccessWatcher,
			watch_access(coordinator.fetching.subscribe(), lanes.clone(), cancel.clone()),
		);

		let (actions, actions_rx) = mpsc::unbounded_channel();
		let initial_key = config.initial_key;
		let action_loop = ActionLoop {
			coordinator: Arc::clone(&coordinator),
			lanes: lanes.clone(),
			jump_threshold: config.jump_threshold,
			initial_key: initial_key.clone(),
		};
		spawn(&handle, PagerTask::Actions, action_loop.run(actions_rx, cancel.clone()));

		coordinator
			.queues
			.append_queue()
			.add_last(QueueElement::new(LoadParams::append(initial_key), EnqueueMechanism::InitialLoad));
		lanes.signal(LoadDirection::Append, LaneSignal::Wake);
		tracing::debug!(page_size = config.page_size, error_handling = ?config.error_handling, "paging.pager.start");

		Ok(Pager {
			actions,
			items: ItemProvider::new(store, self.updater, logger),
			coordinator,
			cancel,
		})
	}
}

/// Incremental pager over a [`PageSource`].
///
/// Dropping the pager cancels its tasks. In-flight loads finish but their
/// results are no longer observed.
pub struct Pager<K: RequestKey, V: Item> {
	actions: mpsc::UnboundedSender<PagingAction<K, V>>,
	coordinator: Arc<LoadingCoordinator<K, V>>,
	items: ItemProvider<K, V>,
	cancel: CancellationToken,
}

impl<K: RequestKey, V: Item> Pager<K, V> {
	/// Starts a pager over `source`. Nothing runs until [`PagerBuilder::build`].
	pub fn builder(config: PagingConfig<K>, source: Arc<dyn PageSource<K, V>>) -> PagerBuilder<K, V> {
		PagerBuilder {
			config,
			source,
			persistence: None,
			updater: None,
			strategy: None,
			middleware: Vec::new(),
			operations: Vec::new(),
			initial_state: PagingState::default(),
			logger: None,
		}
	}

	/// Sends `action` to the action loop.
	///
	/// # Errors
	///
	/// Returns [`PagingError::Closed`] once the pager has shut down.
	pub fn dispatch(&self, action: PagingAction<K, V>) -> Result<(), PagingError> {
		if self.cancel.is_cancelled() {
			return Err(PagingError::Closed);
		}
		self.actions.send(action).map_err(|_| PagingError::Closed)
	}

	/// Queues `key` behind earlier requests in `direction`.
	///
	/// Becomes a jump when the configured jump threshold is reached.
	pub fn enqueue(&self, key: K, direction: LoadDirection) -> Result<(), PagingError> {
		self.dispatch(PagingAction::Enqueue {
			key,
			direction,
			strategy: LoadStrategy::default(),
			jump: false,
		})
	}

	/// Discards queued requests before `key` and loads it next.
	pub fn jump(&self, key: K, direction: LoadDirection) -> Result<(), PagingError> {
		self.dispatch(PagingAction::Enqueue {
			key,
			direction,
			strategy: LoadStrategy::default(),
			jump: true,
		})
	}

	/// Moves `key` to the head of its queue and loads it next.
	pub fn skip_queue(&self, key: K, direction: LoadDirection) -> Result<(), PagingError> {
		self.dispatch(PagingAction::SkipQueue {
			key,
			direction,
			strategy: LoadStrategy::default(),
		})
	}

	/// Loads the head of `direction`'s queue regardless of the fetching strategy.
	pub fn process_queue(&self, direction: LoadDirection) -> Result<(), PagingError> {
		self.dispatch(PagingAction::ProcessQueue(direction))
	}

	/// Drops every cached page and item and reloads from the initial key.
	pub fn invalidate(&self) -> Result<(), PagingError> {
		self.dispatch(PagingAction::Invalidate)
	}

	/// Adds `operation` to the pipeline. Applies to pages loaded afterwards.
	pub fn add_operation(&self, operation: Operation<K, V>) -> Result<(), PagingError> {
		self.dispatch(PagingAction::AddOperation(operation))
	}

	/// Removes the operation named `name`, if any.
	pub fn remove_operation(&self, name: impl Into<String>) -> Result<(), PagingError> {
		self.dispatch(PagingAction::RemoveOperation(name.into()))
	}

	/// Latest published state.
	pub fn state(&self) -> PagingState<V::Id> {
		self.coordinator.paging.state()
	}

	/// Latest state only; intermediate transitions may be skipped.
	pub fn watch(&self) -> watch::Receiver<PagingState<V::Id>> {
		self.coordinator.paging.watch()
	}

	/// Every published transition, subject to the configured event buffer.
	pub fn subscribe(&self) -> broadcast::Receiver<PagingState<V::Id>> {
		self.coordinator.paging.subscribe()
	}

	/// Published transitions as a stream. Values lost to lag are skipped.
	pub fn states(&self) -> impl Stream<Item = PagingState<V::Id>> + Send + 'static {
		stream::unfold(self.subscribe(), |mut events| async move {
			loop {
				match events.recv().await {
					Ok(state) => return Some((state, events)),
					Err(broadcast::error::RecvError::Lagged(skipped)) => {
						tracing::debug!(skipped, "paging.states.lagged");
					}
					Err(broadcast::error::RecvError::Closed) => return None,
				}
			}
		})
	}

	/// Snapshot of the accessed, requested and loaded extrema.
	pub fn fetching_state(&self) -> FetchingState<V::Id, K> {
		self.coordinator.fetching.state()
	}

	/// Reports that the item with `id` was shown. May trigger a prefetch.
	pub fn record_access(&self, id: V::Id) -> bool {
		self.coordinator.fetching.record_access(id)
	}

	/// Self-updating handle for `id`.
	pub fn item(&self, id: V::Id) -> Arc<SelfUpdatingItem<K, V>> {
		self.items.get(id)
	}

	/// Provider behind [`Pager::item`].
	pub fn items(&self) -> &ItemProvider<K, V> {
		&self.items
	}

	/// Normalized item and page store.
	pub fn store(&self) -> &NormalizedStore<K, V> {
		&self.coordinator.store
	}

	/// Append and prepend queues plus the pending-job registry.
	pub fn queues(&self) -> &QueueManager<K> {
		&self.coordinator.queues
	}

	/// Names of the active operations, in pipeline order.
	pub fn operations(&self) -> Vec<String> {
		self.coordinator.pipeline.names()
	}

	/// Whether [`Pager::shutdown`] ran or the pager was dropped.
	pub fn is_closed(&self) -> bool {
		self.cancel.is_cancelled()
	}

	/// Cancels every pager task. Later dispatches fail with [`PagingError::Closed`].
	pub fn shutdown(&self) {
		self.cancel.cancel();
	}
}

impl<K: RequestKey, V: Item> Drop for Pager<K, V> {
	fn drop(&mut self) {
		self.cancel.cancel();
	}
}
