//! Normalized item and page store.
//!
//! # Purpose
//!
//! Resolves page requests against the in-memory caches, the optional
//! [`Persistence`] collaborator and finally the [`PageSource`], and splits every
//! fetched page into individually cached items plus a [`PageRecord`] holding
//! their ids.
//!
//! # Invariants
//!
//! * A request key has at most one load in flight. A second request for the
//!   same key ends with [`SkipReason::AlreadyInFlight`].
//! * Caches are only written by loads started under the current generation.
//!   [`NormalizedStore::invalidate_all`] starts a new generation; loads from an
//!   older one end with [`SkipReason::Superseded`] and leave no trace.
//! * Lock order is items, then pages. Neither lock is held across an await.
//!
//! # Resolution order
//!
//! 1. in-flight de-duplication
//! 2. memory cache (unless `SkipCache`)
//! 3. persistence (unless `SkipCache`)
//! 4. page source (never for `LocalOnly`; for `CacheFirst` only on a local miss
//!    or when `also_load_from_network` is set, in which case a remote failure
//!    falls back to the local page)

mod cache;
mod chain;
mod persistence;
mod source;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::channel::mpsc;
use futures::future;
use futures::stream::{self, BoxStream};
use futures::{FutureExt, StreamExt};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

pub use self::cache::PageRecord;
use self::cache::PageTable;
pub use self::chain::{PageChain, PageNode};
pub use self::persistence::{Persistence, PersistenceResult};
pub use self::source::{ItemUpdater, PageSource, PageSourceFn, page_source_fn};
use crate::error::{LoadError, PersistenceError, StoreError};
use crate::log::{PagingLogger, TracingLogger};
use crate::operations::ItemSnapshot;
use crate::token::GenerationClock;
use crate::types::{DataOrigin, Item, LoadDirection, LoadParams, LoadResult, LoadStrategy, PageData, RequestKey};

/// Where a page load is currently being served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadSource {
	MemoryCache,
	Database,
	Remote,
}

/// Why a load ended without touching the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
	/// Another load for the same key is running.
	AlreadyInFlight,
	/// The store was invalidated while the load ran.
	Superseded,
}

/// Why a load produced no items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EmptyReason {
	/// `LocalOnly` request with nothing cached.
	NoLocalData,
	/// The page is empty and has no continuation in its direction.
	EndOfPagination,
}

/// Progress of one page load.
///
/// `Processing` and `Loading` are transient. `Success`, `Error` and `Empty`
/// are terminal. `SkippingLoad` ends the stream without a result.
#[derive(Debug, Clone, PartialEq)]
pub enum PageLoadState<K, V> {
	Processing,
	Loading {
		source: LoadSource,
	},
	SkippingLoad {
		reason: SkipReason,
	},
	Success {
		snapshot: ItemSnapshot<V>,
		prev_key: Option<K>,
		next_key: Option<K>,
		source: LoadSource,
		origin: DataOrigin,
	},
	Error(LoadError),
	Empty {
		reason: EmptyReason,
	},
}

impl<K, V> PageLoadState<K, V> {
	pub const fn is_terminal(&self) -> bool {
		matches!(self, Self::Success { .. } | Self::Error(_) | Self::Empty { .. })
	}

	pub const fn as_str(&self) -> &'static str {
		match self {
			Self::Processing => "processing",
			Self::Loading { .. } => "loading",
			Self::SkippingLoad { .. } => "skipping",
			Self::Success { .. } => "success",
			Self::Error(_) => "error",
			Self::Empty { .. } => "empty",
		}
	}
}

type StateSender<K, V> = mpsc::UnboundedSender<PageLoadState<K, V>>;
type LocalPage<K, V> = (PageRecord<K, <V as Item>::Id>, Vec<V>);

/// Builder for [`NormalizedStore`].
pub struct StoreBuilder<K: RequestKey, V: Item> {
	source: Arc<dyn PageSource<K, V>>,
	persistence: Option<Arc<dyn Persistence<K, V>>>,
	logger: Arc<dyn PagingLogger>,
	also_load_from_network: bool,
}

impl<K: RequestKey, V: Item> StoreBuilder<K, V> {
	#[must_use]
	pub fn persistence(mut self, persistence: Arc<dyn Persistence<K, V>>) -> Self {
		self.persistence = Some(persistence);
		self
	}

	#[must_use]
	pub fn logger(mut self, logger: Arc<dyn PagingLogger>) -> Self {
		self.logger = logger;
		self
	}

	#[must_use]
	pub fn also_load_from_network(mut self, enabled: bool) -> Self {
		self.also_load_from_network = enabled;
		self
	}

	pub fn build(self) -> NormalizedStore<K, V> {
		NormalizedStore {
			inner: Arc::new(StoreInner {
				source: self.source,
				persistence: self.persistence,
				items: Mutex::new(FxHashMap::default()),
				pages: Mutex::new(PageTable::default()),
				generation: GenerationClock::new(),
				also_load_from_network: self.also_load_from_network,
				logger: self.logger,
			}),
		}
	}
}

struct StoreInner<K: RequestKey, V: Item> {
	source: Arc<dyn PageSource<K, V>>,
	persistence: Option<Arc<dyn Persistence<K, V>>>,
	items: Mutex<FxHashMap<V::Id, V>>,
	pages: Mutex<PageTable<K, V::Id>>,
	generation: GenerationClock,
	also_load_from_network: bool,
	logger: Arc<dyn PagingLogger>,
}

/// Shared handle to the item and page caches.
pub struct NormalizedStore<K: RequestKey, V: Item> {
	inner: Arc<StoreInner<K, V>>,
}

impl<K: RequestKey, V: Item> Clone for NormalizedStore<K, V> {
	fn clone(&self) -> Self {
		Self {
			inner: Arc::clone(&self.inner),
		}
	}
}

impl<K: RequestKey, V: Item> NormalizedStore<K, V> {
	pub fn builder(source: Arc<dyn PageSource<K, V>>) -> StoreBuilder<K, V> {
		StoreBuilder {
			source,
			persistence: None,
			logger: Arc::new(TracingLogger::default()),
			also_load_from_network: false,
		}
	}

	/// Streams the progress of loading `params`, ending after the final state.
	pub fn load_page(&self, params: LoadParams<K>) -> BoxStream<'static, PageLoadState<K, V>> {
		let (tx, rx) = mpsc::unbounded();
		let store = self.clone();
		let driver = async move { store.drive(params, tx).await }
			.into_stream()
			.filter_map(|()| future::ready(None::<PageLoadState<K, V>>));
		stream::select(rx, driver).boxed()
	}

	/// Runs [`Self::load_page`] to completion and returns its final state.
	pub async fn load_page_terminal(&self, params: LoadParams<K>) -> PageLoadState<K, V> {
		self.load_page(params)
			.fold(None, |_, state| future::ready(Some(state)))
			.await
			.unwrap_or_else(|| PageLoadState::Error(LoadError::message("page load produced no state")))
	}

	/// Removes one page and the items no other page references.
	pub async fn clear_page(&self, key: &K) -> Result<(), StoreError> {
		let removed = {
			let mut items = self.inner.items.lock();
			let mut pages = self.inner.pages.lock();
			pages.chain.remove(key);
			match pages.records.remove(key) {
				Some(record) => {
					let orphans = pages.orphaned_ids(&record);
					for id in &orphans {
						items.remove(id);
					}
					Some((record, orphans))
				}
				None => None,
			}
		};
		let (Some((record, orphans)), Some(persistence)) = (removed, &self.inner.persistence) else {
			return Ok(());
		};
		if let PersistenceResult::Error(err) = persistence.remove_page(&record.params).await {
			return Err(StoreError::persistence("remove page", err));
		}
		for id in &orphans {
			if let PersistenceResult::Error(err) = persistence.remove_item(id).await {
				return Err(StoreError::persistence("remove item", err));
			}
		}
		Ok(())
	}

	/// Drops every item and page and starts a new generation.
	///
	/// Both persistence stores are cleared even if the first one fails; the
	/// first failure is returned.
	pub async fn invalidate_all(&self) -> Result<(), StoreError> {
		self.invalidate_memory();
		self.clear_persistence().await
	}

	/// In-memory half of [`Self::invalidate_all`]. Returns the new generation.
	pub(crate) fn invalidate_memory(&self) -> u64 {
		let mut items = self.inner.items.lock();
		let mut pages = self.inner.pages.lock();
		let generation = self.inner.generation.advance();
		items.clear();
		pages.clear();
		tracing::debug!(generation, "paging.store.invalidate");
		generation
	}

	pub(crate) async fn clear_persistence(&self) -> Result<(), StoreError> {
		let Some(persistence) = &self.inner.persistence else {
			return Ok(());
		};
		let items = persistence.clear_all_items().await;
		let pages = persistence.clear_all_pages().await;
		if let PersistenceResult::Error(err) = items {
			return Err(StoreError::persistence("clear items", err));
		}
		if let PersistenceResult::Error(err) = pages {
			return Err(StoreError::persistence("clear pages", err));
		}
		Ok(())
	}

	/// Looks up an item in memory, then in persistence.
	pub async fn get_item(&self, id: &V::Id) -> Result<Option<V>, StoreError> {
		if let Some(item) = self.cached_item(id) {
			return Ok(Some(item));
		}
		let Some(persistence) = &self.inner.persistence else {
			return Ok(None);
		};
		let found = persistence.get_item(id).await.into_result().map_err(|err| StoreError::persistence("read item", err))?.flatten();
		if let Some(item) = &found {
			self.inner.items.lock().insert(id.clone(), item.clone());
		}
		Ok(found)
	}

	/// Replaces an item in memory and persistence.
	pub async fn write_item(&self, item: V) -> Result<(), StoreError> {
		self.inner.items.lock().insert(item.id(), item.clone());
		if let Some(persistence) = &self.inner.persistence
			&& let PersistenceResult::Error(err) = persistence.save_item(&item, None).await
		{
			return Err(StoreError::persistence("save item", err));
		}
		Ok(())
	}

	pub async fn remove_item(&self, id: &V::Id) -> Result<(), StoreError> {
		self.inner.items.lock().remove(id);
		if let Some(persistence) = &self.inner.persistence
			&& let PersistenceResult::Error(err) = persistence.remove_item(id).await
		{
			return Err(StoreError::persistence("remove item", err));
		}
		Ok(())
	}

	pub fn cached_item(&self, id: &V::Id) -> Option<V> {
		self.inner.items.lock().get(id).cloned()
	}

	pub fn page(&self, key: &K) -> Option<PageRecord<K, V::Id>> {
		self.inner.pages.lock().records.get(key).cloned()
	}

	pub fn page_node(&self, key: &K) -> Option<PageNode<K>> {
		self.inner.pages.lock().chain.get(key).cloned()
	}

	/// Linked page keys in chain order.
	pub fn page_keys(&self) -> Vec<K> {
		self.inner.pages.lock().chain.keys()
	}

	pub fn is_chain_contiguous(&self) -> bool {
		self.inner.pages.lock().chain.is_contiguous()
	}

	pub fn item_count(&self) -> usize {
		self.inner.items.lock().len()
	}

	pub fn generation(&self) -> u64 {
		self.inner.generation.current()
	}

	pub fn is_current(&self, generation: u64) -> bool {
		self.inner.generation.is_current(generation)
	}

	async fn drive(self, params: LoadParams<K>, tx: StateSender<K, V>) {
		emit(&tx, PageLoadState::Processing);
		let generation = self.generation();
		if !self.inner.pages.lock().chain.begin_load(params.key.clone()) {
			tracing::debug!(key = ?params.key, "paging.store.already_in_flight");
			emit(&tx, PageLoadState::SkippingLoad {
				reason: SkipReason::AlreadyInFlight,
			});
			return;
		}
		let terminal = self.resolve(&params, generation, &tx).await;
		let linked = matches!(
			terminal,
			PageLoadState::Success { .. } | PageLoadState::Empty {
				reason: EmptyReason::EndOfPagination
			}
		);
		self.settle(&params, generation, linked);
		emit(&tx, terminal);
	}

	async fn resolve(&self, params: &LoadParams<K>, generation: u64, tx: &StateSender<K, V>) -> PageLoadState<K, V> {
		let inner = &self.inner;
		let mut local: Option<(LocalPage<K, V>, LoadSource)> = None;
		if params.strategy != LoadStrategy::SkipCache {
			if let Some(page) = self.memory_page(&params.key) {
				emit(tx, PageLoadState::Loading {
					source: LoadSource::MemoryCache,
				});
				local = Some((page, LoadSource::MemoryCache));
			} else if let Some(persistence) = &inner.persistence {
				emit(tx, PageLoadState::Loading {
					source: LoadSource::Database,
				});
				match self.persisted_page(persistence.as_ref(), params).await {
					Ok(Some(page)) => {
						if !self.cache_page(params, &page.0, &page.1, generation) {
							return superseded();
						}
						local = Some((page, LoadSource::Database));
					}
					Ok(None) => {}
					Err(err) => inner.logger.warn("failed to read page from persistence", Some(&err)),
				}
			}
		}

		if params.strategy == LoadStrategy::LocalOnly || (local.is_some() && !inner.also_load_from_network) {
			return match local {
				Some(((record, items), source)) => terminal_for(params.direction, record, items, source, DataOrigin::Cached),
				None => PageLoadState::Empty {
					reason: EmptyReason::NoLocalData,
				},
			};
		}

		emit(tx, PageLoadState::Loading { source: LoadSource::Remote });
		let result = AssertUnwindSafe(inner.source.load(params.clone()))
			.catch_unwind()
			.await
			.unwrap_or_else(|payload| LoadResult::Error(LoadError::from_panic(payload)));
		match result {
			LoadResult::Data(page) => self.normalize(params, page, generation).await,
			LoadResult::Error(err) => match local {
				Some(((record, items), source)) => {
					inner.logger.warn("remote load failed, serving local page", Some(&err));
					terminal_for(params.direction, record, items, source, DataOrigin::Fallback)
				}
				None => PageLoadState::Error(err),
			},
		}
	}

	async fn normalize(&self, params: &LoadParams<K>, page: PageData<K, V>, generation: u64) -> PageLoadState<K, V> {
		let origin = page.origin;
		let record = PageRecord {
			params: params.clone(),
			ids: page.items.iter().map(Item::id).collect(),
			prev_key: page.prev_key,
			next_key: page.next_key,
			origin,
			items_before: page.items_before,
			items_after: page.items_after,
		};
		if !self.cache_page(params, &record, &page.items, generation) {
			return superseded();
		}
		if let Some(persistence) = &self.inner.persistence {
			self.persist_page(persistence.as_ref(), params, &record, &page.items).await;
		}
		terminal_for(params.direction, record, page.items, LoadSource::Remote, origin)
	}

	fn cache_page(&self, params: &LoadParams<K>, record: &PageRecord<K, V::Id>, values: &[V], generation: u64) -> bool {
		let mut items = self.inner.items.lock();
		let mut pages = self.inner.pages.lock();
		if !self.inner.generation.is_current(generation) {
			return false;
		}
		for item in values {
			items.insert(item.id(), item.clone());
		}
		pages.records.insert(params.key.clone(), record.clone());
		true
	}

	async fn persist_page(&self, persistence: &dyn Persistence<K, V>, params: &LoadParams<K>, record: &PageRecord<K, V::Id>, values: &[V]) {
		for item in values {
			if let PersistenceResult::Error(err) = persistence.save_item(item, Some(params)).await {
				self.inner.logger.warn("failed to persist item", Some(&err));
			}
		}
		if let PersistenceResult::Error(err) = persistence.save_page(params, record).await {
			self.inner.logger.warn("failed to persist page", Some(&err));
		}
	}

	fn memory_page(&self, key: &K) -> Option<LocalPage<K, V>> {
		let items = self.inner.items.lock();
		let pages = self.inner.pages.lock();
		let record = pages.records.get(key)?;
		let values = record.ids.iter().map(|id| items.get(id).cloned()).collect::<Option<Vec<_>>>()?;
		Some((record.clone(), values))
	}

	async fn persisted_page(&self, persistence: &dyn Persistence<K, V>, params: &LoadParams<K>) -> Result<Option<LocalPage<K, V>>, PersistenceError> {
		match persistence.exists(params).await {
			PersistenceResult::Success(false) => return Ok(None),
			PersistenceResult::Error(err) => return Err(err),
			PersistenceResult::Success(true) | PersistenceResult::Skipped => {}
		}
		let Some(record) = persistence.get_page(params).await.into_result()?.flatten() else {
			return Ok(None);
		};
		let mut values = Vec::with_capacity(record.ids.len());
		for id in &record.ids {
			let cached = self.cached_item(id);
			let item = match cached {
				Some(item) => item,
				None => match persistence.get_item(id).await.into_result()?.flatten() {
					Some(item) => item,
					None => return Ok(None),
				},
			};
			values.push(item);
		}
		Ok(Some((record, values)))
	}

	fn settle(&self, params: &LoadParams<K>, generation: u64, linked: bool) {
		let mut pages = self.inner.pages.lock();
		if !self.inner.generation.is_current(generation) {
			return;
		}
		if linked {
			pages.chain.finish_load(&params.key, params.direction);
		} else {
			pages.chain.abort_load(&params.key);
		}
	}
}

fn emit<K, V>(tx: &StateSender<K, V>, state: PageLoadState<K, V>) {
	let _ = tx.unbounded_send(state);
}

fn superseded<K, V>() -> PageLoadState<K, V> {
	PageLoadState::SkippingLoad {
		reason: SkipReason::Superseded,
	}
}

fn terminal_for<K, V>(direction: LoadDirection, record: PageRecord<K, V::Id>, items: Vec<V>, source: LoadSource, origin: DataOrigin) -> PageLoadState<K, V>
where
	V: Item,
{
	let has_continuation = match direction {
		LoadDirection::Append => record.next_key.is_some(),
		LoadDirection::Prepend => record.prev_key.is_some(),
	};
	if items.is_empty() && !has_continuation {
		return PageLoadState::Empty {
			reason: EmptyReason::EndOfPagination,
		};
	}
	PageLoadState::Success {
		snapshot: ItemSnapshot::new(items),
		prev_key: record.prev_key,
		next_key: record.next_key,
		source,
		origin,
	}
}
