//! Self-updating item handles.
//!
//! [`ItemProvider`] hands out one [`SelfUpdatingItem`] per id. Reads go
//! through an immutable map snapshot; a miss takes the create lock, checks
//! again, and publishes a new snapshot with the fresh handle.
//!
//! A handle publishes [`ItemState`] on a `watch` channel. Events are applied
//! one at a time per handle. [`ItemEvent::Update`] publishes the new value
//! immediately, writes it through the store and the optional [`ItemUpdater`],
//! and reverts to the previous value if either write fails.

use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::watch;

use crate::error::LoadError;
use crate::log::PagingLogger;
use crate::store::{ItemUpdater, NormalizedStore};
use crate::types::{Item, RequestKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ItemLoadState {
	#[default]
	Initial,
	Loading,
	Refreshing,
	Loaded,
	Error,
	Cleared,
}

/// Published value of one item handle.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemState<V> {
	pub item: Option<V>,
	pub load_state: ItemLoadState,
	/// Bumped on every change of `item`.
	pub version: u64,
	pub error: Option<LoadError>,
}

impl<V> Default for ItemState<V> {
	fn default() -> Self {
		Self {
			item: None,
			load_state: ItemLoadState::Initial,
			version: 0,
			error: None,
		}
	}
}

impl<V> ItemState<V> {
	/// No value yet and one may still arrive.
	pub fn is_placeholder(&self) -> bool {
		self.item.is_none() && matches!(self.load_state, ItemLoadState::Initial | ItemLoadState::Loading | ItemLoadState::Refreshing)
	}
}

#[derive(Debug, Clone)]
pub enum ItemEvent<V> {
	/// Loads the item from the store unless it is already loaded.
	Init,
	/// Reloads the item from the store.
	Refresh,
	/// Drops the published value; the store keeps its copy.
	Clear,
	/// Replaces the value and writes it through.
	Update(V),
}

impl<V> ItemEvent<V> {
	pub const fn as_str(&self) -> &'static str {
		match self {
			Self::Init => "init",
			Self::Refresh => "refresh",
			Self::Clear => "clear",
			Self::Update(_) => "update",
		}
	}
}

/// Observable handle for a single item id.
pub struct SelfUpdatingItem<K: RequestKey, V: Item> {
	id: V::Id,
	store: NormalizedStore<K, V>,
	updater: Option<Arc<dyn ItemUpdater<V>>>,
	logger: Arc<dyn PagingLogger>,
	state: watch::Sender<ItemState<V>>,
	events: tokio::sync::Mutex<()>,
}

impl<K: RequestKey, V: Item> SelfUpdatingItem<K, V> {
	pub(crate) fn new(id: V::Id, store: NormalizedStore<K, V>, updater: Option<Arc<dyn ItemUpdater<V>>>, logger: Arc<dyn PagingLogger>) -> Self {
		let initial = match store.cached_item(&id) {
			Some(item) => ItemState {
				item: Some(item),
				load_state: ItemLoadState::Loaded,
				version: 1,
				error: None,
			},
			None => ItemState::default(),
		};
		let (state, _) = watch::channel(initial);
		Self {
			id,
			store,
			updater,
			logger,
			state,
			events: tokio::sync::Mutex::new(()),
		}
	}

	pub fn id(&self) -> &V::Id {
		&self.id
	}

	pub fn state(&self) -> ItemState<V> {
		self.state.borrow().clone()
	}

	pub fn subscribe(&self) -> watch::Receiver<ItemState<V>> {
		self.state.subscribe()
	}

	pub async fn send(&self, event: ItemEvent<V>) {
		let _serial = self.events.lock().await;
		tracing::trace!(id = ?self.id, event = event.as_str(), "paging.item.event");
		match event {
			ItemEvent::Init => {
				if matches!(self.state.borrow().load_state, ItemLoadState::Initial | ItemLoadState::Cleared) {
					self.load(ItemLoadState::Loading).await;
				}
			}
			ItemEvent::Refresh => self.load(ItemLoadState::Refreshing).await,
			ItemEvent::Clear => self.state.send_modify(|state| {
				state.item = None;
				state.load_state = ItemLoadState::Cleared;
				state.version += 1;
				state.error = None;
			}),
			ItemEvent::Update(value) => self.update(value).await,
		}
	}

	async fn load(&self, pending: ItemLoadState) {
		self.state.send_modify(|state| state.load_state = pending);
		let outcome = self.store.get_item(&self.id).await;
		self.state.send_modify(|state| match outcome {
			Ok(Some(item)) => {
				state.item = Some(item);
				state.load_state = ItemLoadState::Loaded;
				state.version += 1;
				state.error = None;
			}
			Ok(None) => {
				state.load_state = ItemLoadState::Error;
				state.error = Some(LoadError::message(format!("item {:?} not found", self.id)));
			}
			Err(err) => {
				state.load_state = ItemLoadState::Error;
				state.error = Some(LoadError::exception(err));
			}
		});
	}

	async fn update(&self, value: V) {
		if value.id() != self.id {
			self.logger.warn(&format!("update for item {:?} carries id {:?}, ignoring", self.id, value.id()), None);
			return;
		}
		let previous = self.state();
		self.state.send_modify(|state| {
			state.item = Some(value.clone());
			state.load_state = ItemLoadState::Loaded;
			state.version += 1;
			state.error = None;
		});

		let written = match self.store.write_item(value.clone()).await {
			Ok(()) => match &self.updater {
				Some(updater) => updater.update(&self.id, &value).await.map_err(LoadError::exception),
				None => Ok(()),
			},
			Err(err) => Err(LoadError::exception(err)),
		};
		let Err(cause) = written else {
			return;
		};

		self.logger.warn(&format!("update of item {:?} failed, reverting", self.id), Some(&cause));
		let restored = match &previous.item {
			Some(item) => self.store.write_item(item.clone()).await,
			None => self.store.remove_item(&self.id).await,
		};
		if let Err(err) = restored {
			self.logger.error(&format!("failed to restore item {:?}", self.id), Some(&err));
		}
		self.state.send_modify(|state| {
			state.item = previous.item;
			state.load_state = ItemLoadState::Error;
			state.version += 1;
			state.error = Some(cause);
		});
	}
}

type HandleMap<K, V> = FxHashMap<<V as Item>::Id, Arc<SelfUpdatingItem<K, V>>>;

/// Lazily created, cached [`SelfUpdatingItem`]s keyed by id.
pub struct ItemProvider<K: RequestKey, V: Item> {
	handles: ArcSwap<HandleMap<K, V>>,
	create: Mutex<()>,
	store: NormalizedStore<K, V>,
	updater: Option<Arc<dyn ItemUpdater<V>>>,
	logger: Arc<dyn PagingLogger>,
}

impl<K: RequestKey, V: Item> ItemProvider<K, V> {
	pub fn new(store: NormalizedStore<K, V>, updater: Option<Arc<dyn ItemUpdater<V>>>, logger: Arc<dyn PagingLogger>) -> Self {
		Self {
			handles: ArcSwap::from_pointee(FxHashMap::default()),
			create: Mutex::new(()),
			store,
			updater,
			logger,
		}
	}

	/// Returns the handle for `id`, creating it on first use.
	pub fn get(&self, id: V::Id) -> Arc<SelfUpdatingItem<K, V>> {
		if let Some(handle) = self.handles.load().get(&id) {
			return Arc::clone(handle);
		}
		let _create = self.create.lock();
		let current = self.handles.load_full();
		if let Some(handle) = current.get(&id) {
			return Arc::clone(handle);
		}
		let handle = Arc::new(SelfUpdatingItem::new(id.clone(), self.store.clone(), self.updater.clone(), Arc::clone(&self.logger)));
		let mut next = (*current).clone();
		next.insert(id, Arc::clone(&handle));
		self.handles.store(Arc::new(next));
		handle
	}

	/// Evicts the handle for `id`. Existing `Arc`s stay usable.
	pub fn remove(&self, id: &V::Id) -> bool {
		let _create = self.create.lock();
		let current = self.handles.load_full();
		if !current.contains_key(id) {
			return false;
		}
		let mut next = (*current).clone();
		next.remove(id);
		self.handles.store(Arc::new(next));
		true
	}

	pub fn clear(&self) {
		let _create = self.create.lock();
		self.handles.store(Arc::new(FxHashMap::default()));
	}

	pub fn len(&self) -> usize {
		self.handles.load().len()
	}

	pub fn is_empty(&self) -> bool {
		self.handles.load().is_empty()
	}
}
