//! Fixtures shared by unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::PersistenceError;
use crate::store::{PageRecord, PageSource, Persistence, PersistenceResult};
use crate::types::{Item, LoadParams, LoadResult, PageData};

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Post {
	pub id: i64,
	pub title: String,
}

impl Post {
	pub fn new(id: i64) -> Self {
		Self { id, title: format!("post {id}") }
	}
}

impl Item for Post {
	type Id = i64;

	fn id(&self) -> i64 {
		self.id
	}
}

/// Page `k` holds ids `10k..10k+9`; keys run from 0 to `last_page`.
pub(crate) struct NumberedSource {
	pub last_page: u32,
	pub calls: AtomicUsize,
	pub failures: AtomicUsize,
	pub hollow: Mutex<FxHashSet<u32>>,
}

impl NumberedSource {
	pub fn new(last_page: u32) -> Self {
		Self {
			last_page,
			calls: AtomicUsize::new(0),
			failures: AtomicUsize::new(0),
			hollow: Mutex::new(FxHashSet::default()),
		}
	}

	/// Page `key` comes back without items but keeps its neighbour keys.
	pub fn hollow(&self, key: u32) {
		self.hollow.lock().insert(key);
	}

	/// Fails the next `count` loads.
	pub fn fail_next(&self, count: usize) {
		self.failures.store(count, Ordering::SeqCst);
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}
}

#[async_trait]
impl PageSource<u32, Post> for NumberedSource {
	async fn load(&self, params: LoadParams<u32>) -> LoadResult<u32, Post> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		if self.failures.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_ok() {
			return LoadResult::message("boom");
		}
		if params.key > self.last_page {
			return PageData::new(Vec::new()).into();
		}
		let start = i64::from(params.key) * 10;
		let items = if self.hollow.lock().contains(&params.key) {
			Vec::new()
		} else {
			(start..start + 10).map(Post::new).collect()
		};
		PageData::new(items)
			.prev_key(params.key.checked_sub(1))
			.next_key((params.key < self.last_page).then_some(params.key + 1))
			.into()
	}
}

#[derive(Default)]
pub(crate) struct MemoryPersistence {
	pub items: Mutex<FxHashMap<i64, Post>>,
	pub pages: Mutex<FxHashMap<u32, PageRecord<u32, i64>>>,
	pub fail_clear: AtomicBool,
}

#[async_trait]
impl Persistence<u32, Post> for MemoryPersistence {
	async fn get_item(&self, id: &i64) -> PersistenceResult<Option<Post>> {
		PersistenceResult::Success(self.items.lock().get(id).cloned())
	}

	async fn save_item(&self, item: &Post, _params: Option<&LoadParams<u32>>) -> PersistenceResult<()> {
		self.items.lock().insert(item.id, item.clone());
		PersistenceResult::Success(())
	}

	async fn remove_item(&self, id: &i64) -> PersistenceResult<()> {
		self.items.lock().remove(id);
		PersistenceResult::Success(())
	}

	async fn clear_all_items(&self) -> PersistenceResult<()> {
		if self.fail_clear.load(Ordering::SeqCst) {
			return PersistenceResult::Error(PersistenceError::new("disk full"));
		}
		self.items.lock().clear();
		PersistenceResult::Success(())
	}

	async fn exists(&self, params: &LoadParams<u32>) -> PersistenceResult<bool> {
		PersistenceResult::Success(self.pages.lock().contains_key(&params.key))
	}

	async fn save_page(&self, params: &LoadParams<u32>, page: &PageRecord<u32, i64>) -> PersistenceResult<()> {
		self.pages.lock().insert(params.key, page.clone());
		PersistenceResult::Success(())
	}

	async fn get_page(&self, params: &LoadParams<u32>) -> PersistenceResult<Option<PageRecord<u32, i64>>> {
		PersistenceResult::Success(self.pages.lock().get(&params.key).cloned())
	}

	async fn remove_page(&self, params: &LoadParams<u32>) -> PersistenceResult<()> {
		self.pages.lock().remove(&params.key);
		PersistenceResult::Success(())
	}

	async fn clear_all_pages(&self) -> PersistenceResult<()> {
		self.pages.lock().clear();
		PersistenceResult::Success(())
	}
}
