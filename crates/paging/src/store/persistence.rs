use async_trait::async_trait;

use super::cache::PageRecord;
use crate::error::PersistenceError;
use crate::types::{Item, LoadParams, RequestKey};

/// Outcome of one persistence call. `Skipped` is a no-op, not a failure.
#[derive(Debug, Clone)]
pub enum PersistenceResult<T> {
	Success(T),
	Error(PersistenceError),
	Skipped,
}

impl<T> PersistenceResult<T> {
	pub fn is_success(&self) -> bool {
		matches!(self, Self::Success(_))
	}

	/// `Skipped` maps to `Ok(None)`.
	pub fn into_result(self) -> Result<Option<T>, PersistenceError> {
		match self {
			Self::Success(value) => Ok(Some(value)),
			Self::Error(err) => Err(err),
			Self::Skipped => Ok(None),
		}
	}
}

/// Durable key/value store behind the in-memory caches.
#[async_trait]
pub trait Persistence<K: RequestKey, V: Item>: Send + Sync {
	async fn get_item(&self, id: &V::Id) -> PersistenceResult<Option<V>>;

	async fn save_item(&self, item: &V, params: Option<&LoadParams<K>>) -> PersistenceResult<()>;

	async fn remove_item(&self, id: &V::Id) -> PersistenceResult<()>;

	async fn clear_all_items(&self) -> PersistenceResult<()>;

	async fn exists(&self, params: &LoadParams<K>) -> PersistenceResult<bool>;

	async fn save_page(&self, params: &LoadParams<K>, page: &PageRecord<K, V::Id>) -> PersistenceResult<()>;

	async fn get_page(&self, params: &LoadParams<K>) -> PersistenceResult<Option<PageRecord<K, V::Id>>>;

	async fn remove_page(&self, params: &LoadParams<K>) -> PersistenceResult<()>;

	async fn clear_all_pages(&self) -> PersistenceResult<()>;
}
