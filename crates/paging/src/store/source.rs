use std::future::Future;

use async_trait::async_trait;

use crate::error::ItemUpdateError;
use crate::types::{Item, LoadParams, LoadResult, RequestKey};

/// Remote (or otherwise authoritative) page loader.
///
/// Failures are returned as [`LoadResult::Error`]. A panic is caught by the
/// store and reported as [`crate::LoadError::Exception`].
#[async_trait]
pub trait PageSource<K: RequestKey, V: Item>: Send + Sync {
	async fn load(&self, params: LoadParams<K>) -> LoadResult<K, V>;
}

/// [`PageSource`] backed by an async closure.
pub struct PageSourceFn<F>(F);

pub fn page_source_fn<F>(load: F) -> PageSourceFn<F> {
	PageSourceFn(load)
}

#[async_trait]
impl<K, V, F, Fut> PageSource<K, V> for PageSourceFn<F>
where
	K: RequestKey,
	V: Item,
	F: Fn(LoadParams<K>) -> Fut + Send + Sync,
	Fut: Future<Output = LoadResult<K, V>> + Send + 'static,
{
	async fn load(&self, params: LoadParams<K>) -> LoadResult<K, V> {
		(self.0)(params).await
	}
}

/// Remote write-through target for item updates.
#[async_trait]
pub trait ItemUpdater<V: Item>: Send + Sync {
	async fn update(&self, id: &V::Id, value: &V) -> Result<(), ItemUpdateError>;
}
