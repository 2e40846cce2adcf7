use std::sync::Arc;

use async_trait::async_trait;

use crate::types::{LoadParams, RequestKey};

/// Rewrites load params before they reach the store.
///
/// Implementations call [`Next::run`] to continue the chain, and may change
/// the params before or after doing so.
#[async_trait]
pub trait Middleware<K: RequestKey>: Send + Sync {
	async fn handle(&self, params: LoadParams<K>, next: Next<'_, K>) -> LoadParams<K>;
}

/// Remainder of a middleware chain.
pub struct Next<'a, K> {
	rest: &'a [Arc<dyn Middleware<K>>],
}

impl<K: RequestKey> Next<'_, K> {
	/// Runs the remaining middleware. The end of the chain returns `params` as is.
	pub async fn run(self, params: LoadParams<K>) -> LoadParams<K> {
		match self.rest.split_first() {
			Some((head, rest)) => head.handle(params, Next { rest }).await,
			None => params,
		}
	}
}

/// Ordered middleware layers.
pub struct MiddlewareChain<K> {
	layers: Vec<Arc<dyn Middleware<K>>>,
}

impl<K> Default for MiddlewareChain<K> {
	fn default() -> Self {
		Self { layers: Vec::new() }
	}
}

impl<K: RequestKey> MiddlewareChain<K> {
	pub fn new(layers: Vec<Arc<dyn Middleware<K>>>) -> Self {
		Self { layers }
	}

	pub fn push(&mut self, layer: Arc<dyn Middleware<K>>) {
		self.layers.push(layer);
	}

	pub fn len(&self) -> usize {
		self.layers.len()
	}

	pub fn is_empty(&self) -> bool {
		self.layers.is_empty()
	}

	pub async fn run(&self, params: LoadParams<K>) -> LoadParams<K> {
		Next { rest: &self.layers }.run(params).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::types::LoadStrategy;

	struct Offset(u32);

	#[async_trait]
	impl Middleware<u32> for Offset {
		async fn handle(&self, mut params: LoadParams<u32>, next: Next<'_, u32>) -> LoadParams<u32> {
			params.key += self.0;
			next.run(params).await
		}
	}

	struct ForceRemote;

	#[async_trait]
	impl Middleware<u32> for ForceRemote {
		async fn handle(&self, params: LoadParams<u32>, next: Next<'_, u32>) -> LoadParams<u32> {
			next.run(params).await.with_strategy(LoadStrategy::SkipCache)
		}
	}

	#[tokio::test]
	async fn layers_run_in_order() {
		let layers: Vec<Arc<dyn Middleware<u32>>> = vec![Arc::new(Offset(1)) as Arc<dyn Middleware<u32>>, Arc::new(ForceRemote), Arc::new(Offset(10))];
		let chain = MiddlewareChain::new(layers);
		let params = chain.run(LoadParams::append(0)).await;
		assert_eq!(params.key, 11);
		assert_eq!(params.strategy, LoadStrategy::SkipCache);
	}

	#[tokio::test]
	async fn empty_chain_is_identity() {
		let chain = MiddlewareChain::<u32>::default();
		assert!(chain.is_empty());
		assert_eq!(chain.run(LoadParams::prepend(4)).await, LoadParams::prepend(4));
	}
}
