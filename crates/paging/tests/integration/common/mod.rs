//! Common utilities for pager integration tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use pagewise::{Item, LoadParams, LoadResult, PageData, PageSource, Pager, PagingConfig, PagingState};
use tokio::sync::Semaphore;

#[derive(Debug, Clone, PartialEq)]
pub struct Article {
	pub id: u64,
	pub headline: String,
}

impl Article {
	pub fn new(id: u64) -> Self {
		Self {
			id,
			headline: format!("headline {id}"),
		}
	}
}

impl Item for Article {
	type Id = u64;

	fn id(&self) -> u64 {
		self.id
	}
}

/// Page `k` holds ids `10k..10k+9` for `k` in `0..=last_page`.
pub struct CursorSource {
	last_page: u32,
	calls: AtomicUsize,
	failures: AtomicUsize,
	gate: Option<Semaphore>,
}

impl CursorSource {
	pub fn new(last_page: u32) -> Arc<Self> {
		Arc::new(Self {
			last_page,
			calls: AtomicUsize::new(0),
			failures: AtomicUsize::new(0),
			gate: None,
		})
	}

	/// Every load waits for one [`CursorSource::release`] permit.
	pub fn gated(last_page: u32) -> Arc<Self> {
		Arc::new(Self {
			last_page,
			calls: AtomicUsize::new(0),
			failures: AtomicUsize::new(0),
			gate: Some(Semaphore::new(0)),
		})
	}

	pub fn release(&self, loads: usize) {
		if let Some(gate) = &self.gate {
			gate.add_permits(loads);
		}
	}

	pub fn fail_next(&self, count: usize) {
		self.failures.store(count, Ordering::SeqCst);
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}
}

#[async_trait]
impl PageSource<u32, Article> for CursorSource {
	async fn load(&self, params: LoadParams<u32>) -> LoadResult<u32, Article> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		if let Some(gate) = &self.gate
			&& let Ok(permit) = gate.acquire().await
		{
			permit.forget();
		}
		if self.failures.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_ok() {
			return LoadResult::message("boom");
		}
		if params.key > self.last_page {
			return PageData::new(Vec::new()).into();
		}
		let start = u64::from(params.key) * 10;
		PageData::new((start..start + 10).map(Article::new).collect())
			.prev_key(params.key.checked_sub(1))
			.next_key((params.key < self.last_page).then_some(params.key + 1))
			.into()
	}
}

pub fn pager(config: PagingConfig<u32>, source: &Arc<CursorSource>) -> Pager<u32, Article> {
	let _ = tracing_subscriber::fmt::try_init();
	Pager::builder(config, Arc::clone(source) as Arc<dyn PageSource<u32, Article>>)
		.build()
		.expect("pager builds")
}

pub fn loaded(state: &PagingState<u64>) -> Vec<u64> {
	state.loaded_ids().copied().collect()
}

/// Waits until the latest published state satisfies `done`.
pub async fn wait_for_state(pager: &Pager<u32, Article>, done: impl Fn(&PagingState<u64>) -> bool) -> PagingState<u64> {
	let mut rx = pager.watch();
	let reached = tokio::time::timeout(Duration::from_secs(5), async {
		loop {
			{
				let state = rx.borrow_and_update();
				if done(&state) {
					return state.clone();
				}
			}
			if rx.changed().await.is_err() {
				panic!("pager state channel closed");
			}
		}
	})
	.await;
	reached.expect("state reached before timeout")
}

/// Waits for the initial load to settle with `expected` ids.
pub async fn settled(pager: &Pager<u32, Article>, expected: usize) -> PagingState<u64> {
	wait_for_state(pager, |state| state.loaded_ids().count() == expected && state.load_states().is_idle()).await
}

/// Polls a condition with a timeout.
pub async fn wait_until(timeout: Duration, mut f: impl FnMut() -> bool) -> bool {
	let start = tokio::time::Instant::now();
	while start.elapsed() < timeout {
		if f() {
			return true;
		}
		tokio::time::sleep(Duration::from_millis(5)).await;
	}
	false
}
