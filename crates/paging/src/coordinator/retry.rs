use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::types::RequestKey;

/// Exponential backoff with proportional jitter.
///
/// Retry `n` (zero-based) waits `initial * factor^n`, capped at `max`, then
/// scaled by a uniform factor in `1 - jitter ..= 1 + jitter` and capped again.
#[derive(Debug, Clone, PartialEq)]
pub struct ExponentialBackoff {
	pub initial: Duration,
	pub factor: f64,
	pub max: Duration,
	pub jitter: f64,
}

impl Default for ExponentialBackoff {
	fn default() -> Self {
		Self {
			initial: Duration::from_millis(50),
			factor: 2.0,
			max: Duration::from_secs(5),
			jitter: 0.2,
		}
	}
}

impl ExponentialBackoff {
	/// Backoff without jitter.
	pub fn fixed(delay: Duration) -> Self {
		Self {
			initial: delay,
			factor: 1.0,
			max: delay,
			jitter: 0.0,
		}
	}

	/// Delay before retry `retry_count`, without jitter.
	pub fn base_delay(&self, retry_count: usize) -> Duration {
		let exponent = i32::try_from(retry_count).unwrap_or(i32::MAX);
		let secs = self.initial.as_secs_f64() * self.factor.powi(exponent);
		if !secs.is_finite() || secs >= self.max.as_secs_f64() {
			return self.max;
		}
		Duration::from_secs_f64(secs.max(0.0))
	}

	/// Delay before retry `retry_count`, with jitter applied.
	pub fn delay(&self, retry_count: usize) -> Duration {
		let base = self.base_delay(retry_count);
		if self.jitter <= 0.0 || base.is_zero() {
			return base;
		}
		let spread = self.jitter.min(1.0) * (2.0 * rand::random::<f64>() - 1.0);
		let secs = base.as_secs_f64() * (1.0 + spread);
		Duration::from_secs_f64(secs.max(0.0)).min(self.max)
	}

	/// Waits out the delay for `retry_count`, then runs `block`.
	pub async fn execute<F, Fut, T>(&self, retry_count: usize, block: F) -> T
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = T>,
	{
		let delay = self.delay(retry_count);
		if delay > Duration::ZERO {
			tokio::time::sleep(delay).await;
		}
		block().await
	}
}

/// Retry budget applied under [`crate::ErrorHandlingStrategy::RetryLast`].
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
	pub max_retries: usize,
	pub backoff: ExponentialBackoff,
}

impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			max_retries: 3,
			backoff: ExponentialBackoff::default(),
		}
	}
}

impl RetryPolicy {
	pub fn never() -> Self {
		Self {
			max_retries: 0,
			backoff: ExponentialBackoff::default(),
		}
	}

	/// Returns the delay before the next retry, or `None` once the budget is spent.
	pub fn retry_delay(&self, retry_count: usize) -> Option<Duration> {
		(retry_count < self.max_retries).then(|| self.backoff.delay(retry_count))
	}
}

/// Consecutive failure counts per request key.
#[derive(Debug)]
pub struct RetryBookkeeper<K> {
	counts: Mutex<FxHashMap<K, usize>>,
}

impl<K> Default for RetryBookkeeper<K> {
	fn default() -> Self {
		Self {
			counts: Mutex::new(FxHashMap::default()),
		}
	}
}

impl<K: RequestKey> RetryBookkeeper<K> {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn count(&self, key: &K) -> usize {
		self.counts.lock().get(key).copied().unwrap_or(0)
	}

	/// Records one more failure and returns the updated count.
	pub fn increment(&self, key: &K) -> usize {
		let mut counts = self.counts.lock();
		let count = counts.entry(key.clone()).or_insert(0);
		*count = count.saturating_add(1);
		*count
	}

	pub fn reset(&self, key: &K) {
		self.counts.lock().remove(key);
	}

	pub fn clear(&self) {
		self.counts.lock().clear();
	}
}
