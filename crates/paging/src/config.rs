//! Pager configuration.
//!
//! [`PagingConfig`] carries everything the engine needs at construction time,
//! including the runtime handle that drives its tasks. The key-independent
//! tuning knobs can also be loaded from TOML as [`PagingSettings`]:
//!
//! ```toml
//! page-size = 25
//! prefetch-distance = 40
//! error-handling = "pass-through"
//! max-retries = 5
//! logging = "debug"
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::coordinator::{ExponentialBackoff, RetryPolicy};
use crate::error::PagingError;

/// How the loading coordinator reacts to a failed page load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorHandlingStrategy {
	/// Retry the failed request with exponential backoff, then surface the error.
	#[default]
	RetryLast,
	/// Clear the failed page and surface the error.
	PassThrough,
	/// Clear the failed page and keep the previous load state.
	Ignore,
}

/// Minimum severity forwarded by [`crate::TracingLogger`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogSeverity {
	Off,
	Error,
	#[default]
	Warn,
	Debug,
}

impl LogSeverity {
	/// Whether a message at `level` passes this threshold.
	pub fn allows(self, level: LogSeverity) -> bool {
		self != Self::Off && level != Self::Off && level <= self
	}
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct PagingConfig<K> {
	pub(crate) initial_key: K,
	pub(crate) page_size: usize,
	pub(crate) prefetch_distance: Option<usize>,
	pub(crate) max_size: Option<usize>,
	pub(crate) jump_threshold: Option<usize>,
	pub(crate) error_handling: ErrorHandlingStrategy,
	pub(crate) retry: RetryPolicy,
	pub(crate) logging: LogSeverity,
	pub(crate) placeholders: bool,
	pub(crate) also_load_from_network: bool,
	pub(crate) event_buffer: usize,
	pub(crate) runtime: Option<tokio::runtime::Handle>,
}

impl<K> PagingConfig<K> {
	/// Defaults: page size 10, prefetch distance twice the page size, no max size,
	/// no jump threshold, [`ErrorHandlingStrategy::RetryLast`] with the default
	/// [`RetryPolicy`], warn-level logging.
	pub fn new(initial_key: K) -> Self {
		Self {
			initial_key,
			page_size: 10,
			prefetch_distance: None,
			max_size: None,
			jump_threshold: None,
			error_handling: ErrorHandlingStrategy::default(),
			retry: RetryPolicy::default(),
			logging: LogSeverity::default(),
			placeholders: false,
			also_load_from_network: false,
			event_buffer: 128,
			runtime: None,
		}
	}

	/// Items expected per page. Also the placeholder count per loading edge.
	#[must_use]
	pub fn page_size(mut self, page_size: usize) -> Self {
		self.page_size = page_size;
		self
	}

	/// Overrides the default of twice the page size.
	#[must_use]
	pub fn prefetch_distance(mut self, distance: usize) -> Self {
		self.prefetch_distance = Some(distance);
		self
	}

	/// Caps the published id list; older ids are trimmed from the far edge.
	#[must_use]
	pub fn max_size(mut self, max_size: usize) -> Self {
		self.max_size = Some(max_size);
		self
	}

	/// Turns a plain enqueue into a jump once this many elements are queued ahead of it.
	#[must_use]
	pub fn jump_threshold(mut self, threshold: usize) -> Self {
		self.jump_threshold = Some(threshold);
		self
	}

	/// Reaction to failed loads.
	#[must_use]
	pub fn error_handling(mut self, strategy: ErrorHandlingStrategy) -> Self {
		self.error_handling = strategy;
		self
	}

	/// Retry budget and backoff for [`ErrorHandlingStrategy::RetryLast`].
	#[must_use]
	pub fn retry(mut self, retry: RetryPolicy) -> Self {
		self.retry = retry;
		self
	}

	/// Threshold of the default [`crate::TracingLogger`].
	#[must_use]
	pub fn logging(mut self, severity: LogSeverity) -> Self {
		self.logging = severity;
		self
	}

	/// Pads the loading edge with `page_size` `None` slots.
	#[must_use]
	pub fn placeholders(mut self, enabled: bool) -> Self {
		self.placeholders = enabled;
		self
	}

	/// Calls the page source even when a `CacheFirst` request hits local data.
	#[must_use]
	pub fn also_load_from_network(mut self, enabled: bool) -> Self {
		self.also_load_from_network = enabled;
		self
	}

	/// Capacity of the broadcast channel carrying every published state.
	#[must_use]
	pub fn event_buffer(mut self, size: usize) -> Self {
		self.event_buffer = size;
		self
	}

	/// Runtime that drives the pager's tasks. Defaults to the current runtime.
	#[must_use]
	pub fn runtime(mut self, handle: tokio::runtime::Handle) -> Self {
		self.runtime = Some(handle);
		self
	}

	/// Applies file-loaded settings over this config.
	#[must_use]
	pub fn with_settings(mut self, settings: &PagingSettings) -> Self {
		self.page_size = settings.page_size;
		self.prefetch_distance = settings.prefetch_distance;
		self.max_size = settings.max_size;
		self.jump_threshold = settings.jump_threshold;
		self.error_handling = settings.error_handling;
		self.retry = settings.retry_policy();
		self.logging = settings.logging;
		self.placeholders = settings.placeholders;
		self.also_load_from_network = settings.also_load_from_network;
		self.event_buffer = settings.event_buffer;
		self
	}

	/// Key of the eager first load and of every reload after invalidation.
	pub fn initial_key(&self) -> &K {
		&self.initial_key
	}

	/// Prefetch distance, defaulting to twice the page size.
	pub fn resolved_prefetch_distance(&self) -> usize {
		self.prefetch_distance.unwrap_or_else(|| self.page_size.saturating_mul(2))
	}

	/// Checks the config before the pager starts.
	///
	/// # Errors
	///
	/// Returns [`PagingError::InvalidConfig`] for a zero page size or event buffer,
	/// a max size below the page size, or a backoff factor or jitter out of range.
	pub fn validate(&self) -> Result<(), PagingError> {
		if self.page_size == 0 {
			return Err(PagingError::InvalidConfig("page size must be > 0".into()));
		}
		if let Some(max) = self.max_size
			&& max < self.page_size
		{
			return Err(PagingError::InvalidConfig(format!("max size {max} is smaller than page size {}", self.page_size)));
		}
		if self.event_buffer == 0 {
			return Err(PagingError::InvalidConfig("event buffer must be > 0".into()));
		}
		let backoff = &self.retry.backoff;
		if backoff.factor.is_nan() || backoff.factor < 1.0 {
			return Err(PagingError::InvalidConfig(format!("backoff factor {} must be >= 1.0", backoff.factor)));
		}
		if !(0.0..=1.0).contains(&backoff.jitter) {
			return Err(PagingError::InvalidConfig(format!("backoff jitter {} must be within 0.0..=1.0", backoff.jitter)));
		}
		Ok(())
	}
}

/// Key-independent tuning knobs, loadable from TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct PagingSettings {
	pub page_size: usize,
	pub prefetch_distance: Option<usize>,
	pub max_size: Option<usize>,
	pub jump_threshold: Option<usize>,
	pub error_handling: ErrorHandlingStrategy,
	pub max_retries: usize,
	pub backoff_initial_ms: u64,
	pub backoff_factor: f64,
	pub backoff_max_ms: u64,
	pub backoff_jitter: f64,
	pub logging: LogSeverity,
	pub placeholders: bool,
	pub also_load_from_network: bool,
	pub event_buffer: usize,
}

impl Default for PagingSettings {
	fn default() -> Self {
		let retry = RetryPolicy::default();
		Self {
			page_size: 10,
			prefetch_distance: None,
			max_size: None,
			jump_threshold: None,
			error_handling: ErrorHandlingStrategy::default(),
			max_retries: retry.max_retries,
			backoff_initial_ms: duration_ms(retry.backoff.initial),
			backoff_factor: retry.backoff.factor,
			backoff_max_ms: duration_ms(retry.backoff.max),
			backoff_jitter: retry.backoff.jitter,
			logging: LogSeverity::default(),
			placeholders: false,
			also_load_from_network: false,
			event_buffer: 128,
		}
	}
}

impl PagingSettings {
	/// Parses settings; missing keys take their defaults, unknown keys are rejected.
	pub fn from_toml_str(input: &str) -> Result<Self, PagingError> {
		Ok(toml::from_str(input)?)
	}

	/// Retry policy described by the backoff fields.
	pub fn retry_policy(&self) -> RetryPolicy {
		RetryPolicy {
			max_retries: self.max_retries,
			backoff: ExponentialBackoff {
				initial: Duration::from_millis(self.backoff_initial_ms),
				factor: self.backoff_factor,
				max: Duration::from_millis(self.backoff_max_ms),
				jitter: self.backoff_jitter,
			},
		}
	}
}

fn duration_ms(duration: Duration) -> u64 {
	u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
