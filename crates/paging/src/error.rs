use std::any::Any;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

/// Shared, clonable error cause.
pub type ErrorCause = Arc<dyn StdError + Send + Sync>;

/// Failure reported by a page load.
///
/// Load failures never cross component boundaries as panics or `Err` values;
/// they travel as data inside [`crate::LoadResult::Error`],
/// [`crate::store::PageLoadState::Error`] and [`crate::LoadState::Error`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum LoadError {
	/// User-facing message.
	#[error("{0}")]
	Message(String),
	/// Underlying cause raised by the page source or a collaborator.
	#[error("{0}")]
	Exception(ErrorCause),
}

impl LoadError {
	pub fn message(message: impl Into<String>) -> Self {
		Self::Message(message.into())
	}

	pub fn exception(err: impl StdError + Send + Sync + 'static) -> Self {
		Self::Exception(Arc::new(err))
	}

	/// Maps a caught panic payload from a page source.
	pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
		let detail = payload
			.downcast_ref::<&str>()
			.map(|s| (*s).to_string())
			.or_else(|| payload.downcast_ref::<String>().cloned())
			.unwrap_or_else(|| "unknown panic payload".to_string());
		Self::exception(SourcePanicked(detail))
	}
}

impl PartialEq for LoadError {
	fn eq(&self, other: &Self) -> bool {
		match (self, other) {
			(Self::Message(a), Self::Message(b)) => a == b,
			(Self::Exception(a), Self::Exception(b)) => Arc::ptr_eq(a, b) || a.to_string() == b.to_string(),
			_ => false,
		}
	}
}

#[derive(Debug, thiserror::Error)]
#[error("page source panicked: {0}")]
struct SourcePanicked(String);

/// Error arm of [`crate::store::PersistenceResult`].
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct PersistenceError {
	pub message: String,
	#[source]
	pub cause: Option<ErrorCause>,
}

impl PersistenceError {
	pub fn new(message: impl Into<String>) -> Self {
		Self {
			message: message.into(),
			cause: None,
		}
	}

	#[must_use]
	pub fn with_cause(mut self, cause: impl StdError + Send + Sync + 'static) -> Self {
		self.cause = Some(Arc::new(cause));
		self
	}
}

/// Store-level failure surfaced to callers of the normalized store.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum StoreError {
	/// The persistence collaborator reported an error.
	#[error("persistence failed to {operation}: {source}")]
	Persistence {
		operation: &'static str,
		#[source]
		source: PersistenceError,
	},
}

impl StoreError {
	pub(crate) fn persistence(operation: &'static str, source: PersistenceError) -> Self {
		Self::Persistence { operation, source }
	}
}

/// Rejection from the item updater collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ItemUpdateError {
	pub message: String,
}

impl ItemUpdateError {
	pub fn new(message: impl Into<String>) -> Self {
		Self { message: message.into() }
	}
}

/// Errors raised by the [`crate::Pager`] façade.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum PagingError {
	/// No tokio runtime handle was configured and none is current.
	#[error("no tokio runtime available to drive the pager")]
	NoRuntime,
	/// The pager has shut down and no longer accepts actions.
	#[error("pager has shut down")]
	Closed,
	/// Configuration failed validation.
	#[error("invalid paging config: {0}")]
	InvalidConfig(String),
	/// Normalized store failure.
	#[error(transparent)]
	Store(#[from] StoreError),
	/// Paging settings could not be parsed.
	#[error("failed to parse paging settings: {0}")]
	Settings(#[from] toml::de::Error),
}

pub(crate) struct DisplayCause<'a>(pub(crate) Option<&'a (dyn StdError + 'static)>);

impl fmt::Display for DisplayCause<'_> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self.0 {
			Some(cause) => write!(f, "{cause}"),
			None => f.write_str("-"),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn panic_payloads_become_exceptions() {
		let err = LoadError::from_panic(Box::new("boom"));
		assert!(matches!(err, LoadError::Exception(_)));
		assert_eq!(err.to_string(), "page source panicked: boom");

		let err = LoadError::from_panic(Box::new(String::from("owned")));
		assert_eq!(err.to_string(), "page source panicked: owned");
	}

	#[test]
	fn store_error_keeps_persistence_source() {
		let err = StoreError::persistence("clear items", PersistenceError::new("disk full"));
		assert_eq!(err.to_string(), "persistence failed to clear items: disk full");
		assert!(err.source().is_some());
	}
}
