use std::future::Future;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::error::PagingError;
use crate::types::LoadDirection;

/// Background tasks owned by a pager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum PagerTask {
	/// Consumes dispatched actions.
	Actions,
	/// Sequential load pipeline for one direction.
	Lane(LoadDirection),
	/// Re-evaluates prefetching when accessed extrema move.
	AccessWatcher,
}

impl PagerTask {
	pub(crate) const fn as_str(self) -> &'static str {
		match self {
			Self::Actions => "actions",
			Self::Lane(LoadDirection::Append) => "append_lane",
			Self::Lane(LoadDirection::Prepend) => "prepend_lane",
			Self::AccessWatcher => "access_watcher",
		}
	}
}

/// Configured handle, else the current runtime.
pub(crate) fn runtime_handle(configured: Option<&Handle>) -> Result<Handle, PagingError> {
	if let Some(handle) = configured {
		return Ok(handle.clone());
	}
	Handle::try_current().map_err(|_| PagingError::NoRuntime)
}

pub(crate) fn spawn<F>(handle: &Handle, task: PagerTask, fut: F) -> JoinHandle<F::Output>
where
	F: Future + Send + 'static,
	F::Output: Send + 'static,
{
	tracing::trace!(task = task.as_str(), "paging.spawn");
	handle.spawn(fut)
}
