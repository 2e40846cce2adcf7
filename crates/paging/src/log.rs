use std::error::Error as StdError;

use crate::config::LogSeverity;
use crate::error::DisplayCause;

/// Fire-and-forget logging collaborator.
pub trait PagingLogger: Send + Sync {
	fn debug(&self, message: &str, cause: Option<&(dyn StdError + 'static)>);

	fn warn(&self, message: &str, cause: Option<&(dyn StdError + 'static)>);

	fn error(&self, message: &str, cause: Option<&(dyn StdError + 'static)>);
}

/// Forwards to `tracing` under the `pagewise` target, gated by a [`LogSeverity`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger {
	severity: LogSeverity,
}

impl TracingLogger {
	pub const fn new(severity: LogSeverity) -> Self {
		Self { severity }
	}
}

impl PagingLogger for TracingLogger {
	fn debug(&self, message: &str, cause: Option<&(dyn StdError + 'static)>) {
		if self.severity.allows(LogSeverity::Debug) {
			tracing::debug!(target: "pagewise", cause = %DisplayCause(cause), "{message}");
		}
	}

	fn warn(&self, message: &str, cause: Option<&(dyn StdError + 'static)>) {
		if self.severity.allows(LogSeverity::Warn) {
			tracing::warn!(target: "pagewise", cause = %DisplayCause(cause), "{message}");
		}
	}

	fn error(&self, message: &str, cause: Option<&(dyn StdError + 'static)>) {
		if self.severity.allows(LogSeverity::Error) {
			tracing::error!(target: "pagewise", cause = %DisplayCause(cause), "{message}");
		}
	}
}
