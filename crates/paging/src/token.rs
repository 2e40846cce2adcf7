use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic store generation.
///
/// Invalidation advances the clock; a load started under an older generation
/// must not write its result.
#[derive(Debug, Default, Clone)]
pub(crate) struct GenerationClock {
	current: Arc<AtomicU64>,
}

impl GenerationClock {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn current(&self) -> u64 {
		self.current.load(Ordering::Acquire)
	}

	/// Starts a new generation and returns it.
	pub fn advance(&self) -> u64 {
		self.current.fetch_add(1, Ordering::AcqRel).wrapping_add(1)
	}

	pub fn is_current(&self, generation: u64) -> bool {
		self.current() == generation
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn advance_supersedes_older_generations() {
		let clock = GenerationClock::new();
		let started = clock.current();
		assert!(clock.is_current(started));
		assert_eq!(clock.advance(), started + 1);
		assert!(!clock.is_current(started));

		let shared = clock.clone();
		shared.advance();
		assert_eq!(clock.current(), started + 2);
	}
}
