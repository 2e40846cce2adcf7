use std::time::Duration;

use pagewise::{ErrorHandlingStrategy, ExponentialBackoff, LoadDirection, LoadError, LoadState, PagingConfig, PendingJob, RetryPolicy};

use crate::common::{CursorSource, loaded, pager, settled, wait_for_state, wait_until};

#[tokio::test]
async fn initial_load_fills_one_page() {
	let source = CursorSource::new(9);
	let pager = pager(PagingConfig::new(0), &source);

	let state = settled(&pager, 10).await;
	assert_eq!(loaded(&state), (0..10).collect::<Vec<_>>());
	assert_eq!(state.load_states().append, LoadState::incomplete());
	assert!(state.load_states().prepend.end_of_pagination_reached());
	assert_eq!(source.calls(), 1);
}

#[tokio::test]
async fn skip_queue_loads_far_page_without_prefetching() {
	let source = CursorSource::new(9);
	let pager = pager(PagingConfig::new(0), &source);
	settled(&pager, 10).await;
	let mut events = pager.subscribe();

	pager.skip_queue(6, LoadDirection::Append).expect("pager running");
	let loading = events.recv().await.expect("loading published");
	assert!(loading.load_states().append.is_loading());
	let done = events.recv().await.expect("data published");
	assert!(done.load_states().append.is_not_loading());

	let ids = loaded(&done);
	assert_eq!(ids.len(), 20);
	assert_eq!(&ids[..10], &(0..10).collect::<Vec<_>>()[..]);
	assert_eq!(&ids[10..], &(60..70).collect::<Vec<_>>()[..]);
	let queued: Vec<u32> = pager.queues().append_queue().snapshot().into_iter().map(|element| element.params.key).collect();
	assert_eq!(queued, vec![1, 7]);
	assert_eq!(source.calls(), 2);
}

#[tokio::test]
async fn ignored_failure_keeps_previous_state() {
	let source = CursorSource::new(9);
	let pager = pager(PagingConfig::new(0).error_handling(ErrorHandlingStrategy::Ignore), &source);
	let before = settled(&pager, 10).await.load_states().append.clone();
	let mut events = pager.subscribe();

	source.fail_next(1);
	pager.process_queue(LoadDirection::Append).expect("pager running");
	let completed = Some(PendingJob {
		in_flight: false,
		completed: true,
	});
	assert!(wait_until(Duration::from_secs(5), || pager.queues().pending_job(&1) == completed).await);

	let mut seen = Vec::new();
	while let Ok(state) = events.try_recv() {
		seen.push(state);
	}
	assert!(!seen.is_empty());
	assert!(seen.iter().all(|state| !state.load_states().has_error()));
	assert_eq!(pager.state().load_states().append, before);
	assert!(pager.store().page(&1).is_none());
	assert_eq!(source.calls(), 2);
}

#[tokio::test]
async fn each_access_prefetches_one_page() {
	let source = CursorSource::new(9);
	let pager = pager(PagingConfig::new(5).prefetch_distance(2), &source);
	settled(&pager, 10).await;
	let mut events = pager.subscribe();

	pager.record_access(50);
	settled(&pager, 20).await;
	pager.record_access(40);
	let state = settled(&pager, 30).await;
	assert_eq!(loaded(&state).first(), Some(&30));

	let mut transitions = Vec::new();
	while let Ok(state) = events.try_recv() {
		transitions.push((state.load_states().prepend.is_loading(), state.loaded_ids().count()));
	}
	assert_eq!(transitions, vec![(true, 10), (false, 20), (true, 20), (false, 30)]);
	assert_eq!(source.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn retries_stop_after_budget() {
	let source = CursorSource::new(9);
	source.fail_next(usize::MAX);
	let retry = RetryPolicy {
		max_retries: 2,
		backoff: ExponentialBackoff::fixed(Duration::from_millis(10)),
	};
	let pager = pager(PagingConfig::new(0).retry(retry), &source);

	let state = wait_for_state(&pager, |state| state.load_states().refresh.is_error()).await;
	assert!(state.load_states().append.is_error());
	assert_eq!(source.calls(), 3);
	assert!(state.is_empty());
}

#[tokio::test]
async fn pass_through_surfaces_error_until_invalidated() {
	let source = CursorSource::new(9);
	source.fail_next(1);
	let pager = pager(PagingConfig::new(0).error_handling(ErrorHandlingStrategy::PassThrough), &source);

	let state = wait_for_state(&pager, |state| state.load_states().append.is_error()).await;
	assert_eq!(state.load_states().refresh, LoadState::Error(LoadError::message("boom")));
	assert_eq!(source.calls(), 1);

	pager.invalidate().expect("pager running");
	let state = settled(&pager, 10).await;
	assert!(!state.load_states().has_error());
}

#[tokio::test]
async fn invalidate_reloads_from_initial_key() {
	let source = CursorSource::new(9);
	let pager = pager(PagingConfig::new(0).prefetch_distance(2), &source);
	settled(&pager, 10).await;
	pager.process_queue(LoadDirection::Append).expect("pager running");
	settled(&pager, 20).await;
	pager.record_access(3);
	let generation = pager.store().generation();

	pager.invalidate().expect("pager running");
	let state = settled(&pager, 10).await;
	assert_eq!(loaded(&state), (0..10).collect::<Vec<_>>());
	assert_eq!(pager.store().generation(), generation + 1);
	assert_eq!(pager.fetching_state().max_item_accessed_so_far, None);
	assert_eq!(source.calls(), 3);
}

#[tokio::test]
async fn same_key_is_never_loaded_twice_at_once() {
	let source = CursorSource::gated(9);
	let pager = pager(PagingConfig::new(0), &source);
	assert!(wait_until(Duration::from_secs(5), || source.calls() == 1).await);

	pager.skip_queue(0, LoadDirection::Prepend).expect("pager running");
	tokio::time::sleep(Duration::from_millis(50)).await;
	assert!(pager.queues().prepend_queue().is_empty());
	assert_eq!(pager.queues().pending_job(&0).map(|job| job.in_flight), Some(true));

	source.release(1);
	settled(&pager, 10).await;
	assert_eq!(source.calls(), 1);
}
