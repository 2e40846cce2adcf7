use std::sync::Arc;

use futures::StreamExt;
use pagewise::{ItemEvent, ItemLoadState, LoadDirection, Operation, PageSource, Pager, PagingConfig, PagingError};

use crate::common::{Article, CursorSource, loaded, pager, settled};

fn queued(pager: &Pager<u32, Article>) -> Vec<u32> {
	pager.queues().append_queue().snapshot().into_iter().map(|element| element.params.key).collect()
}

#[tokio::test]
async fn jump_discards_earlier_continuations() {
	let source = CursorSource::new(9);
	let pager = pager(PagingConfig::new(0), &source);
	settled(&pager, 10).await;
	assert_eq!(queued(&pager), vec![1]);

	pager.jump(4, LoadDirection::Append).expect("pager running");
	let state = settled(&pager, 20).await;
	assert_eq!(&loaded(&state)[10..], &(40..50).collect::<Vec<_>>()[..]);
	assert_eq!(queued(&pager), vec![5]);
	assert_eq!(source.calls(), 2);
}

#[tokio::test]
async fn enqueue_behind_threshold_becomes_jump() {
	let source = CursorSource::new(9);
	let pager = pager(PagingConfig::new(0).jump_threshold(1), &source);
	settled(&pager, 10).await;

	pager.enqueue(3, LoadDirection::Append).expect("pager running");
	let state = settled(&pager, 20).await;
	assert_eq!(loaded(&state)[10], 30);
	assert_eq!(queued(&pager), vec![4]);
}

#[tokio::test]
async fn enqueue_below_threshold_drains_in_order() {
	let source = CursorSource::new(9);
	let pager = pager(PagingConfig::new(0), &source);
	settled(&pager, 10).await;

	pager.enqueue(3, LoadDirection::Append).expect("pager running");
	let state = settled(&pager, 30).await;
	let ids = loaded(&state);
	assert_eq!((ids[10], ids[20]), (10, 30));
	assert_eq!(queued(&pager), vec![2, 4]);
}

#[tokio::test]
async fn operations_shape_each_loaded_page() {
	let source = CursorSource::new(9);
	let pager = Pager::builder(PagingConfig::new(0), Arc::clone(&source) as Arc<dyn PageSource<u32, Article>>)
		.operation(Operation::filter("even", |article: &Article| article.id % 2 == 0))
		.build()
		.expect("pager builds");
	let state = settled(&pager, 5).await;
	assert!(loaded(&state).iter().all(|id| id % 2 == 0));
	assert_eq!(pager.operations(), vec!["even".to_string()]);

	pager.remove_operation("even").expect("pager running");
	pager
		.add_operation(Operation::sort("newest", |a: &Article, b: &Article| b.id.cmp(&a.id)))
		.expect("pager running");
	pager.process_queue(LoadDirection::Append).expect("pager running");
	let state = settled(&pager, 15).await;
	assert_eq!(&loaded(&state)[5..], &(10..20).rev().collect::<Vec<_>>()[..]);
	assert_eq!(pager.operations(), vec!["newest".to_string()]);
}

#[tokio::test]
async fn item_updates_write_through_to_store() {
	let source = CursorSource::new(9);
	let pager = pager(PagingConfig::new(0), &source);
	settled(&pager, 10).await;

	let handle = pager.item(3);
	assert!(Arc::ptr_eq(&handle, &pager.item(3)));
	assert_eq!(handle.state().load_state, ItemLoadState::Loaded);
	let mut rx = handle.subscribe();

	let mut edited = Article::new(3);
	edited.headline = "corrected".into();
	handle.send(ItemEvent::Update(edited.clone())).await;
	assert_eq!(rx.borrow_and_update().item.as_ref(), Some(&edited));
	assert_eq!(pager.store().cached_item(&3), Some(edited));
}

#[tokio::test]
async fn states_stream_yields_every_transition() {
	let source = CursorSource::new(9);
	let pager = pager(PagingConfig::new(0), &source);
	settled(&pager, 10).await;
	let mut states = Box::pin(pager.states());

	pager.process_queue(LoadDirection::Append).expect("pager running");
	let first = states.next().await.expect("stream open");
	assert!(first.load_states().append.is_loading());
	let second = states.next().await.expect("stream open");
	assert_eq!(second.loaded_ids().count(), 20);
}

#[tokio::test]
async fn shutdown_rejects_further_actions() {
	let source = CursorSource::new(9);
	let pager = pager(PagingConfig::new(0), &source);
	settled(&pager, 10).await;

	pager.shutdown();
	assert!(pager.is_closed());
	assert!(matches!(pager.invalidate(), Err(PagingError::Closed)));
}

#[test]
fn building_outside_a_runtime_fails() {
	let source = CursorSource::new(1);
	let result = Pager::builder(PagingConfig::new(0), source as Arc<dyn PageSource<u32, Article>>).build();
	assert!(matches!(result, Err(PagingError::NoRuntime)));
}

#[tokio::test]
async fn invalid_config_is_rejected() {
	let source = CursorSource::new(1);
	let result = Pager::builder(PagingConfig::new(0).page_size(0), source as Arc<dyn PageSource<u32, Article>>).build();
	assert!(matches!(result, Err(PagingError::InvalidConfig(_))));
}
