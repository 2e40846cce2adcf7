//! Transformations applied to every loaded page before it is published.
//!
//! An [`OperationPipeline`] folds its operations left to right. Each operation
//! runs only when its predicate accepts the current [`OperationContext`] and
//! otherwise passes the snapshot through untouched. Order is caller-defined.

use std::cmp::Ordering;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::fetching::FetchingState;
use crate::paging_state::PagingState;
use crate::types::Item;

/// Ordered items of one page.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemSnapshot<V> {
	items: Vec<V>,
}

impl<V> ItemSnapshot<V> {
	pub fn new(items: Vec<V>) -> Self {
		Self { items }
	}

	pub fn into_inner(self) -> Vec<V> {
		self.items
	}
}

impl<V: Item> ItemSnapshot<V> {
	pub fn ids(&self) -> Vec<V::Id> {
		self.items.iter().map(Item::id).collect()
	}
}

impl<V> Default for ItemSnapshot<V> {
	fn default() -> Self {
		Self { items: Vec::new() }
	}
}

impl<V> Deref for ItemSnapshot<V> {
	type Target = [V];

	fn deref(&self) -> &[V] {
		&self.items
	}
}

impl<V> From<Vec<V>> for ItemSnapshot<V> {
	fn from(items: Vec<V>) -> Self {
		Self { items }
	}
}

/// What an operation predicate can see.
pub struct OperationContext<'a, K, Id> {
	pub key: Option<&'a K>,
	pub paging_state: &'a PagingState<Id>,
	pub fetching_state: &'a FetchingState<Id, K>,
}

pub type Comparator<V> = Arc<dyn Fn(&V, &V) -> Ordering + Send + Sync>;
pub type ItemPredicate<V> = Arc<dyn Fn(&V) -> bool + Send + Sync>;
pub type GroupKey<V> = Arc<dyn Fn(&V) -> String + Send + Sync>;
pub type ContextPredicate<K, Id> = Arc<dyn for<'a> Fn(&OperationContext<'a, K, Id>) -> bool + Send + Sync>;

/// Closed set of snapshot transformations.
pub enum OperationKind<V> {
	/// Stable sort.
	Sort(Comparator<V>),
	/// Keeps matching items.
	Filter(ItemPredicate<V>),
	/// Clusters items sharing a group key, groups ordered by first appearance.
	Group(GroupKey<V>),
	/// Drops repeated ids, first occurrence wins.
	Deduplicate,
	/// Drops items failing validation and reports how many were rejected.
	Validate(ItemPredicate<V>),
}

impl<V> Clone for OperationKind<V> {
	fn clone(&self) -> Self {
		match self {
			Self::Sort(f) => Self::Sort(Arc::clone(f)),
			Self::Filter(f) => Self::Filter(Arc::clone(f)),
			Self::Group(f) => Self::Group(Arc::clone(f)),
			Self::Deduplicate => Self::Deduplicate,
			Self::Validate(f) => Self::Validate(Arc::clone(f)),
		}
	}
}

impl<V> OperationKind<V> {
	pub const fn as_str(&self) -> &'static str {
		match self {
			Self::Sort(_) => "sort",
			Self::Filter(_) => "filter",
			Self::Group(_) => "group",
			Self::Deduplicate => "deduplicate",
			Self::Validate(_) => "validate",
		}
	}
}

/// Named, optionally conditional transformation.
pub struct Operation<K, V: Item> {
	name: String,
	kind: OperationKind<V>,
	when: Option<ContextPredicate<K, V::Id>>,
}

impl<K, V: Item> Clone for Operation<K, V> {
	fn clone(&self) -> Self {
		Self {
			name: self.name.clone(),
			kind: self.kind.clone(),
			when: self.when.clone(),
		}
	}
}

impl<K, V: Item> fmt::Debug for Operation<K, V> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Operation")
			.field("name", &self.name)
			.field("kind", &self.kind.as_str())
			.field("conditional", &self.when.is_some())
			.finish()
	}
}

impl<K, V: Item> Operation<K, V> {
	/// Unconditional operation named `name`.
	pub fn new(name: impl Into<String>, kind: OperationKind<V>) -> Self {
		Self {
			name: name.into(),
			kind,
			when: None,
		}
	}

	/// Stable sort by `cmp`.
	pub fn sort(name: impl Into<String>, cmp: impl Fn(&V, &V) -> Ordering + Send + Sync + 'static) -> Self {
		Self::new(name, OperationKind::Sort(Arc::new(cmp)))
	}

	/// Keeps items for which `keep` returns true.
	pub fn filter(name: impl Into<String>, keep: impl Fn(&V) -> bool + Send + Sync + 'static) -> Self {
		Self::new(name, OperationKind::Filter(Arc::new(keep)))
	}

	/// Clusters items by `group_key`, groups ordered by first appearance.
	pub fn group(name: impl Into<String>, group_key: impl Fn(&V) -> String + Send + Sync + 'static) -> Self {
		Self::new(name, OperationKind::Group(Arc::new(group_key)))
	}

	/// Drops repeated ids, keeping the first occurrence.
	pub fn deduplicate(name: impl Into<String>) -> Self {
		Self::new(name, OperationKind::Deduplicate)
	}

	/// Drops items failing `is_valid` and logs how many were rejected.
	pub fn validate(name: impl Into<String>, is_valid: impl Fn(&V) -> bool + Send + Sync + 'static) -> Self {
		Self::new(name, OperationKind::Validate(Arc::new(is_valid)))
	}

	/// Restricts the operation to contexts accepted by `predicate`.
	#[must_use]
	pub fn when(mut self, predicate: impl for<'a> Fn(&OperationContext<'a, K, V::Id>) -> bool + Send + Sync + 'static) -> Self {
		self.when = Some(Arc::new(predicate));
		self
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn kind(&self) -> &OperationKind<V> {
		&self.kind
	}

	/// Whether the `when` predicate, if any, accepts `context`.
	pub fn should_apply(&self, context: &OperationContext<'_, K, V::Id>) -> bool {
		self.when.as_ref().is_none_or(|predicate| predicate(context))
	}

	/// Runs the transformation unconditionally.
	pub fn apply(&self, snapshot: ItemSnapshot<V>) -> ItemSnapshot<V> {
		let mut items = snapshot.into_inner();
		match &self.kind {
			OperationKind::Sort(cmp) => items.sort_by(|a, b| cmp(a, b)),
			OperationKind::Filter(keep) => items.retain(|item| keep(item)),
			OperationKind::Group(group_key) => items = group_stable(items, group_key.as_ref()),
			OperationKind::Deduplicate => {
				let mut seen = FxHashSet::default();
				items.retain(|item| seen.insert(item.id()));
			}
			OperationKind::Validate(is_valid) => {
				let before = items.len();
				items.retain(|item| is_valid(item));
				let rejected = before - items.len();
				if rejected > 0 {
					tracing::warn!(operation = %self.name, rejected, "paging.operation.invalid_items");
				}
			}
		}
		ItemSnapshot::new(items)
	}
}

fn group_stable<V>(items: Vec<V>, group_key: &(dyn Fn(&V) -> String + Send + Sync)) -> Vec<V> {
	let mut order: Vec<String> = Vec::new();
	let mut groups: FxHashMap<String, Vec<V>> = FxHashMap::default();
	for item in items {
		let key = group_key(&item);
		groups
			.entry(key)
			.or_insert_with_key(|key| {
				order.push(key.clone());
				Vec::new()
			})
			.push(item);
	}
	order.into_iter().filter_map(|key| groups.remove(&key)).flatten().collect()
}

/// Ordered, mutable list of operations.
pub struct OperationPipeline<K, V: Item> {
	operations: RwLock<Vec<Operation<K, V>>>,
}

impl<K, V: Item> Default for OperationPipeline<K, V> {
	fn default() -> Self {
		Self {
			operations: RwLock::new(Vec::new()),
		}
	}
}

impl<K, V: Item> OperationPipeline<K, V> {
	pub fn new(operations: Vec<Operation<K, V>>) -> Self {
		Self {
			operations: RwLock::new(operations),
		}
	}

	/// Appends `operation`, replacing in place any operation with the same name.
	pub fn add(&self, operation: Operation<K, V>) {
		let mut operations = self.operations.write();
		match operations.iter_mut().find(|existing| existing.name == operation.name) {
			Some(existing) => *existing = operation,
			None => operations.push(operation),
		}
	}

	/// Removes the operation named `name`. Returns whether one existed.
	pub fn remove(&self, name: &str) -> bool {
		let mut operations = self.operations.write();
		let before = operations.len();
		operations.retain(|op| op.name != name);
		operations.len() != before
	}

	pub fn clear(&self) {
		self.operations.write().clear();
	}

	pub fn len(&self) -> usize {
		self.operations.read().len()
	}

	pub fn is_empty(&self) -> bool {
		self.operations.read().is_empty()
	}

	/// Operation names in application order.
	pub fn names(&self) -> Vec<String> {
		self.operations.read().iter().map(|op| op.name.clone()).collect()
	}

	/// Folds `snapshot` through every operation whose predicate accepts the context.
	///
	/// The list is cloned first, so concurrent edits apply from the next page on.
	pub fn apply_operations(
		&self,
		snapshot: ItemSnapshot<V>,
		key: Option<&K>,
		paging_state: &PagingState<V::Id>,
		fetching_state: &FetchingState<V::Id, K>,
	) -> ItemSnapshot<V> {
		let operations = self.operations.read().clone();
		let context = OperationContext {
			key,
			paging_state,
			fetching_state,
		};
		operations
			.iter()
			.fold(snapshot, |snapshot, op| if op.should_apply(&context) { op.apply(snapshot) } else { snapshot })
	}
}
