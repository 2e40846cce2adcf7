use rustc_hash::{FxHashMap, FxHashSet};

use super::chain::PageChain;
use crate::types::{DataOrigin, Identifier, LoadParams, RequestKey};

/// Normalized page: the ids it holds plus its continuation keys.
#[derive(Debug, Clone, PartialEq)]
pub struct PageRecord<K, Id> {
	pub params: LoadParams<K>,
	pub ids: Vec<Id>,
	pub prev_key: Option<K>,
	pub next_key: Option<K>,
	pub origin: DataOrigin,
	pub items_before: Option<usize>,
	pub items_after: Option<usize>,
}

/// Page records and the chain that orders them, guarded together.
pub(crate) struct PageTable<K, Id> {
	pub(crate) records: FxHashMap<K, PageRecord<K, Id>>,
	pub(crate) chain: PageChain<K>,
}

impl<K, Id> Default for PageTable<K, Id> {
	fn default() -> Self {
		Self {
			records: FxHashMap::default(),
			chain: PageChain::default(),
		}
	}
}

impl<K: RequestKey, Id: Identifier> PageTable<K, Id> {
	/// Ids of `record` that no other page references.
	pub(crate) fn orphaned_ids(&self, record: &PageRecord<K, Id>) -> Vec<Id> {
		let shared: FxHashSet<&Id> = self
			.records
			.values()
			.filter(|other| other.params.key != record.params.key)
			.flat_map(|other| other.ids.iter())
			.collect();
		record.ids.iter().filter(|id| !shared.contains(id)).cloned().collect()
	}

	pub(crate) fn clear(&mut self) {
		self.records.clear();
		self.chain.clear();
	}
}
