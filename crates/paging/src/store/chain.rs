use rustc_hash::FxHashMap;

use crate::types::{LoadDirection, RequestKey};

/// One page in the loaded chain. Neighbors are referenced by key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageNode<K> {
	pub key: K,
	/// Not yet linked into the chain.
	pub is_placeholder: bool,
	pub is_in_flight: bool,
	pub prev: Option<K>,
	pub next: Option<K>,
}

impl<K> PageNode<K> {
	fn placeholder(key: K) -> Self {
		Self {
			key,
			is_placeholder: true,
			is_in_flight: true,
			prev: None,
			next: None,
		}
	}
}

/// Arena of [`PageNode`]s forming the ordered chain of loaded pages.
///
/// Nodes start as in-flight placeholders and are linked at the tail (append)
/// or head (prepend) once their load resolves. Linked nodes always form one
/// contiguous run from `head` to `tail`.
#[derive(Debug)]
pub struct PageChain<K> {
	nodes: FxHashMap<K, PageNode<K>>,
	head: Option<K>,
	tail: Option<K>,
}

impl<K> Default for PageChain<K> {
	fn default() -> Self {
		Self {
			nodes: FxHashMap::default(),
			head: None,
			tail: None,
		}
	}
}

impl<K: RequestKey> PageChain<K> {
	pub fn new() -> Self {
		Self::default()
	}

	/// Marks `key` in flight, creating a placeholder if unknown.
	///
	/// Returns `false` when `key` is already in flight.
	pub fn begin_load(&mut self, key: K) -> bool {
		match self.nodes.get_mut(&key) {
			Some(node) if node.is_in_flight => false,
			Some(node) => {
				node.is_in_flight = true;
				true
			}
			None => {
				self.nodes.insert(key.clone(), PageNode::placeholder(key));
				true
			}
		}
	}

	/// Clears the in-flight flag and links the node if it is not linked yet.
	pub fn finish_load(&mut self, key: &K, direction: LoadDirection) {
		let node = self.nodes.entry(key.clone()).or_insert_with(|| PageNode::placeholder(key.clone()));
		node.is_in_flight = false;
		if !node.is_placeholder {
			return;
		}
		node.is_placeholder = false;
		match direction {
			LoadDirection::Append => self.link_tail(key),
			LoadDirection::Prepend => self.link_head(key),
		}
	}

	/// Abandons a load. Never-linked placeholders are dropped.
	pub fn abort_load(&mut self, key: &K) {
		let placeholder = match self.nodes.get_mut(key) {
			Some(node) => {
				node.is_in_flight = false;
				node.is_placeholder
			}
			None => return,
		};
		if placeholder {
			self.nodes.remove(key);
		}
	}

	/// Unlinks and drops `key`, joining its neighbors.
	pub fn remove(&mut self, key: &K) -> Option<PageNode<K>> {
		let node = self.nodes.remove(key)?;
		if node.is_placeholder {
			return Some(node);
		}
		match &node.prev {
			Some(prev) => {
				if let Some(prev_node) = self.nodes.get_mut(prev) {
					prev_node.next = node.next.clone();
				}
			}
			None => self.head = node.next.clone(),
		}
		match &node.next {
			Some(next) => {
				if let Some(next_node) = self.nodes.get_mut(next) {
					next_node.prev = node.prev.clone();
				}
			}
			None => self.tail = node.prev.clone(),
		}
		Some(node)
	}

	pub fn get(&self, key: &K) -> Option<&PageNode<K>> {
		self.nodes.get(key)
	}

	pub fn is_in_flight(&self, key: &K) -> bool {
		self.nodes.get(key).is_some_and(|node| node.is_in_flight)
	}

	pub fn head(&self) -> Option<&K> {
		self.head.as_ref()
	}

	pub fn tail(&self) -> Option<&K> {
		self.tail.as_ref()
	}

	/// Linked keys from head to tail.
	pub fn keys(&self) -> Vec<K> {
		let mut keys = Vec::new();
		let mut cursor = self.head.as_ref();
		while let Some(key) = cursor {
			keys.push(key.clone());
			cursor = self.nodes.get(key).and_then(|node| node.next.as_ref());
			if keys.len() > self.nodes.len() {
				break;
			}
		}
		keys
	}

	/// Number of linked pages.
	pub fn len(&self) -> usize {
		self.nodes.values().filter(|node| !node.is_placeholder).count()
	}

	pub fn is_empty(&self) -> bool {
		self.head.is_none()
	}

	/// Whether the linked nodes form one run with consistent back-links.
	pub fn is_contiguous(&self) -> bool {
		let keys = self.keys();
		if keys.len() != self.len() || keys.last() != self.tail.as_ref() {
			return false;
		}
		keys.windows(2).all(|pair| self.nodes.get(&pair[1]).and_then(|node| node.prev.as_ref()) == Some(&pair[0]))
	}

	pub fn clear(&mut self) {
		self.nodes.clear();
		self.head = None;
		self.tail = None;
	}

	fn link_tail(&mut self, key: &K) {
		let previous_tail = self.tail.replace(key.clone());
		match previous_tail {
			Some(tail) => {
				if let Some(tail_node) = self.nodes.get_mut(&tail) {
					tail_node.next = Some(key.clone());
				}
				if let Some(node) = self.nodes.get_mut(key) {
					node.prev = Some(tail);
				}
			}
			None => self.head = Some(key.clone()),
		}
	}

	fn link_head(&mut self, key: &K) {
		let previous_head = self.head.replace(key.clone());
		match previous_head {
			Some(head) => {
				if let Some(head_node) = self.nodes.get_mut(&head) {
					head_node.prev = Some(key.clone());
				}
				if let Some(node) = self.nodes.get_mut(key) {
					node.next = Some(head);
				}
			}
			None => self.tail = Some(key.clone()),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn pages_link_in_load_direction() {
		let mut chain = PageChain::new();
		for (key, direction) in [(5u32, LoadDirection::Append), (6, LoadDirection::Append), (4, LoadDirection::Prepend)] {
			assert!(chain.begin_load(key));
			chain.finish_load(&key, direction);
		}
		assert_eq!(chain.keys(), vec![4, 5, 6]);
		assert_eq!(chain.head(), Some(&4));
		assert_eq!(chain.tail(), Some(&6));
		assert!(chain.is_contiguous());
	}

	#[test]
	fn in_flight_key_cannot_begin_twice() {
		let mut chain = PageChain::new();
		assert!(chain.begin_load(1u32));
		assert!(!chain.begin_load(1));
		assert!(chain.is_in_flight(&1));
		chain.abort_load(&1);
		assert!(chain.get(&1).is_none());
		assert!(chain.begin_load(1));
	}

	#[test]
	fn reload_of_linked_page_keeps_position() {
		let mut chain = PageChain::new();
		for key in [1u32, 2, 3] {
			chain.begin_load(key);
			chain.finish_load(&key, LoadDirection::Append);
		}
		assert!(chain.begin_load(2));
		chain.abort_load(&2);
		assert_eq!(chain.keys(), vec![1, 2, 3]);

		assert!(chain.begin_load(2));
		chain.finish_load(&2, LoadDirection::Prepend);
		assert_eq!(chain.keys(), vec![1, 2, 3]);
		assert!(!chain.is_in_flight(&2));
	}

	#[test]
	fn remove_joins_neighbors() {
		let mut chain = PageChain::new();
		for key in [1u32, 2, 3] {
			chain.begin_load(key);
			chain.finish_load(&key, LoadDirection::Append);
		}
		chain.remove(&2);
		assert_eq!(chain.keys(), vec![1, 3]);
		assert!(chain.is_contiguous());
		chain.remove(&1);
		chain.remove(&3);
		assert!(chain.is_empty());
		assert_eq!(chain.tail(), None);
	}
}
