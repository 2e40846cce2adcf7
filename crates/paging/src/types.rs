use std::fmt;
use std::hash::Hash;

use crate::error::LoadError;

/// Totally ordered identifier of one item.
///
/// `distance` is the signed difference `self - other`, used for range and
/// prefetch-distance math.
pub trait Identifier: Clone + Ord + Hash + fmt::Debug + Send + Sync + 'static {
	fn distance(&self, other: &Self) -> i64;
}

macro_rules! impl_integer_identifier {
	($($ty:ty),* $(,)?) => {
		$(
			impl Identifier for $ty {
				#[inline]
				fn distance(&self, other: &Self) -> i64 {
					let diff = i128::from(*self) - i128::from(*other);
					diff.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
				}
			}
		)*
	};
}

impl_integer_identifier!(i8, i16, i32, i64, u8, u16, u32, u64);

impl Identifier for usize {
	#[inline]
	fn distance(&self, other: &Self) -> i64 {
		(*self as u64).distance(&(*other as u64))
	}
}

impl Identifier for isize {
	#[inline]
	fn distance(&self, other: &Self) -> i64 {
		(*self as i64).distance(&(*other as i64))
	}
}

/// Opaque, comparable page request key (a cursor).
pub trait RequestKey: Clone + Ord + Hash + fmt::Debug + Send + Sync + 'static {}

impl<T> RequestKey for T where T: Clone + Ord + Hash + fmt::Debug + Send + Sync + 'static {}

/// Item value stored by the engine.
pub trait Item: Clone + fmt::Debug + Send + Sync + 'static {
	type Id: Identifier;

	fn id(&self) -> Self::Id;
}

/// Cache policy for one page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LoadStrategy {
	/// Serve from memory or persistence, falling back to the page source.
	#[default]
	CacheFirst,
	/// Always call the page source.
	SkipCache,
	/// Never call the page source.
	LocalOnly,
}

/// Which edge of the loaded window a request extends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadDirection {
	Append,
	Prepend,
}

impl LoadDirection {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Append => "append",
			Self::Prepend => "prepend",
		}
	}

	/// The other edge.
	pub const fn opposite(self) -> Self {
		match self {
			Self::Append => Self::Prepend,
			Self::Prepend => Self::Append,
		}
	}
}

/// Parameters of one page request. Identity is structural equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LoadParams<K> {
	pub key: K,
	pub strategy: LoadStrategy,
	pub direction: LoadDirection,
}

impl<K> LoadParams<K> {
	pub const fn new(key: K, strategy: LoadStrategy, direction: LoadDirection) -> Self {
		Self { key, strategy, direction }
	}

	/// `CacheFirst` request extending the tail.
	pub const fn append(key: K) -> Self {
		Self::new(key, LoadStrategy::CacheFirst, LoadDirection::Append)
	}

	/// `CacheFirst` request extending the head.
	pub const fn prepend(key: K) -> Self {
		Self::new(key, LoadStrategy::CacheFirst, LoadDirection::Prepend)
	}

	#[must_use]
	pub fn with_strategy(mut self, strategy: LoadStrategy) -> Self {
		self.strategy = strategy;
		self
	}
}

/// Where the data of a page came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DataOrigin {
	Cached,
	#[default]
	Remote,
	/// Local data served because the remote load failed.
	Fallback,
}

/// One successfully fetched page.
#[derive(Debug, Clone, PartialEq)]
pub struct PageData<K, V> {
	pub items: Vec<V>,
	pub prev_key: Option<K>,
	pub next_key: Option<K>,
	pub origin: DataOrigin,
	pub items_before: Option<usize>,
	pub items_after: Option<usize>,
}

impl<K, V> PageData<K, V> {
	/// Page with no neighbours and a remote origin.
	pub fn new(items: Vec<V>) -> Self {
		Self {
			items,
			prev_key: None,
			next_key: None,
			origin: DataOrigin::Remote,
			items_before: None,
			items_after: None,
		}
	}

	/// Key of the page before this one, `None` at the start.
	#[must_use]
	pub fn prev_key(mut self, key: Option<K>) -> Self {
		self.prev_key = key;
		self
	}

	/// Key of the page after this one, `None` at the end.
	#[must_use]
	pub fn next_key(mut self, key: Option<K>) -> Self {
		self.next_key = key;
		self
	}

	#[must_use]
	pub fn origin(mut self, origin: DataOrigin) -> Self {
		self.origin = origin;
		self
	}

	/// Totals reported by the source on either side of the page, if known.
	#[must_use]
	pub fn counts(mut self, items_before: Option<usize>, items_after: Option<usize>) -> Self {
		self.items_before = items_before;
		self.items_after = items_after;
		self
	}
}

/// Outcome of one call to a [`crate::store::PageSource`].
#[derive(Debug, Clone, PartialEq)]
pub enum LoadResult<K, V> {
	Data(PageData<K, V>),
	Error(LoadError),
}

impl<K, V> LoadResult<K, V> {
	/// Failure with a user-facing message.
	pub fn message(message: impl Into<String>) -> Self {
		Self::Error(LoadError::message(message))
	}
}

impl<K, V> From<PageData<K, V>> for LoadResult<K, V> {
	fn from(page: PageData<K, V>) -> Self {
		Self::Data(page)
	}
}
