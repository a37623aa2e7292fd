//! Digest-keyed set

use super::{DigestMap, KeyHasher};
use std::fmt;

/// Set where membership is decided by a `KeyHasher`
pub struct DigestSet<K, H: KeyHasher<K>> {
    inner: DigestMap<K, (), H>,
}

impl<K, H> DigestSet<K, H>
where
    K: PartialEq,
    H: KeyHasher<K>,
{
    /// Create an empty set using the given hasher
    pub fn with_hasher(hasher: H) -> Self {
        Self {
            inner: DigestMap::with_hasher(hasher),
        }
    }

    /// Add a value. Returns `false` (and keeps the stored value) if an
    /// equal value is already present.
    pub fn insert(&mut self, value: K) -> bool {
        if self.inner.contains_key(&value) {
            return false;
        }
        self.inner.insert(value, ());
        true
    }

    /// Whether an equal value is present
    pub fn contains(&self, value: &K) -> bool {
        self.inner.contains_key(value)
    }

    /// Remove a value, returning whether it was present
    pub fn remove(&mut self, value: &K) -> bool {
        self.inner.remove(value).is_some()
    }

    /// Number of values
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Remove every value
    pub fn clear(&mut self) {
        self.inner.clear();
    }

    /// Iterate over stored values
    pub fn iter(&self) -> impl Iterator<Item = &K> {
        self.inner.keys()
    }
}

impl<K, H> DigestSet<K, H>
where
    K: PartialEq,
    H: KeyHasher<K> + Default,
{
    /// Create an empty set with a default hasher
    pub fn new() -> Self {
        Self::with_hasher(H::default())
    }
}

impl<K, H> Default for DigestSet<K, H>
where
    K: PartialEq,
    H: KeyHasher<K> + Default,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, H> Extend<K> for DigestSet<K, H>
where
    K: PartialEq,
    H: KeyHasher<K>,
{
    fn extend<I: IntoIterator<Item = K>>(&mut self, iter: I) {
        for value in iter {
            self.insert(value);
        }
    }
}

impl<K, H> FromIterator<K> for DigestSet<K, H>
where
    K: PartialEq,
    H: KeyHasher<K> + Default,
{
    fn from_iter<I: IntoIterator<Item = K>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

impl<K, H> IntoIterator for DigestSet<K, H>
where
    H: KeyHasher<K>,
{
    type Item = K;
    type IntoIter =
        std::iter::Map<<DigestMap<K, (), H> as IntoIterator>::IntoIter, fn((K, ())) -> K>;

    fn into_iter(self) -> Self::IntoIter {
        let key: fn((K, ())) -> K = |(k, ())| k;
        self.inner.into_iter().map(key)
    }
}

impl<K, H> fmt::Debug for DigestSet<K, H>
where
    K: PartialEq + fmt::Debug,
    H: KeyHasher<K>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}
