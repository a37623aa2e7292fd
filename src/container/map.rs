//! Digest-keyed map

use super::KeyHasher;
use std::collections::HashMap;
use std::fmt;

/// Key-value map where key identity is decided by a `KeyHasher`
///
/// Each digest owns a small bucket of `(key, value)` pairs. The original
/// key is kept so iteration hands back real keys, and so a digest match
/// can be confirmed with a full equality check.
pub struct DigestMap<K, V, H: KeyHasher<K>> {
    hasher: H,
    buckets: HashMap<H::Digest, Vec<(K, V)>>,
    len: usize,
}

impl<K, V, H> DigestMap<K, V, H>
where
    K: PartialEq,
    H: KeyHasher<K>,
{
    /// Create an empty map using the given hasher
    pub fn with_hasher(hasher: H) -> Self {
        Self {
            hasher,
            buckets: HashMap::new(),
            len: 0,
        }
    }

    /// The hasher deciding key identity
    pub fn hasher(&self) -> &H {
        &self.hasher
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the map holds no entries
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Insert a value, returning the previous value for an equal key
    ///
    /// When an equal key already exists its original key object is kept.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        let digest = self.hasher.digest(&key);
        let bucket = self.buckets.entry(digest).or_default();

        if let Some(slot) = bucket.iter_mut().find(|(k, _)| *k == key) {
            return Some(std::mem::replace(&mut slot.1, value));
        }

        bucket.push((key, value));
        self.len += 1;
        None
    }

    /// Get the value for a key
    pub fn get(&self, key: &K) -> Option<&V> {
        self.get_key_value(key).map(|(_, v)| v)
    }

    /// Get the stored key and value for a key
    pub fn get_key_value(&self, key: &K) -> Option<(&K, &V)> {
        let digest = self.hasher.digest(key);
        self.buckets
            .get(&digest)?
            .iter()
            .find(|(k, _)| k == key)
            .map(|(k, v)| (k, v))
    }

    /// Get a mutable reference to the value for a key
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let digest = self.hasher.digest(key);
        self.buckets
            .get_mut(&digest)?
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Whether an equal key is present
    pub fn contains_key(&self, key: &K) -> bool {
        self.get_key_value(key).is_some()
    }

    /// Remove a key, returning its value
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.remove_entry(key).map(|(_, v)| v)
    }

    /// Remove a key, returning the stored key and value
    pub fn remove_entry(&mut self, key: &K) -> Option<(K, V)> {
        let digest = self.hasher.digest(key);
        let bucket = self.buckets.get_mut(&digest)?;
        let index = bucket.iter().position(|(k, _)| k == key)?;
        let entry = bucket.swap_remove(index);

        if bucket.is_empty() {
            self.buckets.remove(&digest);
        }
        self.len -= 1;
        Some(entry)
    }

    /// Remove every entry
    pub fn clear(&mut self) {
        self.buckets.clear();
        self.len = 0;
    }

    /// Iterate over stored keys and values
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.buckets
            .values()
            .flat_map(|bucket| bucket.iter().map(|(k, v)| (k, v)))
    }

    /// Iterate over stored keys
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.iter().map(|(k, _)| k)
    }

    /// Iterate over values
    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.iter().map(|(_, v)| v)
    }
}

impl<K, V, H> DigestMap<K, V, H>
where
    K: PartialEq,
    H: KeyHasher<K> + Default,
{
    /// Create an empty map with a default hasher
    pub fn new() -> Self {
        Self::with_hasher(H::default())
    }
}

impl<K, V, H> Default for DigestMap<K, V, H>
where
    K: PartialEq,
    H: KeyHasher<K> + Default,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, H> IntoIterator for DigestMap<K, V, H>
where
    H: KeyHasher<K>,
{
    type Item = (K, V);
    type IntoIter =
        std::iter::Flatten<std::collections::hash_map::IntoValues<H::Digest, Vec<(K, V)>>>;

    fn into_iter(self) -> Self::IntoIter {
        self.buckets.into_values().flatten()
    }
}

impl<K, V, H> fmt::Debug for DigestMap<K, V, H>
where
    K: PartialEq + fmt::Debug,
    V: fmt::Debug,
    H: KeyHasher<K>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}
