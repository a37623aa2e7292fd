//! Content-keyed containers
//!
//! `DigestMap` and `DigestSet` treat two keys as the same entry when a
//! `KeyHasher` maps them to the same digest, rather than requiring the
//! key type to implement `Hash` itself. Digest matches are confirmed with
//! `PartialEq`, so a collision in the hasher degrades to a shared bucket
//! instead of a false hit.

mod map;
mod set;

pub use map::DigestMap;
pub use set::DigestSet;

use crate::address::{Address, CanonicalHasher};
use std::hash::Hash;

/// Maps a key to the digest that decides its identity
pub trait KeyHasher<K: ?Sized> {
    /// Digest type; equal digests mean "probably the same key"
    type Digest: Eq + Hash + Clone;

    /// Compute the digest for a key. Must be deterministic.
    fn digest(&self, key: &K) -> Self::Digest;
}

impl<K: ?Sized, D, F> KeyHasher<K> for F
where
    F: Fn(&K) -> D,
    D: Eq + Hash + Clone,
{
    type Digest = D;

    fn digest(&self, key: &K) -> D {
        self(key)
    }
}

/// Map keyed by address content
pub type AddressMap<V> = DigestMap<Address, V, CanonicalHasher>;

/// Set of addresses compared by content
pub type AddressSet = DigestSet<Address, CanonicalHasher>;
