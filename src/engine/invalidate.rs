//! Invalidation cascades
//!
//! Removing an address also removes every address recorded as its
//! consumer, transitively. Staleness only flows upward: an address's own
//! dependencies are never touched.

use super::Entries;
use crate::address::Address;
use crate::container::AddressSet;
use std::fmt;

/// What to invalidate
pub enum Invalidation {
    /// A single address
    Address(Address),
    /// Several addresses, sharing one visited set
    Many(Vec<Address>),
    /// Every live entry whose address matches
    Matching(Box<dyn Fn(&Address) -> bool + Send + Sync>),
}

impl Invalidation {
    /// Invalidate every entry matching a predicate
    pub fn matching(predicate: impl Fn(&Address) -> bool + Send + Sync + 'static) -> Self {
        Self::Matching(Box::new(predicate))
    }
}

impl From<Address> for Invalidation {
    fn from(address: Address) -> Self {
        Self::Address(address)
    }
}

impl From<&Address> for Invalidation {
    fn from(address: &Address) -> Self {
        Self::Address(address.clone())
    }
}

impl From<Vec<Address>> for Invalidation {
    fn from(addresses: Vec<Address>) -> Self {
        Self::Many(addresses)
    }
}

impl<const N: usize> From<[Address; N]> for Invalidation {
    fn from(addresses: [Address; N]) -> Self {
        Self::Many(addresses.into())
    }
}

impl fmt::Debug for Invalidation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Address(address) => f.debug_tuple("Address").field(address).finish(),
            Self::Many(addresses) => f.debug_tuple("Many").field(addresses).finish(),
            Self::Matching(_) => f.write_str("Matching(..)"),
        }
    }
}

/// Addresses removed by one invalidation call, in removal order
#[derive(Debug, Clone, Default)]
pub struct InvalidationReport {
    removed: Vec<Address>,
}

impl InvalidationReport {
    /// Removed addresses, in removal order
    pub fn removed(&self) -> &[Address] {
        &self.removed
    }

    /// Number of removed addresses
    pub fn len(&self) -> usize {
        self.removed.len()
    }

    /// Whether nothing was removed
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty()
    }

    /// Whether `address` was removed
    pub fn contains(&self, address: &Address) -> bool {
        self.removed.contains(address)
    }

    pub(crate) fn new(removed: Vec<Address>) -> Self {
        Self { removed }
    }

    /// Take the removed addresses
    pub fn into_removed(self) -> Vec<Address> {
        self.removed
    }
}

/// Apply `target` to `entries`. Every address is removed at most once,
/// however many consumer paths lead to it.
pub(crate) fn apply<V>(entries: &mut Entries<V>, target: Invalidation) -> Vec<Address> {
    let roots = match target {
        Invalidation::Address(address) => vec![address],
        Invalidation::Many(addresses) => addresses,
        Invalidation::Matching(predicate) => entries
            .keys()
            .filter(|address| predicate(address))
            .cloned()
            .collect(),
    };

    let mut visited = AddressSet::new();
    cascade(entries, roots, &mut visited)
}

/// Depth-first walk along consumer edges from `roots`
fn cascade<V>(
    entries: &mut Entries<V>,
    roots: Vec<Address>,
    visited: &mut AddressSet,
) -> Vec<Address> {
    let mut removed = Vec::new();
    let mut stack: Vec<Address> = roots.into_iter().rev().collect();

    while let Some(address) = stack.pop() {
        if visited.contains(&address) {
            continue;
        }

        // Absent addresses have no consumers left to visit
        let Some((address, entry)) = entries.remove_entry(&address) else {
            continue;
        };

        visited.insert(address.clone());
        let mut consumers: Vec<Address> = entry.consumers.into_iter().collect();
        consumers.reverse();
        stack.extend(consumers);
        removed.push(address);
    }

    removed
}

/// Whether `target` is reachable from `from` along consumer edges
pub(crate) fn reaches<V>(entries: &Entries<V>, from: &Address, target: &Address) -> bool {
    let mut visited = AddressSet::new();
    let mut stack = vec![from.clone()];

    while let Some(address) = stack.pop() {
        if &address == target {
            return true;
        }
        if let Some(entry) = entries.get(&address) {
            stack.extend(entry.consumers.iter().cloned());
        }
        visited.insert(address);
        stack.retain(|next| !visited.contains(next));
    }

    false
}
