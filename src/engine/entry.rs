//! Cache entries

use super::Pending;
use crate::address::Address;
use crate::container::AddressSet;
use chrono::{DateTime, Utc};

/// Memoized build plus its bookkeeping
pub(crate) struct CacheEntry<V> {
    /// Shared future of the build; every waiter gets the same result
    pub value: Pending<V>,

    pub address: Address,

    /// Addresses whose builds loaded this one (reverse dependency edges)
    pub consumers: AddressSet,

    /// When the entry stops being fresh, stamped at build start
    pub expires_at: Option<DateTime<Utc>>,

    /// Distinguishes this entry from a later one at the same address
    pub generation: u64,
}

impl<V> CacheEntry<V> {
    pub fn new(
        address: Address,
        value: Pending<V>,
        expires_at: Option<DateTime<Utc>>,
        generation: u64,
    ) -> Self {
        Self {
            value,
            address,
            consumers: AddressSet::new(),
            expires_at,
            generation,
        }
    }

    /// Whether a `load` at `now` may reuse this entry
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|expires_at| expires_at > now)
    }
}

/// Public snapshot of an entry
#[derive(Debug, Clone)]
pub struct EntryInfo {
    pub address: Address,
    pub consumers: Vec<Address>,
    pub expires_at: Option<DateTime<Utc>>,
    pub generation: u64,

    /// Whether the build has settled
    pub settled: bool,
}

impl<V: Clone> CacheEntry<V> {
    pub fn info(&self) -> EntryInfo {
        EntryInfo {
            address: self.address.clone(),
            consumers: self.consumers.iter().cloned().collect(),
            expires_at: self.expires_at,
            generation: self.generation,
            settled: self.value.peek().is_some(),
        }
    }
}
