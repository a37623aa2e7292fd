//! Diagnostic sink for invalidation events
//!
//! Purely observational: the engine calls `debug` once for every address
//! an invalidation removes, after its internal lock has been released.

use crate::address::Address;
use std::sync::Mutex;
use tracing::debug;

/// Receives one event per invalidated address
pub trait DiagnosticSink: Send + Sync {
    fn debug(&self, message: &str, address: &Address);
}

/// Discards every event
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentSink;

impl DiagnosticSink for SilentSink {
    fn debug(&self, _message: &str, _address: &Address) {}
}

/// Forwards events to `tracing` at debug level
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn debug(&self, message: &str, address: &Address) {
        debug!(address = %address, digest = %address.digest().short(), "{}", message);
    }
}

/// Keeps every event in memory, in arrival order
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<(String, Address)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the recorded events
    pub fn events(&self) -> Vec<(String, Address)> {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Recorded addresses only
    pub fn addresses(&self) -> Vec<Address> {
        self.events().into_iter().map(|(_, address)| address).collect()
    }
}

impl DiagnosticSink for RecordingSink {
    fn debug(&self, message: &str, address: &Address) {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push((message.to_string(), address.clone()));
    }
}
