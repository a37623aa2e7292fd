//! Engine behaviour switches

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// What happens when `load` finds an entry whose TTL has passed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpiryPolicy {
    /// Rebuild the expired address in place. Consumers keep their cached
    /// values and the rebuilt entry starts with no recorded consumers.
    #[default]
    Soft,
    /// Invalidate the expired address and everything that consumed it
    /// before rebuilding, exactly like an explicit `invalidate`.
    Cascade,
}

/// What happens to an entry whose build failed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Keep the failure cached until invalidated or expired, like a success
    #[default]
    Cache,
    /// Drop the entry once the build settles with an error so the next
    /// `load` runs the builder again
    Evict,
}

/// Runtime options for an engine
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineOptions {
    pub expiry: ExpiryPolicy,
    pub failures: FailurePolicy,

    /// TTL for builders that do not declare one. Never applied to `touch`.
    pub default_ttl: Option<Duration>,

    /// Per-type TTLs that take precedence over what the builder declares
    pub ttl_overrides: HashMap<String, Duration>,
}

impl EngineOptions {
    /// Resolve the TTL for a type given what its builder declared
    pub fn ttl_for(&self, kind: &str, declared: Option<Duration>) -> Option<Duration> {
        if let Some(ttl) = self.ttl_overrides.get(kind) {
            return Some(*ttl);
        }
        if declared.is_some() || kind == crate::registry::TOUCH {
            return declared;
        }
        self.default_ttl
    }
}
