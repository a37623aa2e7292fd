//! Configuration schema for depcache
//!
//! Configuration is stored at `~/.config/depcache/config.toml`

use crate::engine::{EngineOptions, ExpiryPolicy, FailurePolicy};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Cache engine settings
    pub engine: EngineConfig,

    /// Per-type TTL overrides in milliseconds, keyed by type name
    pub ttl: HashMap<String, u64>,
}

impl Config {
    /// Engine options described by this configuration
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            expiry: self.engine.expiry,
            failures: self.engine.failures,
            default_ttl: self.engine.default_ttl_ms.map(millis),
            ttl_overrides: self
                .ttl
                .iter()
                .map(|(kind, ms)| (kind.clone(), millis(*ms)))
                .collect(),
        }
    }
}

fn millis(ms: u64) -> chrono::Duration {
    chrono::Duration::milliseconds(i64::try_from(ms).unwrap_or(i64::MAX))
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Verbosity: 0 = warn, 1 = info, 2 = debug, 3+ = trace
    pub verbose: u8,

    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            verbose: 0,
            log_format: "text".to_string(),
        }
    }
}

/// Cache engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Behaviour on TTL expiry: "soft" or "cascade"
    pub expiry: ExpiryPolicy,

    /// Behaviour on build failure: "cache" or "evict"
    pub failures: FailurePolicy,

    /// TTL for builders that declare none (unset = never expire)
    pub default_ttl_ms: Option<u64>,
}
