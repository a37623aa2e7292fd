//! Error types for depcache
//!
//! Build results are shared between every waiter of a cached future, so
//! `LoadError` is `Clone`. Everything else surfaces as `DepcacheError`.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for depcache operations
pub type DepcacheResult<T> = Result<T, DepcacheError>;

/// Result of loading an address through the engine
pub type LoadResult<T> = Result<T, LoadError>;

/// Errors produced while loading or building an address
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error("no builder defined for type: {0}")]
    UnknownType(String),

    #[error("build failed for {address}: {reason}")]
    BuildFailed { address: String, reason: String },

    #[error("address depends on itself: {0}")]
    Cycle(String),

    #[error("engine was dropped while a build was still running")]
    EngineDropped,
}

impl LoadError {
    /// Create a build failure for an address
    pub fn build(address: impl ToString, reason: impl Into<String>) -> Self {
        Self::BuildFailed {
            address: address.to_string(),
            reason: reason.into(),
        }
    }
}

/// All errors that can occur outside of a build
#[derive(Error, Debug)]
pub enum DepcacheError {
    // Address errors
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Configuration file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to initialize logging: {0}")]
    Logging(String),

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // Engine errors
    #[error(transparent)]
    Load(#[from] LoadError),
}

impl DepcacheError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::Load(LoadError::UnknownType(_)) => {
                Some("Register a builder for this type with Engine::offer")
            }
            Self::Load(LoadError::EngineDropped) => {
                Some("Keep the Engine alive until outstanding loads settle")
            }
            Self::InvalidAddress(_) => {
                Some("Addresses are JSON objects with a string \"type\" field")
            }
            Self::Logging(_) => Some("Initialize logging once, before any other subscriber is set"),
            _ => None,
        }
    }
}
