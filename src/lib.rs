//! depcache - dependency-aware memoization
//!
//! Callers ask for artifacts by structured [`Address`]. The [`Engine`]
//! builds each one on demand with the [`Builder`] registered for its type,
//! caches the shared result, remembers which addresses each build loaded,
//! and can invalidate an address together with everything that depended
//! on it.
//!
//! ```rust,ignore
//! use depcache::{Address, BuilderRegistry, Engine, Loader};
//! use serde_json::{json, Value};
//!
//! let registry = BuilderRegistry::new()
//!     .with("brick", |address: Address, _| async move {
//!         Ok(json!(format!("[{}]", address.get_str("name").unwrap_or_default())))
//!     })
//!     .with("wall", |address: Address, load: Loader<Value>| async move {
//!         let a = load.load(&Address::new("brick").with("name", "a")).await?;
//!         let b = load.load(&Address::new("brick").with("name", "b")).await?;
//!         Ok(json!(format!("{} {} {}", address.get_str("name").unwrap_or_default(), a, b)))
//!     });
//!
//! let engine = Engine::new(registry);
//! let wall = engine.get(&Address::new("wall").with("name", "WALL")).await?;
//!
//! // Rebuilds brick "a" and the wall on their next load
//! engine.invalidate(Address::new("brick").with("name", "a"));
//! ```

pub mod address;
pub mod config;
pub mod container;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod logging;
pub mod registry;

pub use address::{Address, AddressDigest, CanonicalHasher};
pub use container::{AddressMap, AddressSet, DigestMap, DigestSet, KeyHasher};
pub use diagnostics::{DiagnosticSink, RecordingSink, SilentSink, TracingSink};
pub use engine::{
    Artifact, Engine, EngineOptions, EntryInfo, ExpiryPolicy, FailurePolicy, Invalidation,
    InvalidationReport, KindHandle, Loader, Pending,
};
pub use error::{DepcacheError, DepcacheResult, LoadError, LoadResult};
pub use registry::{BuildOptions, Builder, BuilderDescriptor, BuilderRegistry, Touch, TOUCH};
