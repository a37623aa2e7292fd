//! Builder registry
//!
//! Maps a type discriminator to the builder that produces values for
//! addresses of that type. The registry always carries the built-in
//! [`TOUCH`] type, which builds nothing and only exists so builders can
//! anchor invalidation to an external identifier such as a file path.

use crate::address::Address;
use crate::engine::{Artifact, Loader};
use crate::error::LoadResult;
use async_trait::async_trait;
use chrono::Duration;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Reserved type name of the built-in no-op builder
pub const TOUCH: &str = "touch";

/// Produces the value for an address
///
/// `loader` requests dependencies. Every address loaded through it is
/// recorded as a dependency of `address`, so invalidating the dependency
/// also invalidates `address`.
#[async_trait]
pub trait Builder<V>: Send + Sync {
    /// Build the value for `address`
    async fn build(&self, address: &Address, loader: Loader<V>) -> LoadResult<V>;
}

/// Adapts an async closure into a [`Builder`]
struct FnBuilder<F>(F);

#[async_trait]
impl<V, F, Fut> Builder<V> for FnBuilder<F>
where
    V: Artifact,
    F: Fn(Address, Loader<V>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = LoadResult<V>> + Send + 'static,
{
    async fn build(&self, address: &Address, loader: Loader<V>) -> LoadResult<V> {
        (self.0)(address.clone(), loader).await
    }
}

/// Built-in builder for [`TOUCH`] addresses
#[derive(Debug, Clone, Copy, Default)]
pub struct Touch;

#[async_trait]
impl<V: Artifact> Builder<V> for Touch {
    async fn build(&self, _address: &Address, _loader: Loader<V>) -> LoadResult<V> {
        Ok(V::default())
    }
}

/// Per-builder configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildOptions {
    /// How long a built value stays fresh, measured from when the build
    /// was started. `None` means until invalidated.
    pub ttl: Option<Duration>,
}

impl BuildOptions {
    /// Options with a time-to-live
    pub fn with_ttl(ttl: Duration) -> Self {
        Self { ttl: Some(ttl) }
    }
}

/// A registered builder plus its options
pub struct BuilderDescriptor<V> {
    pub builder: Arc<dyn Builder<V>>,
    pub options: BuildOptions,
}

impl<V> Clone for BuilderDescriptor<V> {
    fn clone(&self) -> Self {
        Self {
            builder: Arc::clone(&self.builder),
            options: self.options,
        }
    }
}

impl<V> fmt::Debug for BuilderDescriptor<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuilderDescriptor")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Mapping from type name to builder
pub struct BuilderRegistry<V> {
    builders: HashMap<String, BuilderDescriptor<V>>,
}

impl<V: Artifact> BuilderRegistry<V> {
    /// Create a registry holding only the built-in `touch` type
    pub fn new() -> Self {
        let mut registry = Self {
            builders: HashMap::new(),
        };
        registry.offer_builder(TOUCH, Touch, BuildOptions::default());
        registry
    }

    /// Register (or replace) an async closure as the builder for `kind`
    pub fn offer<F, Fut>(&mut self, kind: impl Into<String>, build: F) -> &mut Self
    where
        F: Fn(Address, Loader<V>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = LoadResult<V>> + Send + 'static,
    {
        self.offer_with(kind, build, BuildOptions::default())
    }

    /// Register (or replace) an async closure with options
    pub fn offer_with<F, Fut>(
        &mut self,
        kind: impl Into<String>,
        build: F,
        options: BuildOptions,
    ) -> &mut Self
    where
        F: Fn(Address, Loader<V>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = LoadResult<V>> + Send + 'static,
    {
        self.offer_builder(kind, FnBuilder(build), options)
    }

    /// Register (or replace) a [`Builder`] implementation
    pub fn offer_builder(
        &mut self,
        kind: impl Into<String>,
        builder: impl Builder<V> + 'static,
        options: BuildOptions,
    ) -> &mut Self {
        self.builders.insert(
            kind.into(),
            BuilderDescriptor {
                builder: Arc::new(builder),
                options,
            },
        );
        self
    }

    /// Chainable form of [`offer`](Self::offer) for construction
    pub fn with<F, Fut>(mut self, kind: impl Into<String>, build: F) -> Self
    where
        F: Fn(Address, Loader<V>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = LoadResult<V>> + Send + 'static,
    {
        self.offer(kind, build);
        self
    }

    /// Chainable form of [`offer_with`](Self::offer_with)
    pub fn with_options<F, Fut>(
        mut self,
        kind: impl Into<String>,
        build: F,
        options: BuildOptions,
    ) -> Self
    where
        F: Fn(Address, Loader<V>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = LoadResult<V>> + Send + 'static,
    {
        self.offer_with(kind, build, options);
        self
    }
}

impl<V> BuilderRegistry<V> {
    /// Look up the builder for a type
    pub fn get(&self, kind: &str) -> Option<&BuilderDescriptor<V>> {
        self.builders.get(kind)
    }

    /// Whether a builder is registered for a type
    pub fn contains(&self, kind: &str) -> bool {
        self.builders.contains_key(kind)
    }

    /// Registered type names, sorted
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.builders.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    /// Number of registered types, `touch` included
    pub fn len(&self) -> usize {
        self.builders.len()
    }

    /// Always false in practice since `touch` is built in
    pub fn is_empty(&self) -> bool {
        self.builders.is_empty()
    }
}

impl<V: Artifact> Default for BuilderRegistry<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> fmt::Debug for BuilderRegistry<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.builders.iter()).finish()
    }
}
