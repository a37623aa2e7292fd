//! Dependency loading handles

use super::{Artifact, Engine, EngineState, InvalidationReport, Pending};
use crate::address::Address;
use crate::error::{DepcacheError, DepcacheResult, LoadError, LoadResult};
use serde_json::Value;
use std::sync::{Arc, Weak};

/// Handle a builder uses to load its dependencies
///
/// Every address loaded through a `Loader` records the address being built
/// as one of its consumers. The handle only holds a weak reference to the
/// engine, so cached builds never keep the engine alive.
pub struct Loader<V> {
    state: Weak<EngineState<V>>,
    consumer: Address,
}

impl<V> Clone for Loader<V> {
    fn clone(&self) -> Self {
        Self {
            state: Weak::clone(&self.state),
            consumer: self.consumer.clone(),
        }
    }
}

impl<V: Artifact> Loader<V> {
    pub(crate) fn new(state: &Arc<EngineState<V>>, consumer: Address) -> Self {
        Self {
            state: Arc::downgrade(state),
            consumer,
        }
    }

    /// The address whose build this loader belongs to
    pub fn consumer(&self) -> &Address {
        &self.consumer
    }

    /// Load a dependency and wait for its value
    ///
    /// Only a direct self-load is rejected as [`LoadError::Cycle`]. Longer
    /// cycles wait on each other forever; the engine logs a warning when it
    /// sees one forming.
    pub async fn load(&self, address: &Address) -> LoadResult<V> {
        self.depend_on(address)?.await
    }

    /// Register a dependency without waiting for it
    pub fn depend_on(&self, address: &Address) -> LoadResult<Pending<V>> {
        let state = self.state.upgrade().ok_or(LoadError::EngineDropped)?;
        Engine::from_state(state).load_dependency(address, &self.consumer)
    }

    /// Anchor the current build to an external identifier
    ///
    /// Shorthand for loading `{"type": "touch", "path": path}`.
    pub async fn touch(&self, path: impl Into<Value>) -> LoadResult<()> {
        self.load(&Address::touch(path)).await.map(|_| ())
    }
}

/// Loader bound to one type name, filling in the `type` field
pub struct KindHandle<V> {
    engine: Engine<V>,
    kind: String,
}

impl<V: Artifact> KindHandle<V> {
    pub(crate) fn new(engine: Engine<V>, kind: String) -> Self {
        Self { engine, kind }
    }

    /// Type name filled into every address
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Build the address `{"type": kind, ..fields}`
    pub fn address(&self, fields: Value) -> DepcacheResult<Address> {
        match fields {
            Value::Object(fields) => Ok(Address::with_fields(self.kind.as_str(), fields)),
            Value::Null => Ok(Address::new(self.kind.as_str())),
            other => Err(DepcacheError::InvalidAddress(format!(
                "fields for {} must be a JSON object, got {}",
                self.kind, other
            ))),
        }
    }

    /// Start (or join) the build for `{"type": kind, ..fields}`
    pub fn load(&self, fields: Value) -> DepcacheResult<Pending<V>> {
        let address = self.address(fields)?;
        Ok(self.engine.load(&address)?)
    }

    /// Load `{"type": kind, ..fields}` and wait for its value
    pub async fn get(&self, fields: Value) -> DepcacheResult<V> {
        let pending = self.load(fields)?;
        Ok(pending.await?)
    }

    /// Invalidate `{"type": kind, ..fields}`
    pub fn invalidate(&self, fields: Value) -> DepcacheResult<InvalidationReport> {
        let address = self.address(fields)?;
        Ok(self.engine.invalidate(address))
    }
}
