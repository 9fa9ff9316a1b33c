//! Process-wide registry mapping collection names to live [`Collection`]s.

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::collection::Collection;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};

/// A concurrent name -> collection map. Cheap to clone; holds an `Arc` to its
/// internal state.
#[derive(Clone)]
pub struct CollectionRegistry {
    inner: Arc<RwLock<FxHashMap<String, Arc<Collection>>>>,
}

impl CollectionRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(FxHashMap::default())),
        }
    }

    /// Returns the named collection, creating it with `config` if absent.
    pub fn get_or_create(&self, name: &str, config: &EngineConfig) -> Arc<Collection> {
        if let Some(existing) = self.inner.read().get(name) {
            return Arc::clone(existing);
        }
        let mut guard = self.inner.write();
        if let Some(existing) = guard.get(name) {
            return Arc::clone(existing);
        }
        let created = Arc::new(Collection::new(name, config.clone()));
        guard.insert(name.to_string(), Arc::clone(&created));
        created
    }

    pub fn get(&self, name: &str) -> Result<Arc<Collection>> {
        self.inner
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::MissingCollection(name.to_string()))
    }

    pub fn names(&self) -> Vec<String> {
        self.inner.read().keys().cloned().collect()
    }
}

impl Default for CollectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
