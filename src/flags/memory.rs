//! In-process flag storage.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;
use parking_lot::RwLock;

use super::adapter::{Adapter, AdapterResult, FeatureState};

/// A thread-safe, in-memory [`Adapter`].
///
/// Useful for tests, demos, and single-process deployments that seed flags
/// at startup.
#[derive(Debug, Default)]
pub struct MemoryAdapter {
    flags: RwLock<BTreeMap<String, FeatureState>>,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an adapter pre-populated with `flags`.
    pub fn with_flags<I, S>(flags: I) -> Self
    where
        I: IntoIterator<Item = (S, FeatureState)>,
        S: Into<String>,
    {
        Self {
            flags: RwLock::new(flags.into_iter().map(|(k, v)| (k.into(), v)).collect()),
        }
    }
}

#[async_trait]
impl Adapter for MemoryAdapter {
    fn name(&self) -> &str {
        "memory"
    }

    async fn features(&self) -> AdapterResult<BTreeSet<String>> {
        Ok(self.flags.read().keys().cloned().collect())
    }

    async fn add(&self, key: &str) -> AdapterResult<()> {
        self.flags.write().entry(key.to_owned()).or_default();
        Ok(())
    }

    async fn remove(&self, key: &str) -> AdapterResult<()> {
        self.flags.write().remove(key);
        Ok(())
    }

    async fn clear(&self, key: &str) -> AdapterResult<()> {
        if let Some(state) = self.flags.write().get_mut(key) {
            *state = FeatureState::default();
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> AdapterResult<FeatureState> {
        Ok(self.flags.read().get(key).copied().unwrap_or_default())
    }

    async fn set(&self, key: &str, state: FeatureState) -> AdapterResult<()> {
        self.flags.write().insert(key.to_owned(), state);
        Ok(())
    }

    async fn get_multi(&self, keys: &[String]) -> AdapterResult<HashMap<String, FeatureState>> {
        let flags = self.flags.read();
        Ok(keys
            .iter()
            .map(|k| (k.clone(), flags.get(k).copied().unwrap_or_default()))
            .collect())
    }

    async fn get_all(&self) -> AdapterResult<HashMap<String, FeatureState>> {
        Ok(self
            .flags
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect())
    }
}
