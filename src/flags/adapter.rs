//! The storage-backend seam behind every [`FlagClient`](super::FlagClient).

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::BoxError;

/// Stored state of one flag. Flags the backend has never seen read as disabled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeatureState {
    pub enabled: bool,
}

impl FeatureState {
    pub const ON: Self = Self { enabled: true };
    pub const OFF: Self = Self { enabled: false };
}

/// Backend failures.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The store could not be reached.
    #[error("flag store unavailable: {0}")]
    Unavailable(String),

    #[error("flag store backend error: {0}")]
    Backend(#[source] BoxError),
}

pub type AdapterResult<T> = Result<T, AdapterError>;

/// Abstract flag storage.
///
/// Implementations must be thread-safe; a single adapter is normally shared
/// by every request in the process. The batch reads have default
/// implementations built on [`get`](Self::get) and
/// [`features`](Self::features); backends that can fetch several keys in one
/// round trip should override them.
#[async_trait]
pub trait Adapter: Send + Sync + 'static {
    /// Short backend name, used in logs.
    fn name(&self) -> &str;

    /// Names of every known flag.
    async fn features(&self) -> AdapterResult<BTreeSet<String>>;

    /// Registers a flag name without changing its state.
    async fn add(&self, key: &str) -> AdapterResult<()>;

    /// Forgets a flag entirely.
    async fn remove(&self, key: &str) -> AdapterResult<()>;

    /// Resets a flag to its default state, keeping it registered.
    async fn clear(&self, key: &str) -> AdapterResult<()>;

    async fn get(&self, key: &str) -> AdapterResult<FeatureState>;

    async fn set(&self, key: &str, state: FeatureState) -> AdapterResult<()>;

    async fn get_multi(&self, keys: &[String]) -> AdapterResult<HashMap<String, FeatureState>> {
        let mut states = HashMap::with_capacity(keys.len());
        for key in keys {
            states.insert(key.clone(), self.get(key).await?);
        }
        Ok(states)
    }

    async fn get_all(&self) -> AdapterResult<HashMap<String, FeatureState>> {
        let keys: Vec<String> = self.features().await?.into_iter().collect();
        self.get_multi(&keys).await
    }
}
