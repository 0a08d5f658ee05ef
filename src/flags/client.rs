//! The flag client handed to handlers.

use std::{
    collections::{BTreeSet, HashMap},
    fmt,
    sync::Arc,
};

use tracing::debug;

use super::adapter::{Adapter, AdapterResult, FeatureState};
use super::memoizing::MemoizingAdapter;

/// A cheap-to-clone handle for reading and toggling flags.
///
/// Every client routes its calls through a [`MemoizingAdapter`]. Clones share
/// that layer, including its memoize switch. [`scoped`](Self::scoped)
/// creates a client with a fresh layer over the same backend.
///
/// # Examples
///
/// ```
/// use flagware::{FlagClient, MemoryAdapter};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let flags = FlagClient::new(MemoryAdapter::new());
/// flags.enable("search").await.unwrap();
///
/// assert!(flags.enabled("search").await.unwrap());
/// assert!(!flags.enabled("stats").await.unwrap());
/// # }
/// ```
#[derive(Clone)]
pub struct FlagClient {
    adapter: Arc<MemoizingAdapter>,
}

impl FlagClient {
    pub fn new<A: Adapter>(adapter: A) -> Self {
        Self::from_shared(Arc::new(adapter))
    }

    /// Builds a client over a backend that is also held elsewhere.
    pub fn from_shared(adapter: Arc<dyn Adapter>) -> Self {
        Self {
            adapter: Arc::new(MemoizingAdapter::new(adapter)),
        }
    }

    /// The memoizing layer every call goes through.
    pub fn adapter(&self) -> &MemoizingAdapter {
        &self.adapter
    }

    /// A client with its own memoize switch and cache over the same backend.
    pub fn scoped(&self) -> Self {
        Self::from_shared(Arc::clone(self.adapter.inner()))
    }

    /// Returns `true` if both handles share one memoizing layer.
    pub fn same_client(&self, other: &FlagClient) -> bool {
        Arc::ptr_eq(&self.adapter, &other.adapter)
    }

    /// Names of every known flag.
    pub async fn features(&self) -> AdapterResult<BTreeSet<String>> {
        self.adapter.features().await
    }

    pub async fn enabled(&self, name: &str) -> AdapterResult<bool> {
        Ok(self.adapter.get(name).await?.enabled)
    }

    /// Registers `name` and turns it on.
    pub async fn enable(&self, name: &str) -> AdapterResult<()> {
        self.adapter.add(name).await?;
        self.adapter.set(name, FeatureState::ON).await
    }

    /// Registers `name` and turns it off.
    pub async fn disable(&self, name: &str) -> AdapterResult<()> {
        self.adapter.add(name).await?;
        self.adapter.set(name, FeatureState::OFF).await
    }

    pub async fn add(&self, name: &str) -> AdapterResult<()> {
        self.adapter.add(name).await
    }

    pub async fn remove(&self, name: &str) -> AdapterResult<()> {
        self.adapter.remove(name).await
    }

    /// Loads `names` in one batch.
    ///
    /// When memoizing, the states land in the cache and later reads of those
    /// names are served without touching the backend.
    pub async fn preload<I, S>(&self, names: I) -> AdapterResult<HashMap<String, FeatureState>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        debug!(count = names.len(), "preloading flags");
        self.adapter.get_multi(&names).await
    }

    /// Loads every known flag in one call.
    pub async fn preload_all(&self) -> AdapterResult<HashMap<String, FeatureState>> {
        self.adapter.get_all().await
    }
}

impl fmt::Debug for FlagClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlagClient")
            .field("adapter", &self.adapter)
            .finish()
    }
}
