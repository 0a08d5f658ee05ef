//! A memoizing decorator over any [`Adapter`].
//!
//! While the switch is on, reads are answered from an in-memory cache and
//! only misses reach the wrapped backend. The switch and the cache belong to
//! the decorator instance: every request sharing one instance shares them
//! too. See [`MemoizeFlags`](super::MemoizeFlags) for how that plays out
//! under concurrent requests.

use std::{
    collections::{BTreeSet, HashMap},
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::trace;

use super::adapter::{Adapter, AdapterResult, FeatureState};

#[derive(Debug, Default)]
struct Cache {
    features: Option<BTreeSet<String>>,
    states: HashMap<String, FeatureState>,
    // Set once `get_all` has filled `states` for every name in `features`.
    all_loaded: bool,
    // Bumped on every clear or expiry. A backend read only fills the cache if
    // the generation it started under is still current.
    generation: u64,
}

impl Cache {
    fn clear(&mut self) {
        self.features = None;
        self.states.clear();
        self.all_loaded = false;
        self.generation += 1;
    }

    fn expire(&mut self, key: &str) {
        self.states.remove(key);
        self.features = None;
        self.all_loaded = false;
        self.generation += 1;
    }
}

/// Wraps an adapter with a switchable read cache.
///
/// Writes always go straight to the backend and expire the cached entries
/// they touch. A read that was already waiting on the backend when a write
/// (or a switch toggle) landed returns its result but does not cache it.
pub struct MemoizingAdapter {
    adapter: Arc<dyn Adapter>,
    memoize: AtomicBool,
    cache: Mutex<Cache>,
}

impl MemoizingAdapter {
    /// Wraps `adapter` with memoization switched off.
    pub fn new(adapter: Arc<dyn Adapter>) -> Self {
        Self {
            adapter,
            memoize: AtomicBool::new(false),
            cache: Mutex::new(Cache::default()),
        }
    }

    /// Turns memoization on or off. Either way the cache starts out empty.
    pub fn memoize(&self, value: bool) {
        self.cache.lock().clear();
        self.memoize.store(value, Ordering::SeqCst);
        trace!(adapter = self.adapter.name(), memoize = value, "memoize switch set");
    }

    pub fn memoizing(&self) -> bool {
        self.memoize.load(Ordering::SeqCst)
    }

    /// Returns `true` if a read of `key` would be served from the cache.
    pub fn is_cached(&self, key: &str) -> bool {
        self.memoizing() && self.cache.lock().states.contains_key(key)
    }

    /// The wrapped backend.
    pub fn inner(&self) -> &Arc<dyn Adapter> {
        &self.adapter
    }

    fn expire(&self, key: &str) {
        self.cache.lock().expire(key);
    }
}

impl fmt::Debug for MemoizingAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoizingAdapter")
            .field("adapter", &self.adapter.name())
            .field("memoizing", &self.memoizing())
            .finish()
    }
}

#[async_trait]
impl Adapter for MemoizingAdapter {
    fn name(&self) -> &str {
        self.adapter.name()
    }

    async fn features(&self) -> AdapterResult<BTreeSet<String>> {
        if !self.memoizing() {
            return self.adapter.features().await;
        }
        let (cached, generation) = {
            let cache = self.cache.lock();
            (cache.features.clone(), cache.generation)
        };
        if let Some(features) = cached {
            return Ok(features);
        }
        let features = self.adapter.features().await?;
        let mut cache = self.cache.lock();
        if cache.generation == generation {
            cache.features = Some(features.clone());
        }
        Ok(features)
    }

    async fn add(&self, key: &str) -> AdapterResult<()> {
        self.adapter.add(key).await?;
        self.expire(key);
        Ok(())
    }

    async fn remove(&self, key: &str) -> AdapterResult<()> {
        self.adapter.remove(key).await?;
        self.expire(key);
        Ok(())
    }

    async fn clear(&self, key: &str) -> AdapterResult<()> {
        self.adapter.clear(key).await?;
        self.expire(key);
        Ok(())
    }

    async fn get(&self, key: &str) -> AdapterResult<FeatureState> {
        if !self.memoizing() {
            return self.adapter.get(key).await;
        }
        let (cached, generation) = {
            let cache = self.cache.lock();
            (cache.states.get(key).copied(), cache.generation)
        };
        if let Some(state) = cached {
            return Ok(state);
        }
        let state = self.adapter.get(key).await?;
        let mut cache = self.cache.lock();
        if cache.generation == generation {
            cache.states.insert(key.to_owned(), state);
        } else {
            trace!(key, "stale read not cached");
        }
        Ok(state)
    }

    async fn set(&self, key: &str, state: FeatureState) -> AdapterResult<()> {
        self.adapter.set(key, state).await?;
        self.expire(key);
        Ok(())
    }

    async fn get_multi(&self, keys: &[String]) -> AdapterResult<HashMap<String, FeatureState>> {
        if !self.memoizing() {
            return self.adapter.get_multi(keys).await;
        }

        let mut states = HashMap::with_capacity(keys.len());
        let mut missing = Vec::new();
        let generation = {
            let cache = self.cache.lock();
            for key in keys {
                match cache.states.get(key) {
                    Some(state) => {
                        states.insert(key.clone(), *state);
                    }
                    None => missing.push(key.clone()),
                }
            }
            cache.generation
        };
        if missing.is_empty() {
            return Ok(states);
        }

        let fetched = self.adapter.get_multi(&missing).await?;
        let mut cache = self.cache.lock();
        let fresh = cache.generation == generation;
        for key in missing {
            let state = fetched.get(&key).copied().unwrap_or_default();
            if fresh {
                cache.states.insert(key.clone(), state);
            }
            states.insert(key, state);
        }
        Ok(states)
    }

    async fn get_all(&self) -> AdapterResult<HashMap<String, FeatureState>> {
        if !self.memoizing() {
            return self.adapter.get_all().await;
        }

        let generation = {
            let cache = self.cache.lock();
            if let (true, Some(features)) = (cache.all_loaded, &cache.features) {
                return Ok(features
                    .iter()
                    .map(|k| (k.clone(), cache.states.get(k).copied().unwrap_or_default()))
                    .collect());
            }
            cache.generation
        };

        let all = self.adapter.get_all().await?;
        let mut cache = self.cache.lock();
        if cache.generation != generation {
            return Ok(all);
        }
        cache.features = Some(all.keys().cloned().collect());
        cache.states.extend(all.iter().map(|(k, v)| (k.clone(), *v)));
        cache.all_loaded = true;
        Ok(all)
    }
}
