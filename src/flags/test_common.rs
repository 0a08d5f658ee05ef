//! Shared fixtures for flag tests.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use super::adapter::{Adapter, AdapterError, AdapterResult, FeatureState};
use super::client::FlagClient;
use super::memory::MemoryAdapter;
use crate::{Context, Request};

/// One backend call observed by [`RecordingAdapter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Features,
    Get(String),
    GetMulti(Vec<String>),
    GetAll,
    Add(String),
    Remove(String),
    Clear(String),
    Set(String, FeatureState),
}

/// An in-memory backend that records every call and can be told to fail.
#[derive(Default)]
pub(crate) struct RecordingAdapter {
    inner: MemoryAdapter,
    calls: Mutex<Vec<Call>>,
    failure: Mutex<Option<String>>,
}

impl RecordingAdapter {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn with_flags<const N: usize>(flags: [(&str, FeatureState); N]) -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryAdapter::with_flags(flags),
            ..Self::default()
        })
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub(crate) fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().iter().filter(|c| pred(c)).count()
    }

    /// Makes every following call fail with [`AdapterError::Unavailable`].
    pub(crate) fn fail_with(&self, message: &str) {
        *self.failure.lock() = Some(message.to_owned());
    }

    pub(crate) fn recover(&self) {
        *self.failure.lock() = None;
    }

    fn record(&self, call: Call) -> AdapterResult<()> {
        self.calls.lock().push(call);
        match self.failure.lock().as_ref() {
            Some(message) => Err(AdapterError::Unavailable(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Adapter for RecordingAdapter {
    fn name(&self) -> &str {
        "recording"
    }

    async fn features(&self) -> AdapterResult<BTreeSet<String>> {
        self.record(Call::Features)?;
        self.inner.features().await
    }

    async fn add(&self, key: &str) -> AdapterResult<()> {
        self.record(Call::Add(key.to_owned()))?;
        self.inner.add(key).await
    }

    async fn remove(&self, key: &str) -> AdapterResult<()> {
        self.record(Call::Remove(key.to_owned()))?;
        self.inner.remove(key).await
    }

    async fn clear(&self, key: &str) -> AdapterResult<()> {
        self.record(Call::Clear(key.to_owned()))?;
        self.inner.clear(key).await
    }

    async fn get(&self, key: &str) -> AdapterResult<FeatureState> {
        self.record(Call::Get(key.to_owned()))?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, state: FeatureState) -> AdapterResult<()> {
        self.record(Call::Set(key.to_owned(), state))?;
        self.inner.set(key, state).await
    }

    async fn get_multi(&self, keys: &[String]) -> AdapterResult<HashMap<String, FeatureState>> {
        self.record(Call::GetMulti(keys.to_vec()))?;
        self.inner.get_multi(keys).await
    }

    async fn get_all(&self) -> AdapterResult<HashMap<String, FeatureState>> {
        self.record(Call::GetAll)?;
        self.inner.get_all().await
    }
}

/// An in-memory backend whose next read parks until released.
///
/// `arm` makes the next `get` or `get_multi` signal `entered` and then wait
/// for `release`; every other call goes straight through.
#[derive(Default)]
pub(crate) struct GatedAdapter {
    inner: MemoryAdapter,
    armed: AtomicBool,
    pub(crate) entered: Notify,
    pub(crate) release: Notify,
}

impl GatedAdapter {
    pub(crate) fn with_flags<const N: usize>(flags: [(&str, FeatureState); N]) -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryAdapter::with_flags(flags),
            ..Self::default()
        })
    }

    pub(crate) fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    async fn gate(&self) {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
    }
}

#[async_trait]
impl Adapter for GatedAdapter {
    fn name(&self) -> &str {
        "gated"
    }

    async fn features(&self) -> AdapterResult<BTreeSet<String>> {
        self.inner.features().await
    }

    async fn add(&self, key: &str) -> AdapterResult<()> {
        self.inner.add(key).await
    }

    async fn remove(&self, key: &str) -> AdapterResult<()> {
        self.inner.remove(key).await
    }

    async fn clear(&self, key: &str) -> AdapterResult<()> {
        self.inner.clear(key).await
    }

    async fn get(&self, key: &str) -> AdapterResult<FeatureState> {
        let state = self.inner.get(key).await?;
        self.gate().await;
        Ok(state)
    }

    async fn set(&self, key: &str, state: FeatureState) -> AdapterResult<()> {
        self.inner.set(key, state).await
    }

    async fn get_multi(&self, keys: &[String]) -> AdapterResult<HashMap<String, FeatureState>> {
        let states = self.inner.get_multi(keys).await?;
        self.gate().await;
        Ok(states)
    }
}

/// A client over `backend`, sharing it so calls stay observable.
pub(crate) fn client(backend: &Arc<RecordingAdapter>) -> FlagClient {
    FlagClient::from_shared(Arc::clone(backend) as Arc<dyn Adapter>)
}

pub(crate) fn context(path: &str) -> Context {
    let raw = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\n\r\n");
    let (request, _) = Request::parse(raw.as_bytes()).unwrap();
    Context::new(request)
}

/// A handler-level failure used to check errors pass through untouched.
#[derive(Debug, thiserror::Error)]
#[error("network error: {0}")]
pub(crate) struct NetworkError(pub(crate) &'static str);
