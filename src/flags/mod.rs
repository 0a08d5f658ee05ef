//! Feature flags for the middleware pipeline.
//!
//! - [`Adapter`] is the storage seam; [`MemoryAdapter`] is the bundled backend.
//! - [`MemoizingAdapter`] adds a switchable per-instance read cache.
//! - [`FlagClient`] is the handle handlers read flags through.
//! - [`ProvideFlagClient`] attaches a client to each request context.
//! - [`MemoizeFlags`] memoizes flag reads for the lifetime of a response.
//!
//! A typical stack installs the provisioner first:
//!
//! ```rust,no_run
//! use flagware::{
//!     FlagClient, MemoryAdapter, Response, StatusCode,
//!     flags::{MemoizeFlags, MemoizeOptions, ProvideFlagClient},
//!     middleware::Pipeline,
//! };
//!
//! let pipeline = Pipeline::new(|_ctx| async { Ok(Response::new(StatusCode::Ok)) })
//!     .with(ProvideFlagClient::lazy(|| Ok(FlagClient::new(MemoryAdapter::new()))))
//!     .with(MemoizeFlags::new(MemoizeOptions::new().preload(["search"])));
//! ```

pub mod adapter;
mod client;
mod memoize;
mod memoizing;
mod memory;
mod provide;

#[cfg(test)]
pub(crate) mod test_common;

pub use adapter::{Adapter, AdapterError, AdapterResult, FeatureState};
pub use client::FlagClient;
pub use memoize::{MemoizeFlags, MemoizeOptions};
pub use memoizing::MemoizingAdapter;
pub use memory::MemoryAdapter;
pub use provide::ProvideFlagClient;
