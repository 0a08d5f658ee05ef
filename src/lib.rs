//! # flagware
//!
//! Request-scoped feature flags for an async HTTP/1.1 middleware pipeline.
//!
//! Two layers do the work:
//!
//! - [`ProvideFlagClient`](flags::ProvideFlagClient) makes a [`FlagClient`]
//!   available in every request [`Context`].
//! - [`MemoizeFlags`](flags::MemoizeFlags) caches flag reads for the life of
//!   one response, optionally preloading flags before the handler runs.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use flagware::{
//!     Context, Error, FlagClient, MemoryAdapter, Response, Server, StatusCode,
//!     flags::{FeatureState, MemoizeFlags, MemoizeOptions, ProvideFlagClient},
//!     middleware::Pipeline,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let flags = FlagClient::new(MemoryAdapter::with_flags([("search", FeatureState::ON)]));
//!
//!     let pipeline = Pipeline::new(|ctx: Context| async move {
//!         let flags = ctx.flag_client().ok_or(Error::MissingFlagClient)?;
//!         let body = if flags.enabled("search").await? { "search on" } else { "search off" };
//!         Ok(Response::new(StatusCode::Ok).body(body))
//!     })
//!     .with(ProvideFlagClient::new(flags))
//!     .with(MemoizeFlags::new(MemoizeOptions::new().preload(["search"])));
//!
//!     let server = Server::bind("127.0.0.1:8080").await?;
//!     server.serve(pipeline).await?;
//!     Ok(())
//! }
//! ```

pub mod context;
pub mod error;
pub mod flags;
pub mod http;
pub mod middleware;
pub mod server;

pub use context::Context;
pub use error::{Error, Result};
pub use flags::{FlagClient, MemoryAdapter};
pub use http::{Body, Headers, Method, Request, Response, StatusCode};
pub use server::{Server, ServerError};
