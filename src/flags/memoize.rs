//! Request-scoped flag memoization.
//!
//! [`MemoizeFlags`] switches the client's [`MemoizingAdapter`] on for the
//! duration of a request, optionally warms its cache, and puts the switch
//! back the way it found it once the response body is finished.
//!
//! # Shared adapters
//!
//! The memoize switch belongs to the adapter instance, not to the request.
//! When one client is shared by requests that run at the same time, one
//! request's activation is visible to the others, and the first request to
//! finish restores its own snapshot underneath the rest. That is only safe
//! when at most one request uses a given client at a time, when each request
//! gets its own client, or when [`MemoizeOptions::isolated`] is set, which
//! gives every request a private memoizing layer over the shared backend.
//!
//! [`MemoizingAdapter`]: super::MemoizingAdapter

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, trace};

use super::client::FlagClient;
use crate::{
    Error, Response, Result,
    context::Context,
    middleware::{BoxFuture, Middleware, Next},
};

/// Configuration for [`MemoizeFlags`].
///
/// Deserializes from JSON (or any serde format); omitted fields take their
/// defaults and unknown fields are rejected.
///
/// ```
/// use flagware::flags::MemoizeOptions;
///
/// let options: MemoizeOptions =
///     serde_json::from_str(r#"{ "preload": ["stats", "search"] }"#).unwrap();
/// assert!(!options.preload_all);
/// assert_eq!(options.preload, vec!["stats", "search"]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MemoizeOptions {
    /// Load every known flag before the handler runs.
    pub preload_all: bool,
    /// Load these flags before the handler runs. Applied after, and in
    /// addition to, `preload_all`.
    pub preload: Vec<String>,
    /// Memoize in a request-private layer instead of the shared one.
    pub isolated: bool,
}

impl MemoizeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn preload_all(mut self, preload_all: bool) -> Self {
        self.preload_all = preload_all;
        self
    }

    #[must_use]
    pub fn preload<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.preload.extend(names.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn isolated(mut self, isolated: bool) -> Self {
        self.isolated = isolated;
        self
    }
}

/// Puts the memoize switch back when dropped.
///
/// Owned by exactly one place at a time: the handling future until the
/// downstream response arrives, then the response body's close hook. Every
/// exit path (error, panic, cancellation, body closed or abandoned) drops it
/// exactly once.
struct RestoreMemoize {
    client: FlagClient,
    original: bool,
}

impl Drop for RestoreMemoize {
    fn drop(&mut self) {
        self.client.adapter().memoize(self.original);
        trace!(original = self.original, "flag memoization restored");
    }
}

/// Middleware that memoizes flag reads for the lifetime of each response.
///
/// Requires a [`FlagClient`] in the context, normally attached by
/// [`ProvideFlagClient`](super::ProvideFlagClient) earlier in the pipeline;
/// without one the request fails with [`Error::MissingFlagClient`].
///
/// Per request:
///
/// 1. snapshot the client's memoize switch and turn it on;
/// 2. preload all flags (`preload_all`), then the named ones (`preload`);
/// 3. run the rest of the pipeline;
/// 4. on success, restore the switch when the response body closes, so
///    streamed bodies that read flags keep the cache;
/// 5. on error, restore the switch immediately and return the error as is.
///
/// See the [module docs](self) for the shared-adapter caveat.
///
/// # Examples
///
/// ```rust,no_run
/// use flagware::flags::{MemoizeFlags, MemoizeOptions};
///
/// let plain = MemoizeFlags::default();
/// let warmed = MemoizeFlags::new(MemoizeOptions::new().preload(["stats", "search"]));
/// let everything = MemoizeFlags::new(MemoizeOptions::new().preload_all(true));
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoizeFlags {
    options: Arc<MemoizeOptions>,
}

impl MemoizeFlags {
    pub fn new(options: MemoizeOptions) -> Self {
        Self {
            options: Arc::new(options),
        }
    }

    pub fn options(&self) -> &MemoizeOptions {
        &self.options
    }
}

impl Middleware for MemoizeFlags {
    fn handle(&self, mut ctx: Context, next: Next) -> BoxFuture<Result<Response>> {
        let options = Arc::clone(&self.options);
        Box::pin(async move {
            let mut client = ctx
                .flag_client()
                .cloned()
                .ok_or(Error::MissingFlagClient)?;

            if options.isolated {
                client = client.scoped();
                ctx.extensions_mut().insert(client.clone());
            }

            let original = client.adapter().memoizing();
            client.adapter().memoize(true);
            let restore = RestoreMemoize {
                client: client.clone(),
                original,
            };
            debug!(
                original,
                isolated = options.isolated,
                "flag memoization enabled"
            );

            if options.preload_all {
                let names = client.features().await?;
                client.preload(names).await?;
            }
            if !options.preload.is_empty() {
                client.preload(options.preload.iter().cloned()).await?;
            }

            let mut response = next.run(ctx).await?;
            response.on_close(move || drop(restore));
            Ok(response)
        })
    }
}
