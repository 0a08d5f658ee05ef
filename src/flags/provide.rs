//! Attaches a [`FlagClient`] to each request context.

use std::{fmt, sync::Arc};

use tokio::sync::OnceCell;
use tracing::debug;

use super::client::FlagClient;
use crate::{
    Response, Result,
    context::Context,
    middleware::{BoxFuture, Middleware, Next},
};

type Factory = Arc<dyn Fn() -> Result<FlagClient> + Send + Sync + 'static>;

#[derive(Clone)]
enum Source {
    Ready(FlagClient),
    Lazy {
        factory: Factory,
        client: Arc<OnceCell<FlagClient>>,
    },
}

/// Middleware that makes a [`FlagClient`] available to everything after it.
///
/// Built either from a ready client or from a factory. A factory runs the
/// first time a request needs it; its client is then reused for every later
/// request through this middleware. A failing factory returns its error to
/// the caller and is retried on the next request.
///
/// If the context already holds a client (an outer layer attached one), that
/// client is left in place.
///
/// # Examples
///
/// ```rust,no_run
/// use flagware::{FlagClient, MemoryAdapter, flags::ProvideFlagClient};
///
/// // A client built up front.
/// let ready = ProvideFlagClient::new(FlagClient::new(MemoryAdapter::new()));
///
/// // A client built on first use.
/// let lazy = ProvideFlagClient::lazy(|| Ok(FlagClient::new(MemoryAdapter::new())));
/// ```
#[derive(Clone)]
pub struct ProvideFlagClient {
    source: Source,
}

impl ProvideFlagClient {
    pub fn new(client: FlagClient) -> Self {
        Self {
            source: Source::Ready(client),
        }
    }

    pub fn lazy<F>(factory: F) -> Self
    where
        F: Fn() -> Result<FlagClient> + Send + Sync + 'static,
    {
        Self {
            source: Source::Lazy {
                factory: Arc::new(factory),
                client: Arc::new(OnceCell::new()),
            },
        }
    }

    /// Returns the context's client, attaching this middleware's client first
    /// if the slot is empty.
    ///
    /// # Errors
    ///
    /// Whatever the factory returns when building the client fails.
    pub async fn ensure(&self, ctx: &mut Context) -> Result<FlagClient> {
        if let Some(existing) = ctx.flag_client() {
            return Ok(existing.clone());
        }
        let client = self.client().await?;
        ctx.extensions_mut().insert(client.clone());
        Ok(client)
    }

    async fn client(&self) -> Result<FlagClient> {
        match &self.source {
            Source::Ready(client) => Ok(client.clone()),
            Source::Lazy { factory, client } => client
                .get_or_try_init(|| async {
                    debug!("building flag client");
                    factory()
                })
                .await
                .cloned(),
        }
    }
}

impl fmt::Debug for ProvideFlagClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = match &self.source {
            Source::Ready(_) => "ready",
            Source::Lazy { client, .. } if client.initialized() => "lazy (built)",
            Source::Lazy { .. } => "lazy (pending)",
        };
        f.debug_struct("ProvideFlagClient")
            .field("source", &source)
            .finish()
    }
}

impl Middleware for ProvideFlagClient {
    fn handle(&self, mut ctx: Context, next: Next) -> BoxFuture<Result<Response>> {
        let this = self.clone();
        Box::pin(async move {
            this.ensure(&mut ctx).await?;
            next.run(ctx).await
        })
    }
}
