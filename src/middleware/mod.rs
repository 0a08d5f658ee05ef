//! Middleware pipeline: an ordered stack of layers in front of one endpoint.
//!
//! ## Core types
//!
//! - [`Middleware`]: trait implemented by every layer.
//! - [`Next`]: cursor into the remaining layers; [`Next::run`] advances it.
//! - [`Pipeline`]: the assembled stack plus its endpoint handler.
//!
//! Every layer returns [`Result<Response>`](crate::Result). Layers pass
//! downstream errors back up untouched; the server turns a final `Err` into a
//! `500` response.

use std::{future::Future, pin::Pin, sync::Arc};

use crate::{Response, Result, context::Context};

/// A boxed, `Send` future returned by layers and handlers.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// A type-erased, reference-counted middleware function.
pub type MiddlewareHandler =
    Arc<dyn Fn(Context, Next) -> BoxFuture<Result<Response>> + Send + Sync + 'static>;

/// A type-erased endpoint handler.
pub type Handler = Arc<dyn Fn(Context) -> BoxFuture<Result<Response>> + Send + Sync + 'static>;

/// Converts a [`Middleware`] implementation into a [`MiddlewareHandler`].
pub fn from_middleware<M>(middleware: Arc<M>) -> MiddlewareHandler
where
    M: Middleware + 'static,
{
    Arc::new(move |ctx: Context, next: Next| middleware.handle(ctx, next))
}

/// A cursor into the remaining middleware chain for a single request.
///
/// `Next` is consumed by [`run`](Self::run), so a layer can forward a
/// request at most once.
pub struct Next {
    middlewares: Arc<[MiddlewareHandler]>,
    endpoint: Handler,
    // Position of the layer the next `run` call invokes.
    index: usize,
}

impl Next {
    /// Invokes the next layer, or the endpoint once every layer has run.
    pub async fn run(mut self, ctx: Context) -> Result<Response> {
        match self.middlewares.get(self.index).cloned() {
            Some(layer) => {
                self.index += 1;
                layer(ctx, self).await
            }
            None => (self.endpoint)(ctx).await,
        }
    }
}

/// The core trait for all middleware.
///
/// Implementors receive a [`Context`] and a [`Next`] cursor. They may pass
/// the request through, short-circuit with their own response, or decorate
/// the downstream response (headers, body close hooks).
///
/// # Contract
///
/// - Implementations must be `Send + Sync`; one instance serves every request.
/// - `handle` must return a `'static`, `Send` future, so any configuration it
///   needs is cloned into the future before it is boxed.
/// - Errors from `next.run` are returned as-is.
pub trait Middleware: Send + Sync {
    fn handle(&self, ctx: Context, next: Next) -> BoxFuture<Result<Response>>;
}

/// An ordered middleware stack ending in an endpoint.
///
/// Layers run in the order they were added; the first one added sees the
/// request first and the response last.
///
/// # Examples
///
/// ```rust,no_run
/// use flagware::{
///     FlagClient, MemoryAdapter, Response, StatusCode,
///     flags::{MemoizeFlags, MemoizeOptions, ProvideFlagClient},
///     middleware::Pipeline,
/// };
///
/// let flags = FlagClient::new(MemoryAdapter::new());
/// let pipeline = Pipeline::new(|_ctx| async { Ok(Response::new(StatusCode::Ok)) })
///     .with(ProvideFlagClient::new(flags))
///     .with(MemoizeFlags::new(MemoizeOptions::default()));
/// ```
#[derive(Clone)]
pub struct Pipeline {
    middlewares: Vec<MiddlewareHandler>,
    endpoint: Handler,
}

impl Pipeline {
    /// Creates a pipeline with no layers in front of `endpoint`.
    pub fn new<F, Fut>(endpoint: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Response>> + Send + 'static,
    {
        let endpoint: Handler = Arc::new(move |ctx| Box::pin(endpoint(ctx)));
        Self {
            middlewares: Vec::new(),
            endpoint,
        }
    }

    /// Appends a layer below the ones already added.
    #[must_use]
    pub fn with<M>(self, middleware: M) -> Self
    where
        M: Middleware + 'static,
    {
        self.with_handler(from_middleware(Arc::new(middleware)))
    }

    #[must_use]
    pub fn with_handler(mut self, handler: MiddlewareHandler) -> Self {
        self.middlewares.push(handler);
        self
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Runs one request through every layer and the endpoint.
    pub async fn call(&self, ctx: Context) -> Result<Response> {
        let next = Next {
            middlewares: self.middlewares.clone().into(),
            endpoint: Arc::clone(&self.endpoint),
            index: 0,
        };
        next.run(ctx).await
    }
}
