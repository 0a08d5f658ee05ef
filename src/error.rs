//! Crate-wide error type for the middleware pipeline.

use thiserror::Error;

use crate::flags::AdapterError;

/// A boxed, thread-safe error used for handler failures and body streams.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that travel back up the middleware pipeline.
///
/// Middleware in this crate never wraps or rewrites an error it receives from
/// downstream; whatever a handler returns reaches the server unchanged.
#[derive(Debug, Error)]
pub enum Error {
    /// The request context holds no [`FlagClient`](crate::flags::FlagClient).
    ///
    /// This is a wiring mistake: [`ProvideFlagClient`](crate::flags::ProvideFlagClient)
    /// must run before [`MemoizeFlags`](crate::flags::MemoizeFlags).
    #[error("no flag client in request context; install ProvideFlagClient ahead of MemoizeFlags")]
    MissingFlagClient,

    #[error("flag adapter error: {0}")]
    Adapter(#[from] AdapterError),

    /// An application-level failure raised by a handler.
    #[error(transparent)]
    Handler(BoxError),
}

impl Error {
    /// Wraps an arbitrary handler error.
    pub fn handler(err: impl Into<BoxError>) -> Self {
        Self::Handler(err.into())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
