//! Response bodies with completion hooks.
//!
//! A [`Body`] is either sized (empty or a single [`Bytes`] buffer) or a
//! stream of chunks produced lazily while the transport writes them. Code
//! that must run after the last byte leaves (releasing request-scoped state,
//! for instance) registers a hook with [`Body::on_close`].
//!
//! Hooks run exactly once, in registration order, when the body is dropped.
//! That covers every way a body can end: fully written and closed by the
//! server, abandoned after a client disconnect, or failed mid-stream.

use std::fmt;

use bytes::{Bytes, BytesMut};
use futures::stream::{BoxStream, Stream, StreamExt};

use crate::error::BoxError;

type CloseHook = Box<dyn FnOnce() + Send + 'static>;

enum Kind {
    Empty,
    Full(Bytes),
    Stream(BoxStream<'static, Result<Bytes, BoxError>>),
}

/// An HTTP response body.
///
/// # Examples
///
/// ```
/// use std::sync::{Arc, atomic::{AtomicBool, Ordering}};
/// use flagware::http::Body;
///
/// let closed = Arc::new(AtomicBool::new(false));
/// let mut body = Body::full("hello");
///
/// let flag = Arc::clone(&closed);
/// body.on_close(move || flag.store(true, Ordering::SeqCst));
///
/// assert!(!closed.load(Ordering::SeqCst));
/// body.close();
/// assert!(closed.load(Ordering::SeqCst));
/// ```
pub struct Body {
    kind: Kind,
    on_close: Vec<CloseHook>,
}

impl Body {
    pub fn empty() -> Self {
        Self {
            kind: Kind::Empty,
            on_close: Vec::new(),
        }
    }

    pub fn full(data: impl Into<Bytes>) -> Self {
        Self {
            kind: Kind::Full(data.into()),
            on_close: Vec::new(),
        }
    }

    /// Creates a body whose chunks are produced as the transport pulls them.
    ///
    /// Streamed bodies are sent with `Transfer-Encoding: chunked`.
    pub fn stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, BoxError>> + Send + 'static,
    {
        Self {
            kind: Kind::Stream(stream.boxed()),
            on_close: Vec::new(),
        }
    }

    /// Returns the body length when it is known up front.
    pub fn exact_len(&self) -> Option<usize> {
        match &self.kind {
            Kind::Empty => Some(0),
            Kind::Full(data) => Some(data.len()),
            Kind::Stream(_) => None,
        }
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self.kind, Kind::Stream(_))
    }

    /// Registers `hook` to run once this body is finished with.
    pub fn on_close(&mut self, hook: impl FnOnce() + Send + 'static) {
        self.on_close.push(Box::new(hook));
    }

    /// Pulls the next chunk, or `None` once the body is exhausted.
    pub async fn next_chunk(&mut self) -> Option<Result<Bytes, BoxError>> {
        match std::mem::replace(&mut self.kind, Kind::Empty) {
            Kind::Empty => None,
            Kind::Full(data) if data.is_empty() => None,
            Kind::Full(data) => Some(Ok(data)),
            Kind::Stream(mut stream) => {
                let chunk = stream.next().await;
                if chunk.is_some() {
                    self.kind = Kind::Stream(stream);
                }
                chunk
            }
        }
    }

    /// Reads the whole body into one buffer, then closes it.
    ///
    /// # Errors
    ///
    /// Returns the first error yielded by a streamed body. Close hooks still
    /// run in that case.
    pub async fn collect(mut self) -> Result<Bytes, BoxError> {
        let mut buf = BytesMut::new();
        while let Some(chunk) = self.next_chunk().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf.freeze())
    }

    /// Releases the body and runs its close hooks.
    pub fn close(self) {}

    /// Moves `previous`'s pending hooks ahead of this body's own.
    pub(crate) fn adopt_hooks(&mut self, previous: &mut Body) {
        let mut hooks = std::mem::take(&mut previous.on_close);
        hooks.append(&mut self.on_close);
        self.on_close = hooks;
    }

    fn run_close_hooks(&mut self) {
        for hook in self.on_close.drain(..) {
            hook();
        }
    }
}

impl Drop for Body {
    fn drop(&mut self) {
        self.run_close_hooks();
    }
}

impl Default for Body {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.kind {
            Kind::Empty => "empty",
            Kind::Full(_) => "full",
            Kind::Stream(_) => "stream",
        };
        f.debug_struct("Body")
            .field("kind", &kind)
            .field("len", &self.exact_len())
            .field("close_hooks", &self.on_close.len())
            .finish()
    }
}

impl From<String> for Body {
    fn from(s: String) -> Self {
        Self::full(s)
    }
}

impl From<&'static str> for Body {
    fn from(s: &'static str) -> Self {
        Self::full(s)
    }
}

impl From<Vec<u8>> for Body {
    fn from(v: Vec<u8>) -> Self {
        Self::full(v)
    }
}

impl From<Bytes> for Body {
    fn from(b: Bytes) -> Self {
        Self::full(b)
    }
}
