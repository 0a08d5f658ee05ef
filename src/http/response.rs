//! HTTP/1.1 response builder.
//!
//! A [`Response`] is split into a serialized head and its [`Body`] by
//! [`Response::into_parts`] so the server can write the head first and then
//! stream the body chunk by chunk.

use bytes::{BufMut, Bytes, BytesMut};
use futures::stream::Stream;

use super::{Body, Headers, StatusCode};
use crate::error::BoxError;

/// An HTTP/1.1 response.
///
/// # Examples
///
/// ```
/// use flagware::http::{Response, StatusCode};
///
/// let response = Response::new(StatusCode::Ok)
///     .header("Content-Type", "application/json")
///     .body(r#"{"search":true}"#);
///
/// let (head, _body) = response.into_parts();
/// let head = std::str::from_utf8(&head).unwrap();
/// assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
/// assert!(head.contains("Content-Length: 15\r\n"));
/// ```
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: Headers,
    body: Body,
    keep_alive: bool,
}

impl Response {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Body::empty(),
            keep_alive: true,
        }
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Replaces the body, keeping any close hooks already registered on the old one.
    #[must_use]
    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.replace_body(body.into());
        self
    }

    /// Replaces the body with a lazily produced chunk stream.
    #[must_use]
    pub fn stream<S>(self, stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, BoxError>> + Send + 'static,
    {
        self.body(Body::stream(stream))
    }

    #[must_use]
    pub fn keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn is_keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// Registers a hook that runs once the body has been written, closed, or dropped.
    pub fn on_close(&mut self, hook: impl FnOnce() + Send + 'static) {
        self.body.on_close(hook);
    }

    pub fn into_body(self) -> Body {
        self.body
    }

    /// Serializes the status line and headers, and hands back the body.
    ///
    /// Adds `Content-Type: text/plain; charset=utf-8` to non-empty bodies that
    /// lack one, `Connection`, and either `Content-Length` (sized bodies) or
    /// `Transfer-Encoding: chunked` (streams).
    pub fn into_parts(self) -> (BytesMut, Body) {
        let Self {
            status,
            mut headers,
            body,
            keep_alive,
        } = self;

        let has_content = body.exact_len() != Some(0);
        if has_content && !headers.contains("content-type") {
            headers.insert("Content-Type", "text/plain; charset=utf-8");
        }
        headers.set("Connection", if keep_alive { "keep-alive" } else { "close" });
        match body.exact_len() {
            Some(len) => headers.set("Content-Length", len.to_string()),
            None => headers.set("Transfer-Encoding", "chunked"),
        }

        let mut head = BytesMut::with_capacity(64 + headers.len() * 48);
        head.put(format!("HTTP/1.1 {status}\r\n").as_bytes());
        for (name, value) in headers.iter() {
            head.put(format!("{name}: {value}\r\n").as_bytes());
        }
        head.put(&b"\r\n"[..]);

        (head, body)
    }

    fn replace_body(&mut self, mut body: Body) {
        body.adopt_hooks(&mut self.body);
        self.body = body;
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new(StatusCode::Ok)
    }
}
