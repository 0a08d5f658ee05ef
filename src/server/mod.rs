//! Async TCP server using Tokio.
//!
//! Accepts TCP connections and runs every HTTP/1.1 request through a
//! [`Pipeline`]. Connections are persistent unless either side asks for
//! `Connection: close`.

use std::io;
use std::net::SocketAddr;

use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::{
    context::Context,
    http::{Request, RequestError, Response, StatusCode},
    middleware::Pipeline,
};

/// Errors produced by the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
}

/// Maximum size of a buffered request before it is rejected (8 MiB).
const MAX_REQUEST_SIZE: usize = 8 * 1024 * 1024;

const INITIAL_BUF_SIZE: usize = 4096;

/// The flagware HTTP server.
///
/// # Examples
///
/// ```rust,no_run
/// use flagware::{Response, Server, StatusCode, middleware::Pipeline};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let server = Server::bind("127.0.0.1:8080").await?;
///     let pipeline = Pipeline::new(|_ctx| async { Ok(Response::new(StatusCode::Ok).body("Hello!")) });
///     server.serve(pipeline).await?;
///     Ok(())
/// }
/// ```
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Server {
    /// Binds the server to the given TCP address.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address cannot be bound.
    pub async fn bind(addr: impl AsRef<str>) -> Result<Self, ServerError> {
        let addr = addr.as_ref();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: addr.to_owned(),
                source: e,
            })?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts connections forever, one task per connection.
    ///
    /// A request whose pipeline returns `Err` is answered with
    /// `500 Internal Server Error`; the error itself is logged, never sent.
    ///
    /// # Errors
    ///
    /// Only returns if the listener itself fails irrecoverably.
    pub async fn serve(self, pipeline: Pipeline) -> Result<(), ServerError> {
        info!(addr = %self.local_addr, layers = pipeline.len(), "server listening");

        loop {
            let (stream, peer_addr) = match self.listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    error!(error = %e, "failed to accept connection");
                    continue;
                }
            };

            debug!(peer = %peer_addr, "connection accepted");
            let pipeline = pipeline.clone();

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, peer_addr, pipeline).await {
                    warn!(peer = %peer_addr, error = %e, "connection closed with error");
                }
            });
        }
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    pipeline: Pipeline,
) -> io::Result<()> {
    let mut buf = BytesMut::with_capacity(INITIAL_BUF_SIZE);

    loop {
        let bytes_read = stream.read_buf(&mut buf).await?;
        if bytes_read == 0 {
            debug!(peer = %peer_addr, "connection closed by peer");
            break;
        }

        if buf.len() > MAX_REQUEST_SIZE {
            warn!(peer = %peer_addr, "request too large, sending 413");
            let response = Response::new(StatusCode::PayloadTooLarge)
                .body("Request entity too large")
                .keep_alive(false);
            write_response(&mut stream, response).await?;
            break;
        }

        let (request, body_offset) = match Request::parse(&buf) {
            Ok(pair) => pair,
            Err(RequestError::Incomplete) => continue,
            Err(e) => {
                warn!(peer = %peer_addr, error = %e, "bad request, sending 400");
                let response = Response::new(StatusCode::BadRequest)
                    .body(format!("Bad Request: {e}"))
                    .keep_alive(false);
                write_response(&mut stream, response).await?;
                break;
            }
        };

        let declared = request.content_length().unwrap_or(0);
        let total_needed = match body_offset.checked_add(declared) {
            Some(total) if total <= MAX_REQUEST_SIZE => total,
            _ => {
                warn!(peer = %peer_addr, content_length = declared, "declared body too large, sending 413");
                let response = Response::new(StatusCode::PayloadTooLarge)
                    .body("Request entity too large")
                    .keep_alive(false);
                write_response(&mut stream, response).await?;
                break;
            }
        };
        if buf.len() < total_needed {
            continue;
        }

        let keep_alive = request.is_keep_alive();
        debug!(
            peer = %peer_addr,
            method = %request.method(),
            path = %request.path(),
            "dispatching request"
        );

        let response = match pipeline.call(Context::new(request)).await {
            Ok(response) => response,
            Err(e) => {
                error!(peer = %peer_addr, error = %e, "request failed");
                Response::new(StatusCode::InternalServerError).body("Internal Server Error")
            }
        };
        let keep_alive = keep_alive && response.is_keep_alive();
        write_response(&mut stream, response.keep_alive(keep_alive)).await?;

        let _ = buf.split_to(total_needed);

        if !keep_alive {
            debug!(peer = %peer_addr, "Connection: close, shutting down");
            break;
        }
    }

    Ok(())
}

/// Writes the head, then the body chunk by chunk, then closes the body.
///
/// Streamed bodies use chunked transfer encoding. If the write fails or the
/// stream yields an error, the body is dropped on the way out and its close
/// hooks still run.
async fn write_response(stream: &mut TcpStream, response: Response) -> io::Result<()> {
    let (head, mut body) = response.into_parts();
    let chunked = body.is_streaming();
    stream.write_all(&head).await?;

    while let Some(chunk) = body.next_chunk().await {
        let chunk = chunk.map_err(io::Error::other)?;
        if !chunked {
            stream.write_all(&chunk).await?;
        } else if !chunk.is_empty() {
            // An empty chunk would terminate the message early.
            stream
                .write_all(format!("{:x}\r\n", chunk.len()).as_bytes())
                .await?;
            stream.write_all(&chunk).await?;
            stream.write_all(b"\r\n").await?;
        }
    }
    if chunked {
        stream.write_all(b"0\r\n\r\n").await?;
    }
    stream.flush().await?;
    body.close();
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use bytes::Bytes;
    use futures::StreamExt;

    use super::*;
    use crate::error::{BoxError, Error};

    async fn spawn(pipeline: Pipeline) -> SocketAddr {
        let server = Server::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr();
        tokio::spawn(server.serve(pipeline));
        addr
    }

    async fn roundtrip(addr: SocketAddr, raw: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(raw.as_bytes()).await.unwrap();
        let mut out = Vec::new();
        stream.read_to_end(&mut out).await.unwrap();
        String::from_utf8(out).unwrap()
    }

    #[tokio::test]
    async fn serves_sized_body() {
        let addr = spawn(Pipeline::new(|ctx: Context| async move {
            Ok(Response::new(StatusCode::Ok).body(format!("path={}", ctx.request().path())))
        }))
        .await;

        let reply = roundtrip(addr, "GET /hello HTTP/1.1\r\nConnection: close\r\n\r\n").await;
        assert!(reply.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(reply.contains("Content-Length: 11\r\n"));
        assert!(reply.ends_with("\r\n\r\npath=/hello"));
    }

    #[tokio::test]
    async fn streams_chunked_body_and_runs_close_hooks() {
        let closed = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&closed);
        let addr = spawn(Pipeline::new(move |_ctx| {
            let flag = Arc::clone(&flag);
            async move {
                let chunks = futures::stream::iter(["ab", "", "cde"])
                    .map(|s| Ok::<_, BoxError>(Bytes::from_static(s.as_bytes())));
                let mut response = Response::new(StatusCode::Ok).stream(chunks);
                response.on_close(move || flag.store(true, Ordering::SeqCst));
                Ok(response)
            }
        }))
        .await;

        let reply = roundtrip(addr, "GET / HTTP/1.1\r\nConnection: close\r\n\r\n").await;
        assert!(reply.contains("Transfer-Encoding: chunked\r\n"));
        assert!(reply.ends_with("\r\n\r\n2\r\nab\r\n3\r\ncde\r\n0\r\n\r\n"));
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn pipeline_error_becomes_500() {
        let addr = spawn(Pipeline::new(|_ctx| async {
            Err(Error::handler("database exploded"))
        }))
        .await;

        let reply = roundtrip(addr, "GET / HTTP/1.1\r\nConnection: close\r\n\r\n").await;
        assert!(reply.starts_with("HTTP/1.1 500 Internal Server Error\r\n"));
        assert!(!reply.contains("database exploded"));
    }

    #[tokio::test]
    async fn oversized_content_length_gets_413() {
        let addr = spawn(Pipeline::new(|_ctx| async { Ok(Response::new(StatusCode::Ok)) })).await;

        let huge = format!("POST / HTTP/1.1\r\nContent-Length: {}\r\n\r\n", usize::MAX);
        let reply = roundtrip(addr, &huge).await;
        assert!(reply.starts_with("HTTP/1.1 413 Payload Too Large\r\n"), "{reply}");

        let over_limit = format!(
            "POST / HTTP/1.1\r\nContent-Length: {}\r\n\r\n",
            MAX_REQUEST_SIZE + 1
        );
        let reply = roundtrip(addr, &over_limit).await;
        assert!(reply.starts_with("HTTP/1.1 413 Payload Too Large\r\n"), "{reply}");
    }

    #[tokio::test]
    async fn malformed_request_gets_400() {
        let addr = spawn(Pipeline::new(|_ctx| async { Ok(Response::new(StatusCode::Ok)) })).await;
        let reply = roundtrip(addr, "NOT A REQUEST\r\n\r\n").await;
        assert!(reply.starts_with("HTTP/1.1 400 Bad Request\r\n"));
    }
}
