use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use flagware::{
    Context, Error, FlagClient, MemoryAdapter, Response, Server, StatusCode,
    flags::{FeatureState, MemoizeFlags, MemoizeOptions, ProvideFlagClient},
    middleware::Pipeline,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

async fn spawn(pipeline: Pipeline) -> SocketAddr {
    let server = Server::bind("127.0.0.1:0").await.unwrap();
    let addr = server.local_addr();
    tokio::spawn(server.serve(pipeline));
    addr
}

async fn get(addr: SocketAddr, path: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!("GET {path} HTTP/1.1\r\nHost: test\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut out = Vec::new();
    stream.read_to_end(&mut out).await.unwrap();
    String::from_utf8(out).unwrap()
}

/// Waits for the server task to finish with the response body.
async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

fn flag_pipeline(flags: &FlagClient, options: MemoizeOptions) -> Pipeline {
    Pipeline::new(|ctx: Context| async move {
        let flags = ctx.flag_client().ok_or(Error::MissingFlagClient)?;
        let memoizing = flags.adapter().memoizing();
        let search = flags.enabled("search").await?;
        Ok(Response::new(StatusCode::Ok).body(format!("memoizing={memoizing} search={search}")))
    })
    .with(ProvideFlagClient::new(flags.clone()))
    .with(MemoizeFlags::new(options))
}

#[tokio::test]
async fn flags_are_memoized_for_the_request_and_restored_after() {
    let flags = FlagClient::new(MemoryAdapter::with_flags([("search", FeatureState::ON)]));
    let addr = spawn(flag_pipeline(&flags, MemoizeOptions::new().preload(["search"]))).await;

    let reply = get(addr, "/").await;
    assert!(reply.starts_with("HTTP/1.1 200 OK\r\n"), "{reply}");
    assert!(reply.ends_with("memoizing=true search=true"), "{reply}");

    let adapter = flags.clone();
    wait_until(move || !adapter.adapter().memoizing()).await;
}

#[tokio::test]
async fn flag_changes_show_up_on_the_next_request() {
    let flags = FlagClient::new(MemoryAdapter::new());
    let addr = spawn(flag_pipeline(&flags, MemoizeOptions::new().preload_all(true))).await;

    assert!(get(addr, "/").await.ends_with("search=false"));

    flags.enable("search").await.unwrap();
    assert!(get(addr, "/").await.ends_with("search=true"));
}

#[tokio::test]
async fn missing_provisioner_is_a_500() {
    let pipeline = Pipeline::new(|_ctx| async { Ok(Response::new(StatusCode::Ok)) })
        .with(MemoizeFlags::default());
    let addr = spawn(pipeline).await;

    let reply = get(addr, "/").await;
    assert!(reply.starts_with("HTTP/1.1 500 Internal Server Error\r\n"), "{reply}");
}

#[tokio::test]
async fn lazy_client_is_built_once_across_connections() {
    let built = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let counter = Arc::clone(&built);
    let pipeline = Pipeline::new(|ctx: Context| async move {
        let flags = ctx.flag_client().ok_or(Error::MissingFlagClient)?;
        Ok(Response::new(StatusCode::Ok).body(format!("{}", flags.enabled("beta").await?)))
    })
    .with(ProvideFlagClient::lazy(move || {
        counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(FlagClient::new(MemoryAdapter::with_flags([("beta", FeatureState::ON)])))
    }))
    .with(MemoizeFlags::default());
    let addr = spawn(pipeline).await;

    for _ in 0..3 {
        assert!(get(addr, "/").await.ends_with("\r\n\r\ntrue"));
    }
    assert_eq!(built.load(std::sync::atomic::Ordering::SeqCst), 1);
}
