//! A small server that reads feature flags with per-request memoization.
//!
//! ```text
//! RUST_LOG=flagware=trace cargo run --example flags_server
//! FLAGWARE_MEMOIZE='{"preload_all":true}' cargo run --example flags_server
//! curl http://127.0.0.1:8080/flags
//! curl http://127.0.0.1:8080/stream
//! ```

use std::collections::BTreeMap;

use bytes::Bytes;
use flagware::{
    Context, Error, FlagClient, MemoryAdapter, Response, Server, StatusCode,
    error::BoxError,
    flags::{FeatureState, MemoizeFlags, MemoizeOptions, ProvideFlagClient},
    middleware::Pipeline,
};
use futures::StreamExt;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_ADDR: &str = "127.0.0.1:8080";

fn memoize_options() -> Result<MemoizeOptions, serde_json::Error> {
    match std::env::var("FLAGWARE_MEMOIZE") {
        Ok(json) => serde_json::from_str(&json),
        Err(_) => Ok(MemoizeOptions::new().preload(["search", "stats"])),
    }
}

async fn handle(ctx: Context) -> flagware::Result<Response> {
    let flags = ctx.flag_client().cloned().ok_or(Error::MissingFlagClient)?;

    match ctx.request().path() {
        "/flags" => {
            let mut states = BTreeMap::new();
            for name in flags.features().await? {
                let enabled = flags.enabled(&name).await?;
                states.insert(name, enabled);
            }
            let body = serde_json::to_vec(&states).map_err(Error::handler)?;
            Ok(Response::new(StatusCode::Ok)
                .header("Content-Type", "application/json")
                .body(body))
        }
        // Flags read while the body streams are still memoized.
        "/stream" => {
            let names = ["search", "stats", "beta"];
            let chunks = futures::stream::iter(names).then(move |name| {
                let flags = flags.clone();
                async move {
                    let enabled = flags.enabled(name).await?;
                    Ok::<_, BoxError>(Bytes::from(format!("{name}={enabled}\n")))
                }
            });
            Ok(Response::new(StatusCode::Ok).stream(chunks))
        }
        _ => Ok(Response::new(StatusCode::NotFound).body("Not Found")),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let options = memoize_options()?;
    info!(?options, "memoize options");

    let adapter = MemoryAdapter::with_flags([
        ("search", FeatureState::ON),
        ("stats", FeatureState::OFF),
        ("beta", FeatureState::ON),
    ]);
    let flags = FlagClient::new(adapter);

    let pipeline = Pipeline::new(handle)
        .with(ProvideFlagClient::new(flags))
        .with(MemoizeFlags::new(options));

    let addr = std::env::var("FLAGWARE_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.to_owned());
    let server = Server::bind(&addr).await?;
    server.serve(pipeline).await?;
    Ok(())
}
