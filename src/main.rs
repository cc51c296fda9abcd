//! `http-front` binary.
//!
//! Runs the component with a small demo route set. The same binary is the
//! master and, re-executed with a worker index, each worker.

use std::path::PathBuf;

use axum::http::{header, HeaderValue, StatusCode};
use clap::Parser;
use tracing::Instrument;

use http_front::cluster::Role;
use http_front::config::{load_config, HttpConfig};
use http_front::lifecycle::shutdown_signal;
use http_front::observability::{logging, metrics};
use http_front::pipeline::{handler_fn, Flow};
use http_front::routing::RouteTableBuilder;
use http_front::HttpComponent;

#[derive(Debug, Parser)]
#[command(name = "http-front", version, about = "HTTP(S) front-end with optional worker cluster")]
struct Args {
    /// Path to a TOML config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Default log level when RUST_LOG is unset.
    #[arg(long)]
    log_level: Option<String>,
}

fn demo_routes(routes: &mut RouteTableBuilder) {
    routes.get(
        "/status",
        handler_fn(|ctx| {
            let body = serde_json::json!({
                "status": "ok",
                "pid": std::process::id(),
                "request_id": ctx.request_id,
            });
            ctx.json(StatusCode::OK, &body)?;
            Ok(Flow::Next)
        }),
    );
    routes.post(
        "/echo",
        handler_fn(|ctx| {
            let value = ctx.body.as_value().map(|v| v.into_owned()).unwrap_or_default();
            ctx.json(StatusCode::OK, &value)?;
            Ok(Flow::Next)
        }),
    );
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => HttpConfig::default(),
    };
    let level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.observability.log_level.clone());
    logging::init(&level);

    let role = Role::detect(config.cluster.enabled);
    run(config, role)
        .instrument(logging::process_span(role.as_str()))
        .await
}

async fn run(config: HttpConfig, role: Role) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(version = env!("CARGO_PKG_VERSION"), role = %role, "http-front starting");

    if config.observability.metrics_enabled && !matches!(role, Role::Worker { .. }) {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let mut component = HttpComponent::builder(config)
        .role(role)
        .after_filter(handler_fn(|ctx| {
            ctx.set_response_header(header::SERVER, HeaderValue::from_static("http-front"));
            Ok(Flow::Next)
        }))
        .routes(demo_routes)
        .build()
        .await?;

    component.start().await?;
    component.after_start().await?;

    let cause = shutdown_signal(role).await;

    // A second interrupt skips the drain.
    let force = tokio::select! {
        result = component.stop(false) => {
            result?;
            false
        }
        _ = shutdown_signal(Role::Single) => true,
    };
    if force {
        tracing::warn!(first = ?cause, "Second stop request, forcing shutdown");
        component.stop(true).await?;
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
