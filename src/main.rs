//! Gateway HTTP entrypoint.
//!
//! Launches an axum-based server exposing the MCP tool surface with optional
//! per-call micropayment gating:
//!
//! - `GET /tools/list` – public metadata for all registered tools
//! - `POST /tools/call` – invoke a tool, with a payment proof when required
//! - `GET /healthz` – liveness probe
//!
//! On startup the server registers the bundled demo tools, writes
//! `manifest.yaml`, and picks a settlement ledger backend: the remote
//! confirmation service named in the config, or an in-memory ledger for free
//! deployments.
//!
//! Environment:
//! - `.env` values loaded at startup
//! - `HOST`, `PORT` control the binding address
//! - `CONFIG` (or `--config`) names the JSON configuration file

use axum::Router;
use axum::http::Method;
use dotenvy::dotenv;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors;

use openmesh_gateway::config::Config;
use openmesh_gateway::demo;
use openmesh_gateway::gateway::InvocationGateway;
use openmesh_gateway::handlers;
use openmesh_gateway::manifest::ManifestPublisher;
use openmesh_gateway::registry::ToolRegistry;
use openmesh_gateway::settlement::{AnyLedger, HttpSettlementLedger, MemoryLedger};
use openmesh_gateway::sig_down::SigDown;
use openmesh_gateway::telemetry::Telemetry;
use openmesh_gateway::verifier::PaymentVerifier;

/// Initializes the gateway server.
///
/// - Loads `.env` variables and the JSON config.
/// - Registers the demo tools and publishes the manifest.
/// - Starts the axum HTTP server with graceful shutdown.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    let telemetry = Telemetry::new()
        .with_name(env!("CARGO_PKG_NAME"))
        .with_version(env!("CARGO_PKG_VERSION"))
        .register();

    let config = Config::load()?;
    let policy = config.policy();

    let mut registry = ToolRegistry::new();
    registry.register(demo::translate_tool())?;
    registry.register(demo::detect_language_tool())?;
    let registry = Arc::new(registry);

    ManifestPublisher::new(config.manifest_path())
        .publish(config.name(), env!("CARGO_PKG_VERSION"), &registry, &policy)?;

    let ledger = match config.ledger() {
        Some(url) => AnyLedger::Http(HttpSettlementLedger::new(url.clone())),
        None => {
            if policy.enabled {
                tracing::warn!(
                    "payment enabled without a ledger URL; every paid call will be rejected"
                );
            }
            AnyLedger::Memory(MemoryLedger::new())
        }
    };

    let gateway = Arc::new(InvocationGateway::new(
        registry,
        policy,
        PaymentVerifier::new(ledger),
    ));

    let http_endpoints = Router::new()
        .merge(handlers::routes().with_state(gateway))
        .layer(telemetry.http_tracing())
        .layer(
            cors::CorsLayer::new()
                .allow_origin(cors::Any)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers(cors::Any),
        );

    let addr = SocketAddr::new(config.host(), config.port());
    tracing::info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    let sig_down = SigDown::try_new()?;
    axum::serve(listener, http_endpoints)
        .with_graceful_shutdown(async move { sig_down.recv().await })
        .await?;

    Ok(())
}
