//! Tracing initialization for the gateway server.
//!
//! Structured logging through `tracing`, filtered by `RUST_LOG` with an
//! `info` default, plus the HTTP trace layer attached to the axum router.

use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

/// Builder-style telemetry registration.
#[derive(Debug, Clone, Default)]
pub struct Telemetry {
    name: Option<&'static str>,
    version: Option<&'static str>,
}

impl Telemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = Some(name);
        self
    }

    pub fn with_version(mut self, version: &'static str) -> Self {
        self.version = Some(version);
        self
    }

    /// Installs the global tracing subscriber. Call once, at startup.
    pub fn register(self) -> Self {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        tracing_subscriber::fmt().with_env_filter(filter).init();
        tracing::info!(
            service = self.name.unwrap_or("unknown"),
            version = self.version.unwrap_or("unknown"),
            "telemetry initialized"
        );
        self
    }

    /// The HTTP request tracing layer for the axum router.
    pub fn http_tracing(&self) -> TraceLayer<SharedClassifier<ServerErrorsAsFailures>> {
        TraceLayer::new_for_http()
    }
}
