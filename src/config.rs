//! Configuration for the gateway server.
//!
//! Layering: `.env` is loaded by the binary, a JSON config file is named via `--config`
//! (or the `CONFIG` env var), and individual fields fall back to environment
//! variables, then to hardcoded defaults. A missing config file is not an
//! error; everything has a default and payment is simply disabled.

use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::net::IpAddr;
use std::path::PathBuf;
use url::Url;

use crate::types::{Address, Asset, MoneyAmount, NetworkId, PaymentPolicy};

/// CLI arguments for the gateway server.
#[derive(Parser, Debug)]
#[command(name = "openmesh-gateway")]
#[command(about = "Payment-gated MCP tool gateway server")]
struct CliArgs {
    /// Path to the JSON configuration file
    #[arg(long, short, env = "CONFIG", default_value = "config.json")]
    config: PathBuf,
}

/// Payment terms block. Its presence in the config enables payment, matching
/// the original framework's toggle: no block means free to use.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfig {
    pub amount: MoneyAmount,
    pub asset: Asset,
    pub network: NetworkId,
    pub recipient: Address,
}

/// Server configuration.
///
/// Fields use serde defaults that fall back to environment variables, then to
/// hardcoded defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "config_defaults::default_port")]
    port: u16,
    #[serde(default = "config_defaults::default_host")]
    host: IpAddr,
    #[serde(default = "config_defaults::default_name")]
    name: String,
    #[serde(default)]
    payment: Option<PaymentConfig>,
    /// Base URL of the remote settlement confirmation service. Without it the
    /// server falls back to an empty in-memory ledger, useful only for free
    /// deployments and local experiments.
    #[serde(default)]
    ledger: Option<Url>,
    #[serde(default = "config_defaults::default_manifest_path")]
    manifest_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: config_defaults::default_port(),
            host: config_defaults::default_host(),
            name: config_defaults::default_name(),
            payment: None,
            ledger: None,
            manifest_path: config_defaults::default_manifest_path(),
        }
    }
}

pub mod config_defaults {
    use std::env;
    use std::net::IpAddr;
    use std::path::PathBuf;

    pub const DEFAULT_PORT: u16 = 8080;
    pub const DEFAULT_HOST: &str = "0.0.0.0";
    pub const DEFAULT_NAME: &str = "translation-service";
    pub const DEFAULT_MANIFEST_PATH: &str = "manifest.yaml";

    /// Returns the default port value with fallback: $PORT env var -> 8080
    pub fn default_port() -> u16 {
        env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_PORT)
    }

    /// Returns the default host value with fallback: $HOST env var -> "0.0.0.0"
    pub fn default_host() -> IpAddr {
        env::var("HOST")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(IpAddr::V4([0, 0, 0, 0].into()))
    }

    /// Returns the service name with fallback: $SERVICE_NAME env var -> default
    pub fn default_name() -> String {
        env::var("SERVICE_NAME").unwrap_or_else(|_| DEFAULT_NAME.to_string())
    }

    pub fn default_manifest_path() -> PathBuf {
        env::var("MANIFEST_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_MANIFEST_PATH))
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl Config {
    /// Loads configuration from CLI arguments and environment.
    ///
    /// A nonexistent config file yields the defaults; a present but malformed
    /// one is an error.
    pub fn load() -> Result<Self, ConfigError> {
        let args = CliArgs::parse();
        Self::from_file(&args.config)
    }

    fn from_file(path: &PathBuf) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "no config file, using defaults");
            return Ok(Config::default());
        }
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn host(&self) -> IpAddr {
        self.host
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ledger(&self) -> Option<&Url> {
        self.ledger.as_ref()
    }

    pub fn manifest_path(&self) -> &PathBuf {
        &self.manifest_path
    }

    /// The effective payment policy: enabled iff a payment block is present.
    pub fn policy(&self) -> PaymentPolicy {
        match &self.payment {
            Some(payment) => PaymentPolicy {
                enabled: true,
                amount: payment.amount,
                asset: payment.asset.clone(),
                network: payment.network.clone(),
                recipient: payment.recipient.clone(),
            },
            None => PaymentPolicy::disabled(),
        }
    }
}
