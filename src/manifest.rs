//! Startup-time manifest publishing.
//!
//! The manifest is the discovery artifact of a gateway deployment: service
//! identity, the tool catalog, and the payment terms, written as
//! `manifest.yaml` once at startup. Publishing is idempotent; a restart
//! overwrites the previous artifact.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::registry::{ToolMetadata, ToolRegistry};
use crate::types::PaymentPolicy;

/// The manifest document as written to disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub name: String,
    pub version: String,
    pub tools: Vec<ToolMetadata>,
    pub payment: PaymentPolicy,
}

/// Errors raised while writing the manifest artifact.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("failed to serialize manifest: {0}")]
    Serialize(#[from] serde_yaml::Error),
    #[error("failed to write manifest to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Writes the manifest artifact for a gateway instance.
#[derive(Debug, Clone)]
pub struct ManifestPublisher {
    path: PathBuf,
}

impl ManifestPublisher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        ManifestPublisher { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serializes the registry snapshot and payment terms to the manifest
    /// path, replacing any previous artifact.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError`] on serialization or filesystem failure.
    pub fn publish(
        &self,
        name: &str,
        version: &str,
        registry: &ToolRegistry,
        policy: &PaymentPolicy,
    ) -> Result<(), ManifestError> {
        let manifest = Manifest {
            name: name.to_string(),
            version: version.to_string(),
            tools: registry.list(),
            payment: policy.clone(),
        };
        let yaml = serde_yaml::to_string(&manifest)?;
        fs::write(&self.path, yaml).map_err(|source| ManifestError::Io {
            path: self.path.clone(),
            source,
        })?;
        tracing::info!(path = %self.path.display(), tools = manifest.tools.len(), "manifest published");
        Ok(())
    }
}
