//! Data types for the deploy run.

use std::path::PathBuf;

use edgedeploy_assets::WalkOptions;
use edgedeploy_protocol::Deployment;

/// Everything the core needs for one run. Nothing is read from the environment.
#[derive(Debug, Clone)]
pub struct DeployConfig {
    pub project_id: String,
    /// Entrypoint as the user wrote it: a path, a `file:` URL, or a remote URL.
    pub entrypoint: String,
    /// Absolute working tree root; everything under it is uploaded.
    pub cwd: PathBuf,
    pub walk: WalkOptions,
    /// Opaque CI event payload forwarded with the deploy request.
    pub event_context: serde_json::Value,
}

/// Progress event emitted during a run.
#[derive(Debug, Clone, PartialEq)]
pub enum DeployEvent {
    /// Entrypoint resolved to its canonical URL.
    Resolved { url: String },
    /// Working tree walked.
    Discovered { assets: usize },
    /// Negotiation finished and upload bytes are loaded.
    Negotiated { files: usize, total_bytes: u64 },
    /// Upload progress.
    Uploading { files: usize, percent: f64 },
    /// Build progress.
    Building { percent: f64 },
    /// All files received; the remote is finishing.
    Finishing,
    /// Deployment is live.
    Completed { deployment: Deployment },
    /// Run aborted.
    Failed { error: String },
}

/// Externally observable result of a successful run.
#[derive(Debug, Clone, PartialEq)]
pub struct DeployOutcome {
    pub deployment_id: String,
    /// `https://{first domain}/`.
    pub url: String,
    pub deployment: Deployment,
}

impl DeployOutcome {
    /// Returns `None` when the deployment has no domain mappings.
    pub fn from_deployment(deployment: Deployment) -> Option<Self> {
        let url = deployment.primary_url()?;
        Some(Self {
            deployment_id: deployment.id.clone(),
            url,
            deployment,
        })
    }
}
