use serde::{Deserialize, Serialize};

use crate::types::Deployment;

/// One unit of the server-to-client deployment status stream.
///
/// Serialized as a JSON object tagged by `"type"`; the remote sends one per
/// line of an NDJSON body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ProgressEvent {
    /// Upload progress across all files of the push.
    #[serde(rename_all = "camelCase")]
    StaticFile { current_bytes: u64, total_bytes: u64 },
    /// Build progress: modules loaded so far.
    Load { seen: u64, total: u64 },
    /// All file bytes have been received by the remote.
    UploadComplete,
    /// Terminal: the deployment is live.
    Success(Deployment),
    /// Terminal: the deployment failed. `ctx` is an opaque diagnostic.
    Error {
        #[serde(default)]
        ctx: serde_json::Value,
    },
}

impl ProgressEvent {
    /// `success` and `error` end the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success(_) | Self::Error { .. })
    }

    /// Wire name of the variant.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::StaticFile { .. } => "staticFile",
            Self::Load { .. } => "load",
            Self::UploadComplete => "uploadComplete",
            Self::Success(_) => "success",
            Self::Error { .. } => "error",
        }
    }
}
