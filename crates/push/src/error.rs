//! Deploy error types.

use edgedeploy_assets::AssetError;
use edgedeploy_protocol::Digest;

/// Failure reported by a [`DeployApi`](crate::DeployApi) implementation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RemoteError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("remote error {status} ({code}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("decode error: {0}")]
    Decode(String),

    #[error("authentication error: {0}")]
    Auth(String),
}

/// Coarse classification of a [`DeployError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Io,
    PathOutsideWorkingTree,
    Entrypoint,
    /// Include/exclude pattern that does not parse.
    Filter,
    Negotiation,
    Integrity,
    Push,
    Stream,
    Protocol,
    Cancelled,
}

/// Errors that abort a deployment run. None are retried.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error(transparent)]
    Assets(#[from] AssetError),

    #[error("asset negotiation failed: {0}")]
    Negotiation(#[source] RemoteError),

    #[error("asset {digest} {reason}")]
    Integrity { digest: Digest, reason: String },

    #[error("deploy push failed: {0}")]
    Push(#[source] RemoteError),

    #[error("deployment failed: {ctx}")]
    Stream { ctx: serde_json::Value },

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("progress stream ended before a terminal event")]
    UnexpectedEndOfStream,

    #[error("cancelled")]
    Cancelled,
}

impl DeployError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Assets(AssetError::Io { .. }) => ErrorKind::Io,
            Self::Assets(AssetError::PathOutsideWorkingTree { .. }) => {
                ErrorKind::PathOutsideWorkingTree
            }
            Self::Assets(AssetError::InvalidPattern { .. }) => ErrorKind::Filter,
            Self::Assets(_) => ErrorKind::Entrypoint,
            Self::Negotiation(_) => ErrorKind::Negotiation,
            Self::Integrity { .. } => ErrorKind::Integrity,
            Self::Push(_) => ErrorKind::Push,
            Self::Stream { .. } => ErrorKind::Stream,
            Self::ProtocolViolation(_) | Self::UnexpectedEndOfStream => ErrorKind::Protocol,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }
}
