use edgedeploy_protocol::DigestError;
use edgedeploy_push::RemoteError;

/// Errors from the deploy API client.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error {status} ({code}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed response: {0}")]
    InvalidDigest(#[from] DigestError),

    #[error("invalid URL {url:?}: {message}")]
    InvalidUrl { url: String, message: String },

    #[error("invalid token")]
    InvalidToken,

    #[error("identity token unavailable: {0}")]
    Oidc(String),
}

impl From<ApiError> for RemoteError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Api {
                status,
                code,
                message,
            } => RemoteError::Api {
                status,
                code,
                message,
            },
            ApiError::Json(e) => RemoteError::Decode(e.to_string()),
            ApiError::InvalidDigest(_) => RemoteError::Decode(err.to_string()),
            ApiError::InvalidToken | ApiError::Oidc(_) => RemoteError::Auth(err.to_string()),
            ApiError::Http(_) | ApiError::InvalidUrl { .. } => {
                RemoteError::Transport(err.to_string())
            }
        }
    }
}
