use serde::{Deserialize, Serialize};

/// Response of the negotiation endpoint: hex digests the remote does not have.
///
/// Order is chosen by the remote and defines upload order. Entries are
/// checked with [`Digest::from_hex`](crate::Digest::from_hex) before use.
pub type NegotiateResponse = Vec<String>;

/// Error body returned by the remote on non-2xx responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}
