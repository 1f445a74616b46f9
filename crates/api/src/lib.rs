//! HTTP client for the deploy service.
//!
//! Async client using `reqwest`, authenticated with a GitHub Actions OIDC
//! token. Implements [`edgedeploy_push::DeployApi`].

pub mod client;
pub mod error;
pub mod ndjson;
pub mod oidc;

pub use client::ApiClient;
pub use error::ApiError;
pub use ndjson::NdjsonDecoder;
pub use oidc::{GithubOidc, audience_for};
