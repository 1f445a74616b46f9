//! Wire protocol types for the edgedeploy client.
//!
//! Everything that crosses the boundary to the remote deploy service lives
//! here: the content-addressed [`Manifest`], the [`DeployRequest`], and the
//! [`ProgressEvent`] stream the service pushes back.

pub mod constants;
pub mod events;
pub mod messages;
pub mod types;

// Re-export primary types for convenience.
pub use events::ProgressEvent;
pub use messages::{ApiErrorBody, NegotiateResponse};
pub use types::{DeployRequest, Deployment, Digest, DigestError, DomainMapping, Manifest};
