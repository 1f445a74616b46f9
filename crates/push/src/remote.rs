//! The remote deploy service, as seen by the core.
//!
//! `DeployApi` is implemented by the HTTP client crate. Keeping it a trait
//! keeps negotiation and progress handling testable with mocks.

use std::future::Future;
use std::pin::Pin;

use edgedeploy_protocol::{DeployRequest, Digest, Manifest, ProgressEvent};
use tokio::sync::mpsc;

use crate::error::RemoteError;

/// Ordered, single-pass stream of progress events from the remote.
///
/// Dropping the receiver tells the producer to stop.
pub type ProgressStream = mpsc::Receiver<Result<ProgressEvent, RemoteError>>;

/// Boxed future returned by [`DeployApi`] methods.
pub type RemoteFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, RemoteError>> + Send + 'a>>;

/// Abstract connection to the deploy service.
pub trait DeployApi: Send + Sync {
    /// Sends the manifest and returns the digests the remote does not have.
    fn negotiate_assets<'a>(
        &'a self,
        project_id: &'a str,
        manifest: &'a Manifest,
    ) -> RemoteFuture<'a, Vec<Digest>>;

    /// Starts a deployment, uploading `files` in negotiation order.
    fn push_deploy<'a>(
        &'a self,
        project_id: &'a str,
        request: &'a DeployRequest,
        files: Vec<Vec<u8>>,
    ) -> RemoteFuture<'a, ProgressStream>;
}
