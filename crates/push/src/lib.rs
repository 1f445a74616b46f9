//! Deployment push flow: negotiate assets, upload, follow progress.
//!
//! This crate holds the **core logic** of a deployment run. It has no
//! transport dependency: the caller supplies a [`DeployApi`] implementation
//! that talks to the actual service.
//!
//! # Pipeline
//!
//! 1. **Resolve** the entrypoint and enforce the working-tree sandbox
//! 2. **Walk** the tree into a content-addressed manifest
//! 3. **Negotiate** which digests the remote lacks
//! 4. **Push** the request plus exactly those bytes
//! 5. **Follow** the progress stream to its single terminal event

pub mod deploy;
pub mod error;
pub mod negotiate;
pub mod progress;
pub mod remote;
pub mod types;

// Re-export primary types for convenience.
pub use deploy::DeployRunner;
pub use error::{DeployError, ErrorKind, RemoteError};
pub use negotiate::{UploadFile, UploadPlan, build_upload_plan, negotiate_assets};
pub use progress::{PushProgress, PushState, Step, percent};
pub use remote::{DeployApi, ProgressStream, RemoteFuture};
pub use types::{DeployConfig, DeployEvent, DeployOutcome};
