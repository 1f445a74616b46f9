//! Local side of a deployment: content hashing, asset discovery, and
//! entrypoint resolution.
//!
//! Nothing in this crate touches the network.

mod entrypoint;
mod filter;
mod hash;
mod walk;

use std::path::PathBuf;

pub use entrypoint::{ResolvedEntrypoint, resolve_entrypoint};
pub use hash::{hash_bytes, hash_file};
pub use walk::{AssetIndex, SymlinkPolicy, WalkOptions, WalkOutput, walk};

/// Errors produced while discovering assets or resolving the entrypoint.
#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "entrypoint {} must be inside the working directory {}",
        path.display(),
        cwd.display()
    )]
    PathOutsideWorkingTree { path: PathBuf, cwd: PathBuf },

    #[error("failed to open entrypoint file at {}: {source}", path.display())]
    EntrypointNotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("working directory {} must be an absolute path", cwd.display())]
    RelativeWorkingTree { cwd: PathBuf },

    #[error("failed to parse entrypoint specifier {input:?}: {reason}")]
    InvalidEntrypoint { input: String, reason: String },

    #[error("unsupported entrypoint scheme: {scheme}")]
    UnsupportedScheme { scheme: String },

    #[error("invalid pattern {pattern:?}: {message}")]
    InvalidPattern { pattern: String, message: String },
}

impl AssetError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
