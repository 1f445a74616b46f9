//! Asset negotiation and upload planning.
//!
//! The remote answers a manifest with the digests it lacks; every one of
//! them must resolve through the local [`AssetIndex`].

use std::collections::HashSet;
use std::path::PathBuf;

use edgedeploy_assets::{AssetError, AssetIndex, hash_bytes};
use edgedeploy_protocol::{Digest, Manifest};
use tracing::{debug, warn};

use crate::error::DeployError;
use crate::remote::DeployApi;

/// One file selected for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub digest: Digest,
    pub path: PathBuf,
    pub data: Vec<u8>,
}

/// The files to upload, in the order the remote asked for them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadPlan {
    files: Vec<UploadFile>,
}

impl UploadPlan {
    pub fn files(&self) -> &[UploadFile] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Sum of all file sizes in bytes.
    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.data.len() as u64).sum()
    }

    /// File contents in upload order.
    pub fn into_bytes(self) -> Vec<Vec<u8>> {
        self.files.into_iter().map(|f| f.data).collect()
    }
}

/// Asks the remote which digests of `manifest` it needs.
///
/// Repeated digests in the response are collapsed, keeping the first
/// position, so nothing is uploaded twice.
pub async fn negotiate_assets(
    api: &dyn DeployApi,
    project_id: &str,
    manifest: &Manifest,
) -> Result<Vec<Digest>, DeployError> {
    let response = api
        .negotiate_assets(project_id, manifest)
        .await
        .map_err(DeployError::Negotiation)?;

    let mut seen = HashSet::with_capacity(response.len());
    let mut needed = Vec::with_capacity(response.len());
    for digest in response {
        if seen.insert(digest.clone()) {
            needed.push(digest);
        } else {
            warn!(%digest, "remote requested the same asset twice");
        }
    }

    debug!(needed = needed.len(), "determined assets to upload");
    Ok(needed)
}

/// Reads the bytes for every needed digest.
///
/// A digest the manifest never declared, or a file whose contents changed
/// since it was hashed, is an integrity error.
pub async fn build_upload_plan(
    needed: &[Digest],
    manifest: &Manifest,
    index: &AssetIndex,
) -> Result<UploadPlan, DeployError> {
    let mut files = Vec::with_capacity(needed.len());

    for digest in needed {
        let path = match index.get(digest) {
            Some(path) if manifest.contains_digest(digest) => path.to_path_buf(),
            _ => {
                return Err(DeployError::Integrity {
                    digest: digest.clone(),
                    reason: "was requested by the remote but is not in the manifest".into(),
                });
            }
        };

        let data = tokio::fs::read(&path).await.map_err(|e| AssetError::Io {
            path: path.clone(),
            source: e,
        })?;

        if hash_bytes(&data) != *digest {
            return Err(DeployError::Integrity {
                digest: digest.clone(),
                reason: format!("changed on disk since it was hashed ({})", path.display()),
            });
        }

        files.push(UploadFile {
            digest: digest.clone(),
            path,
            data,
        });
    }

    Ok(UploadPlan { files })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, RemoteError};
    use crate::remote::mock::MockApi;
    use edgedeploy_assets::{WalkOptions, walk};
    use std::fs;
    use tempfile::TempDir;

    fn tree(files: &[(&str, &[u8])]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for (name, data) in files {
            fs::write(dir.path().join(name), data).unwrap();
        }
        dir
    }

    #[tokio::test]
    async fn duplicate_content_is_uploaded_once() {
        let dir = tree(&[("a.txt", b"same"), ("b.txt", b"same")]);
        let out = walk(dir.path(), dir.path(), &WalkOptions::default()).unwrap();
        let h1 = hash_bytes(b"same");

        let plan = build_upload_plan(&[h1.clone()], &out.manifest, &out.index)
            .await
            .unwrap();

        assert_eq!(plan.len(), 1);
        assert_eq!(plan.files()[0].data, b"same");
        assert_eq!(out.manifest.get("a.txt"), Some(&h1));
        assert_eq!(out.manifest.get("b.txt"), Some(&h1));
    }

    #[tokio::test]
    async fn plan_follows_remote_order() {
        let dir = tree(&[("a.txt", b"aaa"), ("b.txt", b"bb"), ("c.txt", b"c")]);
        let out = walk(dir.path(), dir.path(), &WalkOptions::default()).unwrap();
        let needed = vec![hash_bytes(b"c"), hash_bytes(b"aaa")];

        let plan = build_upload_plan(&needed, &out.manifest, &out.index)
            .await
            .unwrap();

        let digests: Vec<&Digest> = plan.files().iter().map(|f| &f.digest).collect();
        assert_eq!(digests, vec![&needed[0], &needed[1]]);
        assert_eq!(plan.total_bytes(), 4);
        assert_eq!(plan.into_bytes(), vec![b"c".to_vec(), b"aaa".to_vec()]);
    }

    #[tokio::test]
    async fn empty_response_means_nothing_to_upload() {
        let dir = tree(&[("a.txt", b"a")]);
        let out = walk(dir.path(), dir.path(), &WalkOptions::default()).unwrap();
        let plan = build_upload_plan(&[], &out.manifest, &out.index)
            .await
            .unwrap();
        assert!(plan.is_empty());
        assert_eq!(plan.total_bytes(), 0);
    }

    #[tokio::test]
    async fn unknown_digest_is_integrity_error() {
        let dir = tree(&[("a.txt", b"a")]);
        let out = walk(dir.path(), dir.path(), &WalkOptions::default()).unwrap();

        let err = build_upload_plan(&[hash_bytes(b"never declared")], &out.manifest, &out.index)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Integrity);
    }

    #[tokio::test]
    async fn modified_file_is_integrity_error() {
        let dir = tree(&[("a.txt", b"before")]);
        let out = walk(dir.path(), dir.path(), &WalkOptions::default()).unwrap();
        fs::write(dir.path().join("a.txt"), b"after").unwrap();

        let err = build_upload_plan(&[hash_bytes(b"before")], &out.manifest, &out.index)
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::Integrity { .. }));
    }

    #[tokio::test]
    async fn deleted_file_is_io_error() {
        let dir = tree(&[("a.txt", b"gone soon")]);
        let out = walk(dir.path(), dir.path(), &WalkOptions::default()).unwrap();
        fs::remove_file(dir.path().join("a.txt")).unwrap();

        let err = build_upload_plan(&[hash_bytes(b"gone soon")], &out.manifest, &out.index)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[tokio::test]
    async fn negotiation_collapses_repeats() {
        let h1 = hash_bytes(b"1");
        let h2 = hash_bytes(b"2");
        let api = MockApi::new(vec![h2.clone(), h1.clone(), h2.clone()], Vec::new());

        let needed = negotiate_assets(&api, "p1", &Manifest::default())
            .await
            .unwrap();
        assert_eq!(needed, vec![h2, h1]);
        assert_eq!(api.negotiated.lock().unwrap()[0].0, "p1");
    }

    #[tokio::test]
    async fn negotiation_failure_is_fatal() {
        let api = MockApi::failing_negotiation(RemoteError::Api {
            status: 404,
            code: "projectNotFound".into(),
            message: "no such project".into(),
        });
        let err = negotiate_assets(&api, "p1", &Manifest::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Negotiation);
    }
}
