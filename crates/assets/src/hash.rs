use std::io::Read;
use std::path::Path;

use edgedeploy_protocol::Digest;
use sha2::{Digest as _, Sha256};

use crate::AssetError;

/// Computes the SHA-256 digest of `data`.
///
/// Only content bytes participate; names, timestamps and permissions do not.
pub fn hash_bytes(data: &[u8]) -> Digest {
    let mut hasher = Sha256::new();
    hasher.update(data);
    to_digest(hasher)
}

/// Computes the digest of a file's contents without loading it whole.
pub fn hash_file(path: &Path) -> Result<Digest, AssetError> {
    let mut file = std::fs::File::open(path).map_err(|e| AssetError::io(path, e))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf).map_err(|e| AssetError::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(to_digest(hasher))
}

fn to_digest(hasher: Sha256) -> Digest {
    Digest::from_bytes(&hasher.finalize())
}
