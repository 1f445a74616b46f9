use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::DIGEST_HEX_LEN;

/// Error returned when a string is not a well-formed digest.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid digest {value:?}: expected 64 lower-case hex characters")]
pub struct DigestError {
    pub value: String,
}

/// Content hash identifying a file's bytes, hex encoded.
///
/// Deserialization does not validate; text from the remote goes through
/// [`Digest::from_hex`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Digest(String);

impl Digest {
    /// Parses a hex digest, rejecting anything that is not 64 lower-case hex characters.
    pub fn from_hex(value: impl Into<String>) -> Result<Self, DigestError> {
        let value = value.into();
        let well_formed = value.len() == DIGEST_HEX_LEN
            && value
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if well_formed {
            Ok(Self(value))
        } else {
            Err(DigestError { value })
        }
    }

    /// Hex-encodes a raw hash output.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Declared mapping of relative paths to digests for one deployment.
///
/// Keys are forward-slash paths relative to the working tree. The map is
/// sorted, so the serialized form does not depend on traversal order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    entries: BTreeMap<String, Digest>,
}

impl Manifest {
    pub fn new(entries: BTreeMap<String, Digest>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &BTreeMap<String, Digest> {
        &self.entries
    }

    /// Returns the digest recorded for `relative_path`.
    pub fn get(&self, relative_path: &str) -> Option<&Digest> {
        self.entries.get(relative_path)
    }

    /// Number of paths in the manifest.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Distinct digests referenced by the manifest.
    pub fn digests(&self) -> BTreeSet<&Digest> {
        self.entries.values().collect()
    }

    /// Returns `true` if any path maps to `digest`.
    pub fn contains_digest(&self, digest: &Digest) -> bool {
        self.entries.values().any(|d| d == digest)
    }
}

/// Request body sent alongside the uploaded files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployRequest {
    /// Resolved entrypoint URL.
    pub url: String,
    pub manifest: Manifest,
    /// Opaque CI event payload, forwarded verbatim.
    #[serde(rename = "event", default)]
    pub event_context: serde_json::Value,
}

/// A domain the finished deployment is reachable at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainMapping {
    pub domain: String,
}

/// A finished deployment, carried by the `success` progress event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    pub id: String,
    #[serde(default)]
    pub domain_mappings: Vec<DomainMapping>,
}

impl Deployment {
    /// The first domain mapping, which the remote treats as the default.
    pub fn primary_domain(&self) -> Option<&str> {
        self.domain_mappings.first().map(|m| m.domain.as_str())
    }

    /// `https://{primary domain}/`.
    pub fn primary_url(&self) -> Option<String> {
        self.primary_domain().map(|d| format!("https://{d}/"))
    }

    /// One URL per domain mapping, in order.
    pub fn urls(&self) -> Vec<String> {
        self.domain_mappings
            .iter()
            .map(|m| format!("https://{}", m.domain))
            .collect()
    }
}
