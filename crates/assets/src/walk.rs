//! Asset discovery.
//!
//! Recursively walks a directory, hashes every regular file, and produces
//! the [`Manifest`] plus the [`AssetIndex`] used to find upload bytes.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Component, Path, PathBuf};

use edgedeploy_protocol::{Digest, Manifest};
use rayon::prelude::*;
use tracing::debug;

use crate::AssetError;
use crate::filter::AssetFilter;
use crate::hash::hash_file;

/// What the walker does when it meets a symbolic link.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SymlinkPolicy {
    /// Leave links out of the manifest.
    #[default]
    Skip,
    /// Record the link target's contents under the link's path.
    Follow,
}

/// Walk configuration. The default includes every regular file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalkOptions {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub symlinks: SymlinkPolicy,
}

/// Digest → local file holding those bytes.
///
/// Derived lookup table for reading upload bytes; the manifest stays the
/// source of truth. The first path seen for a digest is kept.
#[derive(Debug, Clone, Default)]
pub struct AssetIndex {
    paths: HashMap<Digest, PathBuf>,
}

impl AssetIndex {
    /// Returns the representative path for `digest`.
    pub fn get(&self, digest: &Digest) -> Option<&Path> {
        self.paths.get(digest).map(PathBuf::as_path)
    }

    /// Number of distinct digests.
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Records `path` for `digest` unless one is already recorded.
    fn insert_first(&mut self, digest: Digest, path: PathBuf) {
        self.paths.entry(digest).or_insert(path);
    }
}

/// Result of a walk.
#[derive(Debug, Clone, Default)]
pub struct WalkOutput {
    pub manifest: Manifest,
    pub index: AssetIndex,
}

/// Walks `root`, recording paths relative to `cwd`.
///
/// Directory entries are visited in name order and hashing is fanned out
/// across the rayon pool; the output is identical for identical trees.
/// A file that cannot be read fails the whole walk.
pub fn walk(root: &Path, cwd: &Path, options: &WalkOptions) -> Result<WalkOutput, AssetError> {
    let filter = AssetFilter::new(cwd, &options.include, &options.exclude)?;
    if !filter.is_empty() {
        debug!(
            include = options.include.len(),
            exclude = options.exclude.len(),
            "applying asset filters"
        );
    }

    let mut files = Vec::new();
    let mut ancestors = HashSet::new();
    if options.symlinks == SymlinkPolicy::Follow {
        ancestors.insert(fs::canonicalize(root).map_err(|e| AssetError::io(root, e))?);
    }
    collect_files(root, cwd, &filter, options.symlinks, &mut ancestors, &mut files)?;

    debug!(files = files.len(), root = %root.display(), "enumerated assets");

    let digests: Vec<Digest> = files
        .par_iter()
        .map(|(_, path)| hash_file(path))
        .collect::<Result<_, _>>()?;

    let mut entries = BTreeMap::new();
    let mut index = AssetIndex::default();
    for ((rel_path, path), digest) in files.into_iter().zip(digests) {
        index.insert_first(digest.clone(), path);
        entries.insert(rel_path, digest);
    }

    Ok(WalkOutput {
        manifest: Manifest::new(entries),
        index,
    })
}

/// `ancestors` holds the canonical directories on the current descent path
/// (only under [`SymlinkPolicy::Follow`]); re-entering one is a cycle.
fn collect_files(
    dir: &Path,
    cwd: &Path,
    filter: &AssetFilter,
    symlinks: SymlinkPolicy,
    ancestors: &mut HashSet<PathBuf>,
    files: &mut Vec<(String, PathBuf)>,
) -> Result<(), AssetError> {
    let mut entries = fs::read_dir(dir)
        .map_err(|e| AssetError::io(dir, e))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| AssetError::io(dir, e))?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        let rel_path = relative_to(&path, cwd)?;
        let mut file_type = entry.file_type().map_err(|e| AssetError::io(&path, e))?;

        if file_type.is_symlink() {
            match symlinks {
                SymlinkPolicy::Skip => {
                    debug!(path = %rel_path, "skipping symlink");
                    continue;
                }
                SymlinkPolicy::Follow => {
                    file_type = fs::metadata(&path)
                        .map_err(|e| AssetError::io(&path, e))?
                        .file_type();
                }
            }
        }

        if file_type.is_dir() {
            if !filter.allows_dir(Path::new(&rel_path)) {
                debug!(path = %rel_path, "excluded directory");
                continue;
            }
            if symlinks == SymlinkPolicy::Follow {
                let canonical = fs::canonicalize(&path).map_err(|e| AssetError::io(&path, e))?;
                if !ancestors.insert(canonical.clone()) {
                    debug!(path = %rel_path, "directory links back to an ancestor, skipping cycle");
                    continue;
                }
                let walked = collect_files(&path, cwd, filter, symlinks, ancestors, files);
                ancestors.remove(&canonical);
                walked?;
            } else {
                collect_files(&path, cwd, filter, symlinks, ancestors, files)?;
            }
        } else if file_type.is_file() && filter.allows_file(Path::new(&rel_path)) {
            files.push((rel_path, path));
        }
    }

    Ok(())
}

/// Path of `path` relative to `cwd`, joined with `/` on every platform.
///
/// Names that are not valid UTF-8 are rejected so two of them can never
/// collapse into the same manifest key.
fn relative_to(path: &Path, cwd: &Path) -> Result<String, AssetError> {
    let rel = path
        .strip_prefix(cwd)
        .map_err(|e| AssetError::io(path, std::io::Error::other(e)))?;

    let mut parts = Vec::new();
    for component in rel.components() {
        if let Component::Normal(part) = component {
            let part = part.to_str().ok_or_else(|| {
                AssetError::io(
                    path,
                    std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        "file name is not valid UTF-8",
                    ),
                )
            })?;
            parts.push(part);
        }
    }
    Ok(parts.join("/"))
}
