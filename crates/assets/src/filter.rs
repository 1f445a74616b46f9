use std::path::Path;

use ignore::gitignore::{Gitignore, GitignoreBuilder};

use crate::AssetError;

/// Include/exclude rules applied while walking, in gitignore syntax.
///
/// Paths are matched relative to the working tree. Include patterns only
/// restrict files; directories are always descended unless excluded.
#[derive(Debug, Default)]
pub struct AssetFilter {
    include: Option<Gitignore>,
    exclude: Option<Gitignore>,
}

impl AssetFilter {
    /// Builds a filter from pattern lists. Empty lists impose no restriction.
    pub fn new(root: &Path, include: &[String], exclude: &[String]) -> Result<Self, AssetError> {
        Ok(Self {
            include: build_matcher(root, include)?,
            exclude: build_matcher(root, exclude)?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.include.is_none() && self.exclude.is_none()
    }

    /// Whether a file at `rel_path` belongs in the manifest.
    pub fn allows_file(&self, rel_path: &Path) -> bool {
        if self.is_excluded(rel_path, false) {
            return false;
        }
        match &self.include {
            Some(include) => include
                .matched_path_or_any_parents(rel_path, false)
                .is_ignore(),
            None => true,
        }
    }

    /// Whether the walker should descend into the directory at `rel_path`.
    pub fn allows_dir(&self, rel_path: &Path) -> bool {
        !self.is_excluded(rel_path, true)
    }

    fn is_excluded(&self, rel_path: &Path, is_dir: bool) -> bool {
        self.exclude.as_ref().is_some_and(|exclude| {
            exclude
                .matched_path_or_any_parents(rel_path, is_dir)
                .is_ignore()
        })
    }
}

fn build_matcher(root: &Path, patterns: &[String]) -> Result<Option<Gitignore>, AssetError> {
    let mut builder = GitignoreBuilder::new(root);
    let mut count = 0;

    for pattern in patterns {
        let trimmed = pattern.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        builder
            .add_line(None, trimmed)
            .map_err(|e| AssetError::InvalidPattern {
                pattern: trimmed.to_string(),
                message: e.to_string(),
            })?;
        count += 1;
    }

    if count == 0 {
        return Ok(None);
    }

    let matcher = builder.build().map_err(|e| AssetError::InvalidPattern {
        pattern: patterns.join(", "),
        message: e.to_string(),
    })?;
    Ok(Some(matcher))
}
