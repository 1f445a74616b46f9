use std::fs;
use std::path::{Component, Path, PathBuf};

use edgedeploy_protocol::constants::VIRTUAL_ROOT;
use url::Url;

use crate::AssetError;

/// A normalized entrypoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEntrypoint {
    /// URL sent in the deploy request.
    pub url: Url,
    /// Local file the entrypoint was rewritten from, if it was local.
    pub local_path: Option<PathBuf>,
}

/// Resolves a user-supplied entrypoint against `cwd`.
///
/// - `http://` / `https://` URLs are returned as parsed.
/// - `file://` URLs and bare paths must name an existing file inside `cwd`;
///   they are rewritten under [`VIRTUAL_ROOT`], keeping the path suffix.
/// - Any other `scheme://` is rejected.
pub fn resolve_entrypoint(input: &str, cwd: &Path) -> Result<ResolvedEntrypoint, AssetError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(AssetError::InvalidEntrypoint {
            input: input.to_string(),
            reason: "entrypoint is empty".into(),
        });
    }

    if !cwd.is_absolute() {
        return Err(AssetError::RelativeWorkingTree {
            cwd: cwd.to_path_buf(),
        });
    }

    let local = match url_scheme(input) {
        Some(scheme) => match scheme.to_ascii_lowercase().as_str() {
            "http" | "https" => {
                let url = Url::parse(input).map_err(|e| AssetError::InvalidEntrypoint {
                    input: input.to_string(),
                    reason: e.to_string(),
                })?;
                return Ok(ResolvedEntrypoint {
                    url,
                    local_path: None,
                });
            }
            "file" => file_url_to_path(input)?,
            _ => {
                return Err(AssetError::UnsupportedScheme {
                    scheme: scheme.to_string(),
                });
            }
        },
        None => cwd.join(input),
    };

    let cwd = normalize_lexically(cwd);
    let path = normalize_lexically(&local);
    if !path.starts_with(&cwd) {
        return Err(AssetError::PathOutsideWorkingTree { path, cwd });
    }

    let metadata = fs::symlink_metadata(&path).map_err(|e| AssetError::EntrypointNotFound {
        path: path.clone(),
        source: e,
    })?;
    if metadata.is_dir() {
        return Err(AssetError::InvalidEntrypoint {
            input: input.to_string(),
            reason: format!("{} is a directory", path.display()),
        });
    }

    let url = virtual_url(input, &path, &cwd)?;
    Ok(ResolvedEntrypoint {
        url,
        local_path: Some(path),
    })
}

/// Returns the scheme if `input` starts with `scheme://`.
fn url_scheme(input: &str) -> Option<&str> {
    let (scheme, _) = input.split_once("://")?;
    let mut chars = scheme.chars();
    let first = chars.next()?;
    let valid = first.is_ascii_alphabetic()
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    valid.then_some(scheme)
}

fn file_url_to_path(input: &str) -> Result<PathBuf, AssetError> {
    let invalid = |reason: String| AssetError::InvalidEntrypoint {
        input: input.to_string(),
        reason,
    };
    let url = Url::parse(input).map_err(|e| invalid(e.to_string()))?;
    url.to_file_path()
        .map_err(|()| invalid("file URL does not name a local path".into()))
}

/// Rewrites `path` (inside `cwd`) to `file:///src/<suffix>`.
fn virtual_url(input: &str, path: &Path, cwd: &Path) -> Result<Url, AssetError> {
    let invalid = |reason: &str| AssetError::InvalidEntrypoint {
        input: input.to_string(),
        reason: reason.to_string(),
    };

    let suffix = path
        .strip_prefix(cwd)
        .map_err(|_| invalid("entrypoint is not below the working directory"))?;
    let segments: Vec<String> = suffix
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();

    let mut url = Url::parse(&format!("{VIRTUAL_ROOT}/"))
        .map_err(|_| invalid("virtual root is not a valid URL"))?;
    url.path_segments_mut()
        .map_err(|()| invalid("virtual root cannot hold a path"))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Collapses `.` and `..` without touching the filesystem.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
