//! Action configuration.
//!
//! Inputs come from the `INPUT_*` variables the runner sets for the step,
//! plus an optional `edgedeploy.toml` at the root of the working tree.

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use edgedeploy_assets::{SymlinkPolicy, WalkOptions};
use edgedeploy_protocol::constants::DEFAULT_ORIGIN;
use edgedeploy_push::DeployConfig;
use serde::Deserialize;

/// Name of the optional per-project config file.
pub const CONFIG_FILE_NAME: &str = "edgedeploy.toml";

/// Settings for one action run.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionConfig {
    pub project: String,
    pub entrypoint: String,
    /// Working tree root, joined onto the process directory.
    pub cwd: PathBuf,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    /// API origin, `DEPLOY_API_ENDPOINT` or the default.
    pub origin: String,
    /// JSON payload of the triggering event.
    pub event_path: Option<PathBuf>,
    /// File step outputs are appended to.
    pub output_path: Option<PathBuf>,
}

impl ActionConfig {
    /// Reads the configuration through `lookup`. Empty values count as unset.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
        process_cwd: &Path,
    ) -> anyhow::Result<Self> {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let required = |name: &str, input: &str| {
            get(name).with_context(|| format!("input required and not supplied: {input}"))
        };

        let project = required("INPUT_PROJECT", "project")?;
        let entrypoint = required("INPUT_ENTRYPOINT", "entrypoint")?;
        let cwd = match get("INPUT_CWD") {
            Some(dir) => process_cwd.join(dir),
            None => process_cwd.to_path_buf(),
        };

        let origin = get("DEPLOY_API_ENDPOINT").unwrap_or_else(|| DEFAULT_ORIGIN.to_string());
        if !(origin.starts_with("https://") || origin.starts_with("http://")) {
            bail!("DEPLOY_API_ENDPOINT must be an http(s) URL, got {origin:?}");
        }

        Ok(Self {
            project,
            entrypoint,
            cwd,
            include: get("INPUT_INCLUDE").map(|v| split_list(&v)).unwrap_or_default(),
            exclude: get("INPUT_EXCLUDE").map(|v| split_list(&v)).unwrap_or_default(),
            origin,
            event_path: get("GITHUB_EVENT_PATH").map(PathBuf::from),
            output_path: get("GITHUB_OUTPUT").map(PathBuf::from),
        })
    }

    /// Builds the deploy run configuration for the tree at `cwd`.
    ///
    /// Non-empty inputs take precedence over the config file.
    pub fn deploy_config(
        &self,
        cwd: PathBuf,
        file: Option<FileConfig>,
        event_context: serde_json::Value,
    ) -> DeployConfig {
        let file = file.unwrap_or_default();
        let pick = |input: &[String], fallback: Vec<String>| {
            if input.is_empty() {
                fallback
            } else {
                input.to_vec()
            }
        };

        DeployConfig {
            project_id: self.project.clone(),
            entrypoint: self.entrypoint.clone(),
            cwd,
            walk: WalkOptions {
                include: pick(&self.include, file.include),
                exclude: pick(&self.exclude, file.exclude),
                symlinks: if file.follow_symlinks {
                    SymlinkPolicy::Follow
                } else {
                    SymlinkPolicy::Skip
                },
            },
            event_context,
        }
    }
}

/// Contents of `edgedeploy.toml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub follow_symlinks: bool,
}

impl FileConfig {
    /// Loads `edgedeploy.toml` from `root`, if present.
    pub fn load(root: &Path) -> anyhow::Result<Option<Self>> {
        let path = root.join(CONFIG_FILE_NAME);
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: FileConfig = toml::from_str(&content)
            .with_context(|| format!("invalid {}", path.display()))?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(Some(config))
    }
}

/// Reads the triggering event payload, `null` when there is none.
pub fn read_event_context(path: Option<&Path>) -> anyhow::Result<serde_json::Value> {
    let Some(path) = path else {
        return Ok(serde_json::Value::Null);
    };
    let content = std::fs::read(path)
        .with_context(|| format!("failed to read event payload {}", path.display()))?;
    serde_json::from_slice(&content)
        .with_context(|| format!("event payload {} is not JSON", path.display()))
}

/// Splits a multi-line or comma-separated input into its items.
fn split_list(value: &str) -> Vec<String> {
    value
        .split(['\n', ','])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
