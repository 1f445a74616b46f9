//! Step outputs.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, bail};

/// Appends `name=value` lines to the runner's output file.
///
/// Without an output file the values are only logged.
pub fn write_outputs(path: Option<&Path>, outputs: &[(&str, &str)]) -> anyhow::Result<()> {
    for (name, value) in outputs {
        if value.contains('\n') || name.contains('=') {
            bail!("output {name:?} cannot be written as a single line");
        }
    }

    let Some(path) = path else {
        for (name, value) in outputs {
            tracing::info!(name, value, "output (GITHUB_OUTPUT not set)");
        }
        return Ok(());
    };

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open output file {}", path.display()))?;

    let mut content = String::new();
    for (name, value) in outputs {
        content.push_str(&format!("{name}={value}\n"));
    }
    file.write_all(content.as_bytes())
        .with_context(|| format!("failed to write output file {}", path.display()))?;
    Ok(())
}
