use anyhow::{Context, Result};
use sarifkit::v1::upgrade::{Formatting, upgrade};
use similar::TextDiff;
use std::path::PathBuf;

use crate::files;

pub fn run(
    input: PathBuf,
    output: Option<PathBuf>,
    force: bool,
    diff: bool,
    pretty: bool,
) -> Result<()> {
    let text = files::read_input(&input)?;
    let formatting = if pretty {
        Formatting::Indented
    } else {
        Formatting::Compact
    };

    let upgraded = upgrade(&text, force, formatting)
        .with_context(|| format!("Failed to upgrade {:?}", input))?;

    if upgraded.modified {
        tracing::info!(input = ?input, forced = force, "upgraded log");
    } else {
        tracing::info!(input = ?input, "log is already current");
    }

    if diff {
        if let Some(unified) = compute_diff(&text, &upgraded.text) {
            files::write_output(&unified, output.as_ref())?;
        }
        return Ok(());
    }

    files::write_output(&upgraded.text, output.as_ref())
}

/// Unified diff between two texts, or `None` if they are identical.
fn compute_diff(old: &str, new: &str) -> Option<String> {
    let diff = TextDiff::from_lines(old, new);
    let unified = diff
        .unified_diff()
        .context_radius(3)
        .header("original", "upgraded")
        .to_string();
    if unified.is_empty() {
        None
    } else {
        Some(unified)
    }
}
