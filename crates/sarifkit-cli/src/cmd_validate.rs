use anyhow::{Context, Result};
use sarifkit::v1::{CURRENT_VERSION, SarifLog, query};
use std::path::PathBuf;

use crate::files;

pub fn run(input: PathBuf) -> Result<()> {
    let text = files::read_input(&input)?;
    let log =
        SarifLog::from_json(&text).with_context(|| format!("Failed to parse {:?}", input))?;

    if log.version != CURRENT_VERSION {
        tracing::warn!(
            version = %log.version,
            "log is not SARIF {}; run `sarifkit upgrade` first",
            CURRENT_VERSION
        );
    }

    query::check_references(&log).with_context(|| format!("Invalid log {:?}", input))?;

    let results: usize = log.runs.iter().map(|r| r.results().len()).sum();
    println!(
        "Valid SARIF {} log: {} run(s), {} result(s)",
        log.version,
        log.runs.len(),
        results
    );
    Ok(())
}
