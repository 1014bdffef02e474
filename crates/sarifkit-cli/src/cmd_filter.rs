use anyhow::Result;
use sarifkit::v1::SarifResult;
use sarifkit::v1::partition::filter;
use std::path::PathBuf;

use crate::files;

/// SARIF's default when a result has no `level`.
pub const DEFAULT_LEVEL: &str = "warning";

pub fn run(
    input: PathBuf,
    output: Option<PathBuf>,
    rule_ids: Vec<String>,
    levels: Vec<String>,
    pretty: bool,
) -> Result<()> {
    let log = files::read_log(&input)?;
    let before: usize = log.runs.iter().map(|r| r.results().len()).sum();

    let filtered = filter(&log, |result| matches(result, &rule_ids, &levels));

    let after: usize = filtered.runs.iter().map(|r| r.results().len()).sum();
    tracing::info!(before, after, "filtered results");

    let json = files::format_log(&filtered, pretty)?;
    files::write_output(&json, output.as_ref())
}

fn matches(result: &SarifResult, rule_ids: &[String], levels: &[String]) -> bool {
    let rule_ok = rule_ids.is_empty()
        || result
            .rule_id
            .as_deref()
            .is_some_and(|id| rule_ids.iter().any(|r| r == id));
    let level = result.level.as_deref().unwrap_or(DEFAULT_LEVEL);
    let level_ok = levels.is_empty() || levels.iter().any(|l| l == level);
    rule_ok && level_ok
}
