use anyhow::{Context, Result};
use clap::ValueEnum;
use sarifkit::v1::SarifResult;
use sarifkit::v1::partition::partition_owned;
use serde::Serialize;
use std::path::PathBuf;

use crate::cmd_filter::DEFAULT_LEVEL;
use crate::files;

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum PartitionKey {
    /// One file per rule id; results without one are dropped
    RuleId,
    /// One file per level
    Level,
}

impl PartitionKey {
    fn key_of(self, result: &SarifResult) -> Option<String> {
        match self {
            PartitionKey::RuleId => result.rule_id.clone(),
            PartitionKey::Level => Some(
                result
                    .level
                    .clone()
                    .unwrap_or_else(|| DEFAULT_LEVEL.to_string()),
            ),
        }
    }
}

#[derive(Serialize, Debug)]
struct Written {
    key: String,
    file: PathBuf,
    results: usize,
}

pub fn run(input: PathBuf, by: PartitionKey, output_dir: PathBuf, pretty: bool) -> Result<()> {
    let log = files::read_log(&input)?;
    let partitions = partition_owned(log, |result| by.key_of(result));

    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("Failed to create {:?}", output_dir))?;

    let mut written = Vec::with_capacity(partitions.len());
    for (key, log) in &partitions {
        let file = output_dir.join(format!("{}.sarif", file_stem(key)));
        let json = files::format_log(log, pretty)?;
        std::fs::write(&file, json).with_context(|| format!("Failed to write {:?}", file))?;
        written.push(Written {
            key: key.clone(),
            file,
            results: log.runs.iter().map(|r| r.results().len()).sum(),
        });
    }
    tracing::info!(partitions = written.len(), dir = ?output_dir, "wrote partitions");

    let summary = if pretty {
        serde_json::to_string_pretty(&written)?
    } else {
        serde_json::to_string(&written)?
    };
    println!("{}", summary);
    Ok(())
}

/// Keys can hold anything; file names can't.
fn file_stem(key: &str) -> String {
    let stem: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if stem.is_empty() || stem.starts_with('.') {
        format!("_{}", stem)
    } else {
        stem
    }
}
