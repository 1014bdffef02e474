use anyhow::{Context, Result};
use sarifkit::v1::{SarifLog, upgrade};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

pub fn read_input(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read stdin")?;
        return Ok(buf);
    }
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))
}

/// Read a log, upgrading it on the way in if it predates 2.1.0.
pub fn read_log(path: &Path) -> Result<SarifLog> {
    let text = read_input(path)?;
    let (log, upgraded) = upgrade::upgrade_to_log(&text, false)
        .with_context(|| format!("Failed to parse {:?}", path))?;
    if upgraded {
        tracing::info!(input = ?path, "upgraded prerelease log to {}", log.version);
    }
    Ok(log)
}

pub fn format_log(log: &SarifLog, pretty: bool) -> Result<String> {
    let json = if pretty {
        log.to_json_pretty()?
    } else {
        log.to_json()?
    };
    Ok(json)
}

/// Write to `output`, or print to stdout when there is none.
pub fn write_output(text: &str, output: Option<&PathBuf>) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, text).with_context(|| format!("Failed to write {:?}", path))
        }
        None => {
            println!("{}", text);
            Ok(())
        }
    }
}
