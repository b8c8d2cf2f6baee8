//! JSON export for consensus results.

use anyhow::{Context, Result};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::consensus::ConsensusResult;

/// Everything one consensus run produced.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConsensusReport {
    pub generated_at: String,
    pub regions: Vec<ConsensusResult>,
    /// Regions with no readable image
    pub skipped: Vec<String>,
}

impl ConsensusReport {
    pub fn new(regions: Vec<ConsensusResult>, skipped: Vec<String>) -> Self {
        Self {
            generated_at: Local::now().format("%Y-%m-%dT%H:%M:%S").to_string(),
            regions,
            skipped,
        }
    }
}

/// Export a consensus report to a JSON file.
///
/// The output is pretty-printed for human readability.
pub fn export_to_json(report: &ConsensusReport, output_path: &Path) -> Result<()> {
    let json =
        serde_json::to_string_pretty(report).context("Failed to serialize consensus to JSON")?;

    let mut file = File::create(output_path)
        .context(format!("Failed to create JSON file: {}", output_path.display()))?;

    file.write_all(json.as_bytes())
        .context("Failed to write JSON data")?;

    Ok(())
}
