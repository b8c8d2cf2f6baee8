//! CSV writers for extraction and consensus results.
//!
//! The per-image CSV is append-only: the header is written once and each run
//! adds rows. The consensus CSV is rewritten on every run.

use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::consensus::{ConsensusResult, FieldConsensus};
use crate::ocr::combine::CombinedResult;
use crate::ocr::extract::Field;

/// Per-image columns.
pub const EXTRACTION_HEADER: [&str; 8] = [
    "region",
    "b_value",
    "s_value",
    "t_value",
    "people_count",
    "dollar_amount",
    "filename",
    "processing_methods",
];

/// Per-region consensus columns.
pub const CONSENSUS_HEADER: [&str; 13] = [
    "region",
    "b_value",
    "b_confidence",
    "s_value",
    "s_confidence",
    "t_value",
    "t_confidence",
    "people_count",
    "people_confidence",
    "dollar_amount",
    "dollar_confidence",
    "best_method",
    "overall_confidence",
];

/// Renders a confidence as `NN.N%`.
pub fn format_confidence(confidence: f64) -> String {
    format!("{:.1}%", confidence)
}

/// Initializes the per-image CSV with a header if it doesn't exist or is empty.
///
/// If the file exists and has content, this does nothing (preserves existing data).
pub fn init_extraction_csv(path: &Path) -> Result<()> {
    if path.exists() {
        let file = File::open(path).context("Failed to open existing CSV")?;
        let reader = BufReader::new(file);
        if reader.lines().next().is_some() {
            return Ok(());
        }
    }

    let mut writer = csv::Writer::from_path(path).context("Failed to create CSV file")?;
    writer
        .write_record(EXTRACTION_HEADER)
        .context("Failed to write CSV header")?;
    writer.flush()?;
    Ok(())
}

/// Appends one row per image result.
pub fn append_extraction_rows(path: &Path, results: &[CombinedResult]) -> Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .context("Failed to open CSV for append")?;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(file);

    for result in results {
        let methods = result.processing_methods.join(", ");
        writer
            .write_record([
                result.region.as_str(),
                result.record.b_value.as_str(),
                result.record.s_value.as_str(),
                result.record.t_value.as_str(),
                result.record.people_count.as_str(),
                result.record.dollar_amount.as_str(),
                result.filename.as_str(),
                methods.as_str(),
            ])
            .context("Failed to write CSV row")?;
    }

    writer.flush()?;
    Ok(())
}

fn field_columns(field: &FieldConsensus) -> [String; 2] {
    [field.value.clone(), format_confidence(field.confidence)]
}

/// Writes the consensus report, replacing any previous file.
pub fn write_consensus_csv(path: &Path, results: &[ConsensusResult]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;

    writer
        .write_record(CONSENSUS_HEADER)
        .context("Failed to write CSV header")?;

    for result in results {
        let mut row = vec![result.region.clone()];
        for field in Field::ALL {
            row.extend(field_columns(result.field(field)));
        }
        row.push(
            result
                .best_method
                .map(|m| m.as_str().to_string())
                .unwrap_or_default(),
        );
        row.push(format_confidence(result.overall_confidence));

        writer.write_record(&row).context("Failed to write CSV row")?;
    }

    writer.flush()?;
    Ok(())
}
