//! CSV and JSON output for per-image and per-region results.

pub mod csv_writer;
pub mod export;

pub use csv_writer::{append_extraction_rows, init_extraction_csv, write_consensus_csv};
pub use export::{ConsensusReport, export_to_json};
