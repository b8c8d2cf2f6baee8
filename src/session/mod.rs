pub mod catalog;
pub mod runner;

pub use catalog::{CatalogEntry, entries_for_region, scan_directory};
pub use runner::{Candidate, RegionAnalyzer, RegionReport};
