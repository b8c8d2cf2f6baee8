//! Multi-method OCR extraction and consensus for game-panel screenshots.
//!
//! A screenshot is cropped into named regions, each crop is expanded into
//! preprocessed image variants, every variant is OCR'd once and parsed by three
//! independent strategies, and the per-image records of a region are reconciled
//! into a single plurality value per field with a confidence score.

pub mod config;
pub mod consensus;
pub mod error;
pub mod logging;
pub mod ocr;
pub mod paths;
pub mod report;
pub mod session;
