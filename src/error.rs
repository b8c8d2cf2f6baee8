//! Error types for the extraction pipeline.
//!
//! Absence of data is never an error here: a record with empty fields is a
//! normal outcome. These errors mark samples that must not be counted at all.

use std::path::PathBuf;

use thiserror::Error;

/// A single image could not be turned into OCR text.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("cannot read image {path}: {source}")]
    UnreadableImage {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("image has no pixels")]
    EmptyImage,
    #[error("OCR failed: {0}")]
    Ocr(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A transform in the full variant catalog could not be applied.
#[derive(Debug, Error)]
pub enum VariantError {
    #[error("image has no pixels")]
    EmptyImage,
    #[error("rescaling {width}x{height} by {factor:.2} overflows")]
    ScaleOverflow { width: u32, height: u32, factor: f32 },
}
