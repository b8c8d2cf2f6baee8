pub mod combine;
pub mod engine;
pub mod extract;
pub mod preprocess;
pub mod setup;
pub mod variants;

pub use combine::{CombinedResult, MethodCombiner};
pub use engine::{OcrEngine, TesseractEngine};
pub use extract::{ExtractedRecord, ExtractionMethod, Field, FieldExtractor, MethodResult};
pub use setup::ensure_tesseract;
pub use variants::{Variant, VariantGenerator, VariantSet};

use image::{ImageBuffer, Rgba, RgbaImage};

use crate::config::RegionConfig;
use preprocess::crop_region;

/// High-level function: screenshot → one crop per configured region.
pub fn crop_screenshot(
    img: &ImageBuffer<Rgba<u8>, Vec<u8>>,
    regions: &[RegionConfig],
) -> Vec<(String, RgbaImage)> {
    regions
        .iter()
        .map(|region| {
            log::debug!(
                "Cropping {}: x={:.3} y={:.3} w={:.3} h={:.3}",
                region.name, region.rect.x, region.rect.y, region.rect.width, region.rect.height
            );
            (region.name.clone(), crop_region(img, &region.rect))
        })
        .collect()
}
