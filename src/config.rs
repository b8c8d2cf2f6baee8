//! Pipeline configuration.
//!
//! Loaded from config.json at startup. Every section has defaults, so a
//! partial file (or no file at all) is valid.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::ocr::extract::ExtractionMethod;

/// A rectangle in relative coordinates (0.0 to 1.0).
/// Used for defining screen regions that scale with screenshot size.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RelativeRect {
    /// X position of top-left corner (0.0 = left edge, 1.0 = right edge)
    pub x: f32,
    /// Y position of top-left corner (0.0 = top edge, 1.0 = bottom edge)
    pub y: f32,
    /// Width as fraction of screenshot width
    pub width: f32,
    /// Height as fraction of screenshot height
    pub height: f32,
}

impl Default for RelativeRect {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: 0.1,
            height: 0.1,
        }
    }
}

/// One monitored on-screen panel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegionConfig {
    pub name: String,
    pub rect: RelativeRect,
}

/// Tesseract invocation settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Tesseract language code
    pub language: String,
    /// Page segmentation mode (6 = single uniform block of text)
    pub psm: u8,
    /// OCR engine mode (3 = default, based on what is available)
    pub oem: u8,
    /// Explicit path to the tesseract executable
    pub tesseract_path: Option<PathBuf>,
    /// Explicit tessdata directory
    pub tessdata_dir: Option<PathBuf>,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            language: "eng".to_string(),
            psm: 6,
            oem: 3,
            tesseract_path: None,
            tessdata_dir: None,
        }
    }
}

/// Which catalog of image variants to produce.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariantMode {
    /// Every binarization, denoising, morphology and contrast variant
    Full,
    /// The three variants that produce the most usable text
    #[default]
    Optimized,
}

/// Parameters for the image variant generator.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct VariantConfig {
    pub mode: VariantMode,
    /// Resolution Tesseract reads best at
    pub target_dpi: f32,
    /// Assumed resolution of screenshot crops
    pub source_dpi: f32,
    pub min_scale: f32,
    pub max_scale: f32,
    /// Longest side allowed after rescaling, in pixels
    pub max_dimension: u32,
    /// Adaptive threshold neighbourhood size (odd, >= 3)
    pub adaptive_block_size: u32,
    /// Constant subtracted from the local mean
    pub adaptive_c: i32,
    /// CLAHE clip limit, relative to a uniform histogram
    pub clahe_clip_limit: f32,
    /// CLAHE tiles per axis
    pub clahe_tile_grid: u32,
    /// White border added before binarization, in pixels
    pub border_size: u32,
    pub gamma: f32,
}

impl Default for VariantConfig {
    fn default() -> Self {
        Self {
            mode: VariantMode::default(),
            target_dpi: 300.0,
            source_dpi: 72.0,
            min_scale: 1.0,
            max_scale: 4.0,
            max_dimension: 4000,
            adaptive_block_size: 11,
            adaptive_c: 2,
            clahe_clip_limit: 2.0,
            clahe_tile_grid: 8,
            border_size: 10,
            gamma: 1.2,
        }
    }
}

/// Field extraction settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Per-field override order used when combining methods, highest first
    pub method_priority: Vec<ExtractionMethod>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            method_priority: vec![
                ExtractionMethod::LineScanned,
                ExtractionMethod::Labeled,
                ExtractionMethod::Positional,
            ],
        }
    }
}

/// Full pooling vs. ranked sampling with early termination.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsensusMode {
    Full,
    #[default]
    Optimized,
}

/// What each processed image contributes to the vote.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pooling {
    /// One observation per field from the combined record
    #[default]
    Combined,
    /// Every extraction method's record votes separately
    PerMethod,
}

/// Consensus settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    pub mode: ConsensusMode,
    pub pooling: Pooling,
    /// Maximum images examined in optimized mode
    pub sample_size: usize,
    /// Optimized mode stops once the running overall confidence reaches this (percent)
    pub confidence_threshold: f64,
    /// Variant names in the order they are examined; unlisted names go last
    pub variant_priority: Vec<String>,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            mode: ConsensusMode::default(),
            pooling: Pooling::default(),
            sample_size: 5,
            confidence_threshold: 80.0,
            variant_priority: default_variant_priority(),
        }
    }
}

fn default_variant_priority() -> Vec<String> {
    [
        "clahe_adaptive",
        "gaussian_blur",
        "adaptive_binarized",
        "clahe_enhanced",
        "otsu_binarized",
        "adaptive2_binarized",
        "median_blur",
        "denoised",
        "closing",
        "opening",
        "histogram_equalized",
        "gamma_corrected",
        "dilated",
        "eroded",
        "deskewed",
        "bordered",
        "rescaled",
        "original",
        "otsu_fallback",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_regions() -> Vec<RegionConfig> {
    vec![
        RegionConfig {
            name: "lexi".to_string(),
            rect: RelativeRect {
                x: 0.04,
                y: 0.13,
                width: 0.20,
                height: 0.40,
            },
        },
        RegionConfig {
            name: "mafer".to_string(),
            rect: RelativeRect {
                x: 0.27,
                y: 0.13,
                width: 0.20,
                height: 0.40,
            },
        },
        RegionConfig {
            name: "daroka".to_string(),
            rect: RelativeRect {
                x: 0.16,
                y: 0.58,
                width: 0.24,
                height: 0.40,
            },
        },
    ]
}

/// Complete pipeline configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub regions: Vec<RegionConfig>,
    pub ocr: OcrConfig,
    pub variants: VariantConfig,
    pub extraction: ExtractionConfig,
    pub consensus: ConsensusConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            regions: default_regions(),
            ocr: OcrConfig::default(),
            variants: VariantConfig::default(),
            extraction: ExtractionConfig::default(),
            consensus: ConsensusConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Names of all configured regions, in config order.
    pub fn region_names(&self) -> Vec<&str> {
        self.regions.iter().map(|r| r.name.as_str()).collect()
    }
}

/// Loads configuration from `path` or returns defaults.
///
/// A missing or unparsable file is logged and replaced by defaults.
pub fn load_config(path: &Path) -> PipelineConfig {
    log::info!("Looking for config at: {}", path.display());

    if !path.exists() {
        log::info!("{} not found. Using default config.", path.display());
        return PipelineConfig::default();
    }

    match fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(config) => {
                log::info!("Config loaded from {}", path.display());
                config
            }
            Err(e) => {
                log::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                PipelineConfig::default()
            }
        },
        Err(e) => {
            log::warn!("Failed to read {}: {}. Using defaults.", path.display(), e);
            PipelineConfig::default()
        }
    }
}
