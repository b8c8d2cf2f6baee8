//! Named image variants fed to OCR.
//!
//! One crop goes in, an ordered [`VariantSet`] comes out. Each variant is aimed
//! at a particular failure mode (low contrast, noise, skew, thin strokes) and
//! remembers the transform chain that produced it.

use image::GrayImage;
use imageproc::contrast::equalize_histogram;
use imageproc::distance_transform::Norm;
use imageproc::filter::median_filter;
use imageproc::morphology::{close, dilate, erode, open};

use super::preprocess::{
    adaptive_threshold_gaussian, adaptive_threshold_mean, add_border, clahe, deskew, gamma_correct,
    gaussian_blur, otsu_binarize, rescale, rescale_factor,
};
use crate::config::{VariantConfig, VariantMode};
use crate::error::VariantError;

/// Name of the variant produced when the full catalog cannot be built.
pub const FALLBACK_VARIANT: &str = "otsu_fallback";

/// Variant names of the full catalog, in generation order.
pub const FULL_CATALOG: [&str; 18] = [
    "original",
    "rescaled",
    "bordered",
    "deskewed",
    "otsu_binarized",
    "adaptive_binarized",
    "adaptive2_binarized",
    "gaussian_blur",
    "median_blur",
    "denoised",
    "dilated",
    "eroded",
    "opening",
    "closing",
    "clahe_enhanced",
    "histogram_equalized",
    "gamma_corrected",
    "clahe_adaptive",
];

/// Variant names of the optimized catalog, in generation order.
pub const OPTIMIZED_CATALOG: [&str; 3] = ["clahe_adaptive", "gaussian_blur", "adaptive_binarized"];

/// Whether `name` is a variant this generator can produce.
pub fn is_known_variant(name: &str) -> bool {
    name == FALLBACK_VARIANT || FULL_CATALOG.contains(&name)
}

// Box-mean threshold parameters of the second adaptive variant
const ADAPTIVE2_BLOCK: u32 = 15;
const ADAPTIVE2_C: i32 = 3;

/// A processed image ready for OCR.
#[derive(Clone, Debug)]
pub struct Variant {
    pub name: String,
    /// Transforms applied, first to last
    pub chain: Vec<String>,
    pub image: GrayImage,
}

/// Ordered collection of variants of one source image.
#[derive(Clone, Debug, Default)]
pub struct VariantSet {
    variants: Vec<Variant>,
}

impl VariantSet {
    fn push(&mut self, name: &str, parent: Option<&[String]>, image: GrayImage) -> &Variant {
        let mut chain = parent.map(<[String]>::to_vec).unwrap_or_default();
        chain.push(name.to_string());
        self.variants.push(Variant {
            name: name.to_string(),
            chain,
            image,
        });
        &self.variants[self.variants.len() - 1]
    }

    pub fn get(&self, name: &str) -> Option<&Variant> {
        self.variants.iter().find(|v| v.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.variants.iter().map(|v| v.name.as_str()).collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Variant> {
        self.variants.iter()
    }

    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }
}

impl IntoIterator for VariantSet {
    type Item = Variant;
    type IntoIter = std::vec::IntoIter<Variant>;

    fn into_iter(self) -> Self::IntoIter {
        self.variants.into_iter()
    }
}

/// Builds [`VariantSet`]s according to a [`VariantConfig`].
pub struct VariantGenerator {
    config: VariantConfig,
}

impl VariantGenerator {
    pub fn new(config: VariantConfig) -> Self {
        Self { config }
    }

    /// Produces the configured catalog for `gray`.
    ///
    /// Never fails: when the catalog cannot be built, the set holds only the
    /// Otsu fallback.
    pub fn generate(&self, gray: &GrayImage) -> VariantSet {
        let result = match self.config.mode {
            VariantMode::Full => self.full(gray),
            VariantMode::Optimized => self.optimized(gray),
        };

        match result {
            Ok(set) => {
                log::debug!("Generated {} variants", set.len());
                set
            }
            Err(e) => {
                log::warn!("Variant generation failed ({}), using Otsu fallback", e);
                self.fallback(gray)
            }
        }
    }

    fn fallback(&self, gray: &GrayImage) -> VariantSet {
        let mut set = VariantSet::default();
        set.push(FALLBACK_VARIANT, None, otsu_binarize(gray));
        set
    }

    fn full(&self, gray: &GrayImage) -> Result<VariantSet, VariantError> {
        let cfg = &self.config;
        let mut set = VariantSet::default();

        let original = set.push("original", None, gray.clone()).chain.clone();

        let factor = rescale_factor(gray.width(), gray.height(), cfg);
        let rescaled_img = rescale(gray, factor)?;
        let rescaled = set.push("rescaled", Some(&original), rescaled_img.clone()).chain.clone();

        let bordered_img = add_border(&rescaled_img, cfg.border_size);
        let bordered = set.push("bordered", Some(&rescaled), bordered_img.clone()).chain.clone();

        let base = deskew(&bordered_img);
        let deskewed = set.push("deskewed", Some(&bordered), base.clone()).chain.clone();

        // Binarization
        let otsu = otsu_binarize(&base);
        let otsu_chain = set.push("otsu_binarized", Some(&deskewed), otsu.clone()).chain.clone();
        set.push(
            "adaptive_binarized",
            Some(&deskewed),
            adaptive_threshold_gaussian(&base, cfg.adaptive_block_size, cfg.adaptive_c),
        );
        set.push(
            "adaptive2_binarized",
            Some(&deskewed),
            adaptive_threshold_mean(&base, ADAPTIVE2_BLOCK, ADAPTIVE2_C),
        );

        // Denoising of the Otsu result
        set.push("gaussian_blur", Some(&otsu_chain), gaussian_blur(&otsu, 3));
        set.push("median_blur", Some(&otsu_chain), median_filter(&otsu, 1, 1));
        let denoised_img = median_filter(&otsu, 2, 2);
        let denoised = set.push("denoised", Some(&otsu_chain), denoised_img.clone()).chain.clone();

        // Morphology of the denoised result
        set.push("dilated", Some(&denoised), dilate(&denoised_img, Norm::LInf, 1));
        set.push("eroded", Some(&denoised), erode(&denoised_img, Norm::LInf, 1));
        set.push("opening", Some(&denoised), open(&denoised_img, Norm::LInf, 1));
        set.push("closing", Some(&denoised), close(&denoised_img, Norm::LInf, 1));

        // Contrast
        let clahe_img = clahe(&base, cfg.clahe_clip_limit, cfg.clahe_tile_grid);
        let clahe_chain = set
            .push("clahe_enhanced", Some(&deskewed), clahe_img.clone())
            .chain
            .clone();
        set.push("histogram_equalized", Some(&deskewed), equalize_histogram(&base));
        set.push("gamma_corrected", Some(&deskewed), gamma_correct(&base, cfg.gamma));
        set.push(
            "clahe_adaptive",
            Some(&clahe_chain),
            adaptive_threshold_gaussian(&clahe_img, cfg.adaptive_block_size, cfg.adaptive_c),
        );

        Ok(set)
    }

    fn optimized(&self, gray: &GrayImage) -> Result<VariantSet, VariantError> {
        if gray.width() == 0 || gray.height() == 0 {
            return Err(VariantError::EmptyImage);
        }
        let cfg = &self.config;
        let mut set = VariantSet::default();

        let clahe_img = clahe(gray, cfg.clahe_clip_limit, cfg.clahe_tile_grid);
        let clahe_chain = vec!["clahe_enhanced".to_string()];
        set.push(
            "clahe_adaptive",
            Some(&clahe_chain),
            adaptive_threshold_gaussian(&clahe_img, cfg.adaptive_block_size, cfg.adaptive_c),
        );
        set.push("gaussian_blur", None, gaussian_blur(gray, 3));
        set.push(
            "adaptive_binarized",
            None,
            adaptive_threshold_gaussian(gray, cfg.adaptive_block_size, cfg.adaptive_c),
        );

        Ok(set)
    }
}
