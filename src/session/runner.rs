//! Per-region analysis loop.
//!
//! Loads a region's catalog images, expands raw crops into variants, OCRs each
//! candidate once, combines the three strategies per image and runs consensus.
//! Bad images are logged and skipped; a region with nothing readable is
//! reported as skipped rather than failing the run.

use chrono::Local;

use super::catalog::CatalogEntry;
use crate::config::{ConsensusMode, PipelineConfig, Pooling};
use crate::consensus::{ConsensusEngine, ConsensusResult, Sample, observations};
use crate::error::ExtractionError;
use crate::ocr::combine::{CombinedResult, MethodCombiner};
use crate::ocr::engine::OcrEngine;
use crate::ocr::extract::FieldExtractor;
use crate::ocr::variants::{Variant, VariantGenerator, is_known_variant};

/// One image ready for OCR, with the metadata reports need.
#[derive(Clone, Debug)]
pub struct Candidate {
    pub filename: String,
    pub timestamp: String,
    pub variant: Variant,
}

/// Outcome of analysing one region.
#[derive(Clone, Debug)]
pub struct RegionReport {
    pub region: String,
    /// Per-image results for every candidate that was OCR'd successfully
    pub images: Vec<CombinedResult>,
    /// `None` when the region had no readable image
    pub consensus: Option<ConsensusResult>,
}

impl RegionReport {
    pub fn is_skipped(&self) -> bool {
        self.consensus.is_none()
    }
}

pub struct RegionAnalyzer<'a> {
    engine: &'a dyn OcrEngine,
    extractor: FieldExtractor,
    generator: VariantGenerator,
    combiner: MethodCombiner,
    consensus: ConsensusEngine,
    mode: ConsensusMode,
    pooling: Pooling,
}

impl<'a> RegionAnalyzer<'a> {
    pub fn new(engine: &'a dyn OcrEngine, config: &PipelineConfig) -> Result<Self, regex::Error> {
        Ok(Self {
            engine,
            extractor: FieldExtractor::new()?,
            generator: VariantGenerator::new(config.variants.clone()),
            combiner: MethodCombiner::new(config.extraction.method_priority.clone()),
            consensus: ConsensusEngine::new(config.consensus.clone()),
            mode: config.consensus.mode,
            pooling: config.consensus.pooling,
        })
    }

    pub fn with_mode(mut self, mode: ConsensusMode) -> Self {
        self.mode = mode;
        self
    }

    /// Decodes catalog entries into OCR candidates. Raw crops are expanded
    /// through the variant generator; processed images are used as-is.
    /// Unreadable files are logged and skipped.
    pub fn load_candidates(&self, entries: &[&CatalogEntry]) -> Vec<Candidate> {
        let mut candidates = Vec::new();

        for entry in entries {
            let gray = match image::open(&entry.path) {
                Ok(img) => img.to_luma8(),
                Err(source) => {
                    let e = ExtractionError::UnreadableImage {
                        path: entry.path.clone(),
                        source,
                    };
                    log::warn!("{}", e);
                    continue;
                }
            };

            if entry.is_raw_crop() {
                for variant in self.generator.generate(&gray) {
                    candidates.push(Candidate {
                        filename: entry.filename.clone(),
                        timestamp: entry.timestamp.clone(),
                        variant,
                    });
                }
            } else {
                if !is_known_variant(&entry.variant) {
                    log::debug!(
                        "{}: unknown variant '{}', ranked last",
                        entry.filename,
                        entry.variant
                    );
                }
                candidates.push(Candidate {
                    filename: entry.filename.clone(),
                    timestamp: entry.timestamp.clone(),
                    variant: Variant {
                        name: entry.variant.clone(),
                        chain: vec![entry.variant.clone()],
                        image: gray,
                    },
                });
            }
        }

        candidates
    }

    /// OCRs one candidate and merges the three strategies.
    pub fn process(
        &self,
        region: &str,
        candidate: &Candidate,
    ) -> Result<CombinedResult, ExtractionError> {
        let results = self
            .extractor
            .recognize_and_extract(self.engine, &candidate.variant.image)?;

        let timestamp = if candidate.timestamp.is_empty() {
            Local::now().format("%Y%m%d_%H%M%S").to_string()
        } else {
            candidate.timestamp.clone()
        };

        let combined = self.combiner.combine(
            results,
            region,
            &candidate.filename,
            &timestamp,
            candidate.variant.chain.clone(),
        );
        log::debug!(
            "{} [{}]: B={} S={} T={} people={} money={}",
            candidate.filename,
            candidate.variant.name,
            combined.record.b_value,
            combined.record.s_value,
            combined.record.t_value,
            combined.record.people_count,
            combined.record.dollar_amount
        );
        Ok(combined)
    }

    /// Processes every candidate, skipping failures.
    pub fn extract_all(&self, region: &str, candidates: &[Candidate]) -> Vec<CombinedResult> {
        candidates
            .iter()
            .filter_map(|candidate| match self.process(region, candidate) {
                Ok(combined) => Some(combined),
                Err(e) => {
                    log::warn!(
                        "{}: OCR failed for {} [{}]: {}",
                        region,
                        candidate.filename,
                        candidate.variant.name,
                        e
                    );
                    None
                }
            })
            .collect()
    }

    /// Runs per-image extraction and consensus over `candidates`.
    pub fn analyze_candidates(&self, region: &str, candidates: Vec<Candidate>) -> RegionReport {
        if candidates.is_empty() {
            log::warn!("{}: no readable images, region skipped", region);
            return RegionReport {
                region: region.to_string(),
                images: Vec::new(),
                consensus: None,
            };
        }

        log::info!("{}: analysing {} candidates ({:?} mode)", region, candidates.len(), self.mode);

        let (images, result) = match self.mode {
            ConsensusMode::Full => {
                let images = self.extract_all(region, &candidates);
                let samples: Vec<Sample> = images
                    .iter()
                    .map(|c| Sample::from_combined(c, self.pooling))
                    .collect();
                let result = self.consensus.analyze_full(region, &samples);
                (images, result)
            }
            ConsensusMode::Optimized => {
                let mut images = Vec::new();
                let result = self.consensus.analyze_optimized(
                    region,
                    candidates,
                    |c| c.variant.name.as_str(),
                    |c| {
                        let combined = self.process(region, c)?;
                        let obs = observations(&combined, self.pooling);
                        images.push(combined);
                        Ok(obs)
                    },
                );
                (images, result)
            }
        };

        if images.is_empty() {
            log::warn!("{}: every candidate failed OCR, region skipped", region);
            return RegionReport {
                region: region.to_string(),
                images,
                consensus: None,
            };
        }

        log::info!(
            "{}: B={} ({:.1}%) S={} ({:.1}%) T={} ({:.1}%) people={} ({:.1}%) money={} ({:.1}%), overall {:.1}%",
            region,
            result.b_value.value,
            result.b_value.confidence,
            result.s_value.value,
            result.s_value.confidence,
            result.t_value.value,
            result.t_value.confidence,
            result.people_count.value,
            result.people_count.confidence,
            result.dollar_amount.value,
            result.dollar_amount.confidence,
            result.overall_confidence
        );

        RegionReport {
            region: region.to_string(),
            images,
            consensus: Some(result),
        }
    }

    /// Loads `entries` and analyses them as one region.
    pub fn analyze(&self, region: &str, entries: &[&CatalogEntry]) -> RegionReport {
        let candidates = self.load_candidates(entries);
        self.analyze_candidates(region, candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VariantMode;
    use crate::ocr::extract::{ExtractedRecord, ExtractionMethod, Field};
    use crate::session::catalog::scan_directory;
    use image::{GrayImage, Luma};
    use std::cell::Cell;
    use tempfile::tempdir;

    /// Returns the script entry selected by the image's first pixel.
    /// `None` entries simulate an OCR crash.
    struct ScriptedEngine {
        script: Vec<Option<&'static str>>,
        calls: Cell<usize>,
    }

    impl ScriptedEngine {
        fn new(script: Vec<Option<&'static str>>) -> Self {
            Self {
                script,
                calls: Cell::new(0),
            }
        }
    }

    impl OcrEngine for ScriptedEngine {
        fn recognize(&self, image: &GrayImage) -> Result<String, ExtractionError> {
            self.calls.set(self.calls.get() + 1);
            let key = image.get_pixel(0, 0)[0] as usize;
            match self.script.get(key).copied().flatten() {
                Some(text) => Ok(text.to_string()),
                None => Err(ExtractionError::Ocr(format!("no script for {}", key))),
            }
        }
    }

    fn candidate(key: u8, variant: &str) -> Candidate {
        Candidate {
            filename: format!("img{}.png", key),
            timestamp: "20240101_120000".to_string(),
            variant: Variant {
                name: variant.to_string(),
                chain: vec!["original".to_string(), variant.to_string()],
                image: GrayImage::from_pixel(4, 4, Luma([key])),
            },
        }
    }

    fn config(mode: ConsensusMode) -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.consensus.mode = mode;
        config
    }

    const SCENARIO: [Option<&str>; 3] = [
        Some("B12 S34 ○56 #123 $1,234"),
        Some("1234156123"),
        Some("B12S34T56 123 1,234"),
    ];

    fn full_record() -> ExtractedRecord {
        ExtractedRecord {
            b_value: "12".to_string(),
            s_value: "34".to_string(),
            t_value: "56".to_string(),
            people_count: "123".to_string(),
            dollar_amount: "1,234".to_string(),
        }
    }

    #[test]
    fn test_scenario_three_variants() {
        let engine = ScriptedEngine::new(SCENARIO.to_vec());
        let analyzer = RegionAnalyzer::new(&engine, &config(ConsensusMode::Full)).unwrap();

        let candidates = vec![
            candidate(0, "clahe_adaptive"),
            candidate(1, "gaussian_blur"),
            candidate(2, "adaptive_binarized"),
        ];
        let report = analyzer.analyze_candidates("lexi", candidates);

        assert_eq!(report.images.len(), 3);
        assert_eq!(report.images[0].record, full_record());
        assert_eq!(report.images[2].record, full_record());
        // A single unbroken digit run only yields the unlabeled people fallback
        assert_eq!(report.images[1].record.people_count, "123");
        assert_eq!(report.images[1].record.b_value, "");
        assert_eq!(
            report.images[0].processing_methods,
            vec!["original".to_string(), "clahe_adaptive".to_string()]
        );

        let consensus = report.consensus.unwrap();
        assert_eq!(consensus.region, "lexi");
        assert_eq!(consensus.b_value.value, "12");
        assert_eq!(consensus.b_value.confidence, 100.0);
        assert_eq!(consensus.people_count.value, "123");
        assert_eq!(consensus.people_count.support_count, 3);
        assert_eq!(consensus.dollar_amount.value, "1,234");
        assert_eq!(consensus.images_processed, 3);
        assert_eq!(consensus.best_method, Some(ExtractionMethod::LineScanned));
    }

    #[test]
    fn test_scenario_per_method_pooling() {
        let engine = ScriptedEngine::new(SCENARIO.to_vec());
        let mut cfg = config(ConsensusMode::Full);
        cfg.consensus.pooling = Pooling::PerMethod;
        let analyzer = RegionAnalyzer::new(&engine, &cfg).unwrap();

        let candidates = (0..3).map(|k| candidate(k, "gaussian_blur")).collect();
        let consensus = analyzer.analyze_candidates("lexi", candidates).consensus.unwrap();

        // Positional pivots on 123 and reads b=34 from both labeled texts
        assert_eq!(consensus.b_value.value, "12");
        assert_eq!(consensus.b_value.total_observations, 6);
        assert_eq!(consensus.b_value.support_count, 4);
    }

    #[test]
    fn test_failed_ocr_is_excluded() {
        let engine = ScriptedEngine::new(vec![Some("B12 S34 ○56 #123 $1,234"), None]);
        let analyzer = RegionAnalyzer::new(&engine, &config(ConsensusMode::Full)).unwrap();

        let report =
            analyzer.analyze_candidates("mafer", vec![candidate(0, "a"), candidate(1, "b")]);
        assert_eq!(report.images.len(), 1);
        let consensus = report.consensus.unwrap();
        assert_eq!(consensus.images_processed, 1);
        assert_eq!(consensus.overall_confidence, 100.0);
    }

    #[test]
    fn test_region_skipped_when_nothing_readable() {
        let engine = ScriptedEngine::new(vec![None]);
        let analyzer = RegionAnalyzer::new(&engine, &config(ConsensusMode::Optimized)).unwrap();

        assert!(analyzer.analyze_candidates("daroka", Vec::new()).is_skipped());
        assert!(analyzer.analyze_candidates("daroka", vec![candidate(0, "x")]).is_skipped());
    }

    #[test]
    fn test_optimized_stops_at_sample_size() {
        let script: Vec<Option<&'static str>> = vec![
            Some("B1"),
            Some("B2"),
            Some("B3"),
            Some("B4"),
            Some("B5"),
            Some("B6"),
            Some("B7"),
        ];
        let engine = ScriptedEngine::new(script);
        let analyzer = RegionAnalyzer::new(&engine, &config(ConsensusMode::Optimized)).unwrap();

        let candidates = (0..7).map(|k| candidate(k, "median_blur")).collect();
        let report = analyzer.analyze_candidates("lexi", candidates);

        assert_eq!(engine.calls.get(), 5);
        assert_eq!(report.images.len(), 5);
        let consensus = report.consensus.unwrap();
        assert_eq!(consensus.images_processed, 5);
        assert_eq!(consensus.b_value.value, "1");
        assert_eq!(consensus.b_value.total_observations, 5);
    }

    #[test]
    fn test_optimized_prefers_ranked_variants() {
        let engine = ScriptedEngine::new(vec![Some("noise"), Some("B12 S34 ○56 #123 $1,234")]);
        let analyzer = RegionAnalyzer::new(&engine, &config(ConsensusMode::Optimized)).unwrap();

        let candidates = vec![candidate(0, "eroded"), candidate(1, "clahe_adaptive")];
        let report = analyzer.analyze_candidates("lexi", candidates);

        assert_eq!(engine.calls.get(), 1);
        let consensus = report.consensus.unwrap();
        assert_eq!(consensus.images_processed, 1);
        assert_eq!(consensus.overall_confidence, 100.0);
    }

    #[test]
    fn test_full_consensus_is_repeatable() {
        let engine = ScriptedEngine::new(vec![Some("B12 S34"), Some("B13 S34"), Some("B12 #555")]);
        let analyzer = RegionAnalyzer::new(&engine, &config(ConsensusMode::Full)).unwrap();
        let candidates: Vec<Candidate> = (0..3).map(|k| candidate(k, "x")).collect();

        let first = analyzer.analyze_candidates("lexi", candidates.clone()).consensus;
        let second = analyzer.analyze_candidates("lexi", candidates).consensus;
        assert_eq!(first, second);
    }

    #[test]
    fn test_load_candidates_from_disk() {
        let dir = tempdir().unwrap();
        GrayImage::from_pixel(12, 6, Luma([200]))
            .save(dir.path().join("t1_lexi_cropped.png"))
            .unwrap();
        GrayImage::from_pixel(12, 6, Luma([0]))
            .save(dir.path().join("t1_lexi_otsu_binarized.png"))
            .unwrap();
        std::fs::write(dir.path().join("t2_lexi_cropped.png"), b"not a png").unwrap();

        let engine = ScriptedEngine::new(Vec::new());
        let mut cfg = config(ConsensusMode::Full);
        cfg.variants.mode = VariantMode::Optimized;
        let analyzer = RegionAnalyzer::new(&engine, &cfg).unwrap();

        let entries = scan_directory(dir.path(), &cfg.region_names()).unwrap();
        let lexi: Vec<&CatalogEntry> = entries.iter().collect();
        let candidates = analyzer.load_candidates(&lexi);

        let names: Vec<&str> = candidates.iter().map(|c| c.variant.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["clahe_adaptive", "gaussian_blur", "adaptive_binarized", "otsu_binarized"]
        );
        assert!(candidates.iter().all(|c| c.timestamp == "t1"));
    }

    #[test]
    fn test_blank_and_tiny_crops_yield_empty_consensus() {
        // Tesseract reads nothing from a blank page
        let engine = ScriptedEngine::new(vec![Some(""); 256]);
        let crops = [
            GrayImage::from_pixel(24, 12, Luma([0])),
            GrayImage::from_pixel(24, 12, Luma([255])),
            GrayImage::from_pixel(1, 1, Luma([0])),
            GrayImage::from_pixel(1, 9, Luma([255])),
        ];

        for variant_mode in [VariantMode::Full, VariantMode::Optimized] {
            for mode in [ConsensusMode::Full, ConsensusMode::Optimized] {
                let mut cfg = config(mode);
                cfg.variants.mode = variant_mode;
                let analyzer = RegionAnalyzer::new(&engine, &cfg).unwrap();

                for crop in &crops {
                    let candidates: Vec<Candidate> = analyzer
                        .generator
                        .generate(crop)
                        .into_iter()
                        .map(|variant| Candidate {
                            filename: "blank.png".to_string(),
                            timestamp: "t".to_string(),
                            variant,
                        })
                        .collect();
                    assert!(!candidates.is_empty());

                    let report = analyzer.analyze_candidates("lexi", candidates);
                    assert!(report.images.iter().all(|c| c.record.is_empty()));
                    let consensus = report.consensus.unwrap();
                    for field in Field::ALL {
                        assert_eq!(consensus.field(field).value, "");
                        assert_eq!(consensus.field(field).confidence, 0.0);
                    }
                    assert_eq!(consensus.best_method, None);
                    assert_eq!(consensus.overall_confidence, 0.0);
                }
            }
        }
    }

    #[test]
    fn test_record_fields_always_well_formed() {
        let engine = ScriptedEngine::new(vec![Some("$$ 9999999 ,,, ○○ B S T"), Some("")]);
        let analyzer = RegionAnalyzer::new(&engine, &config(ConsensusMode::Full)).unwrap();

        for key in 0..2 {
            let combined = analyzer.process("lexi", &candidate(key, "x")).unwrap();
            for field in Field::ALL {
                let v = combined.record.get(field);
                assert!(v.is_empty() || field.accepts(v));
            }
        }
    }
}
