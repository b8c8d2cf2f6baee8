use super::tally::ConsensusTally;
use super::{ConsensusResult, Observation, Sample};
use crate::config::ConsensusConfig;
use crate::error::ExtractionError;

/// Runs the consensus vote in full or optimized (ranked, early-stopping) form.
pub struct ConsensusEngine {
    config: ConsensusConfig,
}

impl ConsensusEngine {
    pub fn new(config: ConsensusConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    /// Position of `variant` in the priority list. Unlisted names share the
    /// worst rank.
    pub fn variant_rank(&self, variant: &str) -> usize {
        self.config
            .variant_priority
            .iter()
            .position(|v| v == variant)
            .unwrap_or(self.config.variant_priority.len())
    }

    /// Pools every observation of every sample.
    pub fn analyze_full(&self, region: &str, samples: &[Sample]) -> ConsensusResult {
        let mut tally = ConsensusTally::default();
        for sample in samples {
            if sample.observations.is_empty() {
                log::debug!("{}: nothing readable in {}", region, sample.source);
            }
            tally.extend(&sample.observations);
        }

        let result = tally.result(region, samples.len());
        log::info!(
            "{}: full consensus over {} samples, overall {:.1}%",
            region,
            samples.len(),
            result.overall_confidence
        );
        result
    }

    /// Examines candidates best-ranked first and stops once the running overall
    /// confidence reaches the threshold or `sample_size` candidates have been
    /// consumed.
    ///
    /// `extract` is called at most once per examined candidate. A candidate
    /// that fails is logged, counted as processed and contributes nothing.
    pub fn analyze_optimized<C, V, F>(
        &self,
        region: &str,
        mut candidates: Vec<C>,
        variant_of: V,
        mut extract: F,
    ) -> ConsensusResult
    where
        V: Fn(&C) -> &str,
        F: FnMut(&C) -> Result<Vec<Observation>, ExtractionError>,
    {
        candidates.sort_by_key(|c| self.variant_rank(variant_of(c)));

        let mut tally = ConsensusTally::default();
        let mut processed = 0;

        for candidate in candidates.iter().take(self.config.sample_size) {
            processed += 1;
            match extract(candidate) {
                Ok(observations) => tally.extend(&observations),
                Err(e) => {
                    log::warn!("{}: skipping {} ({})", region, variant_of(candidate), e);
                }
            }

            let running = tally.overall_confidence();
            log::debug!("{}: {} processed, running confidence {:.1}%", region, processed, running);
            if running >= self.config.confidence_threshold {
                log::info!(
                    "{}: early stop after {} images ({:.1}% >= {:.1}%)",
                    region,
                    processed,
                    running,
                    self.config.confidence_threshold
                );
                break;
            }
        }

        tally.result(region, processed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConsensusMode;
    use crate::ocr::extract::{ExtractionMethod, Field};
    use std::cell::RefCell;

    fn obs(field: Field, value: &str) -> Observation {
        Observation {
            field,
            method: ExtractionMethod::LineScanned,
            value: value.to_string(),
        }
    }

    fn full_obs(b: &str, s: &str, t: &str, people: &str, dollar: &str) -> Vec<Observation> {
        vec![
            obs(Field::B, b),
            obs(Field::S, s),
            obs(Field::T, t),
            obs(Field::People, people),
            obs(Field::Dollar, dollar),
        ]
    }

    fn engine(sample_size: usize, threshold: f64) -> ConsensusEngine {
        ConsensusEngine::new(ConsensusConfig {
            mode: ConsensusMode::Optimized,
            sample_size,
            confidence_threshold: threshold,
            ..ConsensusConfig::default()
        })
    }

    #[test]
    fn test_full_plurality_and_empty_fields() {
        let samples: Vec<Sample> = ["100", "100", "200"]
            .iter()
            .map(|v| Sample {
                source: "x".to_string(),
                observations: vec![obs(Field::People, v)],
            })
            .collect();

        let result = engine(5, 80.0).analyze_full("lexi", &samples);
        assert_eq!(result.people_count.value, "100");
        assert_eq!(result.people_count.support_count, 2);
        assert_eq!(result.people_count.total_observations, 3);
        assert_eq!(format!("{:.1}", result.people_count.confidence), "66.7");
        assert_eq!(result.b_value.value, "");
        assert_eq!(result.b_value.confidence, 0.0);
        assert_eq!(result.images_processed, 3);
        assert_eq!(result.best_method, Some(ExtractionMethod::LineScanned));
    }

    #[test]
    fn test_full_no_samples() {
        let result = engine(5, 80.0).analyze_full("mafer", &[]);
        assert_eq!(result.region, "mafer");
        assert_eq!(result.overall_confidence, 0.0);
        assert_eq!(result.best_method, None);
        assert_eq!(result.images_processed, 0);
    }

    #[test]
    fn test_full_is_deterministic() {
        let samples: Vec<Sample> = (0..6)
            .map(|i| Sample {
                source: format!("img{}", i),
                observations: full_obs(
                    if i % 2 == 0 { "1" } else { "2" },
                    "34",
                    if i < 3 { "5" } else { "6" },
                    "123",
                    "1,234",
                ),
            })
            .collect();

        let e = engine(5, 80.0);
        let first = e.analyze_full("daroka", &samples);
        let second = e.analyze_full("daroka", &samples);
        assert_eq!(first, second);
        assert_eq!(first.b_value.value, "1");
        assert_eq!(first.t_value.value, "5");
    }

    #[test]
    fn test_variant_rank() {
        let e = engine(5, 80.0);
        assert_eq!(e.variant_rank("clahe_adaptive"), 0);
        assert_eq!(e.variant_rank("gaussian_blur"), 1);
        let worst = e.config().variant_priority.len();
        assert_eq!(e.variant_rank("mystery"), worst);
        assert_eq!(e.variant_rank("other_mystery"), worst);
    }

    #[test]
    fn test_optimized_ranks_and_stops_early() {
        let seen = RefCell::new(Vec::new());
        let candidates = vec!["mystery", "original", "gaussian_blur", "clahe_adaptive"];

        let result = engine(5, 80.0).analyze_optimized(
            "lexi",
            candidates,
            |c| *c,
            |c| {
                seen.borrow_mut().push(c.to_string());
                Ok(full_obs("12", "34", "56", "123", "1,234"))
            },
        );

        // One complete agreeing image already gives 100%
        assert_eq!(seen.into_inner(), vec!["clahe_adaptive"]);
        assert_eq!(result.images_processed, 1);
        assert_eq!(result.b_value.value, "12");
        assert_eq!(result.overall_confidence, 100.0);
    }

    #[test]
    fn test_optimized_never_exceeds_sample_size() {
        let calls = RefCell::new(0);
        let candidates: Vec<String> = (0..9).map(|i| format!("v{}", i)).collect();

        let result = engine(5, 80.0).analyze_optimized(
            "lexi",
            candidates,
            |c| c.as_str(),
            |c| {
                *calls.borrow_mut() += 1;
                // Every image disagrees, so confidence never reaches 80%
                Ok(vec![obs(Field::B, c)])
            },
        );

        assert_eq!(*calls.borrow(), 5);
        assert_eq!(result.images_processed, 5);
        assert_eq!(result.b_value.total_observations, 5);
        assert_eq!(result.b_value.value, "v0");
        assert!(result.overall_confidence < 80.0);
    }

    #[test]
    fn test_optimized_stable_within_rank() {
        let order = RefCell::new(Vec::new());
        let candidates = vec!["b_unknown", "a_unknown", "c_unknown"];

        engine(5, 101.0).analyze_optimized(
            "lexi",
            candidates,
            |c| *c,
            |c| {
                order.borrow_mut().push(c.to_string());
                Ok(Vec::new())
            },
        );

        assert_eq!(order.into_inner(), vec!["b_unknown", "a_unknown", "c_unknown"]);
    }

    #[test]
    fn test_optimized_failures_are_excluded() {
        let candidates = vec!["clahe_adaptive", "gaussian_blur", "adaptive_binarized"];

        let result = engine(5, 80.0).analyze_optimized(
            "lexi",
            candidates,
            |c| *c,
            |c| {
                if *c == "gaussian_blur" {
                    Err(ExtractionError::Ocr("crashed".to_string()))
                } else {
                    Ok(vec![obs(Field::B, "12")])
                }
            },
        );

        assert_eq!(result.images_processed, 3);
        assert_eq!(result.b_value.total_observations, 2);
        assert_eq!(result.b_value.confidence, 100.0);
    }
}
