//! Plurality consensus over many readings of the same region.
//!
//! Each processed image contributes a [`Sample`] of per-field observations.
//! For every field the most frequent non-empty value wins, with
//! `confidence = support / total × 100`. Fields are resolved independently.

pub mod engine;
pub mod tally;

pub use engine::ConsensusEngine;
pub use tally::{ConsensusTally, FieldTally};

use serde::{Deserialize, Serialize};

use crate::config::Pooling;
use crate::ocr::combine::CombinedResult;
use crate::ocr::extract::{ExtractionMethod, Field};

/// One reading of one field, tagged with the strategy that produced it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Observation {
    pub field: Field,
    pub method: ExtractionMethod,
    pub value: String,
}

/// Everything one image contributed.
#[derive(Clone, Debug, Default)]
pub struct Sample {
    /// File or variant the observations came from
    pub source: String,
    pub observations: Vec<Observation>,
}

impl Sample {
    pub fn from_combined(result: &CombinedResult, pooling: Pooling) -> Self {
        Self {
            source: result.filename.clone(),
            observations: observations(result, pooling),
        }
    }
}

/// Turns a per-image result into observations.
///
/// `Combined` yields one observation per non-empty field, tagged with the
/// method that won it. `PerMethod` yields every method's own reading.
pub fn observations(result: &CombinedResult, pooling: Pooling) -> Vec<Observation> {
    match pooling {
        Pooling::Combined => Field::ALL
            .iter()
            .filter_map(|&field| {
                let method = result.source(field)?;
                let value = result.record.get(field);
                (!value.is_empty()).then(|| Observation {
                    field,
                    method,
                    value: value.to_string(),
                })
            })
            .collect(),
        Pooling::PerMethod => result
            .method_results
            .iter()
            .flat_map(|r| {
                Field::ALL.into_iter().map(move |field| Observation {
                    field,
                    method: r.method,
                    value: r.record.get(field).to_string(),
                })
            })
            .filter(|o| !o.value.is_empty())
            .collect(),
    }
}

/// Consensus outcome for a single field.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldConsensus {
    pub value: String,
    /// Percent, 0–100
    pub confidence: f64,
    pub support_count: usize,
    pub total_observations: usize,
}

/// Consensus outcome for one region.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConsensusResult {
    pub region: String,
    pub b_value: FieldConsensus,
    pub s_value: FieldConsensus,
    pub t_value: FieldConsensus,
    pub people_count: FieldConsensus,
    pub dollar_amount: FieldConsensus,
    pub best_method: Option<ExtractionMethod>,
    pub overall_confidence: f64,
    pub images_processed: usize,
}

impl ConsensusResult {
    pub fn field(&self, field: Field) -> &FieldConsensus {
        match field {
            Field::B => &self.b_value,
            Field::S => &self.s_value,
            Field::T => &self.t_value,
            Field::People => &self.people_count,
            Field::Dollar => &self.dollar_amount,
        }
    }
}
