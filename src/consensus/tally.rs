//! Incremental frequency counts behind the consensus vote.

use super::{ConsensusResult, FieldConsensus, Observation};
use crate::ocr::extract::{ExtractionMethod, Field};

/// Value frequencies for one field, in first-encountered order.
#[derive(Clone, Debug, Default)]
pub struct FieldTally {
    counts: Vec<(String, usize)>,
    total: usize,
}

impl FieldTally {
    /// Counts a non-empty value. Empty values are ignored.
    pub fn add(&mut self, value: &str) {
        if value.is_empty() {
            return;
        }
        self.total += 1;
        match self.counts.iter_mut().find(|(v, _)| v == value) {
            Some((_, n)) => *n += 1,
            None => self.counts.push((value.to_string(), 1)),
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Plurality value; ties go to the value seen first.
    pub fn consensus(&self) -> FieldConsensus {
        let mut best: Option<&(String, usize)> = None;
        for entry in &self.counts {
            if best.is_none_or(|b| entry.1 > b.1) {
                best = Some(entry);
            }
        }

        match best {
            Some((value, support)) => FieldConsensus {
                value: value.clone(),
                confidence: *support as f64 / self.total as f64 * 100.0,
                support_count: *support,
                total_observations: self.total,
            },
            None => FieldConsensus::default(),
        }
    }
}

#[derive(Clone, Debug)]
struct MethodTally {
    method: ExtractionMethod,
    non_empty: usize,
    fields: [bool; 5],
}

impl MethodTally {
    fn ratio(&self) -> f64 {
        let distinct = self.fields.iter().filter(|&&f| f).count();
        if distinct == 0 {
            0.0
        } else {
            self.non_empty as f64 / distinct as f64
        }
    }
}

/// Running tallies for all five fields plus per-method productivity.
#[derive(Clone, Debug, Default)]
pub struct ConsensusTally {
    fields: [FieldTally; 5],
    methods: Vec<MethodTally>,
}

impl ConsensusTally {
    pub fn add(&mut self, observation: &Observation) {
        if observation.value.is_empty() {
            return;
        }
        self.fields[observation.field.index()].add(&observation.value);

        let idx = match self.methods.iter().position(|m| m.method == observation.method) {
            Some(idx) => idx,
            None => {
                self.methods.push(MethodTally {
                    method: observation.method,
                    non_empty: 0,
                    fields: [false; 5],
                });
                self.methods.len() - 1
            }
        };
        let stats = &mut self.methods[idx];
        stats.non_empty += 1;
        stats.fields[observation.field.index()] = true;
    }

    pub fn extend<'a>(&mut self, observations: impl IntoIterator<Item = &'a Observation>) {
        for observation in observations {
            self.add(observation);
        }
    }

    pub fn field(&self, field: Field) -> &FieldTally {
        &self.fields[field.index()]
    }

    /// Method with the most non-empty observations per field contributed.
    /// Ties keep the method seen first.
    pub fn best_method(&self) -> Option<ExtractionMethod> {
        let mut best: Option<&MethodTally> = None;
        for stats in &self.methods {
            if best.is_none_or(|b| stats.ratio() > b.ratio()) {
                best = Some(stats);
            }
        }
        best.map(|m| m.method)
    }

    /// Mean of the five per-field confidences.
    pub fn overall_confidence(&self) -> f64 {
        let sum: f64 = self.fields.iter().map(|f| f.consensus().confidence).sum();
        sum / Field::ALL.len() as f64
    }

    pub fn result(&self, region: &str, images_processed: usize) -> ConsensusResult {
        ConsensusResult {
            region: region.to_string(),
            b_value: self.field(Field::B).consensus(),
            s_value: self.field(Field::S).consensus(),
            t_value: self.field(Field::T).consensus(),
            people_count: self.field(Field::People).consensus(),
            dollar_amount: self.field(Field::Dollar).consensus(),
            best_method: self.best_method(),
            overall_confidence: self.overall_confidence(),
            images_processed,
        }
    }
}
