use serde::{Deserialize, Serialize};

use super::extract::{ExtractedRecord, ExtractionMethod, Field, MethodResult};

/// The per-image record after merging the three strategies.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CombinedResult {
    pub region: String,
    pub filename: String,
    pub timestamp: String,
    #[serde(flatten)]
    pub record: ExtractedRecord,
    /// Method that supplied each field, indexed by [`Field::index`]
    pub sources: [Option<ExtractionMethod>; 5],
    /// Transform chain of the image that was OCR'd
    pub processing_methods: Vec<String>,
    pub method_results: Vec<MethodResult>,
}

impl CombinedResult {
    pub fn source(&self, field: Field) -> Option<ExtractionMethod> {
        self.sources[field.index()]
    }
}

/// Merges per-method records by a fixed per-field override order.
#[derive(Clone, Debug)]
pub struct MethodCombiner {
    priority: Vec<ExtractionMethod>,
}

impl Default for MethodCombiner {
    fn default() -> Self {
        Self::new(vec![
            ExtractionMethod::LineScanned,
            ExtractionMethod::Labeled,
            ExtractionMethod::Positional,
        ])
    }
}

impl MethodCombiner {
    /// `priority` lists methods highest first. Methods missing from the list
    /// are consulted last, in their natural order.
    pub fn new(mut priority: Vec<ExtractionMethod>) -> Self {
        let mut seen = Vec::with_capacity(priority.len());
        priority.retain(|m| {
            let fresh = !seen.contains(m);
            seen.push(*m);
            fresh
        });
        for method in ExtractionMethod::ALL {
            if !priority.contains(&method) {
                priority.push(method);
            }
        }
        Self { priority }
    }

    pub fn priority(&self) -> &[ExtractionMethod] {
        &self.priority
    }

    /// For each field, takes the first non-empty value in priority order.
    pub fn merge(
        &self,
        results: &[MethodResult],
    ) -> (ExtractedRecord, [Option<ExtractionMethod>; 5]) {
        let mut record = ExtractedRecord::default();
        let mut sources = [None; 5];

        for field in Field::ALL {
            let winner = self.priority.iter().find_map(|&method| {
                results
                    .iter()
                    .find(|r| r.method == method && !r.record.get(field).is_empty())
            });
            if let Some(r) = winner {
                record.set(field, r.record.get(field));
                sources[field.index()] = Some(r.method);
            }
        }

        (record, sources)
    }

    /// Builds the full per-image result.
    pub fn combine(
        &self,
        results: Vec<MethodResult>,
        region: &str,
        filename: &str,
        timestamp: &str,
        processing_methods: Vec<String>,
    ) -> CombinedResult {
        let (record, sources) = self.merge(&results);
        CombinedResult {
            region: region.to_string(),
            filename: filename.to_string(),
            timestamp: timestamp.to_string(),
            record,
            sources,
            processing_methods,
            method_results: results,
        }
    }
}
