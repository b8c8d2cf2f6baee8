use std::fmt;

use image::GrayImage;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::engine::OcrEngine;
use crate::error::ExtractionError;

/// Any run of ASCII digits. OCR output can carry full-width or other
/// non-ASCII digits, which never count as values.
const DIGIT_RUN_PATTERN: &str = r"[0-9]+";

/// Comma-grouped money numeral, e.g. 1,234 or 12,345,678.
const MONEY_PATTERN: &str = r"[0-9]{1,3}(?:,[0-9]{3})+";

/// Labeled patterns (Method B): primary form first, relaxed fallback second.
/// The T label is often read as ○, @, *, o, O, ), § or ©.
const LABELED_PATTERNS: [(Field, &str, &str); 5] = [
    (Field::B, r"\bB\s?([0-9]{1,3})", r"B([0-9]{1,3})"),
    (Field::S, r"\bS\s?([0-9]{1,3})", r"S([0-9]{1,3})"),
    (Field::T, r"[\u{25CB}@*oO)§©]\s?([0-9]{1,3})", r"[T@]([0-9]{1,3})"),
    (Field::People, r"[👥#@§© ]([0-9]{3})\b", r"([0-9]{3})"),
    (Field::Dollar, r"\$\s?([0-9]{1,3}(?:,[0-9]{3})+)", r"([0-9]{1,3}(?:,[0-9]{3})+)"),
];

/// Label character classes used by the line scan (Method C).
const LINE_LABELS: [(Field, &str); 3] = [
    (Field::B, "B"),
    (Field::S, "S"),
    (Field::T, "[T\u{25CB}@§©]"),
];

/// One of the five values read from a panel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Field {
    B,
    S,
    T,
    People,
    Dollar,
}

impl Field {
    pub const ALL: [Field; 5] = [Field::B, Field::S, Field::T, Field::People, Field::Dollar];

    /// Column/key name used in CSV and JSON output.
    pub fn name(self) -> &'static str {
        match self {
            Field::B => "b_value",
            Field::S => "s_value",
            Field::T => "t_value",
            Field::People => "people_count",
            Field::Dollar => "dollar_amount",
        }
    }

    pub fn index(self) -> usize {
        match self {
            Field::B => 0,
            Field::S => 1,
            Field::T => 2,
            Field::People => 3,
            Field::Dollar => 4,
        }
    }

    /// Whether `value` has this field's digit-grouping shape.
    pub fn accepts(self, value: &str) -> bool {
        let digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
        match self {
            Field::B | Field::S | Field::T => (1..=3).contains(&value.len()) && digits(value),
            Field::People => value.len() == 3 && digits(value),
            Field::Dollar => {
                let mut groups = value.split(',');
                let head_ok = groups
                    .next()
                    .is_some_and(|g| (1..=3).contains(&g.len()) && digits(g));
                let mut tail_count = 0;
                let tail_ok = groups.all(|g| {
                    tail_count += 1;
                    g.len() == 3 && digits(g)
                });
                head_ok && tail_ok && tail_count > 0
            }
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The five-field record. An empty string means "not found".
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractedRecord {
    pub b_value: String,
    #[serde(alias = "p_value")]
    pub s_value: String,
    pub t_value: String,
    pub people_count: String,
    pub dollar_amount: String,
}

impl ExtractedRecord {
    pub fn get(&self, field: Field) -> &str {
        match field {
            Field::B => &self.b_value,
            Field::S => &self.s_value,
            Field::T => &self.t_value,
            Field::People => &self.people_count,
            Field::Dollar => &self.dollar_amount,
        }
    }

    pub fn set(&mut self, field: Field, value: impl Into<String>) {
        let slot = match field {
            Field::B => &mut self.b_value,
            Field::S => &mut self.s_value,
            Field::T => &mut self.t_value,
            Field::People => &mut self.people_count,
            Field::Dollar => &mut self.dollar_amount,
        };
        *slot = value.into();
    }

    /// Blanks every field whose value does not have the field's shape.
    pub fn sanitized(mut self) -> Self {
        for field in Field::ALL {
            if !self.get(field).is_empty() && !field.accepts(self.get(field)) {
                log::debug!("Dropping malformed {} '{}'", field, self.get(field));
                self.set(field, "");
            }
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        Field::ALL.iter().all(|&f| self.get(f).is_empty())
    }
}

/// The three independent text-to-record strategies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    /// A: values by position around the first 3-digit run
    Positional,
    /// B: values by the label printed before them
    Labeled,
    /// C: per-line label scan with positional fill-in
    LineScanned,
}

impl ExtractionMethod {
    pub const ALL: [ExtractionMethod; 3] = [
        ExtractionMethod::Positional,
        ExtractionMethod::Labeled,
        ExtractionMethod::LineScanned,
    ];

    pub fn ordinal(self) -> u8 {
        match self {
            ExtractionMethod::Positional => 1,
            ExtractionMethod::Labeled => 2,
            ExtractionMethod::LineScanned => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExtractionMethod::Positional => "positional",
            ExtractionMethod::Labeled => "labeled",
            ExtractionMethod::LineScanned => "line_scanned",
        }
    }
}

impl fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One strategy's reading of one OCR text.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MethodResult {
    pub method: ExtractionMethod,
    pub record: ExtractedRecord,
    pub raw_text: String,
}

/// Turns OCR text into [`ExtractedRecord`]s. Patterns are compiled once.
pub struct FieldExtractor {
    digit_run: Regex,
    money: Regex,
    labeled: Vec<(Field, Regex, Regex)>,
    line_scan: Vec<(Field, [Regex; 3])>,
}

impl FieldExtractor {
    pub fn new() -> Result<Self, regex::Error> {
        let labeled = LABELED_PATTERNS
            .iter()
            .map(|&(field, primary, fallback)| -> Result<_, regex::Error> {
                Ok((field, Regex::new(primary)?, Regex::new(fallback)?))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let line_scan = LINE_LABELS
            .iter()
            .map(|&(field, label)| -> Result<_, regex::Error> {
                Ok((
                    field,
                    [
                        Regex::new(&format!(r"{label}([0-9]{{1,3}})"))?,
                        Regex::new(&format!(r"\b([0-9]{{1,3}})\s*{label}"))?,
                        Regex::new(&format!(r"{label}\s*([0-9]{{1,3}})"))?,
                    ],
                ))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            digit_run: Regex::new(DIGIT_RUN_PATTERN)?,
            money: Regex::new(MONEY_PATTERN)?,
            labeled,
            line_scan,
        })
    }

    fn digit_runs<'t>(&self, text: &'t str) -> Vec<&'t str> {
        self.digit_run.find_iter(text).map(|m| m.as_str()).collect()
    }

    fn first_money(&self, text: &str) -> String {
        self.money
            .find(text)
            .map(|m| m.as_str().to_string())
            .unwrap_or_default()
    }

    /// Runs a single strategy over `text`. Never fails; absent values are `""`.
    pub fn extract(&self, method: ExtractionMethod, text: &str) -> ExtractedRecord {
        let record = match method {
            ExtractionMethod::Positional => self.extract_positional(text),
            ExtractionMethod::Labeled => self.extract_labeled(text),
            ExtractionMethod::LineScanned => self.extract_line_scanned(text),
        };
        record.sanitized()
    }

    /// Runs all three strategies over the same text.
    pub fn extract_all(&self, text: &str) -> Vec<MethodResult> {
        ExtractionMethod::ALL
            .iter()
            .map(|&method| {
                let record = self.extract(method, text);
                log::debug!("{}: {:?}", method, record);
                MethodResult {
                    method,
                    record,
                    raw_text: text.trim().to_string(),
                }
            })
            .collect()
    }

    /// OCRs `image` once and runs every strategy on the text.
    ///
    /// An unreadable image or an OCR failure is an error; a readable image
    /// with nothing recognizable is an all-empty result.
    pub fn recognize_and_extract(
        &self,
        engine: &dyn OcrEngine,
        image: &GrayImage,
    ) -> Result<Vec<MethodResult>, ExtractionError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(ExtractionError::EmptyImage);
        }
        let text = engine.recognize(image)?;
        Ok(self.extract_all(&text))
    }

    fn extract_positional(&self, text: &str) -> ExtractedRecord {
        let runs = self.digit_runs(text);
        let mut record = ExtractedRecord::default();

        let pivot = runs.iter().position(|r| r.len() == 3);
        if let Some(p) = pivot {
            record.people_count = runs[p].to_string();
        }

        if runs.len() >= 3 {
            match pivot {
                Some(p) => fill_around(&mut record, &runs, p),
                None => {
                    record.b_value = runs[0].to_string();
                    record.s_value = runs[1].to_string();
                    record.t_value = runs[2].to_string();
                }
            }
        }

        record.dollar_amount = self.first_money(text);
        record
    }

    fn extract_labeled(&self, text: &str) -> ExtractedRecord {
        let text = text.trim();
        let mut record = ExtractedRecord::default();

        for (field, primary, fallback) in &self.labeled {
            let found = primary
                .captures(text)
                .or_else(|| fallback.captures(text))
                .and_then(|c| c.get(1));
            if let Some(m) = found {
                record.set(*field, m.as_str());
            }
        }
        record
    }

    fn extract_line_scanned(&self, text: &str) -> ExtractedRecord {
        let text = text.trim();
        let runs = self.digit_runs(text);
        let mut record = ExtractedRecord::default();

        let people = runs.iter().position(|r| {
            r.len() == 3 && r.parse::<u16>().is_ok_and(|n| (100..=999).contains(&n))
        });
        if let Some(p) = people {
            record.people_count = runs[p].to_string();
        }
        record.dollar_amount = self.first_money(text);

        for line in text.lines() {
            for (field, patterns) in &self.line_scan {
                if !record.get(*field).is_empty() {
                    continue;
                }
                let found = patterns
                    .iter()
                    .find_map(|re| re.captures(line).and_then(|c| c.get(1)));
                if let Some(m) = found {
                    record.set(*field, m.as_str());
                }
            }
        }

        if runs.len() >= 3 {
            if let Some(p) = people {
                let mut positional = ExtractedRecord::default();
                fill_around(&mut positional, &runs, p);
                for field in [Field::B, Field::S, Field::T] {
                    if record.get(field).is_empty() {
                        record.set(field, positional.get(field));
                    }
                }
            }
        }

        record
    }
}

/// Fills b/s/t from the runs two before, one before and one after `pivot`.
fn fill_around(record: &mut ExtractedRecord, runs: &[&str], pivot: usize) {
    if pivot >= 2 {
        record.b_value = runs[pivot - 2].to_string();
    }
    if pivot >= 1 {
        record.s_value = runs[pivot - 1].to_string();
    }
    if let Some(t) = runs.get(pivot + 1) {
        record.t_value = t.to_string();
    }
}
