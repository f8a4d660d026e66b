//! Name normalization records

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Where a canonical name came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NormalizationSource {
    /// Previously persisted mapping
    Cache,
    /// Semantic grouping provider
    Ai,
    /// Title-cased original (provider failed or omitted the name)
    Fallback,
}

impl NormalizationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            NormalizationSource::Cache => "CACHE",
            NormalizationSource::Ai => "AI",
            NormalizationSource::Fallback => "FALLBACK",
        }
    }
}

/// Mapping of one distinct original name to its canonical name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationRecord {
    /// Lower-cased, trimmed original name (never empty)
    pub original_name: String,
    /// Canonical name
    pub normalized_name: String,
    /// Confidence in [0, 1]
    pub confidence: f32,
    pub source: NormalizationSource,
}

impl NormalizationRecord {
    pub fn new(
        original_name: impl Into<String>,
        normalized_name: impl Into<String>,
        confidence: f32,
        source: NormalizationSource,
    ) -> Self {
        Self {
            original_name: original_name.into(),
            normalized_name: normalized_name.into(),
            confidence: clamp_confidence(confidence),
            source,
        }
    }

    /// Fallback record: title-cased original with a fixed confidence
    pub fn fallback(original_name: &str, confidence: f32) -> Self {
        Self::new(
            original_name,
            title_case(original_name),
            confidence,
            NormalizationSource::Fallback,
        )
    }
}

/// Lower-case and trim a name into its lookup key
pub fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Clamp to [0, 1], mapping NaN to 0
pub fn clamp_confidence(confidence: f32) -> f32 {
    if confidence.is_nan() {
        0.0
    } else {
        confidence.clamp(0.0, 1.0)
    }
}

/// Naive title case: first letter of each whitespace-separated word upper-cased,
/// the rest lower-cased, words joined by single spaces
pub fn title_case(name: &str) -> String {
    name.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Lookup from original name (case-insensitive) to its record
#[derive(Debug, Clone, Default)]
pub struct NormalizationMap {
    records: HashMap<String, NormalizationRecord>,
}

impl NormalizationMap {
    pub fn from_records(records: impl IntoIterator<Item = NormalizationRecord>) -> Self {
        let records = records
            .into_iter()
            .map(|r| (name_key(&r.original_name), r))
            .collect();
        Self { records }
    }

    pub fn get(&self, name: &str) -> Option<&NormalizationRecord> {
        self.records.get(&name_key(name))
    }

    /// Canonical name for `name`; `None` for empty names
    ///
    /// Names absent from the map resolve to their title-cased form.
    pub fn canonical(&self, name: &str) -> Option<String> {
        let key = name_key(name);
        if key.is_empty() {
            return None;
        }
        Some(
            self.records
                .get(&key)
                .map(|r| r.normalized_name.clone())
                .unwrap_or_else(|| title_case(&key)),
        )
    }
}
