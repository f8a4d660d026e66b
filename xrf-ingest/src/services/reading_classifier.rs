//! Reading classifier
//!
//! Groups normalized readings by (component, substrate) and applies the
//! regulatory classification rule:
//!
//! | Readings | Positives        | Category    | Result                     |
//! |----------|------------------|-------------|----------------------------|
//! | n ≥ 40   | any              | AVERAGE     | POSITIVE iff p/n > 2.5 %   |
//! | n < 40   | p = 0 or p = n   | UNIFORM     | POSITIVE iff p = n         |
//! | n < 40   | mixed            | NON_UNIFORM | none, members listed       |
//!
//! A reading is positive iff its lead content is at least 1.0 mg/cm².

use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::{
    Classification, ClassificationOutcome, ClassificationResult, ExcludedReading,
    NormalizedReading, ReadingRef, ReadingResult,
};

/// Positivity threshold in mg/cm²
pub const POSITIVE_THRESHOLD_MG_CM2: f64 = 1.0;

/// Minimum group size for the AVERAGE category
pub const AVERAGE_MIN_READINGS: usize = 40;

/// AVERAGE groups are positive when p/n exceeds 1/40 (2.5 %); compared in
/// integers as `p * 40 > n`
const AVERAGE_POSITIVE_DENOMINATOR: usize = 40;

/// Classifier input errors
#[derive(Debug, Error, PartialEq)]
pub enum ClassificationError {
    #[error("Reading {reading_id} has invalid lead content {value}")]
    InvalidLeadContent { reading_id: String, value: f64 },
}

/// Whether a lead content reading counts as positive
pub fn is_positive(lead_content: f64) -> bool {
    lead_content >= POSITIVE_THRESHOLD_MG_CM2
}

type GroupKey = (String, Option<String>);

/// Stateless classifier
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadingClassifier;

impl ReadingClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Reject the first reading whose lead content is negative or not finite
    pub fn validate(&self, readings: &[NormalizedReading]) -> Result<(), ClassificationError> {
        readings
            .iter()
            .try_for_each(|r| check_lead_content(r.id(), r.lead_content()))
    }

    /// Classify every (component, substrate) group
    ///
    /// Readings with an empty component are skipped. Readings with unusable
    /// lead content are reported in [`Classification::excluded`] and do not
    /// count towards any group.
    pub fn classify(&self, readings: &[NormalizedReading]) -> Classification {
        let mut groups: BTreeMap<GroupKey, Vec<&NormalizedReading>> = BTreeMap::new();
        let mut excluded = Vec::new();
        let mut skipped_without_component = 0usize;

        for reading in readings {
            if let Some(reason) = invalid_reason(reading.lead_content()) {
                warn!(
                    reading_id = %reading.id(),
                    lead_content = reading.lead_content(),
                    reason,
                    "Excluding reading from classification"
                );
                excluded.push(ExcludedReading {
                    reading_id: reading.id().to_string(),
                    lead_content: reading.lead_content(),
                    reason: reason.to_string(),
                });
                continue;
            }

            let component = reading.normalized_component.trim();
            if component.is_empty() {
                skipped_without_component += 1;
                continue;
            }

            let substrate = reading
                .normalized_substrate
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string);

            groups
                .entry((component.to_string(), substrate))
                .or_default()
                .push(reading);
        }

        if skipped_without_component > 0 {
            debug!(skipped_without_component, "Readings without a component were not grouped");
        }

        let results = groups
            .into_iter()
            .map(|((component, substrate), members)| classify_group(component, substrate, &members))
            .collect();

        excluded.sort_by(|a, b| a.reading_id.cmp(&b.reading_id));

        Classification { results, excluded }
    }
}

/// Lead content must be a finite, non-negative number
pub fn check_lead_content(reading_id: &str, value: f64) -> Result<(), ClassificationError> {
    match invalid_reason(value) {
        Some(_) => Err(ClassificationError::InvalidLeadContent {
            reading_id: reading_id.to_string(),
            value,
        }),
        None => Ok(()),
    }
}

fn invalid_reason(value: f64) -> Option<&'static str> {
    if !value.is_finite() {
        Some("lead content is not a finite number")
    } else if value < 0.0 {
        Some("lead content is negative")
    } else {
        None
    }
}

fn classify_group(
    component: String,
    substrate: Option<String>,
    members: &[&NormalizedReading],
) -> ClassificationResult {
    let total_count = members.len();
    let positive_count = members
        .iter()
        .filter(|r| is_positive(r.lead_content()))
        .count();
    let percent_positive = if total_count == 0 {
        0.0
    } else {
        positive_count as f64 / total_count as f64 * 100.0
    };

    let outcome = if total_count >= AVERAGE_MIN_READINGS {
        let positive = positive_count * AVERAGE_POSITIVE_DENOMINATOR > total_count;
        ClassificationOutcome::Average {
            result: result_of(positive),
        }
    } else if positive_count == 0 || positive_count == total_count {
        ClassificationOutcome::Uniform {
            result: result_of(positive_count == total_count),
        }
    } else {
        let mut readings: Vec<ReadingRef> = members
            .iter()
            .map(|r| ReadingRef {
                reading_id: r.id().to_string(),
                lead_content: r.lead_content(),
                positive: is_positive(r.lead_content()),
            })
            .collect();
        // Input order must not leak into the report
        readings.sort_by(|a, b| {
            a.reading_id
                .cmp(&b.reading_id)
                .then_with(|| a.lead_content.total_cmp(&b.lead_content))
        });
        ClassificationOutcome::NonUniform { readings }
    };

    ClassificationResult {
        component,
        substrate,
        total_count,
        positive_count,
        percent_positive,
        outcome,
    }
}

fn result_of(positive: bool) -> ReadingResult {
    if positive {
        ReadingResult::Positive
    } else {
        ReadingResult::Negative
    }
}
