//! Summary aggregation
//!
//! Orders classification results by (component, substrate) and tallies totals
//! for reporting. Pure: the same classification always yields the same
//! report, so reruns over one dataset diff cleanly.

use serde::{Deserialize, Serialize};

use crate::models::{
    Classification, ClassificationOutcome, ClassificationResult, ExcludedReading, ReadingResult,
};

/// Counts across all groups of a report
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryTotals {
    pub groups: usize,
    pub readings_classified: usize,
    pub average_positive: usize,
    pub average_negative: usize,
    pub uniform_positive: usize,
    pub uniform_negative: usize,
    pub non_uniform: usize,
    /// Member readings of NON_UNIFORM groups
    pub readings_for_review: usize,
    pub excluded_readings: usize,
}

/// Ordered report structure handed to renderers and exporters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryReport {
    pub records: Vec<ClassificationResult>,
    pub totals: SummaryTotals,
    pub excluded: Vec<ExcludedReading>,
}

impl SummaryReport {
    /// Groups classified POSITIVE (AVERAGE or UNIFORM)
    pub fn positive_records(&self) -> impl Iterator<Item = &ClassificationResult> {
        self.records
            .iter()
            .filter(|r| r.result() == Some(ReadingResult::Positive))
    }
}

/// Build the ordered report
///
/// Absent substrates sort before present ones within a component.
pub fn summarize(classification: Classification) -> SummaryReport {
    let Classification {
        mut results,
        mut excluded,
    } = classification;

    results.sort_by(|a, b| {
        a.component
            .cmp(&b.component)
            .then_with(|| a.substrate.cmp(&b.substrate))
    });
    excluded.sort_by(|a, b| a.reading_id.cmp(&b.reading_id));

    let mut totals = SummaryTotals {
        groups: results.len(),
        excluded_readings: excluded.len(),
        ..SummaryTotals::default()
    };

    for result in &results {
        totals.readings_classified += result.total_count;
        match &result.outcome {
            ClassificationOutcome::Average { result } => match result {
                ReadingResult::Positive => totals.average_positive += 1,
                ReadingResult::Negative => totals.average_negative += 1,
            },
            ClassificationOutcome::Uniform { result } => match result {
                ReadingResult::Positive => totals.uniform_positive += 1,
                ReadingResult::Negative => totals.uniform_negative += 1,
            },
            ClassificationOutcome::NonUniform { readings } => {
                totals.non_uniform += 1;
                totals.readings_for_review += readings.len();
            }
        }
    }

    SummaryReport {
        records: results,
        totals,
        excluded,
    }
}
