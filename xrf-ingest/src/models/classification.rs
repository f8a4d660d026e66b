//! Classification results for component/substrate groups

use serde::{Deserialize, Serialize};

/// Regulatory classification category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClassificationCategory {
    /// 40 or more readings, judged on the positive fraction
    Average,
    /// Fewer than 40 readings, all positive or all negative
    Uniform,
    /// Fewer than 40 readings with mixed results
    NonUniform,
}

/// Aggregate result of an AVERAGE or UNIFORM group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReadingResult {
    Positive,
    Negative,
}

/// Reference to a member reading of a NON_UNIFORM group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingRef {
    pub reading_id: String,
    pub lead_content: f64,
    pub positive: bool,
}

/// Category-specific part of a classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClassificationOutcome {
    Average { result: ReadingResult },
    Uniform { result: ReadingResult },
    /// No aggregate result; every member needs individual review
    NonUniform { readings: Vec<ReadingRef> },
}

/// Classification of one (component, substrate) group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub component: String,
    pub substrate: Option<String>,
    pub total_count: usize,
    pub positive_count: usize,
    /// Positive share in percent (0-100)
    pub percent_positive: f64,
    #[serde(flatten)]
    pub outcome: ClassificationOutcome,
}

impl ClassificationResult {
    pub fn category(&self) -> ClassificationCategory {
        match self.outcome {
            ClassificationOutcome::Average { .. } => ClassificationCategory::Average,
            ClassificationOutcome::Uniform { .. } => ClassificationCategory::Uniform,
            ClassificationOutcome::NonUniform { .. } => ClassificationCategory::NonUniform,
        }
    }

    /// Aggregate result; `None` for NON_UNIFORM groups
    pub fn result(&self) -> Option<ReadingResult> {
        match self.outcome {
            ClassificationOutcome::Average { result }
            | ClassificationOutcome::Uniform { result } => Some(result),
            ClassificationOutcome::NonUniform { .. } => None,
        }
    }

    /// Member readings listed for individual review (NON_UNIFORM only)
    pub fn review_readings(&self) -> &[ReadingRef] {
        match &self.outcome {
            ClassificationOutcome::NonUniform { readings } => readings,
            _ => &[],
        }
    }
}

/// Reading left out of classification because its lead content is unusable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExcludedReading {
    pub reading_id: String,
    pub lead_content: f64,
    pub reason: String,
}

/// Output of one classification pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub results: Vec<ClassificationResult>,
    pub excluded: Vec<ExcludedReading>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_serializes_with_category_tag() {
        let result = ClassificationResult {
            component: "Door Jamb".to_string(),
            substrate: Some("Wood".to_string()),
            total_count: 10,
            positive_count: 0,
            percent_positive: 0.0,
            outcome: ClassificationOutcome::Uniform {
                result: ReadingResult::Negative,
            },
        };

        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["category"], "UNIFORM");
        assert_eq!(value["result"], "NEGATIVE");
        assert_eq!(value["total_count"], 10);
    }

    #[test]
    fn test_non_uniform_has_no_result() {
        let result = ClassificationResult {
            component: "Wall".to_string(),
            substrate: None,
            total_count: 2,
            positive_count: 1,
            percent_positive: 50.0,
            outcome: ClassificationOutcome::NonUniform {
                readings: vec![
                    ReadingRef { reading_id: "1".into(), lead_content: 1.4, positive: true },
                    ReadingRef { reading_id: "2".into(), lead_content: 0.2, positive: false },
                ],
            },
        };

        assert_eq!(result.category(), ClassificationCategory::NonUniform);
        assert_eq!(result.result(), None);
        assert_eq!(result.review_readings().len(), 2);
    }
}
