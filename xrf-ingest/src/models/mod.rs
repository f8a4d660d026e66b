//! Data models for the ingest pipeline

pub mod classification;
pub mod normalization;
pub mod reading;

pub use classification::{
    Classification, ClassificationCategory, ClassificationOutcome, ClassificationResult,
    ExcludedReading, ReadingRef, ReadingResult,
};
pub use normalization::{
    clamp_confidence, name_key, title_case, NormalizationMap, NormalizationRecord,
    NormalizationSource,
};
pub use reading::{NormalizedReading, RawReading};
