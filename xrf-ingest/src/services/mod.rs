//! Business logic services for xrf-ingest

pub mod grouping_client;
pub mod inspection_pipeline;
pub mod name_normalizer;
pub mod reading_classifier;
pub mod response_parser;
pub mod summary_aggregator;

pub use grouping_client::{
    ChatCompletionsTransport, GroupingError, GroupingErrorKind, GroupingTransport, NameGroup,
    RetryPolicy, SemanticGroupingClient,
};
pub use inspection_pipeline::{
    load_readings, InspectionPipeline, InspectionReport, RunNormalizations,
};
pub use name_normalizer::{apply_normalizations, NameNormalizer, ProgressCallback};
pub use reading_classifier::{
    check_lead_content, is_positive, ClassificationError, ReadingClassifier,
};
pub use summary_aggregator::{summarize, SummaryReport, SummaryTotals};
