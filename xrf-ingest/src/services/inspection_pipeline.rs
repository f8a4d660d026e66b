//! Inspection pipeline
//!
//! raw readings → component + substrate normalization → classification →
//! ordered summary. One normalizer per domain; both share the cache and the
//! grouping client, so their provider calls are serialized by the client's
//! rate limiter.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use xrf_common::events::{EventBus, IngestEvent, NormalizationDomain, NormalizationProgress};

use super::grouping_client::SemanticGroupingClient;
use super::name_normalizer::{apply_normalizations, NameNormalizer};
use super::reading_classifier::{check_lead_content, ReadingClassifier};
use super::summary_aggregator::{summarize, SummaryReport};
use crate::db::normalization_cache::NormalizationCache;
use crate::error::{IngestError, IngestResult};
use crate::models::{NormalizationMap, NormalizationRecord, RawReading};

/// Normalizations produced during one run, per domain
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunNormalizations {
    pub component: Vec<NormalizationRecord>,
    pub substrate: Vec<NormalizationRecord>,
}

/// Full output of one pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InspectionReport {
    pub run_id: Uuid,
    pub summary: SummaryReport,
    pub normalizations: RunNormalizations,
}

/// Composes the normalizers, classifier and aggregator
pub struct InspectionPipeline {
    component_normalizer: NameNormalizer,
    substrate_normalizer: NameNormalizer,
    classifier: ReadingClassifier,
    event_bus: Option<EventBus>,
}

impl InspectionPipeline {
    pub fn new(
        cache: Arc<dyn NormalizationCache>,
        grouping: Option<SemanticGroupingClient>,
    ) -> Self {
        Self {
            component_normalizer: NameNormalizer::new(
                NormalizationDomain::Component,
                cache.clone(),
                grouping.clone(),
            ),
            substrate_normalizer: NameNormalizer::new(
                NormalizationDomain::Substrate,
                cache,
                grouping,
            ),
            classifier: ReadingClassifier::new(),
            event_bus: None,
        }
    }

    /// Broadcast progress and completion events on `bus`
    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Like [`run`](Self::run), but rejects the input before any name is
    /// normalized if a reading carries negative or non-finite lead content
    pub async fn run_strict(&self, readings: &[RawReading]) -> IngestResult<InspectionReport> {
        for reading in readings {
            check_lead_content(&reading.id, reading.lead_content)?;
        }
        Ok(self.run(readings).await)
    }

    /// Run the pipeline over `readings`
    ///
    /// Never fails: provider and cache problems degrade to fallback names,
    /// unusable readings are listed in the summary's `excluded`.
    pub async fn run(&self, readings: &[RawReading]) -> InspectionReport {
        let run_id = Uuid::new_v4();
        info!(%run_id, readings = readings.len(), "Starting inspection pipeline run");

        let bus = self.event_bus.clone();
        let on_progress = move |progress: &NormalizationProgress| {
            tracing::debug!(
                %run_id,
                domain = %progress.domain,
                stage = %progress.stage,
                processed = progress.processed,
                total = progress.total,
                "Normalization progress"
            );
            if let Some(bus) = &bus {
                bus.emit_lossy(IngestEvent::NormalizationProgress {
                    run_id,
                    progress: progress.clone(),
                    timestamp: Utc::now(),
                });
            }
        };

        let component_names: Vec<&str> = readings.iter().map(|r| r.component.as_str()).collect();
        let substrate_names: Vec<&str> =
            readings.iter().filter_map(|r| r.substrate_name()).collect();

        let component_records = self
            .component_normalizer
            .normalize(component_names.as_slice(), Some(&on_progress))
            .await;
        let substrate_records = self
            .substrate_normalizer
            .normalize(substrate_names.as_slice(), Some(&on_progress))
            .await;

        let components = NormalizationMap::from_records(component_records.iter().cloned());
        let substrates = NormalizationMap::from_records(substrate_records.iter().cloned());
        let normalized = apply_normalizations(readings, &components, &substrates);

        let classification = self.classifier.classify(&normalized);
        let groups = classification.results.len();
        let excluded = classification.excluded.len();

        if let Some(bus) = &self.event_bus {
            bus.emit_lossy(IngestEvent::ClassificationCompleted {
                run_id,
                groups,
                excluded,
                timestamp: Utc::now(),
            });
        }

        let summary = summarize(classification);

        info!(
            %run_id,
            groups,
            excluded,
            positive_groups = summary.positive_records().count(),
            review_groups = summary.totals.non_uniform,
            "Inspection pipeline run complete"
        );

        InspectionReport {
            run_id,
            summary,
            normalizations: RunNormalizations {
                component: component_records,
                substrate: substrate_records,
            },
        }
    }
}

/// Read a JSON array of readings from `path`
pub fn load_readings(path: &Path) -> IngestResult<Vec<RawReading>> {
    let content = std::fs::read_to_string(path).map_err(|source| IngestError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| IngestError::Decode {
        path: path.to_path_buf(),
        source,
    })
}
