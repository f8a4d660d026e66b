//! Name normalizer
//!
//! Collapses inconsistently entered names (component or substrate) onto
//! canonical labels. Resolution order for each distinct name:
//! 1. Persistent cache (CACHE)
//! 2. Semantic grouping provider, one batch for all cache misses (AI)
//! 3. Title-cased original (FALLBACK)
//!
//! Provider and cache failures never fail a run. They are logged with their
//! error kind and the affected names degrade to FALLBACK records.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};
use xrf_common::events::{NormalizationDomain, NormalizationProgress, NormalizationStage};

use super::grouping_client::{NameGroup, SemanticGroupingClient};
use crate::db::normalization_cache::NormalizationCache;
use crate::models::{
    name_key, NormalizationMap, NormalizationRecord, NormalizationSource, NormalizedReading,
    RawReading,
};

/// Confidence of FALLBACK records when the provider call failed
pub const FALLBACK_CONFIDENCE_ON_FAILURE: f32 = 0.5;

/// Confidence of FALLBACK records the provider left out of a successful reply
pub const FALLBACK_CONFIDENCE_ON_OMISSION: f32 = 1.0;

/// Progress callback invoked at each stage
pub type ProgressCallback<'a> = &'a (dyn Fn(&NormalizationProgress) + Send + Sync);

const COMPONENT_INSTRUCTIONS: &str = "You normalize building component names recorded during \
lead-based paint XRF inspections. Names were typed by inspectors or exported by devices and \
contain abbreviations, misspellings, plurals and inconsistent casing (for example \"dr jamb\", \
\"Door Jamb\", \"door jambs\"). Group names that refer to the same building component. For each \
group choose a clear, title-cased canonical name. Respond with JSON only, in the form \
{\"groups\":[{\"canonical\":\"Door Jamb\",\"variants\":[\"dr jamb\",\"door jamb\"],\"confidence\":0.95}]}. \
Copy variants exactly as given. Every input name must appear in exactly one group. Confidence \
is a number between 0 and 1.";

const SUBSTRATE_INSTRUCTIONS: &str = "You normalize substrate names recorded during lead-based \
paint XRF inspections (for example wood, metal, drywall, plaster, concrete, brick). Names contain \
abbreviations, misspellings and inconsistent casing (for example \"wd\", \"Wood\", \"drywal\"). \
Group names that refer to the same substrate material. For each group choose a clear, \
title-cased canonical name. Respond with JSON only, in the form \
{\"groups\":[{\"canonical\":\"Wood\",\"variants\":[\"wd\",\"wood\"],\"confidence\":0.95}]}. \
Copy variants exactly as given. Every input name must appear in exactly one group. Confidence \
is a number between 0 and 1.";

/// System instructions sent to the grouping provider for `domain`
pub fn system_instructions(domain: NormalizationDomain) -> &'static str {
    match domain {
        NormalizationDomain::Component => COMPONENT_INSTRUCTIONS,
        NormalizationDomain::Substrate => SUBSTRATE_INSTRUCTIONS,
    }
}

/// Normalizer for one domain
///
/// `grouping` is `None` when AI grouping is disabled; every cache miss then
/// becomes a FALLBACK record.
#[derive(Clone)]
pub struct NameNormalizer {
    domain: NormalizationDomain,
    cache: Arc<dyn NormalizationCache>,
    grouping: Option<SemanticGroupingClient>,
}

impl NameNormalizer {
    pub fn new(
        domain: NormalizationDomain,
        cache: Arc<dyn NormalizationCache>,
        grouping: Option<SemanticGroupingClient>,
    ) -> Self {
        Self {
            domain,
            cache,
            grouping,
        }
    }

    /// Normalize `names`, returning exactly one record per distinct
    /// lower-cased, trimmed, non-empty name, ordered by original name
    pub async fn normalize<S: AsRef<str>>(
        &self,
        names: &[S],
        on_progress: Option<ProgressCallback<'_>>,
    ) -> Vec<NormalizationRecord> {
        let unique: BTreeSet<String> = names
            .iter()
            .map(|n| name_key(n.as_ref()))
            .filter(|k| !k.is_empty())
            .collect();

        if unique.is_empty() {
            return Vec::new();
        }

        let total = unique.len();
        let report = |stage: NormalizationStage, processed: usize| {
            if let Some(callback) = on_progress {
                callback(&NormalizationProgress {
                    domain: self.domain,
                    stage,
                    processed,
                    total,
                });
            }
        };

        let mut resolved: BTreeMap<String, NormalizationRecord> = BTreeMap::new();

        // Stage 1: cache
        report(NormalizationStage::CheckingCache, 0);
        match self.cache.lookup(self.domain, &unique).await {
            Ok(hits) => {
                for name in &unique {
                    if let Some(cached) = hits.get(name) {
                        resolved.insert(
                            name.clone(),
                            NormalizationRecord {
                                original_name: name.clone(),
                                normalized_name: cached.canonical_name.clone(),
                                confidence: cached.confidence,
                                source: NormalizationSource::Cache,
                            },
                        );
                    }
                }
            }
            Err(e) => {
                warn!(
                    domain = %self.domain,
                    error_kind = "cache-lookup",
                    error = %e,
                    "Normalization cache lookup failed, treating all names as misses"
                );
            }
        }

        let misses: Vec<String> = unique
            .iter()
            .filter(|name| !resolved.contains_key(*name))
            .cloned()
            .collect();

        debug!(
            domain = %self.domain,
            total,
            cache_hits = resolved.len(),
            misses = misses.len(),
            "Normalization cache checked"
        );

        if !misses.is_empty() {
            // Stage 2: grouping provider
            report(NormalizationStage::CallingAi, resolved.len());
            let fresh = self.resolve_misses(&misses).await;

            // Stage 3: persist AI and FALLBACK records
            report(NormalizationStage::SavingCache, total);
            match self.cache.persist(self.domain, &fresh).await {
                Ok(written) => {
                    debug!(domain = %self.domain, written, "Persisted new normalizations");
                }
                Err(e) => {
                    warn!(
                        domain = %self.domain,
                        error_kind = "cache-persist",
                        error = %e,
                        "Failed to persist normalizations; this run's results are unaffected"
                    );
                }
            }

            for record in fresh {
                resolved.insert(record.original_name.clone(), record);
            }
        }

        report(NormalizationStage::Complete, total);

        let records: Vec<NormalizationRecord> = resolved.into_values().collect();
        log_summary(self.domain, &records);
        records
    }

    /// AI or FALLBACK record for every miss
    async fn resolve_misses(&self, misses: &[String]) -> Vec<NormalizationRecord> {
        let Some(client) = &self.grouping else {
            debug!(
                domain = %self.domain,
                names = misses.len(),
                "Semantic grouping disabled, using fallback names"
            );
            return fallback_records(misses, FALLBACK_CONFIDENCE_ON_FAILURE);
        };

        match client.group(system_instructions(self.domain), misses).await {
            Ok(groups) => claim_variants(misses, &groups),
            Err(e) => {
                warn!(
                    domain = %self.domain,
                    error_kind = e.kind().as_str(),
                    error = %e,
                    names = misses.len(),
                    "Semantic grouping failed, using fallback names"
                );
                fallback_records(misses, FALLBACK_CONFIDENCE_ON_FAILURE)
            }
        }
    }
}

/// Assign provider groups to miss names; first claiming group wins
///
/// Names no group claims fall back with [`FALLBACK_CONFIDENCE_ON_OMISSION`].
fn claim_variants(misses: &[String], groups: &[NameGroup]) -> Vec<NormalizationRecord> {
    let pending: HashSet<&str> = misses.iter().map(String::as_str).collect();
    let mut claimed: BTreeMap<String, NormalizationRecord> = BTreeMap::new();

    for group in groups {
        for variant in &group.variants {
            let key = name_key(variant);
            if !pending.contains(key.as_str()) || claimed.contains_key(&key) {
                continue;
            }
            claimed.insert(
                key.clone(),
                NormalizationRecord::new(
                    key,
                    group.canonical.clone(),
                    group.confidence,
                    NormalizationSource::Ai,
                ),
            );
        }
    }

    let omitted = misses.len() - claimed.len();
    if omitted > 0 {
        debug!(omitted, "Grouping reply omitted names, using fallback names for them");
    }

    misses
        .iter()
        .map(|name| {
            claimed.remove(name).unwrap_or_else(|| {
                NormalizationRecord::fallback(name, FALLBACK_CONFIDENCE_ON_OMISSION)
            })
        })
        .collect()
}

fn fallback_records(names: &[String], confidence: f32) -> Vec<NormalizationRecord> {
    names
        .iter()
        .map(|name| NormalizationRecord::fallback(name, confidence))
        .collect()
}

fn log_summary(domain: NormalizationDomain, records: &[NormalizationRecord]) {
    let count = |source| records.iter().filter(|r| r.source == source).count();
    info!(
        domain = %domain,
        names = records.len(),
        cache = count(NormalizationSource::Cache),
        ai = count(NormalizationSource::Ai),
        fallback = count(NormalizationSource::Fallback),
        "Normalization complete"
    );
}

/// Substitute canonical names into readings
///
/// Empty components stay empty; absent or blank substrates stay absent.
pub fn apply_normalizations(
    readings: &[RawReading],
    components: &NormalizationMap,
    substrates: &NormalizationMap,
) -> Vec<NormalizedReading> {
    readings
        .iter()
        .map(|reading| NormalizedReading {
            raw: reading.clone(),
            normalized_component: components.canonical(&reading.component).unwrap_or_default(),
            normalized_substrate: reading
                .substrate_name()
                .and_then(|s| substrates.canonical(s)),
        })
        .collect()
}
