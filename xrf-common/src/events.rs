//! Ingest event types and broadcast bus
//!
//! Progress of a normalization run is reported in four stages. Callers can
//! receive them through a direct callback, through the [`EventBus`], or both.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Scope of a name normalization run
///
/// Component and substrate names are normalized and cached independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NormalizationDomain {
    Component,
    Substrate,
}

impl NormalizationDomain {
    pub fn as_str(&self) -> &'static str {
        match self {
            NormalizationDomain::Component => "component",
            NormalizationDomain::Substrate => "substrate",
        }
    }

    pub fn all() -> [NormalizationDomain; 2] {
        [NormalizationDomain::Component, NormalizationDomain::Substrate]
    }
}

impl fmt::Display for NormalizationDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stage of a normalization run, in emission order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NormalizationStage {
    CheckingCache,
    CallingAi,
    SavingCache,
    Complete,
}

impl NormalizationStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            NormalizationStage::CheckingCache => "checking-cache",
            NormalizationStage::CallingAi => "calling-ai",
            NormalizationStage::SavingCache => "saving-cache",
            NormalizationStage::Complete => "complete",
        }
    }
}

impl fmt::Display for NormalizationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot reported at each stage of a normalization run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationProgress {
    pub domain: NormalizationDomain,
    pub stage: NormalizationStage,
    /// Names resolved so far
    pub processed: usize,
    /// Distinct names in the run
    pub total: usize,
}

/// Events broadcast by the ingest pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum IngestEvent {
    /// A normalization run reached a new stage
    NormalizationProgress {
        run_id: Uuid,
        progress: NormalizationProgress,
        timestamp: DateTime<Utc>,
    },

    /// Classification finished for a run
    ClassificationCompleted {
        run_id: Uuid,
        groups: usize,
        excluded: usize,
        timestamp: DateTime<Utc>,
    },
}

/// Broadcast bus for [`IngestEvent`]s
///
/// Cloning shares the underlying channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<IngestEvent>,
}

impl EventBus {
    /// Creates a new EventBus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<IngestEvent> {
        self.tx.subscribe()
    }

    /// Emit an event
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: IngestEvent,
    ) -> Result<usize, broadcast::error::SendError<IngestEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: IngestEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
