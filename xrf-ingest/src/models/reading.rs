//! Inspection readings before and after name normalization

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single XRF reading as delivered by the reading source
///
/// Location and identity columns other than `id` are carried through
/// untouched in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawReading {
    /// Reading identifier used in reports
    pub id: String,

    /// Component name as entered (e.g. "Door Jamb", "dr jamb")
    #[serde(default)]
    pub component: String,

    /// Substrate name as entered, if recorded
    #[serde(default)]
    pub substrate: Option<String>,

    /// Lead content in mg/cm²
    #[serde(alias = "leadContent")]
    pub lead_content: f64,

    /// Remaining columns, opaque to the pipeline
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RawReading {
    pub fn new(
        id: impl Into<String>,
        component: impl Into<String>,
        substrate: Option<&str>,
        lead_content: f64,
    ) -> Self {
        Self {
            id: id.into(),
            component: component.into(),
            substrate: substrate.map(str::to_string),
            lead_content,
            extra: Map::new(),
        }
    }

    /// Substrate with whitespace-only values treated as absent
    pub fn substrate_name(&self) -> Option<&str> {
        self.substrate
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// A reading with canonical component and substrate names
///
/// Built fresh per run; the source reading is never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedReading {
    #[serde(flatten)]
    pub raw: RawReading,

    /// Canonical component name (empty when the raw component was empty)
    pub normalized_component: String,

    /// Canonical substrate name, absent when the raw substrate was absent
    pub normalized_substrate: Option<String>,
}

impl NormalizedReading {
    pub fn id(&self) -> &str {
        &self.raw.id
    }

    pub fn lead_content(&self) -> f64 {
        self.raw.lead_content
    }
}
