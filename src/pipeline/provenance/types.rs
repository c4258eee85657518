use std::collections::BTreeMap;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use super::ProvenanceError;

/// Free-form key/value data attached to a fragment.
pub type Attributes = BTreeMap<String, serde_json::Value>;

/// Well-known fragment types emitted by the digitization pipeline.
pub mod fragment_types {
    pub const OCR: &str = "ocr";
    pub const DWC_EXTRACTION: &str = "dwc_extraction";
    pub const QC_VALIDATION: &str = "qc_validation";
}

// ──────────────────────────────────────────────
// Fragment
// ──────────────────────────────────────────────

/// One immutable record of a pipeline step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceFragment {
    pub fragment_id: String,
    pub fragment_type: String,
    pub source: FragmentSource,
    pub output: FragmentOutput,
    pub process: FragmentProcess,
    /// ISO-8601. Ordering checks compare these strings lexicographically.
    pub timestamp: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub metadata: Attributes,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FragmentSource {
    pub identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_fragment_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FragmentOutput {
    pub identifier: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub quality_metrics: Attributes,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FragmentProcess {
    pub operation: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub parameters: Attributes,
}

impl ProvenanceFragment {
    /// The fragment this one was derived from. An empty id counts as none.
    pub fn parent_id(&self) -> Option<&str> {
        self.source
            .previous_fragment_id
            .as_deref()
            .filter(|id| !id.is_empty())
    }

    /// True when either identifier contains `needle`.
    pub fn references(&self, needle: &str) -> bool {
        self.source.identifier.contains(needle) || self.output.identifier.contains(needle)
    }

    /// Checks the serde shape cannot express.
    pub fn validate(&self) -> Result<(), ProvenanceError> {
        if self.fragment_id.trim().is_empty() {
            return Err(ProvenanceError::InvalidFragment(
                "fragment_id must not be empty".into(),
            ));
        }
        if self.timestamp.trim().is_empty() {
            return Err(ProvenanceError::InvalidFragment(format!(
                "fragment {} has an empty timestamp",
                self.fragment_id
            )));
        }
        Ok(())
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ──────────────────────────────────────────────
// Builder
// ──────────────────────────────────────────────

/// Assembles a fragment when a pipeline step completes.
///
/// Id defaults to a fresh UUID v4 and timestamp to now (UTC, RFC 3339 with
/// microseconds and a `Z` suffix) so that string order matches time order.
#[derive(Debug, Clone)]
pub struct FragmentBuilder {
    fragment_id: Option<String>,
    fragment_type: String,
    operation: String,
    source_identifier: String,
    previous_fragment_id: Option<String>,
    output_identifier: String,
    quality_metrics: Attributes,
    parameters: Attributes,
    metadata: Attributes,
    timestamp: Option<String>,
}

impl FragmentBuilder {
    pub fn new(fragment_type: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            fragment_id: None,
            fragment_type: fragment_type.into(),
            operation: operation.into(),
            source_identifier: String::new(),
            previous_fragment_id: None,
            output_identifier: String::new(),
            quality_metrics: Attributes::new(),
            parameters: Attributes::new(),
            metadata: Attributes::new(),
            timestamp: None,
        }
    }

    pub fn fragment_id(mut self, id: impl Into<String>) -> Self {
        self.fragment_id = Some(id.into());
        self
    }

    pub fn source(mut self, identifier: impl Into<String>) -> Self {
        self.source_identifier = identifier.into();
        self
    }

    /// Derive from an earlier fragment.
    pub fn derived_from(mut self, previous_fragment_id: impl Into<String>) -> Self {
        self.previous_fragment_id = Some(previous_fragment_id.into());
        self
    }

    pub fn output(mut self, identifier: impl Into<String>) -> Self {
        self.output_identifier = identifier.into();
        self
    }

    pub fn quality_metric(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.quality_metrics.insert(key.into(), value.into());
        self
    }

    pub fn parameter(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    pub fn build(self) -> ProvenanceFragment {
        ProvenanceFragment {
            fragment_id: self
                .fragment_id
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            fragment_type: self.fragment_type,
            source: FragmentSource {
                identifier: self.source_identifier,
                previous_fragment_id: self.previous_fragment_id,
            },
            output: FragmentOutput {
                identifier: self.output_identifier,
                quality_metrics: self.quality_metrics,
            },
            process: FragmentProcess {
                operation: self.operation,
                parameters: self.parameters,
            },
            timestamp: self
                .timestamp
                .unwrap_or_else(|| Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)),
            metadata: self.metadata,
        }
    }
}
