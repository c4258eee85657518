use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::CapabilityError;
use crate::config;
use crate::pipeline::provenance::{fragment_types, FragmentBuilder, ProvenanceFragment};

/// Default confidence below which a field is re-extracted by the premium tier.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.70;

// ──────────────────────────────────────────────
// Field results
// ──────────────────────────────────────────────

/// One extracted field: the value and the backend's confidence in it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldResult {
    #[serde(default)]
    pub value: String,
    /// 0.0-1.0. Missing in a backend response means 0.0.
    #[serde(default)]
    pub confidence: f32,
}

impl FieldResult {
    pub fn new(value: impl Into<String>, confidence: f32) -> Self {
        Self {
            value: value.into(),
            confidence: clamp_confidence(confidence),
        }
    }
}

/// Field name → result. Ordered so logs and reports are deterministic.
pub type FieldResults = BTreeMap<String, FieldResult>;

/// Clamp a backend confidence into [0, 1]. NaN becomes 0.0.
pub fn clamp_confidence(confidence: f32) -> f32 {
    if confidence.is_nan() {
        0.0
    } else {
        confidence.clamp(0.0, 1.0)
    }
}

/// Parse a backend's JSON response into field results.
///
/// Accepts `{"field": {"value": "...", "confidence": 0.9}}`, optionally wrapped
/// in a markdown code fence. Confidence is clamped; a missing one is 0.0.
pub fn parse_field_results(raw: &str) -> Result<FieldResults, CapabilityError> {
    let json = strip_code_fence(raw);
    if json.is_empty() {
        return Ok(FieldResults::new());
    }

    let parsed: FieldResults = serde_json::from_str(json)
        .map_err(|e| CapabilityError::MalformedResponse(e.to_string()))?;

    Ok(parsed
        .into_iter()
        .map(|(name, field)| {
            let confidence = clamp_confidence(field.confidence);
            (name, FieldResult { value: field.value, confidence })
        })
        .collect())
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop an optional language tag on the opening fence line.
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    body.trim_end().trim_end_matches("```").trim()
}

// ──────────────────────────────────────────────
// Capability boundary
// ──────────────────────────────────────────────

/// Which backend handled a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionTier {
    /// Cheap/fast backend run over every field.
    Base,
    /// Expensive/accurate backend run only on uncertain fields.
    Premium,
}

impl ExtractionTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Base => "base",
            Self::Premium => "premium",
        }
    }
}

/// A single call into an extraction backend.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionRequest {
    pub image_ref: String,
    pub tier: ExtractionTier,
    /// Replaces the backend's default instruction when set.
    pub instruction: Option<String>,
    /// Restricts extraction to these field names. `None` = backend's full set.
    pub fields: Option<Vec<String>>,
}

/// An OCR/vision/LLM backend that turns a specimen image into field values.
///
/// Implementations own their own timeouts and retries.
pub trait ExtractionCapability: Send + Sync {
    /// Backend identifier used in logs (e.g. model name).
    fn name(&self) -> &str;

    fn extract(&self, request: &ExtractionRequest) -> Result<FieldResults, CapabilityError>;
}

// ──────────────────────────────────────────────
// Configuration
// ──────────────────────────────────────────────

/// Caller-supplied adjustments for one extraction.
#[derive(Debug, Clone, Default)]
pub struct ExtractionOverrides {
    /// Instruction for the base call instead of the backend default.
    pub instruction: Option<String>,
    /// Narrow the base call to these fields.
    pub fields: Option<Vec<String>>,
}

/// Routing behavior for a `ConfidenceRouter`. Build through `new` or
/// `from_env` so the threshold is always clamped to [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutingConfig {
    /// Fields strictly below this confidence go to the premium tier.
    pub confidence_threshold: f32,
    /// When false, the base result is returned as-is.
    pub enabled: bool,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            enabled: true,
        }
    }
}

impl RoutingConfig {
    pub fn new(confidence_threshold: f32, enabled: bool) -> Self {
        Self {
            confidence_threshold: clamp_confidence(confidence_threshold),
            enabled,
        }
    }

    /// Defaults overlaid with `SPECIMEN_TRACE_CONFIDENCE_THRESHOLD` and
    /// `SPECIMEN_TRACE_ROUTING_ENABLED`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self::new(
            config::env_f32(config::ENV_CONFIDENCE_THRESHOLD)
                .unwrap_or(defaults.confidence_threshold),
            config::env_flag(config::ENV_ROUTING_ENABLED).unwrap_or(defaults.enabled),
        )
    }
}

// ──────────────────────────────────────────────
// Results & statistics
// ──────────────────────────────────────────────

/// Outcome of one routed extraction.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RoutedExtraction {
    pub fields: FieldResults,
    /// Fields that fell below the threshold after the base pass.
    pub low_confidence: Vec<String>,
    /// Fields whose value was replaced by a better premium result.
    pub improved: Vec<String>,
    pub premium_invoked: bool,
}

impl RoutedExtraction {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Field name → value.
    pub fn values(&self) -> BTreeMap<String, String> {
        self.fields
            .iter()
            .map(|(name, f)| (name.clone(), f.value.clone()))
            .collect()
    }

    /// Field name → confidence.
    pub fn confidences(&self) -> BTreeMap<String, f32> {
        self.fields
            .iter()
            .map(|(name, f)| (name.clone(), f.confidence))
            .collect()
    }

    pub fn mean_confidence(&self) -> f32 {
        if self.fields.is_empty() {
            return 0.0;
        }
        self.fields.values().map(|f| f.confidence).sum::<f32>() / self.fields.len() as f32
    }

    /// Provenance record for this extraction, ready for `FragmentLog::append`.
    pub fn to_fragment(
        &self,
        source_identifier: &str,
        previous_fragment_id: Option<&str>,
        output_identifier: &str,
        config: &RoutingConfig,
    ) -> ProvenanceFragment {
        let min_confidence = self
            .fields
            .values()
            .map(|f| f.confidence)
            .fold(None, |min: Option<f32>, c| Some(min.map_or(c, |m| m.min(c))))
            .unwrap_or(0.0);

        let mut builder = FragmentBuilder::new(fragment_types::DWC_EXTRACTION, "confidence_routed_extraction")
            .source(source_identifier)
            .output(output_identifier)
            .parameter("confidence_threshold", f64::from(config.confidence_threshold))
            .parameter("routing_enabled", config.enabled)
            .metadata("premium_invoked", self.premium_invoked)
            .metadata("improved_fields", self.improved.clone());

        if !self.fields.is_empty() {
            builder = builder
                .quality_metric("field_count", self.fields.len())
                .quality_metric("mean_confidence", f64::from(self.mean_confidence()))
                .quality_metric("min_confidence", f64::from(min_confidence))
                .quality_metric("low_confidence_fields", self.low_confidence.len());
        }
        if let Some(previous) = previous_fragment_id {
            builder = builder.derived_from(previous);
        }

        builder.build()
    }
}

/// Raw routing counters owned by one router instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingCounters {
    pub total_extractions: u64,
    pub fields_re_extracted: u64,
    pub premium_api_calls: u64,
}

/// Counters plus derived rates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutingStats {
    pub total_extractions: u64,
    pub fields_re_extracted: u64,
    pub premium_api_calls: u64,
    pub avg_fields_per_re_extraction: f64,
    /// Premium calls per extraction, as a percentage.
    pub premium_call_rate_percent: f64,
}

impl From<RoutingCounters> for RoutingStats {
    fn from(c: RoutingCounters) -> Self {
        let avg_fields_per_re_extraction = if c.premium_api_calls == 0 {
            0.0
        } else {
            c.fields_re_extracted as f64 / c.premium_api_calls as f64
        };
        let premium_call_rate_percent = if c.total_extractions == 0 {
            0.0
        } else {
            c.premium_api_calls as f64 / c.total_extractions as f64 * 100.0
        };

        Self {
            total_extractions: c.total_extractions,
            fields_re_extracted: c.fields_re_extracted,
            premium_api_calls: c.premium_api_calls,
            avg_fields_per_re_extraction,
            premium_call_rate_percent,
        }
    }
}
