//! ConfidenceRouter: two-tier field extraction.
//!
//! Runs the base backend over every field, then sends only the fields below
//! the confidence threshold to the premium backend in one batched call.
//! Premium results replace base results only when strictly more confident.
//!
//! Calls are sequential: the premium field set depends on base confidences.
//! Counters live on the instance and change through `&mut self`; wrap the
//! router in a `Mutex` to share it between threads.

use super::types::*;

/// Orchestrates base → premium extraction for specimen images.
pub struct ConfidenceRouter {
    base: Box<dyn ExtractionCapability>,
    premium: Box<dyn ExtractionCapability>,
    config: RoutingConfig,
    counters: RoutingCounters,
}

impl ConfidenceRouter {
    pub fn new(
        base: Box<dyn ExtractionCapability>,
        premium: Box<dyn ExtractionCapability>,
        config: RoutingConfig,
    ) -> Self {
        Self {
            base,
            premium,
            config,
            counters: RoutingCounters::default(),
        }
    }

    pub fn config(&self) -> &RoutingConfig {
        &self.config
    }

    /// Extract all fields from one image, re-extracting uncertain ones.
    ///
    /// Never fails: a base failure yields an empty result, a premium failure
    /// leaves the base result untouched.
    pub fn extract_with_routing(
        &mut self,
        image_ref: &str,
        overrides: &ExtractionOverrides,
    ) -> RoutedExtraction {
        let base_request = ExtractionRequest {
            image_ref: image_ref.to_string(),
            tier: ExtractionTier::Base,
            instruction: overrides.instruction.clone(),
            fields: overrides.fields.clone(),
        };

        // Step 1: Base tier over the full field set
        let mut fields = match self.base.extract(&base_request) {
            Ok(fields) => fields,
            Err(e) => {
                tracing::warn!(
                    image_ref,
                    backend = self.base.name(),
                    error = %e,
                    "Base extraction failed, returning empty result"
                );
                return RoutedExtraction::default();
            }
        };

        if fields.is_empty() {
            tracing::warn!(image_ref, backend = self.base.name(), "Base extraction returned no fields");
            return RoutedExtraction::default();
        }

        for field in fields.values_mut() {
            field.confidence = clamp_confidence(field.confidence);
        }

        self.counters.total_extractions += 1;

        if !self.config.enabled {
            return RoutedExtraction {
                fields,
                ..Default::default()
            };
        }

        // Step 2: Partition by threshold
        let low_confidence = low_confidence_fields(&fields, self.config.confidence_threshold);
        if low_confidence.is_empty() {
            tracing::debug!(
                image_ref,
                field_count = fields.len(),
                threshold = self.config.confidence_threshold,
                "All fields above threshold, premium tier skipped"
            );
            return RoutedExtraction {
                fields,
                ..Default::default()
            };
        }

        tracing::info!(
            image_ref,
            low_confidence = ?low_confidence,
            threshold = self.config.confidence_threshold,
            backend = self.premium.name(),
            "Routing low-confidence fields to premium tier"
        );

        // Step 3: One batched premium call restricted to the uncertain fields
        let premium_request = ExtractionRequest {
            image_ref: image_ref.to_string(),
            tier: ExtractionTier::Premium,
            instruction: Some(build_premium_instruction(&low_confidence)),
            fields: Some(low_confidence.clone()),
        };

        // A failed premium call counts as an attempted call that returned nothing
        let premium_fields = match self.premium.extract(&premium_request) {
            Ok(premium_fields) => premium_fields,
            Err(e) => {
                tracing::warn!(
                    image_ref,
                    backend = self.premium.name(),
                    error = %e,
                    "Premium extraction failed, keeping base result"
                );
                FieldResults::new()
            }
        };

        // Step 4: Never-regress merge
        let improved = merge_never_regress(&mut fields, &premium_fields, &low_confidence);

        self.counters.premium_api_calls += 1;
        self.counters.fields_re_extracted += premium_fields.len() as u64;

        tracing::info!(
            image_ref,
            requested = low_confidence.len(),
            returned = premium_fields.len(),
            improved = improved.len(),
            "Premium re-extraction merged"
        );

        RoutedExtraction {
            fields,
            low_confidence,
            improved,
            premium_invoked: true,
        }
    }

    /// Counters plus derived rates.
    pub fn stats(&self) -> RoutingStats {
        RoutingStats::from(self.counters)
    }

    pub fn counters(&self) -> RoutingCounters {
        self.counters
    }

    pub fn reset_stats(&mut self) {
        tracing::debug!(previous = ?self.counters, "Routing counters reset");
        self.counters = RoutingCounters::default();
    }
}

/// Names of fields strictly below `threshold`, in field-name order.
pub fn low_confidence_fields(fields: &FieldResults, threshold: f32) -> Vec<String> {
    fields
        .iter()
        .filter(|(_, f)| f.confidence < threshold)
        .map(|(name, _)| name.clone())
        .collect()
}

/// Replace each requested field with its premium result when the premium
/// confidence is strictly higher. Returns the names that were replaced.
///
/// Premium fields outside `requested` are ignored.
pub fn merge_never_regress(
    fields: &mut FieldResults,
    premium: &FieldResults,
    requested: &[String],
) -> Vec<String> {
    let mut improved = Vec::new();

    for name in requested {
        let Some(candidate) = premium.get(name) else {
            continue;
        };
        let candidate_confidence = clamp_confidence(candidate.confidence);

        match fields.get_mut(name) {
            Some(current) if candidate_confidence > current.confidence => {
                tracing::debug!(
                    field = name.as_str(),
                    from = current.confidence,
                    to = candidate_confidence,
                    "Premium result accepted"
                );
                current.value = candidate.value.clone();
                current.confidence = candidate_confidence;
                improved.push(name.clone());
            }
            Some(current) => {
                tracing::debug!(
                    field = name.as_str(),
                    kept = current.confidence,
                    rejected = candidate_confidence,
                    "Premium result not more confident, keeping base value"
                );
            }
            None => {}
        }
    }

    improved
}

/// Instruction sent with the premium call.
pub fn build_premium_instruction(fields: &[String]) -> String {
    format!(
        "Re-examine this specimen label with particular care. A previous pass was \
         uncertain about the following fields: {}. Read faint, handwritten, or \
         abbreviated text closely and return only these fields, each with a value \
         and a confidence between 0 and 1.",
        fields.join(", ")
    )
}
