//! Concept analysis: chunk text → ordered concept map + density score.

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};

use super::observer::StepLog;
use super::prompt::{assemble, build_source_context};
use super::traits::{ConceptAnalyzer, ProgressObserver};
use super::types::{ConceptMap, LogStep, DEFAULT_DENSITY_SCORE};
use crate::models::lenient::value_as_f64;
use crate::models::ConceptMapItem;
use crate::pipeline::structuring::{BackendSelection, StructuredCall, StructuredGenerator, StructuredSchema};

pub const MIN_TARGET_CONCEPTS: usize = 5;
pub const MAX_TARGET_CONCEPTS: usize = 12;

const ANALYSIS_TASK: &str = "Build the concept map and density score for the context text.";

/// Advisory concept count for a chunk of `word_count` words:
/// `clamp(floor(sqrt(w / 3)), 5, 12)`.
pub fn target_concept_count(word_count: u32) -> usize {
    let raw = (f64::from(word_count) / 3.0).sqrt().floor() as usize;
    raw.clamp(MIN_TARGET_CONCEPTS, MAX_TARGET_CONCEPTS)
}

fn analysis_system_prompt(target: usize) -> String {
    format!(
        "You are an expert educational content analyst. Identify {target} key concepts in the context text \
that are suitable for exam questions, and rate the cognitive density of the text from 1 to 5.

Rules:
1. Exceptions first: sentences introduced by \"however\", \"except\", \"unless\" or \"provided that\" state exceptions. \
List each one as its own concept with \"is_exception\": true.
2. Spread the concepts across the beginning, middle and end of the text.
3. Concepts must not overlap. Each one represents an independent part of the text.
4. Set \"level\" by these definitions:
   - \"recall\": definitions, concepts and basic facts.
   - \"application\": processes, methods and how-to knowledge.
   - \"analysis\": cause and effect, comparisons and inferences.
5. \"focus\" is a learning outcome of at most 15 words.
6. Every concept has an \"image\" key. Use the image file name when one is relevant, otherwise null.
7. When an image is set, describe it in \"image_alt\".
8. \"prerequisites\" lists earlier concepts needed to understand this one, or [] when there are none.

Density guide: 1 = introductory narrative, 3 = standard rules or textbook exposition, 5 = dense technical doctrine.

Reply with a JSON object only:
{{
  \"density_score\": 3,
  \"concepts\": [
    {{
      \"title\": \"Concept title\",
      \"focus\": \"What the learner should grasp\",
      \"level\": \"recall\",
      \"is_exception\": false,
      \"prerequisites\": [],
      \"image\": null,
      \"image_alt\": null
    }}
  ]
}}"
    )
}

/// Wire shape of the analysis reply.
#[derive(Debug, Deserialize)]
struct ConceptMapResponse {
    #[serde(
        default = "default_density",
        alias = "densityScore",
        deserialize_with = "deserialize_density"
    )]
    density_score: u8,
    #[serde(default)]
    concepts: Vec<ConceptMapItem>,
}

fn default_density() -> u8 {
    DEFAULT_DENSITY_SCORE
}

/// Any number is rounded and clamped to 1–5; anything else becomes the default.
fn deserialize_density<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(value_as_f64)
        .filter(|f| f.is_finite())
        .map(|f| f.round().clamp(1.0, 5.0) as u8)
        .unwrap_or(DEFAULT_DENSITY_SCORE))
}

impl StructuredSchema for ConceptMapResponse {
    fn schema_issues(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if self.concepts.is_empty() {
            issues.push("concepts must contain at least one entry".to_string());
        }
        for (i, concept) in self.concepts.iter().enumerate() {
            if concept.title.trim().is_empty() {
                issues.push(format!("concepts[{i}].title must not be empty"));
            }
        }
        issues
    }
}

/// Backend-driven analyzer.
pub struct LlmConceptAnalyzer {
    generator: StructuredGenerator,
    selection: BackendSelection,
    max_retries: u32,
}

impl LlmConceptAnalyzer {
    pub fn new(generator: StructuredGenerator, selection: BackendSelection, max_retries: u32) -> Self {
        Self {
            generator,
            selection,
            max_retries,
        }
    }
}

#[async_trait]
impl ConceptAnalyzer for LlmConceptAnalyzer {
    async fn analyze(
        &self,
        content: &str,
        word_count: u32,
        observer: &dyn ProgressObserver,
    ) -> Option<ConceptMap> {
        let target = target_concept_count(word_count);
        observer.log(
            LogStep::Mapping,
            "Building concept map",
            json!({ "word_count": word_count, "target_count": target }),
        );

        let messages = assemble(
            &analysis_system_prompt(target),
            &build_source_context(content),
            ANALYSIS_TASK,
        );
        let call = StructuredCall::new(&self.selection).with_max_retries(self.max_retries);
        let log = StepLog::new(observer, LogStep::Mapping);

        let Some(response) = self
            .generator
            .generate::<ConceptMapResponse>(&messages, &call, &log)
            .await
        else {
            observer.log(LogStep::Mapping, "Concept map could not be produced", Value::Null);
            return None;
        };

        observer.log(
            LogStep::Mapping,
            "Concept map ready",
            json!({
                "concept_count": response.concepts.len(),
                "density_score": response.density_score,
                "concepts": response.concepts.iter().map(|c| c.title.as_str()).collect::<Vec<_>>(),
            }),
        );
        Some(ConceptMap {
            concepts: response.concepts,
            density_score: response.density_score,
        })
    }
}
