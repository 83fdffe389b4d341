use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::enums::{ChunkStatus, CognitiveLevel};
use super::lenient::*;

/// A unit of educational text that questions are generated from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub course_id: String,
    pub course_name: String,
    pub section_title: String,
    pub content: String,
    /// Rendered variant of `content` (with image markup). Preferred for prompts when present.
    pub display_content: Option<String>,
    pub word_count: u32,
    pub status: Option<ChunkStatus>,
    pub target_count: Option<u32>,
    pub metadata: ChunkMetadata,
    pub updated_at: NaiveDateTime,
}

impl Chunk {
    /// Text used as the source of truth in prompts.
    pub fn source_text(&self) -> &str {
        self.display_content
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(&self.content)
    }

    pub fn summary(&self) -> ChunkSummary {
        ChunkSummary {
            course_id: self.course_id.clone(),
            course_name: self.course_name.clone(),
            section_title: self.section_title.clone(),
        }
    }
}

/// Minimal chunk identity for prompts that do not need the full text.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkSummary {
    pub course_id: String,
    pub course_name: String,
    pub section_title: String,
}

/// JSON blob stored on the chunk. Unknown keys written by other tools are preserved.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concept_map: Option<Vec<ConceptMapItem>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub density_score: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concept_map_created_at: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ChunkMetadata {
    /// Stored concept map, if one exists and is non-empty.
    pub fn reusable_concepts(&self) -> Option<&[ConceptMapItem]> {
        self.concept_map.as_deref().filter(|c| !c.is_empty())
    }
}

/// One testable unit of knowledge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptMapItem {
    #[serde(
        alias = "concept",
        alias = "topic",
        alias = "baslik",
        alias = "kavram",
        deserialize_with = "deserialize_string_or_default"
    )]
    pub title: String,
    #[serde(default, deserialize_with = "deserialize_string_or_default")]
    pub focus: String,
    #[serde(
        default,
        alias = "bloom_level",
        alias = "bloomLevel",
        deserialize_with = "deserialize_optional_level"
    )]
    pub level: Option<CognitiveLevel>,
    #[serde(default, alias = "img", deserialize_with = "deserialize_optional_nonempty_string")]
    pub image: Option<String>,
    #[serde(default, alias = "alt", deserialize_with = "deserialize_optional_nonempty_string")]
    pub image_alt: Option<String>,
    #[serde(default, alias = "isException", deserialize_with = "deserialize_truthy")]
    pub is_exception: bool,
    #[serde(default, deserialize_with = "deserialize_string_list")]
    pub prerequisites: Vec<String>,
}

impl ConceptMapItem {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            focus: String::new(),
            level: None,
            image: None,
            image_alt: None,
            is_exception: false,
            prerequisites: Vec::new(),
        }
    }

    pub fn with_level(mut self, level: CognitiveLevel) -> Self {
        self.level = Some(level);
        self
    }
}
