//! Extraction service boundary: the typed contract with the language-model
//! collaborator that turns narrative text into graph payloads.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod openai;
pub mod parser;

pub use openai::OpenAiExtractor;

fn default_importance() -> i64 {
    1
}

/// A character node as returned by the extraction model. The model's own
/// node ids are local to one response; the engine keys on names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayloadNode {
    #[serde(default)]
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_importance")]
    pub importance: i64,
}

/// A relation edge as returned by the extraction model. Endpoints are
/// carried by name; models are inconsistent about field casing, so both
/// snake_case and camelCase spellings are accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayloadEdge {
    #[serde(alias = "sourceName")]
    pub source_name: String,
    #[serde(alias = "targetName")]
    pub target_name: String,
    pub relation: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_importance")]
    pub importance: i64,
}

/// The full extraction payload. With hint names supplied, models may omit
/// nodes entirely (the caller already holds the roster).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphPayload {
    #[serde(default)]
    pub nodes: Vec<PayloadNode>,
    #[serde(default)]
    pub edges: Vec<PayloadEdge>,
}

/// A character profile sketch from the roster-analysis pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacterSketch {
    pub name: String,
    #[serde(default, alias = "alias")]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_importance")]
    pub importance: i64,
}

/// The language-model extraction collaborator.
///
/// Injected into the engine so tests can substitute a scripted stub; the
/// production implementation is [`OpenAiExtractor`].
#[async_trait]
pub trait ExtractionService: Send + Sync {
    /// Extract characters and relations from narrative text. When
    /// `hint_names` is given, extraction is scoped to those characters and
    /// the returned nodes may be empty.
    async fn extract_relationships(
        &self,
        text: &str,
        hint_names: Option<&[String]>,
    ) -> Result<GraphPayload>;

    /// Extract character profile sketches from narrative text.
    async fn extract_characters(&self, text: &str) -> Result<Vec<CharacterSketch>>;
}
