
use itertools::Itertools;
use std::sync::Arc;
use tracing::{debug, info};

use super::prompts;
use crate::Result;
use crate::config::Config;
use crate::documents::{
    Chunk, MANUAL_ENTRY_SOURCE, Metadata, SOURCE_KEY, TYPE_KEY, TYPE_MANUAL_ENTRY,
};
use crate::memory::VectorMemory;
use crate::models::ChatModel;

pub const NO_RESULTS_MESSAGE: &str =
    "I couldn't find any relevant information in my knowledge base.";

/// Answers questions from the knowledge base and manages manual entries
pub struct KnowledgeButler {
    memory: Arc<VectorMemory>,
    model: Arc<dyn ChatModel>,
    top_k: usize,
    temperature: f32,
}

impl KnowledgeButler {
    #[inline]
    pub fn new(memory: Arc<VectorMemory>, model: Arc<dyn ChatModel>, config: &Config) -> Self {
        Self {
            memory,
            model,
            top_k: config.retrieval.top_k,
            temperature: config.generation.reasoning_temperature,
        }
    }

    /// Retrieve the top-k chunks for `query` and have the model answer from
    /// them. An empty knowledge base yields [`NO_RESULTS_MESSAGE`].
    #[inline]
    pub async fn answer(&self, query: &str) -> Result<String> {
        let context = self.assemble_context(query).await?;
        if context.is_empty() {
            info!("No knowledge found for query");
            return Ok(NO_RESULTS_MESSAGE.to_string());
        }

        let prompt = prompts::knowledge_answer(&context, query);
        debug!("Answering with {} bytes of context", context.len());
        self.model.complete(&prompt, self.temperature)
    }

    /// The context block `answer` would send for `query`, empty when
    /// nothing was retrieved
    #[inline]
    pub async fn assemble_context(&self, query: &str) -> Result<String> {
        let chunks = self.memory.search(query, self.top_k, None).await?;
        Ok(build_context(&chunks))
    }

    /// Store hand-written knowledge. The entry is tagged as a manual entry
    /// and gets the manual-entry source unless one is given.
    #[inline]
    pub async fn add_knowledge(&self, text: &str, mut metadata: Metadata) -> Result<String> {
        metadata.insert(TYPE_KEY.to_string(), TYPE_MANUAL_ENTRY.into());
        metadata
            .entry(SOURCE_KEY.to_string())
            .or_insert_with(|| MANUAL_ENTRY_SOURCE.into());

        let id = self.memory.add_text(text, metadata).await?;
        Ok(format!("Added knowledge with ID: {id}"))
    }

    #[inline]
    pub async fn stats_text(&self) -> Result<String> {
        let stats = self.memory.stats().await?;
        Ok(format!(
            "Knowledge base contains {} chunks of information.",
            stats.count
        ))
    }
}

/// Join chunks in the given order, each labelled with its source name
#[inline]
pub fn build_context(chunks: &[Chunk]) -> String {
    chunks
        .iter()
        .map(|chunk| format!("Source: {}\n{}", chunk.source_name(), chunk.text()))
        .join("\n\n")
}
