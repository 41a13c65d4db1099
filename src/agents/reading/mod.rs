
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use super::prompts;
use crate::config::Config;
use crate::documents::{
    Chunk, DocumentLoader, FILENAME_KEY, Metadata, ORIGINAL_CHUNKS_KEY, SOURCE_KEY, TYPE_KEY,
    TYPE_SUMMARY,
};
use crate::memory::{RecordId, VectorMemory};
use crate::models::ChatModel;
use crate::{AuroraError, Result};

/// Map-reduce summarization settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryConfig {
    /// Chunks summarized together in one map call
    pub map_group_size: usize,
    /// Partial summaries are collapsed again while their combined length
    /// exceeds this many characters
    pub collapse_max_chars: usize,
}

impl Default for SummaryConfig {
    #[inline]
    fn default() -> Self {
        Self {
            map_group_size: 4,
            collapse_max_chars: 12_000,
        }
    }
}

/// Outcome of storing one document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub path: PathBuf,
    pub chunks_stored: usize,
    pub ids: Vec<RecordId>,
}

impl fmt::Display for IngestReport {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Successfully ingested {} chunks from {}",
            self.chunks_stored,
            self.path.display()
        )
    }
}

/// Reads documents into memory and distills them
pub struct ReadingCompanion {
    memory: Arc<VectorMemory>,
    model: Arc<dyn ChatModel>,
    loader: DocumentLoader,
    summary: SummaryConfig,
    temperature: f32,
}

impl ReadingCompanion {
    #[inline]
    pub fn new(memory: Arc<VectorMemory>, model: Arc<dyn ChatModel>, config: &Config) -> Self {
        Self {
            memory,
            model,
            loader: DocumentLoader::new(config.chunking),
            summary: config.summary,
            temperature: config.generation.summarization_temperature,
        }
    }

    /// Load, chunk and store a document. Loader errors surface before the
    /// store is touched.
    #[inline]
    pub async fn ingest(&self, path: &Path) -> Result<IngestReport> {
        let chunks = self.loader.load(path)?;
        let ids = self.memory.add_chunks(chunks).await?;

        let report = IngestReport {
            path: path.to_path_buf(),
            chunks_stored: ids.len(),
            ids,
        };
        info!("{}", report);
        Ok(report)
    }

    /// Map-reduce summary of a document, stored back into memory. The
    /// document does not need to have been ingested.
    #[inline]
    pub async fn summarize(&self, path: &Path) -> Result<String> {
        let chunks = self.loader.load(path)?;
        if chunks.is_empty() {
            return Err(AuroraError::EmptyDocument(path.to_path_buf()));
        }

        info!(
            "Summarizing {} chunks from {}",
            chunks.len(),
            path.display()
        );
        let summary = self.map_reduce(&chunks)?;

        let mut metadata = Metadata::new();
        metadata.insert(TYPE_KEY.to_string(), TYPE_SUMMARY.into());
        metadata.insert(SOURCE_KEY.to_string(), path.display().to_string().into());
        if let Some(name) = path.file_name() {
            metadata.insert(
                FILENAME_KEY.to_string(),
                name.to_string_lossy().into_owned().into(),
            );
        }
        metadata.insert(
            ORIGINAL_CHUNKS_KEY.to_string(),
            (chunks.len() as i64).into(),
        );

        let id = self.memory.add_text(&summary, metadata).await?;
        debug!("Stored summary of {} as {}", path.display(), id);

        Ok(summary)
    }

    /// Summarize, then ask for 3-5 numbered insights
    #[inline]
    pub async fn extract_insights(&self, path: &Path) -> Result<String> {
        let summary = self.summarize(path).await?;
        self.model
            .complete(&prompts::extract_insights(&summary), self.temperature)
    }

    /// Summarize groups of chunks, collapse the partial summaries until they
    /// fit the budget, then combine them into one
    #[inline]
    pub fn map_reduce(&self, chunks: &[Chunk]) -> Result<String> {
        let group_size = self.summary.map_group_size.max(1);

        let mut partials = chunks
            .chunks(group_size)
            .map(|group| {
                let text = group.iter().map(Chunk::text).join("\n\n");
                self.model
                    .complete(&prompts::summarize_passage(&text), self.temperature)
            })
            .collect::<Result<Vec<String>>>()?;

        // Merging fewer than two at a time would never shrink the list
        let collapse_size = group_size.max(2);
        while partials.len() > 1 && total_chars(&partials) > self.summary.collapse_max_chars {
            debug!(
                "Collapsing {} partial summaries ({} chars)",
                partials.len(),
                total_chars(&partials)
            );
            partials = partials
                .chunks(collapse_size)
                .map(|group| {
                    self.model
                        .complete(&prompts::combine_summaries(group), self.temperature)
                })
                .collect::<Result<Vec<String>>>()?;
        }

        self.model
            .complete(&prompts::combine_summaries(&partials), self.temperature)
    }
}

fn total_chars(texts: &[String]) -> usize {
    texts.iter().map(|t| t.chars().count()).sum()
}
