// Vector memory module
// Embeds chunks and keeps them in a similarity-searchable store


pub mod file;
pub mod lance;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::documents::{Chunk, Metadata, MetadataValue};
use crate::models::Embedder;
use crate::{AuroraError, Result};

pub use file::FileBackend;
pub use lance::LanceBackend;

/// Which storage engine holds the vectors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StoreBackend {
    #[default]
    #[serde(rename = "lancedb")]
    LanceDb,
    #[serde(rename = "file")]
    File,
}

impl fmt::Display for StoreBackend {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LanceDb => f.write_str("lancedb"),
            Self::File => f.write_str("file"),
        }
    }
}

impl FromStr for StoreBackend {
    type Err = String;

    #[inline]
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lancedb" | "lance" => Ok(Self::LanceDb),
            "file" | "json" => Ok(Self::File),
            other => Err(format!("unknown store backend '{other}'")),
        }
    }
}

/// Stable record identifier (UUID v4)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    #[inline]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for RecordId {
    #[inline]
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for RecordId {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A chunk with its embedding, ready to be persisted
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub id: RecordId,
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
    /// RFC 3339 insertion time
    pub created_at: String,
}

/// Search hit; `score` is cosine similarity, higher is closer
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub id: RecordId,
    pub chunk: Chunk,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnowledgeBaseStats {
    pub count: u64,
    pub name: String,
}

/// Equality match on every listed metadata key
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataFilter(Metadata);

impl MetadataFilter {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.0
            .iter()
            .all(|(key, expected)| metadata.get(key).is_some_and(|v| same_value(v, expected)))
    }
}

/// Equality, except integers and floats compare by numeric value
fn same_value(stored: &MetadataValue, expected: &MetadataValue) -> bool {
    match (stored, expected) {
        (MetadataValue::Integer(i), MetadataValue::Float(f))
        | (MetadataValue::Float(f), MetadataValue::Integer(i)) => *i as f64 == *f,
        _ => stored == expected,
    }
}

impl From<Metadata> for MetadataFilter {
    #[inline]
    fn from(metadata: Metadata) -> Self {
        Self(metadata)
    }
}

impl fmt::Display for MetadataFilter {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (key, value) in &self.0 {
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "{key}={value}")?;
            first = false;
        }
        Ok(())
    }
}

/// Storage engine behind [`VectorMemory`]. Results come back ranked by
/// descending similarity, ties in insertion order.
#[async_trait]
pub trait VectorBackend: Send + Sync {
    /// Collection name reported by stats
    fn name(&self) -> &str;

    /// Persist records durably before returning
    async fn insert(&self, records: &[StoredRecord]) -> Result<()>;

    async fn search(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<ScoredChunk>>;

    /// Remove matching records, returning how many were removed
    async fn delete(&self, filter: &MetadataFilter) -> Result<u64>;

    async fn count(&self) -> Result<u64>;
}

/// Shared handle to the knowledge base
pub struct VectorMemory {
    backend: Box<dyn VectorBackend>,
    embedder: Arc<dyn Embedder>,
}

impl fmt::Debug for VectorMemory {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VectorMemory")
            .field("collection", &self.backend.name())
            .finish_non_exhaustive()
    }
}

impl VectorMemory {
    #[inline]
    pub fn new(backend: Box<dyn VectorBackend>, embedder: Arc<dyn Embedder>) -> Self {
        Self { backend, embedder }
    }

    /// Open the backend selected in configuration
    #[inline]
    pub async fn open(config: &Config, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let path = config.vector_store_path();
        let collection = &config.store.collection;

        info!(
            "Opening {} vector store '{}' at {}",
            config.store.backend,
            collection,
            path.display()
        );

        let backend: Box<dyn VectorBackend> = match config.store.backend {
            StoreBackend::LanceDb => Box::new(LanceBackend::open(&path, collection).await?),
            StoreBackend::File => Box::new(FileBackend::open(&path, collection)?),
        };

        Ok(Self::new(backend, embedder))
    }

    /// Embed and persist chunks, returning their new ids in input order
    #[inline]
    pub async fn add_chunks(&self, chunks: Vec<Chunk>) -> Result<Vec<RecordId>> {
        if chunks.is_empty() {
            debug!("No chunks to add");
            return Ok(Vec::new());
        }

        for chunk in &chunks {
            if let Some((key, value)) = chunk.metadata().iter().find(|(_, v)| !v.is_storable()) {
                return Err(AuroraError::InvalidMetadata(format!(
                    "'{key}' holds {value}, which cannot be stored"
                )));
            }
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text().to_string()).collect();
        let embeddings = self.embedder.embed(&texts)?;
        if embeddings.len() != chunks.len() {
            return Err(AuroraError::Model(format!(
                "Expected {} embeddings, got {}",
                chunks.len(),
                embeddings.len()
            )));
        }

        let created_at = chrono::Utc::now().to_rfc3339();
        let records: Vec<StoredRecord> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| StoredRecord {
                id: RecordId::generate(),
                chunk,
                embedding,
                created_at: created_at.clone(),
            })
            .collect();

        self.backend.insert(&records).await?;

        info!(
            "Added {} chunks to '{}'",
            records.len(),
            self.backend.name()
        );
        Ok(records.into_iter().map(|r| r.id).collect())
    }

    #[inline]
    pub async fn add_text(&self, text: &str, metadata: Metadata) -> Result<RecordId> {
        self.add_chunks(vec![Chunk::new(text, metadata)])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AuroraError::Database("Insert returned no id".to_string()))
    }

    /// Top `k` chunks for `query`, most similar first
    #[inline]
    pub async fn search(
        &self,
        query: &str,
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<Chunk>> {
        Ok(self
            .ranked(query, k, filter)
            .await?
            .into_iter()
            .map(|hit| hit.chunk)
            .collect())
    }

    #[inline]
    pub async fn search_with_score(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        self.ranked(query, k, None).await
    }

    /// Delete every record whose metadata matches `filter`. An empty filter
    /// is refused rather than treated as "delete everything".
    #[inline]
    pub async fn delete_by_metadata(&self, filter: &MetadataFilter) -> Result<u64> {
        if filter.is_empty() {
            return Err(AuroraError::InvalidFilter(
                "delete requires at least one metadata key".to_string(),
            ));
        }

        let removed = self.backend.delete(filter).await?;
        if removed == 0 {
            warn!("No records matched delete filter {}", filter);
        } else {
            info!("Deleted {} records matching {}", removed, filter);
        }
        Ok(removed)
    }

    #[inline]
    pub async fn stats(&self) -> Result<KnowledgeBaseStats> {
        Ok(KnowledgeBaseStats {
            count: self.backend.count().await?,
            name: self.backend.name().to_string(),
        })
    }

    async fn ranked(
        &self,
        query: &str,
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<ScoredChunk>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let query_vector = self.embedder.embed_query(query)?;
        let mut hits = self.backend.search(&query_vector, k, filter).await?;
        hits.truncate(k);

        debug!("Search for {:?} returned {} hits", query, hits.len());
        Ok(hits)
    }
}

/// Cosine similarity; zero vectors are dissimilar to everything
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let (mut dot, mut norm_a, mut norm_b) = (0.0_f32, 0.0_f32, 0.0_f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// A search candidate before ranking
pub(crate) struct Candidate {
    pub seq: u64,
    pub hit: ScoredChunk,
}

/// Order by descending score, then insertion order, and keep the best `k`
pub(crate) fn rank(mut candidates: Vec<Candidate>, k: usize) -> Vec<ScoredChunk> {
    candidates.sort_by(|a, b| match b.hit.score.total_cmp(&a.hit.score) {
        Ordering::Equal => a.seq.cmp(&b.seq),
        other => other,
    });
    candidates.truncate(k);
    candidates.into_iter().map(|c| c.hit).collect()
}

/// Fail when a vector does not match the collection's dimension
pub(crate) fn check_dimension(expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(AuroraError::Database(format!(
            "Embedding dimension mismatch: collection uses {expected}, got {actual}"
        )))
    }
}
