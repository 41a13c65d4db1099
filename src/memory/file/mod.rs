
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use super::{
    Candidate, MetadataFilter, RecordId, ScoredChunk, StoredRecord, VectorBackend,
    check_dimension, cosine_similarity, rank,
};
use crate::documents::{Chunk, Metadata};
use crate::{AuroraError, Result};

#[derive(Debug, Default, Serialize, Deserialize)]
struct FileIndex {
    next_seq: u64,
    dimension: Option<usize>,
    records: Vec<FileRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct FileRecord {
    id: RecordId,
    seq: u64,
    text: String,
    metadata: Metadata,
    embedding: Vec<f32>,
    created_at: String,
}

/// Single JSON file holding every record of a collection. Searches are
/// brute force; every write replaces the file atomically.
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    name: String,
    index: Mutex<FileIndex>,
}

impl FileBackend {
    /// Open `<dir>/<collection>.json`, creating the directory if needed
    #[inline]
    pub fn open(dir: &Path, collection: &str) -> Result<Self> {
        fs::create_dir_all(dir).map_err(|e| {
            AuroraError::Database(format!("Failed to create vector store directory: {}", e))
        })?;

        let path = dir.join(format!("{collection}.json"));
        let index = if path.exists() {
            let bytes = fs::read(&path).map_err(|e| {
                AuroraError::Database(format!("Failed to read {}: {}", path.display(), e))
            })?;
            serde_json::from_slice(&bytes).map_err(|e| {
                AuroraError::Database(format!("Corrupt index {}: {}", path.display(), e))
            })?
        } else {
            FileIndex::default()
        };

        info!(
            "Opened file index {} with {} records",
            path.display(),
            index.records.len()
        );

        Ok(Self {
            path,
            name: collection.to_string(),
            index: Mutex::new(index),
        })
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<MutexGuard<'_, FileIndex>> {
        self.index
            .lock()
            .map_err(|_| AuroraError::Database("File index lock poisoned".to_string()))
    }

    /// Write to a sibling temp file, fsync, then rename over the index
    fn persist(&self, index: &FileIndex) -> Result<()> {
        let tmp_path = self.path.with_extension("json.tmp");
        let bytes = serde_json::to_vec(index)
            .map_err(|e| AuroraError::Database(format!("Failed to serialize index: {}", e)))?;

        let write = || -> std::io::Result<()> {
            let mut file = File::create(&tmp_path)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
            fs::rename(&tmp_path, &self.path)
        };

        write().map_err(|e| {
            AuroraError::Database(format!("Failed to write {}: {}", self.path.display(), e))
        })?;

        debug!(
            "Persisted {} records to {}",
            index.records.len(),
            self.path.display()
        );
        Ok(())
    }
}

#[async_trait]
impl VectorBackend for FileBackend {
    #[inline]
    fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    async fn insert(&self, records: &[StoredRecord]) -> Result<()> {
        let Some(first) = records.first() else {
            return Ok(());
        };

        let mut index = self.lock()?;
        let dimension = index.dimension.unwrap_or(first.embedding.len());
        for record in records {
            check_dimension(dimension, record.embedding.len())?;
        }

        let previous = (index.records.len(), index.next_seq, index.dimension);
        index.dimension = Some(dimension);
        for record in records {
            let seq = index.next_seq;
            index.records.push(FileRecord {
                id: record.id.clone(),
                seq,
                text: record.chunk.text().to_string(),
                metadata: record.chunk.metadata().clone(),
                embedding: record.embedding.clone(),
                created_at: record.created_at.clone(),
            });
            index.next_seq += 1;
        }

        if let Err(e) = self.persist(&index) {
            let (len, next_seq, dimension) = previous;
            index.records.truncate(len);
            index.next_seq = next_seq;
            index.dimension = dimension;
            return Err(e);
        }
        Ok(())
    }

    #[inline]
    async fn search(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<ScoredChunk>> {
        let index = self.lock()?;
        if let Some(dimension) = index.dimension {
            check_dimension(dimension, query.len())?;
        }

        let candidates = index
            .records
            .iter()
            .filter(|record| filter.is_none_or(|f| f.matches(&record.metadata)))
            .map(|record| Candidate {
                seq: record.seq,
                hit: ScoredChunk {
                    id: record.id.clone(),
                    chunk: Chunk::new(record.text.clone(), record.metadata.clone()),
                    score: cosine_similarity(query, &record.embedding),
                },
            })
            .collect();

        Ok(rank(candidates, k))
    }

    #[inline]
    async fn delete(&self, filter: &MetadataFilter) -> Result<u64> {
        let mut index = self.lock()?;

        let (removed, kept): (Vec<FileRecord>, Vec<FileRecord>) = std::mem::take(&mut index.records)
            .into_iter()
            .partition(|record| filter.matches(&record.metadata));
        index.records = kept;
        if removed.is_empty() {
            return Ok(0);
        }

        if let Err(e) = self.persist(&index) {
            index.records.extend(removed);
            index.records.sort_by_key(|record| record.seq);
            return Err(e);
        }
        Ok(removed.len() as u64)
    }

    #[inline]
    async fn count(&self) -> Result<u64> {
        Ok(self.lock()?.records.len() as u64)
    }
}
