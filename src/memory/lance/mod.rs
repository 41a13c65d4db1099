#[cfg(test)]
mod tests;

use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt64Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use futures::TryStreamExt;
use itertools::Itertools;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::{Connection, DistanceType, Table};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{
    Candidate, MetadataFilter, RecordId, ScoredChunk, StoredRecord, VectorBackend,
    check_dimension, rank,
};
use crate::documents::{Chunk, Metadata};
use crate::{AuroraError, Result};

/// Values learned from the table on first use
#[derive(Debug, Default)]
struct TableState {
    dimension: Option<usize>,
    next_seq: Option<u64>,
}

/// LanceDB-backed collection. The table is created on the first insert,
/// once the embedding dimension is known.
pub struct LanceBackend {
    connection: Connection,
    table_name: String,
    state: Mutex<TableState>,
}

impl LanceBackend {
    #[inline]
    pub async fn open(path: &Path, collection: &str) -> Result<Self> {
        debug!("Initializing LanceDB at path: {}", path.display());

        std::fs::create_dir_all(path).map_err(|e| {
            AuroraError::Database(format!("Failed to create vector database directory: {}", e))
        })?;

        let uri = format!("file://{}", path.display());
        let connection = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| AuroraError::Database(format!("Failed to connect to LanceDB: {}", e)))?;

        let backend = Self {
            connection,
            table_name: collection.to_string(),
            state: Mutex::new(TableState::default()),
        };

        if let Some(table) = backend.open_table().await? {
            let dimension = detect_vector_dimension(&table).await?;
            backend.state.lock().await.dimension = Some(dimension);
            info!(
                "Opened collection '{}' with {} dimensions",
                backend.table_name, dimension
            );
        }

        Ok(backend)
    }

    async fn open_table(&self) -> Result<Option<Table>> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| AuroraError::Database(format!("Failed to list tables: {}", e)))?;

        if !table_names.contains(&self.table_name) {
            return Ok(None);
        }

        self.connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map(Some)
            .map_err(|e| AuroraError::Database(format!("Failed to open table: {}", e)))
    }

    async fn create_table(&self, dimension: usize) -> Result<Table> {
        info!(
            "Creating collection '{}' with {} dimensions",
            self.table_name, dimension
        );

        self.connection
            .create_empty_table(&self.table_name, create_schema(dimension))
            .execute()
            .await
            .map_err(|e| AuroraError::Database(format!("Failed to create table: {}", e)))
    }

    /// Highest stored sequence number plus one
    async fn scan_next_seq(table: &Table) -> Result<u64> {
        let mut stream = table
            .query()
            .select(Select::columns(&["seq"]))
            .execute()
            .await
            .map_err(|e| AuroraError::Database(format!("Failed to scan sequence: {}", e)))?;

        let mut next = 0;
        while let Some(batch) = stream
            .try_next()
            .await
            .map_err(|e| AuroraError::Database(format!("Failed to read result stream: {}", e)))?
        {
            let seqs = u64_column(&batch, "seq")?;
            for row in 0..batch.num_rows() {
                next = next.max(seqs.value(row) + 1);
            }
        }
        Ok(next)
    }

    /// Ids of every record matching `filter`
    async fn matching_ids(table: &Table, filter: &MetadataFilter) -> Result<Vec<String>> {
        let mut stream = table
            .query()
            .select(Select::columns(&["id", "metadata"]))
            .execute()
            .await
            .map_err(|e| AuroraError::Database(format!("Failed to scan records: {}", e)))?;

        let mut ids = Vec::new();
        while let Some(batch) = stream
            .try_next()
            .await
            .map_err(|e| AuroraError::Database(format!("Failed to read result stream: {}", e)))?
        {
            let id_column = string_column(&batch, "id")?;
            let metadata_column = string_column(&batch, "metadata")?;
            for row in 0..batch.num_rows() {
                let metadata = parse_metadata(metadata_column.value(row))?;
                if filter.matches(&metadata) {
                    ids.push(id_column.value(row).to_string());
                }
            }
        }
        Ok(ids)
    }
}

#[async_trait]
impl VectorBackend for LanceBackend {
    #[inline]
    fn name(&self) -> &str {
        &self.table_name
    }

    #[inline]
    async fn insert(&self, records: &[StoredRecord]) -> Result<()> {
        let Some(first) = records.first() else {
            return Ok(());
        };

        // Held for the whole insert so sequence numbers stay unique
        let mut state = self.state.lock().await;

        let table = match self.open_table().await? {
            Some(table) => table,
            None => {
                let table = self.create_table(first.embedding.len()).await?;
                state.dimension = Some(first.embedding.len());
                state.next_seq = Some(0);
                table
            }
        };

        let dimension = match state.dimension {
            Some(dimension) => dimension,
            None => detect_vector_dimension(&table).await?,
        };
        state.dimension = Some(dimension);
        for record in records {
            check_dimension(dimension, record.embedding.len())?;
        }

        let first_seq = match state.next_seq {
            Some(seq) => seq,
            None => Self::scan_next_seq(&table).await?,
        };

        let batch = create_record_batch(records, dimension, first_seq)?;
        let schema = batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(batch)), schema);
        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| AuroraError::Database(format!("Failed to insert records: {}", e)))?;

        state.next_seq = Some(first_seq + records.len() as u64);
        debug!(
            "Stored {} records in '{}'",
            records.len(),
            self.table_name
        );
        Ok(())
    }

    #[inline]
    async fn search(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<ScoredChunk>> {
        let Some(table) = self.open_table().await? else {
            return Ok(Vec::new());
        };

        let known_dimension = self.state.lock().await.dimension;
        if let Some(dimension) = known_dimension {
            check_dimension(dimension, query.len())?;
        }

        if k == 0 {
            return Ok(Vec::new());
        }
        let total = table
            .count_rows(None)
            .await
            .map_err(|e| AuroraError::Database(format!("Failed to count rows: {}", e)))?;

        // Metadata lives in a JSON column, so filtered searches rank the
        // whole table and filter afterwards
        let Some(filter) = filter else {
            // One extra row shows whether the k-th score is tied with rows
            // the nearest-neighbour scan may have returned out of order
            let limit = k.saturating_add(1).min(total);
            let mut candidates = nearest(&table, query, limit).await?;
            if limit < total && tied_at_boundary(&candidates, k) {
                debug!("Score tie at rank {}, ranking all {} rows", k, total);
                candidates = nearest(&table, query, total).await?;
            }
            return Ok(rank(candidates, k));
        };

        let mut candidates = nearest(&table, query, total).await?;
        candidates.retain(|c| filter.matches(c.hit.chunk.metadata()));

        Ok(rank(candidates, k))
    }

    #[inline]
    async fn delete(&self, filter: &MetadataFilter) -> Result<u64> {
        let Some(table) = self.open_table().await? else {
            return Ok(0);
        };

        let ids = Self::matching_ids(&table, filter).await?;
        if ids.is_empty() {
            return Ok(0);
        }

        let predicate = format!(
            "id IN ({})",
            ids.iter()
                .map(|id| format!("'{}'", id.replace('\'', "''")))
                .join(", ")
        );

        table
            .delete(&predicate)
            .await
            .map_err(|e| AuroraError::Database(format!("Failed to delete records: {}", e)))?;

        Ok(ids.len() as u64)
    }

    #[inline]
    async fn count(&self) -> Result<u64> {
        let Some(table) = self.open_table().await? else {
            return Ok(0);
        };

        let count = table
            .count_rows(None)
            .await
            .map_err(|e| AuroraError::Database(format!("Failed to count rows: {}", e)))?;

        Ok(count as u64)
    }
}

fn create_schema(dimension: usize) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("seq", DataType::UInt64, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, false)),
                dimension as i32,
            ),
            false,
        ),
        Field::new("text", DataType::Utf8, false),
        Field::new("metadata", DataType::Utf8, false),
        Field::new("created_at", DataType::Utf8, false),
    ]))
}

async fn detect_vector_dimension(table: &Table) -> Result<usize> {
    let schema = table
        .schema()
        .await
        .map_err(|e| AuroraError::Database(format!("Failed to get table schema: {}", e)))?;

    schema
        .fields()
        .iter()
        .find(|field| field.name() == "vector")
        .and_then(|field| match field.data_type() {
            DataType::FixedSizeList(_, size) => usize::try_from(*size).ok(),
            _ => None,
        })
        .ok_or_else(|| {
            AuroraError::Database("Could not find vector column or determine dimension".to_string())
        })
}

fn create_record_batch(
    records: &[StoredRecord],
    dimension: usize,
    first_seq: u64,
) -> Result<RecordBatch> {
    let len = records.len();

    let mut ids = Vec::with_capacity(len);
    let mut seqs = Vec::with_capacity(len);
    let mut flat_values = Vec::with_capacity(len * dimension);
    let mut texts = Vec::with_capacity(len);
    let mut metadata = Vec::with_capacity(len);
    let mut created_ats = Vec::with_capacity(len);

    for (seq, record) in (first_seq..).zip(records) {
        ids.push(record.id.as_str());
        seqs.push(seq);
        flat_values.extend_from_slice(&record.embedding);
        texts.push(record.chunk.text());
        metadata.push(serde_json::to_string(record.chunk.metadata()).map_err(|e| {
            AuroraError::Database(format!("Failed to serialize metadata: {}", e))
        })?);
        created_ats.push(record.created_at.as_str());
    }

    let field = Arc::new(Field::new("item", DataType::Float32, false));
    let vector_array = FixedSizeListArray::try_new(
        field,
        dimension as i32,
        Arc::new(Float32Array::from(flat_values)),
        None,
    )
    .map_err(|e| AuroraError::Database(format!("Failed to create vector array: {}", e)))?;

    let arrays: Vec<Arc<dyn Array>> = vec![
        Arc::new(StringArray::from(ids)),
        Arc::new(UInt64Array::from(seqs)),
        Arc::new(vector_array),
        Arc::new(StringArray::from(texts)),
        Arc::new(StringArray::from(metadata)),
        Arc::new(StringArray::from(created_ats)),
    ];

    RecordBatch::try_new(create_schema(dimension), arrays)
        .map_err(|e| AuroraError::Database(format!("Failed to create record batch: {}", e)))
}

/// Run a cosine nearest-neighbour scan for the closest `limit` rows
async fn nearest(table: &Table, query: &[f32], limit: usize) -> Result<Vec<Candidate>> {
    if limit == 0 {
        return Ok(Vec::new());
    }

    let mut results = table
        .vector_search(query)
        .map_err(|e| AuroraError::Database(format!("Failed to create vector search: {}", e)))?
        .column("vector")
        .distance_type(DistanceType::Cosine)
        .limit(limit)
        .execute()
        .await
        .map_err(|e| AuroraError::Database(format!("Failed to execute search: {}", e)))?;

    let mut candidates = Vec::new();
    while let Some(batch) = results
        .try_next()
        .await
        .map_err(|e| AuroraError::Database(format!("Failed to read result stream: {}", e)))?
    {
        candidates.extend(parse_search_batch(&batch)?);
    }
    Ok(candidates)
}

/// True when the k-th best score equals the next one, so the cut at `k`
/// depends on which of the tied rows the scan happened to return
fn tied_at_boundary(candidates: &[Candidate], k: usize) -> bool {
    if k == 0 || candidates.len() <= k {
        return false;
    }
    let mut scores: Vec<f32> = candidates.iter().map(|c| c.hit.score).collect();
    scores.sort_by(|a, b| b.total_cmp(a));
    scores[k - 1].total_cmp(&scores[k]).is_eq()
}

fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<Candidate>> {
    let ids = string_column(batch, "id")?;
    let seqs = u64_column(batch, "seq")?;
    let texts = string_column(batch, "text")?;
    let metadata = string_column(batch, "metadata")?;
    let distances = batch
        .column_by_name("_distance")
        .and_then(|col| col.as_any().downcast_ref::<Float32Array>());

    let mut candidates = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        let distance = distances.map_or(0.0, |d| if d.is_null(row) { 0.0 } else { d.value(row) });

        candidates.push(Candidate {
            seq: seqs.value(row),
            hit: ScoredChunk {
                id: RecordId::from(ids.value(row).to_string()),
                chunk: Chunk::new(texts.value(row), parse_metadata(metadata.value(row))?),
                // Cosine distance is 1 - cosine similarity
                score: 1.0 - distance,
            },
        });
    }
    Ok(candidates)
}

fn parse_metadata(raw: &str) -> Result<Metadata> {
    serde_json::from_str(raw)
        .map_err(|e| AuroraError::Database(format!("Invalid metadata column value: {}", e)))
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .ok_or_else(|| AuroraError::Database(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| AuroraError::Database(format!("Invalid {} column type", name)))
}

fn u64_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a UInt64Array> {
    batch
        .column_by_name(name)
        .ok_or_else(|| AuroraError::Database(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<UInt64Array>()
        .ok_or_else(|| AuroraError::Database(format!("Invalid {} column type", name)))
}
