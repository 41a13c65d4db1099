use super::*;
use crate::documents::{MetadataValue, SOURCE_KEY};
use tempfile::TempDir;

fn record(text: &str, source: &str, vector: Vec<f32>) -> StoredRecord {
    let mut metadata = Metadata::new();
    metadata.insert(SOURCE_KEY.to_string(), source.into());
    StoredRecord {
        id: RecordId::generate(),
        chunk: Chunk::new(text, metadata),
        embedding: vector,
        created_at: "2024-01-01T00:00:00Z".to_string(),
    }
}

async fn open_backend(temp_dir: &TempDir) -> LanceBackend {
    LanceBackend::open(temp_dir.path(), "test_collection")
        .await
        .expect("should open lance backend")
}

async fn nearest_texts(backend: &LanceBackend, k: usize) -> Vec<String> {
    backend
        .search(&[0.6, 0.8], k, None)
        .await
        .expect("should search")
        .into_iter()
        .map(|hit| hit.chunk.text().to_string())
        .collect()
}

#[tokio::test]
async fn empty_collection_has_no_table() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let backend = open_backend(&temp_dir).await;

    assert_eq!(backend.name(), "test_collection");
    assert_eq!(backend.count().await.expect("should count"), 0);
    assert!(
        backend
            .search(&[1.0, 0.0, 0.0], 3, None)
            .await
            .expect("should search")
            .is_empty()
    );
    assert_eq!(
        backend
            .delete(&MetadataFilter::new().with(SOURCE_KEY, "a.txt"))
            .await
            .expect("should delete"),
        0
    );
}

#[tokio::test]
async fn insert_and_rank_by_cosine_similarity() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let backend = open_backend(&temp_dir).await;

    backend
        .insert(&[
            record("east", "a.txt", vec![1.0, 0.0, 0.0]),
            record("north", "a.txt", vec![0.0, 1.0, 0.0]),
            record("north-east", "b.txt", vec![1.0, 1.0, 0.0]),
        ])
        .await
        .expect("should insert records");

    let hits = backend
        .search(&[1.0, 0.1, 0.0], 2, None)
        .await
        .expect("should search");

    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].chunk.text(), "east");
    assert_eq!(hits[1].chunk.text(), "north-east");
    assert!(hits[0].score >= hits[1].score);
    assert!(hits[0].score > 0.99);
    assert_eq!(
        hits[0].chunk.get(SOURCE_KEY),
        Some(&MetadataValue::Text("a.txt".to_string()))
    );
}

#[tokio::test]
async fn equal_scores_keep_insertion_order() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let backend = open_backend(&temp_dir).await;

    backend
        .insert(&[record("first", "a.txt", vec![0.0, 1.0])])
        .await
        .expect("should insert first");
    backend
        .insert(&[
            record("second", "a.txt", vec![0.0, 1.0]),
            record("third", "a.txt", vec![0.0, 1.0]),
        ])
        .await
        .expect("should insert rest");

    let texts: Vec<String> = backend
        .search(&[0.0, 1.0], 10, None)
        .await
        .expect("should search")
        .into_iter()
        .map(|hit| hit.chunk.text().to_string())
        .collect();

    assert_eq!(texts, vec!["first", "second", "third"]);
}

#[tokio::test]
async fn ties_at_the_cut_are_resolved_by_insertion_order() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let backend = open_backend(&temp_dir).await;

    // Separate inserts land in separate fragments
    for item in 0..30 {
        backend
            .insert(&[record(&format!("item {item}"), "a.txt", vec![0.6, 0.8])])
            .await
            .expect("should insert item");
    }

    assert_eq!(nearest_texts(&backend, 1).await, vec!["item 0"]);
    assert_eq!(
        nearest_texts(&backend, 5).await,
        vec!["item 0", "item 1", "item 2", "item 3", "item 4"]
    );
    assert_eq!(nearest_texts(&backend, 40).await.len(), 30);
}

#[test]
fn boundary_tie_detection() {
    let candidates: Vec<Candidate> = [0.9, 0.5, 0.5, 0.1]
        .into_iter()
        .enumerate()
        .map(|(seq, score)| Candidate {
            seq: seq as u64,
            hit: ScoredChunk {
                id: RecordId::from(format!("id-{seq}")),
                chunk: Chunk::new(format!("chunk {seq}"), Metadata::new()),
                score,
            },
        })
        .collect();

    assert!(!tied_at_boundary(&candidates, 1));
    assert!(tied_at_boundary(&candidates, 2));
    assert!(!tied_at_boundary(&candidates, 3));
    assert!(!tied_at_boundary(&candidates, 4));
    assert!(!tied_at_boundary(&candidates, 0));
}

#[tokio::test]
async fn filtered_search_and_delete() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let backend = open_backend(&temp_dir).await;

    backend
        .insert(&[
            record("alpha", "a.txt", vec![1.0, 0.0]),
            record("beta", "b.txt", vec![0.9, 0.1]),
            record("gamma", "b.txt", vec![0.0, 1.0]),
        ])
        .await
        .expect("should insert records");

    let filter = MetadataFilter::new().with(SOURCE_KEY, "b.txt");
    let hits = backend
        .search(&[1.0, 0.0], 5, Some(&filter))
        .await
        .expect("should search with filter");
    let texts: Vec<&str> = hits.iter().map(|hit| hit.chunk.text()).collect();
    assert_eq!(texts, vec!["beta", "gamma"]);

    let removed = backend.delete(&filter).await.expect("should delete");
    assert_eq!(removed, 2);
    assert_eq!(backend.count().await.expect("should count"), 1);
}

#[tokio::test]
async fn reopened_collection_keeps_records_and_sequence() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    {
        let backend = open_backend(&temp_dir).await;
        backend
            .insert(&[record("old", "a.txt", vec![1.0, 0.0])])
            .await
            .expect("should insert");
    }

    let backend = open_backend(&temp_dir).await;
    assert_eq!(backend.count().await.expect("should count"), 1);

    backend
        .insert(&[record("new", "a.txt", vec![1.0, 0.0])])
        .await
        .expect("should insert after reopen");

    let texts: Vec<String> = backend
        .search(&[1.0, 0.0], 2, None)
        .await
        .expect("should search")
        .into_iter()
        .map(|hit| hit.chunk.text().to_string())
        .collect();
    assert_eq!(texts, vec!["old", "new"]);
}

#[tokio::test]
async fn dimension_mismatch_is_rejected() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let backend = open_backend(&temp_dir).await;

    backend
        .insert(&[record("three", "a.txt", vec![1.0, 0.0, 0.0])])
        .await
        .expect("should insert");

    let insert = backend
        .insert(&[record("two", "a.txt", vec![1.0, 0.0])])
        .await;
    assert!(matches!(insert, Err(AuroraError::Database(_))));

    let search = backend.search(&[1.0, 0.0], 1, None).await;
    assert!(matches!(search, Err(AuroraError::Database(_))));
    assert_eq!(backend.count().await.expect("should count"), 1);
}
