// Shared fixtures for integration tests

use aurora::config::Config;
use aurora::memory::{StoreBackend, VectorMemory};
use aurora::models::{ChatMessage, ChatModel, ChatRequest, Embedder};
use aurora::orchestrator::Aurora;
use aurora::{AuroraError, Result};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

const DIMENSION: usize = 32;

/// Hashes each word into one of a fixed number of slots
#[derive(Debug, Default)]
pub struct WordEmbedder;

impl Embedder for WordEmbedder {
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| word_vector(text)).collect())
    }
}

fn word_vector(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0; DIMENSION];
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let slot = word
            .to_lowercase()
            .bytes()
            .fold(5381_usize, |h, b| h.wrapping_mul(33) ^ usize::from(b));
        vector[slot % DIMENSION] += 1.0;
    }
    if vector.iter().all(|v| *v == 0.0) {
        vector[0] = 1.0;
    }
    vector
}

/// Replays queued replies, then echoes the call number. Every request is kept.
#[derive(Default)]
pub struct RecordingChatModel {
    replies: Mutex<VecDeque<ChatMessage>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl RecordingChatModel {
    pub fn with_replies(replies: Vec<ChatMessage>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::default(),
        }
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    /// Text of the last user message sent on the n-th request
    pub fn prompt(&self, n: usize) -> String {
        self.requests()
            .get(n)
            .and_then(|request| request.messages.last())
            .map(|message| message.content.clone())
            .unwrap_or_default()
    }
}

impl ChatModel for RecordingChatModel {
    fn chat(&self, request: &ChatRequest) -> Result<ChatMessage> {
        let call = {
            let mut requests = self.requests.lock().expect("requests lock");
            requests.push(request.clone());
            requests.len()
        };
        let next = self
            .replies
            .lock()
            .map_err(|_| AuroraError::Model("reply queue poisoned".to_string()))?
            .pop_front();
        Ok(next.unwrap_or_else(|| ChatMessage::assistant(format!("reply {call}"))))
    }
}

/// Config rooted in a fresh temp dir, with small chunks so short files split
pub fn test_config(backend: StoreBackend) -> (Config, TempDir) {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut config = Config::load(temp_dir.path()).expect("should load default config");
    config.store.backend = backend;
    config.store.collection = "integration".to_string();
    config.chunking.chunk_size = 120;
    config.chunking.chunk_overlap = 0;
    config.retrieval.top_k = 3;
    (config, temp_dir)
}

pub async fn open_memory(config: &Config) -> Arc<VectorMemory> {
    let memory = VectorMemory::open(config, Arc::new(WordEmbedder))
        .await
        .expect("should open vector memory");
    Arc::new(memory)
}

pub fn assistant(
    config: &Config,
    memory: &Arc<VectorMemory>,
    model: &Arc<RecordingChatModel>,
) -> Aurora {
    Aurora::new(
        config,
        Arc::clone(memory),
        Arc::clone(model) as Arc<dyn ChatModel>,
    )
}
