// Deterministic stand-ins for the model capabilities

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

use crate::memory::{FileBackend, VectorMemory};
use crate::models::{ChatMessage, ChatModel, ChatRequest, Embedder};
use crate::{AuroraError, Result};

const FAKE_DIMENSION: usize = 64;

/// Bag-of-words embedder: each lowercase word bumps one hashed slot
#[derive(Debug, Default)]
pub(crate) struct FakeEmbedder {
    fail: bool,
    calls: AtomicUsize,
}

impl FakeEmbedder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn vector_for(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; FAKE_DIMENSION];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let hash = word
                .to_lowercase()
                .bytes()
                .fold(0xcbf2_9ce4_8422_2325_u64, |h, b| {
                    (h ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3)
                });
            vector[(hash % FAKE_DIMENSION as u64) as usize] += 1.0;
        }
        if vector.iter().all(|v| *v == 0.0) {
            vector[FAKE_DIMENSION - 1] = 1.0;
        }
        vector
    }
}

impl Embedder for FakeEmbedder {
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(AuroraError::Model("embedding service unavailable".to_string()));
        }
        Ok(texts.iter().map(|t| Self::vector_for(t)).collect())
    }
}

enum Scripted {
    Reply(ChatMessage),
    Fail(String),
}

/// Chat model that replays queued replies and records every request.
/// Once the queue is empty it answers `reply <n>` for the n-th call.
#[derive(Default)]
pub(crate) struct ScriptedChatModel {
    script: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedChatModel {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_replies(replies: Vec<ChatMessage>) -> Self {
        let model = Self::new();
        for reply in replies {
            model.push_reply(reply);
        }
        model
    }

    pub(crate) fn push_reply(&self, reply: ChatMessage) {
        self.script
            .lock()
            .expect("script lock")
            .push_back(Scripted::Reply(reply));
    }

    pub(crate) fn push_failure(&self, message: &str) {
        self.script
            .lock()
            .expect("script lock")
            .push_back(Scripted::Fail(message.to_string()));
    }

    pub(crate) fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    pub(crate) fn call_count(&self) -> usize {
        self.requests.lock().expect("requests lock").len()
    }
}

impl ChatModel for ScriptedChatModel {
    fn chat(&self, request: &ChatRequest) -> Result<ChatMessage> {
        let call = {
            let mut requests = self.requests.lock().expect("requests lock");
            requests.push(request.clone());
            requests.len()
        };

        let next = self.script.lock().expect("script lock").pop_front();
        match next {
            Some(Scripted::Reply(reply)) => Ok(reply),
            Some(Scripted::Fail(message)) => Err(AuroraError::Model(message)),
            None => Ok(ChatMessage::assistant(format!("reply {call}"))),
        }
    }
}

/// File-backed memory in a fresh temp dir
pub(crate) fn file_memory(embedder: Arc<dyn Embedder>) -> (Arc<VectorMemory>, TempDir) {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let backend = FileBackend::open(temp_dir.path(), "test_memory").expect("should open backend");
    (
        Arc::new(VectorMemory::new(Box::new(backend), embedder)),
        temp_dir,
    )
}
