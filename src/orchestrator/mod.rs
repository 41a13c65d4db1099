// Orchestrator module
// Single entry point that routes chat through a bounded tool-calling loop


pub mod tools;

use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::{AuroraError, Result};
use crate::agents::prompts::ORCHESTRATOR_SYSTEM_PROMPT;
use crate::agents::{IngestReport, KnowledgeButler, ReadingCompanion};
use crate::config::Config;
use crate::documents::Metadata;
use crate::memory::VectorMemory;
use crate::models::{ChatMessage, ChatModel, ChatRequest, Embedder, OllamaClient, ToolCall};

pub use tools::{KnowledgeTool, ToolCallError};

/// Model rounds that may request tools before a final tool-free call
pub const MAX_TOOL_ROUNDS: usize = 4;

pub const APOLOGY_MESSAGE: &str =
    "I'm sorry, something went wrong while handling that request. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnRole {
    User,
    Assistant,
}

/// One message of a conversation kept by the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub content: String,
}

impl ConversationTurn {
    #[inline]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
        }
    }

    #[inline]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
        }
    }
}

impl From<&ConversationTurn> for ChatMessage {
    #[inline]
    fn from(turn: &ConversationTurn) -> Self {
        match turn.role {
            TurnRole::User => Self::user(turn.content.clone()),
            TurnRole::Assistant => Self::assistant(turn.content.clone()),
        }
    }
}

/// AURORA: owns the shared memory handle and both agents
pub struct Aurora {
    memory: Arc<VectorMemory>,
    knowledge: KnowledgeButler,
    reading: ReadingCompanion,
    model: Arc<dyn ChatModel>,
    temperature: f32,
}

impl Aurora {
    #[inline]
    pub fn new(config: &Config, memory: Arc<VectorMemory>, model: Arc<dyn ChatModel>) -> Self {
        Self {
            knowledge: KnowledgeButler::new(Arc::clone(&memory), Arc::clone(&model), config),
            reading: ReadingCompanion::new(Arc::clone(&memory), Arc::clone(&model), config),
            memory,
            model,
            temperature: config.generation.reasoning_temperature,
        }
    }

    /// Wire up Ollama and the configured vector store
    #[inline]
    pub async fn from_config(config: &Config) -> Result<Self> {
        let client = Arc::new(
            OllamaClient::new(config).map_err(|e| AuroraError::Config(format!("{e:#}")))?,
        );
        let embedder = Arc::clone(&client) as Arc<dyn Embedder>;
        let memory = Arc::new(VectorMemory::open(config, embedder).await?);

        info!(
            "AURORA ready with chat model {} and embedding model {}",
            client.chat_model(),
            client.embedding_model()
        );
        Ok(Self::new(config, memory, client))
    }

    #[inline]
    pub fn memory(&self) -> &Arc<VectorMemory> {
        &self.memory
    }

    #[inline]
    pub fn knowledge(&self) -> &KnowledgeButler {
        &self.knowledge
    }

    /// Answer a message. Never fails: internal errors become
    /// [`APOLOGY_MESSAGE`].
    #[inline]
    pub async fn chat(&self, message: &str) -> String {
        self.chat_with_history(&[], message).await
    }

    /// Like [`Aurora::chat`], replaying earlier turns first
    #[inline]
    pub async fn chat_with_history(&self, history: &[ConversationTurn], message: &str) -> String {
        match self.run_agent(history, message).await {
            Ok(reply) => reply,
            Err(e) => {
                error!("Chat failed: {}", e);
                APOLOGY_MESSAGE.to_string()
            }
        }
    }

    #[inline]
    pub async fn ingest_document(&self, path: &Path) -> Result<IngestReport> {
        self.reading.ingest(path).await
    }

    #[inline]
    pub async fn summarize_document(&self, path: &Path) -> Result<String> {
        self.reading.summarize(path).await
    }

    #[inline]
    pub async fn extract_insights(&self, path: &Path) -> Result<String> {
        self.reading.extract_insights(path).await
    }

    #[inline]
    pub async fn add_knowledge(&self, text: &str, metadata: Metadata) -> Result<String> {
        self.knowledge.add_knowledge(text, metadata).await
    }

    async fn run_agent(&self, history: &[ConversationTurn], message: &str) -> Result<String> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(ORCHESTRATOR_SYSTEM_PROMPT));
        messages.extend(history.iter().map(ChatMessage::from));
        messages.push(ChatMessage::user(message));

        let tools = KnowledgeTool::definitions();

        for round in 1..=MAX_TOOL_ROUNDS {
            let request =
                ChatRequest::new(messages.clone(), self.temperature).with_tools(tools.clone());
            let reply = self.model.chat(&request)?;

            if reply.tool_calls.is_empty() {
                debug!("Model answered directly in round {}", round);
                return Ok(reply.content);
            }

            debug!(
                "Round {}: model requested {} tool calls",
                round,
                reply.tool_calls.len()
            );
            let calls = reply.tool_calls.clone();
            messages.push(reply);

            for call in &calls {
                let output = self.execute_tool(call).await?;
                messages.push(ChatMessage::tool_result(call.name.clone(), output));
            }
        }

        warn!(
            "Tool round limit ({}) reached, requesting final answer",
            MAX_TOOL_ROUNDS
        );
        let reply = self
            .model
            .chat(&ChatRequest::new(messages, self.temperature))?;
        Ok(reply.content)
    }

    async fn execute_tool(&self, call: &ToolCall) -> Result<String> {
        match KnowledgeTool::from_call(call) {
            Ok(KnowledgeTool::SearchKnowledge { query }) => {
                info!("Tool call: {} ({:?})", tools::SEARCH_KNOWLEDGE, query);
                self.knowledge.answer(&query).await
            }
            Ok(KnowledgeTool::GetKnowledgeStats) => {
                info!("Tool call: {}", tools::GET_KNOWLEDGE_STATS);
                self.knowledge.stats_text().await
            }
            Err(e) => {
                warn!("Rejected tool call {}: {}", call.name, e);
                Ok(format!("Error: {e}"))
            }
        }
    }
}
