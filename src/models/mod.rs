// Models module
// Embedding and chat capabilities, and the Ollama client that provides both

pub mod ollama;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{AuroraError, Result};

pub use ollama::OllamaClient;

/// Turns text into embedding vectors
pub trait Embedder: Send + Sync {
    /// One vector per input, in input order
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    #[inline]
    fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(&[text.to_string()])?
            .into_iter()
            .next()
            .ok_or_else(|| AuroraError::Model("Embedder returned no vector for query".to_string()))
    }
}

/// A chat-completion model with optional tool calling
pub trait ChatModel: Send + Sync {
    fn chat(&self, request: &ChatRequest) -> Result<ChatMessage>;

    /// Single-turn completion without tools
    #[inline]
    fn complete(&self, prompt: &str, temperature: f32) -> Result<String> {
        let request = ChatRequest::new(vec![ChatMessage::user(prompt)], temperature);
        Ok(self.chat(&request)?.content)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool invocation requested by the model
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub name: String,
    pub arguments: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    /// Set on tool results so the model can match them to its call
    pub tool_name: Option<String>,
}

impl ChatMessage {
    #[inline]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_name: None,
        }
    }

    #[inline]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    #[inline]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    #[inline]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    #[inline]
    pub fn tool_result(tool_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_name: Some(tool_name.into()),
            ..Self::new(Role::Tool, content)
        }
    }

    #[inline]
    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCall>) -> Self {
        self.tool_calls = tool_calls;
        self
    }
}

/// Function-style tool description offered to the model
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments object
    pub parameters: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub tools: Vec<ToolSpec>,
}

impl ChatRequest {
    #[inline]
    pub fn new(messages: Vec<ChatMessage>, temperature: f32) -> Self {
        Self {
            messages,
            temperature,
            tools: Vec::new(),
        }
    }

    #[inline]
    pub fn with_tools(mut self, tools: Vec<ToolSpec>) -> Self {
        self.tools = tools;
        self
    }
}
