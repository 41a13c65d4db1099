//! Tools the chat model may call

use serde_json::{Value, json};
use thiserror::Error;

use crate::models::{ToolCall, ToolSpec};

pub const SEARCH_KNOWLEDGE: &str = "search_knowledge";
pub const GET_KNOWLEDGE_STATS: &str = "get_knowledge_stats";

/// Errors in a model-issued tool call. These are reported back to the
/// model as tool output rather than failing the conversation.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ToolCallError {
    #[error("Tool not found: {name}")]
    ToolNotFound { name: String },

    #[error("Invalid tool parameters for {tool}: {message}")]
    InvalidToolParameters { tool: String, message: String },
}

/// The fixed tool registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KnowledgeTool {
    SearchKnowledge { query: String },
    GetKnowledgeStats,
}

impl KnowledgeTool {
    /// Specs offered to the model on every tool round
    #[inline]
    pub fn definitions() -> Vec<ToolSpec> {
        vec![
            ToolSpec {
                name: SEARCH_KNOWLEDGE.to_string(),
                description: "Search AURORA's knowledge base for information. Input should be a natural language query.".to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "Natural language question or search terms"
                        }
                    },
                    "required": ["query"]
                }),
            },
            ToolSpec {
                name: GET_KNOWLEDGE_STATS.to_string(),
                description: "Get statistics about the knowledge base.".to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {}
                }),
            },
        ]
    }

    /// Parse a model tool call. Names match case-insensitively and ignore
    /// underscores, so `SearchKnowledge` and `search_knowledge` are the same.
    #[inline]
    pub fn from_call(call: &ToolCall) -> Result<Self, ToolCallError> {
        let normalized: String = call
            .name
            .chars()
            .filter(|c| *c != '_')
            .collect::<String>()
            .to_ascii_lowercase();

        match normalized.as_str() {
            "searchknowledge" => {
                let query = query_argument(&call.arguments).ok_or_else(|| {
                    ToolCallError::InvalidToolParameters {
                        tool: SEARCH_KNOWLEDGE.to_string(),
                        message: "Missing required parameter: query".to_string(),
                    }
                })?;
                Ok(Self::SearchKnowledge { query })
            }
            "getknowledgestats" => Ok(Self::GetKnowledgeStats),
            _ => Err(ToolCallError::ToolNotFound {
                name: call.name.clone(),
            }),
        }
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        match self {
            Self::SearchKnowledge { .. } => SEARCH_KNOWLEDGE,
            Self::GetKnowledgeStats => GET_KNOWLEDGE_STATS,
        }
    }
}

/// Non-blank `query` (or `input`) field, or a bare string argument
fn query_argument(arguments: &Value) -> Option<String> {
    let raw = match arguments {
        Value::String(query) => Some(query.as_str()),
        Value::Object(map) => map
            .get("query")
            .or_else(|| map.get("input"))
            .and_then(Value::as_str),
        _ => None,
    }?;

    let query = raw.trim();
    (!query.is_empty()).then(|| query.to_string())
}
