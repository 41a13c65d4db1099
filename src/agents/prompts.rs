// Prompt templates sent to the chat model

pub const ORCHESTRATOR_SYSTEM_PROMPT: &str = "You are AURORA (Advanced Unified Reasoning & Organisation Resource Agent), \
a personal AI assistant that helps manage knowledge, documents, and information.

You have access to a knowledge base where information is stored and can be retrieved. \
When users ask questions, search the knowledge base first. Use the statistics tool when \
they ask how much is stored.

Be helpful, concise, and intelligent in your responses.";

#[inline]
pub fn knowledge_answer(context: &str, query: &str) -> String {
    format!(
        "You are AURORA's Knowledge Butler. Based on the following context from my knowledge base, answer the query.

Context:
{context}

Query: {query}

Provide a clear, concise answer. If the context doesn't fully answer the query, say so and provide what information you can."
    )
}

/// Map step of map-reduce summarization
#[inline]
pub fn summarize_passage(text: &str) -> String {
    format!(
        "Write a concise summary of the following:


\"{text}\"


CONCISE SUMMARY:"
    )
}

/// Collapse and reduce steps: merge partial summaries into one
#[inline]
pub fn combine_summaries(summaries: &[String]) -> String {
    format!(
        "The following are summaries of consecutive parts of one document:


\"{}\"


Combine them into a single concise summary of the whole document.

CONCISE SUMMARY:",
        summaries.join("\n\n")
    )
}

#[inline]
pub fn extract_insights(summary: &str) -> String {
    format!(
        "Based on this document summary, extract 3-5 key insights or takeaways:

Summary:
{summary}

Provide insights as a numbered list."
    )
}
