use anyhow::{Context, Result, bail};
use console::style;
use dialoguer::Input;
use indicatif::{ProgressBar, ProgressStyle};
use itertools::Itertools;
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::Config;
use crate::documents::{Chunk, Metadata, MetadataValue};
use crate::memory::MetadataFilter;
use crate::models::OllamaClient;
use crate::orchestrator::{Aurora, ConversationTurn};

/// Characters of chunk text shown per search result
const PREVIEW_CHARS: usize = 200;

/// Parse a `key=value` argument. Values are read leniently as bool, integer,
/// float, else text.
#[inline]
pub fn parse_key_value(raw: &str) -> Result<(String, MetadataValue), String> {
    let Some((key, value)) = raw.split_once('=') else {
        return Err(format!("expected key=value, got '{raw}'"));
    };
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing key in '{raw}'"));
    }
    Ok((key.to_string(), MetadataValue::parse_lenient(value.trim())))
}

/// Load a document into the knowledge base
#[inline]
pub async fn ingest_document(config: &Config, path: &Path) -> Result<()> {
    let aurora = connect(config).await?;
    let report = with_spinner(
        format!("Ingesting {}", path.display()),
        aurora.ingest_document(path),
    )
    .await
    .with_context(|| format!("Failed to ingest {}", path.display()))?;

    println!("{report}");
    Ok(())
}

/// Summarize a document and store the summary
#[inline]
pub async fn summarize_document(config: &Config, path: &Path) -> Result<()> {
    let aurora = connect(config).await?;
    let summary = with_spinner(
        format!("Summarizing {}", path.display()),
        aurora.summarize_document(path),
    )
    .await
    .with_context(|| format!("Failed to summarize {}", path.display()))?;

    eprintln!("{}", style("Summary").bold().cyan());
    println!("{summary}");
    Ok(())
}

#[inline]
pub async fn extract_insights(config: &Config, path: &Path) -> Result<()> {
    let aurora = connect(config).await?;
    let insights = with_spinner(
        format!("Reading {}", path.display()),
        aurora.extract_insights(path),
    )
    .await
    .with_context(|| format!("Failed to extract insights from {}", path.display()))?;

    eprintln!("{}", style("Key insights").bold().cyan());
    println!("{insights}");
    Ok(())
}

/// Store a manual knowledge entry
#[inline]
pub async fn add_knowledge(config: &Config, text: &str, metadata: Metadata) -> Result<()> {
    if text.trim().is_empty() {
        bail!("Knowledge text cannot be empty");
    }

    let aurora = connect(config).await?;
    let confirmation = aurora
        .add_knowledge(text, metadata)
        .await
        .context("Failed to add knowledge")?;

    println!("{confirmation}");
    Ok(())
}

/// Print the closest stored chunks for a query
#[inline]
pub async fn search_knowledge(
    config: &Config,
    query: &str,
    k: Option<usize>,
    filter: &MetadataFilter,
) -> Result<()> {
    let k = k.unwrap_or(config.retrieval.top_k);
    let aurora = connect(config).await?;
    let memory = aurora.memory();

    if filter.is_empty() {
        let results = memory
            .search_with_score(query, k)
            .await
            .context("Search failed")?;
        if results.is_empty() {
            println!("No matching knowledge found.");
            return Ok(());
        }

        for (rank, result) in results.iter().enumerate() {
            println!(
                "{}. [{:.3}] {}",
                rank + 1,
                result.score,
                style(result.chunk.source_name()).bold()
            );
            println!("   {}", preview(&result.chunk));
        }
    } else {
        let results = memory
            .search(query, k, Some(filter))
            .await
            .context("Search failed")?;
        if results.is_empty() {
            println!("No knowledge matching {filter} found.");
            return Ok(());
        }

        for (rank, chunk) in results.iter().enumerate() {
            println!("{}. {}", rank + 1, style(chunk.source_name()).bold());
            println!("   {}", preview(chunk));
        }
    }

    Ok(())
}

/// Answer a question from the knowledge base without the tool loop
#[inline]
pub async fn ask_question(config: &Config, query: &str) -> Result<()> {
    let aurora = connect(config).await?;
    let answer = with_spinner("Thinking".to_string(), aurora.knowledge().answer(query))
        .await
        .context("Failed to answer question")?;

    println!("{answer}");
    Ok(())
}

/// One-shot chat, or an interactive session when no message is given
#[inline]
pub async fn chat(config: &Config, message: Option<&str>) -> Result<()> {
    let aurora = connect(config).await?;

    if let Some(message) = message {
        let reply = with_spinner("Thinking".to_string(), aurora.chat(message)).await;
        println!("{reply}");
        return Ok(());
    }

    if let Err(e) = OllamaClient::new(config).and_then(|client| client.health_check()) {
        warn!("Ollama is not ready: {:#}", e);
        eprintln!(
            "{} Ollama at {}:{} is not ready, replies may fail: {:#}",
            style("Warning:").yellow().bold(),
            config.ollama.host,
            config.ollama.port,
            e
        );
    }

    eprintln!("{}", style("🌟 AURORA").bold().cyan());
    eprintln!("Ask about your documents. Type 'exit' to quit.");
    eprintln!();

    let mut history: Vec<ConversationTurn> = Vec::new();
    loop {
        let line: String = Input::new()
            .with_prompt("You")
            .allow_empty(true)
            .interact_text()?;
        let message = line.trim();

        if message.is_empty() {
            continue;
        }
        if message.eq_ignore_ascii_case("exit") {
            break;
        }

        let reply = with_spinner(
            "Thinking".to_string(),
            aurora.chat_with_history(&history, message),
        )
        .await;
        println!("{} {}", style("AURORA:").bold().green(), reply);
        println!();

        history.push(ConversationTurn::user(message));
        history.push(ConversationTurn::assistant(reply));
    }

    info!("Chat session ended after {} turns", history.len() / 2);
    Ok(())
}

#[inline]
pub async fn show_stats(config: &Config) -> Result<()> {
    let aurora = connect(config).await?;
    let stats = aurora
        .memory()
        .stats()
        .await
        .context("Failed to read knowledge base statistics")?;

    eprintln!("{}", style("📚 Knowledge Base").bold().cyan());
    println!("Collection: {}", stats.name);
    println!("Documents: {}", stats.count);
    println!();

    eprintln!("{}", style("🤖 Ollama").bold().cyan());
    match OllamaClient::new(config) {
        Ok(client) => match client.health_check() {
            Ok(()) => {
                println!(
                    "   ✅ Connected ({}:{})",
                    config.ollama.host, config.ollama.port
                );
                println!("   🔢 Embedding model: {}", client.embedding_model());
                println!("   💬 Chat model: {}", client.chat_model());
            }
            Err(e) => {
                println!("   ⚠️  Connected but unhealthy - {:#}", e);
            }
        },
        Err(e) => {
            println!("   ❌ Failed to connect - {:#}", e);
        }
    }
    Ok(())
}

/// Remove every record whose metadata matches all filter pairs
#[inline]
pub async fn delete_knowledge(config: &Config, filter: &MetadataFilter) -> Result<()> {
    let aurora = connect(config).await?;
    let removed = aurora
        .memory()
        .delete_by_metadata(filter)
        .await
        .with_context(|| format!("Failed to delete records matching {filter}"))?;

    println!("Deleted {removed} records matching {filter}");
    Ok(())
}

async fn connect(config: &Config) -> Result<Aurora> {
    Aurora::from_config(config)
        .await
        .context("Failed to initialize AURORA")
}

async fn with_spinner<F: Future>(message: String, task: F) -> F::Output {
    let bar = if console::user_attended_stderr() {
        let bar = ProgressBar::new_spinner().with_style(
            ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.enable_steady_tick(Duration::from_millis(100));
        bar
    } else {
        ProgressBar::hidden()
    };
    bar.set_message(message);

    let output = task.await;
    bar.finish_and_clear();
    output
}

fn preview(chunk: &Chunk) -> String {
    let text = chunk.text().split_whitespace().join(" ");
    if text.chars().count() > PREVIEW_CHARS {
        let cut: String = text.chars().take(PREVIEW_CHARS).collect();
        format!("{cut}...")
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_value_parsing() {
        assert_eq!(
            parse_key_value("topic=rust"),
            Ok(("topic".to_string(), MetadataValue::Text("rust".to_string())))
        );
        assert_eq!(
            parse_key_value(" page = 3 "),
            Ok(("page".to_string(), MetadataValue::Integer(3)))
        );
        assert_eq!(
            parse_key_value("url=http://a/b?c=d"),
            Ok((
                "url".to_string(),
                MetadataValue::Text("http://a/b?c=d".to_string())
            ))
        );
        assert!(parse_key_value("novalue").is_err());
        assert!(parse_key_value("=3").is_err());
    }

    #[test]
    fn preview_truncates_long_text() {
        let chunk = Chunk::new("word ".repeat(100), Metadata::new());
        let shown = preview(&chunk);
        assert!(shown.ends_with("..."));
        assert_eq!(shown.chars().count(), PREVIEW_CHARS + 3);

        let short = Chunk::new("a\n\nshort   note", Metadata::new());
        assert_eq!(preview(&short), "a short note");
    }
}
