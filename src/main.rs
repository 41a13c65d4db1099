use anyhow::Result;
use aurora::commands::{
    add_knowledge, ask_question, chat, delete_knowledge, extract_insights, ingest_document,
    parse_key_value, search_knowledge, show_stats, summarize_document,
};
use aurora::config::{Config, run_interactive_config, show_config};
use aurora::documents::{Metadata, MetadataValue};
use aurora::memory::MetadataFilter;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "aurora")]
#[command(about = "A personal knowledge assistant that chats with your documents")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure Ollama connection and knowledge base settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Load a PDF or text file into the knowledge base
    Ingest {
        /// Path to a .pdf or .txt file
        path: PathBuf,
    },
    /// Summarize a document and store the summary
    Summarize { path: PathBuf },
    /// Extract key insights from a document
    Insights { path: PathBuf },
    /// Add a piece of knowledge by hand
    Add {
        /// Text to remember
        text: String,
        /// Metadata attached to the entry, e.g. --meta topic=rust
        #[arg(long = "meta", value_parser = parse_key_value)]
        meta: Vec<(String, MetadataValue)>,
    },
    /// Search the knowledge base
    Search {
        query: String,
        /// Number of results (defaults to the configured top-k)
        #[arg(short = 'k', long = "top-k")]
        k: Option<usize>,
        /// Only return records whose metadata matches, e.g. --filter type=pdf
        #[arg(long = "filter", value_parser = parse_key_value)]
        filter: Vec<(String, MetadataValue)>,
    },
    /// Answer a question from the knowledge base
    Ask { query: String },
    /// Chat with AURORA; starts an interactive session when no message is given
    Chat { message: Option<String> },
    /// Show knowledge base statistics
    Stats,
    /// Delete records by metadata
    Delete {
        /// Metadata pairs that must all match, e.g. --filter source=notes.txt
        #[arg(long = "filter", value_parser = parse_key_value, required = true)]
        filter: Vec<(String, MetadataValue)>,
    },
}

fn to_metadata(pairs: Vec<(String, MetadataValue)>) -> Metadata {
    pairs.into_iter().collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config()?;
            } else {
                run_interactive_config()?;
            }
        }
        Commands::Ingest { path } => {
            ingest_document(&Config::load_default()?, &path).await?;
        }
        Commands::Summarize { path } => {
            summarize_document(&Config::load_default()?, &path).await?;
        }
        Commands::Insights { path } => {
            extract_insights(&Config::load_default()?, &path).await?;
        }
        Commands::Add { text, meta } => {
            add_knowledge(&Config::load_default()?, &text, to_metadata(meta)).await?;
        }
        Commands::Search { query, k, filter } => {
            let filter = MetadataFilter::from(to_metadata(filter));
            search_knowledge(&Config::load_default()?, &query, k, &filter).await?;
        }
        Commands::Ask { query } => {
            ask_question(&Config::load_default()?, &query).await?;
        }
        Commands::Chat { message } => {
            chat(&Config::load_default()?, message.as_deref()).await?;
        }
        Commands::Stats => {
            show_stats(&Config::load_default()?).await?;
        }
        Commands::Delete { filter } => {
            let filter = MetadataFilter::from(to_metadata(filter));
            delete_knowledge(&Config::load_default()?, &filter).await?;
        }
    }

    Ok(())
}
