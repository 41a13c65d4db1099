use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AuroraError>;

#[derive(Error, Debug)]
pub enum AuroraError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Unsupported file type: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    #[error("Document error: {0}")]
    Document(String),

    #[error("Document produced no content: {}", .0.display())]
    EmptyDocument(PathBuf),

    #[error("Invalid metadata filter: {0}")]
    InvalidFilter(String),

    #[error("Invalid metadata: {0}")]
    InvalidMetadata(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod agents;
pub mod commands;
pub mod config;
pub mod documents;
pub mod memory;
pub mod models;
pub mod orchestrator;

#[cfg(test)]
pub(crate) mod test_support;
