
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, info};

use super::chunking::{ChunkingConfig, TextSplitter};
use super::{Chunk, FILENAME_KEY, Metadata, PAGE_KEY, SOURCE_KEY, TYPE_KEY, TYPE_PDF, TYPE_TEXT};
use crate::{AuroraError, Result};

/// pdf-extract separates pages with form feeds
const PAGE_BREAK: char = '\x0c';

/// File formats the loader understands, chosen by extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Text,
}

impl DocumentKind {
    /// Fails with `UnsupportedFormat` for anything but `.pdf` and `.txt`
    #[inline]
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase());

        match extension.as_deref() {
            Some("pdf") => Ok(Self::Pdf),
            Some("txt") => Ok(Self::Text),
            _ => Err(AuroraError::UnsupportedFormat(path.to_path_buf())),
        }
    }

    #[inline]
    pub fn type_tag(self) -> &'static str {
        match self {
            Self::Pdf => TYPE_PDF,
            Self::Text => TYPE_TEXT,
        }
    }
}

/// Turns files into metadata-tagged chunks
#[derive(Debug, Clone)]
pub struct DocumentLoader {
    splitter: TextSplitter,
}

impl DocumentLoader {
    #[inline]
    pub fn new(config: ChunkingConfig) -> Self {
        Self {
            splitter: TextSplitter::new(config),
        }
    }

    /// Load and chunk a `.pdf` or `.txt` file. Every chunk carries the
    /// file's `source`, `type` and `filename`.
    #[inline]
    pub fn load(&self, path: &Path) -> Result<Vec<Chunk>> {
        let kind = DocumentKind::from_path(path)?;
        let metadata = file_metadata(path, kind);

        debug!("Loading {:?} document from {}", kind, path.display());

        let chunks = match kind {
            DocumentKind::Pdf => self.load_pdf(path, metadata)?,
            DocumentKind::Text => self.load_text(path, &metadata)?,
        };

        info!("Loaded {} chunks from {}", chunks.len(), path.display());
        Ok(chunks)
    }

    /// Chunk raw text with caller-provided metadata
    #[inline]
    pub fn split_text(&self, text: &str, metadata: &Metadata) -> Vec<Chunk> {
        self.splitter.split(text, metadata)
    }

    fn load_text(&self, path: &Path, metadata: &Metadata) -> Result<Vec<Chunk>> {
        let content = fs::read_to_string(path).map_err(|e| {
            if e.kind() == ErrorKind::InvalidData {
                AuroraError::Document(format!("{} is not valid UTF-8 text", path.display()))
            } else {
                AuroraError::Document(format!("Failed to read {}: {}", path.display(), e))
            }
        })?;

        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        Ok(self.splitter.split(&content, metadata))
    }

    fn load_pdf(&self, path: &Path, metadata: Metadata) -> Result<Vec<Chunk>> {
        let text = pdf_extract::extract_text(path).map_err(|e| {
            AuroraError::Document(format!(
                "Failed to extract PDF text from {}: {}",
                path.display(),
                e
            ))
        })?;

        Ok(self.chunk_pages(&text, metadata))
    }

    /// Chunk each page separately, tagging chunks with a 1-based page number.
    /// Blank pages are skipped.
    fn chunk_pages(&self, text: &str, metadata: Metadata) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        let mut page_metadata = metadata;

        for (index, page) in text.split(PAGE_BREAK).enumerate() {
            if page.trim().is_empty() {
                continue;
            }
            page_metadata.insert(PAGE_KEY.to_string(), ((index + 1) as i64).into());
            chunks.extend(self.splitter.split(page, &page_metadata));
        }

        chunks
    }
}

fn file_metadata(path: &Path, kind: DocumentKind) -> Metadata {
    let filename = path
        .file_name()
        .map_or_else(String::new, |name| name.to_string_lossy().into_owned());

    let mut metadata = Metadata::new();
    metadata.insert(SOURCE_KEY.to_string(), path.display().to_string().into());
    metadata.insert(TYPE_KEY.to_string(), kind.type_tag().into());
    metadata.insert(FILENAME_KEY.to_string(), filename.into());
    metadata
}
