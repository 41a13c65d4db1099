// Documents module
// Chunk and metadata types, text splitting and file loading

pub mod chunking;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

pub use chunking::{ChunkingConfig, TextSplitter};
pub use loader::{DocumentKind, DocumentLoader};

pub const SOURCE_KEY: &str = "source";
pub const TYPE_KEY: &str = "type";
pub const FILENAME_KEY: &str = "filename";
pub const PAGE_KEY: &str = "page";
pub const ORIGINAL_CHUNKS_KEY: &str = "original_chunks";

pub const TYPE_PDF: &str = "pdf";
pub const TYPE_TEXT: &str = "text";
pub const TYPE_SUMMARY: &str = "summary";
pub const TYPE_MANUAL_ENTRY: &str = "manual_entry";

/// Source marker for knowledge typed in by hand rather than loaded from a file
pub const MANUAL_ENTRY_SOURCE: &str = "manual entry";

/// Scalar metadata value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

/// String-keyed scalar metadata, ordered so serialization is stable
pub type Metadata = BTreeMap<String, MetadataValue>;

impl MetadataValue {
    /// Parse user input: booleans, then integers, then finite floats, else
    /// text. `nan` and `inf` stay text since JSON cannot hold them.
    #[inline]
    pub fn parse_lenient(raw: &str) -> Self {
        if let Ok(value) = raw.parse::<bool>() {
            Self::Bool(value)
        } else if let Ok(value) = raw.parse::<i64>() {
            Self::Integer(value)
        } else if let Some(value) = raw.parse::<f64>().ok().filter(|v| v.is_finite()) {
            Self::Float(value)
        } else {
            Self::Text(raw.to_string())
        }
    }

    /// False only for NaN or infinite floats, which cannot be persisted
    #[inline]
    pub fn is_storable(&self) -> bool {
        match self {
            Self::Float(value) => value.is_finite(),
            _ => true,
        }
    }

    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }
}

impl fmt::Display for MetadataValue {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(value) => write!(f, "{value}"),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
        }
    }
}

impl From<&str> for MetadataValue {
    #[inline]
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for MetadataValue {
    #[inline]
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for MetadataValue {
    #[inline]
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<bool> for MetadataValue {
    #[inline]
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for MetadataValue {
    #[inline]
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

/// A bounded span of text plus its provenance metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    text: String,
    metadata: Metadata,
}

impl Chunk {
    #[inline]
    pub fn new(text: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            text: text.into(),
            metadata,
        }
    }

    #[inline]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[inline]
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    #[inline]
    pub fn get(&self, key: &str) -> Option<&MetadataValue> {
        self.metadata.get(key)
    }

    /// Name shown to users when citing this chunk: the `filename` key, else
    /// the base name of `source`, else "Unknown"
    #[inline]
    pub fn source_name(&self) -> String {
        if let Some(filename) = self.get(FILENAME_KEY) {
            return filename.to_string();
        }

        match self.get(SOURCE_KEY) {
            Some(MetadataValue::Text(source)) => Path::new(source)
                .file_name()
                .map_or_else(|| source.clone(), |name| name.to_string_lossy().into_owned()),
            Some(other) => other.to_string(),
            None => "Unknown".to_string(),
        }
    }
}
