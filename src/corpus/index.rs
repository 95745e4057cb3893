use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::CorpusError;

pub const INDEX_FILE: &str = "index.json";

/// One line of the corpus index. `file_path` is relative to the corpus directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexEntry {
    pub url: String,
    pub file_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cms: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl IndexEntry {
    pub fn resolve(&self, corpus_dir: &Path) -> PathBuf {
        let path = Path::new(&self.file_path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            corpus_dir.join(path)
        }
    }
}

pub fn load_index(corpus_dir: &Path) -> Result<Vec<IndexEntry>, CorpusError> {
    if !corpus_dir.is_dir() {
        return Err(CorpusError::MissingDirectory(corpus_dir.to_path_buf()));
    }
    let path = corpus_dir.join(INDEX_FILE);
    let content = fs::read_to_string(&path).map_err(|source| CorpusError::IndexRead {
        path: path.clone(),
        source,
    })?;
    let entries: Vec<IndexEntry> =
        serde_json::from_str(&content).map_err(|source| CorpusError::IndexParse {
            path: path.clone(),
            source,
        })?;
    info!(action = "loaded", component = "corpus_index", entry_count = entries.len(), file_path = ?path, "Loaded corpus index");
    Ok(entries)
}
