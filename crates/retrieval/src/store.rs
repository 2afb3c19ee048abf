//! Persisted index artifacts: build, atomic publication, and loading.
//!
//! Three artifacts live under one data directory: the fitted model plus the
//! vector matrix (one unit), the document list, and a small metadata record.
//! A build writes each artifact to a temporary file and renames it over the
//! live name, so readers observe either the old artifact or the new one and
//! never a partial write.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use waypost_core::{AppError, AppResult};

use crate::types::{Document, IndexMeta};
use crate::vectorizer::{self, TfidfIndex};

/// Fitted model and matrix, serialized as one unit.
pub const INDEX_FILE: &str = "tfidf_index.json";
/// Document list.
pub const DOCS_FILE: &str = "tfidf_docs.json";
/// Index metadata record.
pub const META_FILE: &str = "tfidf_index_meta.json";

/// Everything a retrieval call needs, loaded as one unit.
#[derive(Debug, Clone)]
pub struct LoadedIndex {
    pub index: TfidfIndex,
    pub documents: Vec<Document>,
    pub meta: IndexMeta,
}

/// Reads and writes the artifact triple under one data directory.
#[derive(Debug, Clone)]
pub struct IndexStore {
    data_dir: PathBuf,
}

impl IndexStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Build a fresh index from texts and metadata and publish it.
    ///
    /// The previous index, if any, is replaced wholesale. Fails when `texts`
    /// is empty or when the metadata list does not line up with it.
    pub fn build(
        &self,
        texts: Vec<String>,
        metadata: Vec<serde_json::Map<String, serde_json::Value>>,
        model_name: Option<&str>,
        tokenizer_version: Option<&str>,
    ) -> AppResult<IndexMeta> {
        if texts.is_empty() {
            return Err(AppError::Retrieval(
                "No texts provided to build index".to_string(),
            ));
        }
        if texts.len() != metadata.len() {
            return Err(AppError::Retrieval(format!(
                "Metadata count {} does not match text count {}",
                metadata.len(),
                texts.len()
            )));
        }

        let index = vectorizer::fit_transform(&texts)?;

        let documents: Vec<Document> = metadata
            .into_iter()
            .zip(texts)
            .map(|(entry, text)| Document::from_parts(entry, text))
            .collect();

        let meta = IndexMeta {
            model_name: model_name.map(|s| s.to_string()),
            tokenizer_version: tokenizer_version.map(|s| s.to_string()),
            document_count: documents.len(),
            built_at: Some(Utc::now()),
        };

        self.publish(&index, &documents, &meta)?;

        tracing::info!(
            documents = documents.len(),
            vocabulary = index.model.vocabulary_len(),
            "Published index to {:?}",
            self.data_dir
        );

        Ok(meta)
    }

    /// Load the artifact triple, or `None` when the index has not been built.
    ///
    /// A missing artifact is the uniform absent case, not an error. Artifacts
    /// that disagree with each other (a torn publish) are also reported as
    /// absent so callers never see a mixed state.
    pub fn load(&self) -> AppResult<Option<LoadedIndex>> {
        let index_path = self.data_dir.join(INDEX_FILE);
        let docs_path = self.data_dir.join(DOCS_FILE);
        if !index_path.exists() || !docs_path.exists() {
            return Ok(None);
        }

        let index: TfidfIndex = serde_json::from_slice(&fs::read(&index_path)?)?;
        let documents: Vec<Document> = serde_json::from_slice(&fs::read(&docs_path)?)?;

        if index.rows.len() != documents.len() {
            tracing::warn!(
                vectors = index.rows.len(),
                documents = documents.len(),
                "Index artifacts disagree; treating index as absent"
            );
            return Ok(None);
        }

        // Metadata is best-effort: a missing or unreadable record does not
        // block retrieval
        let meta = self.read_meta().unwrap_or_default();

        Ok(Some(LoadedIndex {
            index,
            documents,
            meta,
        }))
    }

    /// Compare persisted metadata against expected values.
    ///
    /// Missing or unreadable metadata is reported as `false`, not an error.
    /// Only the provided expectations are checked.
    pub fn verify_compatibility(
        &self,
        expected_model: Option<&str>,
        expected_tokenizer: Option<&str>,
    ) -> bool {
        let Some(meta) = self.read_meta() else {
            return false;
        };

        if let Some(expected) = expected_model {
            if meta.model_name.as_deref() != Some(expected) {
                return false;
            }
        }
        if let Some(expected) = expected_tokenizer {
            if meta.tokenizer_version.as_deref() != Some(expected) {
                return false;
            }
        }
        true
    }

    fn read_meta(&self) -> Option<IndexMeta> {
        let bytes = fs::read(self.data_dir.join(META_FILE)).ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    fn publish(
        &self,
        index: &TfidfIndex,
        documents: &[Document],
        meta: &IndexMeta,
    ) -> AppResult<()> {
        fs::create_dir_all(&self.data_dir)?;

        write_artifact(&self.data_dir, INDEX_FILE, serde_json::to_vec(index)?)?;
        write_artifact(
            &self.data_dir,
            DOCS_FILE,
            serde_json::to_vec_pretty(documents)?,
        )?;
        write_artifact(&self.data_dir, META_FILE, serde_json::to_vec_pretty(meta)?)?;
        Ok(())
    }
}

/// Write to a sibling temporary file, then rename over the live name.
fn write_artifact(dir: &Path, name: &str, bytes: Vec<u8>) -> AppResult<()> {
    let tmp = dir.join(format!("{}.tmp", name));
    let live = dir.join(name);
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, &live)?;
    Ok(())
}
