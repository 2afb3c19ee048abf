//! Query-time retrieval over the loaded index.

use std::sync::Arc;

use parking_lot::RwLock;
use waypost_core::AppResult;

use crate::store::{IndexStore, LoadedIndex};
use crate::types::{IndexMeta, ScoredDocument};
use crate::vectorizer;

/// Shared handle over the loaded index.
///
/// Retrieval reads the current snapshot; `reload` swaps the snapshot as one
/// unit, so a rebuild is never observable mid-write by concurrent callers.
/// Constructed once at startup and shared by every request handler.
pub struct Retriever {
    store: IndexStore,
    loaded: RwLock<Option<Arc<LoadedIndex>>>,
}

impl Retriever {
    /// Create a retriever with no index loaded.
    pub fn new(store: IndexStore) -> Self {
        Self {
            store,
            loaded: RwLock::new(None),
        }
    }

    /// Load (or reload) the index artifacts from disk and swap them in.
    ///
    /// Returns the fresh metadata, or `None` when no index is on disk. An
    /// absent index clears the current snapshot.
    pub fn reload(&self) -> AppResult<Option<IndexMeta>> {
        let fresh = self.store.load()?;
        let meta = fresh.as_ref().map(|loaded| loaded.meta.clone());
        *self.loaded.write() = fresh.map(Arc::new);

        match &meta {
            Some(meta) => {
                tracing::info!(documents = meta.document_count, "Retrieval index loaded")
            }
            None => tracing::warn!("No retrieval index found on disk"),
        }

        Ok(meta)
    }

    /// Whether an index snapshot is currently loaded.
    pub fn is_loaded(&self) -> bool {
        self.loaded.read().is_some()
    }

    /// Number of documents in the loaded snapshot, zero when absent.
    pub fn document_count(&self) -> usize {
        self.loaded
            .read()
            .as_ref()
            .map(|loaded| loaded.documents.len())
            .unwrap_or(0)
    }

    /// Metadata of the loaded snapshot.
    pub fn meta(&self) -> Option<IndexMeta> {
        self.loaded.read().as_ref().map(|loaded| loaded.meta.clone())
    }

    /// The store this retriever reads from.
    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    /// Rank documents against `query`.
    ///
    /// Returns at most `top_k` results with strictly positive scores, best
    /// first; tied scores keep insertion order. An unloaded index yields an
    /// empty result, never an error.
    pub fn retrieve(&self, query: &str, top_k: usize) -> Vec<ScoredDocument> {
        let snapshot = self.loaded.read().clone();
        let Some(loaded) = snapshot else {
            return Vec::new();
        };
        if top_k == 0 {
            return Vec::new();
        }

        let query_vector = loaded.index.model.transform(query);

        let mut scored: Vec<(f32, usize)> = loaded
            .index
            .rows
            .iter()
            .enumerate()
            .map(|(position, row)| (vectorizer::sparse_dot(&query_vector, row), position))
            .filter(|&(score, _)| score > 0.0)
            .collect();

        // Stable sort preserves insertion order across equal scores
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);

        tracing::debug!(
            results = scored.len(),
            top_k,
            "Retrieved documents for query"
        );

        scored
            .into_iter()
            .map(|(score, position)| ScoredDocument {
                score,
                document: loaded.documents[position].clone(),
            })
            .collect()
    }

    /// Compare persisted index metadata against the active generation stack.
    pub fn verify_compatibility(
        &self,
        expected_model: Option<&str>,
        expected_tokenizer: Option<&str>,
    ) -> bool {
        self.store
            .verify_compatibility(expected_model, expected_tokenizer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn build_corpus(store: &IndexStore, texts: &[&str]) {
        let texts: Vec<String> = texts.iter().map(|t| t.to_string()).collect();
        let metadata = texts
            .iter()
            .enumerate()
            .map(|(i, _)| {
                let mut entry = serde_json::Map::new();
                entry.insert(
                    "source".to_string(),
                    serde_json::Value::String(format!("doc-{}.md", i)),
                );
                entry
            })
            .collect();
        store.build(texts, metadata, None, None).unwrap();
    }

    #[test]
    fn test_retrieve_ranks_matching_document_first() {
        let dir = tempdir().unwrap();
        let store = IndexStore::new(dir.path());
        build_corpus(&store, &["apple pie recipe", "trek packing list"]);

        let retriever = Retriever::new(store);
        retriever.reload().unwrap();

        let results = retriever.retrieve("apple pie recipe", 3);
        assert!(!results.is_empty());
        assert_eq!(results[0].document.text, "apple pie recipe");
        assert!(results[0].score > 0.0);
    }

    #[test]
    fn test_retrieve_missing_index_is_empty() {
        let dir = tempdir().unwrap();
        let retriever = Retriever::new(IndexStore::new(dir.path()));

        // Never loaded
        assert!(retriever.retrieve("anything", 3).is_empty());

        // Reload against an empty directory reports absent, still no error
        assert!(retriever.reload().unwrap().is_none());
        assert!(!retriever.is_loaded());
        assert!(retriever.retrieve("anything", 3).is_empty());
    }

    #[test]
    fn test_retrieve_caps_at_top_k() {
        let dir = tempdir().unwrap();
        let store = IndexStore::new(dir.path());
        build_corpus(
            &store,
            &[
                "mountain trek boots",
                "mountain trek poles",
                "mountain trek jacket",
            ],
        );

        let retriever = Retriever::new(store);
        retriever.reload().unwrap();

        let results = retriever.retrieve("mountain trek", 2);
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn test_retrieve_drops_zero_scores() {
        let dir = tempdir().unwrap();
        let store = IndexStore::new(dir.path());
        build_corpus(&store, &["apple pie recipe", "trek packing list"]);

        let retriever = Retriever::new(store);
        retriever.reload().unwrap();

        assert!(retriever.retrieve("zebra quantum", 3).is_empty());
    }

    #[test]
    fn test_tied_scores_keep_insertion_order() {
        let dir = tempdir().unwrap();
        let store = IndexStore::new(dir.path());
        build_corpus(
            &store,
            &["trail mix snacks", "trail mix snacks", "visa paperwork help"],
        );

        let retriever = Retriever::new(store);
        retriever.reload().unwrap();

        let results = retriever.retrieve("trail mix snacks", 3);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].document.source, "doc-0.md");
        assert_eq!(results[1].document.source, "doc-1.md");
    }

    #[test]
    fn test_reload_swaps_snapshot_wholesale() {
        let dir = tempdir().unwrap();
        let store = IndexStore::new(dir.path());
        build_corpus(&store, &["apple pie recipe", "trek packing list"]);

        let retriever = Retriever::new(IndexStore::new(dir.path()));
        retriever.reload().unwrap();
        assert_eq!(retriever.document_count(), 2);

        // Rebuild on disk; the live snapshot keeps serving the old corpus
        build_corpus(
            &store,
            &["visa paperwork help", "travel insurance basics", "airport transfer guide"],
        );
        assert_eq!(retriever.document_count(), 2);
        assert!(!retriever.retrieve("apple pie", 3).is_empty());

        // The swap happens in one step at reload
        retriever.reload().unwrap();
        assert_eq!(retriever.document_count(), 3);
        assert!(retriever.retrieve("apple pie", 3).is_empty());
        assert!(!retriever.retrieve("visa paperwork", 3).is_empty());
    }
}
