//! Rebuilding the document index from a bundled source.
//!
//! A source is either a JSON pack (array of entries carrying `text` plus
//! metadata) or a directory of markdown files split into passages. Rebuilds
//! replace the index wholesale; rerunning with unchanged input yields an
//! index with identical retrieval behavior.

use std::path::{Path, PathBuf};

use serde::Serialize;
use walkdir::WalkDir;
use waypost_core::{AppError, AppResult};

use crate::store::IndexStore;
use crate::types::IndexMeta;

/// Bundled pack locations probed when no source is configured.
pub const FALLBACK_SOURCES: &[&str] = &["data/knowledge_pack.json", "docs/knowledge_pack.json"];

/// Passages longer than this are split on paragraph boundaries.
const MAX_PASSAGE_CHARS: usize = 1000;

/// Outcome of a successful rebuild.
#[derive(Debug, Clone, Serialize)]
pub struct RebuildOutcome {
    pub documents: usize,
    pub source: PathBuf,
    #[serde(skip)]
    pub meta: IndexMeta,
}

/// Rebuilds the index wholesale from a document source.
pub struct AdminRebuilder {
    store: IndexStore,
    configured_source: Option<PathBuf>,
    model_name: Option<String>,
    tokenizer_version: Option<String>,
}

impl AdminRebuilder {
    pub fn new(store: IndexStore, configured_source: Option<PathBuf>) -> Self {
        Self {
            store,
            configured_source,
            model_name: None,
            tokenizer_version: None,
        }
    }

    /// Record the generation stack the rebuilt index is meant for.
    pub fn with_model(
        mut self,
        model_name: impl Into<String>,
        tokenizer_version: impl Into<String>,
    ) -> Self {
        self.model_name = Some(model_name.into());
        self.tokenizer_version = Some(tokenizer_version.into());
        self
    }

    /// Find the first existing document source: the configured path, then
    /// the bundled fallbacks, in order.
    pub fn resolve_source(&self) -> AppResult<PathBuf> {
        if let Some(ref path) = self.configured_source {
            if path.exists() {
                return Ok(path.clone());
            }
        }

        for candidate in FALLBACK_SOURCES {
            let path = PathBuf::from(candidate);
            if path.exists() {
                return Ok(path);
            }
        }

        let mut tried: Vec<String> = Vec::new();
        if let Some(ref path) = self.configured_source {
            tried.push(path.display().to_string());
        }
        tried.extend(FALLBACK_SOURCES.iter().map(|s| s.to_string()));
        Err(AppError::SourceNotFound(tried.join(", ")))
    }

    /// Rebuild the index end to end.
    ///
    /// `source_override` wins over the configured path and the fallbacks; a
    /// nonexistent override is reported as not found rather than silently
    /// falling through.
    pub fn rebuild(&self, source_override: Option<&Path>) -> AppResult<RebuildOutcome> {
        let source = match source_override {
            Some(path) if path.exists() => path.to_path_buf(),
            Some(path) => {
                return Err(AppError::SourceNotFound(path.display().to_string()));
            }
            None => self.resolve_source()?,
        };

        let (texts, metadata) = if source.is_dir() {
            read_markdown_dir(&source)?
        } else {
            read_json_pack(&source)?
        };

        if texts.is_empty() {
            return Err(AppError::Retrieval(format!(
                "No documents found in {}",
                source.display()
            )));
        }

        let documents = texts.len();
        let meta = self.store.build(
            texts,
            metadata,
            self.model_name.as_deref(),
            self.tokenizer_version.as_deref(),
        )?;

        tracing::info!(documents, source = %source.display(), "Rebuilt retrieval index");

        Ok(RebuildOutcome {
            documents,
            source,
            meta,
        })
    }
}

/// Read a JSON pack: an array of objects each carrying `text` plus arbitrary
/// metadata fields. Entries without usable text are skipped, not an error.
fn read_json_pack(
    path: &Path,
) -> AppResult<(Vec<String>, Vec<serde_json::Map<String, serde_json::Value>>)> {
    let bytes = std::fs::read(path)?;
    let entries: Vec<serde_json::Value> = serde_json::from_slice(&bytes)?;

    let mut texts = Vec::new();
    let mut metadata = Vec::new();
    for entry in entries {
        let serde_json::Value::Object(mut fields) = entry else {
            continue;
        };
        let text = match fields.remove("text") {
            Some(serde_json::Value::String(s)) if !s.trim().is_empty() => s,
            _ => continue,
        };
        texts.push(text);
        metadata.push(fields);
    }

    Ok((texts, metadata))
}

/// Walk a docs directory and split every markdown file into passages.
///
/// Each passage becomes one document with `source` set to the file path
/// relative to the ingest root and `title` set to the file's first heading.
fn read_markdown_dir(
    root: &Path,
) -> AppResult<(Vec<String>, Vec<serde_json::Map<String, serde_json::Value>>)> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "md"))
        .collect();
    files.sort();

    let mut texts = Vec::new();
    let mut metadata = Vec::new();
    for file in files {
        let content = match std::fs::read_to_string(&file) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!("Skipping unreadable file {:?}: {}", file, e);
                continue;
            }
        };

        let relative = file
            .strip_prefix(root)
            .unwrap_or(&file)
            .display()
            .to_string();
        let title = first_heading(&content);

        for passage in split_passages(&content, MAX_PASSAGE_CHARS) {
            texts.push(passage);
            let mut entry = serde_json::Map::new();
            entry.insert(
                "source".to_string(),
                serde_json::Value::String(relative.clone()),
            );
            if let Some(ref title) = title {
                entry.insert(
                    "title".to_string(),
                    serde_json::Value::String(title.clone()),
                );
            }
            metadata.push(entry);
        }
    }

    Ok((texts, metadata))
}

/// First markdown heading in the file, if any.
fn first_heading(content: &str) -> Option<String> {
    content
        .lines()
        .find(|line| line.starts_with('#'))
        .map(|line| line.trim_start_matches('#').trim().to_string())
        .filter(|title| !title.is_empty())
}

/// Split text into paragraph-aligned passages of at most `max_chars`
/// characters (a single paragraph over the limit stays whole).
pub fn split_passages(text: &str, max_chars: usize) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    let mut passages = Vec::new();
    let mut current = String::new();
    let mut current_chars = 0;

    for paragraph in text.split("\n\n") {
        let paragraph = paragraph.trim();
        if paragraph.is_empty() {
            continue;
        }
        let paragraph_chars = paragraph.chars().count();

        if !current.is_empty() && current_chars + paragraph_chars > max_chars {
            passages.push(std::mem::take(&mut current));
            current_chars = 0;
        }
        if !current.is_empty() {
            current.push_str("\n\n");
            current_chars += 2;
        }
        current.push_str(paragraph);
        current_chars += paragraph_chars;
    }

    if !current.is_empty() {
        passages.push(current);
    }

    passages
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_rebuild_from_json_pack() {
        let dir = tempdir().unwrap();
        let pack = dir.path().join("pack.json");
        fs::write(
            &pack,
            r#"[
                {"source": "booking.md", "text": "How to book a trip", "category": "booking"},
                {"source": "refunds.md", "text": "Refund timelines explained"},
                {"source": "empty.md", "text": "   "},
                {"source": "no-text.md"}
            ]"#,
        )
        .unwrap();

        let store = IndexStore::new(dir.path().join("data"));
        let rebuilder = AdminRebuilder::new(store.clone(), Some(pack.clone()))
            .with_model("llama3.2", "tok-1");

        let outcome = rebuilder.rebuild(None).unwrap();
        assert_eq!(outcome.documents, 2);
        assert_eq!(outcome.source, pack);

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.documents.len(), 2);
        assert_eq!(loaded.documents[0].source, "booking.md");
        assert_eq!(loaded.meta.model_name.as_deref(), Some("llama3.2"));
    }

    #[test]
    fn test_rebuild_is_repeatable() {
        let dir = tempdir().unwrap();
        let pack = dir.path().join("pack.json");
        fs::write(
            &pack,
            r#"[
                {"source": "a.md", "text": "apple pie recipe"},
                {"source": "b.md", "text": "trek packing list"}
            ]"#,
        )
        .unwrap();

        let store = IndexStore::new(dir.path().join("data"));
        let rebuilder = AdminRebuilder::new(store.clone(), Some(pack));

        rebuilder.rebuild(None).unwrap();
        let first = store.load().unwrap().unwrap();

        rebuilder.rebuild(None).unwrap();
        let second = store.load().unwrap().unwrap();

        assert_eq!(first.documents, second.documents);
        assert_eq!(first.index.rows, second.index.rows);
    }

    #[test]
    fn test_rebuild_source_not_found() {
        let dir = tempdir().unwrap();
        let store = IndexStore::new(dir.path());
        let rebuilder =
            AdminRebuilder::new(store, Some(dir.path().join("missing.json")));

        let err = rebuilder.rebuild(None).unwrap_err();
        assert!(matches!(err, AppError::SourceNotFound(_)));
    }

    #[test]
    fn test_rebuild_override_must_exist() {
        let dir = tempdir().unwrap();
        let store = IndexStore::new(dir.path());
        let rebuilder = AdminRebuilder::new(store, None);

        let missing = dir.path().join("nope.json");
        let err = rebuilder.rebuild(Some(&missing)).unwrap_err();
        assert!(matches!(err, AppError::SourceNotFound(_)));
    }

    #[test]
    fn test_rebuild_from_markdown_dir() {
        let dir = tempdir().unwrap();
        let docs = dir.path().join("docs");
        fs::create_dir_all(docs.join("guides")).unwrap();
        fs::write(
            docs.join("guides/booking.md"),
            "# Booking Guide\n\nChoose a trip and add participants.\n\nPay by card or transfer.",
        )
        .unwrap();
        fs::write(docs.join("faq.md"), "# FAQ\n\nRefunds take five days.").unwrap();

        let store = IndexStore::new(dir.path().join("data"));
        let rebuilder = AdminRebuilder::new(store.clone(), Some(docs.clone()));

        let outcome = rebuilder.rebuild(None).unwrap();
        assert!(outcome.documents >= 2);

        let loaded = store.load().unwrap().unwrap();
        let sources: Vec<&str> = loaded
            .documents
            .iter()
            .map(|d| d.source.as_str())
            .collect();
        assert!(sources.contains(&"faq.md"));
        assert!(sources.iter().any(|s| s.ends_with("booking.md")));

        let faq = loaded
            .documents
            .iter()
            .find(|d| d.source == "faq.md")
            .unwrap();
        assert_eq!(
            faq.metadata.get("title"),
            Some(&serde_json::Value::String("FAQ".to_string()))
        );
    }

    #[test]
    fn test_split_passages_merges_short_paragraphs() {
        let text = "First paragraph.\n\nSecond paragraph.\n\nThird paragraph.";
        let passages = split_passages(text, 1000);
        assert_eq!(passages.len(), 1);
        assert!(passages[0].contains("First paragraph."));
        assert!(passages[0].contains("Third paragraph."));
    }

    #[test]
    fn test_split_passages_respects_limit() {
        let long_a = "a".repeat(600);
        let long_b = "b".repeat(600);
        let text = format!("{}\n\n{}", long_a, long_b);

        let passages = split_passages(&text, 1000);
        assert_eq!(passages.len(), 2);
        assert_eq!(passages[0], long_a);
        assert_eq!(passages[1], long_b);
    }

    #[test]
    fn test_split_passages_empty_input() {
        assert!(split_passages("", 1000).is_empty());
        assert!(split_passages("  \n\n  ", 1000).is_empty());
    }
}
