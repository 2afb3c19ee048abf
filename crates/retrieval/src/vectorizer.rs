//! TF-IDF vectorization over the document corpus.
//!
//! Fits a vocabulary with smoothed inverse document frequencies, produces one
//! L2-normalized sparse vector per document, and projects queries into the
//! same space. Because rows and queries are unit length, cosine similarity
//! reduces to a sparse dot product.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use waypost_core::{AppError, AppResult};

/// Sparse vector as (column, weight) pairs sorted by column.
pub type SparseVector = Vec<(u32, f32)>;

/// Terms occurring in more than this fraction of documents are pruned.
const MAX_DOC_FREQUENCY: f32 = 0.9;

/// Common English words excluded from the vocabulary.
const STOP_WORDS: &[&str] = &[
    "the", "is", "at", "which", "on", "a", "an", "as", "are", "was", "were", "for", "to", "of",
    "in", "and", "or", "but", "with", "by", "from", "this", "that", "be", "have", "has", "had",
    "it", "its", "their", "they", "them", "you", "your", "we", "our", "us", "i", "my", "me", "he",
    "she", "his", "her", "what", "when", "where", "who", "how", "why", "will", "would", "can",
    "could", "should", "do", "does", "did", "not", "no", "so", "if", "then", "than", "there",
    "here", "all", "any", "each", "into", "about", "after", "before", "over", "under", "up",
    "down", "out",
];

/// Fitted weighting model: vocabulary plus per-term inverse document
/// frequency. Column order is fixed at fit time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TfidfModel {
    vocabulary: HashMap<String, u32>,
    idf: Vec<f32>,
}

/// Fitted model together with the document vector matrix. Persisted as one
/// unit so the model and the matrix can never drift apart on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TfidfIndex {
    pub model: TfidfModel,
    pub rows: Vec<SparseVector>,
}

impl TfidfModel {
    /// Number of terms in the fitted vocabulary.
    pub fn vocabulary_len(&self) -> usize {
        self.vocabulary.len()
    }

    /// Project a query into the fitted vector space.
    ///
    /// Terms outside the vocabulary are ignored. The result is L2-normalized
    /// and sorted by column.
    pub fn transform(&self, text: &str) -> SparseVector {
        let mut counts: HashMap<u32, f32> = HashMap::new();
        for token in tokenize(text) {
            if let Some(&column) = self.vocabulary.get(&token) {
                *counts.entry(column).or_insert(0.0) += 1.0;
            }
        }

        let mut row: SparseVector = counts
            .into_iter()
            .map(|(column, tf)| (column, tf * self.idf[column as usize]))
            .collect();
        row.sort_by_key(|&(column, _)| column);
        l2_normalize(&mut row);
        row
    }
}

/// Fit a TF-IDF model over `texts` and compute one vector per document.
///
/// Terms present in more than 90% of documents are pruned from the
/// vocabulary. Errors when pruning leaves nothing to index.
pub fn fit_transform(texts: &[String]) -> AppResult<TfidfIndex> {
    let token_lists: Vec<Vec<String>> = texts.iter().map(|t| tokenize(t)).collect();
    let total_docs = texts.len();

    // Document frequencies over unique terms per document
    let mut doc_freq: HashMap<&str, u32> = HashMap::new();
    for tokens in &token_lists {
        let unique: HashSet<&str> = tokens.iter().map(|t| t.as_str()).collect();
        for term in unique {
            *doc_freq.entry(term).or_insert(0) += 1;
        }
    }

    // Vocabulary in sorted term order for a stable column assignment
    let mut terms: Vec<(&str, u32)> = doc_freq
        .into_iter()
        .filter(|&(_, df)| (df as f32) / (total_docs as f32) <= MAX_DOC_FREQUENCY)
        .collect();
    terms.sort_by(|a, b| a.0.cmp(b.0));

    if terms.is_empty() {
        return Err(AppError::Retrieval(
            "Vocabulary is empty after pruning".to_string(),
        ));
    }

    let mut vocabulary = HashMap::with_capacity(terms.len());
    let mut idf = Vec::with_capacity(terms.len());
    for (column, (term, df)) in terms.into_iter().enumerate() {
        vocabulary.insert(term.to_string(), column as u32);
        // Smoothed IDF keeps weights finite for terms in every document
        let weight = ((1.0 + total_docs as f32) / (1.0 + df as f32)).ln() + 1.0;
        idf.push(weight);
    }

    let model = TfidfModel { vocabulary, idf };

    let rows = token_lists
        .iter()
        .map(|tokens| {
            let mut counts: HashMap<u32, f32> = HashMap::new();
            for token in tokens {
                if let Some(&column) = model.vocabulary.get(token) {
                    *counts.entry(column).or_insert(0.0) += 1.0;
                }
            }
            let mut row: SparseVector = counts
                .into_iter()
                .map(|(column, tf)| (column, tf * model.idf[column as usize]))
                .collect();
            row.sort_by_key(|&(column, _)| column);
            l2_normalize(&mut row);
            row
        })
        .collect();

    Ok(TfidfIndex { model, rows })
}

/// Dot product of two sparse vectors sorted by column.
pub fn sparse_dot(a: &[(u32, f32)], b: &[(u32, f32)]) -> f32 {
    let mut sum = 0.0;
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].0.cmp(&b[j].0) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                sum += a[i].1 * b[j].1;
                i += 1;
                j += 1;
            }
        }
    }
    sum
}

/// Lowercased alphanumeric tokens of at least two characters, stop words
/// removed.
fn tokenize(text: &str) -> Vec<String> {
    let stop_words: HashSet<&str> = STOP_WORDS.iter().copied().collect();

    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| token.chars().count() >= 2 && !stop_words.contains(token))
        .map(|token| token.to_string())
        .collect()
}

/// Normalize to a unit vector; zero vectors stay zero.
fn l2_normalize(row: &mut SparseVector) {
    let norm: f32 = row.iter().map(|(_, v)| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for (_, v) in row.iter_mut() {
            *v /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_fit_transform_rows_match_documents() {
        let index = fit_transform(&corpus(&[
            "apple pie recipe",
            "trek packing list",
            "mountain weather guide",
        ]))
        .unwrap();

        assert_eq!(index.rows.len(), 3);
        assert!(index.model.vocabulary_len() > 0);

        // Every non-empty row is unit length
        for row in &index.rows {
            let norm: f32 = row.iter().map(|(_, v)| v * v).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 0.001);
        }
    }

    #[test]
    fn test_transform_matches_own_document() {
        let index = fit_transform(&corpus(&["apple pie recipe", "trek packing list"])).unwrap();
        let query = index.model.transform("apple pie recipe");

        let score_first = sparse_dot(&query, &index.rows[0]);
        let score_second = sparse_dot(&query, &index.rows[1]);

        assert!(score_first > 0.9);
        assert!(score_second <= 0.0 + f32::EPSILON);
    }

    #[test]
    fn test_transform_ignores_unknown_terms() {
        let index = fit_transform(&corpus(&["apple pie recipe", "trek packing list"])).unwrap();
        let query = index.model.transform("zebra quantum flux");
        assert!(query.is_empty());
    }

    #[test]
    fn test_stop_words_pruned() {
        let index = fit_transform(&corpus(&[
            "the apple is on the table",
            "the trek was in the hills",
        ]))
        .unwrap();

        let query = index.model.transform("the is on in was");
        assert!(query.is_empty());
    }

    #[test]
    fn test_ubiquitous_terms_pruned() {
        // "shared" appears in every document and exceeds the 0.9 cap
        let err = fit_transform(&corpus(&["shared", "shared"])).unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn test_fit_is_deterministic() {
        let texts = corpus(&["apple pie recipe", "trek packing list"]);
        let a = fit_transform(&texts).unwrap();
        let b = fit_transform(&texts).unwrap();
        assert_eq!(a.rows, b.rows);
    }

    #[test]
    fn test_sparse_dot() {
        let a = vec![(0, 1.0), (2, 2.0)];
        let b = vec![(0, 3.0), (1, 5.0), (2, 0.5)];
        assert!((sparse_dot(&a, &b) - 4.0).abs() < 0.001);
        assert_eq!(sparse_dot(&a, &[]), 0.0);
    }
}
