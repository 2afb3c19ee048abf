//! Document retrieval for Waypost.
//!
//! A TF-IDF index over the travel knowledge base, persisted as JSON
//! artifacts and served through an atomically swappable in-memory snapshot.

pub mod rebuild;
pub mod retriever;
pub mod store;
pub mod types;
pub mod vectorizer;

pub use rebuild::{split_passages, AdminRebuilder, RebuildOutcome, FALLBACK_SOURCES};
pub use retriever::Retriever;
pub use store::{IndexStore, LoadedIndex};
pub use types::{Document, IndexMeta, ScoredDocument};
pub use vectorizer::{TfidfIndex, TfidfModel};
