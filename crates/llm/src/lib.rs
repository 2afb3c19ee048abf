//! Generation pipeline for Waypost.
//!
//! This crate drives the answer-producing half of the service: a generation
//! backend behind a trait, a single-slot executor with a wall-clock deadline,
//! and the extraction step that turns raw model output into a structured
//! answer with validated actions. A deterministic fallback path answers
//! every request the model cannot.
//!
//! # Example
//! ```no_run
//! use waypost_llm::{GenerationParams, Generator, HttpGenerator};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let generator = HttpGenerator::new("llama3.2", "http://127.0.0.1:11434", 1024);
//! let raw = generator.generate("Hello, world!", &GenerationParams::new(64)).await?;
//! println!("{}", raw);
//! # Ok(())
//! # }
//! ```

pub mod executor;
pub mod extract;
pub mod fallback;
pub mod generator;
pub mod ollama;

// Re-export main types
pub use executor::GenerationExecutor;
pub use extract::{
    assemble_answer, extract_last_json, synthesize_fallback_answer, validate_actions, Action,
    Answer,
};
pub use fallback::{fallback_text, FallbackGenerator, FALLBACK_MARKER};
pub use generator::{GenerationParams, Generator};
pub use ollama::HttpGenerator;
