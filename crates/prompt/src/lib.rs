//! Prompt assembly for Waypost.
//!
//! This crate provides:
//! - Fixed-layout prompt composition (few-shot, retrieved context, instruction)
//! - Input limits enforced on the user prompt (token ceiling, byte cap)
//! - Token counting, tokenizer-backed with a byte-estimate fallback

pub mod composer;
pub mod tokens;

// Re-export main types
pub use composer::{ContextBlock, PromptComposer, ANSWER_FORMAT_INSTRUCTION, FEW_SHOT_EXAMPLE};
pub use tokens::TokenCounter;
