//! Prompt construction and response normalization
//!
//! Both halves are pure and synchronous; the only I/O in a task's life is
//! the LLM call between them.

pub mod prompt;
pub mod response_parser;
pub mod schema;

pub use prompt::{Prompt, PromptBuilder};
pub use response_parser::{FieldMatch, ParseFailure, ResponseParser};
