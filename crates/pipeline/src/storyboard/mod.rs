//! LLM-backed storyboard generation.

pub mod claude;
pub mod parse;
pub mod prompt;

pub use claude::{ClaudeStoryboardGenerator, StoryboardGenerationError};
