//! Generation pipeline for the Quill tools.
//!
//! Selects subjects from a branch comparison (or the working tree), builds
//! one prompt per subject, dispatches them concurrently with a jittered start
//! to an LLM, and aggregates the replies into a single result document.

pub mod dispatch;
pub mod filter;
pub mod github;
pub mod llm;
pub mod output;
pub mod pipeline;
pub mod prompt;
