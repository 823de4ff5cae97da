//! Core types, configuration, and error handling for the Quill tools.
//!
//! This crate provides the shared foundation used by all other Quill crates:
//! - [`QuillError`]: unified error type using `thiserror`
//! - [`LlmConfig`]: generation service settings validated from the environment
//! - [`QuillConfig`]: pipeline and variant settings loaded from `.quill.toml`
//! - Shared types: [`ChangeRecord`], [`GenerationUnit`], [`GenerationOutcome`],
//!   [`AggregateResult`]

mod config;
mod error;
pub mod telemetry;
mod types;

pub use config::{
    LlmConfig, PipelineConfig, QuillConfig, Variant, VariantOverrides, VariantSettings,
    ENV_API_KEY, ENV_BASE_URL, ENV_MAX_TOKENS, ENV_MODEL_NAME, ENV_USE_AZURE,
};
pub use error::QuillError;
pub use types::{AggregateResult, ChangeKind, ChangeRecord, GenerationOutcome, GenerationUnit};

/// A convenience `Result` type for Quill operations.
pub type Result<T> = std::result::Result<T, QuillError>;
