use std::path::PathBuf;

/// Errors that can occur across the Quill tools.
///
/// Library crates use this type directly; the binary crate renders it as a
/// `miette` diagnostic at the boundary.
///
/// # Examples
///
/// ```
/// use quill_core::QuillError;
///
/// let err = QuillError::Config("missing API_KEY".into());
/// assert!(err.to_string().contains("missing API_KEY"));
/// ```
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum QuillError {
    /// Filesystem I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    #[diagnostic(
        code(quill::config),
        help("set API_KEY, MODEL_NAME, MAX_TOKENS and USE_AZURE (plus BASE_URL when USE_AZURE=true)")
    )]
    Config(String),

    /// Git operation failure.
    #[error("git error: {0}")]
    Git(String),

    /// A branch or revision name did not resolve to a commit.
    #[error("reference not found: {0}")]
    #[diagnostic(
        code(quill::ref_not_found),
        help("both refs must exist as branches (or revisions) in the local repository")
    )]
    RefNotFound(String),

    /// Source code parsing failure.
    #[error("parse error: {0}")]
    Parse(String),

    /// LLM API or response error.
    #[error("LLM error: {0}")]
    Llm(String),

    /// Issue tracker API failure.
    #[error("GitHub error: {0}")]
    GitHub(String),

    /// JSON serialization / deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML deserialization failure.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A required file was not found.
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),
}
