use std::path::{Path, PathBuf};

use quill_core::{AggregateResult, GenerationOutcome, QuillError};
use tracing::info;

/// Separator between outcome texts in the aggregate.
pub const OUTCOME_SEPARATOR: &str = "\n\n";

/// Join every outcome text, failed or not, in collection order.
///
/// # Examples
///
/// ```
/// use quill_core::{GenerationOutcome, GenerationUnit};
/// use quill_generate::output::aggregate;
///
/// let outcomes = vec![
///     GenerationOutcome::Generated { unit: GenerationUnit::new("a", ""), text: "first".into() },
///     GenerationOutcome::Generated { unit: GenerationUnit::new("b", ""), text: "second".into() },
/// ];
/// assert_eq!(aggregate(&outcomes).comment, "first\n\nsecond");
/// ```
pub fn aggregate(outcomes: &[GenerationOutcome]) -> AggregateResult {
    let texts: Vec<&str> = outcomes.iter().map(|o| o.text()).collect();
    AggregateResult {
        comment: texts.join(OUTCOME_SEPARATOR),
    }
}

/// Write the result as indented JSON, replacing any existing file.
///
/// # Errors
///
/// Returns [`QuillError::Io`] if the file cannot be written.
pub fn write_result(result: &AggregateResult, path: &Path) -> Result<(), QuillError> {
    let json = serde_json::to_string_pretty(result)?;
    std::fs::write(path, json)?;
    info!(path = %path.display(), "result written");
    Ok(())
}

/// Load a result previously written by [`write_result`].
///
/// # Errors
///
/// Returns [`QuillError::FileNotFound`] if the file does not exist, or
/// [`QuillError::Serialization`] if it is not a result document.
pub fn read_result(path: &Path) -> Result<AggregateResult, QuillError> {
    if !path.exists() {
        return Err(QuillError::FileNotFound(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path)?;
    let result = serde_json::from_str(&content)?;
    Ok(result)
}

/// Write one text file per outcome into `dir`, named `{stem}{suffix}.txt`.
///
/// Creates `dir` when missing and returns the written paths.
///
/// # Errors
///
/// Returns [`QuillError::Io`] if the directory or a file cannot be written.
pub fn write_documents(
    outcomes: &[GenerationOutcome],
    dir: &Path,
    suffix: &str,
) -> Result<Vec<PathBuf>, QuillError> {
    std::fs::create_dir_all(dir)?;

    let mut written = Vec::with_capacity(outcomes.len());
    for outcome in outcomes {
        let stem = Path::new(&outcome.unit().path)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| outcome.unit().path.clone());
        let path = dir.join(format!("{stem}{suffix}.txt"));
        std::fs::write(&path, outcome.text())?;
        info!(path = %path.display(), "document written");
        written.push(path);
    }
    Ok(written)
}
