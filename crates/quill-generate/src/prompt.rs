use std::path::Path;

use quill_core::{GenerationUnit, QuillError};

/// Everything needed to issue one generation request.
///
/// Derived deterministically from a unit and the variant's system prompt.
///
/// # Examples
///
/// ```
/// use quill_core::GenerationUnit;
/// use quill_generate::prompt::GenerationTask;
///
/// let unit = GenerationUnit::new("src/A.cs", "class A {}");
/// let task = GenerationTask::new(unit, "You write unit tests.");
/// assert_eq!(task.user_message, "# Name\nsrc/A.cs\n# Content\nclass A {}\n");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationTask {
    /// The subject this request is about.
    pub unit: GenerationUnit,
    /// Fixed instructions shared by every task of a run.
    pub system_prompt: String,
    /// Structured message built from the unit.
    pub user_message: String,
}

impl GenerationTask {
    /// Derive the request for `unit` under `system_prompt`.
    pub fn new(unit: GenerationUnit, system_prompt: impl Into<String>) -> Self {
        let user_message = build_user_message(&unit);
        Self {
            unit,
            system_prompt: system_prompt.into(),
            user_message,
        }
    }
}

/// Build the user message for a unit.
///
/// Sections appear in a fixed order: name, content, then the diff when the
/// unit carries a patch, then related files when it carries context.
///
/// # Examples
///
/// ```
/// use quill_core::GenerationUnit;
/// use quill_generate::prompt::build_user_message;
///
/// let mut unit = GenerationUnit::new("src/B.cs", "int x = 2;");
/// unit.diff_patch = Some("-int x = 1;\n+int x = 2;\n".into());
/// let message = build_user_message(&unit);
/// assert!(message.ends_with("# Diff\n-int x = 1;\n+int x = 2;\n"));
/// ```
pub fn build_user_message(unit: &GenerationUnit) -> String {
    let mut message = format!(
        "# Name\n{}\n# Content\n{}\n",
        unit.path, unit.primary_content
    );
    if let Some(patch) = &unit.diff_patch {
        message.push_str(&format!("# Diff\n{patch}"));
    }
    if let Some(context) = &unit.related_context {
        message.push_str(&format!("# Related Files\n{context}\n"));
    }
    message
}

/// Text recorded for a unit whose generation failed.
///
/// # Examples
///
/// ```
/// use quill_generate::prompt::fallback_text;
///
/// let text = fallback_text("src/A.cs", "Unit tests could not be created because an error occurred.");
/// assert!(text.starts_with("## src/A.cs\n"));
/// ```
pub fn fallback_text(path: &str, message: &str) -> String {
    format!("## {path}\n{message}")
}

/// Read a variant's system prompt.
///
/// # Errors
///
/// Returns [`QuillError::FileNotFound`] if the file does not exist, or
/// [`QuillError::Io`] if it cannot be read.
pub fn load_system_prompt(path: &Path) -> Result<String, QuillError> {
    if !path.exists() {
        return Err(QuillError::FileNotFound(path.to_path_buf()));
    }
    Ok(std::fs::read_to_string(path)?)
}
