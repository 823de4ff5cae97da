use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of change recorded for a path between two snapshots.
///
/// # Examples
///
/// ```
/// use quill_core::ChangeKind;
///
/// assert!(ChangeKind::Added.is_eligible());
/// assert!(!ChangeKind::Deleted.is_eligible());
/// assert_eq!(format!("{}", ChangeKind::Modified), "modified");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChangeKind {
    /// New file.
    Added,
    /// Existing file modified.
    Modified,
    /// File removed.
    Deleted,
    /// File renamed from another path.
    Renamed {
        /// Original path before rename.
        from: String,
    },
    /// File copied from another path.
    Copied,
    /// File type changed (e.g. regular file to symlink).
    TypeChanged,
    /// Any other status reported by git (unreadable, conflicted, ...).
    Other,
}

impl ChangeKind {
    /// Whether a change of this kind can enter the generation stage.
    ///
    /// Only additions and modifications are eligible; deletions and renames
    /// never are.
    pub fn is_eligible(&self) -> bool {
        matches!(self, ChangeKind::Added | ChangeKind::Modified)
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::Added => write!(f, "added"),
            ChangeKind::Modified => write!(f, "modified"),
            ChangeKind::Deleted => write!(f, "deleted"),
            ChangeKind::Renamed { from } => write!(f, "renamed from {from}"),
            ChangeKind::Copied => write!(f, "copied"),
            ChangeKind::TypeChanged => write!(f, "type changed"),
            ChangeKind::Other => write!(f, "other"),
        }
    }
}

/// A single changed path between the base and head snapshots.
///
/// # Examples
///
/// ```
/// use quill_core::{ChangeKind, ChangeRecord};
///
/// let record = ChangeRecord {
///     path: "src/A.cs".into(),
///     kind: ChangeKind::Added,
/// };
/// assert!(record.kind.is_eligible());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRecord {
    /// Path relative to the repository root, `/`-separated.
    pub path: String,
    /// What happened to the path.
    pub kind: ChangeKind,
}

/// One file queued for generation, with the text that goes into its prompt.
///
/// # Examples
///
/// ```
/// use quill_core::GenerationUnit;
///
/// let unit = GenerationUnit::new("src/A.cs", "class A {}");
/// assert!(unit.diff_patch.is_none());
/// assert!(unit.related_context.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationUnit {
    /// Path (or subject name) identifying the unit.
    pub path: String,
    /// Full text of the file.
    pub primary_content: String,
    /// Unified patch between base and head, when the variant includes it.
    pub diff_patch: Option<String>,
    /// Concatenated text of related files. Never contains this unit's own file.
    pub related_context: Option<String>,
}

impl GenerationUnit {
    /// Create a unit with no patch and no related context.
    pub fn new(path: impl Into<String>, primary_content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            primary_content: primary_content.into(),
            diff_patch: None,
            related_context: None,
        }
    }
}

/// Result of one generation task, tagged success or failure.
///
/// A failed outcome still carries text: a fallback naming the unit's path, so
/// the aggregate shows which file could not be processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutcome {
    /// The service returned text for the unit.
    Generated {
        /// The unit that was processed.
        unit: GenerationUnit,
        /// Text returned by the service.
        text: String,
    },
    /// The service call failed; `text` is the locally built fallback.
    Failed {
        /// The unit that was processed.
        unit: GenerationUnit,
        /// Path-tagged fallback text.
        text: String,
        /// Description of the underlying error.
        error: String,
    },
}

impl GenerationOutcome {
    /// The unit this outcome belongs to.
    pub fn unit(&self) -> &GenerationUnit {
        match self {
            GenerationOutcome::Generated { unit, .. } | GenerationOutcome::Failed { unit, .. } => {
                unit
            }
        }
    }

    /// Text to aggregate, whether generated or fallback.
    pub fn text(&self) -> &str {
        match self {
            GenerationOutcome::Generated { text, .. } | GenerationOutcome::Failed { text, .. } => {
                text
            }
        }
    }

    /// `true` when the service call failed.
    pub fn is_failed(&self) -> bool {
        matches!(self, GenerationOutcome::Failed { .. })
    }
}

/// The output envelope persisted at the end of a run.
///
/// # Examples
///
/// ```
/// use quill_core::AggregateResult;
///
/// let result = AggregateResult { comment: "hello".into() };
/// let json = serde_json::to_value(&result).unwrap();
/// assert_eq!(json["comment"], "hello");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateResult {
    /// All outcome texts joined by a blank line.
    pub comment: String,
}
