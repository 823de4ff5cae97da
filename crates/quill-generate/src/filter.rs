//! Subject selection: decides which changed files become generation units.
//!
//! A [`SubjectFilter`] is a conjunction of [`SubjectPolicy`] checks. A filter
//! with no policies accepts every path.

use std::fmt;
use std::path::Path;

use quill_context::{has_marker, Language};
use quill_core::{QuillError, VariantSettings};
use tracing::debug;

/// One eligibility check.
#[derive(Debug, Clone)]
pub enum SubjectPolicy {
    /// Path ends with any of these suffixes (e.g. `".cs"`).
    Extension(Vec<String>),
    /// Source carries an attribute, annotation or decorator whose name
    /// contains this identifier.
    Marker(String),
    /// File name contains this fragment, ignoring case.
    NameContains(String),
    /// Path matches any of these glob patterns.
    Glob(Vec<glob::Pattern>),
}

impl SubjectPolicy {
    /// Check a single path and its content against this policy.
    ///
    /// # Errors
    ///
    /// Returns [`QuillError::Config`] if a marker check cannot load the
    /// grammar for the file's language.
    pub fn accepts(&self, path: &str, content: &str) -> Result<bool, QuillError> {
        match self {
            SubjectPolicy::Marker(marker) => {
                has_marker(Language::from_path(Path::new(path)), content, marker).map_err(|e| {
                    QuillError::Config(format!("cannot check marker '{marker}' in {path}: {e}"))
                })
            }
            other => Ok(other.accepts_path(path)),
        }
    }

    /// Check the path alone. Content-based policies always pass here.
    pub fn accepts_path(&self, path: &str) -> bool {
        match self {
            SubjectPolicy::Extension(suffixes) => {
                suffixes.iter().any(|suffix| path.ends_with(suffix.as_str()))
            }
            SubjectPolicy::Marker(_) => true,
            SubjectPolicy::NameContains(fragment) => {
                let file_name = Path::new(path)
                    .file_name()
                    .map(|f| f.to_string_lossy().to_lowercase())
                    .unwrap_or_default();
                file_name.contains(&fragment.to_lowercase())
            }
            SubjectPolicy::Glob(patterns) => patterns.iter().any(|p| p.matches(path)),
        }
    }
}

impl fmt::Display for SubjectPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubjectPolicy::Extension(suffixes) => write!(f, "extension {}", suffixes.join("|")),
            SubjectPolicy::Marker(marker) => write!(f, "marker {marker}"),
            SubjectPolicy::NameContains(fragment) => write!(f, "name contains {fragment}"),
            SubjectPolicy::Glob(patterns) => {
                let joined: Vec<&str> = patterns.iter().map(|p| p.as_str()).collect();
                write!(f, "glob {}", joined.join("|"))
            }
        }
    }
}

/// Decides whether a changed file is a generation subject.
///
/// # Examples
///
/// ```
/// use quill_generate::filter::{SubjectFilter, SubjectPolicy};
///
/// let filter = SubjectFilter::new(vec![
///     SubjectPolicy::Extension(vec![".cs".into()]),
///     SubjectPolicy::Marker("UnitTestSubject".into()),
/// ]);
/// assert!(filter.is_eligible("src/A.cs", "[UnitTestSubject]\nclass A {}").unwrap());
/// assert!(!filter.is_eligible("src/B.cs", "class B {}").unwrap());
/// assert!(!filter.is_eligible("src/a.py", "@UnitTestSubject\nclass A: pass").unwrap());
/// ```
#[derive(Debug, Clone, Default)]
pub struct SubjectFilter {
    policies: Vec<SubjectPolicy>,
}

impl SubjectFilter {
    /// A filter requiring every one of `policies`.
    pub fn new(policies: Vec<SubjectPolicy>) -> Self {
        Self { policies }
    }

    /// A filter that accepts every path.
    pub fn accept_all() -> Self {
        Self::default()
    }

    /// Build the filter described by a variant's settings.
    ///
    /// Empty extension and pattern lists add no policy.
    ///
    /// # Errors
    ///
    /// Returns [`QuillError::Config`] if a glob pattern is invalid.
    ///
    /// # Examples
    ///
    /// ```
    /// use quill_core::Variant;
    /// use quill_generate::filter::SubjectFilter;
    ///
    /// let review = SubjectFilter::from_settings(&Variant::Review.defaults()).unwrap();
    /// assert!(review.is_empty());
    ///
    /// let specs = SubjectFilter::from_settings(&Variant::Specs.defaults()).unwrap();
    /// assert!(specs.is_eligible("Api/Controllers/PetsController.cs", "").unwrap());
    /// ```
    pub fn from_settings(settings: &VariantSettings) -> Result<Self, QuillError> {
        let mut policies = Vec::new();

        if !settings.extensions.is_empty() {
            policies.push(SubjectPolicy::Extension(settings.extensions.clone()));
        }
        if let Some(fragment) = &settings.name_contains {
            policies.push(SubjectPolicy::NameContains(fragment.clone()));
        }
        if !settings.patterns.is_empty() {
            let mut patterns = Vec::with_capacity(settings.patterns.len());
            for pat in &settings.patterns {
                let pattern = glob::Pattern::new(pat)
                    .map_err(|e| QuillError::Config(format!("invalid pattern '{pat}': {e}")))?;
                patterns.push(pattern);
            }
            policies.push(SubjectPolicy::Glob(patterns));
        }
        // Parsing is the costliest check, so it runs last
        if let Some(marker) = &settings.marker {
            policies.push(SubjectPolicy::Marker(marker.clone()));
        }

        Ok(Self { policies })
    }

    /// `true` when the filter has no policies.
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// The first policy `path` fails, if any.
    ///
    /// # Errors
    ///
    /// Returns [`QuillError::Config`] if a marker check cannot run.
    pub fn rejection(
        &self,
        path: &str,
        content: &str,
    ) -> Result<Option<&SubjectPolicy>, QuillError> {
        for policy in &self.policies {
            if !policy.accepts(path, content)? {
                return Ok(Some(policy));
            }
        }
        Ok(None)
    }

    /// Whether `path` with `content` satisfies every policy.
    ///
    /// # Errors
    ///
    /// Returns [`QuillError::Config`] if a marker check cannot run.
    pub fn is_eligible(&self, path: &str, content: &str) -> Result<bool, QuillError> {
        match self.rejection(path, content)? {
            Some(policy) => {
                debug!(path, policy = %policy, "not a subject");
                Ok(false)
            }
            None => Ok(true),
        }
    }

    /// Whether a path could pass, judging only policies that need no content.
    ///
    /// Lets callers skip reading files that can never qualify.
    pub fn may_accept_path(&self, path: &str) -> bool {
        self.policies.iter().all(|p| p.accepts_path(path))
    }
}
