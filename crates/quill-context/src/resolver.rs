use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use quill_core::{GenerationUnit, QuillError};
use tracing::debug;

use crate::analyzer::SourceAnalyzer;

/// Separator appended after each related file's text.
pub const CONTEXT_SEPARATOR: &str = "\n---\n";

/// Collects the source of classes and interfaces a unit refers to.
///
/// # Examples
///
/// ```
/// use std::path::PathBuf;
/// use std::sync::Arc;
/// use quill_context::{ContextResolver, Language, SourceFile, WorkspaceAnalyzer};
/// use quill_core::GenerationUnit;
///
/// let analyzer = WorkspaceAnalyzer::from_files(vec![SourceFile {
///     path: PathBuf::from("IStore.cs"),
///     language: Language::CSharp,
///     content: "public interface IStore {}".into(),
/// }])
/// .unwrap();
/// let resolver = ContextResolver::new(Arc::new(analyzer));
///
/// let unit = GenerationUnit::new("Shop.cs", "class Shop { IStore store; }");
/// assert_eq!(resolver.resolve(&unit).unwrap(), "public interface IStore {}\n---\n");
/// ```
#[derive(Clone)]
pub struct ContextResolver {
    analyzer: Arc<dyn SourceAnalyzer>,
}

impl ContextResolver {
    /// Resolve references through `analyzer`.
    pub fn new(analyzer: Arc<dyn SourceAnalyzer>) -> Self {
        Self { analyzer }
    }

    /// Concatenate the declaring files of every class or interface `unit` references.
    ///
    /// Each file is followed by [`CONTEXT_SEPARATOR`] and appears once, in
    /// order of first reference. Symbols declared in the unit's own file are
    /// skipped, as are names the analyzer cannot resolve. Returns an empty
    /// string when nothing resolves.
    ///
    /// # Errors
    ///
    /// Returns [`QuillError::Parse`] if the unit's content cannot be parsed.
    pub fn resolve(&self, unit: &GenerationUnit) -> Result<String, QuillError> {
        let own_path = Path::new(&unit.path);
        let symbols = self
            .analyzer
            .referenced_types(own_path, &unit.primary_content)?;

        let mut seen: HashSet<(String, PathBuf)> = HashSet::new();
        let mut context = String::new();

        for symbol in symbols {
            if !symbol.kind.is_context_relevant() || symbol.path == own_path {
                continue;
            }
            if !seen.insert((symbol.name.clone(), symbol.path.clone())) {
                continue;
            }
            let Some(text) = self.analyzer.source_text(&symbol.path) else {
                debug!(path = %symbol.path.display(), "declaring file not indexed");
                continue;
            };
            context.push_str(&text);
            context.push_str(CONTEXT_SEPARATOR);
        }

        Ok(context)
    }
}
