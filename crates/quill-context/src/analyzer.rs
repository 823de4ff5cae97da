use std::collections::HashMap;
use std::path::{Path, PathBuf};

use quill_core::QuillError;
use tracing::debug;

use crate::parser::{extract_declarations, extract_type_references, TypeSymbol};
use crate::walker::{walk_repo, Language, SourceFile};

/// Answers "which types does this file reference, and where are they declared?"
///
/// Implementations must be shareable across generation tasks.
pub trait SourceAnalyzer: Send + Sync {
    /// Types referenced by `content`, in order of first reference.
    ///
    /// Types declared in `content` itself shadow same-named types declared
    /// elsewhere and are never returned.
    fn referenced_types(&self, path: &Path, content: &str) -> Result<Vec<TypeSymbol>, QuillError>;

    /// Full text of a workspace file, if it is known.
    fn source_text(&self, path: &Path) -> Option<String>;
}

/// A name-based symbol table over every parseable file in a working tree.
///
/// When several files declare the same name, the first in walk order wins.
#[derive(Debug, Default)]
pub struct WorkspaceAnalyzer {
    symbols: HashMap<String, TypeSymbol>,
    sources: HashMap<PathBuf, String>,
}

impl WorkspaceAnalyzer {
    /// Walk `root` and index every type declaration found.
    ///
    /// # Errors
    ///
    /// Returns [`QuillError::FileNotFound`] if `root` does not exist, or
    /// [`QuillError::Parse`] if a grammar cannot be loaded.
    pub fn build(root: &Path) -> Result<Self, QuillError> {
        let files = walk_repo(root)?;
        Self::from_files(files)
    }

    /// Index the given files.
    ///
    /// # Errors
    ///
    /// Returns [`QuillError::Parse`] if a grammar cannot be loaded.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::path::{Path, PathBuf};
    /// use quill_context::{Language, SourceAnalyzer, SourceFile, WorkspaceAnalyzer};
    ///
    /// let files = vec![SourceFile {
    ///     path: PathBuf::from("IStore.cs"),
    ///     language: Language::CSharp,
    ///     content: "public interface IStore {}".into(),
    /// }];
    /// let analyzer = WorkspaceAnalyzer::from_files(files).unwrap();
    /// assert_eq!(analyzer.symbol_count(), 1);
    ///
    /// let refs = analyzer
    ///     .referenced_types(Path::new("Shop.cs"), "class Shop { IStore store; }")
    ///     .unwrap();
    /// assert_eq!(refs[0].path, PathBuf::from("IStore.cs"));
    /// ```
    pub fn from_files(files: Vec<SourceFile>) -> Result<Self, QuillError> {
        let mut symbols = HashMap::new();
        let mut sources = HashMap::new();

        for file in files {
            for symbol in extract_declarations(&file)? {
                symbols.entry(symbol.name.clone()).or_insert(symbol);
            }
            sources.insert(file.path, file.content);
        }

        debug!(
            files = sources.len(),
            symbols = symbols.len(),
            "indexed workspace"
        );
        Ok(Self { symbols, sources })
    }

    /// Number of distinct declared type names.
    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }

    /// Look up the declaration indexed for `name`.
    pub fn lookup(&self, name: &str) -> Option<&TypeSymbol> {
        self.symbols.get(name)
    }
}

impl SourceAnalyzer for WorkspaceAnalyzer {
    fn referenced_types(&self, path: &Path, content: &str) -> Result<Vec<TypeSymbol>, QuillError> {
        let language = Language::from_path(path);
        let local = SourceFile {
            path: path.to_path_buf(),
            language,
            content: content.to_string(),
        };
        let local_names: Vec<String> = extract_declarations(&local)?
            .into_iter()
            .map(|s| s.name)
            .collect();

        let resolved = extract_type_references(language, content)?
            .into_iter()
            .filter(|name| !local_names.contains(name))
            .filter_map(|name| self.symbols.get(&name).cloned())
            .collect();
        Ok(resolved)
    }

    fn source_text(&self, path: &Path) -> Option<String> {
        self.sources.get(path).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::TypeKind;

    fn cs(path: &str, content: &str) -> SourceFile {
        SourceFile {
            path: PathBuf::from(path),
            language: Language::CSharp,
            content: content.to_string(),
        }
    }

    fn workspace() -> WorkspaceAnalyzer {
        WorkspaceAnalyzer::from_files(vec![
            cs("src/IPetStore.cs", "public interface IPetStore { }"),
            cs("src/PetStore.cs", "public class PetStore : IPetStore { }"),
            cs("src/Color.cs", "public enum Color { Red }"),
            cs("src/Dup.cs", "public class Shared { }"),
            cs("src/Dup2.cs", "public class Shared { int second; }"),
        ])
        .unwrap()
    }

    #[test]
    fn indexes_declarations() {
        let analyzer = workspace();
        assert_eq!(analyzer.symbol_count(), 4);
        assert_eq!(
            analyzer.lookup("IPetStore").map(|s| s.kind),
            Some(TypeKind::Interface)
        );
        assert!(analyzer.lookup("Missing").is_none());
    }

    #[test]
    fn first_declaration_wins() {
        let analyzer = workspace();
        let shared = analyzer.lookup("Shared").unwrap();
        assert_eq!(shared.path, PathBuf::from("src/Dup.cs"));
    }

    #[test]
    fn resolves_references_in_first_use_order() {
        let analyzer = workspace();
        let refs = analyzer
            .referenced_types(
                Path::new("src/Service.cs"),
                "class Service { PetStore impl; IPetStore store; Color c; }",
            )
            .unwrap();
        let names: Vec<&str> = refs.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["PetStore", "IPetStore", "Color"]);
    }

    #[test]
    fn local_declarations_shadow_the_workspace() {
        let analyzer = workspace();
        let refs = analyzer
            .referenced_types(
                Path::new("src/PetStore.cs"),
                "public class PetStore : IPetStore { PetStore Clone() => this; }",
            )
            .unwrap();
        let names: Vec<&str> = refs.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["IPetStore"]);
    }

    #[test]
    fn source_text_is_available_for_indexed_files() {
        let analyzer = workspace();
        assert_eq!(
            analyzer.source_text(Path::new("src/Color.cs")).as_deref(),
            Some("public enum Color { Red }")
        );
        assert!(analyzer.source_text(Path::new("src/Nope.cs")).is_none());
    }

    #[test]
    fn build_walks_the_tree() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("A.cs"), "class A { B b; }").unwrap();
        std::fs::write(dir.path().join("B.cs"), "class B { }").unwrap();

        let analyzer = WorkspaceAnalyzer::build(dir.path()).unwrap();
        assert_eq!(analyzer.symbol_count(), 2);
        assert_eq!(
            analyzer.lookup("B").map(|s| s.path.clone()),
            Some(PathBuf::from("B.cs"))
        );
    }
}
