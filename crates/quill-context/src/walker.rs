use std::path::{Path, PathBuf};

use quill_core::QuillError;
use tracing::debug;

/// Maximum file size to process (1 MB).
const MAX_FILE_SIZE: u64 = 1_048_576;

/// Number of bytes to check for binary detection.
const BINARY_CHECK_SIZE: usize = 8192;

/// A source file discovered in the working tree.
///
/// # Examples
///
/// ```
/// use std::path::PathBuf;
/// use quill_context::walker::{Language, SourceFile};
///
/// let file = SourceFile {
///     path: PathBuf::from("Api/Controllers/PetsController.cs"),
///     language: Language::CSharp,
///     content: "public class PetsController {}".to_string(),
/// };
/// assert_eq!(file.language, Language::CSharp);
/// ```
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Path relative to the repository root.
    pub path: PathBuf,
    /// Detected programming language.
    pub language: Language,
    /// Full file content.
    pub content: String,
}

/// Programming language detected from file extension.
///
/// # Examples
///
/// ```
/// use quill_context::walker::Language;
///
/// assert_eq!(Language::from_extension("cs"), Language::CSharp);
/// assert_eq!(Language::from_extension("java"), Language::Java);
/// assert_eq!(Language::from_extension("rs"), Language::Rust);
/// assert_eq!(Language::from_extension("py"), Language::Python);
/// assert_eq!(Language::from_extension("php"), Language::Php);
/// assert_eq!(Language::from_extension("txt"), Language::Unknown);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    /// `.cs`
    CSharp,
    /// `.java`
    Java,
    /// `.ts`, `.tsx`
    TypeScript,
    /// `.js`, `.jsx`, `.mjs`
    JavaScript,
    /// `.py`
    Python,
    /// `.rs`
    Rust,
    /// `.go`
    Go,
    /// `.php`
    Php,
    /// Anything else. Never parsed.
    Unknown,
}

impl Language {
    /// Detect language from a file extension string (without the dot).
    pub fn from_extension(ext: &str) -> Self {
        match ext {
            "cs" => Language::CSharp,
            "java" => Language::Java,
            "ts" | "tsx" => Language::TypeScript,
            "js" | "jsx" | "mjs" => Language::JavaScript,
            "py" => Language::Python,
            "rs" => Language::Rust,
            "go" => Language::Go,
            "php" => Language::Php,
            _ => Language::Unknown,
        }
    }

    /// Detect language from the extension of `path`.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::path::Path;
    /// use quill_context::walker::Language;
    ///
    /// assert_eq!(Language::from_path(Path::new("src/A.cs")), Language::CSharp);
    /// assert_eq!(Language::from_path(Path::new("Makefile")), Language::Unknown);
    /// ```
    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|e| e.to_str())
            .map(Self::from_extension)
            .unwrap_or(Language::Unknown)
    }

    /// Get the tree-sitter language grammar for this language.
    ///
    /// Returns `None` for `Language::Unknown`.
    pub fn tree_sitter_language(&self) -> Option<tree_sitter::Language> {
        match self {
            Language::CSharp => Some(tree_sitter_c_sharp::LANGUAGE.into()),
            Language::Java => Some(tree_sitter_java::LANGUAGE.into()),
            Language::TypeScript => Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
            Language::JavaScript => Some(tree_sitter_javascript::LANGUAGE.into()),
            Language::Python => Some(tree_sitter_python::LANGUAGE.into()),
            Language::Rust => Some(tree_sitter_rust::LANGUAGE.into()),
            Language::Go => Some(tree_sitter_go::LANGUAGE.into()),
            Language::Php => Some(tree_sitter_php::LANGUAGE_PHP.into()),
            Language::Unknown => None,
        }
    }
}

/// Walk a repository, respecting `.gitignore`, returning parseable source files.
///
/// Skips binary files, files larger than 1 MB, and files with unknown
/// extensions. Returned paths are relative to `root` and ordered by file name
/// within each directory, so repeated walks see files in the same order.
///
/// # Errors
///
/// Returns [`QuillError::FileNotFound`] if `root` does not exist.
///
/// # Examples
///
/// ```no_run
/// use std::path::Path;
/// use quill_context::walker::walk_repo;
///
/// let files = walk_repo(Path::new(".")).unwrap();
/// for f in &files {
///     println!("{}: {:?}", f.path.display(), f.language);
/// }
/// ```
pub fn walk_repo(root: &Path) -> Result<Vec<SourceFile>, QuillError> {
    if !root.exists() {
        return Err(QuillError::FileNotFound(root.to_path_buf()));
    }

    let walker = ignore::WalkBuilder::new(root)
        .sort_by_file_name(|a, b| a.cmp(b))
        .build();
    let mut files = Vec::new();

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                debug!(error = %e, "skipping unreadable entry");
                continue;
            }
        };

        let Some(file_type) = entry.file_type() else {
            continue;
        };
        if !file_type.is_file() {
            continue;
        }

        let path = entry.path();

        let metadata = match std::fs::metadata(path) {
            Ok(m) => m,
            Err(_) => continue,
        };
        if metadata.len() > MAX_FILE_SIZE {
            continue;
        }

        let language = Language::from_path(path);
        if language == Language::Unknown {
            continue;
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => continue,
        };

        // Null bytes in the first 8KB mean binary content.
        let check_len = content.len().min(BINARY_CHECK_SIZE);
        if content.as_bytes()[..check_len].contains(&0) {
            continue;
        }

        let relative = match path.strip_prefix(root) {
            Ok(r) => r.to_path_buf(),
            Err(_) => path.to_path_buf(),
        };

        files.push(SourceFile {
            path: relative,
            language,
            content,
        });
    }

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn make_temp_repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        fs::create_dir_all(root.join("Api/Controllers")).unwrap();
        fs::write(
            root.join("Api/Controllers/PetsController.cs"),
            "public class PetsController {}",
        )
        .unwrap();
        fs::write(root.join("Api/Program.cs"), "class Program {}").unwrap();
        fs::write(root.join("Main.java"), "public class Main {}").unwrap();
        fs::write(root.join("app.ts"), "interface App {}").unwrap();
        fs::write(root.join("lib.py"), "class Lib: pass").unwrap();

        fs::write(root.join("README.md"), "# Hello").unwrap();
        fs::write(root.join("data.csv"), "a,b,c").unwrap();

        dir
    }

    #[test]
    fn walk_finds_known_language_files() {
        let dir = make_temp_repo();
        let files = walk_repo(dir.path()).unwrap();

        assert_eq!(files.len(), 5);
        let languages: Vec<Language> = files.iter().map(|f| f.language).collect();
        assert!(languages.contains(&Language::CSharp));
        assert!(languages.contains(&Language::Java));
        assert!(languages.contains(&Language::TypeScript));
        assert!(languages.contains(&Language::Python));
    }

    #[test]
    fn walk_returns_relative_paths() {
        let dir = make_temp_repo();
        let files = walk_repo(dir.path()).unwrap();
        assert!(files
            .iter()
            .any(|f| f.path == Path::new("Api/Controllers/PetsController.cs")));
        assert!(files.iter().all(|f| f.path.is_relative()));
    }

    #[test]
    fn walk_order_is_stable() {
        let dir = make_temp_repo();
        let first: Vec<PathBuf> = walk_repo(dir.path())
            .unwrap()
            .into_iter()
            .map(|f| f.path)
            .collect();
        let second: Vec<PathBuf> = walk_repo(dir.path())
            .unwrap()
            .into_iter()
            .map(|f| f.path)
            .collect();
        assert_eq!(first, second);
    }

    #[test]
    fn walk_respects_gitignore() {
        let dir = make_temp_repo();
        let root = dir.path();

        // The ignore crate needs a .git dir to recognize .gitignore files
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::create_dir_all(root.join("bin")).unwrap();
        fs::write(root.join("bin/Generated.cs"), "class Generated {}").unwrap();
        fs::write(root.join(".gitignore"), "bin/\n").unwrap();

        let files = walk_repo(root).unwrap();
        assert!(files.iter().all(|f| !f.path.starts_with("bin")));
    }

    #[test]
    fn walk_skips_binary_and_large_files() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        let mut binary_content = b"class B { ".to_vec();
        binary_content.push(0);
        binary_content.extend_from_slice(b" }");
        fs::write(root.join("Binary.cs"), &binary_content).unwrap();
        fs::write(root.join("Huge.cs"), "x".repeat(1_048_577)).unwrap();
        fs::write(root.join("Ok.cs"), "class Ok {}").unwrap();

        let files = walk_repo(root).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, PathBuf::from("Ok.cs"));
    }

    #[test]
    fn missing_root_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            walk_repo(&missing),
            Err(QuillError::FileNotFound(_))
        ));
    }
}
