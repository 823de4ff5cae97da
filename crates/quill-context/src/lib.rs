//! Source analysis for prompt enrichment.
//!
//! Parses source files with tree-sitter to detect marker annotations and to
//! resolve the classes and interfaces a file references. The declaring
//! files of those types become the related context of a generation unit.

pub mod analyzer;
pub mod parser;
pub mod resolver;
pub mod walker;

pub use analyzer::{SourceAnalyzer, WorkspaceAnalyzer};
pub use parser::{has_marker, TypeKind, TypeSymbol};
pub use resolver::{ContextResolver, CONTEXT_SEPARATOR};
pub use walker::{walk_repo, Language, SourceFile};
