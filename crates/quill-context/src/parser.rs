use std::collections::HashSet;
use std::path::PathBuf;

use quill_core::QuillError;
use tree_sitter::{Node, Parser, Tree};

use crate::walker::{Language, SourceFile};

/// A type declaration extracted from source code via tree-sitter.
///
/// # Examples
///
/// ```
/// use std::path::PathBuf;
/// use quill_context::parser::{TypeKind, TypeSymbol};
///
/// let sym = TypeSymbol {
///     name: "PetRepository".into(),
///     kind: TypeKind::Class,
///     path: PathBuf::from("src/PetRepository.cs"),
///     line: 3,
/// };
/// assert!(sym.kind.is_context_relevant());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeSymbol {
    /// Declared type name.
    pub name: String,
    /// What kind of declaration this is.
    pub kind: TypeKind,
    /// File path (relative to repo root).
    pub path: PathBuf,
    /// Line number where the declaration starts (1-indexed).
    pub line: u32,
}

/// Classification of extracted type declarations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    /// Classes, including C# and Java records.
    Class,
    /// Interfaces, Rust traits and Go interface types.
    Interface,
    /// Value types: C# and Rust structs, C# record structs, Go struct types.
    Struct,
    Enum,
}

impl TypeKind {
    /// Whether declarations of this kind are pulled in as related context.
    ///
    /// Only classes and interfaces qualify.
    ///
    /// # Examples
    ///
    /// ```
    /// use quill_context::parser::TypeKind;
    ///
    /// assert!(TypeKind::Interface.is_context_relevant());
    /// assert!(!TypeKind::Enum.is_context_relevant());
    /// ```
    pub fn is_context_relevant(&self) -> bool {
        matches!(self, TypeKind::Class | TypeKind::Interface)
    }
}

/// Extract all type declarations from a source file.
///
/// Tree-sitter is error-tolerant, so partial results are returned even for
/// files with syntax errors. Unknown languages yield an empty vec.
///
/// # Errors
///
/// Returns [`QuillError::Parse`] if the language grammar cannot be loaded.
///
/// # Examples
///
/// ```
/// use std::path::PathBuf;
/// use quill_context::walker::{Language, SourceFile};
/// use quill_context::parser::{extract_declarations, TypeKind};
///
/// let file = SourceFile {
///     path: PathBuf::from("Pets.cs"),
///     language: Language::CSharp,
///     content: "public interface IPetStore {}\npublic class PetStore : IPetStore {}".to_string(),
/// };
/// let decls = extract_declarations(&file).unwrap();
/// assert_eq!(decls.len(), 2);
/// assert_eq!(decls[0].name, "IPetStore");
/// assert_eq!(decls[0].kind, TypeKind::Interface);
/// ```
pub fn extract_declarations(file: &SourceFile) -> Result<Vec<TypeSymbol>, QuillError> {
    let Some(tree) = parse(file.language, &file.content)? else {
        return Ok(Vec::new());
    };

    let mut symbols = Vec::new();
    collect_declarations(
        tree.root_node(),
        file.content.as_bytes(),
        file,
        &mut symbols,
    );
    Ok(symbols)
}

/// Extract the names of all identifiers that may refer to types, in source order.
///
/// Declaration name sites are excluded, so `class Foo` does not reference
/// `Foo`. In C# every `name` site is excluded (members, locals, parameters,
/// member accesses) along with namespace names and `using` directives, which
/// leaves type positions and plain expression identifiers. Each name appears
/// once, at the position of its first use.
///
/// Resolution is by name only: an expression identifier that happens to
/// share a type's name, such as an unqualified property assignment, still
/// counts as a reference.
///
/// # Errors
///
/// Returns [`QuillError::Parse`] if the language grammar cannot be loaded.
///
/// # Examples
///
/// ```
/// use quill_context::walker::Language;
/// use quill_context::parser::extract_type_references;
///
/// let refs = extract_type_references(
///     Language::CSharp,
///     "class Walker { private IPetStore store; private PetStore impl; }",
/// )
/// .unwrap();
/// assert!(refs.contains(&"IPetStore".to_string()));
/// assert!(!refs.contains(&"Walker".to_string()));
/// ```
pub fn extract_type_references(
    language: Language,
    content: &str,
) -> Result<Vec<String>, QuillError> {
    let Some(tree) = parse(language, content)? else {
        return Ok(Vec::new());
    };

    let mut excluded = HashSet::new();
    let mut seen = HashSet::new();
    let mut refs = Vec::new();
    collect_references(
        tree.root_node(),
        content.as_bytes(),
        language,
        &mut excluded,
        &mut seen,
        &mut refs,
    );
    Ok(refs)
}

/// Check whether any attribute, annotation or decorator in `content` names `marker`.
///
/// Matching is substring based, so `UnitTestSubject` also matches
/// `[UnitTestSubjectAttribute]`. Mentions in comments or strings do not count.
///
/// # Errors
///
/// Returns [`QuillError::Parse`] if the language grammar cannot be loaded.
///
/// # Examples
///
/// ```
/// use quill_context::walker::Language;
/// use quill_context::parser::has_marker;
///
/// let src = "[UnitTestSubject]\npublic class A {}";
/// assert!(has_marker(Language::CSharp, src, "UnitTestSubject").unwrap());
/// assert!(!has_marker(Language::CSharp, "public class B {}", "UnitTestSubject").unwrap());
/// ```
pub fn has_marker(language: Language, content: &str, marker: &str) -> Result<bool, QuillError> {
    if !content.contains(marker) {
        return Ok(false);
    }
    let Some(tree) = parse(language, content)? else {
        return Ok(false);
    };
    Ok(find_marker(
        tree.root_node(),
        content.as_bytes(),
        language,
        marker,
    ))
}

fn parse(language: Language, content: &str) -> Result<Option<Tree>, QuillError> {
    let Some(ts_language) = language.tree_sitter_language() else {
        return Ok(None);
    };

    let mut parser = Parser::new();
    parser
        .set_language(&ts_language)
        .map_err(|e| QuillError::Parse(format!("failed to set language: {e}")))?;

    Ok(parser.parse(content, None))
}

/// Map a node to the type kind it declares, if it is a type declaration.
fn declaration_kind(language: Language, node: &Node) -> Option<TypeKind> {
    match (language, node.kind()) {
        (Language::CSharp, "class_declaration") => Some(TypeKind::Class),
        (Language::CSharp, "interface_declaration") => Some(TypeKind::Interface),
        (Language::CSharp, "struct_declaration") => Some(TypeKind::Struct),
        (Language::CSharp, "enum_declaration") => Some(TypeKind::Enum),
        (Language::CSharp, "record_declaration") => Some(TypeKind::Class),
        (Language::CSharp, "record_struct_declaration") => Some(TypeKind::Struct),

        (Language::Java, "class_declaration") => Some(TypeKind::Class),
        (Language::Java, "interface_declaration") => Some(TypeKind::Interface),
        (Language::Java, "enum_declaration") => Some(TypeKind::Enum),
        (Language::Java, "record_declaration") => Some(TypeKind::Class),

        (Language::TypeScript, "class_declaration" | "abstract_class_declaration") => {
            Some(TypeKind::Class)
        }
        (Language::TypeScript, "interface_declaration") => Some(TypeKind::Interface),
        (Language::TypeScript, "enum_declaration") => Some(TypeKind::Enum),

        (Language::JavaScript, "class_declaration") => Some(TypeKind::Class),

        (Language::Python, "class_definition") => Some(TypeKind::Class),

        (Language::Rust, "struct_item") => Some(TypeKind::Struct),
        (Language::Rust, "enum_item") => Some(TypeKind::Enum),
        (Language::Rust, "trait_item") => Some(TypeKind::Interface),

        (Language::Go, "type_spec") => {
            let type_node = node.child_by_field_name("type")?;
            match type_node.kind() {
                "struct_type" => Some(TypeKind::Struct),
                "interface_type" => Some(TypeKind::Interface),
                _ => None,
            }
        }

        (Language::Php, "class_declaration" | "trait_declaration") => Some(TypeKind::Class),
        (Language::Php, "interface_declaration") => Some(TypeKind::Interface),
        (Language::Php, "enum_declaration") => Some(TypeKind::Enum),

        _ => None,
    }
}

fn collect_declarations(
    node: Node,
    source: &[u8],
    file: &SourceFile,
    symbols: &mut Vec<TypeSymbol>,
) {
    if let Some(kind) = declaration_kind(file.language, &node) {
        if let Some(name_node) = node.child_by_field_name("name") {
            let name = node_text(&name_node, source);
            if !name.is_empty() {
                symbols.push(TypeSymbol {
                    name,
                    kind,
                    path: file.path.clone(),
                    line: node.start_position().row as u32 + 1,
                });
            }
        }
    }

    // Nested types are declarations too
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_declarations(child, source, file, symbols);
    }
}

fn collect_references(
    node: Node,
    source: &[u8],
    language: Language,
    excluded: &mut HashSet<usize>,
    seen: &mut HashSet<String>,
    refs: &mut Vec<String>,
) {
    // Parents are visited before children, so name sites are known in time
    if excluded.contains(&node.id()) || skips_subtree(language, &node) {
        return;
    }
    if is_name_owner(language, &node) {
        if let Some(name_node) = node.child_by_field_name("name") {
            excluded.insert(name_node.id());
        }
    }

    if is_identifier(language, node.kind()) {
        let name = node_text(&node, source);
        if !name.is_empty() && seen.insert(name.clone()) {
            refs.push(name);
        }
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_references(child, source, language, excluded, seen, refs);
    }
}

/// Whether the `name` child of `node` is a binding site rather than a type use.
fn is_name_owner(language: Language, node: &Node) -> bool {
    match language {
        // In qualified and generic names the `name` part is the type itself
        Language::CSharp => !matches!(
            node.kind(),
            "qualified_name" | "generic_name" | "alias_qualified_name"
        ),
        _ => declaration_kind(language, node).is_some(),
    }
}

fn skips_subtree(language: Language, node: &Node) -> bool {
    language == Language::CSharp && node.kind() == "using_directive"
}

fn is_identifier(language: Language, kind: &str) -> bool {
    match language {
        Language::Php => kind == "name",
        _ => kind == "identifier" || kind == "type_identifier",
    }
}

fn is_marker_node(language: Language, kind: &str) -> bool {
    match language {
        Language::CSharp | Language::Php => kind == "attribute",
        Language::Java => kind == "marker_annotation" || kind == "annotation",
        Language::TypeScript | Language::JavaScript | Language::Python => kind == "decorator",
        Language::Rust => kind == "attribute_item",
        Language::Go | Language::Unknown => false,
    }
}

fn find_marker(node: Node, source: &[u8], language: Language, marker: &str) -> bool {
    if is_marker_node(language, node.kind()) {
        let text = node
            .child_by_field_name("name")
            .map(|n| node_text(&n, source))
            .unwrap_or_else(|| node_text(&node, source));
        if text.contains(marker) {
            return true;
        }
    }

    let mut cursor = node.walk();
    let found = node
        .children(&mut cursor)
        .any(|child| find_marker(child, source, language, marker));
    found
}

fn node_text(node: &Node, source: &[u8]) -> String {
    let start = node.start_byte();
    let end = node.end_byte();
    if start >= source.len() || end > source.len() {
        return String::new();
    }
    String::from_utf8_lossy(&source[start..end]).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(path: &str, language: Language, content: &str) -> SourceFile {
        SourceFile {
            path: PathBuf::from(path),
            language,
            content: content.to_string(),
        }
    }

    fn names(symbols: &[TypeSymbol]) -> Vec<&str> {
        symbols.iter().map(|s| s.name.as_str()).collect()
    }

    #[test]
    fn csharp_declarations() {
        let file = source(
            "Models.cs",
            Language::CSharp,
            r#"namespace PetStore.Models;

public interface IPet { string Name { get; } }

public class Dog : IPet
{
    public string Name => "Rex";
}

public struct Point { public int X; }

public enum Color { Red, Green }

public record Owner(string Name);

public record struct Tag(string Value);
"#,
        );
        let decls = extract_declarations(&file).unwrap();
        assert_eq!(
            names(&decls),
            vec!["IPet", "Dog", "Point", "Color", "Owner", "Tag"]
        );
        assert_eq!(decls[0].kind, TypeKind::Interface);
        assert_eq!(decls[1].kind, TypeKind::Class);
        assert_eq!(decls[2].kind, TypeKind::Struct);
        assert_eq!(decls[3].kind, TypeKind::Enum);
        assert_eq!(decls[4].kind, TypeKind::Class);
        assert_eq!(decls[5].kind, TypeKind::Struct);
        assert_eq!(decls[1].line, 5);
    }

    #[test]
    fn csharp_nested_class_is_declared() {
        let file = source(
            "Outer.cs",
            Language::CSharp,
            "class Outer { class Inner {} }",
        );
        let decls = extract_declarations(&file).unwrap();
        assert_eq!(names(&decls), vec!["Outer", "Inner"]);
    }

    #[test]
    fn java_declarations() {
        let file = source(
            "Shop.java",
            Language::Java,
            "interface Store {}\nclass Shop implements Store {}\nenum Size { S, M }",
        );
        let decls = extract_declarations(&file).unwrap();
        assert_eq!(names(&decls), vec!["Store", "Shop", "Size"]);
        assert_eq!(decls[0].kind, TypeKind::Interface);
    }

    #[test]
    fn typescript_declarations() {
        let file = source(
            "app.ts",
            Language::TypeScript,
            "interface Repo { find(): void }\nexport class SqlRepo implements Repo { find() {} }",
        );
        let decls = extract_declarations(&file).unwrap();
        assert_eq!(names(&decls), vec!["Repo", "SqlRepo"]);
        assert_eq!(decls[1].kind, TypeKind::Class);
    }

    #[test]
    fn python_declarations() {
        let file = source(
            "models.py",
            Language::Python,
            "class Base:\n    pass\n\nclass Child(Base):\n    pass\n",
        );
        let decls = extract_declarations(&file).unwrap();
        assert_eq!(names(&decls), vec!["Base", "Child"]);
    }

    #[test]
    fn rust_trait_is_an_interface() {
        let file = source(
            "lib.rs",
            Language::Rust,
            "pub trait Store {}\npub struct Memory;\npub enum Mode { A }",
        );
        let decls = extract_declarations(&file).unwrap();
        assert_eq!(names(&decls), vec!["Store", "Memory", "Mode"]);
        assert_eq!(decls[0].kind, TypeKind::Interface);
        assert_eq!(decls[1].kind, TypeKind::Struct);
    }

    #[test]
    fn go_type_specs_use_the_underlying_type() {
        let file = source(
            "store.go",
            Language::Go,
            "package store\n\ntype Store interface { Get() }\ntype Memory struct {}\ntype ID int\n",
        );
        let decls = extract_declarations(&file).unwrap();
        assert_eq!(names(&decls), vec!["Store", "Memory"]);
        assert_eq!(decls[0].kind, TypeKind::Interface);
        assert_eq!(decls[1].kind, TypeKind::Struct);
    }

    #[test]
    fn php_declarations() {
        let file = source(
            "Shop.php",
            Language::Php,
            "<?php\ninterface Store {}\nclass Shop implements Store {}\n",
        );
        let decls = extract_declarations(&file).unwrap();
        assert_eq!(names(&decls), vec!["Store", "Shop"]);
    }

    #[test]
    fn unknown_language_yields_nothing() {
        let file = source("notes.txt", Language::Unknown, "class Nope {}");
        assert!(extract_declarations(&file).unwrap().is_empty());
        assert!(extract_type_references(Language::Unknown, "class Nope {}")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn references_exclude_declaration_names_and_keep_first_use_order() {
        let refs = extract_type_references(
            Language::CSharp,
            r#"public class PetService
{
    private readonly IPetStore _store;
    private readonly Logger _log;

    public PetService(IPetStore store) { _store = store; }
}
"#,
        )
        .unwrap();

        let store_pos = refs.iter().position(|r| r == "IPetStore").unwrap();
        let logger_pos = refs.iter().position(|r| r == "Logger").unwrap();
        assert!(store_pos < logger_pos);
        assert_eq!(refs.iter().filter(|r| *r == "IPetStore").count(), 1);
        // Class and constructor names are both name sites
        assert!(!refs.contains(&"PetService".to_string()));
    }

    #[test]
    fn csharp_member_and_namespace_names_are_not_references() {
        let refs = extract_type_references(
            Language::CSharp,
            r#"using Pets.Storage;
namespace Pets.Core;

public class Shop
{
    public Owner Buyer { get; set; }

    public void Sell(Invoice receipt)
    {
        var Seller = new Clerk();
        this.Ledger = Registry.Open();
    }
}
"#,
        )
        .unwrap();

        for expected in ["Owner", "Invoice", "Clerk", "Registry"] {
            assert!(refs.contains(&expected.to_string()), "missing {expected}");
        }
        let absent = [
            "Pets", "Storage", "Core", "Shop", "Buyer", "Sell", "receipt", "Seller", "Ledger",
            "Open",
        ];
        for name in absent {
            assert!(!refs.contains(&name.to_string()), "unexpected {name}");
        }
    }

    #[test]
    fn every_language_grammar_loads() {
        for language in [
            Language::CSharp,
            Language::Java,
            Language::TypeScript,
            Language::JavaScript,
            Language::Python,
            Language::Rust,
            Language::Go,
            Language::Php,
        ] {
            assert!(
                extract_type_references(language, "").is_ok(),
                "{language:?} grammar failed to load"
            );
        }
    }

    #[test]
    fn references_include_generic_arguments() {
        let refs = extract_type_references(
            Language::CSharp,
            "class Shelter { List<Dog> dogs; }",
        )
        .unwrap();
        assert!(refs.contains(&"List".to_string()));
        assert!(refs.contains(&"Dog".to_string()));
        assert!(!refs.contains(&"Shelter".to_string()));
    }

    #[test]
    fn csharp_marker_attribute() {
        let marked = "[UnitTestSubject]\npublic class A { }";
        let suffixed = "[UnitTestSubjectAttribute]\npublic class A { }";
        let with_args = "[Serializable, UnitTestSubject(\"fast\")]\npublic class A { }";
        assert!(has_marker(Language::CSharp, marked, "UnitTestSubject").unwrap());
        assert!(has_marker(Language::CSharp, suffixed, "UnitTestSubject").unwrap());
        assert!(has_marker(Language::CSharp, with_args, "UnitTestSubject").unwrap());
    }

    #[test]
    fn marker_in_comment_or_string_does_not_count() {
        let commented = "// UnitTestSubject\npublic class B { string s = \"UnitTestSubject\"; }";
        assert!(!has_marker(Language::CSharp, commented, "UnitTestSubject").unwrap());
    }

    #[test]
    fn other_attributes_do_not_match() {
        let src = "[Obsolete]\npublic class B { }";
        assert!(!has_marker(Language::CSharp, src, "UnitTestSubject").unwrap());
    }

    #[test]
    fn java_python_and_typescript_markers() {
        assert!(has_marker(
            Language::Java,
            "@UnitTestSubject\nclass A {}",
            "UnitTestSubject"
        )
        .unwrap());
        assert!(has_marker(
            Language::Python,
            "@unit_test_subject\nclass A:\n    pass\n",
            "unit_test_subject"
        )
        .unwrap());
        assert!(has_marker(
            Language::TypeScript,
            "@UnitTestSubject()\nclass A {}",
            "UnitTestSubject"
        )
        .unwrap());
    }

    #[test]
    fn go_has_no_markers() {
        let src = "package a\n// UnitTestSubject\ntype A struct {}\n";
        assert!(!has_marker(Language::Go, src, "UnitTestSubject").unwrap());
    }
}
