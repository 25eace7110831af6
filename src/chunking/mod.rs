//! Syntax-aware chunk extraction via tree-sitter definition queries

mod languages;

pub use languages::{GrammarRegistration, GrammarRegistry};

use crate::error::{OracleError, Result};
use crate::hash::content_digest;
use std::collections::BTreeMap;
use streaming_iterator::StreamingIterator;
use tree_sitter::Parser;

/// Kind of definition a chunk was extracted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolType {
    Function,
    Class,
    Method,
    Unknown,
}

impl SymbolType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Class => "class",
            Self::Method => "method",
            Self::Unknown => "unknown",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "function" => Self::Function,
            "class" => Self::Class,
            "method" => Self::Method,
            _ => Self::Unknown,
        }
    }

    /// Emission priority when one AST node matches several patterns.
    fn specificity(self) -> u8 {
        match self {
            Self::Method => 3,
            Self::Class => 2,
            Self::Function => 1,
            Self::Unknown => 0,
        }
    }
}

impl std::fmt::Display for SymbolType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One extracted chunk, before the store assigns its id.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub file_path: String,
    pub symbol_name: Option<String>,
    pub symbol_type: SymbolType,
    pub content: String,
    pub content_hash: String,
    /// 1-indexed, inclusive
    pub start_line: usize,
    /// 1-indexed, inclusive
    pub end_line: usize,
    pub language: String,
}

/// Extract definition chunks from one file's source.
///
/// A tree with parse errors still yields the definitions that did parse;
/// only a parser that produces no tree at all is an error. A node matched
/// by more than one pattern (a Python method also matches the plain
/// function pattern) is emitted once with the most specific symbol type.
///
/// # Errors
///
/// Returns `Parse` when tree-sitter cannot produce a tree for the file.
pub fn chunk_source(
    file_path: &str,
    content: &str,
    registration: &GrammarRegistration,
) -> Result<Vec<Chunk>> {
    if content.is_empty() {
        return Ok(Vec::new());
    }

    let mut parser = Parser::new();
    parser
        .set_language(registration.language())
        .map_err(|e| OracleError::Parse(format!("set_language failed: {e}")))?;

    let tree = parser
        .parse(content, None)
        .ok_or_else(|| OracleError::Parse(format!("parse failed for {file_path}")))?;

    let root = tree.root_node();
    if root.has_error() {
        tracing::warn!("Partial parse for {file_path}; extracting what parsed");
    }

    let query = registration.query();
    let (method_idx, class_idx, function_idx) = registration.capture_indices();
    let name_indices: Vec<u32> = languages::NAME_CAPTURES
        .iter()
        .filter_map(|name| query.capture_index_for_name(name))
        .collect();

    // Keyed by node byte range so duplicate matches collapse; BTreeMap keeps
    // document order for the emitted chunks.
    let mut selected: BTreeMap<(usize, usize), (SymbolType, Option<String>, usize, usize)> =
        BTreeMap::new();

    let mut cursor = tree_sitter::QueryCursor::new();
    let mut matches = cursor.matches(query, root, content.as_bytes());
    while let Some(m) = matches.next() {
        let mut primary = None;
        let mut symbol_type = SymbolType::Unknown;
        for capture in m.captures {
            let idx = Some(capture.index);
            if idx == method_idx {
                primary = Some(capture.node);
                symbol_type = SymbolType::Method;
                break;
            } else if idx == class_idx {
                primary = Some(capture.node);
                symbol_type = SymbolType::Class;
            } else if idx == function_idx && primary.is_none() {
                primary = Some(capture.node);
                symbol_type = SymbolType::Function;
            }
        }

        let Some(node) = primary else {
            // Match without a primary capture carries no definition.
            continue;
        };

        let symbol_name = m
            .captures
            .iter()
            .find(|c| name_indices.contains(&c.index))
            .and_then(|c| c.node.utf8_text(content.as_bytes()).ok())
            .map(str::to_string);

        let key = (node.start_byte(), node.end_byte());
        let start_line = node.start_position().row + 1;
        let end_line = node.end_position().row + 1;

        let keep_existing = selected
            .get(&key)
            .is_some_and(|(existing, ..)| existing.specificity() >= symbol_type.specificity());
        if !keep_existing {
            selected.insert(key, (symbol_type, symbol_name, start_line, end_line));
        }
    }

    let chunks = selected
        .into_iter()
        .map(
            |((start_byte, end_byte), (symbol_type, symbol_name, start_line, end_line))| {
                let text = &content[start_byte..end_byte];
                Chunk {
                    file_path: file_path.to_string(),
                    symbol_name,
                    symbol_type,
                    content_hash: content_digest(text.as_bytes()),
                    content: text.to_string(),
                    start_line,
                    end_line,
                    language: registration.language_name().to_string(),
                }
            },
        )
        .collect();

    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> GrammarRegistry {
        GrammarRegistry::with_default_grammars().unwrap()
    }

    fn chunk(registry: &GrammarRegistry, path: &str, source: &str) -> Vec<Chunk> {
        let registration = registry
            .for_path(std::path::Path::new(path))
            .expect("registered extension");
        chunk_source(path, source, &registration).unwrap()
    }

    #[test]
    fn python_function() {
        let registry = registry();
        let chunks = chunk(&registry, "a.py", "def foo():\n    return 1\n");

        assert_eq!(chunks.len(), 1);
        let c = &chunks[0];
        assert_eq!(c.symbol_name.as_deref(), Some("foo"));
        assert_eq!(c.symbol_type, SymbolType::Function);
        assert_eq!(c.start_line, 1);
        assert_eq!(c.end_line, 2);
        assert_eq!(c.language, "python");
        assert_eq!(c.content_hash, content_digest(c.content.as_bytes()));
    }

    #[test]
    fn python_class_with_methods() {
        let registry = registry();
        let source = "class Greeter:\n    def hello(self):\n        pass\n\n    def bye(self):\n        pass\n";
        let chunks = chunk(&registry, "app.py", source);

        let classes: Vec<_> = chunks
            .iter()
            .filter(|c| c.symbol_type == SymbolType::Class)
            .collect();
        let methods: Vec<_> = chunks
            .iter()
            .filter(|c| c.symbol_type == SymbolType::Method)
            .collect();

        assert_eq!(classes.len(), 1);
        assert_eq!(classes[0].symbol_name.as_deref(), Some("Greeter"));
        assert_eq!(methods.len(), 2);
        assert_eq!(methods[0].symbol_name.as_deref(), Some("hello"));
        assert_eq!(methods[1].symbol_name.as_deref(), Some("bye"));
        // Methods never double-emit as plain functions.
        assert_eq!(chunks.len(), 3);
    }

    #[test]
    fn typescript_arrow_function_binding() {
        let registry = registry();
        let source = "const authenticate = (user: string) => {\n  return user.length > 0;\n};\n";
        let chunks = chunk(&registry, "auth.ts", source);

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].symbol_name.as_deref(), Some("authenticate"));
        assert_eq!(chunks[0].symbol_type, SymbolType::Function);
    }

    #[test]
    fn rust_impl_methods() {
        let registry = registry();
        let source = "struct Foo;\n\nimpl Foo {\n    fn bar(&self) -> i32 {\n        42\n    }\n}\n";
        let chunks = chunk(&registry, "foo.rs", source);

        assert!(chunks
            .iter()
            .any(|c| c.symbol_type == SymbolType::Class && c.symbol_name.as_deref() == Some("Foo")));
        assert!(chunks
            .iter()
            .any(|c| c.symbol_type == SymbolType::Method && c.symbol_name.as_deref() == Some("bar")));
    }

    #[test]
    fn go_function_and_method() {
        let registry = registry();
        let source = "package main\n\ntype Server struct{}\n\nfunc (s *Server) Run() {}\n\nfunc main() {}\n";
        let chunks = chunk(&registry, "main.go", source);

        assert!(chunks
            .iter()
            .any(|c| c.symbol_type == SymbolType::Method && c.symbol_name.as_deref() == Some("Run")));
        assert!(chunks.iter().any(
            |c| c.symbol_type == SymbolType::Function && c.symbol_name.as_deref() == Some("main")
        ));
    }

    #[test]
    fn empty_file_yields_no_chunks() {
        let registry = registry();
        assert!(chunk(&registry, "empty.py", "").is_empty());
    }

    #[test]
    fn partial_parse_still_extracts() {
        let registry = registry();
        let source = "def ok():\n    return 1\n\ndef broken(:\n";
        let chunks = chunk(&registry, "broken.py", source);
        assert!(chunks.iter().any(|c| c.symbol_name.as_deref() == Some("ok")));
    }

    #[test]
    fn lines_are_one_indexed_inclusive() {
        let registry = registry();
        let source = "\n\ndef later():\n    pass\n";
        let chunks = chunk(&registry, "late.py", source);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].start_line, 3);
        assert_eq!(chunks[0].end_line, 4);
    }

    #[test]
    fn content_matches_exact_source_slice() {
        let registry = registry();
        let source = "def foo():\n    return 1\n";
        let chunks = chunk(&registry, "a.py", source);
        assert_eq!(chunks[0].content, "def foo():\n    return 1");
    }
}
