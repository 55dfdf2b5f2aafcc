//! Go source parsing via tree-sitter.
//!
//! A `GoParser` owns one `tree_sitter::Parser`, which is `Send` but not
//! `Sync`, so each scan worker keeps its own instance.

use thiserror::Error;
use tree_sitter::{Language, Node, Parser, Tree};

/// Errors produced while turning a source file into a syntax tree.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("failed to load Go grammar: {0}")]
    Language(#[from] tree_sitter::LanguageError),
    #[error("parser produced no tree for {0}")]
    NoTree(String),
    #[error("syntax error in {path} at line {line}")]
    Syntax { path: String, line: usize },
}

/// A parsed tree-sitter tree and the source it was built from.
pub struct ParsedFile {
    /// The tree-sitter parse tree.
    pub tree: Tree,
    /// Source bytes the tree was parsed from.
    pub source: Vec<u8>,
    /// The file identity used in every location derived from this tree.
    pub path: String,
}

impl ParsedFile {
    /// Get text for a tree-sitter node.
    pub fn node_text(&self, node: Node) -> &str {
        node.utf8_text(&self.source).unwrap_or("")
    }
}

/// 1-indexed line on which a node starts.
pub fn line_of(node: Node) -> usize {
    node.start_position().row + 1
}

/// Parser for Go source files.
pub struct GoParser {
    parser: Parser,
}

impl GoParser {
    /// Create a parser with the Go grammar loaded.
    pub fn new() -> Result<Self, ParseError> {
        let language: Language = tree_sitter_go::LANGUAGE.into();
        let mut parser = Parser::new();
        parser.set_language(&language)?;
        Ok(Self { parser })
    }

    /// Parse one file.
    ///
    /// Trees that contain ERROR or MISSING nodes are rejected: a file the Go
    /// compiler would refuse is skipped rather than half-analyzed.
    pub fn parse(&mut self, path: &str, source: Vec<u8>) -> Result<ParsedFile, ParseError> {
        let tree = self
            .parser
            .parse(&source, None)
            .ok_or_else(|| ParseError::NoTree(path.to_string()))?;

        let root = tree.root_node();
        if root.has_error() {
            let line = first_error_line(root).unwrap_or_else(|| line_of(root));
            return Err(ParseError::Syntax {
                path: path.to_string(),
                line,
            });
        }

        Ok(ParsedFile {
            tree,
            source,
            path: path.to_string(),
        })
    }
}

/// Find the line of the first ERROR or MISSING node in document order.
fn first_error_line(root: Node) -> Option<usize> {
    let mut cursor = root.walk();
    loop {
        let node = cursor.node();
        if node.is_error() || node.is_missing() {
            return Some(line_of(node));
        }
        // Only descend into subtrees that actually contain the error.
        if node.has_error() && cursor.goto_first_child() {
            continue;
        }
        loop {
            if cursor.goto_next_sibling() {
                break;
            }
            if !cursor.goto_parent() {
                return None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_file() {
        let mut parser = GoParser::new().unwrap();
        let parsed = parser
            .parse("main.go", b"package main\n\nfunc main() {}\n".to_vec())
            .unwrap();

        assert_eq!(parsed.path, "main.go");
        assert_eq!(parsed.tree.root_node().kind(), "source_file");
        assert!(!parsed.tree.root_node().has_error());
    }

    #[test]
    fn test_parse_rejects_syntax_errors() {
        let mut parser = GoParser::new().unwrap();
        let source = b"package main\n\nfunc main() {\n    x := \n}\n}\n".to_vec();

        match parser.parse("broken.go", source) {
            Err(ParseError::Syntax { path, line }) => {
                assert_eq!(path, "broken.go");
                assert!(line >= 3, "error line should be inside main, got {}", line);
            }
            Err(other) => panic!("expected syntax error, got {}", other),
            Ok(_) => panic!("expected syntax error, got a tree"),
        }
    }

    #[test]
    fn test_node_text_and_line() {
        let mut parser = GoParser::new().unwrap();
        let parsed = parser
            .parse("pkg.go", b"package pkg\n\nvar answer = 42\n".to_vec())
            .unwrap();

        let root = parsed.tree.root_node();
        let decl = root
            .children(&mut root.walk())
            .find(|n| n.kind() == "var_declaration")
            .unwrap();

        assert_eq!(line_of(decl), 3);
        assert_eq!(parsed.node_text(decl), "var answer = 42");
    }

    #[test]
    fn test_parser_is_reusable() {
        let mut parser = GoParser::new().unwrap();
        assert!(parser.parse("a.go", b"package a\n".to_vec()).is_ok());
        assert!(parser.parse("b.go", b"package b\nfunc {\n".to_vec()).is_err());
        assert!(parser.parse("c.go", b"package c\n".to_vec()).is_ok());
    }
}
