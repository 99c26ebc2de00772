use anyhow::{Context, Result};
use log::{debug, warn};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tree_sitter::{Language, Node, Parser, Tree};

fn go_language() -> Language {
    tree_sitter_go::LANGUAGE.into()
}

/// AST (Abstract Syntax Tree) parser for Go source files.
///
/// The `GoParser` uses the tree-sitter Go grammar to parse Go source code into
/// a concrete syntax tree, which is then analyzed to recognize handlers and to
/// extract request/response contracts, enumerations, and type declarations.
///
/// # Example
///
/// ```no_run
/// use contract_from_source::parser::GoParser;
/// use std::path::Path;
///
/// let parsed = GoParser::parse_file(Path::new("internal/api/users.go")).unwrap();
/// println!("Parsed {} top-level declarations", parsed.root().named_child_count());
/// ```
pub struct GoParser;

/// A successfully parsed Go file with its syntax tree.
///
/// Holds the original file path, the source text, and the parsed tree.
#[derive(Debug, Clone)]
pub struct ParsedFile {
    /// Path to the source file
    pub path: PathBuf,
    /// The source text backing the tree
    pub source: Arc<String>,
    /// The parsed syntax tree
    pub tree: Tree,
}

/// A single import of a Go file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoImport {
    /// The import path, e.g. "net/http" or "github.com/labstack/echo/v4"
    pub path: String,
    /// Optional alias, e.g. "dto" in `import dto "example.com/api/models"`
    pub alias: Option<String>,
}

impl ParsedFile {
    /// Root node of the syntax tree.
    pub fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }

    /// Source text of a node.
    pub fn text(&self, node: Node) -> &str {
        node.utf8_text(self.source.as_bytes()).unwrap_or_default()
    }

    /// Whether the tree contains syntax errors. Tree-sitter is error
    /// tolerant, so parsing succeeds even for broken files; callers decide
    /// whether a broken file disqualifies the whole package.
    pub fn has_syntax_errors(&self) -> bool {
        self.tree.root_node().has_error()
    }

    /// Package name from the package clause, if present.
    pub fn package_name(&self) -> Option<String> {
        let root = self.root();
        for i in 0..root.named_child_count() {
            let child = root.named_child(i)?;
            if child.kind() == "package_clause" {
                for j in 0..child.child_count() {
                    if let Some(ident) = child.child(j) {
                        if ident.kind() == "package_identifier" {
                            return Some(self.text(ident).to_string());
                        }
                    }
                }
            }
        }
        None
    }

    /// All imports declared by the file, with explicit aliases preserved.
    /// Blank and dot imports are reported with their marker as the alias.
    pub fn imports(&self) -> Vec<GoImport> {
        let mut imports = Vec::new();
        let root = self.root();
        for i in 0..root.named_child_count() {
            let Some(child) = root.named_child(i) else {
                continue;
            };
            if child.kind() != "import_declaration" {
                continue;
            }
            collect_import_specs(child, self, &mut imports);
        }
        imports
    }
}

fn collect_import_specs(node: Node, file: &ParsedFile, out: &mut Vec<GoImport>) {
    if node.kind() == "import_spec" {
        let path = node
            .child_by_field_name("path")
            .map(|p| crate::meta::unquote(file.text(p)))
            .unwrap_or_default();
        let alias = node
            .child_by_field_name("name")
            .map(|n| file.text(n).to_string());
        if !path.is_empty() {
            out.push(GoImport { path, alias });
        }
        return;
    }

    for i in 0..node.named_child_count() {
        if let Some(child) = node.named_child(i) {
            collect_import_specs(child, file, out);
        }
    }
}

impl GoParser {
    /// Parses a single Go source file into a syntax tree.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the Go source file to parse
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or the parser cannot be
    /// initialized. Syntactically broken files still parse (tree-sitter is
    /// error tolerant); inspect [`ParsedFile::has_syntax_errors`].
    pub fn parse_file(path: &Path) -> Result<ParsedFile> {
        debug!("Parsing file: {}", path.display());

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read file: {}", path.display()))?;

        Self::parse_source(path, &content)
    }

    /// Parses Go source text under the given path label.
    pub fn parse_source(path: &Path, content: &str) -> Result<ParsedFile> {
        let mut parser = Parser::new();
        parser
            .set_language(&go_language())
            .context("Failed to load Go grammar")?;

        let source = Arc::new(content.to_string());
        let tree = parser
            .parse(&*source, None)
            .with_context(|| format!("Failed to parse Go syntax in file: {}", path.display()))?;

        debug!("Successfully parsed file: {}", path.display());

        Ok(ParsedFile {
            path: path.to_path_buf(),
            source,
            tree,
        })
    }

    /// Parses multiple Go source files, continuing even if some fail.
    ///
    /// Files that fail to parse are logged as warnings, but parsing continues
    /// for the remaining files so a partial contract can still be produced.
    pub fn parse_files(paths: &[PathBuf]) -> Vec<Result<ParsedFile>> {
        debug!("Parsing {} files", paths.len());

        let results: Vec<Result<ParsedFile>> = paths
            .iter()
            .map(|path| match Self::parse_file(path) {
                Ok(parsed) => Ok(parsed),
                Err(e) => {
                    warn!("Failed to parse {}: {}", path.display(), e);
                    Err(e)
                }
            })
            .collect();

        let success_count = results.iter().filter(|r| r.is_ok()).count();
        let failure_count = results.len() - success_count;

        debug!(
            "Parsing complete: {} succeeded, {} failed",
            success_count, failure_count
        );

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;
    use tempfile::TempDir;

    /// Helper function to create a temporary file with content
    fn create_temp_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let file_path = dir.path().join(name);
        let mut file = fs::File::create(&file_path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file_path
    }

    fn parse(content: &str) -> ParsedFile {
        GoParser::parse_source(Path::new("test.go"), content).unwrap()
    }

    #[test]
    fn test_parse_valid_go_file() {
        let temp_dir = TempDir::new().unwrap();
        let valid_code = r#"
package api

import "net/http"

type User struct {
    ID   int    `json:"id"`
    Name string `json:"name"`
}

func health() int {
    return http.StatusOK
}
"#;

        let file_path = create_temp_file(&temp_dir, "valid.go", valid_code);
        let result = GoParser::parse_file(&file_path);

        assert!(result.is_ok());
        let parsed = result.unwrap();
        assert_eq!(parsed.path, file_path);
        assert_eq!(parsed.root().kind(), "source_file");
        assert!(!parsed.has_syntax_errors());
    }

    #[test]
    fn test_parse_nonexistent_file() {
        let result = GoParser::parse_file(Path::new("/nonexistent/file.go"));

        assert!(result.is_err());
        let err_msg = result.unwrap_err().to_string();
        assert!(err_msg.contains("Failed to read file"));
    }

    #[test]
    fn test_parse_broken_file_reports_syntax_errors() {
        let parsed = parse("package main\nfunc broken(\n");
        assert!(parsed.has_syntax_errors());
    }

    #[test]
    fn test_parse_empty_file() {
        let parsed = parse("");
        assert_eq!(parsed.root().kind(), "source_file");
        assert_eq!(parsed.root().named_child_count(), 0);
    }

    #[test]
    fn test_package_name() {
        let parsed = parse("package handlers\n");
        assert_eq!(parsed.package_name().as_deref(), Some("handlers"));
    }

    #[test]
    fn test_package_name_missing() {
        let parsed = parse("// just a comment\n");
        assert_eq!(parsed.package_name(), None);
    }

    #[test]
    fn test_imports_grouped_and_aliased() {
        let parsed = parse(
            r#"
package main

import (
    "net/http"
    dto "example.com/api/models"

    "github.com/labstack/echo/v4"
)
"#,
        );

        let imports = parsed.imports();
        assert_eq!(imports.len(), 3);
        assert_eq!(imports[0].path, "net/http");
        assert_eq!(imports[0].alias, None);
        assert_eq!(imports[1].path, "example.com/api/models");
        assert_eq!(imports[1].alias.as_deref(), Some("dto"));
        assert_eq!(imports[2].path, "github.com/labstack/echo/v4");
    }

    #[test]
    fn test_imports_single_form() {
        let parsed = parse("package main\n\nimport \"fmt\"\n");
        let imports = parsed.imports();
        assert_eq!(imports.len(), 1);
        assert_eq!(imports[0].path, "fmt");
    }

    #[test]
    fn test_parse_files_batch() {
        let temp_dir = TempDir::new().unwrap();

        let file1 = create_temp_file(&temp_dir, "a.go", "package a\n");
        let file2 = create_temp_file(&temp_dir, "b.go", "package b\n");
        let missing = temp_dir.path().join("missing.go");

        let paths = vec![file1.clone(), file2.clone(), missing];
        let results = GoParser::parse_files(&paths);

        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(results[1].is_ok());
        assert!(results[2].is_err());
        assert_eq!(results[0].as_ref().unwrap().path, file1);
        assert_eq!(results[1].as_ref().unwrap().path, file2);
    }

    #[test]
    fn test_parse_files_empty_list() {
        let paths: Vec<PathBuf> = vec![];
        let results = GoParser::parse_files(&paths);

        assert_eq!(results.len(), 0);
    }

    #[test]
    fn test_source_content_preserved() {
        let code = "package main\n\nvar x = 42\n";
        let parsed = parse(code);
        assert_eq!(parsed.source.as_str(), code);
    }
}
