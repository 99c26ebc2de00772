//! Symbol resolvers for the two reference constant namespaces: HTTP status
//! codes and MIME content types.
//!
//! Each resolver loads its reference package once at construction (a
//! bundled source snapshot of the namespace, parsed with the same Go
//! pipeline as everything else), indexes the prefix-matched constants, and
//! is read-only afterwards, so instances can be shared across analysis
//! workers freely. Construction failure is fatal for the whole engine
//! since every extractor depends on at least one resolver.

use crate::error::{Error, Result};
use crate::meta;
use crate::parser::{GoParser, ParsedFile};
use log::debug;
use std::collections::HashMap;
use std::path::Path;
use tree_sitter::Node;

/// Snapshot of the net/http status-code constant namespace.
const STATUS_REFERENCE: &str = include_str!("../reference/net_http_status.go");
/// Snapshot of the Echo MIME constant namespace.
const MIME_REFERENCE: &str = include_str!("../reference/echo_mime.go");

/// Content types the framework binds by default when a bound struct gives
/// no tag evidence.
pub const MIME_APPLICATION_JSON: &str = "application/json";
pub const MIME_APPLICATION_XML: &str = "application/xml";
/// URL-encoded form payloads.
pub const MIME_APPLICATION_FORM: &str = "application/x-www-form-urlencoded";
/// Multipart form payloads, the only form encoding able to carry files.
pub const MIME_MULTIPART_FORM: &str = "multipart/form-data";
pub const MIME_TEXT_PLAIN: &str = "text/plain";

/// Resolves status-code expressions (`200` or `http.StatusOK`) to their
/// integer value.
pub struct StatusCodeResolver {
    codes: HashMap<String, u16>,
}

impl StatusCodeResolver {
    /// Loads the status-code reference namespace and indexes every
    /// `Status*` constant.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ReferenceLoad`] when the reference source cannot be
    /// parsed or yields no constants; the engine cannot run without it.
    pub fn new() -> Result<Self> {
        let reference = load_reference("net/http", "net_http_status.go", STATUS_REFERENCE)?;

        let mut codes = HashMap::new();
        for (name, value) in reference_constants(&reference, "Status") {
            if let Ok(code) = value.parse::<u16>() {
                codes.insert(name, code);
            }
        }

        if codes.is_empty() {
            return Err(Error::ReferenceLoad {
                package: "net/http".to_string(),
                message: "no status constants found".to_string(),
            });
        }

        debug!("Indexed {} status-code constants", codes.len());
        Ok(Self { codes })
    }

    /// Resolves an expression node to a status code. Accepts an integer
    /// literal or a `http.StatusX` selector; anything else fails with
    /// [`Error::UnresolvedConstant`].
    pub fn resolve(&self, file: &ParsedFile, expr: Node) -> Result<u16> {
        match expr.kind() {
            "int_literal" => {
                file.text(expr)
                    .parse::<u16>()
                    .map_err(|_| Error::UnresolvedConstant {
                        expr: file.text(expr).to_string(),
                        expected: "an integer status code".to_string(),
                    })
            }
            "selector_expression" => {
                let (receiver, name) = selector_parts(file, expr)?;
                if receiver != "http" {
                    return Err(Error::UnresolvedConstant {
                        expr: file.text(expr).to_string(),
                        expected: "a constant from net/http".to_string(),
                    });
                }
                self.codes
                    .get(&name)
                    .copied()
                    .ok_or_else(|| Error::UnresolvedConstant {
                        expr: file.text(expr).to_string(),
                        expected: "a known net/http status constant".to_string(),
                    })
            }
            _ => Err(Error::UnresolvedConstant {
                expr: file.text(expr).to_string(),
                expected: "an int literal or http.StatusX selector".to_string(),
            }),
        }
    }
}

/// Resolves content-type expressions (`"text/plain"` or
/// `echo.MIMETextPlain`) to their string value.
pub struct MimeResolver {
    content_types: HashMap<String, String>,
}

impl MimeResolver {
    /// Loads the MIME reference namespace and indexes every `MIME*`
    /// constant.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ReferenceLoad`] when the reference source cannot be
    /// parsed or yields no constants.
    pub fn new() -> Result<Self> {
        let reference = load_reference(
            "github.com/labstack/echo/v4",
            "echo_mime.go",
            MIME_REFERENCE,
        )?;

        let mut content_types = HashMap::new();
        for (name, value) in reference_constants(&reference, "MIME") {
            content_types.insert(name, value);
        }

        if content_types.is_empty() {
            return Err(Error::ReferenceLoad {
                package: "github.com/labstack/echo/v4".to_string(),
                message: "no MIME constants found".to_string(),
            });
        }

        debug!("Indexed {} MIME constants", content_types.len());
        Ok(Self { content_types })
    }

    /// Resolves an expression node to a content type. Accepts a string
    /// literal or an `echo.MIMEX` selector.
    pub fn resolve(&self, file: &ParsedFile, expr: Node) -> Result<String> {
        if meta::is_string_literal(expr) {
            return Ok(meta::unquote(file.text(expr)));
        }

        match expr.kind() {
            "selector_expression" => {
                let (receiver, name) = selector_parts(file, expr)?;
                if receiver != "echo" {
                    return Err(Error::UnresolvedConstant {
                        expr: file.text(expr).to_string(),
                        expected: "a constant from echo".to_string(),
                    });
                }
                self.content_types
                    .get(&name)
                    .cloned()
                    .ok_or_else(|| Error::UnresolvedConstant {
                        expr: file.text(expr).to_string(),
                        expected: "a known echo MIME constant".to_string(),
                    })
            }
            _ => Err(Error::UnresolvedConstant {
                expr: file.text(expr).to_string(),
                expected: "a string literal or echo.MIMEX selector".to_string(),
            }),
        }
    }
}

fn load_reference(package: &str, label: &str, source: &str) -> Result<ParsedFile> {
    let parsed =
        GoParser::parse_source(Path::new(label), source).map_err(|e| Error::ReferenceLoad {
            package: package.to_string(),
            message: format!("{:#}", e),
        })?;

    if parsed.has_syntax_errors() {
        return Err(Error::ReferenceLoad {
            package: package.to_string(),
            message: "reference source has syntax errors".to_string(),
        });
    }

    Ok(parsed)
}

/// Collects `(name, literal value)` pairs of prefix-matched constants from
/// the top-level const blocks of the reference file. String values come
/// back unquoted.
fn reference_constants(file: &ParsedFile, prefix: &str) -> Vec<(String, String)> {
    let mut constants = Vec::new();
    let root = file.root();

    for i in 0..root.named_child_count() {
        let Some(decl) = root.named_child(i) else {
            continue;
        };
        if decl.kind() != "const_declaration" {
            continue;
        }
        for j in 0..decl.named_child_count() {
            let Some(spec) = decl.named_child(j) else {
                continue;
            };
            if spec.kind() != "const_spec" {
                continue;
            }
            let Some(name_node) = spec.child_by_field_name("name") else {
                continue;
            };
            let name = file.text(name_node).to_string();
            if !name.starts_with(prefix) {
                continue;
            }
            let Some(values) = spec.child_by_field_name("value") else {
                continue;
            };
            let Some(value) = values.named_child(0) else {
                continue;
            };
            let value = if meta::is_string_literal(value) {
                meta::unquote(file.text(value))
            } else {
                file.text(value).to_string()
            };
            constants.push((name, value));
        }
    }

    constants
}

fn selector_parts(file: &ParsedFile, expr: Node) -> Result<(String, String)> {
    let operand = expr
        .child_by_field_name("operand")
        .filter(|n| n.kind() == "identifier")
        .ok_or_else(|| Error::UnresolvedConstant {
            expr: file.text(expr).to_string(),
            expected: "a package-qualified identifier".to_string(),
        })?;
    let field = expr
        .child_by_field_name("field")
        .ok_or_else(|| Error::UnresolvedConstant {
            expr: file.text(expr).to_string(),
            expected: "a package-qualified identifier".to_string(),
        })?;

    Ok((file.text(operand).to_string(), file.text(field).to_string()))
}
