//! Handler discovery and contract assembly.
//!
//! This module walks every declaration of a loaded package, classifies
//! handler-shaped functions, and assembles [`Handler`] records by running
//! the request and response extractors over each match. Classification is
//! purely structural: a declaration either takes the framework's request
//! context and returns an error ("direct handler") or returns the
//! framework's handler-function type ("wrapper handler").

pub mod enums;
pub mod request;
pub mod response;

use crate::error::Result;
use crate::meta;
use crate::parser::ParsedFile;
use crate::resolver::{MimeResolver, StatusCodeResolver};
use crate::scanner::GoPackage;
use crate::typing::{FileContext, FnScope, TypeIndex};
use log::debug;
use self::enums::EnumMap;
use self::request::{Request, RequestOptions};
use self::response::StatusCodeMapping;
use serde::Serialize;
use tree_sitter::Node;

/// One discovered HTTP entry point.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Handler {
    /// Declared function name
    pub name: String,
    /// Name of the defining package
    pub package: String,
    /// Full import path of the defining package
    pub package_path: String,
    /// Leading comment text of the declaration
    pub doc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<Request>,
    pub responses: StatusCodeMapping,
}

impl Handler {
    /// Merge key in the package-spanning handler index.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.package, self.name)
    }
}

/// A model referenced by some handler contract, for the exhaustive model
/// inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Model {
    pub name: String,
    pub package_path: String,
}

/// Everything extracted from one package.
#[derive(Debug, Default, Serialize)]
pub struct ParseResult {
    pub enums: EnumMap,
    pub handlers: Vec<Handler>,
    /// All type declarations and bind/response models, when
    /// [`ParseOptions::all_models`] is set. May contain duplicates; it is
    /// up to the consumer to deduplicate them.
    pub additional_models: Vec<Model>,
}

/// Extraction toggles for one parse run.
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Harvest enumerations from const blocks
    pub enums: bool,
    /// Harvest the exhaustive model inventory
    pub all_models: bool,
    pub inline_path_params: bool,
    pub inline_query_params: bool,
    pub inline_forms: bool,
    pub optional_inline_form_values: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            enums: false,
            all_models: false,
            inline_path_params: true,
            inline_query_params: true,
            inline_forms: true,
            optional_inline_form_values: false,
        }
    }
}

impl ParseOptions {
    fn request_options(&self) -> RequestOptions {
        RequestOptions {
            inline_path_params: self.inline_path_params,
            inline_query_params: self.inline_query_params,
            inline_forms: self.inline_forms,
            optional_inline_form_values: self.optional_inline_form_values,
        }
    }
}

/// Orchestrating parser: holds the two symbol resolvers and runs the full
/// extraction over packages.
///
/// Resolvers are loaded once at construction and read-only afterwards, so
/// one parser instance can serve all analysis workers concurrently.
pub struct ContractParser {
    codes: StatusCodeResolver,
    mimes: MimeResolver,
}

impl ContractParser {
    /// Creates the parser, loading both reference namespaces.
    ///
    /// # Errors
    ///
    /// Fails when either resolver cannot construct; nothing downstream can
    /// run without them.
    pub fn new() -> Result<Self> {
        Ok(Self {
            codes: StatusCodeResolver::new()?,
            mimes: MimeResolver::new()?,
        })
    }

    /// Walks every declaration of the package and assembles the result.
    pub fn parse_package(
        &self,
        pkg: &GoPackage,
        index: &TypeIndex,
        opts: &ParseOptions,
    ) -> ParseResult {
        let mut result = ParseResult::default();
        let request_opts = opts.request_options();

        for file in &pkg.files {
            if opts.enums {
                enums::combine(&mut result.enums, enums::extract(&pkg.name, file));
            }

            let ctx = FileContext::new(pkg, file);
            meta::visit(file.root(), &mut |node| {
                if !matches!(node.kind(), "function_declaration" | "method_declaration") {
                    return;
                }
                if !is_direct_handler(node, file) && !is_wrapper_handler(node, file) {
                    return;
                }
                let Some(name) = node.child_by_field_name("name") else {
                    return;
                };
                debug!(
                    "found echo handler: pkg={} file={} name={}",
                    pkg.name,
                    file.path.display(),
                    file.text(name)
                );

                let scope = node
                    .child_by_field_name("body")
                    .map(|body| FnScope::from_body(body, file))
                    .unwrap_or_default();

                let req = Request::from_handler(node, file, &ctx, index, &scope, &request_opts);
                let responses = response::status_code_mapping(
                    node, file, &ctx, index, &scope, &self.codes, &self.mimes,
                );

                if opts.all_models {
                    if !req.bind_model.is_empty() {
                        result.additional_models.push(Model {
                            name: req.bind_model.clone(),
                            package_path: req.bind_model_package.clone(),
                        });
                    }
                    for responses in responses.values() {
                        for resp in responses {
                            if !resp.type_name.is_empty() {
                                result.additional_models.push(Model {
                                    name: resp.type_name.clone(),
                                    package_path: resp.type_package.clone(),
                                });
                            }
                        }
                    }
                }

                result.handlers.push(Handler {
                    name: file.text(name).to_string(),
                    package: pkg.name.clone(),
                    package_path: pkg.import_path.clone(),
                    doc: meta::doc_comment(node, file),
                    request: (!req.is_empty()).then_some(req),
                    responses,
                });
            });

            if opts.all_models {
                result
                    .additional_models
                    .extend(exported_type_models(pkg, file));
            }
        }

        result
    }
}

/// Checks if the declaration has the direct-handler shape:
/// `func(echo.Context) error`.
pub fn is_direct_handler(decl: Node, file: &ParsedFile) -> bool {
    let results = result_types(decl);
    if results.len() != 1 {
        return false;
    }
    if results[0].kind() != "type_identifier" || file.text(results[0]) != "error" {
        return false;
    }

    let params = param_types(decl);
    if params.len() != 1 {
        return false;
    }
    is_qualified_type(params[0], file, "echo", "Context")
}

/// Checks if the declaration has the wrapper shape:
/// `func(...) echo.HandlerFunc`.
pub fn is_wrapper_handler(decl: Node, file: &ParsedFile) -> bool {
    let results = result_types(decl);
    if results.len() != 1 {
        return false;
    }
    is_qualified_type(results[0], file, "echo", "HandlerFunc")
}

fn is_qualified_type(node: Node, file: &ParsedFile, package: &str, name: &str) -> bool {
    if node.kind() != "qualified_type" {
        return false;
    }
    let (Some(p), Some(n)) = (
        node.child_by_field_name("package"),
        node.child_by_field_name("name"),
    ) else {
        return false;
    };
    file.text(p) == package && file.text(n) == name
}

/// Return types of a function declaration: the bare result type, or the
/// types inside a parenthesized result list, one entry per declared value.
fn result_types(decl: Node) -> Vec<Node> {
    let Some(result) = decl.child_by_field_name("result") else {
        return Vec::new();
    };
    if result.kind() != "parameter_list" {
        return vec![result];
    }
    expand_parameter_list(result)
}

/// Parameter types of a function declaration, one entry per declared name.
fn param_types(decl: Node) -> Vec<Node> {
    let Some(params) = decl.child_by_field_name("parameters") else {
        return Vec::new();
    };
    expand_parameter_list(params)
}

fn expand_parameter_list(list: Node) -> Vec<Node> {
    let mut types = Vec::new();
    for i in 0..list.named_child_count() {
        let Some(param) = list.named_child(i) else {
            continue;
        };
        if !matches!(
            param.kind(),
            "parameter_declaration" | "variadic_parameter_declaration"
        ) {
            continue;
        }
        let Some(ty) = param.child_by_field_name("type") else {
            continue;
        };
        let mut cursor = param.walk();
        let names = param.children_by_field_name("name", &mut cursor).count();
        for _ in 0..names.max(1) {
            types.push(ty);
        }
    }
    types
}

fn exported_type_models(pkg: &GoPackage, file: &ParsedFile) -> Vec<Model> {
    let mut models = Vec::new();
    let root = file.root();
    for i in 0..root.named_child_count() {
        let Some(decl) = root.named_child(i) else {
            continue;
        };
        if decl.kind() != "type_declaration" {
            continue;
        }
        for j in 0..decl.named_child_count() {
            let Some(spec) = decl.named_child(j) else {
                continue;
            };
            if spec.kind() != "type_spec" {
                continue;
            }
            let Some(name_node) = spec.child_by_field_name("name") else {
                continue;
            };
            let name = file.text(name_node);
            if !name.chars().next().is_some_and(|c| c.is_ascii_uppercase()) {
                debug!("skipping non-exported type: {}.{}", pkg.name, name);
                continue;
            }
            models.push(Model {
                name: format!("{}.{}", pkg.name, name),
                package_path: pkg.import_path.clone(),
            });
        }
    }
    models
}
