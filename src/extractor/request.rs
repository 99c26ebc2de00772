//! Request contract extraction: what a handler binds as body, path, query
//! and form input.

use crate::meta;
use crate::parser::ParsedFile;
use crate::resolver::{
    MIME_APPLICATION_FORM, MIME_APPLICATION_JSON, MIME_APPLICATION_XML, MIME_MULTIPART_FORM,
};
use crate::typing::{self, FileContext, FnScope, ParamType, TypeIndex};
use log::{debug, error};
use serde::Serialize;
use std::collections::BTreeMap;
use tree_sitter::Node;

/// Tag families the framework consults when binding a request body.
const BODY_BIND_TAGS: &[&str] = &["json", "xml", "form"];
/// Tag families the framework consults for path and query parameters.
const PARAM_BIND_TAGS: &[&str] = &["param", "query"];

/// A path or query parameter read inside a handler body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Param {
    pub name: String,
    /// Rendered type name, "string" unless a conversion call proves better
    pub ty: String,
}

/// One field of a form assembled from loose `FormValue`/`FormFile` reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormField {
    pub name: String,
    pub ty: ParamType,
    pub required: bool,
    pub is_file: bool,
}

/// Synthetic shape of a form body reconstructed from inline reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InlineForm {
    pub fields: Vec<FormField>,
}

/// Request body facts attached to one accepted content type.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Body {
    /// Present when the body shape was assembled from inline reads rather
    /// than a declared struct
    #[serde(skip_serializing_if = "Option::is_none")]
    pub form: Option<InlineForm>,
}

/// Accepted content types of a handler, each with optional body facts.
/// Keys are unique by construction.
pub type ContentTypeMapping = BTreeMap<String, Body>;

/// Extraction toggles; each evidence source is independent.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub inline_path_params: bool,
    pub inline_query_params: bool,
    pub inline_forms: bool,
    /// Inline form values cannot be proven optional statically; this makes
    /// the policy explicit instead of guessing. Files are always required.
    pub optional_inline_form_values: bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            inline_path_params: true,
            inline_query_params: true,
            inline_forms: true,
            optional_inline_form_values: false,
        }
    }
}

/// The input contract of one handler.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Request {
    /// Bound model as used in code: `package.TypeName`; empty if none
    pub bind_model: String,
    /// Full import path of the bound model's package
    pub bind_model_package: String,
    pub content_type_mapping: ContentTypeMapping,
    pub path_params: Vec<Param>,
    pub query_params: Vec<Param>,
}

impl Request {
    /// Recovers the request contract from a handler declaration.
    ///
    /// Inline reads are walked first, then the data-binding call. Only one
    /// bind call is expected per handler; a later one silently overwrites
    /// an earlier one.
    pub fn from_handler(
        decl: Node,
        file: &ParsedFile,
        ctx: &FileContext,
        index: &TypeIndex,
        scope: &FnScope,
        opts: &RequestOptions,
    ) -> Request {
        let mut request = Request::default();
        let Some(body) = decl.child_by_field_name("body") else {
            return request;
        };

        if opts.inline_path_params {
            request.path_params = inline_params(body, file, "Param");
        }
        if opts.inline_query_params {
            request.query_params = inline_params(body, file, "QueryParam");
        }
        if opts.inline_forms {
            if let Some(form) = inline_form(body, file, opts) {
                let has_files = form.fields.iter().any(|f| f.is_file);
                if !has_files {
                    // Without files the body can travel URL-encoded too.
                    request.content_type_mapping.insert(
                        MIME_APPLICATION_FORM.to_string(),
                        Body {
                            form: Some(form.clone()),
                        },
                    );
                }
                request
                    .content_type_mapping
                    .insert(MIME_MULTIPART_FORM.to_string(), Body { form: Some(form) });
            }
        }

        meta::visit(body, &mut |node| {
            if node.kind() != "call_expression" {
                return;
            }
            if meta::called_func_name(node, file) != Some("Bind") {
                return;
            }
            let args = meta::call_args(node);
            if args.len() != 1 {
                return;
            }
            request.apply_bind(args[0], file, ctx, index, scope);
        });

        request
    }

    /// Whether no evidence of any input was found.
    pub fn is_empty(&self) -> bool {
        self.bind_model.is_empty()
            && self.content_type_mapping.is_empty()
            && self.path_params.is_empty()
            && self.query_params.is_empty()
    }

    fn apply_bind(
        &mut self,
        arg: Node,
        file: &ParsedFile,
        ctx: &FileContext,
        index: &TypeIndex,
        scope: &FnScope,
    ) {
        let Some(arg_type) = scope.type_of_expr(arg, file) else {
            error!("failed to resolve type of bind argument: {}", file.text(arg));
            return;
        };

        let Some(s) = index.underlying_struct(&arg_type, ctx) else {
            error!("expected struct as bind arg, got {}", arg_type.render(&ctx.package_name));
            return;
        };

        if s.fields.is_empty() {
            debug!("ignoring empty struct {}", s.qualified_name());
            return;
        }

        self.bind_model = s.qualified_name();
        self.bind_model_package = s.package_path.clone();

        if !s.has_any_tag(BODY_BIND_TAGS) && !s.has_any_tag(PARAM_BIND_TAGS) {
            // No tag evidence at all: the framework falls back to trying
            // both default body encodings.
            self.content_type_mapping
                .insert(MIME_APPLICATION_JSON.to_string(), Body::default());
            self.content_type_mapping
                .insert(MIME_APPLICATION_XML.to_string(), Body::default());
            return;
        }

        if s.has_tag("form") {
            if !s.has_files() {
                self.content_type_mapping
                    .insert(MIME_APPLICATION_FORM.to_string(), Body::default());
            }
            self.content_type_mapping
                .insert(MIME_MULTIPART_FORM.to_string(), Body::default());
        }

        if s.has_tag("json") {
            self.content_type_mapping
                .insert(MIME_APPLICATION_JSON.to_string(), Body::default());
        }

        if s.has_tag("xml") {
            self.content_type_mapping
                .insert(MIME_APPLICATION_XML.to_string(), Body::default());
        }
    }
}

/// Collects `c.<accessor>("name")` reads with literal names, inferring each
/// parameter's type from the nearest conversion applied to the read value.
fn inline_params(body: Node, file: &ParsedFile, accessor: &str) -> Vec<Param> {
    let mut params = Vec::new();
    meta::visit(body, &mut |node| {
        if node.kind() != "call_expression" {
            return;
        }
        if meta::called_func_name(node, file) != Some(accessor) {
            return;
        }
        let args = meta::call_args(node);
        let Some(name) = args
            .first()
            .and_then(|a| meta::string_literal_value(*a, file))
        else {
            debug!("skipping non-literal {} argument", accessor);
            return;
        };

        let ty = infer_param_type(body, file, accessor, &name);
        debug!(
            "found inline {} usage: param={} type={}",
            accessor, name, ty
        );
        params.push(Param {
            name,
            ty: ty.to_string(),
        });
    });
    params
}

/// Searches the body for a call whose first argument is exactly the
/// accessor read (e.g. `strconv.Atoi(c.Param("id"))`) and adopts the
/// conversion's target type; defaults to string.
fn infer_param_type(body: Node, file: &ParsedFile, accessor: &str, name: &str) -> ParamType {
    let mut inferred = ParamType::String;
    let mut found = false;
    meta::visit(body, &mut |node| {
        if found || node.kind() != "call_expression" {
            return;
        }
        if !typing::is_param_usage(node, file, accessor, name) {
            return;
        }
        let (Some(pkg), Some(func)) = (
            meta::called_func_receiver(node, file),
            meta::called_func_name(node, file),
        ) else {
            return;
        };
        if let Some(target) = typing::conversion_target(pkg, func) {
            inferred = target;
            found = true;
        }
    });
    inferred
}

/// Assembles the synthetic form shape from `FormValue`/`FormFile` reads.
/// Returns None when the body performs no form reads.
fn inline_form(body: Node, file: &ParsedFile, opts: &RequestOptions) -> Option<InlineForm> {
    let mut fields = Vec::new();
    meta::visit(body, &mut |node| {
        if node.kind() != "call_expression" {
            return;
        }
        let Some(func) = meta::called_func_name(node, file) else {
            return;
        };
        match func {
            "FormFile" => {
                let args = meta::call_args(node);
                let Some(name) = args
                    .first()
                    .and_then(|a| meta::string_literal_value(*a, file))
                else {
                    debug!("skipping non-literal FormFile argument");
                    return;
                };
                fields.push(FormField {
                    name,
                    ty: ParamType::File,
                    required: true,
                    is_file: true,
                });
            }
            "FormValue" => {
                let args = meta::call_args(node);
                let Some(name) = args
                    .first()
                    .and_then(|a| meta::string_literal_value(*a, file))
                else {
                    debug!("skipping non-literal FormValue argument");
                    return;
                };
                let ty = infer_param_type(body, file, "FormValue", &name);
                fields.push(FormField {
                    name,
                    ty,
                    required: !opts.optional_inline_form_values,
                    is_file: false,
                });
            }
            _ => {}
        }
    });

    if fields.is_empty() {
        None
    } else {
        Some(InlineForm { fields })
    }
}
