//! Response contract extraction: the status-code/content-type/payload-type
//! matrix a handler body can emit.

use crate::error::Result;
use crate::meta;
use crate::parser::ParsedFile;
use crate::resolver::{
    MimeResolver, StatusCodeResolver, MIME_APPLICATION_JSON, MIME_APPLICATION_XML, MIME_TEXT_PLAIN,
};
use crate::typing::{FileContext, FnScope, GoType, TypeIndex};
use log::{debug, error};
use serde::Serialize;
use std::collections::BTreeMap;
use tree_sitter::Node;

const JSON_CONTEXT_FUNC: &str = "JSON";
const JSON_PRETTY_CONTEXT_FUNC: &str = "JSONPretty";
const JSON_BLOB_CONTEXT_FUNC: &str = "JSONBlob";
const XML_CONTEXT_FUNC: &str = "XML";
const XML_PRETTY_CONTEXT_FUNC: &str = "XMLPretty";
const XML_BLOB_CONTEXT_FUNC: &str = "XMLBlob";
const STRING_CONTEXT_FUNC: &str = "String";
const BLOB_CONTEXT_FUNC: &str = "Blob";
const REDIRECT_CONTEXT_FUNC: &str = "Redirect";
const NO_CONTENT_CONTEXT_FUNC: &str = "NoContent";
const STREAM_CONTEXT_FUNC: &str = "Stream";

const SUPPORTED_FUNCTIONS: &[&str] = &[
    JSON_CONTEXT_FUNC,
    JSON_PRETTY_CONTEXT_FUNC,
    JSON_BLOB_CONTEXT_FUNC,
    XML_CONTEXT_FUNC,
    XML_PRETTY_CONTEXT_FUNC,
    XML_BLOB_CONTEXT_FUNC,
    STRING_CONTEXT_FUNC,
    BLOB_CONTEXT_FUNC,
    REDIRECT_CONTEXT_FUNC,
    NO_CONTENT_CONTEXT_FUNC,
    STREAM_CONTEXT_FUNC,
];

/// Functions whose payload argument is already serialized; no type can be
/// recovered for them.
const RAW_BODY_FUNCTIONS: &[&str] = &[
    JSON_BLOB_CONTEXT_FUNC,
    XML_BLOB_CONTEXT_FUNC,
    STREAM_CONTEXT_FUNC,
    BLOB_CONTEXT_FUNC,
];

/// Functions producing no response body at all.
const NO_BODY_FUNCTIONS: &[&str] = &[REDIRECT_CONTEXT_FUNC, NO_CONTENT_CONTEXT_FUNC];

/// One emission the handler body can produce.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Response {
    /// Content type of the emission; empty for redirect and no-content
    pub content_type: String,
    /// Payload type name as spoken in code (`pkg.Type`, element type for
    /// arrays); empty when no body shape is known
    pub type_name: String,
    /// Full import path of the payload type's package; empty for builtins
    pub type_package: String,
    pub is_array: bool,
    pub is_map: bool,
    /// True when the emission carries no body; such responses never have a
    /// type name
    pub no_content_body: bool,
    pub key_type: String,
    pub value_type: String,
}

/// Status code to the responses a handler can emit under it, preserving
/// body-walk order.
pub type StatusCodeMapping = BTreeMap<u16, Vec<Response>>;

/// Builds the status-code mapping from a handler function declaration.
///
/// Every call expression in the body is inspected; calls that do not match
/// a supported response-emitting method are skipped, as are calls whose
/// status code or content type cannot be resolved.
pub fn status_code_mapping(
    decl: Node,
    file: &ParsedFile,
    ctx: &FileContext,
    index: &TypeIndex,
    scope: &FnScope,
    codes: &StatusCodeResolver,
    mimes: &MimeResolver,
) -> StatusCodeMapping {
    let mut mapping = StatusCodeMapping::new();
    let Some(body) = decl.child_by_field_name("body") else {
        return mapping;
    };

    meta::visit(body, &mut |node| {
        if node.kind() != "call_expression" {
            return;
        }
        let Some(view) = ContextResponseType::new(node, file) else {
            debug!("skipping function call: {}", file.text(node));
            return;
        };

        let status_code = match view.status_code(codes) {
            Ok(code) => code,
            Err(e) => {
                error!("failed to get status code: {}", e);
                return;
            }
        };

        let content_type = match view.content_type(mimes) {
            Ok(ct) => ct,
            Err(e) => {
                error!("failed to get content type: {}", e);
                return;
            }
        };

        let Some(mut response) = view.payload(ctx, index, scope) else {
            error!("failed to resolve payload type: {}", file.text(node));
            return;
        };
        response.content_type = content_type;

        mapping.entry(status_code).or_default().push(response);
    });

    mapping
}

/// View over one response-emitting call expression.
struct ContextResponseType<'t, 'f> {
    func_name: &'f str,
    call: Node<'t>,
    file: &'f ParsedFile,
}

impl<'t, 'f> ContextResponseType<'t, 'f> {
    /// Wraps the call if it matches a supported response-emitting method.
    fn new(call: Node<'t>, file: &'f ParsedFile) -> Option<Self> {
        let func_name = meta::called_func_name(call, file)?;
        if !SUPPORTED_FUNCTIONS.contains(&func_name) {
            return None;
        }
        Some(Self {
            func_name,
            call,
            file,
        })
    }

    /// Status code from the first argument, literal or symbolic.
    fn status_code(&self, codes: &StatusCodeResolver) -> Result<u16> {
        let args = meta::call_args(self.call);
        let expr = args
            .first()
            .copied()
            .ok_or_else(|| crate::error::Error::UnresolvedConstant {
                expr: self.file.text(self.call).to_string(),
                expected: "a status-code argument".to_string(),
            })?;
        codes.resolve(self.file, expr)
    }

    /// Content type derived from the method name, or resolved from the
    /// second argument for blob/stream emissions. Empty for redirect and
    /// no-content.
    fn content_type(&self, mimes: &MimeResolver) -> Result<String> {
        match self.func_name {
            JSON_CONTEXT_FUNC | JSON_PRETTY_CONTEXT_FUNC | JSON_BLOB_CONTEXT_FUNC => {
                Ok(MIME_APPLICATION_JSON.to_string())
            }
            XML_CONTEXT_FUNC | XML_PRETTY_CONTEXT_FUNC | XML_BLOB_CONTEXT_FUNC => {
                Ok(MIME_APPLICATION_XML.to_string())
            }
            STRING_CONTEXT_FUNC => Ok(MIME_TEXT_PLAIN.to_string()),
            BLOB_CONTEXT_FUNC | STREAM_CONTEXT_FUNC => {
                let args = meta::call_args(self.call);
                let expr = args.get(1).copied().ok_or_else(|| {
                    crate::error::Error::UnresolvedConstant {
                        expr: self.file.text(self.call).to_string(),
                        expected: "a content-type argument".to_string(),
                    }
                })?;
                mimes.resolve(self.file, expr)
            }
            _ => Ok(String::new()),
        }
    }

    /// Payload shape: type name, owning package, and the array/map flags.
    /// None when the payload type cannot be resolved statically.
    fn payload(&self, ctx: &FileContext, index: &TypeIndex, scope: &FnScope) -> Option<Response> {
        if NO_BODY_FUNCTIONS.contains(&self.func_name) {
            return Some(Response {
                no_content_body: true,
                ..Response::default()
            });
        }
        if RAW_BODY_FUNCTIONS.contains(&self.func_name) {
            return Some(Response::default());
        }

        let args = meta::call_args(self.call);
        let payload_arg = args.get(1).copied()?;
        let ty = scope.type_of_expr(payload_arg, self.file)?;

        Some(shape_payload(ty.deref(), ctx, index))
    }
}

fn shape_payload(ty: &GoType, ctx: &FileContext, index: &TypeIndex) -> Response {
    match ty {
        GoType::Named {
            package: Some(p),
            name,
        } if p == "echo" && name == "Map" => Response {
            type_name: "map[string]any".to_string(),
            is_map: true,
            key_type: "string".to_string(),
            value_type: "any".to_string(),
            ..Response::default()
        },
        GoType::Map { key, value } => Response {
            type_name: ty.render(&ctx.package_name),
            is_map: true,
            key_type: key.render(&ctx.package_name),
            value_type: value.render(&ctx.package_name),
            ..Response::default()
        },
        GoType::Slice(elem) => {
            let elem = elem.deref();
            Response {
                type_name: elem.render(&ctx.package_name),
                type_package: index.package_path_of(elem, ctx).unwrap_or_default(),
                is_array: true,
                ..Response::default()
            }
        }
        other => Response {
            type_name: other.render(&ctx.package_name),
            type_package: index.package_path_of(other, ctx).unwrap_or_default(),
            ..Response::default()
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::GoParser;
    use crate::scanner::GoPackage;
    use pretty_assertions::assert_eq;
    use std::path::{Path, PathBuf};

    fn package_of(sources: &[&str]) -> GoPackage {
        let files = sources
            .iter()
            .enumerate()
            .map(|(i, src)| {
                GoParser::parse_source(Path::new(&format!("file_{}.go", i)), src).unwrap()
            })
            .collect();
        GoPackage {
            name: "handlers".to_string(),
            import_path: "example.com/svc/handlers".to_string(),
            dir: PathBuf::from("handlers"),
            files,
        }
    }

    fn mapping_from(pkg: &GoPackage) -> StatusCodeMapping {
        let index = TypeIndex::new(std::slice::from_ref(pkg));
        let codes = StatusCodeResolver::new().unwrap();
        let mimes = MimeResolver::new().unwrap();
        let file = &pkg.files[0];
        let ctx = FileContext::new(pkg, file);

        let mut result = None;
        meta::visit(file.root(), &mut |n| {
            if n.kind() == "function_declaration" && result.is_none() {
                let body = n.child_by_field_name("body").unwrap();
                let scope = FnScope::from_body(body, file);
                result = Some(status_code_mapping(
                    n, file, &ctx, &index, &scope, &codes, &mimes,
                ));
            }
        });
        result.expect("no handler in fixture")
    }

    #[test]
    fn test_json_response_with_named_payload() {
        let mapping = mapping_from(&package_of(&[r#"
package handlers

type User struct {
    ID int `json:"id"`
}

func Get(c echo.Context) error {
    user := User{}
    return c.JSON(http.StatusOK, user)
}
"#]));

        let responses = mapping.get(&200).unwrap();
        assert_eq!(responses.len(), 1);
        assert_eq!(
            responses[0],
            Response {
                content_type: MIME_APPLICATION_JSON.to_string(),
                type_name: "handlers.User".to_string(),
                type_package: "example.com/svc/handlers".to_string(),
                ..Response::default()
            }
        );
    }

    #[test]
    fn test_slice_payload_sets_array_flag_with_element_type() {
        let mapping = mapping_from(&package_of(&[r#"
package handlers

type User struct {
    ID int `json:"id"`
}

func List(c echo.Context) error {
    users := []User{}
    return c.JSON(http.StatusOK, users)
}
"#]));

        let responses = mapping.get(&200).unwrap();
        assert!(responses[0].is_array);
        // The element type, never []T
        assert_eq!(responses[0].type_name, "handlers.User");
        assert_eq!(responses[0].type_package, "example.com/svc/handlers");
    }

    #[test]
    fn test_no_content_has_no_type_name() {
        let mapping = mapping_from(&package_of(&[r#"
package handlers

func Delete(c echo.Context) error {
    return c.NoContent(http.StatusNoContent)
}
"#]));

        let responses = mapping.get(&204).unwrap();
        assert_eq!(
            responses[0],
            Response {
                no_content_body: true,
                ..Response::default()
            }
        );
    }

    #[test]
    fn test_redirect_has_empty_content_type_and_no_body() {
        let mapping = mapping_from(&package_of(&[r#"
package handlers

func Old(c echo.Context) error {
    return c.Redirect(http.StatusMovedPermanently, "/new")
}
"#]));

        let responses = mapping.get(&301).unwrap();
        assert_eq!(responses[0].content_type, "");
        assert!(responses[0].no_content_body);
        assert_eq!(responses[0].type_name, "");
    }

    #[test]
    fn test_echo_map_normalizes_to_generic_object_map() {
        let mapping = mapping_from(&package_of(&[r#"
package handlers

func Fail(c echo.Context) error {
    return c.JSON(http.StatusBadRequest, echo.Map{"error": "bad input"})
}
"#]));

        let responses = mapping.get(&400).unwrap();
        assert_eq!(
            responses[0],
            Response {
                content_type: MIME_APPLICATION_JSON.to_string(),
                type_name: "map[string]any".to_string(),
                is_map: true,
                key_type: "string".to_string(),
                value_type: "any".to_string(),
                ..Response::default()
            }
        );
    }

    #[test]
    fn test_map_literal_payload() {
        let mapping = mapping_from(&package_of(&[r#"
package handlers

func Stats(c echo.Context) error {
    counts := map[string]int{}
    return c.JSON(http.StatusOK, counts)
}
"#]));

        let responses = mapping.get(&200).unwrap();
        assert!(responses[0].is_map);
        assert_eq!(responses[0].type_name, "map[string]int");
        assert_eq!(responses[0].key_type, "string");
        assert_eq!(responses[0].value_type, "int");
    }

    #[test]
    fn test_string_response() {
        let mapping = mapping_from(&package_of(&[r#"
package handlers

func Ping(c echo.Context) error {
    return c.String(http.StatusOK, "pong")
}
"#]));

        let responses = mapping.get(&200).unwrap();
        assert_eq!(responses[0].content_type, MIME_TEXT_PLAIN);
        assert_eq!(responses[0].type_name, "string");
        assert!(!responses[0].no_content_body);
    }

    #[test]
    fn test_blob_resolves_content_type_from_second_argument() {
        let mapping = mapping_from(&package_of(&[r#"
package handlers

func Image(c echo.Context) error {
    data := []byte{}
    return c.Blob(http.StatusOK, "image/png", data)
}
"#]));

        let responses = mapping.get(&200).unwrap();
        assert_eq!(responses[0].content_type, "image/png");
        // Raw payloads carry no recoverable type
        assert_eq!(responses[0].type_name, "");
        assert!(!responses[0].no_content_body);
    }

    #[test]
    fn test_stream_with_symbolic_mime_constant() {
        let mapping = mapping_from(&package_of(&[r#"
package handlers

func Download(c echo.Context) error {
    var reader io.Reader
    return c.Stream(http.StatusOK, echo.MIMEOctetStream, reader)
}
"#]));

        let responses = mapping.get(&200).unwrap();
        assert_eq!(responses[0].content_type, "application/octet-stream");
        assert_eq!(responses[0].type_name, "");
    }

    #[test]
    fn test_multiple_emissions_under_same_status_preserve_order() {
        let mapping = mapping_from(&package_of(&[r#"
package handlers

type User struct {
    ID int `json:"id"`
}

func Get(c echo.Context) error {
    if asXml() {
        return c.XML(http.StatusOK, User{})
    }
    return c.JSON(http.StatusOK, User{})
}
"#]));

        let responses = mapping.get(&200).unwrap();
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0].content_type, MIME_APPLICATION_XML);
        assert_eq!(responses[1].content_type, MIME_APPLICATION_JSON);
    }

    #[test]
    fn test_branches_with_different_status_codes() {
        let mapping = mapping_from(&package_of(&[r#"
package handlers

type User struct {
    ID int `json:"id"`
}

func Get(c echo.Context) error {
    var user User
    if !load(&user) {
        return c.JSON(http.StatusNotFound, echo.Map{"error": "not found"})
    }
    return c.JSON(http.StatusOK, user)
}
"#]));

        assert!(mapping.contains_key(&404));
        assert!(mapping.contains_key(&200));
    }

    #[test]
    fn test_unsupported_calls_are_skipped() {
        let mapping = mapping_from(&package_of(&[r#"
package handlers

func Get(c echo.Context) error {
    log.Println("handling")
    c.Set("key", "value")
    return c.NoContent(http.StatusOK)
}
"#]));

        assert_eq!(mapping.len(), 1);
        assert_eq!(mapping.get(&200).unwrap().len(), 1);
    }

    #[test]
    fn test_unresolvable_status_code_skips_the_call() {
        let mapping = mapping_from(&package_of(&[r#"
package handlers

func Get(c echo.Context) error {
    return c.JSON(statusFor(), echo.Map{})
}
"#]));

        assert!(mapping.is_empty());
    }

    #[test]
    fn test_pointer_payload_dereferences_to_named_type() {
        let mapping = mapping_from(&package_of(&[r#"
package handlers

type User struct {
    ID int `json:"id"`
}

func Get(c echo.Context) error {
    user := &User{}
    return c.JSON(http.StatusOK, user)
}
"#]));

        let responses = mapping.get(&200).unwrap();
        assert_eq!(responses[0].type_name, "handlers.User");
    }
}
