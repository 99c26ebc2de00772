//! Node-level helpers shared by the extractors: reading call shapes off the
//! syntax tree, unquoting string literals, and collecting doc comments.

use crate::parser::ParsedFile;
use tree_sitter::Node;

/// Visits `node` and all of its descendants in pre-order, matching the
/// deterministic body-walk order the extractors rely on.
pub fn visit<'a>(node: Node<'a>, f: &mut impl FnMut(Node<'a>)) {
    f(node);
    for i in 0..node.child_count() {
        if let Some(child) = node.child(i) {
            visit(child, f);
        }
    }
}

/// Returns the called function name for a `receiver.Func(...)` call
/// expression, e.g. "Bind" for `c.Bind(&dto)`.
pub fn called_func_name<'a>(call: Node, file: &'a ParsedFile) -> Option<&'a str> {
    let func = call.child_by_field_name("function")?;
    if func.kind() != "selector_expression" {
        return None;
    }
    let field = func.child_by_field_name("field")?;
    Some(file.text(field))
}

/// Returns the receiver identifier for a `receiver.Func(...)` call
/// expression, e.g. "strconv" for `strconv.Atoi(v)`.
pub fn called_func_receiver<'a>(call: Node, file: &'a ParsedFile) -> Option<&'a str> {
    let func = call.child_by_field_name("function")?;
    if func.kind() != "selector_expression" {
        return None;
    }
    let operand = func.child_by_field_name("operand")?;
    if operand.kind() != "identifier" {
        return None;
    }
    Some(file.text(operand))
}

/// Positional arguments of a call expression.
pub fn call_args<'t>(call: Node<'t>) -> Vec<Node<'t>> {
    let Some(args) = call.child_by_field_name("arguments") else {
        return Vec::new();
    };
    let mut out = Vec::new();
    for i in 0..args.named_child_count() {
        if let Some(arg) = args.named_child(i) {
            out.push(arg);
        }
    }
    out
}

/// Whether the node is a Go string literal.
pub fn is_string_literal(node: Node) -> bool {
    matches!(
        node.kind(),
        "interpreted_string_literal" | "raw_string_literal"
    )
}

/// Value of a string-literal node, unquoted. None for other node kinds.
pub fn string_literal_value(node: Node, file: &ParsedFile) -> Option<String> {
    if !is_string_literal(node) {
        return None;
    }
    Some(unquote(file.text(node)))
}

/// Strips surrounding quotes or backticks from a Go string literal and
/// resolves the common escape sequences of interpreted literals.
pub fn unquote(raw: &str) -> String {
    let inner = if raw.len() >= 2
        && (raw.starts_with('"') && raw.ends_with('"')
            || raw.starts_with('`') && raw.ends_with('`'))
    {
        &raw[1..raw.len() - 1]
    } else {
        raw
    };

    if raw.starts_with('`') {
        // Raw literals carry no escapes.
        return inner.to_string();
    }

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('"') => out.push('"'),
            Some('\'') => out.push('\''),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Collects the leading comment block of a declaration, stripping the `//`
/// markers, mirroring how godoc associates documentation with declarations.
pub fn doc_comment(decl: Node, file: &ParsedFile) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut expected_row = decl.start_position().row;
    let mut sibling = decl.prev_sibling();

    while let Some(node) = sibling {
        if node.kind() != "comment" {
            break;
        }
        // Only comments stacked directly above the declaration count.
        if node.end_position().row + 1 != expected_row {
            break;
        }
        expected_row = node.start_position().row;

        let text = file.text(node);
        let stripped = text
            .strip_prefix("// ")
            .or_else(|| text.strip_prefix("//"))
            .unwrap_or(text);
        lines.push(stripped.to_string());

        sibling = node.prev_sibling();
    }

    lines.reverse();
    lines.join("\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::GoParser;
    use std::path::Path;

    fn parse(content: &str) -> ParsedFile {
        GoParser::parse_source(Path::new("test.go"), content).unwrap()
    }

    fn first_call<'t>(file: &'t ParsedFile) -> Node<'t> {
        let mut found = None;
        visit(file.root(), &mut |n| {
            if n.kind() == "call_expression" && found.is_none() {
                found = Some(n);
            }
        });
        found.expect("no call expression in source")
    }

    #[test]
    fn test_called_func_name_and_receiver() {
        let file = parse("package t\n\nfunc f() { c.Bind(&dto) }\n");
        let call = first_call(&file);

        assert_eq!(called_func_name(call, &file), Some("Bind"));
        assert_eq!(called_func_receiver(call, &file), Some("c"));
    }

    #[test]
    fn test_called_func_name_plain_call() {
        let file = parse("package t\n\nfunc f() { println(1) }\n");
        let call = first_call(&file);

        assert_eq!(called_func_name(call, &file), None);
        assert_eq!(called_func_receiver(call, &file), None);
    }

    #[test]
    fn test_call_args() {
        let file = parse("package t\n\nfunc f() { c.JSON(200, user) }\n");
        let call = first_call(&file);

        let args = call_args(call);
        assert_eq!(args.len(), 2);
        assert_eq!(file.text(args[0]), "200");
        assert_eq!(file.text(args[1]), "user");
    }

    #[test]
    fn test_unquote_interpreted() {
        assert_eq!(unquote("\"id\""), "id");
        assert_eq!(unquote("\"a\\nb\""), "a\nb");
        assert_eq!(unquote("\"say \\\"hi\\\"\""), "say \"hi\"");
    }

    #[test]
    fn test_unquote_raw() {
        assert_eq!(unquote("`form:\"name\"`"), "form:\"name\"");
    }

    #[test]
    fn test_string_literal_value() {
        let file = parse("package t\n\nfunc f() { c.Param(\"id\") }\n");
        let call = first_call(&file);
        let args = call_args(call);

        assert_eq!(
            string_literal_value(args[0], &file),
            Some("id".to_string())
        );
    }

    #[test]
    fn test_doc_comment() {
        let file = parse(
            "package t\n\n// GetUser returns a user by id.\n// It answers 404 when missing.\nfunc GetUser() {}\n",
        );
        let mut decl = None;
        visit(file.root(), &mut |n| {
            if n.kind() == "function_declaration" {
                decl = Some(n);
            }
        });

        let doc = doc_comment(decl.unwrap(), &file);
        assert_eq!(
            doc,
            "GetUser returns a user by id.\nIt answers 404 when missing."
        );
    }

    #[test]
    fn test_doc_comment_detached_block_ignored() {
        let file = parse("package t\n\n// stale comment\n\nfunc GetUser() {}\n");
        let mut decl = None;
        visit(file.root(), &mut |n| {
            if n.kind() == "function_declaration" {
                decl = Some(n);
            }
        });

        assert_eq!(doc_comment(decl.unwrap(), &file), "");
    }

    #[test]
    fn test_doc_comment_absent() {
        let file = parse("package t\n\nfunc GetUser() {}\n");
        let mut decl = None;
        visit(file.root(), &mut |n| {
            if n.kind() == "function_declaration" {
                decl = Some(n);
            }
        });

        assert_eq!(doc_comment(decl.unwrap(), &file), "");
    }
}
