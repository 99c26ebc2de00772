//! Enumeration reconstruction from top-level const blocks.
//!
//! Go has no enum declaration; the convention is a named type plus a block
//! of typed constants. This module rebuilds those enumerations so the
//! contract can report the legal values of a parameter or field type.

use crate::meta;
use crate::parser::ParsedFile;
use log::debug;
use serde::Serialize;
use std::collections::BTreeMap;
use tree_sitter::Node;

/// A single enumeration literal.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EnumValue {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
}

/// Qualified type name (`package.TypeName`) to its literal values, in
/// declaration order.
pub type EnumMap = BTreeMap<String, Vec<EnumValue>>;

/// Extracts enumerations from the top-level const blocks of one file.
///
/// Two declaration shapes are recognized:
///
/// - an explicitly typed binding: `const Active Status = "active"`
/// - a conversion-style binding: `const Active = Status("active")`
///
/// Bindings without a resolvable named type or a supported literal kind
/// (int, float, quoted string, bool) are skipped; `iota` arithmetic and
/// other computed expressions fall in that bucket.
pub fn extract(package: &str, file: &ParsedFile) -> EnumMap {
    let mut enums = EnumMap::new();

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
            if spec.kind() == "const_spec" {
                extract_spec(package, file, spec, &mut enums);
            }
        }
    }

    enums
}

fn extract_spec(package: &str, file: &ParsedFile, spec: Node, enums: &mut EnumMap) {
    let mut cursor = spec.walk();
    let names: Vec<Node> = spec.children_by_field_name("name", &mut cursor).collect();
    let explicit_type = spec
        .child_by_field_name("type")
        .filter(|t| t.kind() == "type_identifier");

    let values: Vec<Node> = spec
        .child_by_field_name("value")
        .map(|list| {
            (0..list.named_child_count())
                .filter_map(|i| list.named_child(i))
                .collect()
        })
        .unwrap_or_default();

    for (i, _name) in names.iter().enumerate() {
        // A single value expression covers every name in the binding;
        // otherwise names and values pair up positionally.
        let expr = if values.len() == 1 {
            Some(values[0])
        } else {
            values.get(i).copied()
        };
        let Some(expr) = expr else {
            continue;
        };

        match expr.kind() {
            kind if is_literal_kind(kind) => {
                let Some(ty) = explicit_type else {
                    continue;
                };
                let Some(lit) = parse_literal(file, expr) else {
                    debug!("skipping unsupported literal: {}", file.text(expr));
                    continue;
                };
                let key = format!("{}.{}", package, file.text(ty));
                enums.entry(key.clone()).or_default().push(lit);
                debug!("added enum value for {}", key);
            }
            "call_expression" => {
                let Some(func) = expr
                    .child_by_field_name("function")
                    .filter(|f| f.kind() == "identifier")
                else {
                    continue;
                };
                let args = meta::call_args(expr);
                if args.len() != 1 {
                    continue;
                }
                let Some(lit) = parse_literal(file, args[0]) else {
                    debug!("skipping unsupported literal: {}", file.text(args[0]));
                    continue;
                };
                let key = format!("{}.{}", package, file.text(func));
                enums.entry(key.clone()).or_default().push(lit);
                debug!("added enum value for {}", key);
            }
            _ => {}
        }
    }
}

fn is_literal_kind(kind: &str) -> bool {
    matches!(
        kind,
        "int_literal" | "float_literal" | "interpreted_string_literal" | "raw_string_literal"
            | "true"
            | "false"
    )
}

fn parse_literal(file: &ParsedFile, node: Node) -> Option<EnumValue> {
    match node.kind() {
        "int_literal" => file.text(node).parse::<i64>().ok().map(EnumValue::Int),
        "float_literal" => file.text(node).parse::<f64>().ok().map(EnumValue::Float),
        "interpreted_string_literal" | "raw_string_literal" => {
            Some(EnumValue::Str(meta::unquote(file.text(node))))
        }
        "true" => Some(EnumValue::Bool(true)),
        "false" => Some(EnumValue::Bool(false)),
        _ => None,
    }
}

/// Folds `src` into `dst`, appending value lists of types both maps know.
pub fn combine(dst: &mut EnumMap, src: EnumMap) {
    for (key, values) in src {
        dst.entry(key).or_default().extend(values);
    }
}
