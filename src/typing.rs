//! Lightweight type information over the parsed package set.
//!
//! The extractors need three capabilities that a compiler would normally
//! provide: the type of an expression, the underlying structural shape of a
//! named type, and the qualified name of a type. [`TypeIndex`] and
//! [`FnScope`] implement those over the tree-sitter trees and are passed
//! into every extractor explicitly, so there is no hidden global state and
//! tests can substitute their own instances.

use crate::parser::ParsedFile;
use crate::scanner::GoPackage;
use log::debug;
use serde::Serialize;
use std::collections::HashMap;
use tree_sitter::Node;

/// Structural model of a Go type as written in source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GoType {
    /// A named type, optionally qualified with a package identifier.
    Named {
        package: Option<String>,
        name: String,
    },
    /// `*T`
    Pointer(Box<GoType>),
    /// `[]T`
    Slice(Box<GoType>),
    /// `map[K]V`
    Map { key: Box<GoType>, value: Box<GoType> },
    /// A predeclared type: string, int, bool, error, any, ...
    Basic(String),
}

const PREDECLARED: &[&str] = &[
    "bool", "string", "int", "int8", "int16", "int32", "int64", "uint", "uint8", "uint16",
    "uint32", "uint64", "uintptr", "byte", "rune", "float32", "float64", "complex64",
    "complex128", "error", "any",
];

impl GoType {
    /// Parses a type node from the syntax tree. Returns None for type forms
    /// the engine does not model (channels, funcs, interfaces, generics).
    pub fn parse(node: Node, file: &ParsedFile) -> Option<GoType> {
        match node.kind() {
            "type_identifier" => {
                let name = file.text(node).to_string();
                if PREDECLARED.contains(&name.as_str()) {
                    Some(GoType::Basic(name))
                } else {
                    Some(GoType::Named {
                        package: None,
                        name,
                    })
                }
            }
            "qualified_type" => {
                let package = node.child_by_field_name("package")?;
                let name = node.child_by_field_name("name")?;
                Some(GoType::Named {
                    package: Some(file.text(package).to_string()),
                    name: file.text(name).to_string(),
                })
            }
            "pointer_type" => {
                let inner = node.named_child(0)?;
                Some(GoType::Pointer(Box::new(GoType::parse(inner, file)?)))
            }
            "slice_type" => {
                let elem = node
                    .child_by_field_name("element")
                    .or_else(|| node.named_child(0))?;
                Some(GoType::Slice(Box::new(GoType::parse(elem, file)?)))
            }
            "array_type" => {
                let elem = node.child_by_field_name("element")?;
                Some(GoType::Slice(Box::new(GoType::parse(elem, file)?)))
            }
            "map_type" => {
                let key = node.child_by_field_name("key")?;
                let value = node.child_by_field_name("value")?;
                Some(GoType::Map {
                    key: Box::new(GoType::parse(key, file)?),
                    value: Box::new(GoType::parse(value, file)?),
                })
            }
            "parenthesized_type" => GoType::parse(node.named_child(0)?, file),
            _ => None,
        }
    }

    /// Strips pointer indirections.
    pub fn deref(&self) -> &GoType {
        match self {
            GoType::Pointer(inner) => inner.deref(),
            other => other,
        }
    }

    /// Renders the type name the way it is spoken in code, qualifying
    /// package-local names with `current_package`. The framework's untyped
    /// generic object map renders as `map[string]any`.
    pub fn render(&self, current_package: &str) -> String {
        match self {
            GoType::Named {
                package: Some(p),
                name,
            } if p == "echo" && name == "Map" => "map[string]any".to_string(),
            GoType::Named {
                package: Some(p),
                name,
            } => format!("{}.{}", p, name),
            GoType::Named {
                package: None,
                name,
            } => format!("{}.{}", current_package, name),
            GoType::Basic(name) => name.clone(),
            GoType::Pointer(inner) => format!("*{}", inner.render(current_package)),
            GoType::Slice(elem) => format!("[]{}", elem.render(current_package)),
            GoType::Map { key, value } => format!(
                "map[{}]{}",
                key.render(current_package),
                value.render(current_package)
            ),
        }
    }

    /// Whether the type is (a pointer to) the well-known multipart file
    /// header type.
    pub fn is_file_header(&self) -> bool {
        matches!(
            self.deref(),
            GoType::Named {
                package: Some(p),
                name,
            } if p == "multipart" && name == "FileHeader"
        )
    }

    /// Whether the type carries files: a file header directly or as a slice
    /// element.
    pub fn is_file_bearing(&self) -> bool {
        match self.deref() {
            GoType::Slice(elem) => elem.is_file_header(),
            other => other.is_file_header(),
        }
    }
}

/// A single struct field with its raw tag text (backticks stripped).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructField {
    pub name: String,
    pub ty: GoType,
    pub tag: Option<String>,
}

impl StructField {
    /// Tag value for `key`, truncated at the first comma. Empty and "-"
    /// values count as absent, following reflect.StructTag conventions.
    pub fn tag_value(&self, key: &str) -> Option<String> {
        binding_tag_value(self.tag.as_deref()?, key)
    }
}

/// Binding-relevant tag value for `key`: truncated at the first comma,
/// with empty and "-" values counting as absent.
pub fn binding_tag_value(tag: &str, key: &str) -> Option<String> {
    let value = tag_lookup(tag, key)?;
    let value = value.split(',').next().unwrap_or("").to_string();
    if value.is_empty() || value == "-" {
        None
    } else {
        Some(value)
    }
}

/// A struct declaration collected from a scanned package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructDecl {
    pub name: String,
    pub package: String,
    pub package_path: String,
    pub fields: Vec<StructField>,
}

impl StructDecl {
    /// Qualified name as used in code: `package.Name`.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.package, self.name)
    }

    /// Whether any field carries a non-empty value for the tag key.
    pub fn has_tag(&self, key: &str) -> bool {
        self.fields.iter().any(|f| f.tag_value(key).is_some())
    }

    /// Whether any field carries any of the tag keys.
    pub fn has_any_tag(&self, keys: &[&str]) -> bool {
        keys.iter().any(|k| self.has_tag(k))
    }

    /// Whether any field resolves to a file-bearing type.
    pub fn has_files(&self) -> bool {
        self.fields.iter().any(|f| f.ty.is_file_bearing())
    }
}

/// Looks up the raw value of `key` inside a struct tag string of the form
/// `json:"id" form:"user_id,omitempty"`.
pub fn tag_lookup(tag: &str, key: &str) -> Option<String> {
    let mut rest = tag.trim();
    while !rest.is_empty() {
        let colon = rest.find(':')?;
        let current_key = rest[..colon].trim();
        let after = &rest[colon + 1..];
        if !after.starts_with('"') {
            return None;
        }
        let closing = after[1..].find('"')?;
        let value = &after[1..1 + closing];
        if current_key == key {
            return Some(value.to_string());
        }
        rest = after[closing + 2..].trim_start();
    }
    None
}

/// Per-file resolution context: the declaring package and the file's
/// import table keyed by the alias visible in code.
#[derive(Debug, Clone)]
pub struct FileContext {
    pub package_name: String,
    pub import_path: String,
    pub imports: HashMap<String, String>,
}

impl FileContext {
    pub fn new(pkg: &GoPackage, file: &ParsedFile) -> Self {
        let mut imports = HashMap::new();
        for import in file.imports() {
            let alias = import
                .alias
                .clone()
                .unwrap_or_else(|| default_alias(&import.path));
            imports.insert(alias, import.path);
        }
        Self {
            package_name: pkg.name.clone(),
            import_path: pkg.import_path.clone(),
            imports,
        }
    }
}

/// Conventional package identifier for an import path: the last segment,
/// skipping a trailing major-version segment (`.../echo/v4` -> "echo").
pub fn default_alias(path: &str) -> String {
    let mut segments = path.rsplit('/');
    let last = segments.next().unwrap_or(path);
    if last.len() > 1
        && last.starts_with('v')
        && last[1..].chars().all(|c| c.is_ascii_digit())
    {
        if let Some(prev) = segments.next() {
            return prev.to_string();
        }
    }
    last.to_string()
}

enum TypeDeclKind {
    Struct(StructDecl),
    Other,
}

/// Index of named-type declarations across the loaded package set.
///
/// Built once per scan and read-only afterwards, so it is safe to share
/// across the analysis workers without synchronization.
pub struct TypeIndex {
    types: HashMap<String, TypeDeclKind>,
    package_names: HashMap<String, String>,
}

impl TypeIndex {
    /// Indexes every top-level type declaration of the given packages.
    pub fn new(packages: &[GoPackage]) -> Self {
        let mut types = HashMap::new();
        let mut package_names = HashMap::new();

        for pkg in packages {
            package_names.insert(pkg.import_path.clone(), pkg.name.clone());
            for file in &pkg.files {
                index_file(pkg, file, &mut types);
            }
        }

        debug!("Type index built with {} named types", types.len());
        Self {
            types,
            package_names,
        }
    }

    /// Package name for a scanned import path.
    pub fn package_name_for(&self, import_path: &str) -> Option<&str> {
        self.package_names.get(import_path).map(String::as_str)
    }

    /// Struct declaration for a qualified `package.Name` key.
    pub fn struct_by_key(&self, key: &str) -> Option<&StructDecl> {
        match self.types.get(key) {
            Some(TypeDeclKind::Struct(decl)) => Some(decl),
            _ => None,
        }
    }

    /// All indexed struct declarations.
    pub fn structs(&self) -> impl Iterator<Item = &StructDecl> {
        self.types.values().filter_map(|kind| match kind {
            TypeDeclKind::Struct(decl) => Some(decl),
            TypeDeclKind::Other => None,
        })
    }

    /// Resolves a type to its underlying struct declaration, dereferencing
    /// pointers. None when the type is not a struct or is not indexed.
    pub fn underlying_struct(&self, ty: &GoType, ctx: &FileContext) -> Option<&StructDecl> {
        match ty.deref() {
            GoType::Named {
                package: None,
                name,
            } => self.struct_by_key(&format!("{}.{}", ctx.package_name, name)),
            GoType::Named {
                package: Some(alias),
                name,
            } => {
                let pkg_name = ctx
                    .imports
                    .get(alias)
                    .and_then(|path| self.package_name_for(path))
                    .unwrap_or(alias.as_str());
                self.struct_by_key(&format!("{}.{}", pkg_name, name))
            }
            _ => None,
        }
    }

    /// Full import path of the package owning a named type, following
    /// slice elements and pointers. None for basics and maps.
    pub fn package_path_of(&self, ty: &GoType, ctx: &FileContext) -> Option<String> {
        match ty.deref() {
            GoType::Named { package: None, .. } => Some(ctx.import_path.clone()),
            GoType::Named {
                package: Some(alias),
                ..
            } => ctx.imports.get(alias).cloned(),
            GoType::Slice(elem) => self.package_path_of(elem, ctx),
            _ => None,
        }
    }
}

fn index_file(pkg: &GoPackage, file: &ParsedFile, types: &mut HashMap<String, TypeDeclKind>) {
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
            let name = file.text(name_node).to_string();
            let key = format!("{}.{}", pkg.name, name);

            let kind = match spec.child_by_field_name("type") {
                Some(ty) if ty.kind() == "struct_type" => TypeDeclKind::Struct(StructDecl {
                    name,
                    package: pkg.name.clone(),
                    package_path: pkg.import_path.clone(),
                    fields: struct_fields(ty, file),
                }),
                _ => TypeDeclKind::Other,
            };
            types.insert(key, kind);
        }
    }
}

fn struct_fields(struct_type: Node, file: &ParsedFile) -> Vec<StructField> {
    let mut fields = Vec::new();
    let Some(list) = struct_type
        .named_children(&mut struct_type.walk())
        .find(|n| n.kind() == "field_declaration_list")
    else {
        return fields;
    };

    for i in 0..list.named_child_count() {
        let Some(decl) = list.named_child(i) else {
            continue;
        };
        if decl.kind() != "field_declaration" {
            continue;
        }
        let Some(ty) = decl
            .child_by_field_name("type")
            .and_then(|t| GoType::parse(t, file))
        else {
            continue;
        };
        let tag = decl
            .child_by_field_name("tag")
            .map(|t| crate::meta::unquote(file.text(t)));

        let mut cursor = decl.walk();
        let names: Vec<String> = decl
            .children_by_field_name("name", &mut cursor)
            .map(|n| file.text(n).to_string())
            .collect();
        if names.is_empty() {
            // Embedded field, nothing to bind by name.
            continue;
        }
        for name in names {
            fields.push(StructField {
                name,
                ty: ty.clone(),
                tag: tag.clone(),
            });
        }
    }
    fields
}

/// Local-variable types harvested from one handler body.
#[derive(Debug, Default)]
pub struct FnScope {
    vars: HashMap<String, GoType>,
}

impl FnScope {
    /// Collects `var x T`, `x := T{...}`, `x := &T{...}`, `x := new(T)` and
    /// `x := make(T, ...)` declarations from the body in document order.
    pub fn from_body(body: Node, file: &ParsedFile) -> Self {
        let mut scope = FnScope::default();
        crate::meta::visit(body, &mut |node| match node.kind() {
            "var_spec" => {
                let mut cursor = node.walk();
                let names: Vec<String> = node
                    .children_by_field_name("name", &mut cursor)
                    .map(|n| file.text(n).to_string())
                    .collect();

                if let Some(ty) = node
                    .child_by_field_name("type")
                    .and_then(|t| GoType::parse(t, file))
                {
                    for name in names {
                        scope.vars.insert(name, ty.clone());
                    }
                } else if let Some(values) = node.child_by_field_name("value") {
                    scope.bind_list(&names, values, file);
                }
            }
            "short_var_declaration" => {
                let Some(left) = node.child_by_field_name("left") else {
                    return;
                };
                let Some(right) = node.child_by_field_name("right") else {
                    return;
                };
                let names: Vec<String> = (0..left.named_child_count())
                    .filter_map(|i| left.named_child(i))
                    .filter(|n| n.kind() == "identifier")
                    .map(|n| file.text(n).to_string())
                    .collect();
                scope.bind_list(&names, right, file);
            }
            _ => {}
        });
        scope
    }

    fn bind_list(&mut self, names: &[String], values: Node, file: &ParsedFile) {
        let exprs: Vec<Node> = (0..values.named_child_count())
            .filter_map(|i| values.named_child(i))
            .collect();
        if exprs.len() != names.len() {
            return;
        }
        for (name, expr) in names.iter().zip(exprs) {
            if let Some(ty) = self.type_of_expr(expr, file) {
                self.vars.insert(name.clone(), ty);
            }
        }
    }

    /// Declared type of a local variable.
    pub fn var_type(&self, name: &str) -> Option<&GoType> {
        self.vars.get(name)
    }

    /// Best-effort static type of an expression: literals, composite
    /// literals, address-of, `new`/`make` calls and scoped identifiers.
    /// None for everything else, which callers treat as an accepted gap.
    pub fn type_of_expr(&self, expr: Node, file: &ParsedFile) -> Option<GoType> {
        match expr.kind() {
            "identifier" => self.var_type(file.text(expr)).cloned(),
            "composite_literal" => expr
                .child_by_field_name("type")
                .and_then(|t| GoType::parse(t, file)),
            "unary_expression" => {
                let operator = expr.child_by_field_name("operator")?;
                if file.text(operator) != "&" {
                    return None;
                }
                let operand = expr.child_by_field_name("operand")?;
                Some(GoType::Pointer(Box::new(self.type_of_expr(operand, file)?)))
            }
            "call_expression" => {
                let func = expr.child_by_field_name("function")?;
                if func.kind() != "identifier" {
                    return None;
                }
                let args = crate::meta::call_args(expr);
                match file.text(func) {
                    "new" => {
                        let ty = GoType::parse(*args.first()?, file)?;
                        Some(GoType::Pointer(Box::new(ty)))
                    }
                    "make" => GoType::parse(*args.first()?, file),
                    _ => None,
                }
            }
            "interpreted_string_literal" | "raw_string_literal" => {
                Some(GoType::Basic("string".to_string()))
            }
            "int_literal" => Some(GoType::Basic("int".to_string())),
            "float_literal" => Some(GoType::Basic("float64".to_string())),
            "true" | "false" => Some(GoType::Basic("bool".to_string())),
            "parenthesized_expression" => self.type_of_expr(expr.named_child(0)?, file),
            _ => None,
        }
    }
}

/// Inferred type of an inline parameter read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Int,
    Int64,
    Uint,
    Float64,
    Bool,
    Uuid,
    Time,
    File,
}

impl std::fmt::Display for ParamType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let s = match self {
            ParamType::String => "string",
            ParamType::Int => "int",
            ParamType::Int64 => "int64",
            ParamType::Uint => "uint",
            ParamType::Float64 => "float64",
            ParamType::Bool => "bool",
            ParamType::Uuid => "uuid",
            ParamType::Time => "time",
            ParamType::File => "file",
        };
        f.write_str(s)
    }
}

/// Target type of a well-known string-to-value conversion, keyed by the
/// called package and function. This is the table consulted when a raw
/// parameter read is fed into a conversion call.
pub fn conversion_target(pkg: &str, func: &str) -> Option<ParamType> {
    match (pkg, func) {
        ("strconv", "Atoi") => Some(ParamType::Int),
        ("strconv", "ParseInt") => Some(ParamType::Int64),
        ("strconv", "ParseUint") => Some(ParamType::Uint),
        ("strconv", "ParseFloat") => Some(ParamType::Float64),
        ("strconv", "ParseBool") => Some(ParamType::Bool),
        ("uuid", "Parse") | ("uuid", "MustParse") => Some(ParamType::Uuid),
        ("time", "Parse") => Some(ParamType::Time),
        _ => None,
    }
}

/// Checks whether `call` consumes a context accessor read as its first
/// argument, e.g. `strconv.Atoi(c.QueryParam("page"))` for accessor
/// "QueryParam" and name "page".
pub fn is_param_usage(call: Node, file: &ParsedFile, accessor: &str, param_name: &str) -> bool {
    let args = crate::meta::call_args(call);
    let Some(first) = args.first() else {
        return false;
    };
    if first.kind() != "call_expression" {
        return false;
    }
    if crate::meta::called_func_name(*first, file) != Some(accessor) {
        return false;
    }
    let inner_args = crate::meta::call_args(*first);
    let Some(name_arg) = inner_args.first() else {
        return false;
    };
    crate::meta::string_literal_value(*name_arg, file).as_deref() == Some(param_name)
}
