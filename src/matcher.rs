//! Reconciliation of live route registrations against the statically
//! discovered handler index.

use crate::demangle;
use crate::extractor::request::Param;
use crate::extractor::Handler;
use crate::typing::{self, GoType, StructDecl, TypeIndex};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// One route captured from a live, already-constructed router.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub method: String,
    pub path: String,
    /// Mangled registration name, see [`crate::demangle`]
    pub name: String,
}

/// A query parameter resolved for a matched route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryParam {
    pub name: String,
    pub ty: String,
    pub required: bool,
}

/// A route paired with its resolved handler and the parameter union.
#[derive(Debug, Clone, Serialize)]
pub struct RouteMatch {
    pub route: Route,
    /// Route path in parameter-placeholder syntax: `/users/{id}`
    pub path: String,
    pub handler: Handler,
    pub path_params: Vec<Param>,
    pub query_params: Vec<QueryParam>,
}

/// Registered shape of a model, used to resolve struct-tag parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StructShape {
    pub fields: Vec<FieldShape>,
}

/// One field of a registered model shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldShape {
    pub name: String,
    /// Rendered type name, pointers stripped
    pub ty: String,
    /// Whether the field was declared through a pointer
    pub optional: bool,
    /// Raw struct tag, backticks stripped
    pub tag: Option<String>,
}

impl FieldShape {
    fn tag_value(&self, key: &str) -> Option<String> {
        typing::binding_tag_value(self.tag.as_deref()?, key)
    }
}

/// Qualified model name to its registered shape.
pub type ModelRegistry = HashMap<String, StructShape>;

impl StructShape {
    /// Builds a shape from an indexed struct declaration.
    pub fn from_struct(decl: &StructDecl) -> Self {
        let fields = decl
            .fields
            .iter()
            .map(|f| FieldShape {
                name: f.name.clone(),
                ty: f.ty.deref().render(&decl.package),
                optional: matches!(f.ty, GoType::Pointer(_)),
                tag: f.tag.clone(),
            })
            .collect();
        Self { fields }
    }
}

/// Builds a model registry covering every struct of the scanned packages.
pub fn registry_from_index(index: &TypeIndex) -> ModelRegistry {
    index
        .structs()
        .map(|decl| (decl.qualified_name(), StructShape::from_struct(decl)))
        .collect()
}

/// Converts a colon-parameter route path to placeholder syntax:
/// `/users/:id` becomes `/users/{id}`.
pub fn normalize_path_params(path: &str) -> String {
    path.split('/')
        .map(|segment| match segment.strip_prefix(':') {
            Some(name) => format!("{{{}}}", name),
            None => segment.to_string(),
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Matches live routes against the discovered handler index.
pub struct RouteMatcher<'a> {
    /// Handlers keyed by qualified name, sorted for deterministic lookup
    handlers: Vec<(&'a String, &'a Handler)>,
    registry: &'a ModelRegistry,
}

impl<'a> RouteMatcher<'a> {
    pub fn new(handlers: &'a HashMap<String, Handler>, registry: &'a ModelRegistry) -> Self {
        let mut sorted: Vec<_> = handlers.iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(b.0));
        Self {
            handlers: sorted,
            registry,
        }
    }

    /// Resolves every route to a [`RouteMatch`]. Routes whose demangled
    /// name has no discovered handler are dropped with a warning; they
    /// cannot be specified without a contract.
    pub fn match_routes(&self, routes: &[Route]) -> Vec<RouteMatch> {
        let mut matches = Vec::with_capacity(routes.len());
        for route in routes {
            let name = demangle::handler_name(&route.name);
            let Some(handler) = self.lookup(name) else {
                warn!("matched handler not found, skipping: {}", name);
                continue;
            };
            debug!("matched route {} {} to {}", route.method, route.path, name);
            matches.push(self.build_match(route, handler));
        }
        matches
    }

    fn lookup(&self, name: &str) -> Option<&Handler> {
        let suffix = format!(".{}", name);
        self.handlers
            .iter()
            .find(|(key, _)| key.as_str() == name || key.ends_with(&suffix))
            .map(|(_, handler)| *handler)
    }

    fn build_match(&self, route: &Route, handler: &Handler) -> RouteMatch {
        let shape = handler
            .request
            .as_ref()
            .filter(|req| !req.bind_model.is_empty())
            .and_then(|req| self.registry.get(&req.bind_model));

        RouteMatch {
            route: route.clone(),
            path: normalize_path_params(&route.path),
            handler: handler.clone(),
            path_params: path_param_union(route, handler, shape),
            query_params: query_param_union(handler, shape),
        }
    }
}

/// Path parameters: seeded from the route path as strings, overlaid by
/// inline reads, overlaid by struct-tag declarations. Struct-tag entries
/// win on name collision.
fn path_param_union(
    route: &Route,
    handler: &Handler,
    shape: Option<&StructShape>,
) -> Vec<Param> {
    let mut params: BTreeMap<String, Param> = BTreeMap::new();

    for segment in route.path.split('/') {
        if let Some(name) = segment.strip_prefix(':') {
            params.insert(
                name.to_string(),
                Param {
                    name: name.to_string(),
                    ty: "string".to_string(),
                },
            );
        }
    }

    if let Some(request) = &handler.request {
        for param in &request.path_params {
            params.insert(param.name.clone(), param.clone());
        }
    }

    if let Some(shape) = shape {
        for field in &shape.fields {
            if let Some(name) = field.tag_value("param") {
                params.insert(
                    name.clone(),
                    Param {
                        name,
                        ty: field.ty.clone(),
                    },
                );
            }
        }
    }

    params.into_values().collect()
}

/// Query parameters: inline reads (never provably required) overlaid by
/// struct-tag declarations, whose required flag follows field optionality.
fn query_param_union(handler: &Handler, shape: Option<&StructShape>) -> Vec<QueryParam> {
    let mut params: BTreeMap<String, QueryParam> = BTreeMap::new();

    if let Some(request) = &handler.request {
        for param in &request.query_params {
            params.insert(
                param.name.clone(),
                QueryParam {
                    name: param.name.clone(),
                    ty: param.ty.clone(),
                    required: false,
                },
            );
        }
    }

    if let Some(shape) = shape {
        for field in &shape.fields {
            if let Some(name) = field.tag_value("query") {
                params.insert(
                    name.clone(),
                    QueryParam {
                        name,
                        ty: field.ty.clone(),
                        required: !field.optional,
                    },
                );
            }
        }
    }

    params.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::request::Request;
    use crate::extractor::response::StatusCodeMapping;
    use pretty_assertions::assert_eq;

    fn handler(package: &str, name: &str) -> Handler {
        Handler {
            name: name.to_string(),
            package: package.to_string(),
            package_path: format!("example.com/svc/{}", package),
            doc: String::new(),
            request: None,
            responses: StatusCodeMapping::new(),
        }
    }

    fn index_of(handlers: Vec<Handler>) -> HashMap<String, Handler> {
        handlers
            .into_iter()
            .map(|h| (h.qualified_name(), h))
            .collect()
    }

    fn route(method: &str, path: &str, name: &str) -> Route {
        Route {
            method: method.to_string(),
            path: path.to_string(),
            name: name.to_string(),
        }
    }

    #[test]
    fn test_normalize_path_params() {
        assert_eq!(normalize_path_params("/users/:id"), "/users/{id}");
        assert_eq!(
            normalize_path_params("/orgs/:org/users/:id"),
            "/orgs/{org}/users/{id}"
        );
        assert_eq!(normalize_path_params("/health"), "/health");
    }

    #[test]
    fn test_match_closure_wrapped_and_plain_names() {
        let handlers = index_of(vec![handler("api", "LoginHandler")]);
        let registry = ModelRegistry::new();
        let matcher = RouteMatcher::new(&handlers, &registry);

        let routes = vec![
            route(
                "POST",
                "/login",
                "example.com/svc/api.(*Server).setup.LoginHandler.func1",
            ),
            route("GET", "/login", "api.LoginHandler"),
        ];
        let matches = matcher.match_routes(&routes);

        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].handler.name, "LoginHandler");
        assert_eq!(matches[1].handler.name, "LoginHandler");
    }

    #[test]
    fn test_unmatched_routes_are_dropped() {
        let handlers = index_of(vec![handler("api", "LoginHandler")]);
        let registry = ModelRegistry::new();
        let matcher = RouteMatcher::new(&handlers, &registry);

        let routes = vec![route("GET", "/ghost", "api.GhostHandler")];
        let matches = matcher.match_routes(&routes);

        assert!(matches.is_empty());
    }

    #[test]
    fn test_path_params_seeded_from_route_path() {
        let handlers = index_of(vec![handler("api", "GetUser")]);
        let registry = ModelRegistry::new();
        let matcher = RouteMatcher::new(&handlers, &registry);

        let matches = matcher.match_routes(&[route("GET", "/users/:id", "api.GetUser")]);

        assert_eq!(matches[0].path, "/users/{id}");
        assert_eq!(
            matches[0].path_params,
            vec![Param {
                name: "id".to_string(),
                ty: "string".to_string()
            }]
        );
    }

    #[test]
    fn test_inline_reads_override_path_seed() {
        let mut h = handler("api", "GetUser");
        h.request = Some(Request {
            path_params: vec![Param {
                name: "id".to_string(),
                ty: "int".to_string(),
            }],
            ..Request::default()
        });
        let handlers = index_of(vec![h]);
        let registry = ModelRegistry::new();
        let matcher = RouteMatcher::new(&handlers, &registry);

        let matches = matcher.match_routes(&[route("GET", "/users/:id", "api.GetUser")]);

        assert_eq!(matches[0].path_params[0].ty, "int");
    }

    #[test]
    fn test_struct_tag_params_take_precedence() {
        let mut h = handler("api", "GetUser");
        h.request = Some(Request {
            bind_model: "api.GetUserRequest".to_string(),
            bind_model_package: "example.com/svc/api".to_string(),
            path_params: vec![Param {
                name: "id".to_string(),
                ty: "string".to_string(),
            }],
            ..Request::default()
        });
        let handlers = index_of(vec![h]);

        let mut registry = ModelRegistry::new();
        registry.insert(
            "api.GetUserRequest".to_string(),
            StructShape {
                fields: vec![FieldShape {
                    name: "ID".to_string(),
                    ty: "int64".to_string(),
                    optional: false,
                    tag: Some(r#"param:"id""#.to_string()),
                }],
            },
        );
        let matcher = RouteMatcher::new(&handlers, &registry);

        let matches = matcher.match_routes(&[route("GET", "/users/:id", "api.GetUser")]);

        assert_eq!(
            matches[0].path_params,
            vec![Param {
                name: "id".to_string(),
                ty: "int64".to_string()
            }]
        );
    }

    #[test]
    fn test_query_union_with_registry_optionality() {
        let mut h = handler("api", "ListUsers");
        h.request = Some(Request {
            bind_model: "api.ListRequest".to_string(),
            bind_model_package: "example.com/svc/api".to_string(),
            query_params: vec![Param {
                name: "search".to_string(),
                ty: "string".to_string(),
            }],
            ..Request::default()
        });
        let handlers = index_of(vec![h]);

        let mut registry = ModelRegistry::new();
        registry.insert(
            "api.ListRequest".to_string(),
            StructShape {
                fields: vec![
                    FieldShape {
                        name: "Limit".to_string(),
                        ty: "int".to_string(),
                        optional: false,
                        tag: Some(r#"query:"limit""#.to_string()),
                    },
                    FieldShape {
                        name: "Offset".to_string(),
                        ty: "int".to_string(),
                        optional: true,
                        tag: Some(r#"query:"offset""#.to_string()),
                    },
                ],
            },
        );
        let matcher = RouteMatcher::new(&handlers, &registry);

        let matches = matcher.match_routes(&[route("GET", "/users", "api.ListUsers")]);

        assert_eq!(
            matches[0].query_params,
            vec![
                QueryParam {
                    name: "limit".to_string(),
                    ty: "int".to_string(),
                    required: true
                },
                QueryParam {
                    name: "offset".to_string(),
                    ty: "int".to_string(),
                    required: false
                },
                QueryParam {
                    name: "search".to_string(),
                    ty: "string".to_string(),
                    required: false
                },
            ]
        );
    }

    #[test]
    fn test_unregistered_bind_model_falls_back_to_inline_only() {
        let mut h = handler("api", "GetUser");
        h.request = Some(Request {
            bind_model: "api.Unregistered".to_string(),
            ..Request::default()
        });
        let handlers = index_of(vec![h]);
        let registry = ModelRegistry::new();
        let matcher = RouteMatcher::new(&handlers, &registry);

        let matches = matcher.match_routes(&[route("GET", "/users/:id", "api.GetUser")]);

        assert_eq!(matches[0].path_params.len(), 1);
        assert_eq!(matches[0].path_params[0].ty, "string");
    }

    #[test]
    fn test_route_deserialization_format() {
        let json = r#"[{"method":"GET","path":"/users/:id","name":"api.GetUser"}]"#;
        let routes: Vec<Route> = serde_json::from_str(json).unwrap();

        assert_eq!(routes[0], route("GET", "/users/:id", "api.GetUser"));
    }
}
