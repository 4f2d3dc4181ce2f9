use std::fmt;

use crate::error::ConfigError;
use crate::registry::HttpMethod;
use crate::token::Token;

/// One live `(method, path)` pair and the handler behind it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MountedRoute {
    pub method: HttpMethod,
    pub path: String,
    pub controller: Token,
    pub handler: String,
}

/// The frozen route table produced at boot, in mount order.
#[derive(Clone, Debug, Default)]
pub struct RouteTable {
    routes: Vec<MountedRoute>,
}

impl RouteTable {
    pub fn iter(&self) -> impl Iterator<Item = &MountedRoute> {
        self.routes.iter()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn contains(&self, method: HttpMethod, path: &str) -> bool {
        self.routes
            .iter()
            .any(|r| r.method == method && r.path == path)
    }

    /// Reject a duplicate `(method, path)` and paths the router could not tell apart.
    pub(crate) fn insert(&mut self, route: MountedRoute) -> Result<(), ConfigError> {
        let shape = path_shape(&route.path);
        for existing in &self.routes {
            if existing.path == route.path {
                if existing.method == route.method {
                    return Err(ConfigError::DuplicateRoute {
                        method: route.method,
                        path: route.path,
                        first: existing.controller,
                        second: route.controller,
                    });
                }
            } else if path_shape(&existing.path) == shape {
                return Err(ConfigError::ConflictingRoutePath {
                    path: route.path,
                    existing: existing.path.clone(),
                });
            }
        }
        self.routes.push(route);
        Ok(())
    }
}

impl fmt::Display for RouteTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for r in &self.routes {
            writeln!(f, "{:<7} {} -> {}::{}", r.method.as_str(), r.path, r.controller, r.handler)?;
        }
        Ok(())
    }
}

/// Prefix and route path concatenated literally, then checked for router-safe syntax.
pub(crate) fn mounted_path(controller: Token, prefix: &str, path: &str) -> Result<String, ConfigError> {
    let full = format!("{prefix}{path}");
    let invalid = || ConfigError::InvalidRoutePath {
        controller,
        path: full.clone(),
    };
    if !full.starts_with('/') {
        return Err(invalid());
    }
    for segment in full.split('/').skip(1) {
        if segment.contains(['{', '}', '*']) {
            return Err(invalid());
        }
        if let Some(name) = segment.strip_prefix(':') {
            let valid = !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
            if !valid {
                return Err(invalid());
            }
        } else if segment.contains(':') {
            return Err(invalid());
        }
    }
    Ok(full)
}

/// `/users/:id` → `/users/{id}`
pub(crate) fn axum_path(path: &str) -> String {
    path.split('/')
        .map(|segment| match segment.strip_prefix(':') {
            Some(name) => format!("{{{name}}}"),
            None => segment.to_string(),
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn path_shape(path: &str) -> String {
    path.split('/')
        .map(|segment| if segment.starts_with(':') { ":" } else { segment })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    const USERS: Token = Token::new("users");
    const ADMIN: Token = Token::new("admin");

    fn route(method: HttpMethod, path: &str, controller: Token) -> MountedRoute {
        MountedRoute {
            method,
            path: path.into(),
            controller,
            handler: "h".into(),
        }
    }

    #[test]
    fn concatenation_is_literal() {
        assert_eq!(mounted_path(USERS, "/users", "/:id").unwrap(), "/users/:id");
        assert_eq!(mounted_path(USERS, "/users", "").unwrap(), "/users");
        assert_eq!(mounted_path(USERS, "/users/", "/x").unwrap(), "/users//x");
        assert_eq!(mounted_path(USERS, "", "/").unwrap(), "/");
    }

    #[test]
    fn rejects_paths_the_router_cannot_take() {
        for (prefix, path) in [("users", "/x"), ("", ""), ("/a", "/:"), ("/a", "/{id}"), ("/a", "/*rest"), ("/a", "/x:y")] {
            assert!(
                matches!(mounted_path(USERS, prefix, path), Err(ConfigError::InvalidRoutePath { .. })),
                "{prefix}{path} should be rejected"
            );
        }
    }

    #[test]
    fn converts_params_to_router_syntax() {
        assert_eq!(axum_path("/users/:id/posts/:post_id"), "/users/{id}/posts/{post_id}");
        assert_eq!(axum_path("/healthcheck"), "/healthcheck");
    }

    #[test]
    fn duplicate_method_and_path_is_rejected() {
        let mut table = RouteTable::default();
        table.insert(route(HttpMethod::Get, "/users/:id", USERS)).unwrap();
        table.insert(route(HttpMethod::Delete, "/users/:id", USERS)).unwrap();
        let err = table.insert(route(HttpMethod::Get, "/users/:id", ADMIN)).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::DuplicateRoute { first, second, .. } if first == USERS && second == ADMIN
        ));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn same_shape_with_other_param_name_conflicts() {
        let mut table = RouteTable::default();
        table.insert(route(HttpMethod::Get, "/users/:id", USERS)).unwrap();
        table.insert(route(HttpMethod::Get, "/users/me", USERS)).unwrap();
        let err = table.insert(route(HttpMethod::Put, "/users/:name", USERS)).unwrap_err();
        assert!(matches!(err, ConfigError::ConflictingRoutePath { .. }));
    }

    #[test]
    fn display_lists_routes_in_mount_order() {
        let mut table = RouteTable::default();
        table.insert(route(HttpMethod::Get, "/users", USERS)).unwrap();
        table.insert(route(HttpMethod::Post, "/users", USERS)).unwrap();
        let text = table.to_string();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("GET"));
        assert!(lines[1].contains("/users -> users::h"));
        assert!(table.contains(HttpMethod::Post, "/users"));
        assert!(!table.contains(HttpMethod::Put, "/users"));
    }
}
