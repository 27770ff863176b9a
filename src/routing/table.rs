//! The application route table and its transport adapter.

use crate::error::{AppError, DeclarationError};
use crate::pipeline::Endpoint;
use crate::registry::SchemaSet;
use crate::routing::path::{check_route, shape, to_router_path};
use crate::routing::Method;
use axum::extract::Request;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// One bound route.
pub struct RouteEntry {
    pub path: String,
    pub method: Method,
    /// `<package>.<handler>`
    pub name: String,
    pub package: String,
    pub description: Option<String>,
    pub schemas: SchemaSet,
    pub(crate) endpoint: Arc<dyn Endpoint>,
}

impl fmt::Debug for RouteEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteEntry")
            .field("path", &self.path)
            .field("method", &self.method)
            .field("name", &self.name)
            .field("package", &self.package)
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct RouteTable {
    entries: Vec<RouteEntry>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a route. Full paths are unique per method; two paths that match the same requests
    /// but name their parameters differently also conflict.
    pub fn insert(&mut self, entry: RouteEntry) -> Result<(), DeclarationError> {
        if let Err(reason) = check_route(&entry.path) {
            return Err(DeclarationError::InvalidRoute {
                handler: entry.name,
                path: entry.path,
                reason,
            });
        }
        let incoming_shape = shape(&entry.path);
        let clash = self.entries.iter().find(|existing| {
            shape(&existing.path) == incoming_shape
                && (existing.method == entry.method || existing.path != entry.path)
        });
        if let Some(existing) = clash {
            return Err(DeclarationError::RouteConflict {
                method: entry.method.to_string(),
                path: entry.path.clone(),
                existing: existing.name.clone(),
                incoming: entry.name,
            });
        }
        self.entries.push(entry);
        Ok(())
    }

    pub fn entries(&self) -> &[RouteEntry] {
        &self.entries
    }

    pub fn get(&self, method: Method, path: &str) -> Option<&RouteEntry> {
        self.entries
            .iter()
            .find(|e| e.method == method && e.path == path)
    }

    /// Whether any route matches the same requests as `path`.
    pub fn matches_path(&self, path: &str) -> bool {
        let wanted = shape(path);
        self.entries.iter().any(|e| shape(&e.path) == wanted)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// One router route per distinct path, dispatching on method.
    pub fn router(&self) -> Router {
        let mut by_path: BTreeMap<&str, Vec<(Method, Arc<dyn Endpoint>)>> = BTreeMap::new();
        for entry in &self.entries {
            by_path
                .entry(entry.path.as_str())
                .or_default()
                .push((entry.method, Arc::clone(&entry.endpoint)));
        }

        let mut router = Router::new();
        for (path, methods) in by_path {
            let methods = Arc::new(methods);
            router = router.route(
                &to_router_path(path),
                any(move |req: Request| {
                    let methods = Arc::clone(&methods);
                    async move { dispatch(&methods, req).await }
                }),
            );
        }
        router
    }
}

async fn dispatch(methods: &[(Method, Arc<dyn Endpoint>)], req: Request) -> Response {
    let requested = Method::from_http(req.method());
    match methods.iter().find(|(m, _)| Some(*m) == requested) {
        Some((_, endpoint)) => endpoint.call(req).await,
        None => {
            let allow = methods
                .iter()
                .map(|(m, _)| m.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            let mut response =
                AppError::http(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed").into_response();
            if let Ok(value) = HeaderValue::from_str(&allow) {
                response.headers_mut().insert(header::ALLOW, value);
            }
            response
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use tower::ServiceExt;

    struct Fixed(&'static str);

    #[async_trait]
    impl Endpoint for Fixed {
        async fn call(&self, _req: Request) -> Response {
            self.0.into_response()
        }
    }

    fn entry(method: Method, path: &str, name: &str, body: &'static str) -> RouteEntry {
        RouteEntry {
            path: path.to_string(),
            method,
            name: name.to_string(),
            package: "catalog".to_string(),
            description: None,
            schemas: SchemaSet::default(),
            endpoint: Arc::new(Fixed(body)),
        }
    }

    #[test]
    fn same_path_and_method_conflicts() {
        let mut table = RouteTable::new();
        table
            .insert(entry(Method::Get, "/api/items/{id}", "catalog.get", "a"))
            .unwrap();
        table
            .insert(entry(Method::Delete, "/api/items/{id}", "catalog.delete", "b"))
            .unwrap();
        let err = table
            .insert(entry(Method::Get, "/api/items/{id}", "catalog.get_again", "c"))
            .unwrap_err();
        assert!(matches!(err, DeclarationError::RouteConflict { ref existing, .. } if existing == "catalog.get"));
    }

    #[test]
    fn differently_named_parameters_conflict() {
        let mut table = RouteTable::new();
        table
            .insert(entry(Method::Get, "/api/items/{id}", "catalog.get", "a"))
            .unwrap();
        assert!(table
            .insert(entry(Method::Put, "/api/items/{item_id}", "catalog.put", "b"))
            .is_err());
    }

    #[test]
    fn router_syntax_in_full_path_is_refused() {
        let mut table = RouteTable::new();
        table
            .insert(entry(Method::Get, "/api/items/{id}", "catalog.get", "a"))
            .unwrap();
        let err = table
            .insert(entry(Method::Delete, "/api/items/:item_id", "catalog.delete", "b"))
            .unwrap_err();
        assert!(matches!(err, DeclarationError::InvalidRoute { ref handler, .. } if handler == "catalog.delete"));
        assert_eq!(table.len(), 1);
    }

    #[tokio::test]
    async fn router_dispatches_by_method() {
        let mut table = RouteTable::new();
        table
            .insert(entry(Method::Get, "/api/items/{id}", "catalog.get", "got"))
            .unwrap();
        table
            .insert(entry(Method::Delete, "/api/items/{id}", "catalog.delete", "deleted"))
            .unwrap();
        let router = table.router();

        let response = router
            .clone()
            .oneshot(Request::builder().uri("/api/items/3").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"got");

        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/items/3")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[header::ALLOW], "GET, DELETE");
    }
}
