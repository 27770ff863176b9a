//! OpenAPI document of the bound route table.

use crate::registry::Part;
use crate::routing::path::params;
use crate::routing::table::RouteTable;
use crate::routing::Method;
use utoipa::openapi::path::{HttpMethod, OperationBuilder, ParameterBuilder, ParameterIn, PathItem};
use utoipa::openapi::{InfoBuilder, OpenApi, OpenApiBuilder, PathsBuilder, Required, ResponseBuilder};

fn http_method(method: Method) -> Option<HttpMethod> {
    match method {
        Method::Get => Some(HttpMethod::Get),
        Method::Post => Some(HttpMethod::Post),
        Method::Put => Some(HttpMethod::Put),
        Method::Patch => Some(HttpMethod::Patch),
        Method::Delete => Some(HttpMethod::Delete),
        Method::Head => Some(HttpMethod::Head),
        Method::Options => Some(HttpMethod::Options),
        Method::Trace => Some(HttpMethod::Trace),
        Method::Connect => None,
    }
}

/// Operation id is the registration name, tag is the owning package. CONNECT routes have no
/// OpenAPI operation and are left out.
pub fn document(table: &RouteTable, title: &str, version: &str) -> OpenApi {
    let mut paths = PathsBuilder::new();
    for route in table.entries() {
        let Some(method) = http_method(route.method) else {
            continue;
        };
        let summary = route
            .schemas
            .get(Part::Body)
            .map(|schema| format!("body: {}", short_name(schema)));
        let status = if route.schemas.get(Part::Response).is_some() {
            "200"
        } else {
            "default"
        };
        let mut operation = OperationBuilder::new()
            .operation_id(Some(route.name.clone()))
            .tag(route.package.clone())
            .summary(summary)
            .description(route.description.clone())
            .response(status, ResponseBuilder::new().description("JSON response").build());
        for name in params(&route.path) {
            operation = operation.parameter(
                ParameterBuilder::new()
                    .name(name)
                    .parameter_in(ParameterIn::Path)
                    .required(Required::True),
            );
        }
        paths = paths.path(route.path.clone(), PathItem::new(method, operation.build()));
    }

    OpenApiBuilder::new()
        .info(InfoBuilder::new().title(title).version(version).build())
        .paths(paths.build())
        .build()
}

fn short_name(type_name: &str) -> &str {
    let base = type_name.split('<').next().unwrap_or(type_name);
    base.rsplit("::").next().unwrap_or(base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Endpoint;
    use crate::registry::SchemaSet;
    use crate::routing::table::RouteEntry;
    use async_trait::async_trait;
    use axum::extract::Request;
    use axum::response::{IntoResponse, Response};
    use std::sync::Arc;

    struct Noop;

    #[async_trait]
    impl Endpoint for Noop {
        async fn call(&self, _req: Request) -> Response {
            ().into_response()
        }
    }

    #[test]
    fn operations_are_grouped_by_path() {
        let mut table = RouteTable::new();
        for (method, name) in [(Method::Get, "catalog.get_item"), (Method::Delete, "catalog.delete_item")] {
            table
                .insert(RouteEntry {
                    path: "/api/catalog/items/{id}".into(),
                    method,
                    name: name.into(),
                    package: "catalog".into(),
                    description: Some("An item".into()),
                    schemas: SchemaSet::default(),
                    endpoint: Arc::new(Noop),
                })
                .unwrap();
        }

        let doc = serde_json::to_value(document(&table, "demo", "1.0.0")).unwrap();
        let item = &doc["paths"]["/api/catalog/items/{id}"];
        assert_eq!(item["get"]["operationId"], "catalog.get_item");
        assert_eq!(item["delete"]["tags"][0], "catalog");
        assert_eq!(item["get"]["parameters"][0]["name"], "id");
        assert_eq!(doc["info"]["title"], "demo");
    }
}
