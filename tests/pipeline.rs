use axum::body::Body;
use axum::extract::Request;
use axum::http::{header, StatusCode};
use axum::Router;
use mosaic_sdk::{
    AppError, Application, BoxError, Component, ComponentContext, Controller, DeclarationError, EnvSource,
    HandlerRegistry, Input, ListParams, Package, Returns, Schema, ServiceRegistry, Takes, ValidationErrors,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

#[derive(Debug, Deserialize)]
struct NewTicket {
    title: String,
    priority: u8,
}

impl Schema for NewTicket {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        errors.field("title").min_length(&self.title, 3);
        errors.field("priority").maximum(self.priority, 5.0);
        errors.into_result()
    }
}

#[derive(Debug, Deserialize)]
struct TicketPath {
    id: u32,
}

impl Schema for TicketPath {}

#[derive(Debug, Deserialize)]
struct ApiKey {
    #[serde(rename = "x-api-key")]
    api_key: String,
}

impl Schema for ApiKey {}

struct Ticket {
    id: u32,
    title: String,
}

#[derive(Serialize)]
struct TicketOut {
    id: u32,
    title: String,
}

impl From<Ticket> for TicketOut {
    fn from(ticket: Ticket) -> Self {
        Self {
            id: ticket.id,
            title: ticket.title,
        }
    }
}

struct Desk;

impl Component for Desk {}

impl Controller for Desk {
    fn create(_ctx: &ComponentContext) -> Result<Self, BoxError> {
        Ok(Desk)
    }

    fn declare(routes: &HandlerRegistry) -> Result<(), DeclarationError> {
        routes
            .declare::<Self>(mosaic_sdk::handler_id!(open_ticket))
            .route("POST", "/tickets")?
            .takes(Takes::new().body::<NewTicket>())
            .returns(Returns::schema::<TicketOut>().status(StatusCode::CREATED))
            .handle(Self::open_ticket)?;
        routes
            .declare::<Self>(mosaic_sdk::handler_id!(list_tickets))
            .route("get", "/tickets")?
            .takes(Takes::new().query::<ListParams>())
            .returns(Returns::many::<TicketOut>().compact())
            .handle(Self::list_tickets)?;
        routes
            .declare::<Self>(mosaic_sdk::handler_id!(close_ticket))
            .route("DELETE", "/tickets/{id}")?
            .takes(Takes::new().path::<TicketPath>())
            .returns(Returns::empty().status(StatusCode::NO_CONTENT))
            .handle(Self::close_ticket)?;
        routes
            .declare::<Self>(mosaic_sdk::handler_id!(export_ticket))
            .route("GET", "/tickets/{id}/export")?
            .takes(Takes::new().path::<TicketPath>())
            .handle(Self::export_ticket)?;
        routes
            .declare::<Self>(mosaic_sdk::handler_id!(whoami))
            .route("GET", "/whoami")?
            .takes(Takes::new().header::<ApiKey>())
            .handle(Self::whoami)
    }
}

impl Desk {
    async fn open_ticket(self: Arc<Self>, input: Input<(), (), NewTicket>) -> Result<Ticket, AppError> {
        Ok(Ticket {
            id: 1,
            title: input.body.title,
        })
    }

    async fn list_tickets(self: Arc<Self>, input: Input<(), (), (), ListParams>) -> Result<Vec<Ticket>, AppError> {
        let limit = u32::try_from(input.query.limit).unwrap_or_default();
        Ok((1..=limit)
            .map(|id| Ticket {
                id,
                title: format!("ticket {}", id),
            })
            .collect())
    }

    async fn close_ticket(self: Arc<Self>, input: Input<(), TicketPath>) -> Result<(), AppError> {
        if input.path.id == 0 {
            return Err(AppError::http(StatusCode::CONFLICT, "Ticket 0 cannot be closed"));
        }
        Ok(())
    }

    async fn export_ticket(self: Arc<Self>, _input: Input<(), TicketPath>) -> Result<Value, AppError> {
        Err(AppError::NotImplemented)
    }

    async fn whoami(self: Arc<Self>, input: Input<ApiKey>) -> Result<Value, AppError> {
        Ok(json!({
            "key": input.header.api_key,
            "client": input.client.ip().map(|ip| ip.to_string()),
        }))
    }
}

async fn router() -> Router {
    let package = Package::builder("helpdesk").controller::<Desk>().build().unwrap();
    Application::builder()
        .env(EnvSource::fixed(Vec::<(String, String)>::new()))
        .handlers(Arc::new(HandlerRegistry::new()))
        .services(Arc::new(ServiceRegistry::new()))
        .package("/desk", package)
        .build()
        .unwrap()
        .start()
        .await
        .unwrap()
        .router()
}

async fn send(request: Request) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let response = router().await.oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, headers, bytes.to_vec())
}

fn post(uri: &str, body: &'static str) -> Request {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str) -> Request {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn valid_body_is_created_with_declared_status() {
    let (status, _, body) = send(post("/api/desk/tickets", r#"{"title": "Printer jam", "priority": 2}"#)).await;
    assert_eq!(status, StatusCode::CREATED);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body, json!({"id": 1, "title": "Printer jam"}));
}

#[tokio::test]
async fn schema_failures_are_a_field_map() {
    let (status, _, body) = send(post("/api/desk/tickets", r#"{"title": "no", "priority": 9}"#)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["error"]["code"], "validation_error");
    let details = body["error"]["details"].as_object().unwrap();
    assert!(details.contains_key("body.title"));
    assert!(details.contains_key("body.priority"));
}

#[tokio::test]
async fn missing_field_is_named_in_the_field_map() {
    let (status, _, body) = send(post("/api/desk/tickets", r#"{"title": "Printer jam"}"#)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert!(body["error"]["details"]["body.priority"].is_array());
}

#[tokio::test]
async fn absent_body_is_a_decode_error() {
    let (status, _, body) = send(post("/api/desk/tickets", "")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["error"]["code"], "decode_error");

    let (status, _, _) = send(post("/api/desk/tickets", "{\"title\": ")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn query_schema_validates_and_many_serializes_each_item() {
    let (status, _, body) = send(get("/api/desk/tickets?limit=-1")).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert!(body["error"]["details"]["query.limit"].is_array());

    let (status, _, body) = send(get("/api/desk/tickets?limit=2")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        String::from_utf8(body).unwrap(),
        r#"[{"id":1,"title":"ticket 1"},{"id":2,"title":"ticket 2"}]"#
    );
}

#[tokio::test]
async fn empty_output_has_no_body() {
    let request = Request::builder()
        .method("DELETE")
        .uri("/api/desk/tickets/5")
        .body(Body::empty())
        .unwrap();
    let (status, headers, body) = send(request).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(body.is_empty());
    assert!(headers.get(header::CONTENT_TYPE).is_none());

    let request = Request::builder()
        .method("DELETE")
        .uri("/api/desk/tickets/0")
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = send(request).await;
    assert_eq!(status, StatusCode::CONFLICT);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["error"]["message"], "Ticket 0 cannot be closed");
}

#[tokio::test]
async fn invalid_path_parameter_is_a_validation_error() {
    let (status, _, body) = send(get("/api/desk/tickets/abc/export")).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert!(body["error"]["details"].as_object().unwrap().keys().any(|k| k.starts_with("path")));
}

#[tokio::test]
async fn not_implemented_is_a_generic_500() {
    let (status, _, body) = send(get("/api/desk/tickets/3/export")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["error"]["message"], "Not implemented");
}

#[tokio::test]
async fn unbound_method_lists_the_allowed_ones() {
    let request = Request::builder()
        .method("PUT")
        .uri("/api/desk/tickets")
        .body(Body::empty())
        .unwrap();
    let (status, headers, _) = send(request).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    let allow = headers[header::ALLOW].to_str().unwrap();
    assert!(allow.contains("GET") && allow.contains("POST"));
}

#[tokio::test]
async fn headers_and_client_address_reach_the_handler() {
    let (status, _, body) = send(get("/api/desk/whoami")).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert!(body["error"]["details"]["header.x-api-key"].is_array());

    let request = Request::builder()
        .uri("/api/desk/whoami")
        .header("x-api-key", "k-123")
        .header("X-Forwarded-For", "203.0.113.9, 10.0.0.1")
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = send(request).await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body, json!({"key": "k-123", "client": "203.0.113.9"}));
}

#[tokio::test]
async fn openapi_document_lists_bound_operations() {
    let (status, _, body) = send(get("/api/openapi.json")).await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_slice(&body).unwrap();
    let tickets = &body["paths"]["/api/desk/tickets"];
    assert_eq!(tickets["post"]["operationId"], "helpdesk.open_ticket");
    assert_eq!(tickets["get"]["tags"][0], "helpdesk");
}
