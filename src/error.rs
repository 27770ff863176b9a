//! Typed errors and HTTP mapping.

use crate::manager::LifecycleState;
use crate::schema::ValidationErrors;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Error type returned by component constructors and lifecycle hooks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Programmer errors in package, handler or component declarations. Always fatal at startup.
#[derive(Error, Debug)]
pub enum DeclarationError {
    #[error("invalid package name '{0}': only alphanumeric and underscore characters are allowed")]
    InvalidName(String),
    #[error("package name '{0}' is reserved")]
    ReservedName(String),
    #[error("package {name}: '{version}' is not a valid semantic version")]
    InvalidVersion { name: String, version: String },
    #[error("package {name}: invalid path '{path}', expected a single segment such as /my-package")]
    InvalidPath { name: String, path: String },
    #[error("handler {handler}: invalid HTTP method '{method}'")]
    InvalidMethod { handler: String, method: String },
    #[error("handler {handler}: invalid route '{path}': {reason}")]
    InvalidRoute {
        handler: String,
        path: String,
        reason: String,
    },
    #[error("duplicate package name: {0}")]
    DuplicatePackage(String),
    #[error("package {0} is already registered")]
    AlreadyRegistered(String),
    #[error("missing package export in {0}")]
    MissingExport(String),
    #[error("invalid package export in {0}: expected a Package")]
    InvalidExport(String),
    #[error("{component} is bound to package {bound}, cannot bind to {requested}")]
    ComponentRebound {
        component: String,
        bound: String,
        requested: String,
    },
    #[error("route conflict on {method} {path}: {existing} and {incoming}")]
    RouteConflict {
        method: String,
        path: String,
        existing: String,
        incoming: String,
    },
    #[error("handler {handler} is incomplete: {missing}")]
    IncompleteHandler {
        handler: String,
        missing: &'static str,
    },
    #[error("handler {0}: schema bindings differ from its pipeline")]
    SchemaMismatch(String),
    #[error("handler {handler} must be declared in {module}, the module of its controller")]
    ForeignHandler { handler: String, module: String },
    #[error("model {model} is owned by package {owner}, cannot register it for {requested}")]
    ModelOwnership {
        model: String,
        owner: String,
        requested: String,
    },
    #[error("table {0} is declared twice")]
    DuplicateTable(String),
    #[error("cannot use unregistered service {0}")]
    ServiceUnavailable(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unable to register models without a database connection")]
    MissingDatabase,
    #[error("config load ({section})")]
    Load {
        section: String,
        #[source]
        source: ::config::ConfigError,
    },
    #[error("config validation ({section}): {errors}")]
    Validation {
        section: String,
        errors: ValidationErrors,
    },
}

/// Anything that aborts application startup.
#[derive(Error, Debug)]
pub enum StartupError {
    #[error(transparent)]
    Declaration(#[from] DeclarationError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("{component} failed")]
    Component {
        component: String,
        #[source]
        source: BoxError,
    },
    #[error("lifecycle is {actual}, expected {expected}")]
    State {
        actual: LifecycleState,
        expected: LifecycleState,
    },
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-request errors. Caught at the pipeline boundary and turned into responses.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("validation: {0}")]
    Validation(ValidationErrors),
    #[error("error decoding request: {0}")]
    Decode(String),
    #[error("{message}")]
    Http { status: StatusCode, message: String },
    #[error("not implemented")]
    NotImplemented,
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("internal: {0}")]
    Internal(String),
}

impl AppError {
    pub fn http(status: StatusCode, message: impl Into<String>) -> Self {
        AppError::Http {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::http(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::http(StatusCode::BAD_REQUEST, message)
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Decode(_) => StatusCode::BAD_REQUEST,
            AppError::Http { status, .. } => *status,
            AppError::Db(sqlx::Error::RowNotFound) => StatusCode::NOT_FOUND,
            AppError::Db(_) | AppError::NotImplemented | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

fn status_code_name(status: StatusCode) -> String {
    status
        .canonical_reason()
        .map(|r| r.to_lowercase().replace([' ', '-'], "_"))
        .unwrap_or_else(|| format!("http_{}", status.as_u16()))
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (code, message, details) = match &self {
            AppError::Validation(errors) => (
                "validation_error".to_string(),
                "Validation failed".to_string(),
                serde_json::to_value(errors).ok(),
            ),
            AppError::Decode(reason) => (
                "decode_error".to_string(),
                "Error decoding JSON".to_string(),
                Some(serde_json::Value::String(reason.clone())),
            ),
            AppError::Http { message, .. } => (status_code_name(status), message.clone(), None),
            AppError::Db(sqlx::Error::RowNotFound) => ("not_found".to_string(), "Not found".to_string(), None),
            AppError::NotImplemented => {
                tracing::error!(error = %self, "handler not implemented");
                ("not_implemented".to_string(), "Not implemented".to_string(), None)
            }
            AppError::Db(_) | AppError::Internal(_) => {
                tracing::error!(error = ?self, "unexpected error");
                ("internal_error".to_string(), "Internal server error".to_string(), None)
            }
        };
        let body = ErrorBody {
            error: ErrorDetail {
                code,
                message,
                details,
            },
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_follows_error_kind() {
        assert_eq!(
            AppError::Validation(ValidationErrors::single("body.name", "x")).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(AppError::Decode("eof".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::not_found("gone").status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::NotImplemented.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(AppError::Db(sqlx::Error::RowNotFound).status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn internal_detail_is_not_sent_to_clients() {
        let response = AppError::Internal("pool exhausted at 10.0.0.3".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("Internal server error"));
        assert!(!text.contains("10.0.0.3"));
    }

    #[tokio::test]
    async fn domain_error_keeps_status_and_message() {
        let response = AppError::http(StatusCode::CONFLICT, "item already reserved").into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["code"], "conflict");
        assert_eq!(body["error"]["message"], "item already reserved");
    }
}
