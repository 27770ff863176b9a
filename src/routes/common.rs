//! System routes: health, readiness, version and the OpenAPI document.

use crate::manager::LifecycleState;
use crate::routing::{format_path, RouteTable};
use crate::state::AppState;
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;
use std::collections::BTreeMap;

pub const HEALTH_PATH: &str = "/health";
pub const READY_PATH: &str = "/ready";
pub const VERSION_PATH: &str = "/version";
pub const OPENAPI_PATH: &str = "/openapi.json";

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
}

#[derive(Serialize)]
struct ReadyBody {
    status: &'static str,
    lifecycle: LifecycleState,
    #[serde(skip_serializing_if = "Option::is_none")]
    database: Option<&'static str>,
}

#[derive(Serialize)]
struct VersionBody<'a> {
    name: &'static str,
    version: &'static str,
    packages: &'a BTreeMap<String, String>,
}

async fn health() -> Json<HealthBody> {
    Json(HealthBody { status: "ok" })
}

async fn ready(State(state): State<AppState>) -> (StatusCode, Json<ReadyBody>) {
    let lifecycle = state.lifecycle();
    let database = match &state.database {
        Some(db) => match db.ping().await {
            Ok(()) => Some("ok"),
            Err(e) => {
                tracing::warn!(error = %e, "readiness ping failed");
                Some("unavailable")
            }
        },
        None => None,
    };
    let ok = lifecycle == LifecycleState::Ready && database != Some("unavailable");
    let (status, label) = if ok {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };
    (
        status,
        Json(ReadyBody {
            status: label,
            lifecycle,
            database,
        }),
    )
}

async fn version(State(state): State<AppState>) -> Json<serde_json::Value> {
    let body = VersionBody {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        packages: &state.packages,
    };
    Json(serde_json::to_value(body).unwrap_or_default())
}

async fn openapi(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::to_value(state.openapi.as_ref()).unwrap_or_default())
}

/// System routes at their full paths under `api_base`. A path a package already binds is left
/// to the package.
pub fn system_routes(state: AppState, api_base: &str, bound: &RouteTable) -> Router {
    let mut router = Router::new();
    for (path, method_router) in [
        (HEALTH_PATH, get(health)),
        (READY_PATH, get(ready)),
        (VERSION_PATH, get(version)),
        (OPENAPI_PATH, get(openapi)),
    ] {
        let full = format_path([api_base, path]);
        if bound.matches_path(&full) {
            tracing::debug!(path = %full, "system route shadowed by a package route");
            continue;
        }
        router = router.route(&full, method_router);
    }
    router.with_state(state)
}
