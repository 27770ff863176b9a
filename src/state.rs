//! Shared state for the system routes. Built once the lifecycle is ready.

use crate::db::Database;
use crate::manager::{LifecycleState, SharedState};
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError};
use utoipa::openapi::OpenApi;

#[derive(Clone)]
pub struct AppState {
    pub lifecycle: SharedState,
    pub database: Option<Database>,
    /// Rendered from the bound route table; the table does not change after startup.
    pub openapi: Arc<OpenApi>,
    /// Package name to version.
    pub packages: Arc<BTreeMap<String, String>>,
}

impl AppState {
    pub fn lifecycle(&self) -> LifecycleState {
        *self.lifecycle.read().unwrap_or_else(PoisonError::into_inner)
    }
}
