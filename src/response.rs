//! Response helpers shared by the output stage and the system routes.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Already-encoded JSON with the fixed content type. An empty payload goes out bare.
pub fn json_bytes(status: StatusCode, bytes: Vec<u8>) -> Response {
    if bytes.is_empty() {
        return status.into_response();
    }
    (
        status,
        [(header::CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE))],
        bytes,
    )
        .into_response()
}

/// List envelope: rows plus paging metadata.
#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub meta: PageMeta,
}

#[derive(Debug, Serialize)]
pub struct PageMeta {
    pub count: u64,
    pub limit: u32,
    pub offset: u32,
}

impl<T> Page<T> {
    pub fn new(data: Vec<T>, count: u64, limit: u32, offset: u32) -> Self {
        Self {
            data,
            meta: PageMeta { count, limit, offset },
        }
    }
}
