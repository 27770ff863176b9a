//! Input stage: decode and validate the declared request parts.

use crate::error::AppError;
use crate::extractors::ClientAddr;
use crate::registry::Part;
use crate::schema::{Schema, ValidationErrors};
use async_trait::async_trait;
use axum::extract::{FromRequestParts, Path, Query, Request};
use axum::http::request::Parts;
use axum::http::{HeaderMap, Uri};
use serde_json::Value;
use std::fmt;
use std::marker::PhantomData;

/// Why a part could not be loaded.
#[derive(Debug)]
pub enum SlotError {
    /// The payload is not decodable at all (400).
    Decode(String),
    /// The payload decoded but does not satisfy the schema (422).
    Invalid(ValidationErrors),
}

/// One request part. `()` means "not declared"; any [`Schema`] type is loaded and validated.
#[async_trait]
pub trait Slot: Sized + Send + 'static {
    const DECLARED: bool;

    fn schema() -> Option<&'static str>;

    fn from_headers(headers: &HeaderMap) -> Result<Self, SlotError>;

    async fn from_path(parts: &mut Parts) -> Result<Self, SlotError>;

    fn from_query(uri: &Uri) -> Result<Self, SlotError>;

    fn from_body(bytes: &[u8]) -> Result<Self, SlotError>;
}

#[async_trait]
impl Slot for () {
    const DECLARED: bool = false;

    fn schema() -> Option<&'static str> {
        None
    }

    fn from_headers(_headers: &HeaderMap) -> Result<Self, SlotError> {
        Ok(())
    }

    async fn from_path(_parts: &mut Parts) -> Result<Self, SlotError> {
        Ok(())
    }

    fn from_query(_uri: &Uri) -> Result<Self, SlotError> {
        Ok(())
    }

    fn from_body(_bytes: &[u8]) -> Result<Self, SlotError> {
        Ok(())
    }
}

fn checked<T: Schema>(value: T) -> Result<T, SlotError> {
    value.validate().map_err(SlotError::Invalid)?;
    Ok(value)
}

/// Field named by a serde "missing field `x`" / "unknown field `x`" message, if any.
fn field_of(message: &str) -> &str {
    if !(message.starts_with("missing field") || message.starts_with("unknown field")) {
        return "";
    }
    message.split('`').nth(1).unwrap_or("")
}

fn invalid(message: String) -> SlotError {
    let field = field_of(&message).to_string();
    SlotError::Invalid(ValidationErrors::single(field, message))
}

#[async_trait]
impl<T: Schema> Slot for T {
    const DECLARED: bool = true;

    fn schema() -> Option<&'static str> {
        Some(std::any::type_name::<T>())
    }

    fn from_headers(headers: &HeaderMap) -> Result<Self, SlotError> {
        let mut map = serde_json::Map::new();
        for (name, value) in headers {
            if map.contains_key(name.as_str()) {
                continue;
            }
            if let Ok(value) = value.to_str() {
                map.insert(name.as_str().to_string(), Value::String(value.to_string()));
            }
        }
        let value = serde_json::from_value::<T>(Value::Object(map)).map_err(|e| invalid(e.to_string()))?;
        checked(value)
    }

    async fn from_path(parts: &mut Parts) -> Result<Self, SlotError> {
        let Path(value) = Path::<T>::from_request_parts(parts, &())
            .await
            .map_err(|rejection| invalid(rejection.body_text()))?;
        checked(value)
    }

    fn from_query(uri: &Uri) -> Result<Self, SlotError> {
        let Query(value) = Query::<T>::try_from_uri(uri).map_err(|rejection| invalid(rejection.body_text()))?;
        checked(value)
    }

    fn from_body(bytes: &[u8]) -> Result<Self, SlotError> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Err(SlotError::Decode("request body is empty".to_string()));
        }
        let value = serde_json::from_slice::<T>(bytes).map_err(|e| match e.classify() {
            serde_json::error::Category::Data => invalid(e.to_string()),
            _ => SlotError::Decode(e.to_string()),
        })?;
        checked(value)
    }
}

/// Values handed to a handler: one field per part plus the client address.
#[derive(Debug)]
pub struct Input<H = (), P = (), B = (), Q = ()> {
    pub header: H,
    pub path: P,
    pub body: B,
    pub query: Q,
    pub client: ClientAddr,
}

/// Declared request parts. Build with [`Takes::new`] and name each part:
/// `Takes::new().path::<ItemPath>().body::<NewItem>()`.
pub struct Takes<H = (), P = (), B = (), Q = ()> {
    _parts: PhantomData<fn() -> (H, P, B, Q)>,
}

impl<H, P, B, Q> Clone for Takes<H, P, B, Q> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<H, P, B, Q> Copy for Takes<H, P, B, Q> {}

impl<H, P, B, Q> fmt::Debug for Takes<H, P, B, Q> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Takes")
    }
}

impl Takes {
    pub fn new() -> Self {
        Takes { _parts: PhantomData }
    }
}

impl Default for Takes {
    fn default() -> Self {
        Self::new()
    }
}

impl<H, P, B, Q> Takes<H, P, B, Q> {
    pub fn header<T: Schema>(self) -> Takes<T, P, B, Q> {
        Takes { _parts: PhantomData }
    }

    pub fn path<T: Schema>(self) -> Takes<H, T, B, Q> {
        Takes { _parts: PhantomData }
    }

    pub fn body<T: Schema>(self) -> Takes<H, P, T, Q> {
        Takes { _parts: PhantomData }
    }

    pub fn query<T: Schema>(self) -> Takes<H, P, B, T> {
        Takes { _parts: PhantomData }
    }
}

impl<H: Slot, P: Slot, B: Slot, Q: Slot> Takes<H, P, B, Q> {
    /// Schema bound to each input part (`None` when the part is not declared).
    pub fn bindings(&self) -> [(Part, Option<&'static str>); 4] {
        [
            (Part::Header, H::schema()),
            (Part::Path, P::schema()),
            (Part::Body, B::schema()),
            (Part::Query, Q::schema()),
        ]
    }

    /// Load every declared part. Decode failures return at once; validation failures of all
    /// parts are collected under `<part>.<field>` keys.
    pub(crate) async fn extract(&self, req: Request) -> Result<Input<H, P, B, Q>, AppError> {
        let (mut parts, body) = req.into_parts();
        let client = ClientAddr::from_parts(&parts);
        let mut errors = ValidationErrors::new();

        let header = collect(Part::Header, H::from_headers(&parts.headers), &mut errors)?;
        let path = collect(Part::Path, P::from_path(&mut parts).await, &mut errors)?;
        let query = collect(Part::Query, Q::from_query(&parts.uri), &mut errors)?;
        let bytes = if B::DECLARED {
            axum::body::to_bytes(body, usize::MAX)
                .await
                .map_err(|e| AppError::Decode(format!("failed to read request body: {}", e)))?
        } else {
            Default::default()
        };
        let body = collect(Part::Body, B::from_body(&bytes), &mut errors)?;

        match (header, path, body, query) {
            (Some(header), Some(path), Some(body), Some(query)) if errors.is_empty() => Ok(Input {
                header,
                path,
                body,
                query,
                client,
            }),
            _ => Err(AppError::Validation(errors)),
        }
    }
}

fn collect<T>(part: Part, loaded: Result<T, SlotError>, errors: &mut ValidationErrors) -> Result<Option<T>, AppError> {
    match loaded {
        Ok(value) => Ok(Some(value)),
        Err(SlotError::Decode(reason)) => Err(AppError::Decode(reason)),
        Err(SlotError::Invalid(invalid)) => {
            errors.merge_prefixed(part.as_str(), invalid);
            Ok(None)
        }
    }
}
