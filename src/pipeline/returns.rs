//! Output stage: serialize the handler's value into a JSON response.

use crate::error::AppError;
use crate::response::json_bytes;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use std::fmt;
use std::marker::PhantomData;

pub const DEFAULT_INDENT: usize = 4;

/// Name of the output schema a dump mode binds, if any.
pub trait OutputSchema: Send + Sync + 'static {
    fn schema() -> Option<&'static str>;
}

/// Turns a handler's return value of type `T` into response bytes.
pub trait Dump<T>: OutputSchema {
    fn dump(value: T, indent: Option<usize>) -> Result<Vec<u8>, serde_json::Error>;
}

/// Serialize the return value as is.
pub struct Raw;

/// Convert the return value into `S` and serialize that.
pub struct Through<S>(PhantomData<fn() -> S>);

/// Convert every element of a `Vec` into `S` and serialize the list.
pub struct ThroughMany<S>(PhantomData<fn() -> S>);

/// No body.
pub struct Empty;

impl OutputSchema for Raw {
    fn schema() -> Option<&'static str> {
        None
    }
}

impl<S: 'static> OutputSchema for Through<S> {
    fn schema() -> Option<&'static str> {
        Some(std::any::type_name::<S>())
    }
}

impl<S: 'static> OutputSchema for ThroughMany<S> {
    fn schema() -> Option<&'static str> {
        Some(std::any::type_name::<S>())
    }
}

impl OutputSchema for Empty {
    fn schema() -> Option<&'static str> {
        None
    }
}

impl<T: Serialize> Dump<T> for Raw {
    fn dump(value: T, indent: Option<usize>) -> Result<Vec<u8>, serde_json::Error> {
        encode(&value, indent)
    }
}

impl<T, S> Dump<T> for Through<S>
where
    S: From<T> + Serialize + 'static,
{
    fn dump(value: T, indent: Option<usize>) -> Result<Vec<u8>, serde_json::Error> {
        encode(&S::from(value), indent)
    }
}

impl<T, S> Dump<Vec<T>> for ThroughMany<S>
where
    S: From<T> + Serialize + 'static,
{
    fn dump(value: Vec<T>, indent: Option<usize>) -> Result<Vec<u8>, serde_json::Error> {
        let items: Vec<S> = value.into_iter().map(S::from).collect();
        encode(&items, indent)
    }
}

impl Dump<()> for Empty {
    fn dump(_value: (), _indent: Option<usize>) -> Result<Vec<u8>, serde_json::Error> {
        Ok(Vec::new())
    }
}

/// JSON encode with `indent` spaces per level, or compact when `None`.
pub fn encode<S: Serialize + ?Sized>(value: &S, indent: Option<usize>) -> Result<Vec<u8>, serde_json::Error> {
    let Some(width) = indent else {
        return serde_json::to_vec(value);
    };
    let pad = vec![b' '; width];
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(&pad);
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut serializer)?;
    Ok(buf)
}

/// Output declaration: dump mode, status and indent.
pub struct Returns<D = Raw> {
    status: StatusCode,
    indent: Option<usize>,
    _dump: PhantomData<fn() -> D>,
}

impl<D> Clone for Returns<D> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<D> Copy for Returns<D> {}

impl<D> fmt::Debug for Returns<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Returns")
            .field("status", &self.status)
            .field("indent", &self.indent)
            .finish()
    }
}

impl Returns {
    pub fn new() -> Self {
        Returns {
            status: StatusCode::OK,
            indent: Some(DEFAULT_INDENT),
            _dump: PhantomData,
        }
    }

    pub fn schema<S: Serialize + 'static>() -> Returns<Through<S>> {
        Returns::new().with_dump()
    }

    pub fn many<S: Serialize + 'static>() -> Returns<ThroughMany<S>> {
        Returns::new().with_dump()
    }

    pub fn empty() -> Returns<Empty> {
        Returns::new().with_dump()
    }
}

impl Default for Returns {
    fn default() -> Self {
        Self::new()
    }
}

impl<D> Returns<D> {
    fn with_dump<D2>(self) -> Returns<D2> {
        Returns {
            status: self.status,
            indent: self.indent,
            _dump: PhantomData,
        }
    }

    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn indent(mut self, width: usize) -> Self {
        self.indent = Some(width);
        self
    }

    pub fn compact(mut self) -> Self {
        self.indent = None;
        self
    }

    pub fn status_code(&self) -> StatusCode {
        self.status
    }

    pub(crate) fn respond<T>(&self, value: T) -> Response
    where
        D: Dump<T>,
    {
        match D::dump(value, self.indent) {
            Ok(bytes) => json_bytes(self.status, bytes),
            Err(e) => AppError::Internal(format!("failed to serialize response: {}", e)).into_response(),
        }
    }
}
