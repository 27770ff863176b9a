//! Request pipeline wrapping each handler.
//!
//! The stages always nest the same way: the route stage admits the request, the input stage
//! ([`takes`]) loads the declared parts, the handler runs, and the output stage ([`returns`])
//! serializes what it returned. Any per-request error short-circuits into its response.

pub mod returns;
pub mod takes;

use crate::error::AppError;
use crate::routing::Method;
use async_trait::async_trait;
use axum::extract::Request;
use axum::response::{IntoResponse, Response};
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

pub use returns::{Dump, Empty, OutputSchema, Raw, Returns, Through, ThroughMany};
pub use takes::{Input, Slot, SlotError, Takes};

/// A bound, callable route handler.
#[async_trait]
pub trait Endpoint: Send + Sync + 'static {
    async fn call(&self, req: Request) -> Response;
}

/// Outermost stage: the method and full path a handler is bound to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteStage {
    method: Method,
    path: String,
    name: String,
}

impl RouteStage {
    pub fn new(method: Method, path: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            name: name.into(),
        }
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn admit(&self, req: &Request) -> Result<(), AppError> {
        if Method::from_http(req.method()) != Some(self.method) {
            return Err(AppError::http(
                axum::http::StatusCode::METHOD_NOT_ALLOWED,
                "Method not allowed",
            ));
        }
        Ok(())
    }
}

/// A handler composed with its three stages.
pub(crate) struct Pipeline<C, H, P, B, Q, D, F, T> {
    controller: Arc<C>,
    route: RouteStage,
    takes: Takes<H, P, B, Q>,
    returns: Returns<D>,
    handler: F,
    _output: PhantomData<fn() -> T>,
}

impl<C, H, P, B, Q, D, F, T> Pipeline<C, H, P, B, Q, D, F, T> {
    pub(crate) fn new(
        controller: Arc<C>,
        route: RouteStage,
        takes: Takes<H, P, B, Q>,
        returns: Returns<D>,
        handler: F,
    ) -> Self {
        Self {
            controller,
            route,
            takes,
            returns,
            handler,
            _output: PhantomData,
        }
    }
}

#[async_trait]
impl<C, H, P, B, Q, D, F, Fut, T> Endpoint for Pipeline<C, H, P, B, Q, D, F, T>
where
    C: Send + Sync + 'static,
    H: Slot,
    P: Slot,
    B: Slot,
    Q: Slot,
    D: Dump<T>,
    F: Fn(Arc<C>, Input<H, P, B, Q>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, AppError>> + Send + 'static,
    T: Send + 'static,
{
    async fn call(&self, req: Request) -> Response {
        if let Err(e) = self.route.admit(&req) {
            return e.into_response();
        }
        let input = match self.takes.extract(req).await {
            Ok(input) => input,
            Err(e) => {
                tracing::debug!(route = %self.route.name, error = %e, "request rejected");
                return e.into_response();
            }
        };
        match (self.handler)(Arc::clone(&self.controller), input).await {
            Ok(value) => self.returns.respond(value),
            Err(e) => {
                tracing::debug!(route = %self.route.name, error = %e, "handler failed");
                e.into_response()
            }
        }
    }
}
