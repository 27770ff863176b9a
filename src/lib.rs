//! Mosaic SDK: package-based HTTP services on axum and PostgreSQL.
//!
//! Packages bundle controllers, services and models. The [`LifecycleManager`] loads them,
//! materializes their tables, binds controller routes into one route table and starts their
//! services; [`Application`] serves the result.

pub mod app;
pub mod cli;
pub mod component;
pub mod config;
pub mod controller;
pub mod db;
pub mod error;
pub mod extractors;
pub mod manager;
pub mod model;
pub mod package;
pub mod pipeline;
pub mod registry;
pub mod response;
pub mod routes;
pub mod routing;
pub mod schema;
pub mod service;
pub mod state;
pub mod telemetry;

pub use app::{Application, ApplicationBuilder, Running};
pub use component::{Component, ComponentContext, PackageInfo, PackageLog};
pub use config::{AppConfig, BaseConfig, EnvSource, PackageConfig};
pub use controller::Controller;
pub use db::{CountBody, Database, DeletedBody, ListParams, Records};
pub use error::{AppError, BoxError, ConfigError, DeclarationError, StartupError};
pub use extractors::ClientAddr;
pub use manager::{LifecycleManager, LifecycleState};
pub use model::{ColumnDef, Model, ModelCatalog, ModelDef};
pub use package::{DynamicModule, Mount, Package, PackageBuilder, PackageModule};
pub use pipeline::{Input, Returns, Takes};
pub use registry::{HandlerId, HandlerRegistry};
pub use response::Page;
pub use routing::{format_path, Method};
pub use schema::{Schema, ValidationErrors};
pub use service::{Service, ServiceRegistry};
pub use state::AppState;

pub use async_trait::async_trait;
