//! Shared contract of controllers and services: lifecycle hooks and the package binding.

use crate::config::{AppConfig, BaseConfig};
use crate::db::{Database, Records};
use crate::error::{AppError, BoxError, DeclarationError};
use crate::model::{Model, ModelCatalog};
use crate::service::{Service, ServiceRegistry};
use async_trait::async_trait;
use serde::Serialize;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Lifecycle hooks. Both default to doing nothing.
#[async_trait]
pub trait Component: Send + Sync + 'static {
    async fn on_ready(&self) -> Result<(), BoxError> {
        Ok(())
    }

    async fn on_shutdown(&self) -> Result<(), BoxError> {
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct PackageInfo {
    pub name: String,
    pub version: String,
    pub description: String,
    pub path: Option<String>,
}

/// Log channel of one package, `mosaic.pkg.<name>`.
#[derive(Clone, Debug)]
pub struct PackageLog {
    channel: Arc<str>,
}

impl PackageLog {
    pub const NAMESPACE: &'static str = "mosaic.pkg";

    pub fn new(package: &str) -> Self {
        Self {
            channel: format!("{}.{}", Self::NAMESPACE, package).into(),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn debug(&self, message: impl fmt::Display) {
        tracing::debug!(target: "mosaic::pkg", channel = %self.channel, "{}", message);
    }

    pub fn info(&self, message: impl fmt::Display) {
        tracing::info!(target: "mosaic::pkg", channel = %self.channel, "{}", message);
    }

    pub fn warn(&self, message: impl fmt::Display) {
        tracing::warn!(target: "mosaic::pkg", channel = %self.channel, "{}", message);
    }

    pub fn error(&self, message: impl fmt::Display) {
        tracing::error!(target: "mosaic::pkg", channel = %self.channel, "{}", message);
    }
}

/// What a component sees of its package and of the application once bound.
#[derive(Clone)]
pub struct ComponentContext {
    package: Arc<PackageInfo>,
    log: PackageLog,
    config: Arc<dyn Any + Send + Sync>,
    app: Arc<AppConfig>,
    services: Arc<ServiceRegistry>,
    database: Option<Database>,
    models: Arc<ModelCatalog>,
}

impl ComponentContext {
    pub(crate) fn new(
        package: PackageInfo,
        config: Arc<dyn Any + Send + Sync>,
        app: Arc<AppConfig>,
        services: Arc<ServiceRegistry>,
        database: Option<Database>,
        models: Arc<ModelCatalog>,
    ) -> Self {
        let log = PackageLog::new(&package.name);
        Self {
            package: Arc::new(package),
            log,
            config,
            app,
            services,
            database,
            models,
        }
    }

    /// A context outside any application: default configs, a private service registry, no
    /// database. For exercising components on their own.
    pub fn standalone(package: &str) -> Self {
        Self::new(
            PackageInfo {
                name: package.to_string(),
                version: "0.0.0".to_string(),
                description: String::new(),
                path: None,
            },
            Arc::new(BaseConfig::default()),
            Arc::new(AppConfig::default()),
            Arc::new(ServiceRegistry::new()),
            None,
            Arc::new(ModelCatalog::default()),
        )
    }

    /// Replace the package config.
    pub fn with_config<T: Send + Sync + 'static>(mut self, config: T) -> Self {
        self.config = Arc::new(config);
        self
    }

    pub fn pkg(&self) -> &PackageInfo {
        &self.package
    }

    pub fn log(&self) -> &PackageLog {
        &self.log
    }

    /// The package config, if it is of type `T`.
    pub fn config<T: Any>(&self) -> Option<&T> {
        self.config.downcast_ref::<T>()
    }

    pub fn app_config(&self) -> &AppConfig {
        &self.app
    }

    pub fn database(&self) -> Option<&Database> {
        self.database.as_ref()
    }

    /// An already constructed service.
    pub fn service<S: Service>(&self) -> Result<Arc<S>, DeclarationError> {
        self.services
            .get::<S>()
            .ok_or_else(|| DeclarationError::ServiceUnavailable(std::any::type_name::<S>().to_string()))
    }

    pub(crate) fn services(&self) -> &Arc<ServiceRegistry> {
        &self.services
    }

    /// Data access for a registered model.
    pub fn records<M: Model>(&self) -> Result<Records, AppError> {
        let database = self
            .database
            .clone()
            .ok_or_else(|| AppError::Internal("no database configured".to_string()))?;
        let model = self.models.lookup::<M>().ok_or_else(|| {
            AppError::Internal(format!("model {} is not registered", std::any::type_name::<M>()))
        })?;
        Ok(Records::new(database, model))
    }
}

impl fmt::Debug for ComponentContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentContext")
            .field("package", &self.package.name)
            .field("log", &self.log.channel())
            .field("database", &self.database.is_some())
            .finish()
    }
}

/// Which package each bound component type belongs to.
#[derive(Debug, Default)]
pub struct Bindings {
    owners: HashMap<TypeId, String>,
}

impl Bindings {
    /// Bind `component` to `package`. Binding again to the same package is a no-op; binding to
    /// another package fails.
    pub fn bind(&mut self, component: TypeId, component_name: &str, package: &str) -> Result<(), DeclarationError> {
        match self.owners.get(&component) {
            Some(bound) if bound == package => Ok(()),
            Some(bound) => Err(DeclarationError::ComponentRebound {
                component: component_name.to_string(),
                bound: bound.clone(),
                requested: package.to_string(),
            }),
            None => {
                self.owners.insert(component, package.to_string());
                Ok(())
            }
        }
    }

    pub fn owner(&self, component: TypeId) -> Option<&str> {
        self.owners.get(&component).map(String::as_str)
    }
}
