//! Packages: named, versioned bundles of controllers, services and models.

pub mod identity;
pub mod module;

pub use module::{DynamicModule, Mount, PackageModule};

use crate::component::{ComponentContext, PackageInfo};
use crate::config::{resolve_package, AppConfig, BaseConfig, EnvSource, Overrides, PackageConfig};
use crate::controller::{BoundController, Controller, ControllerFactory, ControllerSpec};
use crate::db::Database;
use crate::error::{ConfigError, DeclarationError, StartupError};
use crate::model::{Model, ModelCatalog, ModelDef};
use crate::service::{Service, ServiceFactory, ServiceHandle, ServiceRegistry, ServiceSpec};
use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::sync::Arc;

pub const DEFAULT_VERSION: &str = "0.0.0";

struct LoadedConfig {
    value: Arc<dyn Any + Send + Sync>,
    path: Option<String>,
}

type ConfigLoader = fn(&str, &Overrides, &EnvSource) -> Result<LoadedConfig, ConfigError>;

fn load_config<T: PackageConfig>(name: &str, overrides: &Overrides, env: &EnvSource) -> Result<LoadedConfig, ConfigError> {
    let config: T = resolve_package(name, overrides, env)?;
    let path = config.path().map(str::to_string);
    Ok(LoadedConfig {
        value: Arc::new(config),
        path,
    })
}

#[derive(Clone, Copy)]
struct ModelSpec {
    type_id: TypeId,
    type_name: &'static str,
    definition: fn() -> ModelDef,
}

/// What the manager hands a package when attaching it.
pub(crate) struct Attachment<'a> {
    pub(crate) app: Arc<AppConfig>,
    pub(crate) overrides: &'a Overrides,
    pub(crate) env: &'a EnvSource,
    pub(crate) services: Arc<ServiceRegistry>,
    pub(crate) database: Option<Database>,
    pub(crate) models: Arc<ModelCatalog>,
}

struct Attached {
    ctx: ComponentContext,
    services: Vec<ServiceHandle>,
    controllers: Vec<Box<dyn BoundController>>,
}

pub struct Package {
    name: String,
    version: String,
    description: String,
    path: Option<String>,
    controllers: Vec<Arc<dyn ControllerFactory>>,
    services: Vec<Arc<dyn ServiceFactory>>,
    models: Vec<ModelSpec>,
    config_loader: ConfigLoader,
    attached: Option<Attached>,
}

impl Package {
    pub fn builder(name: impl Into<String>) -> PackageBuilder {
        PackageBuilder {
            name: name.into(),
            version: DEFAULT_VERSION.to_string(),
            description: String::new(),
            path: None,
            controllers: Vec::new(),
            services: Vec::new(),
            models: Vec::new(),
            config_loader: load_config::<BaseConfig>,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub fn has_controllers(&self) -> bool {
        !self.controllers.is_empty()
    }

    pub fn has_models(&self) -> bool {
        !self.models.is_empty()
    }

    pub fn is_attached(&self) -> bool {
        self.attached.is_some()
    }

    pub fn info(&self) -> PackageInfo {
        PackageInfo {
            name: self.name.clone(),
            version: self.version.clone(),
            description: self.description.clone(),
            path: self.path.clone(),
        }
    }

    /// Only validated when the package has controllers; the path of a controller-less package
    /// is never used.
    pub fn set_path(&mut self, path: impl Into<String>) -> Result<(), DeclarationError> {
        let path = path.into();
        if self.has_controllers() {
            identity::validate_path(&self.name, &path)?;
        }
        self.path = Some(path);
        Ok(())
    }

    /// Register the declared models with `catalog` under this package's namespace.
    pub(crate) fn register_models(&self, catalog: &ModelCatalog) -> Result<(), DeclarationError> {
        for spec in &self.models {
            let model = catalog.register(&self.name, spec.type_id, spec.type_name, (spec.definition)())?;
            tracing::debug!(package = %self.name, table = %model.table, "model registered");
        }
        Ok(())
    }

    /// Attach the package: resolve its config, settle its path, then construct its services and
    /// controllers. Happens once per package.
    pub(crate) async fn register(&mut self, attachment: Attachment<'_>) -> Result<(), StartupError> {
        if self.is_attached() {
            return Err(DeclarationError::AlreadyRegistered(self.name.clone()).into());
        }
        let config = (self.config_loader)(&self.name, attachment.overrides, attachment.env)?;
        if self.has_controllers() && self.path.is_none() {
            let path = config.path.clone().unwrap_or_else(|| format!("/{}", self.name));
            self.set_path(path)?;
        }

        let ctx = ComponentContext::new(
            self.info(),
            config.value,
            attachment.app,
            attachment.services,
            attachment.database,
            attachment.models,
        );
        ctx.log().info(format_args!("Attaching {}/{}", self.name, self.version));

        let mut services = Vec::with_capacity(self.services.len());
        for factory in &self.services {
            let handle = factory
                .instantiate(&ctx)
                .await
                .map_err(|source| StartupError::Component {
                    component: factory.service_name().to_string(),
                    source,
                })?;
            services.push(handle);
        }

        let mut controllers = Vec::with_capacity(self.controllers.len());
        for factory in &self.controllers {
            let controller = factory.instantiate(&ctx).map_err(|source| StartupError::Component {
                component: factory.controller_name().to_string(),
                source,
            })?;
            controllers.push(controller);
        }

        self.attached = Some(Attached {
            ctx,
            services,
            controllers,
        });
        Ok(())
    }

    pub fn context(&self) -> Option<&ComponentContext> {
        self.attached.as_ref().map(|a| &a.ctx)
    }

    pub(crate) fn bound_controllers(&self) -> &[Box<dyn BoundController>] {
        self.attached
            .as_ref()
            .map(|a| a.controllers.as_slice())
            .unwrap_or_default()
    }

    pub(crate) fn service_handles(&self) -> &[ServiceHandle] {
        self.attached
            .as_ref()
            .map(|a| a.services.as_slice())
            .unwrap_or_default()
    }
}

impl fmt::Debug for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Package")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("path", &self.path)
            .field("controllers", &self.controllers.len())
            .field("services", &self.services.len())
            .field("models", &self.models.len())
            .field("attached", &self.is_attached())
            .finish()
    }
}

pub struct PackageBuilder {
    name: String,
    version: String,
    description: String,
    path: Option<String>,
    controllers: Vec<Arc<dyn ControllerFactory>>,
    services: Vec<Arc<dyn ServiceFactory>>,
    models: Vec<ModelSpec>,
    config_loader: ConfigLoader,
}

impl PackageBuilder {
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn controller<C: Controller>(mut self) -> Self {
        if !self.controllers.iter().any(|c| c.controller_type() == TypeId::of::<C>()) {
            self.controllers.push(Arc::new(ControllerSpec::<C>::new()));
        }
        self
    }

    pub fn service<S: Service>(mut self) -> Self {
        if !self.services.iter().any(|s| s.service_type() == TypeId::of::<S>()) {
            self.services.push(Arc::new(ServiceSpec::<S>::new()));
        }
        self
    }

    pub fn model<M: Model>(mut self) -> Self {
        if !self.models.iter().any(|m| m.type_id == TypeId::of::<M>()) {
            self.models.push(ModelSpec {
                type_id: TypeId::of::<M>(),
                type_name: type_name::<M>(),
                definition: M::definition,
            });
        }
        self
    }

    /// Settings type of the package. Defaults to [`BaseConfig`].
    pub fn config<T: PackageConfig>(mut self) -> Self {
        self.config_loader = load_config::<T>;
        self
    }

    pub fn build(self) -> Result<Package, DeclarationError> {
        identity::validate_name(&self.name)?;
        identity::validate_version(&self.name, &self.version)?;
        if !self.controllers.is_empty() {
            if let Some(path) = &self.path {
                identity::validate_path(&self.name, path)?;
            }
        }
        Ok(Package {
            name: self.name,
            version: self.version,
            description: self.description,
            path: self.path,
            controllers: self.controllers,
            services: self.services,
            models: self.models,
            config_loader: self.config_loader,
            attached: None,
        })
    }
}
