//! Lifecycle manager: loads packages, registers models, binds controllers into the route table,
//! starts services and shuts everything down in reverse.

use crate::component::Bindings;
use crate::config::{AppConfig, EnvSource, Overrides};
use crate::db::Database;
use crate::error::{ConfigError, DeclarationError, StartupError};
use crate::model::ModelCatalog;
use crate::package::{Attachment, Mount, Package};
use crate::pipeline::RouteStage;
use crate::registry::HandlerRegistry;
use crate::routing::{format_path, RouteEntry, RouteTable};
use crate::service::{ServiceHandle, ServiceRegistry};
use serde::Serialize;
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LifecycleState {
    Idle,
    PackagesLoaded,
    ModelsRegistered,
    ControllersBound,
    ServicesStarted,
    Ready,
    ShuttingDown,
    Failed,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Idle => "idle",
            LifecycleState::PackagesLoaded => "packages-loaded",
            LifecycleState::ModelsRegistered => "models-registered",
            LifecycleState::ControllersBound => "controllers-bound",
            LifecycleState::ServicesStarted => "services-started",
            LifecycleState::Ready => "ready",
            LifecycleState::ShuttingDown => "shutting-down",
            LifecycleState::Failed => "failed",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state shared with the system routes.
pub type SharedState = Arc<RwLock<LifecycleState>>;

/// `err: cause: cause ...`
pub(crate) fn error_chain(err: &dyn Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}

pub struct LifecycleManager {
    config: Arc<AppConfig>,
    env: EnvSource,
    package_overrides: HashMap<String, Overrides>,
    state: SharedState,
    packages: Vec<Package>,
    handlers: Arc<HandlerRegistry>,
    services: Arc<ServiceRegistry>,
    catalog: Arc<ModelCatalog>,
    database: Option<Database>,
    routes: RouteTable,
    bindings: Bindings,
    started: Vec<ServiceHandle>,
    released: bool,
}

impl LifecycleManager {
    /// A manager over the process-wide handler and service registries.
    pub fn new(config: AppConfig, env: EnvSource) -> Self {
        Self {
            config: Arc::new(config),
            env,
            package_overrides: HashMap::new(),
            state: Arc::new(RwLock::new(LifecycleState::Idle)),
            packages: Vec::new(),
            handlers: HandlerRegistry::global(),
            services: ServiceRegistry::global(),
            catalog: Arc::new(ModelCatalog::new()),
            database: None,
            routes: RouteTable::new(),
            bindings: Bindings::default(),
            started: Vec::new(),
            released: false,
        }
    }

    pub fn with_handlers(mut self, handlers: Arc<HandlerRegistry>) -> Self {
        self.handlers = handlers;
        self
    }

    pub fn with_services(mut self, services: Arc<ServiceRegistry>) -> Self {
        self.services = services;
        self
    }

    pub fn with_package_overrides(mut self, overrides: HashMap<String, Overrides>) -> Self {
        self.package_overrides = overrides;
        self
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn shared_state(&self) -> SharedState {
        Arc::clone(&self.state)
    }

    fn set_state(&self, state: LifecycleState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = state;
        tracing::debug!(state = %state, "lifecycle");
    }

    fn expect_state(&self, expected: LifecycleState) -> Result<(), StartupError> {
        let actual = self.state();
        if actual == expected {
            Ok(())
        } else {
            Err(StartupError::State { actual, expected })
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn packages(&self) -> &[Package] {
        &self.packages
    }

    pub fn package(&self, name: &str) -> Option<&Package> {
        self.packages.iter().find(|p| p.name() == name)
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn catalog(&self) -> &Arc<ModelCatalog> {
        &self.catalog
    }

    pub fn services(&self) -> &Arc<ServiceRegistry> {
        &self.services
    }

    pub fn handlers(&self) -> &Arc<HandlerRegistry> {
        &self.handlers
    }

    pub fn database(&self) -> Option<&Database> {
        self.database.as_ref()
    }

    /// Validate and record each mounted package. Duplicate names are fatal.
    pub fn load(&mut self, mounts: Vec<Mount>) -> Result<(), StartupError> {
        self.expect_state(LifecycleState::Idle)?;
        for mount in mounts {
            let module_name = mount.module.module_name().to_string();
            let export = mount
                .module
                .export()
                .ok_or_else(|| DeclarationError::MissingExport(module_name.clone()))?;
            let mut package = *export
                .downcast::<Package>()
                .map_err(|_| DeclarationError::InvalidExport(module_name.clone()))?;

            if self.package(package.name()).is_some() {
                return Err(DeclarationError::DuplicatePackage(package.name().to_string()).into());
            }
            if package.path().is_none() {
                if let Some(path) = mount.path {
                    package.set_path(path)?;
                }
            }
            tracing::debug!(package = %package.name(), version = %package.version(), "package loaded");
            self.packages.push(package);
        }
        self.set_state(LifecycleState::PackagesLoaded);
        Ok(())
    }

    async fn connect(&mut self) -> Result<(), StartupError> {
        if self.database.is_some() {
            return Ok(());
        }
        if let Some(url) = &self.config.database_url {
            let database = Database::connect(url, self.config.db_max_connections).await?;
            tracing::info!(max_connections = self.config.db_max_connections, "database connected");
            self.database = Some(database);
        }
        Ok(())
    }

    /// Namespace and materialize the tables of every declared model. Declaring a model without a
    /// configured database is fatal.
    pub async fn register_models(&mut self) -> Result<(), StartupError> {
        self.expect_state(LifecycleState::PackagesLoaded)?;
        let has_models = self.packages.iter().any(Package::has_models);
        if has_models && self.config.database_url.is_none() {
            return Err(ConfigError::MissingDatabase.into());
        }
        self.connect().await?;

        if has_models {
            for package in &self.packages {
                package.register_models(&self.catalog)?;
            }
            if let Some(database) = &self.database {
                self.catalog.materialize(database).await?;
            }
        }
        self.set_state(LifecycleState::ModelsRegistered);
        Ok(())
    }

    /// Attach every package, then drain each controller's pending routes into the route table
    /// under `<api base>/<package path>/<route path>` and run its ready hook.
    pub async fn bind_controllers(&mut self) -> Result<(), StartupError> {
        self.expect_state(LifecycleState::ModelsRegistered)?;
        let no_overrides = Overrides::new();
        for package in &mut self.packages {
            let overrides = self.package_overrides.get(package.name()).unwrap_or(&no_overrides);
            package
                .register(Attachment {
                    app: Arc::clone(&self.config),
                    overrides,
                    env: &self.env,
                    services: Arc::clone(&self.services),
                    database: self.database.clone(),
                    models: Arc::clone(&self.catalog),
                })
                .await?;
        }

        for package in &self.packages {
            let package_path = package.path().unwrap_or_default();
            for controller in package.bound_controllers() {
                self.bindings
                    .bind(controller.controller_type(), controller.controller_name(), package.name())?;
                for (handler, entry) in controller.bind_routes(&self.handlers)? {
                    let Some(route) = entry.route() else {
                        return Err(DeclarationError::IncompleteHandler {
                            handler: entry.id().to_string(),
                            missing: "no route declared",
                        }
                        .into());
                    };
                    let path = format_path([self.config.api_base.as_str(), package_path, route.path.as_str()]);
                    let name = format!("{}.{}", package.name(), entry.id().name());
                    let endpoint = handler.endpoint(RouteStage::new(route.method, path.clone(), name.clone()));
                    tracing::debug!("{} [{}] => {}", path, route.method, name);
                    self.routes.insert(RouteEntry {
                        path,
                        method: route.method,
                        name,
                        package: package.name().to_string(),
                        description: entry.description().map(str::to_string),
                        schemas: entry.schemas().clone(),
                        endpoint,
                    })?;
                }
                controller
                    .component()
                    .on_ready()
                    .await
                    .map_err(|source| StartupError::Component {
                        component: controller.controller_name().to_string(),
                        source,
                    })?;
            }
        }
        self.set_state(LifecycleState::ControllersBound);
        Ok(())
    }

    /// Run the ready hook of every service once, however many packages declare it.
    pub async fn start_services(&mut self) -> Result<(), StartupError> {
        self.expect_state(LifecycleState::ControllersBound)?;
        for package in &self.packages {
            for handle in package.service_handles() {
                if !self.services.mark_started(handle.service_type) {
                    continue;
                }
                handle
                    .component
                    .on_ready()
                    .await
                    .map_err(|source| StartupError::Component {
                        component: handle.service_name.to_string(),
                        source,
                    })?;
                tracing::info!(service = handle.service_name, package = %package.name(), "service started");
                self.started.push(handle.clone());
            }
        }
        self.set_state(LifecycleState::ServicesStarted);
        Ok(())
    }

    /// Run every stage in order. On failure the state becomes `failed` and nothing is served.
    pub async fn start(&mut self, mounts: Vec<Mount>) -> Result<(), StartupError> {
        let result = self.run_stages(mounts).await;
        match &result {
            Ok(()) => {
                self.set_state(LifecycleState::Ready);
                tracing::info!(
                    packages = self.packages.len(),
                    routes = self.routes.len(),
                    services = self.started.len(),
                    "application ready"
                );
            }
            Err(err) => {
                self.set_state(LifecycleState::Failed);
                tracing::error!(error = %error_chain(err), "startup failed");
            }
        }
        result
    }

    async fn run_stages(&mut self, mounts: Vec<Mount>) -> Result<(), StartupError> {
        self.load(mounts)?;
        self.register_models().await?;
        self.bind_controllers().await?;
        self.start_services().await
    }

    /// Shut started services down in reverse start order, then release the database pool. Runs
    /// once; safe after a failed start.
    pub async fn shutdown(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if self.state() == LifecycleState::Ready {
            self.set_state(LifecycleState::ShuttingDown);
        }

        while let Some(handle) = self.started.pop() {
            if let Err(err) = handle.component.on_shutdown().await {
                tracing::warn!(service = handle.service_name, error = %error_chain(err.as_ref()), "service shutdown failed");
            }
        }
        if let Some(database) = self.database.take() {
            database.close().await;
            tracing::debug!("database pool closed");
        }
        tracing::info!("shutdown complete");
    }
}

impl fmt::Debug for LifecycleManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleManager")
            .field("state", &self.state())
            .field("packages", &self.packages)
            .field("routes", &self.routes.len())
            .finish()
    }
}
