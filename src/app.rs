//! Host application: resolves configuration, runs the lifecycle and serves the composed router.

use crate::config::{resolve_app, validate_app, AppConfig, EnvSource, Overrides};
use crate::error::{AppError, ConfigError, StartupError};
use crate::manager::LifecycleManager;
use crate::package::{Mount, Package};
use crate::registry::HandlerRegistry;
use crate::routes::system_routes;
use crate::routing::{openapi, RouteTable};
use crate::service::ServiceRegistry;
use crate::state::AppState;
use axum::Router;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::limit::RequestBodyLimitLayer;

/// Collects packages and settings for an [`Application`].
///
/// ```ignore
/// let app = Application::builder()
///     .package("/catalog", catalog::package()?)
///     .setting("listen_port", 8080)
///     .build()?;
/// let running = app.start().await?;
/// running.serve().await?;
/// ```
pub struct ApplicationBuilder {
    mounts: Vec<Mount>,
    settings: Overrides,
    package_settings: HashMap<String, Overrides>,
    env: EnvSource,
    handlers: Option<Arc<HandlerRegistry>>,
    services: Option<Arc<ServiceRegistry>>,
    title: String,
    version: String,
}

impl Default for ApplicationBuilder {
    fn default() -> Self {
        Self {
            mounts: Vec::new(),
            settings: Overrides::new(),
            package_settings: HashMap::new(),
            env: EnvSource::Process,
            handlers: None,
            services: None,
            title: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ApplicationBuilder {
    /// Mount `package` at `path`, unless the package sets its own path.
    pub fn package(self, path: impl Into<String>, package: Package) -> Self {
        self.mount(Mount::new(path, package))
    }

    pub fn mount(mut self, mount: Mount) -> Self {
        self.mounts.push(mount);
        self
    }

    /// Application setting. Environment variables `MOSAIC_<KEY>` take precedence.
    pub fn setting(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.settings.insert(key.to_string(), value.into());
        self
    }

    /// Setting for one package. Environment variables `<PACKAGE>_<KEY>` take precedence.
    pub fn package_setting(mut self, package: &str, key: &str, value: impl Into<Value>) -> Self {
        self.package_settings
            .entry(package.to_string())
            .or_default()
            .insert(key.to_string(), value.into());
        self
    }

    pub fn env(mut self, env: EnvSource) -> Self {
        self.env = env;
        self
    }

    /// Use a private handler registry instead of the process-wide one.
    pub fn handlers(mut self, handlers: Arc<HandlerRegistry>) -> Self {
        self.handlers = Some(handlers);
        self
    }

    /// Use a private service registry instead of the process-wide one.
    pub fn services(mut self, services: Arc<ServiceRegistry>) -> Self {
        self.services = Some(services);
        self
    }

    /// Title and version of the OpenAPI document.
    pub fn info(mut self, title: impl Into<String>, version: impl Into<String>) -> Self {
        self.title = title.into();
        self.version = version.into();
        self
    }

    pub fn build(self) -> Result<Application, ConfigError> {
        let config = resolve_app(&self.settings, &self.env)?;
        Ok(Application {
            config,
            mounts: self.mounts,
            package_settings: self.package_settings,
            env: self.env,
            handlers: self.handlers,
            services: self.services,
            title: self.title,
            version: self.version,
        })
    }
}

/// Configured, not yet started.
pub struct Application {
    config: AppConfig,
    mounts: Vec<Mount>,
    package_settings: HashMap<String, Overrides>,
    env: EnvSource,
    handlers: Option<Arc<HandlerRegistry>>,
    services: Option<Arc<ServiceRegistry>>,
    title: String,
    version: String,
}

impl Application {
    pub fn builder() -> ApplicationBuilder {
        ApplicationBuilder::default()
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Replace the resolved configuration, e.g. with command-line overrides.
    pub fn with_config(mut self, config: AppConfig) -> Result<Self, ConfigError> {
        validate_app(&config)?;
        self.config = config;
        Ok(self)
    }

    /// Run every lifecycle stage. A failed start is shut down before the error is returned.
    pub async fn start(self) -> Result<Running, StartupError> {
        let mut manager =
            LifecycleManager::new(self.config, self.env).with_package_overrides(self.package_settings);
        if let Some(handlers) = self.handlers {
            manager = manager.with_handlers(handlers);
        }
        if let Some(services) = self.services {
            manager = manager.with_services(services);
        }

        if let Err(err) = manager.start(self.mounts).await {
            manager.shutdown().await;
            return Err(err);
        }
        Ok(Running {
            manager,
            title: self.title,
            version: self.version,
        })
    }
}

/// A started application.
pub struct Running {
    manager: LifecycleManager,
    title: String,
    version: String,
}

impl Running {
    pub fn manager(&self) -> &LifecycleManager {
        &self.manager
    }

    pub fn routes(&self) -> &RouteTable {
        self.manager.routes()
    }

    /// Package routes plus the system routes, a JSON 404 fallback and the request body limit.
    pub fn router(&self) -> Router {
        let config = self.manager.config();
        let routes = self.manager.routes();
        let packages: BTreeMap<String, String> = self
            .manager
            .packages()
            .iter()
            .map(|p| (p.name().to_string(), p.version().to_string()))
            .collect();
        let state = AppState {
            lifecycle: self.manager.shared_state(),
            database: self.manager.database().cloned(),
            openapi: Arc::new(openapi::document(routes, &self.title, &self.version)),
            packages: Arc::new(packages),
        };

        routes
            .router()
            .merge(system_routes(state, &config.api_base, routes))
            .fallback(not_found)
            .layer(RequestBodyLimitLayer::new(config.body_limit))
    }

    /// Serve on `listen_host:listen_port` until Ctrl-C, then shut the lifecycle down.
    pub async fn serve(mut self) -> Result<(), StartupError> {
        let listener = TcpListener::bind(self.manager.config().listen_addr()).await?;
        tracing::info!("listening on http://{}", listener.local_addr()?);
        let router = self.router();
        let served = axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(shutdown_signal())
            .await;
        self.manager.shutdown().await;
        served.map_err(StartupError::from)
    }

    pub async fn shutdown(&mut self) {
        self.manager.shutdown().await;
    }
}

async fn not_found() -> AppError {
    AppError::not_found("Not found")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "ctrl-c handler unavailable");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
