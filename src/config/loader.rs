//! Layered settings resolution: supplied overrides first, environment variables on top.

use crate::config::{validate_app, AppConfig, PackageConfig};
use crate::error::ConfigError;
use ::config::{Config, Environment, Map, Value, ValueKind};
use serde::de::DeserializeOwned;
use std::collections::HashMap;

/// Environment prefix of the application settings (`MOSAIC_LISTEN_PORT`, ...).
pub const ENV_PREFIX: &str = "MOSAIC";

/// Fallback for `database_url` when it is still unset after layering.
pub const DATABASE_URL_VAR: &str = "DATABASE_URL";

/// Key/value overrides supplied in code.
pub type Overrides = serde_json::Map<String, serde_json::Value>;

/// Where environment variables are read from.
#[derive(Clone, Debug, Default)]
pub enum EnvSource {
    #[default]
    Process,
    /// A fixed set of variables; the process environment is never consulted.
    Fixed(HashMap<String, String>),
}

impl EnvSource {
    pub fn fixed<K, V>(vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        EnvSource::Fixed(vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    pub fn var(&self, name: &str) -> Option<String> {
        match self {
            EnvSource::Process => std::env::var(name).ok(),
            EnvSource::Fixed(vars) => vars.get(name).cloned(),
        }
    }

    fn environment(&self, prefix: &str) -> Environment {
        let env = Environment::with_prefix(prefix).try_parsing(true);
        match self {
            EnvSource::Process => env,
            EnvSource::Fixed(vars) => env.source(Some(vars.iter().map(|(k, v)| (k.clone(), v.clone())).collect())),
        }
    }
}

/// Resolve and validate the application settings.
pub fn resolve_app(overrides: &Overrides, env: &EnvSource) -> Result<AppConfig, ConfigError> {
    let mut overrides = overrides.clone();
    if !overrides.contains_key("api_base") {
        if let Some(path) = overrides.remove("path") {
            overrides.insert("api_base".to_string(), path);
        }
    }

    let mut config: AppConfig = layered("app", &overrides, env, ENV_PREFIX)?;
    if config.database_url.is_none() {
        config.database_url = env.var(DATABASE_URL_VAR).filter(|url| !url.is_empty());
    }
    validate_app(&config)?;
    tracing::debug!(
        listen = %config.listen_addr(),
        api_base = %config.api_base,
        database = config.database_url.is_some(),
        "resolved app config"
    );
    Ok(config)
}

/// Environment prefix of a package's settings: its name upper-cased.
pub fn package_env_prefix(package: &str) -> String {
    package.to_uppercase()
}

/// Resolve and validate the settings of package `package`.
pub fn resolve_package<T: PackageConfig>(package: &str, overrides: &Overrides, env: &EnvSource) -> Result<T, ConfigError> {
    let section = format!("package {}", package);
    let config: T = layered(&section, overrides, env, &package_env_prefix(package))?;
    config
        .validate()
        .map_err(|errors| ConfigError::Validation { section, errors })?;
    Ok(config)
}

fn layered<T: DeserializeOwned>(section: &str, overrides: &Overrides, env: &EnvSource, prefix: &str) -> Result<T, ConfigError> {
    let load = |source| ConfigError::Load {
        section: section.to_string(),
        source,
    };

    let mut builder = Config::builder();
    for (key, value) in overrides {
        builder = builder.set_default(key.as_str(), to_config_value(value)).map_err(load)?;
    }
    builder
        .add_source(env.environment(prefix))
        .build()
        .and_then(|config| config.try_deserialize())
        .map_err(load)
}

fn to_config_value(value: &serde_json::Value) -> Value {
    let kind = match value {
        serde_json::Value::Null => ValueKind::Nil,
        serde_json::Value::Bool(b) => ValueKind::Boolean(*b),
        serde_json::Value::Number(n) => match (n.as_i64(), n.as_u64()) {
            (Some(i), _) => ValueKind::I64(i),
            (None, Some(u)) => ValueKind::U64(u),
            _ => ValueKind::Float(n.as_f64().unwrap_or_default()),
        },
        serde_json::Value::String(s) => ValueKind::String(s.clone()),
        serde_json::Value::Array(items) => ValueKind::Array(items.iter().map(to_config_value).collect()),
        serde_json::Value::Object(fields) => ValueKind::Table(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), to_config_value(v)))
                .collect::<Map<String, Value>>(),
        ),
    };
    Value::new(None, kind)
}
