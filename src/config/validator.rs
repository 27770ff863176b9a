//! Application settings validation.

use crate::config::AppConfig;
use crate::error::ConfigError;
use crate::schema::ValidationErrors;

const API_BASE_PATTERN: &str = r"^(/[a-zA-Z0-9_.~-]+)+$";

pub fn validate_app(config: &AppConfig) -> Result<(), ConfigError> {
    let mut errors = ValidationErrors::new();
    errors
        .field("workers")
        .check(config.workers >= 1, "must be at least 1");
    errors
        .field("db_max_connections")
        .minimum(config.db_max_connections, 1.0);
    errors
        .field("body_limit")
        .check(config.body_limit > 0, "must be greater than 0");
    errors
        .field("listen_host")
        .min_length(&config.listen_host, 1);
    if !config.api_base.is_empty() {
        errors
            .field("api_base")
            .pattern(&config.api_base, API_BASE_PATTERN);
    }
    if let Some(url) = &config.database_url {
        errors.field("database_url").min_length(url, 1);
    }

    errors.into_result().map_err(|errors| ConfigError::Validation {
        section: "app".to_string(),
        errors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        validate_app(&AppConfig::default()).unwrap();
    }

    #[test]
    fn empty_api_base_is_valid() {
        let config = AppConfig {
            api_base: String::new(),
            ..AppConfig::default()
        };
        validate_app(&config).unwrap();
    }

    #[test]
    fn every_failing_field_is_reported() {
        let config = AppConfig {
            workers: 0,
            db_max_connections: 0,
            api_base: "api//v1".to_string(),
            ..AppConfig::default()
        };
        let err = validate_app(&config).unwrap_err();
        let errors = match err {
            ConfigError::Validation { errors, .. } => errors,
            other => panic!("expected validation error, got {other:?}"),
        };
        assert!(errors.get("workers").is_some());
        assert!(errors.get("db_max_connections").is_some());
        assert!(errors.get("api_base").is_some());
        assert!(errors.get("body_limit").is_none());
    }
}
