//! Configuration validation.

use super::Config;
use crate::error::{ReplayError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Target validation
    if config.target.host.is_empty() {
        return Err(ReplayError::Config("target.host is required".into()));
    }
    if config.target.database.is_empty() {
        return Err(ReplayError::Config("target.database is required".into()));
    }
    if config.target.user.is_empty() {
        return Err(ReplayError::Config("target.user is required".into()));
    }
    if config.target.r#type != "postgres" {
        return Err(ReplayError::Config(format!(
            "target.type must be 'postgres', got '{}'",
            config.target.r#type
        )));
    }
    if config.target.port == 0 {
        return Err(ReplayError::Config("target.port must be non-zero".into()));
    }
    if config.target.max_connections == 0 {
        return Err(ReplayError::Config(
            "target.max_connections must be at least 1".into(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AdapterConfig, DispatchConfig, TargetConfig};

    fn valid_config() -> Config {
        Config {
            target: TargetConfig {
                r#type: "postgres".to_string(),
                host: "localhost".to_string(),
                port: 5432,
                database: "replica".to_string(),
                user: "postgres".to_string(),
                password: "password".to_string(),
                max_connections: 4,
            },
            adapter: AdapterConfig::default(),
            dispatch: DispatchConfig::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(validate(&valid_config()).is_ok());
    }

    #[test]
    fn test_missing_target_host() {
        let mut config = valid_config();
        config.target.host = String::new();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("target.host"));
    }

    #[test]
    fn test_missing_user_and_database() {
        let mut config = valid_config();
        config.target.user = String::new();
        assert!(validate(&config).is_err());

        let mut config = valid_config();
        config.target.database = String::new();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_wrong_target_type() {
        let mut config = valid_config();
        config.target.r#type = "mysql".to_string();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("must be 'postgres'"));
    }

    #[test]
    fn test_zero_pool_size() {
        let mut config = valid_config();
        config.target.max_connections = 0;
        assert!(matches!(validate(&config), Err(ReplayError::Config(_))));
    }
}
