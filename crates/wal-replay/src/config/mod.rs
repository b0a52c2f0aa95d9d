//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::error::Result;
use sha2::{Digest, Sha256};
use std::path::Path;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// SHA256 of the serialized configuration, logged at startup so runs can
    /// be matched to the settings they used.
    pub fn hash(&self) -> String {
        let yaml = serde_yaml::to_string(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(yaml.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

impl TargetConfig {
    /// Connection summary without the password, for logs.
    pub fn display_name(&self) -> String {
        format!("{}@{}:{}/{}", self.user, self.host, self.port, self.database)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::CopyFormat;
    use crate::dispatch::OnConflict;
    use std::io::Write;

    const MINIMAL: &str = r#"
target:
  host: localhost
  database: replica
  user: postgres
"#;

    #[test]
    fn test_defaults() {
        let config = Config::from_yaml(MINIMAL).unwrap();
        assert_eq!(config.target.port, 5432);
        assert_eq!(config.target.r#type, "postgres");
        assert_eq!(config.target.max_connections, 4);
        assert_eq!(config.adapter, AdapterConfig::default());
        assert_eq!(config.dispatch.bulk_threshold, 500);
        assert_eq!(config.dispatch.bulk_format, CopyFormat::Text);
        assert_eq!(config.dispatch.on_conflict, OnConflict::None);
    }

    #[test]
    fn test_full_document() {
        let yaml = r#"
target:
  host: db
  port: 6432
  database: replica
  user: writer
  password: secret
  max_connections: 8
adapter:
  strict_tables: true
  strict_types: true
dispatch:
  bulk_threshold: 0
  bulk_format: binary
  on_conflict: update
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert!(config.adapter.strict_tables);
        assert!(!config.adapter.strict_columns);
        assert_eq!(config.dispatch.bulk_format, CopyFormat::Binary);
        assert_eq!(config.dispatch.on_conflict, OnConflict::Update);
        assert_eq!(config.target.display_name(), "writer@db:6432/replica");
    }

    #[test]
    fn test_invalid_yaml_value() {
        let yaml = format!("{}dispatch:\n  bulk_format: csv\n", MINIMAL);
        assert!(Config::from_yaml(&yaml).is_err());
    }

    #[test]
    fn test_load_and_hash() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();

        let a = Config::load(file.path()).unwrap();
        let b = Config::from_yaml(MINIMAL).unwrap();
        assert_eq!(a.hash(), b.hash());
        assert_eq!(a.hash().len(), 64);

        let mut c = b.clone();
        c.adapter.strict_types = true;
        assert_ne!(c.hash(), b.hash());
    }
}
