use crate::error::TetherError;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs::{read_to_string, write},
    path::PathBuf,
};

/// Behavioral switches for a [crate::graph::RelationshipGraph].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Reject values whose type does not match a non-polymorphic field instead of registering the
    /// type as polymorphic and carrying on.
    pub strict_polymorphism: bool,
    /// Fallback for fields whose schema leaves `reset_on_remote_update` unset. When true, a remote
    /// update overwrites a diverged local value (legacy behavior) and logs a warning.
    pub reset_on_remote_update: bool,
    /// Emit a `tracing::debug!` line for every dispatched operation.
    pub trace_operations: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        GraphConfig {
            strict_polymorphism: cfg!(debug_assertions),
            reset_on_remote_update: false,
            trace_operations: false,
        }
    }
}

pub trait ConfigProvider: Send + Sync {
    fn get_graph_config(&self) -> Result<GraphConfig, TetherError>;
    fn set_graph_config(&self, config: &GraphConfig) -> Result<(), TetherError>;
}

/// Reads and writes the `[graph]` table of a TOML file.
#[derive(Debug, Serialize, Deserialize)]
pub struct TomlConfigProvider {
    path: PathBuf,
}

impl TomlConfigProvider {
    pub fn new(path: PathBuf) -> Self {
        TomlConfigProvider { path }
    }
}

impl ConfigProvider for TomlConfigProvider {
    fn get_graph_config(&self) -> Result<GraphConfig, TetherError> {
        tracing::debug!("Attempting to read graph config from: {:?}", &self.path);
        if !self.path.exists() {
            tracing::debug!("Config file not found, using default graph config.");
            return Ok(GraphConfig::default());
        }
        let content = read_to_string(&self.path)?;
        let mut config: BTreeMap<String, GraphConfig> = toml::from_str(&content)?;
        Ok(config.remove("graph").unwrap_or_default())
    }

    fn set_graph_config(&self, graph_config: &GraphConfig) -> Result<(), TetherError> {
        tracing::debug!("Attempting to write graph config to: {:?}", &self.path);
        let mut config = BTreeMap::new();
        config.insert("graph".to_string(), graph_config.clone());
        let toml_string = toml::to_string(&config)?;
        write(&self.path, toml_string)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use test_log::test;

    #[test]
    fn test_missing_file_yields_default() {
        let dir = TempDir::new().unwrap();
        let provider = TomlConfigProvider::new(dir.path().join("tether.toml"));
        assert_eq!(provider.get_graph_config().unwrap(), GraphConfig::default());
    }

    #[test]
    fn test_config_round_trip() {
        let dir = TempDir::new().unwrap();
        let provider = TomlConfigProvider::new(dir.path().join("tether.toml"));
        let config = GraphConfig {
            strict_polymorphism: false,
            reset_on_remote_update: true,
            trace_operations: true,
        };
        provider.set_graph_config(&config).unwrap();
        assert_eq!(provider.get_graph_config().unwrap(), config);
    }

    #[test]
    fn test_partial_table_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tether.toml");
        std::fs::write(&path, "[graph]\nreset_on_remote_update = true\n").unwrap();
        let config = TomlConfigProvider::new(path).get_graph_config().unwrap();
        assert!(config.reset_on_remote_update);
        assert!(!config.trace_operations);
        assert_eq!(config.strict_polymorphism, cfg!(debug_assertions));
    }

    #[test]
    fn test_malformed_file_is_serialization_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tether.toml");
        std::fs::write(&path, "[graph\n").unwrap();
        let err = TomlConfigProvider::new(path).get_graph_config().unwrap_err();
        assert!(matches!(err, TetherError::Serialization(_)));
    }
}
