// Dotlanth
// Copyright (C) 2025 Synerthink

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::query::execution::{EngineConfig, MonitorConfig};
use crate::query::optimizer::OptimizerConfig;
use crate::query::planner::CostFactors;
use crate::statistics::StatisticsConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed config: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Every tunable of the query layer. Missing sections and fields fall back
/// to their defaults, so `{}` is a valid configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub statistics: StatisticsConfig,
    pub cost: CostFactors,
    pub optimizer: OptimizerConfig,
    pub engine: EngineConfig,
    pub monitor: MonitorConfig,
}

impl QueryConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        Self::from_json_str(&content)
    }

    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        std::fs::write(path, self.to_json_string()?).map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::EvictionPolicy;

    #[test]
    fn test_empty_document_gives_defaults() {
        let config = QueryConfig::from_json_str("{}").unwrap();
        assert_eq!(config, QueryConfig::default());
        assert_eq!(config.optimizer.default_collection_size, 10_000);
        assert_eq!(config.engine.result_cache.ttl_ms, 60_000);
        assert_eq!(config.engine.result_cache.eviction, EvictionPolicy::OldestHalf);
        assert_eq!(config.monitor.slow_query_threshold_ms, 1000);
    }

    #[test]
    fn test_partial_sections() {
        let config = QueryConfig::from_json_str(r#"{"statistics": {"max_samples": 5}, "monitor": {"slow_query_threshold_ms": 50}}"#).unwrap();
        assert_eq!(config.statistics.max_samples, 5);
        assert_eq!(config.statistics.max_query_types, 1000);
        assert_eq!(config.monitor.slow_query_threshold_ms, 50);
        assert_eq!(config.monitor.max_slow_queries, 100);
    }

    #[test]
    fn test_malformed_document() {
        assert!(matches!(QueryConfig::from_json_str("{\"cost\": 3}"), Err(ConfigError::Malformed(_))));
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("query.json");

        let mut config = QueryConfig::default();
        config.optimizer.memory_limit_mb = 64.0;
        config.to_file(&path).unwrap();

        let loaded = QueryConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.optimizer.memory_limit_mb, 64.0);
        assert!(matches!(QueryConfig::from_file(dir.path().join("missing.json")), Err(ConfigError::Io { .. })));
    }
}
