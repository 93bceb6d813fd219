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

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StatisticsError {
    #[error("Statistics I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("Malformed statistics document: {0}")]
    Malformed(#[from] serde_json::Error),
}

pub type StatisticsResult<T> = Result<T, StatisticsError>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexUsage {
    pub accesses: u64,
    pub hits: u64,
}

impl IndexUsage {
    pub fn hit_ratio(&self) -> Option<f64> {
        (self.accesses > 0).then(|| self.hits as f64 / self.accesses as f64)
    }
}

/// On-disk form of the collected statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatisticsSnapshot {
    #[serde(default)]
    pub execution_times: BTreeMap<String, Vec<f64>>,
    #[serde(default)]
    pub result_sizes: BTreeMap<String, Vec<f64>>,
    #[serde(default)]
    pub index_usage: BTreeMap<String, IndexUsage>,
    #[serde(default)]
    pub field_cardinality: BTreeMap<String, BTreeMap<String, u64>>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl StatisticsSnapshot {
    pub fn read_from(path: &Path) -> StatisticsResult<Self> {
        let bytes = fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Overwrites `path` with this snapshot. The document is written to a
    /// sibling temporary file first and renamed into place.
    pub fn write_to(&self, path: &Path) -> StatisticsResult<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let staging = path.with_extension("tmp");
        fs::write(&staging, serde_json::to_vec_pretty(self)?)?;
        fs::rename(&staging, path)?;
        Ok(())
    }
}
