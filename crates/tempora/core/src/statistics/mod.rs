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

//! Query Statistics
//!
//! Execution feedback gathered by the engine and consumed by the cost model.
//!
//! # Core Components
//!
//! ## Execution samples
//! - Bounded per-query-type lists of execution times and result sizes
//! - 75th percentile estimates with fixed defaults for unseen types
//!
//! ## Index usage
//! - Access and hit counters per index, exposed as a hit ratio
//!
//! ## Field histograms
//! - Value frequencies observed in equality filters, exposed as selectivity
//!
//! ## Persistence
//! - A single JSON document saved on demand or from a periodic task and
//!   merged back on load

pub mod collector;
pub mod persistence;

pub use collector::{QueryDetails, StatisticsCollector, get_percentile};
pub use persistence::{IndexUsage, StatisticsError, StatisticsResult, StatisticsSnapshot};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatisticsConfig {
    /// Samples kept per query type; older samples are dropped first.
    pub max_samples: usize,
    pub max_query_types: usize,
    /// Recorded queries between two saves triggered by `maybe_persist`.
    pub save_interval: u64,
    pub default_execution_time_ms: f64,
    pub default_result_size: f64,
    pub persistence_path: Option<PathBuf>,
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            max_samples: 100,
            max_query_types: 1000,
            save_interval: 100,
            default_execution_time_ms: 100.0,
            default_result_size: 10.0,
            persistence_path: None,
        }
    }
}
