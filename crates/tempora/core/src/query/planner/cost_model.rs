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
use std::sync::Arc;

use crate::statistics::StatisticsCollector;

/// Applied to index scans on indexes with no recorded accesses.
pub const UNTRACKED_INDEX_PENALTY: f64 = 10.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostFactors {
    pub full_scan: f64,
    pub index_scan: f64,
    pub filter: f64,
    pub join: f64,
    pub memory: f64,
}

impl Default for CostFactors {
    fn default() -> Self {
        Self {
            full_scan: 1.0,
            index_scan: 0.1,
            filter: 0.01,
            join: 5.0,
            memory: 0.0005,
        }
    }
}

/// Cost formulas over plan inputs, informed by index statistics.
pub struct CostModel {
    factors: CostFactors,
    statistics: Arc<StatisticsCollector>,
}

impl CostModel {
    pub fn new(factors: CostFactors, statistics: Arc<StatisticsCollector>) -> Self {
        Self { factors, statistics }
    }

    pub fn factors(&self) -> &CostFactors {
        &self.factors
    }

    pub fn full_scan_cost(&self, collection_size: usize) -> f64 {
        collection_size as f64 * self.factors.full_scan
    }

    pub fn index_scan_cost(&self, index_name: &str, estimated_matches: usize, collection_size: usize) -> f64 {
        let lookup = (collection_size.max(1) as f64).log2() * self.factors.index_scan;
        let fetch = estimated_matches as f64 * 0.1 * self.factors.full_scan;
        (lookup + fetch) * self.index_performance_factor(index_name)
    }

    /// Inverse hit ratio for indexes with a track record, a flat penalty
    /// otherwise.
    pub fn index_performance_factor(&self, index_name: &str) -> f64 {
        match self.statistics.index_hit_ratio(index_name) {
            Some(hit_ratio) => 1.0 / hit_ratio.max(0.1),
            None => UNTRACKED_INDEX_PENALTY,
        }
    }

    /// Cost of filtering `input_size` nodes, or the whole collection when
    /// the input size is unknown.
    pub fn filter_cost(&self, collection_size: usize, selectivity: f64, input_size: Option<usize>) -> f64 {
        input_size.unwrap_or(collection_size) as f64 * self.factors.filter * selectivity.max(0.1)
    }

    pub fn join_cost(&self, left_size: usize, right_size: usize, selectivity: f64) -> f64 {
        left_size as f64 * right_size as f64 * self.factors.join * selectivity.max(0.01)
    }

    pub fn memory_cost(&self, result_size: usize, record_size_kb: f64) -> f64 {
        result_size as f64 * record_size_kb * self.factors.memory
    }

    pub fn sort_cost(&self, input_size: usize) -> f64 {
        let rows = input_size as f64;
        rows * rows.max(1.0).log2() * self.factors.filter
    }
}
