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

//! Query Execution
//!
//! Runs optimized plans step by step against the node store and indexes,
//! tracks in-flight and slow queries, and shapes the returned result.

pub mod engine;
pub mod monitor;
pub mod result;
pub mod strategies;

pub use engine::{EngineConfig, ExecutionMode, ExecutionOptions, QueryEngine, QueryEngineBuilder};
pub use monitor::{ActiveQueryInfo, ExecutionToken, MonitorConfig, QueryMonitor, SlowQueryRecord};
pub use result::{QueryResult, ResultPagination, ResultTransformer};
pub use strategies::{
    ExecutionContext, ExecutionStrategy, FilterStrategy, FullScanStrategy, IndexScanStrategy, JoinStrategy, LimitStrategy, SortStrategy, StrategyRegistry, join_nodes, sort_nodes,
};
