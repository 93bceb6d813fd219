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

//! # Tempora Query Core
//!
//! Query planning and execution for the Tempora temporal-spatial knowledge
//! store.
//!
//! ## Pipeline
//! 1. A [`Query`] is built from criteria, directly or through the builders
//! 2. The [`QueryOptimizer`] turns it into an [`ExecutionPlan`], choosing
//!    between a full scan and an index lookup by estimated cost
//! 3. The [`QueryEngine`] runs the plan step by step and returns a
//!    [`QueryResult`] with execution metadata
//! 4. Execution times, result sizes and filter values flow back into the
//!    [`StatisticsCollector`], which sharpens later estimates
//!
//! Node storage and indexes are reached only through the
//! [`NodeStore`] and [`IndexManager`] traits.

pub mod cache;
pub mod config;
pub mod observability;
pub mod query;
pub mod statistics;

pub use cache::{CacheConfig, CacheStats, EvictionPolicy, TtlCache};
pub use config::{ConfigError, QueryConfig};
pub use observability::{EventSink, FanoutSink, MemorySink, MetricsSink, QueryEvent, TracingSink};
pub use query::execution::{EngineConfig, ExecutionMode, ExecutionOptions, QueryEngine, QueryEngineBuilder, QueryResult, ResultPagination};
pub use query::optimizer::{OptimizerConfig, QueryOptimizer, RuleEngine};
pub use query::planner::{CostFactors, CostModel, ExecutionPlan, ExecutionStep, StepKind};
pub use query::{Query, compound_query, content_query, query, spatial_query, temporal_query};
pub use statistics::{StatisticsCollector, StatisticsConfig};

pub use tempora_common::{
    CompositeCriteria, ContentCriteria, ContentOperator, Criterion, CriterionKind, Index, IndexManager, LogicalOperator, Node, NodeId, NodeStore, Point, QueryError, Result, SpatialCriteria,
    TemporalCriteria,
};
