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

//! # Query
//!
//! ## Model and builders
//! - [`Query`] carries one criterion tree plus optional `limit`/`offset`
//! - Fluent builders for temporal, spatial, content and compound queries
//!
//! ## Planner
//! - Plans are ordered steps with per-step cost, size and memory estimates
//! - The cost model combines fixed factors with collected statistics
//!
//! ## Optimizer
//! - An ordered set of rules, each applied once, with a TTL plan cache
//!
//! ## Execution
//! - One strategy per step kind, a result cache and a query monitor

pub mod builder;
pub mod execution;
pub mod model;
pub mod optimizer;
pub mod planner;

pub use builder::{CompoundQueryBuilder, ContentQueryBuilder, QueryBuilder, SpatialQueryBuilder, TemporalQueryBuilder, compound_query, content_query, query, spatial_query, temporal_query};
pub use execution::{ExecutionMode, ExecutionOptions, QueryEngine, QueryResult};
pub use model::Query;
pub use optimizer::{OptimizerConfig, QueryOptimizer};
pub use planner::{ExecutionPlan, ExecutionStep, StepKind};
