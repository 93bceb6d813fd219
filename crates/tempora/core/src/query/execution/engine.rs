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
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tempora_common::{IndexManager, Node, NodeStore, QueryError, Result};

use super::monitor::QueryMonitor;
use super::result::{META_CACHE_HIT, META_EXECUTION_TIME_MS, META_OPTIMIZATIONS, META_PLAN_COST, META_PLAN_STEPS, META_RESULT_COUNT, QueryResult, ResultPagination};
use super::strategies::{ExecutionContext, StrategyRegistry};
use crate::cache::{CacheConfig, TtlCache};
use crate::config::QueryConfig;
use crate::observability::{EventSink, QueryEvent, default_sink};
use crate::query::model::Query;
use crate::query::optimizer::QueryOptimizer;
use crate::query::planner::{ExecutionPlan, PlanOperation};
use crate::statistics::{QueryDetails, StatisticsCollector};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    #[default]
    Sync,
    /// Runs exactly like `Sync`.
    Async,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionOptions {
    pub mode: ExecutionMode,
    pub use_cache: bool,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Sync,
            use_cache: true,
        }
    }
}

impl ExecutionOptions {
    pub fn uncached() -> Self {
        Self {
            use_cache: false,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub result_cache: CacheConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            result_cache: CacheConfig::result_cache(),
        }
    }
}

#[derive(Default)]
pub struct QueryEngineBuilder {
    config: QueryConfig,
    node_store: Option<Arc<dyn NodeStore>>,
    index_manager: Option<Arc<dyn IndexManager>>,
    events: Option<Arc<dyn EventSink>>,
    strategies: Option<StrategyRegistry>,
}

impl QueryEngineBuilder {
    pub fn config(mut self, config: QueryConfig) -> Self {
        self.config = config;
        self
    }

    pub fn node_store(mut self, node_store: Arc<dyn NodeStore>) -> Self {
        self.node_store = Some(node_store);
        self
    }

    pub fn index_manager(mut self, index_manager: Arc<dyn IndexManager>) -> Self {
        self.index_manager = Some(index_manager);
        self
    }

    pub fn events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn strategies(mut self, strategies: StrategyRegistry) -> Self {
        self.strategies = Some(strategies);
        self
    }

    /// Wires the components together and loads saved statistics when a
    /// persistence path is configured.
    pub fn build(self) -> QueryEngine {
        let events = self.events.unwrap_or_else(default_sink);
        let config = self.config;

        let statistics = Arc::new(StatisticsCollector::with_events(config.statistics.clone(), events.clone()));
        statistics.load();

        let optimizer = Arc::new(QueryOptimizer::with_events(
            config.optimizer.clone(),
            config.cost.clone(),
            statistics.clone(),
            self.index_manager.clone(),
            events.clone(),
        ));

        QueryEngine {
            monitor: QueryMonitor::with_events(config.monitor.clone(), events.clone()),
            result_cache: TtlCache::new(config.engine.result_cache.clone()),
            strategies: self.strategies.unwrap_or_default(),
            node_store: self.node_store,
            index_manager: self.index_manager,
            optimizer,
            statistics,
            events,
            config,
        }
    }
}

/// Plans and runs queries against the node store and its indexes.
///
/// Steps of a plan run in order on the calling thread, each consuming the
/// previous step's nodes. Results are cached for a short time under the
/// query's canonical key.
pub struct QueryEngine {
    config: QueryConfig,
    node_store: Option<Arc<dyn NodeStore>>,
    index_manager: Option<Arc<dyn IndexManager>>,
    optimizer: Arc<QueryOptimizer>,
    statistics: Arc<StatisticsCollector>,
    monitor: QueryMonitor,
    strategies: StrategyRegistry,
    result_cache: TtlCache<String, QueryResult>,
    events: Arc<dyn EventSink>,
}

impl QueryEngine {
    pub fn builder() -> QueryEngineBuilder {
        QueryEngineBuilder::default()
    }

    pub fn new(node_store: Arc<dyn NodeStore>, index_manager: Arc<dyn IndexManager>) -> Self {
        Self::builder().node_store(node_store).index_manager(index_manager).build()
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    pub fn optimizer(&self) -> &Arc<QueryOptimizer> {
        &self.optimizer
    }

    pub fn statistics(&self) -> &Arc<StatisticsCollector> {
        &self.statistics
    }

    pub fn monitor(&self) -> &QueryMonitor {
        &self.monitor
    }

    /// Runs `query`. Invalid criteria and pagination are returned as they
    /// are; any failure while planning or executing is wrapped in
    /// [`QueryError::Execution`].
    pub fn execute(&self, query: &Query, options: &ExecutionOptions) -> Result<QueryResult> {
        query.validate()?;

        match options.mode {
            ExecutionMode::Sync | ExecutionMode::Async => self.execute_sync(query, options),
        }
    }

    fn execute_sync(&self, query: &Query, options: &ExecutionOptions) -> Result<QueryResult> {
        let cache_key = query.cache_key()?;
        if options.use_cache
            && let Some(cached) = self.result_cache.get(&cache_key)
        {
            self.events.emit(&QueryEvent::ResultCacheHit { query_key: cache_key });
            return Ok(cached.with_metadata(META_CACHE_HIT, true));
        }

        let started = Instant::now();
        let token = self.monitor.start(&query.id, &query.describe());

        let (plan, nodes) = match self.plan_and_run(query) {
            Ok(outcome) => outcome,
            Err(error) => {
                self.monitor.abandon(token);
                self.events.emit(&QueryEvent::QueryFailed {
                    query_id: query.id.clone(),
                    error: error.to_string(),
                });
                return Err(QueryError::execution(&query.id, error));
            }
        };

        let (nodes, pagination) = paginate(nodes, query.offset, query.limit);
        let duration = self.monitor.finish(token, nodes.len()).unwrap_or_else(|| started.elapsed());
        let execution_time_ms = duration.as_secs_f64() * 1000.0;

        let details = QueryDetails::from_criterion(&query.criteria);
        self.statistics.record_query_execution(query.criteria.kind().as_str(), execution_time_ms, nodes.len(), &details);
        self.statistics.maybe_persist();

        let result_count = nodes.len();
        let mut result = QueryResult::new(nodes)
            .with_metadata(META_EXECUTION_TIME_MS, execution_time_ms)
            .with_metadata(META_RESULT_COUNT, result_count)
            .with_metadata(META_PLAN_COST, plan.total_cost)
            .with_metadata(META_PLAN_STEPS, plan.steps.len())
            .with_metadata(META_OPTIMIZATIONS, Value::from(plan.applied_rules()))
            .with_metadata(META_CACHE_HIT, false);
        if let Some(pagination) = pagination {
            result = result.with_pagination(pagination);
        }

        if options.use_cache {
            self.result_cache.insert(cache_key, result.clone());
        }
        Ok(result)
    }

    fn plan_and_run(&self, query: &Query) -> Result<(ExecutionPlan, Vec<Node>)> {
        let plan = self.optimizer.optimize(query)?;
        let nodes = self.execute_plan(&plan)?;
        Ok((plan, nodes))
    }

    /// Runs every step of `plan` in order through its strategy.
    pub fn execute_plan(&self, plan: &ExecutionPlan) -> Result<Vec<Node>> {
        let ctx = ExecutionContext::new(self.node_store.as_deref(), self.index_manager.as_deref());
        let mut nodes = Vec::new();

        for step in &plan.steps {
            let strategy = self.strategies.get(step.kind())?;
            nodes = strategy.execute(step, &ctx, nodes)?;

            if let PlanOperation::FullScan { predicate: None, .. } = step.operation {
                self.optimizer.observe_collection_size(nodes.len());
            }
        }
        Ok(nodes)
    }

    pub fn explain(&self, query: &Query) -> Result<String> {
        self.optimizer.explain(query)
    }

    pub fn clear_caches(&self) {
        self.result_cache.clear();
        self.optimizer.clear_cache();
    }

    pub fn cached_results(&self) -> usize {
        self.result_cache.len()
    }
}

/// Applies `offset` then `limit`. Pagination is reported only when a limit
/// is set.
fn paginate(nodes: Vec<Node>, offset: Option<usize>, limit: Option<usize>) -> (Vec<Node>, Option<ResultPagination>) {
    let total_items = nodes.len();
    let offset = offset.unwrap_or(0);
    let window = nodes.into_iter().skip(offset);

    match limit {
        Some(limit) => (window.take(limit).collect(), Some(ResultPagination::for_window(total_items, limit, offset))),
        None => (window.collect(), None),
    }
}
