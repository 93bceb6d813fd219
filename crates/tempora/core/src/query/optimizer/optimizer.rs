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
use std::sync::atomic::{AtomicUsize, Ordering};
use tempora_common::{IndexManager, Result};
use uuid::Uuid;

use super::rule_engine::{OptimizationContext, RuleEngine};
use crate::cache::{CacheConfig, TtlCache};
use crate::observability::{EventSink, QueryEvent, default_sink};
use crate::query::model::Query;
use crate::query::planner::{CostFactors, CostModel, ExecutionPlan, PlanGenerator};
use crate::statistics::StatisticsCollector;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Collection size assumed until a full scan reports the real count.
    pub default_collection_size: usize,
    pub spatial_index: String,
    pub temporal_index: String,
    pub spatiotemporal_index: String,
    pub total_spatial_area: f64,
    /// One year.
    pub total_temporal_span_secs: f64,
    pub correlation_factor: f64,
    pub per_criterion_selectivity: f64,
    pub join_selectivity: f64,
    pub memory_limit_mb: f64,
    pub record_size_kb: f64,
    pub plan_cache: CacheConfig,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            default_collection_size: 10_000,
            spatial_index: "spatial_index".to_string(),
            temporal_index: "temporal_index".to_string(),
            spatiotemporal_index: "spatiotemporal_index".to_string(),
            total_spatial_area: 1.0,
            total_temporal_span_secs: 365.0 * 24.0 * 3600.0,
            correlation_factor: 1.5,
            per_criterion_selectivity: 0.7,
            join_selectivity: 0.1,
            memory_limit_mb: 500.0,
            record_size_kb: 1.0,
            plan_cache: CacheConfig::plan_cache(),
        }
    }
}

/// Turns queries into cost-estimated execution plans.
///
/// Plans are cached by the query's canonical key. The cache only expires by
/// age and capacity, so a plan chosen before an index was added or dropped
/// stays in use until it ages out.
pub struct QueryOptimizer {
    config: OptimizerConfig,
    cost_model: CostModel,
    statistics: Arc<StatisticsCollector>,
    index_manager: Option<Arc<dyn IndexManager>>,
    rule_engine: RuleEngine,
    plan_cache: TtlCache<String, ExecutionPlan>,
    collection_size: AtomicUsize,
    events: Arc<dyn EventSink>,
}

impl QueryOptimizer {
    pub fn new(config: OptimizerConfig, cost_factors: CostFactors, statistics: Arc<StatisticsCollector>, index_manager: Option<Arc<dyn IndexManager>>) -> Self {
        Self::with_events(config, cost_factors, statistics, index_manager, default_sink())
    }

    pub fn with_events(
        config: OptimizerConfig,
        cost_factors: CostFactors,
        statistics: Arc<StatisticsCollector>,
        index_manager: Option<Arc<dyn IndexManager>>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            cost_model: CostModel::new(cost_factors, statistics.clone()),
            plan_cache: TtlCache::new(config.plan_cache.clone()),
            collection_size: AtomicUsize::new(config.default_collection_size),
            rule_engine: RuleEngine::with_default_rules(),
            config,
            statistics,
            index_manager,
            events,
        }
    }

    pub fn with_rule_engine(mut self, rule_engine: RuleEngine) -> Self {
        self.rule_engine = rule_engine;
        self
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    pub fn cost_model(&self) -> &CostModel {
        &self.cost_model
    }

    pub fn statistics(&self) -> &Arc<StatisticsCollector> {
        &self.statistics
    }

    pub fn collection_size(&self) -> usize {
        self.collection_size.load(Ordering::Relaxed)
    }

    /// Records the node count seen by a full scan for later estimates.
    pub fn observe_collection_size(&self, size: usize) {
        self.collection_size.store(size, Ordering::Relaxed);
    }

    pub fn optimize(&self, query: &Query) -> Result<ExecutionPlan> {
        let query_key = query.cache_key()?;
        if let Some(plan) = self.plan_cache.get(&query_key) {
            self.events.emit(&QueryEvent::PlanCacheHit { query_key });
            return Ok(plan);
        }

        let plan = self.generate(query, &query_key)?;
        self.plan_cache.insert(query_key, plan.clone());
        Ok(plan)
    }

    /// Plans `query` from scratch, bypassing the plan cache.
    pub fn generate(&self, query: &Query, query_key: &str) -> Result<ExecutionPlan> {
        let collection_size = self.collection_size();
        let initial = self.initial_plan(query, query_key, collection_size);

        let ctx = OptimizationContext {
            query,
            collection_size,
            config: &self.config,
            cost_model: &self.cost_model,
            statistics: &self.statistics,
            index_manager: self.index_manager.as_deref(),
            events: self.events.as_ref(),
        };
        let mut plan = self.rule_engine.run(initial, &ctx)?;
        plan.plan_id = Uuid::new_v4().to_string();

        self.events.emit(&QueryEvent::PlanGenerated {
            plan_id: plan.plan_id.clone(),
            steps: plan.steps.len(),
            total_cost: plan.total_cost,
        });
        Ok(plan)
    }

    /// The unoptimized full scan plus filter plan for `query`.
    pub fn initial_plan(&self, query: &Query, query_key: &str, collection_size: usize) -> ExecutionPlan {
        PlanGenerator::new(&self.cost_model, &self.config).initial_plan(query, query_key, collection_size)
    }

    pub fn explain(&self, query: &Query) -> Result<String> {
        Ok(self.optimize(query)?.explain())
    }

    pub fn clear_cache(&self) {
        self.plan_cache.clear();
    }

    pub fn cached_plans(&self) -> usize {
        self.plan_cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::MemorySink;
    use crate::query::planner::StepKind;
    use crate::statistics::StatisticsConfig;
    use tempora_common::{ContentCriteria, ContentOperator, Criterion, InMemoryIndexManager, InMemoryNodeStore, ScanIndex, SpatialCriteria};

    fn optimizer_with(index_names: &[&str]) -> (QueryOptimizer, Arc<MemorySink>) {
        let indexes = Arc::new(InMemoryIndexManager::new());
        let store = Arc::new(InMemoryNodeStore::default());
        for name in index_names {
            indexes.register(*name, Arc::new(ScanIndex::new(store.clone())));
        }
        let sink = Arc::new(MemorySink::new());
        let statistics = Arc::new(StatisticsCollector::with_events(StatisticsConfig::default(), sink.clone()));
        let optimizer = QueryOptimizer::with_events(OptimizerConfig::default(), CostFactors::default(), statistics, Some(indexes), sink.clone());
        (optimizer, sink)
    }

    fn spatial_query() -> Query {
        Query::new(Criterion::and(vec![
            SpatialCriteria::rectangle(0.0, 0.0, 0.1, 0.1).into(),
            ContentCriteria::new("kind", ContentOperator::Eq, "a").into(),
        ]))
    }

    #[test]
    fn test_optimize_selects_spatial_index() {
        let (optimizer, _) = optimizer_with(&["spatial_index"]);
        let plan = optimizer.optimize(&spatial_query()).unwrap();

        assert_eq!(plan.steps[0].kind(), StepKind::IndexScan);
        assert!(!plan.plan_id.is_empty());
        assert!(plan.applied_rules().contains(&"select_indexes".to_string()));
        assert_eq!(plan.annotations.len(), 5);
    }

    #[test]
    fn test_optimize_without_index_manager_scans() {
        let statistics = Arc::new(StatisticsCollector::new(StatisticsConfig::default()));
        let optimizer = QueryOptimizer::new(OptimizerConfig::default(), CostFactors::default(), statistics, None);
        let plan = optimizer.optimize(&spatial_query()).unwrap();

        let kinds: Vec<_> = plan.steps.iter().map(|step| step.kind()).collect();
        assert_eq!(kinds, vec![StepKind::FullScan, StepKind::Filter]);
    }

    #[test]
    fn test_plan_cache_reuses_plans_for_equal_queries() {
        let (optimizer, sink) = optimizer_with(&["spatial_index"]);
        let first = optimizer.optimize(&spatial_query()).unwrap();
        let second = optimizer.optimize(&spatial_query()).unwrap();

        assert_eq!(first.plan_id, second.plan_id);
        assert_eq!(optimizer.cached_plans(), 1);
        assert_eq!(sink.count("plan_cache_hit"), 1);
        assert_eq!(sink.count("plan_generated"), 1);

        optimizer.clear_cache();
        let third = optimizer.optimize(&spatial_query()).unwrap();
        assert_ne!(first.plan_id, third.plan_id);
    }

    #[test]
    fn test_collection_size_hint() {
        let (optimizer, _) = optimizer_with(&[]);
        assert_eq!(optimizer.collection_size(), 10_000);

        optimizer.observe_collection_size(42);
        let query = Query::new(ContentCriteria::new("kind", ContentOperator::Eq, "a").into());
        let plan = optimizer.generate(&query, "key").unwrap();
        assert_eq!(plan.steps[0].estimated_output_size, Some(42));
    }

    #[test]
    fn test_explain_lists_steps() {
        let (optimizer, _) = optimizer_with(&["spatial_index"]);
        let explained = optimizer.explain(&spatial_query()).unwrap();
        assert!(explained.contains("index scan on spatial_index"));
        assert!(explained.contains("optimizations: select_indexes"));
    }
}
