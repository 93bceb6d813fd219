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

//! The rewrite rules applied to every plan, in this order:
//!
//! 1. `select_indexes` replaces the full scan with an index lookup when
//!    that is estimated to be cheaper.
//! 2. `push_down_filters` moves a filter up next to the scan across sort and
//!    limit steps.
//! 3. `optimize_join_order` leaves joins in place.
//! 4. `estimate_costs` re-derives sizes, costs and memory for every step.
//! 5. `apply_result_size_limits` caps results that would exceed the memory
//!    budget.

use tempora_common::{Criterion, Result};

use super::rule_engine::{OptimizationContext, OptimizationRule, RuleApplication};
use crate::observability::QueryEvent;
use crate::query::planner::index_selector::residual_selectivity;
use crate::query::planner::{ExecutionPlan, ExecutionStep, IndexSelector, PlanOperation, StepKind};

pub struct SelectIndexes;

impl OptimizationRule for SelectIndexes {
    fn name(&self) -> &str {
        "select_indexes"
    }

    fn order(&self) -> u32 {
        1
    }

    fn apply(&self, plan: ExecutionPlan, ctx: &OptimizationContext<'_>) -> Result<(ExecutionPlan, RuleApplication)> {
        let selector = IndexSelector::new(ctx.config, ctx.index_manager);
        let Some(choice) = selector.choose(&ctx.query.criteria, ctx.collection_size, ctx.query.limit) else {
            let cost = plan.total_cost;
            return Ok((plan, RuleApplication::unchanged(self.name(), cost, "no usable index")));
        };

        let mut steps = vec![ExecutionStep::new(PlanOperation::IndexScan {
            index: choice.index.clone(),
            criteria: choice.criteria,
            limit_hint: choice.limit_hint,
        })];

        let mut residual = choice.residual;
        if !residual.is_empty() {
            let selectivity = residual_selectivity(residual.len(), ctx.config);
            let criteria = match residual.len() {
                1 => residual.remove(0),
                _ => Criterion::and(residual),
            };
            steps.push(ExecutionStep::new(PlanOperation::Filter { criteria, selectivity }));
        }
        steps.extend(plan.steps.iter().skip(1).filter(|step| step.kind() != StepKind::Filter).cloned());

        let mut candidate = plan.clone();
        candidate.steps = steps;
        ctx.generator().estimate(&mut candidate, ctx.collection_size);

        if candidate.total_cost < plan.total_cost {
            ctx.statistics.record_index_usage(&choice.index, true);
            let description = format!("using {} for an estimated {} matches", choice.index, choice.estimated_matches);
            let application = RuleApplication::changed(self.name(), plan.total_cost, candidate.total_cost, description);
            Ok((candidate, application))
        } else {
            ctx.statistics.record_index_usage(&choice.index, false);
            ctx.events.emit(&QueryEvent::IndexRejected {
                index: choice.index.clone(),
                index_plan_cost: candidate.total_cost,
                scan_plan_cost: plan.total_cost,
            });
            let description = format!("{} is not cheaper than a full scan", choice.index);
            let cost = plan.total_cost;
            Ok((plan, RuleApplication::unchanged(self.name(), cost, description)))
        }
    }
}

pub struct PushDownFilters;

impl OptimizationRule for PushDownFilters {
    fn name(&self) -> &str {
        "push_down_filters"
    }

    fn order(&self) -> u32 {
        2
    }

    fn apply(&self, mut plan: ExecutionPlan, ctx: &OptimizationContext<'_>) -> Result<(ExecutionPlan, RuleApplication)> {
        let original_cost = plan.total_cost;
        let position = plan.steps.iter().position(|step| step.kind() == StepKind::Filter);

        let pushable = match position {
            Some(position) if position > 1 && plan.steps[0].kind().is_scan() => {
                plan.steps[1..position].iter().all(|step| matches!(step.kind(), StepKind::Sort | StepKind::Limit))
            }
            _ => false,
        };

        match position {
            Some(position) if pushable => {
                let filter = plan.steps.remove(position);
                plan.steps.insert(1, filter);
                ctx.generator().estimate(&mut plan, ctx.collection_size);
                let new_cost = plan.total_cost;
                Ok((plan, RuleApplication::changed(self.name(), original_cost, new_cost, format!("moved filter from step {} to step 2", position + 1))))
            }
            _ => Ok((plan, RuleApplication::unchanged(self.name(), original_cost, "filter already adjacent to scan"))),
        }
    }
}

/// Keeps joins where they are. Reordering needs cardinality estimates for
/// both sides of every join, which plans do not carry yet.
pub struct OptimizeJoinOrder;

impl OptimizationRule for OptimizeJoinOrder {
    fn name(&self) -> &str {
        "optimize_join_order"
    }

    fn order(&self) -> u32 {
        3
    }

    fn apply(&self, plan: ExecutionPlan, _ctx: &OptimizationContext<'_>) -> Result<(ExecutionPlan, RuleApplication)> {
        let joins = plan.steps.iter().filter(|step| step.kind() == StepKind::Join).count();
        let description = if joins < 2 { "fewer than two joins" } else { "join order left as written" };
        let cost = plan.total_cost;
        Ok((plan, RuleApplication::unchanged(self.name(), cost, description)))
    }
}

pub struct EstimateCosts;

impl OptimizationRule for EstimateCosts {
    fn name(&self) -> &str {
        "estimate_costs"
    }

    fn order(&self) -> u32 {
        4
    }

    fn apply(&self, mut plan: ExecutionPlan, ctx: &OptimizationContext<'_>) -> Result<(ExecutionPlan, RuleApplication)> {
        let original_cost = plan.total_cost;
        ctx.generator().estimate(&mut plan, ctx.collection_size);
        let description = format!("estimated {} steps", plan.steps.len());
        let new_cost = plan.total_cost;
        Ok((plan, RuleApplication::changed(self.name(), original_cost, new_cost, description)))
    }
}

pub struct ApplyResultSizeLimits;

impl OptimizationRule for ApplyResultSizeLimits {
    fn name(&self) -> &str {
        "apply_result_size_limits"
    }

    fn order(&self) -> u32 {
        5
    }

    fn apply(&self, mut plan: ExecutionPlan, ctx: &OptimizationContext<'_>) -> Result<(ExecutionPlan, RuleApplication)> {
        let original_cost = plan.total_cost;
        let generator = ctx.generator();
        let max_rows = generator.max_result_rows();

        if plan.has_step(StepKind::Limit) {
            return Ok((plan, RuleApplication::unchanged(self.name(), original_cost, "plan already limited")));
        }

        match plan.estimated_output_size() {
            Some(rows) if rows > max_rows => {
                plan.steps.push(ExecutionStep::new(PlanOperation::Limit { count: max_rows, offset: 0 }));
                generator.estimate(&mut plan, ctx.collection_size);
                let new_cost = plan.total_cost;
                let description = format!("capped {rows} estimated rows at {max_rows}");
                Ok((plan, RuleApplication::changed(self.name(), original_cost, new_cost, description)))
            }
            _ => Ok((plan, RuleApplication::unchanged(self.name(), original_cost, "within memory budget"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::MemorySink;
    use crate::query::model::Query;
    use crate::query::optimizer::OptimizerConfig;
    use crate::query::planner::{CostFactors, CostModel, PlanGenerator};
    use crate::statistics::{StatisticsCollector, StatisticsConfig};
    use chrono::{Duration, TimeZone, Utc};
    use std::sync::Arc;
    use tempora_common::{ContentCriteria, ContentOperator, InMemoryIndexManager, InMemoryNodeStore, ScanIndex, SpatialCriteria, TemporalCriteria};

    struct Fixture {
        statistics: Arc<StatisticsCollector>,
        cost_model: CostModel,
        config: OptimizerConfig,
        indexes: InMemoryIndexManager,
        sink: MemorySink,
    }

    impl Fixture {
        fn new(index_names: &[&str]) -> Self {
            let statistics = Arc::new(StatisticsCollector::new(StatisticsConfig::default()));
            let indexes = InMemoryIndexManager::new();
            let store = Arc::new(InMemoryNodeStore::default());
            for name in index_names {
                indexes.register(*name, Arc::new(ScanIndex::new(store.clone())));
            }
            Self {
                cost_model: CostModel::new(CostFactors::default(), statistics.clone()),
                statistics,
                config: OptimizerConfig::default(),
                indexes,
                sink: MemorySink::new(),
            }
        }

        fn ctx<'a>(&'a self, query: &'a Query, collection_size: usize) -> OptimizationContext<'a> {
            OptimizationContext {
                query,
                collection_size,
                config: &self.config,
                cost_model: &self.cost_model,
                statistics: &self.statistics,
                index_manager: Some(&self.indexes),
                events: &self.sink,
            }
        }

        fn initial(&self, query: &Query, collection_size: usize) -> ExecutionPlan {
            PlanGenerator::new(&self.cost_model, &self.config).initial_plan(query, "key", collection_size)
        }
    }

    fn step(operation: PlanOperation) -> ExecutionStep {
        ExecutionStep::new(operation)
    }

    fn content() -> Criterion {
        ContentCriteria::new("kind", ContentOperator::Eq, "a").into()
    }

    fn january() -> TemporalCriteria {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        TemporalCriteria::between(start, start + Duration::days(31))
    }

    #[test]
    fn test_select_indexes_uses_cheaper_index() {
        let fixture = Fixture::new(&["temporal_index"]);
        let query = Query::new(Criterion::and(vec![january().into(), content()]));
        let ctx = fixture.ctx(&query, 10_000);
        let plan = fixture.initial(&query, 10_000);

        let (plan, application) = SelectIndexes.apply(plan, &ctx).unwrap();
        assert!(application.applied);
        assert!(application.new_cost < application.original_cost);

        let kinds: Vec<_> = plan.steps.iter().map(|step| step.kind()).collect();
        assert_eq!(kinds, vec![StepKind::IndexScan, StepKind::Filter]);
        assert_eq!(plan.steps[1].estimated_input_size, plan.steps[0].estimated_output_size);
        let PlanOperation::Filter { criteria, selectivity } = &plan.steps[1].operation else {
            panic!("expected filter");
        };
        assert_eq!(criteria, &content());
        assert!((selectivity - 0.7).abs() < 1e-9);
        assert_eq!(fixture.statistics.index_usage("temporal_index").hits, 1);
    }

    #[test]
    fn test_select_indexes_keeps_scan_when_index_is_not_cheaper() {
        let fixture = Fixture::new(&["spatial_index"]);
        // The box covers the whole assumed area, so the index returns everything.
        let query = Query::new(SpatialCriteria::rectangle(0.0, 0.0, 1.0, 1.0).into());
        let ctx = fixture.ctx(&query, 100);
        let plan = fixture.initial(&query, 100);

        let (kept, application) = SelectIndexes.apply(plan.clone(), &ctx).unwrap();
        assert!(!application.applied);
        assert_eq!(kept.steps, plan.steps);
        let usage = fixture.statistics.index_usage("spatial_index");
        assert_eq!((usage.accesses, usage.hits), (1, 0));
        assert_eq!(fixture.sink.count("index_rejected"), 1);
    }

    #[test]
    fn test_select_indexes_without_candidates() {
        let fixture = Fixture::new(&[]);
        let query = Query::new(content());
        let ctx = fixture.ctx(&query, 100);

        let (_, application) = SelectIndexes.apply(fixture.initial(&query, 100), &ctx).unwrap();
        assert!(!application.applied);
        assert_eq!(fixture.statistics.index_usage("spatial_index").accesses, 0);
    }

    #[test]
    fn test_push_down_filters_across_sort_and_limit() {
        let fixture = Fixture::new(&[]);
        let query = Query::new(content());
        let ctx = fixture.ctx(&query, 100);

        let plan = ExecutionPlan::new(
            "key",
            vec![
                step(PlanOperation::FullScan {
                    collection_size: 100,
                    predicate: None,
                }),
                step(PlanOperation::Sort {
                    field: "id".to_string(),
                    descending: false,
                }),
                step(PlanOperation::Limit { count: 10, offset: 0 }),
                step(PlanOperation::Filter {
                    criteria: content(),
                    selectivity: 0.7,
                }),
            ],
        );

        let (plan, application) = PushDownFilters.apply(plan, &ctx).unwrap();
        assert!(application.applied);
        let kinds: Vec<_> = plan.steps.iter().map(|step| step.kind()).collect();
        assert_eq!(kinds, vec![StepKind::FullScan, StepKind::Filter, StepKind::Sort, StepKind::Limit]);
    }

    #[test]
    fn test_push_down_filters_blocked_by_join() {
        let fixture = Fixture::new(&[]);
        let query = Query::new(content());
        let ctx = fixture.ctx(&query, 100);

        let steps = vec![
            step(PlanOperation::FullScan {
                collection_size: 100,
                predicate: None,
            }),
            step(PlanOperation::Join {
                join_type: crate::query::planner::JoinType::Union,
                right: crate::query::planner::JoinSource::Nodes(Vec::new()),
                selectivity: 0.1,
            }),
            step(PlanOperation::Filter {
                criteria: content(),
                selectivity: 0.7,
            }),
        ];
        let (plan, application) = PushDownFilters.apply(ExecutionPlan::new("key", steps.clone()), &ctx).unwrap();
        assert!(!application.applied);
        assert_eq!(plan.steps, steps);
    }

    #[test]
    fn test_optimize_join_order_never_reorders() {
        let fixture = Fixture::new(&[]);
        let query = Query::new(content());
        let ctx = fixture.ctx(&query, 100);
        let join = |join_type| {
            step(PlanOperation::Join {
                join_type,
                right: crate::query::planner::JoinSource::Criteria(content()),
                selectivity: 0.1,
            })
        };
        let steps = vec![
            step(PlanOperation::FullScan {
                collection_size: 100,
                predicate: None,
            }),
            join(crate::query::planner::JoinType::Union),
            join(crate::query::planner::JoinType::Inner),
        ];

        let (plan, application) = OptimizeJoinOrder.apply(ExecutionPlan::new("key", steps.clone()), &ctx).unwrap();
        assert!(!application.applied);
        assert_eq!(plan.steps, steps);
    }

    #[test]
    fn test_estimate_costs_fills_every_step() {
        let fixture = Fixture::new(&[]);
        let query = Query::new(content());
        let ctx = fixture.ctx(&query, 100);
        let plan = ExecutionPlan::new(
            "key",
            vec![
                step(PlanOperation::FullScan {
                    collection_size: 100,
                    predicate: None,
                }),
                step(PlanOperation::Limit { count: 10, offset: 0 }),
            ],
        );

        let (plan, _) = EstimateCosts.apply(plan, &ctx).unwrap();
        assert_eq!(plan.steps[1].estimated_input_size, Some(100));
        assert_eq!(plan.steps[1].estimated_output_size, Some(10));
        assert_eq!(plan.total_cost, 100.0);
    }

    #[test]
    fn test_result_size_limit_appended() {
        let fixture = Fixture::new(&[]);
        let query = Query::new(content());
        let ctx = fixture.ctx(&query, 2_000_000);
        let mut plan = ExecutionPlan::new(
            "key",
            vec![step(PlanOperation::FullScan {
                collection_size: 2_000_000,
                predicate: None,
            })],
        );
        PlanGenerator::new(&fixture.cost_model, &fixture.config).estimate(&mut plan, 2_000_000);
        assert_eq!(plan.estimated_output_size(), Some(2_000_000));

        let (plan, application) = ApplyResultSizeLimits.apply(plan, &ctx).unwrap();
        assert!(application.applied);
        assert_eq!(plan.steps.last().map(|step| step.operation.clone()), Some(PlanOperation::Limit { count: 512_000, offset: 0 }));
        assert_eq!(plan.estimated_output_size(), Some(512_000));
    }

    #[test]
    fn test_result_size_limit_respects_existing_limit() {
        let fixture = Fixture::new(&[]);
        let query = Query::new(content());
        let ctx = fixture.ctx(&query, 2_000_000);
        let steps = vec![
            step(PlanOperation::FullScan {
                collection_size: 2_000_000,
                predicate: None,
            }),
            step(PlanOperation::Sort {
                field: "id".to_string(),
                descending: true,
            }),
            step(PlanOperation::Limit { count: 600_000, offset: 0 }),
        ];
        let mut plan = ExecutionPlan::new("key", steps);
        PlanGenerator::new(&fixture.cost_model, &fixture.config).estimate(&mut plan, 2_000_000);

        let (plan, application) = ApplyResultSizeLimits.apply(plan, &ctx).unwrap();
        assert!(!application.applied);
        assert_eq!(plan.steps.len(), 3);
    }
}
