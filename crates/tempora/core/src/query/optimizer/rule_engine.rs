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
use tempora_common::{IndexManager, Result};

use super::optimizer::OptimizerConfig;
use super::rules::{ApplyResultSizeLimits, EstimateCosts, OptimizeJoinOrder, PushDownFilters, SelectIndexes};
use crate::observability::{EventSink, QueryEvent};
use crate::query::model::Query;
use crate::query::planner::{CostModel, ExecutionPlan, PlanGenerator};
use crate::statistics::StatisticsCollector;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleApplication {
    pub rule_name: String,
    pub applied: bool,
    pub original_cost: f64,
    pub new_cost: f64,
    pub description: String,
}

impl RuleApplication {
    pub fn unchanged(rule_name: &str, cost: f64, description: impl Into<String>) -> Self {
        Self {
            rule_name: rule_name.to_string(),
            applied: false,
            original_cost: cost,
            new_cost: cost,
            description: description.into(),
        }
    }

    pub fn changed(rule_name: &str, original_cost: f64, new_cost: f64, description: impl Into<String>) -> Self {
        Self {
            rule_name: rule_name.to_string(),
            applied: true,
            original_cost,
            new_cost,
            description: description.into(),
        }
    }
}

/// Everything a rule may consult while rewriting a plan.
pub struct OptimizationContext<'a> {
    pub query: &'a Query,
    pub collection_size: usize,
    pub config: &'a OptimizerConfig,
    pub cost_model: &'a CostModel,
    pub statistics: &'a StatisticsCollector,
    pub index_manager: Option<&'a dyn IndexManager>,
    pub events: &'a dyn EventSink,
}

impl OptimizationContext<'_> {
    pub fn generator(&self) -> PlanGenerator<'_> {
        PlanGenerator::new(self.cost_model, self.config)
    }
}

pub trait OptimizationRule: Send + Sync {
    fn name(&self) -> &str;
    /// Position in the rule sequence; lower runs first.
    fn order(&self) -> u32;
    fn apply(&self, plan: ExecutionPlan, ctx: &OptimizationContext<'_>) -> Result<(ExecutionPlan, RuleApplication)>;
}

/// Runs each rule once, in ascending order, recording every application on
/// the plan.
pub struct RuleEngine {
    rules: Vec<Box<dyn OptimizationRule>>,
}

impl RuleEngine {
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn with_default_rules() -> Self {
        let mut engine = Self::new();
        engine.add_rule(Box::new(SelectIndexes));
        engine.add_rule(Box::new(PushDownFilters));
        engine.add_rule(Box::new(OptimizeJoinOrder));
        engine.add_rule(Box::new(EstimateCosts));
        engine.add_rule(Box::new(ApplyResultSizeLimits));
        engine
    }

    pub fn add_rule(&mut self, rule: Box<dyn OptimizationRule>) {
        self.rules.push(rule);
        self.rules.sort_by_key(|rule| rule.order());
    }

    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|rule| rule.name()).collect()
    }

    pub fn run(&self, initial_plan: ExecutionPlan, ctx: &OptimizationContext<'_>) -> Result<ExecutionPlan> {
        let mut plan = initial_plan;
        for rule in &self.rules {
            let (mut next, application) = rule.apply(plan, ctx)?;
            if application.applied {
                ctx.events.emit(&QueryEvent::RuleApplied {
                    rule: application.rule_name.clone(),
                    original_cost: application.original_cost,
                    new_cost: application.new_cost,
                });
            }
            next.annotations.push(application);
            plan = next;
        }
        Ok(plan)
    }
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::with_default_rules()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::MemorySink;
    use crate::query::planner::CostFactors;
    use crate::statistics::StatisticsConfig;
    use std::sync::Arc;
    use tempora_common::{ContentCriteria, ContentOperator};

    struct Marker {
        name: &'static str,
        order: u32,
    }

    impl OptimizationRule for Marker {
        fn name(&self) -> &str {
            self.name
        }

        fn order(&self) -> u32 {
            self.order
        }

        fn apply(&self, plan: ExecutionPlan, _ctx: &OptimizationContext<'_>) -> Result<(ExecutionPlan, RuleApplication)> {
            let cost = plan.total_cost;
            Ok((plan, RuleApplication::changed(self.name, cost, cost, "marked")))
        }
    }

    #[test]
    fn test_default_rule_order() {
        let engine = RuleEngine::with_default_rules();
        assert_eq!(engine.rule_names(), vec!["select_indexes", "push_down_filters", "optimize_join_order", "estimate_costs", "apply_result_size_limits"]);
    }

    #[test]
    fn test_rules_run_once_in_order() {
        let mut engine = RuleEngine::new();
        engine.add_rule(Box::new(Marker { name: "second", order: 2 }));
        engine.add_rule(Box::new(Marker { name: "first", order: 1 }));

        let statistics = StatisticsCollector::new(StatisticsConfig::default());
        let cost_model = CostModel::new(CostFactors::default(), Arc::new(StatisticsCollector::new(StatisticsConfig::default())));
        let config = OptimizerConfig::default();
        let sink = MemorySink::new();
        let query = Query::new(ContentCriteria::new("a", ContentOperator::Eq, 1).into());
        let ctx = OptimizationContext {
            query: &query,
            collection_size: 10,
            config: &config,
            cost_model: &cost_model,
            statistics: &statistics,
            index_manager: None,
            events: &sink,
        };

        let plan = engine.run(ExecutionPlan::new("key", Vec::new()), &ctx).unwrap();
        assert_eq!(plan.applied_rules(), vec!["first".to_string(), "second".to_string()]);
        assert_eq!(sink.count("rule_applied"), 2);
    }
}
