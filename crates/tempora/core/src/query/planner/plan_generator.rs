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

use super::cost_model::CostModel;
use super::index_selector::{conjuncts, estimate_index_matches, residual_selectivity};
use super::plan::{ExecutionPlan, ExecutionStep, JoinSource, PlanOperation};
use crate::query::model::Query;
use crate::query::optimizer::OptimizerConfig;

/// Builds starting plans and derives per-step size, cost and memory
/// estimates.
pub struct PlanGenerator<'a> {
    cost_model: &'a CostModel,
    config: &'a OptimizerConfig,
}

impl<'a> PlanGenerator<'a> {
    pub fn new(cost_model: &'a CostModel, config: &'a OptimizerConfig) -> Self {
        Self { cost_model, config }
    }

    /// Full scan over the collection followed by one filter for the whole
    /// query criterion.
    pub fn initial_plan(&self, query: &Query, query_key: &str, collection_size: usize) -> ExecutionPlan {
        let selectivity = residual_selectivity(conjuncts(&query.criteria).len(), self.config);
        let steps = vec![
            ExecutionStep::new(PlanOperation::FullScan { collection_size, predicate: None }),
            ExecutionStep::new(PlanOperation::Filter {
                criteria: query.criteria.clone(),
                selectivity,
            }),
        ];

        let mut plan = ExecutionPlan::new(query_key, steps);
        self.estimate(&mut plan, collection_size);
        plan
    }

    /// Walks the plan front to back, feeding each step's estimated output
    /// into the next step as its input, and refreshes the total cost.
    pub fn estimate(&self, plan: &mut ExecutionPlan, collection_size: usize) {
        let model = self.cost_model;
        let mut flowing: Option<usize> = None;

        for step in &mut plan.steps {
            let input = match &step.operation {
                PlanOperation::FullScan { collection_size: size, .. } => *size,
                PlanOperation::IndexScan { .. } => collection_size,
                _ => flowing.unwrap_or(collection_size),
            };

            let (output, cost) = match &step.operation {
                PlanOperation::FullScan { collection_size: size, .. } => (*size, model.full_scan_cost(*size)),
                PlanOperation::IndexScan { index, criteria, limit_hint } => {
                    let matches = estimate_index_matches(criteria, collection_size, *limit_hint, self.config);
                    (matches, model.index_scan_cost(index, matches, collection_size))
                }
                PlanOperation::Filter { selectivity, .. } => (scale(input, *selectivity), model.filter_cost(collection_size, *selectivity, Some(input))),
                PlanOperation::Join { right, selectivity, .. } => {
                    let right_size = match right {
                        JoinSource::Nodes(nodes) => nodes.len(),
                        JoinSource::Criteria(_) => collection_size,
                    };
                    (scale(input.saturating_mul(right_size), *selectivity), model.join_cost(input, right_size, *selectivity))
                }
                PlanOperation::Sort { .. } => (input, model.sort_cost(input)),
                PlanOperation::Limit { count, .. } => (input.min(*count), 0.0),
            };

            step.estimated_input_size = Some(input);
            step.estimated_output_size = Some(output);
            step.estimated_cost = cost;
            step.estimated_memory = Some(model.memory_cost(output, self.config.record_size_kb));
            flowing = Some(output);
        }

        plan.refresh_total_cost();
    }

    /// Largest result the configured memory budget can hold.
    pub fn max_result_rows(&self) -> usize {
        (self.config.memory_limit_mb * 1024.0 / self.config.record_size_kb) as usize
    }
}

fn scale(size: usize, fraction: f64) -> usize {
    (size as f64 * fraction).round() as usize
}
