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
use std::fmt;
use std::str::FromStr;
use tempora_common::{Criterion, Node, QueryError};

use crate::query::optimizer::RuleApplication;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    FullScan,
    IndexScan,
    Filter,
    Join,
    Sort,
    Limit,
}

impl StepKind {
    pub const ALL: [StepKind; 6] = [StepKind::FullScan, StepKind::IndexScan, StepKind::Filter, StepKind::Join, StepKind::Sort, StepKind::Limit];

    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::FullScan => "full_scan",
            StepKind::IndexScan => "index_scan",
            StepKind::Filter => "filter",
            StepKind::Join => "join",
            StepKind::Sort => "sort",
            StepKind::Limit => "limit",
        }
    }

    pub fn is_scan(&self) -> bool {
        matches!(self, StepKind::FullScan | StepKind::IndexScan)
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepKind {
    type Err = QueryError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        StepKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == value)
            .ok_or_else(|| QueryError::UnsupportedKind(format!("operation `{value}`")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinType {
    Inner,
    Intersection,
    Left,
    Right,
    Union,
}

impl FromStr for JoinType {
    type Err = QueryError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "inner" => Ok(JoinType::Inner),
            "intersection" => Ok(JoinType::Intersection),
            "left" => Ok(JoinType::Left),
            "right" => Ok(JoinType::Right),
            "union" => Ok(JoinType::Union),
            other => Err(QueryError::UnsupportedKind(format!("join type `{other}`"))),
        }
    }
}

/// Right-hand side of a join step. The left side is the pipeline input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinSource {
    Nodes(Vec<Node>),
    /// Nodes of the store matching the criterion.
    Criteria(Criterion),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlanOperation {
    FullScan {
        collection_size: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        predicate: Option<Criterion>,
    },
    IndexScan {
        index: String,
        criteria: Criterion,
        /// Requested result count for nearest-neighbour lookups.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        limit_hint: Option<usize>,
    },
    Filter {
        criteria: Criterion,
        selectivity: f64,
    },
    Join {
        join_type: JoinType,
        right: JoinSource,
        selectivity: f64,
    },
    Sort {
        field: String,
        descending: bool,
    },
    Limit {
        count: usize,
        offset: usize,
    },
}

impl PlanOperation {
    pub fn kind(&self) -> StepKind {
        match self {
            PlanOperation::FullScan { .. } => StepKind::FullScan,
            PlanOperation::IndexScan { .. } => StepKind::IndexScan,
            PlanOperation::Filter { .. } => StepKind::Filter,
            PlanOperation::Join { .. } => StepKind::Join,
            PlanOperation::Sort { .. } => StepKind::Sort,
            PlanOperation::Limit { .. } => StepKind::Limit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStep {
    pub operation: PlanOperation,
    pub estimated_cost: f64,
    pub estimated_input_size: Option<usize>,
    pub estimated_output_size: Option<usize>,
    pub estimated_memory: Option<f64>,
}

impl ExecutionStep {
    pub fn new(operation: PlanOperation) -> Self {
        Self {
            operation,
            estimated_cost: 0.0,
            estimated_input_size: None,
            estimated_output_size: None,
            estimated_memory: None,
        }
    }

    pub fn kind(&self) -> StepKind {
        self.operation.kind()
    }

    pub fn describe(&self) -> String {
        match &self.operation {
            PlanOperation::FullScan { collection_size, predicate } => match predicate {
                Some(predicate) => format!("full scan of {collection_size} nodes with {} predicate", predicate.kind()),
                None => format!("full scan of {collection_size} nodes"),
            },
            PlanOperation::IndexScan { index, criteria, .. } => format!("index scan on {index} ({})", criteria.kind()),
            PlanOperation::Filter { criteria, selectivity } => format!("filter {} (selectivity {selectivity:.3})", criteria.kind()),
            PlanOperation::Join { join_type, selectivity, .. } => format!("{join_type:?} join (selectivity {selectivity:.3})"),
            PlanOperation::Sort { field, descending } => format!("sort by {field}{}", if *descending { " desc" } else { "" }),
            PlanOperation::Limit { count, offset } => format!("limit {count} offset {offset}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub plan_id: String,
    pub query_key: String,
    pub steps: Vec<ExecutionStep>,
    pub total_cost: f64,
    /// Rules that ran while producing this plan, in order.
    pub annotations: Vec<RuleApplication>,
}

impl ExecutionPlan {
    pub fn new(query_key: impl Into<String>, steps: Vec<ExecutionStep>) -> Self {
        let mut plan = Self {
            plan_id: String::new(),
            query_key: query_key.into(),
            steps,
            total_cost: 0.0,
            annotations: Vec::new(),
        };
        plan.refresh_total_cost();
        plan
    }

    pub fn refresh_total_cost(&mut self) {
        self.total_cost = self.steps.iter().map(|step| step.estimated_cost).sum();
    }

    pub fn has_step(&self, kind: StepKind) -> bool {
        self.steps.iter().any(|step| step.kind() == kind)
    }

    pub fn estimated_output_size(&self) -> Option<usize> {
        self.steps.last().and_then(|step| step.estimated_output_size)
    }

    pub fn applied_rules(&self) -> Vec<String> {
        self.annotations.iter().filter(|application| application.applied).map(|application| application.rule_name.clone()).collect()
    }

    /// Human readable plan summary.
    pub fn explain(&self) -> String {
        let mut lines = vec![format!("Plan {} (total cost {:.2})", self.plan_id, self.total_cost)];
        for (position, step) in self.steps.iter().enumerate() {
            lines.push(format!(
                "  {}. {} cost={:.2} rows={}",
                position + 1,
                step.describe(),
                step.estimated_cost,
                step.estimated_output_size.map_or_else(|| "?".to_string(), |rows| rows.to_string())
            ));
        }
        let applied = self.applied_rules();
        if !applied.is_empty() {
            lines.push(format!("  optimizations: {}", applied.join(", ")));
        }
        lines.join("\n")
    }
}
