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

//! One strategy per plan step kind. Each maps a step, the collaborators and
//! the previous step's nodes to the step's output nodes.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tempora_common::{IndexManager, Node, NodeStore, QueryError, Result, criteria::compare_values};

use crate::query::planner::{ExecutionStep, JoinSource, JoinType, PlanOperation, StepKind};

/// Collaborators available to strategies while a plan runs.
#[derive(Clone, Copy, Default)]
pub struct ExecutionContext<'a> {
    pub node_store: Option<&'a dyn NodeStore>,
    pub index_manager: Option<&'a dyn IndexManager>,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(node_store: Option<&'a dyn NodeStore>, index_manager: Option<&'a dyn IndexManager>) -> Self {
        Self { node_store, index_manager }
    }

    fn require_node_store(&self) -> Result<&'a dyn NodeStore> {
        self.node_store.ok_or(QueryError::MissingCollaborator("node store"))
    }

    fn require_index_manager(&self) -> Result<&'a dyn IndexManager> {
        self.index_manager.ok_or(QueryError::MissingCollaborator("index manager"))
    }
}

pub trait ExecutionStrategy: Send + Sync {
    fn execute(&self, step: &ExecutionStep, ctx: &ExecutionContext<'_>, input: Vec<Node>) -> Result<Vec<Node>>;
}

fn unexpected(expected: StepKind, step: &ExecutionStep) -> QueryError {
    QueryError::UnsupportedKind(format!("{} strategy cannot run a {} step", expected, step.kind()))
}

pub struct FullScanStrategy;

impl ExecutionStrategy for FullScanStrategy {
    fn execute(&self, step: &ExecutionStep, ctx: &ExecutionContext<'_>, _input: Vec<Node>) -> Result<Vec<Node>> {
        let PlanOperation::FullScan { predicate, .. } = &step.operation else {
            return Err(unexpected(StepKind::FullScan, step));
        };

        let nodes = ctx.require_node_store()?.get_all_nodes()?;
        Ok(match predicate {
            Some(predicate) => nodes.into_iter().filter(|node| predicate.matches(node)).collect(),
            None => nodes,
        })
    }
}

pub struct IndexScanStrategy;

impl ExecutionStrategy for IndexScanStrategy {
    fn execute(&self, step: &ExecutionStep, ctx: &ExecutionContext<'_>, _input: Vec<Node>) -> Result<Vec<Node>> {
        let PlanOperation::IndexScan { index, criteria, .. } = &step.operation else {
            return Err(unexpected(StepKind::IndexScan, step));
        };

        let index = ctx.require_index_manager()?.get_index(index).ok_or_else(|| QueryError::IndexNotFound(index.clone()))?;
        index.query(criteria)
    }
}

pub struct FilterStrategy;

impl ExecutionStrategy for FilterStrategy {
    fn execute(&self, step: &ExecutionStep, _ctx: &ExecutionContext<'_>, input: Vec<Node>) -> Result<Vec<Node>> {
        let PlanOperation::Filter { criteria, .. } = &step.operation else {
            return Err(unexpected(StepKind::Filter, step));
        };
        Ok(input.into_iter().filter(|node| criteria.matches(node)).collect())
    }
}

pub struct JoinStrategy;

impl ExecutionStrategy for JoinStrategy {
    fn execute(&self, step: &ExecutionStep, ctx: &ExecutionContext<'_>, input: Vec<Node>) -> Result<Vec<Node>> {
        let PlanOperation::Join { join_type, right, .. } = &step.operation else {
            return Err(unexpected(StepKind::Join, step));
        };

        let right = match right {
            JoinSource::Nodes(nodes) => nodes.clone(),
            JoinSource::Criteria(criteria) => ctx.require_node_store()?.get_all_nodes()?.into_iter().filter(|node| criteria.matches(node)).collect(),
        };
        Ok(join_nodes(input, right, *join_type))
    }
}

/// Combines two node sequences by identity.
///
/// `Inner`/`Intersection` keep the left order and emit the right-hand copy
/// of each shared node. `Union` keeps every left node, then appends right
/// nodes whose id has not been seen; a right node sharing an id with a left
/// node is dropped.
pub fn join_nodes(left: Vec<Node>, right: Vec<Node>, join_type: JoinType) -> Vec<Node> {
    match join_type {
        JoinType::Inner | JoinType::Intersection => {
            let mut by_id: HashMap<_, Node> = right.into_iter().map(|node| (node.id.clone(), node)).collect();
            left.into_iter().filter_map(|node| by_id.remove(&node.id)).collect()
        }
        JoinType::Left => left,
        JoinType::Right => right,
        JoinType::Union => {
            let mut seen = HashSet::new();
            let mut joined = Vec::with_capacity(left.len() + right.len());
            for node in left.into_iter().chain(right) {
                if seen.insert(node.id.clone()) {
                    joined.push(node);
                }
            }
            joined
        }
    }
}

pub struct SortStrategy;

impl ExecutionStrategy for SortStrategy {
    fn execute(&self, step: &ExecutionStep, _ctx: &ExecutionContext<'_>, mut input: Vec<Node>) -> Result<Vec<Node>> {
        let PlanOperation::Sort { field, descending } = &step.operation else {
            return Err(unexpected(StepKind::Sort, step));
        };
        sort_nodes(&mut input, field, *descending);
        Ok(input)
    }
}

/// Stable sort on a field path. Nodes missing the field go last in either
/// direction.
pub fn sort_nodes(nodes: &mut [Node], field: &str, descending: bool) {
    nodes.sort_by(|a, b| match (a.field(field), b.field(field)) {
        (Some(left), Some(right)) => {
            let ordering = compare_values(&left, &right).unwrap_or(Ordering::Equal);
            if descending { ordering.reverse() } else { ordering }
        }
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
}

pub struct LimitStrategy;

impl ExecutionStrategy for LimitStrategy {
    fn execute(&self, step: &ExecutionStep, _ctx: &ExecutionContext<'_>, input: Vec<Node>) -> Result<Vec<Node>> {
        let PlanOperation::Limit { count, offset } = &step.operation else {
            return Err(unexpected(StepKind::Limit, step));
        };
        Ok(input.into_iter().skip(*offset).take(*count).collect())
    }
}

/// Strategy lookup by step kind.
#[derive(Clone)]
pub struct StrategyRegistry {
    strategies: HashMap<StepKind, Arc<dyn ExecutionStrategy>>,
}

impl StrategyRegistry {
    pub fn empty() -> Self {
        Self { strategies: HashMap::new() }
    }

    pub fn register(&mut self, kind: StepKind, strategy: Arc<dyn ExecutionStrategy>) -> &mut Self {
        self.strategies.insert(kind, strategy);
        self
    }

    pub fn get(&self, kind: StepKind) -> Result<Arc<dyn ExecutionStrategy>> {
        self.strategies.get(&kind).cloned().ok_or_else(|| QueryError::UnsupportedKind(format!("no strategy for {kind} steps")))
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry
            .register(StepKind::FullScan, Arc::new(FullScanStrategy))
            .register(StepKind::IndexScan, Arc::new(IndexScanStrategy))
            .register(StepKind::Filter, Arc::new(FilterStrategy))
            .register(StepKind::Join, Arc::new(JoinStrategy))
            .register(StepKind::Sort, Arc::new(SortStrategy))
            .register(StepKind::Limit, Arc::new(LimitStrategy));
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempora_common::{ContentCriteria, ContentOperator, Criterion, InMemoryIndexManager, InMemoryNodeStore, ScanIndex};

    fn ids(nodes: &[Node]) -> Vec<&str> {
        nodes.iter().map(|node| node.id.as_str()).collect()
    }

    fn store() -> InMemoryNodeStore {
        InMemoryNodeStore::new(vec![
            Node::new("1").with_field("kind", "a").with_field("rank", 3),
            Node::new("2").with_field("kind", "b").with_field("rank", 1),
            Node::new("3").with_field("kind", "a"),
            Node::new("4").with_field("kind", "a").with_field("rank", 2),
        ])
    }

    fn kind_a() -> Criterion {
        ContentCriteria::new("kind", ContentOperator::Eq, "a").into()
    }

    #[test]
    fn test_union_keeps_left_copy_on_collision() {
        let left = vec![Node::new("1"), Node::new("2")];
        let right = vec![Node::new("1").with_field("tag", "r"), Node::new("3")];

        let joined = join_nodes(left, right, JoinType::Union);
        assert_eq!(ids(&joined), vec!["1", "2", "3"]);
        assert_eq!(joined[0].field("tag"), None);
    }

    #[test]
    fn test_inner_join_takes_right_copy() {
        let left = vec![Node::new("1"), Node::new("2")];
        let right = vec![Node::new("3"), Node::new("1").with_field("tag", "r")];

        for join_type in [JoinType::Inner, JoinType::Intersection] {
            let joined = join_nodes(left.clone(), right.clone(), join_type);
            assert_eq!(ids(&joined), vec!["1"]);
            assert_eq!(joined[0].field("tag"), Some(json!("r")));
        }
    }

    #[test]
    fn test_left_and_right_joins_are_verbatim() {
        let left = vec![Node::new("1"), Node::new("2")];
        let right = vec![Node::new("3")];
        assert_eq!(ids(&join_nodes(left.clone(), right.clone(), JoinType::Left)), vec!["1", "2"]);
        assert_eq!(ids(&join_nodes(left, right, JoinType::Right)), vec!["3"]);
    }

    #[test]
    fn test_full_scan_with_predicate() {
        let store = store();
        let ctx = ExecutionContext::new(Some(&store), None);
        let step = ExecutionStep::new(PlanOperation::FullScan {
            collection_size: 4,
            predicate: Some(kind_a()),
        });

        let nodes = FullScanStrategy.execute(&step, &ctx, Vec::new()).unwrap();
        assert_eq!(ids(&nodes), vec!["1", "3", "4"]);
    }

    #[test]
    fn test_missing_collaborators_fail() {
        let ctx = ExecutionContext::default();
        let scan = ExecutionStep::new(PlanOperation::FullScan {
            collection_size: 4,
            predicate: None,
        });
        assert!(matches!(FullScanStrategy.execute(&scan, &ctx, Vec::new()), Err(QueryError::MissingCollaborator(_))));

        let index_scan = ExecutionStep::new(PlanOperation::IndexScan {
            index: "spatial_index".to_string(),
            criteria: kind_a(),
            limit_hint: None,
        });
        assert!(matches!(IndexScanStrategy.execute(&index_scan, &ctx, Vec::new()), Err(QueryError::MissingCollaborator(_))));

        let indexes = InMemoryIndexManager::new();
        let ctx = ExecutionContext::new(None, Some(&indexes));
        assert!(matches!(IndexScanStrategy.execute(&index_scan, &ctx, Vec::new()), Err(QueryError::IndexNotFound(name)) if name == "spatial_index"));
    }

    #[test]
    fn test_index_scan_delegates_to_index() {
        let store = Arc::new(store());
        let indexes = InMemoryIndexManager::new();
        indexes.register("content_index", Arc::new(ScanIndex::new(store)));
        let ctx = ExecutionContext::new(None, Some(&indexes));
        let step = ExecutionStep::new(PlanOperation::IndexScan {
            index: "content_index".to_string(),
            criteria: kind_a(),
            limit_hint: None,
        });

        assert_eq!(ids(&IndexScanStrategy.execute(&step, &ctx, Vec::new()).unwrap()), vec!["1", "3", "4"]);
    }

    #[test]
    fn test_filter_sort_limit_pipeline() {
        let store = store();
        let ctx = ExecutionContext::new(Some(&store), None);
        let registry = StrategyRegistry::default();
        let steps = [
            ExecutionStep::new(PlanOperation::FullScan {
                collection_size: 4,
                predicate: None,
            }),
            ExecutionStep::new(PlanOperation::Filter {
                criteria: kind_a(),
                selectivity: 0.7,
            }),
            ExecutionStep::new(PlanOperation::Sort {
                field: "rank".to_string(),
                descending: true,
            }),
            ExecutionStep::new(PlanOperation::Limit { count: 2, offset: 1 }),
        ];

        let mut nodes = Vec::new();
        for step in &steps {
            nodes = registry.get(step.kind()).unwrap().execute(step, &ctx, nodes).unwrap();
        }
        // Sorted descending by rank: 1 (3), 4 (2), 3 (missing).
        assert_eq!(ids(&nodes), vec!["4", "3"]);
    }

    #[test]
    fn test_sort_is_stable_and_puts_missing_last() {
        let mut nodes = vec![
            Node::new("a").with_field("rank", 2),
            Node::new("b"),
            Node::new("c").with_field("rank", 1),
            Node::new("d").with_field("rank", 2),
        ];
        sort_nodes(&mut nodes, "rank", false);
        assert_eq!(ids(&nodes), vec!["c", "a", "d", "b"]);
    }

    #[test]
    fn test_join_with_criteria_source() {
        let store = store();
        let ctx = ExecutionContext::new(Some(&store), None);
        let step = ExecutionStep::new(PlanOperation::Join {
            join_type: JoinType::Inner,
            right: JoinSource::Criteria(kind_a()),
            selectivity: 0.1,
        });

        let joined = JoinStrategy.execute(&step, &ctx, vec![Node::new("2"), Node::new("3")]).unwrap();
        assert_eq!(ids(&joined), vec!["3"]);
    }

    #[test]
    fn test_strategy_rejects_mismatched_step() {
        let step = ExecutionStep::new(PlanOperation::Limit { count: 1, offset: 0 });
        assert!(matches!(FilterStrategy.execute(&step, &ExecutionContext::default(), Vec::new()), Err(QueryError::UnsupportedKind(_))));
        assert!(StrategyRegistry::empty().get(StepKind::Sort).is_err());
    }
}
