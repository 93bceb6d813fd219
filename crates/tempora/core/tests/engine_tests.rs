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

use chrono::{DateTime, Duration, TimeZone, Utc};
use mockall::mock;
use serde_json::json;
use std::sync::Arc;
use tempora_common::{InMemoryIndexManager, InMemoryNodeStore, ScanIndex};
use tempora_core::query::execution::join_nodes;
use tempora_core::query::planner::JoinType;
use tempora_core::*;

mock! {
    pub Store {}
    impl NodeStore for Store {
        fn get_all_nodes(&self) -> Result<Vec<Node>>;
    }
}

mock! {
    pub Indexes {}
    impl IndexManager for Indexes {
        fn has_index(&self, name: &str) -> bool;
        fn get_index(&self, name: &str) -> Option<Arc<dyn Index>>;
    }
}

mock! {
    pub FailingIndex {}
    impl Index for FailingIndex {
        fn query(&self, criteria: &Criterion) -> Result<Vec<Node>>;
    }
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

fn sensor_nodes() -> Vec<Node> {
    (0..20u64)
        .map(|id| {
            Node::new(id)
                .with_timestamp(t0() + Duration::days(id as i64 * 3))
                .with_position(id as f64 / 20.0, 0.5)
                .with_field("sensor", if id % 4 == 0 { "thermal" } else { "optical" })
                .with_field("reading", id * 10)
        })
        .collect()
}

#[test]
fn test_temporal_builder_produces_expected_query() {
    let t1 = t0() + Duration::days(7);
    let query = temporal_query().between(t0(), t1).limit(10).unwrap().build().unwrap();

    let Criterion::Temporal(criteria) = &query.criteria else {
        panic!("expected temporal criteria, got {:?}", query.criteria);
    };
    assert_eq!(query.criteria.kind(), CriterionKind::Temporal);
    assert_eq!(criteria.start_time, Some(t0()));
    assert_eq!(criteria.end_time, Some(t1));
    assert_eq!(query.limit, Some(10));
    assert_eq!(query.offset, None);
}

#[test]
fn test_union_join_keeps_left_copy() {
    let left = vec![Node::new("1"), Node::new("2")];
    let right = vec![Node::new("1").with_field("tag", "r"), Node::new("3")];

    let joined = join_nodes(left, right, JoinType::Union);
    let ids: Vec<_> = joined.iter().map(|node| node.id.as_str()).collect();
    assert_eq!(ids, vec!["1", "2", "3"]);
    assert_eq!(joined[0].field("tag"), None);
}

#[test]
fn test_result_cache_skips_node_store() {
    let mut store = MockStore::new();
    store.expect_get_all_nodes().times(1).returning(|| Ok(sensor_nodes()));
    let mut indexes = MockIndexes::new();
    indexes.expect_has_index().returning(|_| false);

    let engine = QueryEngine::new(Arc::new(store), Arc::new(indexes));
    let query = content_query().equals("sensor", "thermal").build().unwrap();

    let first = engine.execute(&query, &ExecutionOptions::default()).unwrap();
    let second = engine.execute(&query, &ExecutionOptions::default()).unwrap();
    assert_eq!(first.len(), 5);
    assert!(second.is_cache_hit());
    assert_eq!(first.nodes, second.nodes);
}

#[test]
fn test_missing_index_fails_query_and_clears_monitor() {
    let store = MockStore::new();
    let mut indexes = MockIndexes::new();
    indexes.expect_has_index().returning(|name| name == "temporal_index");
    indexes.expect_get_index().returning(|_| None);

    let sink = Arc::new(MemorySink::new());
    let engine = QueryEngine::builder().node_store(Arc::new(store)).index_manager(Arc::new(indexes)).events(sink.clone()).build();
    let query = temporal_query().between(t0(), t0() + Duration::days(31)).build().unwrap();

    let error = engine.execute(&query, &ExecutionOptions::default()).unwrap_err();
    assert!(matches!(&error, QueryError::Execution { query_id, .. } if query_id == &query.id));
    assert!(matches!(error.root_cause(), QueryError::IndexNotFound(name) if name == "temporal_index"));
    assert!(!engine.monitor().is_active(&query.id));
    assert!(engine.monitor().active_queries().is_empty());
    assert_eq!(sink.count("query_failed"), 1);
    assert_eq!(sink.count("query_completed"), 0);
}

#[test]
fn test_index_storage_failure_is_wrapped() {
    let mut index = MockFailingIndex::new();
    index.expect_query().times(1).returning(|_| Err(QueryError::Storage("segment unreadable".to_string())));
    let index: Arc<dyn Index> = Arc::new(index);

    let mut indexes = MockIndexes::new();
    indexes.expect_has_index().returning(|name| name == "temporal_index");
    indexes.expect_get_index().returning(move |_| Some(index.clone()));

    let engine = QueryEngine::builder().node_store(Arc::new(MockStore::new())).index_manager(Arc::new(indexes)).events(Arc::new(MemorySink::new())).build();
    let query = temporal_query().between(t0(), t0() + Duration::days(31)).build().unwrap();

    let error = engine.execute(&query, &ExecutionOptions::default()).unwrap_err();
    assert!(matches!(error.root_cause(), QueryError::Storage(message) if message == "segment unreadable"));
    assert_eq!(engine.cached_results(), 0);
}

#[test]
fn test_end_to_end_with_index_and_residual_filter() {
    let store = Arc::new(InMemoryNodeStore::new(sensor_nodes()));
    let indexes = Arc::new(InMemoryIndexManager::new());
    indexes.register("temporal_index", Arc::new(ScanIndex::new(store.clone())));

    let engine = QueryEngine::builder().node_store(store).index_manager(indexes).events(Arc::new(MemorySink::new())).build();
    let query = compound_query()
        .temporal(|builder| builder.between(t0(), t0() + Duration::days(30)))
        .content(|builder| builder.equals("sensor", "thermal"))
        .build()
        .unwrap();

    let plan = engine.optimizer().optimize(&query).unwrap();
    let kinds: Vec<_> = plan.steps.iter().map(|step| step.kind()).collect();
    assert_eq!(kinds, vec![StepKind::IndexScan, StepKind::Filter]);
    assert!(plan.applied_rules().contains(&"select_indexes".to_string()));

    let result = engine.execute(&query, &ExecutionOptions::default()).unwrap();
    let ids: Vec<_> = result.iter().map(|node| node.id.as_str()).collect();
    assert_eq!(ids, vec!["0", "4", "8"]);
    assert_eq!(result.metadata("result_count"), Some(&json!(3)));
    assert_eq!(result.metadata("plan_steps"), Some(&json!(2)));

    let explained = engine.explain(&query).unwrap();
    assert!(explained.contains("temporal_index"));
}

#[test]
fn test_spatial_query_with_pagination() {
    let store = Arc::new(InMemoryNodeStore::new(sensor_nodes()));
    let engine = QueryEngine::builder().node_store(store).index_manager(Arc::new(InMemoryIndexManager::new())).events(Arc::new(MemorySink::new())).build();

    let query = spatial_query().within_rectangle(0.0, 0.0, 0.5, 1.0).limit(4).unwrap().offset(4).build().unwrap();
    let result = engine.execute(&query, &ExecutionOptions::default()).unwrap();

    assert_eq!(result.len(), 4);
    let pagination = result.pagination.unwrap();
    assert_eq!(pagination.total_items, 11);
    assert_eq!(pagination.current_page, 2);
    assert_eq!(pagination.total_pages(), 3);
}
