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

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use tempora_common::{InMemoryIndexManager, InMemoryNodeStore};
use tempora_core::statistics::{QueryDetails, StatisticsSnapshot};
use tempora_core::*;

fn config_at(path: std::path::PathBuf) -> StatisticsConfig {
    StatisticsConfig {
        persistence_path: Some(path),
        save_interval: 2,
        ..StatisticsConfig::default()
    }
}

#[test]
fn test_statistics_survive_engine_restart() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("stats").join("query_stats.json");
    let nodes: Vec<Node> = (0..6u64).map(|id| Node::new(id).with_field("kind", if id < 2 { "a" } else { "b" })).collect();

    let config = QueryConfig {
        statistics: config_at(path.clone()),
        ..QueryConfig::default()
    };
    let build = |config: QueryConfig| {
        QueryEngine::builder()
            .config(config)
            .node_store(Arc::new(InMemoryNodeStore::new(nodes.clone())))
            .index_manager(Arc::new(InMemoryIndexManager::new()))
            .events(Arc::new(MemorySink::new()))
            .build()
    };

    let engine = build(config.clone());
    let query_a = content_query().equals("kind", "a").build().unwrap();
    let query_b = content_query().equals("kind", "b").build().unwrap();
    engine.execute(&query_a, &ExecutionOptions::default()).unwrap();
    assert!(!path.exists());
    engine.execute(&query_b, &ExecutionOptions::default()).unwrap();
    assert!(path.exists());

    let snapshot = StatisticsSnapshot::read_from(&path).unwrap();
    assert_eq!(snapshot.result_sizes.get("CONTENT"), Some(&vec![2.0, 4.0]));

    let restarted = build(config);
    assert_eq!(restarted.statistics().sample_count("CONTENT"), 2);
    assert_eq!(restarted.statistics().get_value_selectivity("kind", &json!("a")), 0.5);
    assert_eq!(restarted.statistics().get_estimated_result_size("CONTENT"), 3.5);
}

#[test]
fn test_corrupt_statistics_file_is_ignored() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("query_stats.json");
    std::fs::write(&path, "{ not json").unwrap();

    let sink = Arc::new(MemorySink::new());
    let collector = StatisticsCollector::with_events(config_at(path), sink.clone());
    assert!(!collector.load());
    assert!(collector.query_types().is_empty());
    assert_eq!(sink.count("statistics_load_failed"), 1);
}

#[tokio::test]
async fn test_periodic_persistence_task_saves_pending_records() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("query_stats.json");
    let config = StatisticsConfig {
        save_interval: 1_000,
        ..config_at(path.clone())
    };
    let collector = Arc::new(StatisticsCollector::with_events(config, Arc::new(MemorySink::new())));
    collector.record_query_execution("TEMPORAL", 12.0, 3, &QueryDetails::default());

    let task = collector.spawn_persistence_task(Duration::from_millis(20));
    for _ in 0..100 {
        if path.exists() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    task.abort();

    assert!(path.exists());
    assert_eq!(collector.pending_records(), 0);
    let snapshot = StatisticsSnapshot::read_from(&path).unwrap();
    assert_eq!(snapshot.execution_times.get("TEMPORAL"), Some(&vec![12.0]));
}
