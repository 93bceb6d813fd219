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

//! Structured events emitted by the query components.
//!
//! Components never reach for a process-wide logger. Each one is handed an
//! [`EventSink`] when it is built and reports what happened through it. The
//! default sink forwards to `tracing`; [`MetricsSink`] feeds the `metrics`
//! facade and [`MemorySink`] keeps events around for inspection.

use metrics::{counter, histogram};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum QueryEvent {
    PlanCacheHit {
        query_key: String,
    },
    PlanGenerated {
        plan_id: String,
        steps: usize,
        total_cost: f64,
    },
    RuleApplied {
        rule: String,
        original_cost: f64,
        new_cost: f64,
    },
    IndexRejected {
        index: String,
        index_plan_cost: f64,
        scan_plan_cost: f64,
    },
    QueryStarted {
        query_id: String,
        description: String,
    },
    QueryCompleted {
        query_id: String,
        duration_ms: f64,
        result_count: usize,
    },
    QueryFailed {
        query_id: String,
        error: String,
    },
    SlowQuery {
        query_id: String,
        duration_ms: f64,
        description: String,
    },
    ResultCacheHit {
        query_key: String,
    },
    StatisticsCapacityReached {
        query_type: String,
    },
    StatisticsPersisted {
        path: String,
    },
    StatisticsPersistFailed {
        path: String,
        error: String,
    },
    StatisticsLoadFailed {
        path: String,
        error: String,
    },
}

impl QueryEvent {
    pub fn name(&self) -> &'static str {
        match self {
            QueryEvent::PlanCacheHit { .. } => "plan_cache_hit",
            QueryEvent::PlanGenerated { .. } => "plan_generated",
            QueryEvent::RuleApplied { .. } => "rule_applied",
            QueryEvent::IndexRejected { .. } => "index_rejected",
            QueryEvent::QueryStarted { .. } => "query_started",
            QueryEvent::QueryCompleted { .. } => "query_completed",
            QueryEvent::QueryFailed { .. } => "query_failed",
            QueryEvent::SlowQuery { .. } => "slow_query",
            QueryEvent::ResultCacheHit { .. } => "result_cache_hit",
            QueryEvent::StatisticsCapacityReached { .. } => "statistics_capacity_reached",
            QueryEvent::StatisticsPersisted { .. } => "statistics_persisted",
            QueryEvent::StatisticsPersistFailed { .. } => "statistics_persist_failed",
            QueryEvent::StatisticsLoadFailed { .. } => "statistics_load_failed",
        }
    }
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: &QueryEvent);
}

/// Forwards events to `tracing` with structured fields.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &QueryEvent) {
        match event {
            QueryEvent::PlanCacheHit { query_key } => debug!(query_key = %query_key, "Using cached plan"),
            QueryEvent::PlanGenerated { plan_id, steps, total_cost } => {
                debug!(plan_id = %plan_id, steps, total_cost, "Generated execution plan")
            }
            QueryEvent::RuleApplied { rule, original_cost, new_cost } => {
                debug!(rule = %rule, original_cost, new_cost, "Applied optimization rule")
            }
            QueryEvent::IndexRejected { index, index_plan_cost, scan_plan_cost } => {
                debug!(index = %index, index_plan_cost, scan_plan_cost, "Index plan rejected, keeping full scan")
            }
            QueryEvent::QueryStarted { query_id, description } => debug!(query_id = %query_id, description = %description, "Query started"),
            QueryEvent::QueryCompleted { query_id, duration_ms, result_count } => {
                info!(query_id = %query_id, duration_ms, result_count, "Query completed")
            }
            QueryEvent::QueryFailed { query_id, error } => warn!(query_id = %query_id, error = %error, "Query failed"),
            QueryEvent::SlowQuery { query_id, duration_ms, description } => {
                warn!(query_id = %query_id, duration_ms, description = %description, "Slow query detected")
            }
            QueryEvent::ResultCacheHit { query_key } => debug!(query_key = %query_key, "Using cached result"),
            QueryEvent::StatisticsCapacityReached { query_type } => {
                warn!(query_type = %query_type, "Too many query types tracked, dropping sample")
            }
            QueryEvent::StatisticsPersisted { path } => debug!(path = %path, "Saved query statistics"),
            QueryEvent::StatisticsPersistFailed { path, error } => warn!(path = %path, error = %error, "Failed to save query statistics"),
            QueryEvent::StatisticsLoadFailed { path, error } => warn!(path = %path, error = %error, "Failed to load query statistics"),
        }
    }
}

/// Feeds counters and histograms through the `metrics` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsSink;

impl EventSink for MetricsSink {
    fn emit(&self, event: &QueryEvent) {
        match event {
            QueryEvent::PlanCacheHit { .. } => counter!("tempora_plan_cache_hits", 1),
            QueryEvent::PlanGenerated { total_cost, .. } => {
                counter!("tempora_plans_generated", 1);
                histogram!("tempora_plan_cost", *total_cost);
            }
            QueryEvent::RuleApplied { rule, .. } => counter!("tempora_rules_applied", 1, "rule" => rule.clone()),
            QueryEvent::IndexRejected { index, .. } => counter!("tempora_index_rejections", 1, "index" => index.clone()),
            QueryEvent::QueryStarted { .. } => counter!("tempora_queries_started", 1),
            QueryEvent::QueryCompleted { duration_ms, result_count, .. } => {
                counter!("tempora_queries_completed", 1);
                histogram!("tempora_query_duration_ms", *duration_ms);
                histogram!("tempora_query_result_count", *result_count as f64);
            }
            QueryEvent::QueryFailed { .. } => counter!("tempora_queries_failed", 1),
            QueryEvent::SlowQuery { .. } => counter!("tempora_slow_queries", 1),
            QueryEvent::ResultCacheHit { .. } => counter!("tempora_result_cache_hits", 1),
            QueryEvent::StatisticsCapacityReached { .. } => counter!("tempora_statistics_dropped_samples", 1),
            QueryEvent::StatisticsPersisted { .. } => counter!("tempora_statistics_saves", 1),
            QueryEvent::StatisticsPersistFailed { .. } | QueryEvent::StatisticsLoadFailed { .. } => {
                counter!("tempora_statistics_io_errors", 1)
            }
        }
    }
}

/// Broadcasts every event to each of its sinks in order.
#[derive(Default, Clone)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self { sinks }
    }

    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl EventSink for FanoutSink {
    fn emit(&self, event: &QueryEvent) {
        for sink in &self.sinks {
            sink.emit(event);
        }
    }
}

/// Records events in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<QueryEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<QueryEvent> {
        self.events.lock().clone()
    }

    pub fn count(&self, name: &str) -> usize {
        self.events.lock().iter().filter(|event| event.name() == name).count()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: &QueryEvent) {
        self.events.lock().push(event.clone());
    }
}

pub fn default_sink() -> Arc<dyn EventSink> {
    Arc::new(TracingSink)
}
