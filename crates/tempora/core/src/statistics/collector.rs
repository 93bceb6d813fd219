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

use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempora_common::{ContentOperator, Criterion, LogicalOperator};
use tokio::task::JoinHandle;
use tracing::debug;

use super::StatisticsConfig;
use super::persistence::{IndexUsage, StatisticsError, StatisticsResult, StatisticsSnapshot};
use crate::observability::{EventSink, QueryEvent, default_sink};

const ESTIMATE_PERCENTILE: f64 = 75.0;
const UNOBSERVED_SELECTIVITY: f64 = 0.5;

/// Extra facts about an executed query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryDetails {
    /// Equality filters as `(field, value)` pairs.
    pub filters: Vec<(String, Value)>,
}

impl QueryDetails {
    pub fn with_filter(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push((field.into(), value.into()));
        self
    }

    /// Collects the equality content comparisons reachable through `AND`.
    pub fn from_criterion(criterion: &Criterion) -> Self {
        let mut details = Self::default();
        collect_equality_filters(criterion, &mut details.filters);
        details
    }
}

fn collect_equality_filters(criterion: &Criterion, filters: &mut Vec<(String, Value)>) {
    match criterion {
        Criterion::Content(content) if content.operator == ContentOperator::Eq => {
            filters.push((content.field.clone(), content.value.clone()));
        }
        Criterion::Composite(composite) if composite.operator == LogicalOperator::And => {
            for child in &composite.children {
                collect_equality_filters(child, filters);
            }
        }
        _ => {}
    }
}

/// Histogram key for an observed value. Strings are kept verbatim and
/// everything else uses its JSON text.
fn value_key(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Percentile of `samples` by linear interpolation between the closest
/// order statistics. `percentile` is expressed in `[0, 100]`.
pub fn get_percentile(samples: &[f64], percentile: f64) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }

    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let rank = percentile.clamp(0.0, 100.0) / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = (rank.ceil() as usize).min(sorted.len() - 1);
    let weight = rank - lower as f64;

    let interpolated = sorted[lower] + (sorted[upper] - sorted[lower]) * weight;
    Some(interpolated.min(sorted[upper]))
}

fn push_sample(samples: &mut VecDeque<f64>, sample: f64, max_samples: usize) {
    samples.push_back(sample);
    while samples.len() > max_samples {
        samples.pop_front();
    }
}

#[derive(Debug, Default)]
struct StatisticsState {
    execution_times: HashMap<String, VecDeque<f64>>,
    result_sizes: HashMap<String, VecDeque<f64>>,
    index_usage: HashMap<String, IndexUsage>,
    field_cardinality: HashMap<String, HashMap<String, u64>>,
    unsaved: u64,
}

impl StatisticsState {
    fn snapshot(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            execution_times: self.execution_times.iter().map(|(k, v)| (k.clone(), v.iter().copied().collect())).collect(),
            result_sizes: self.result_sizes.iter().map(|(k, v)| (k.clone(), v.iter().copied().collect())).collect(),
            index_usage: self.index_usage.iter().map(|(k, v)| (k.clone(), *v)).collect(),
            field_cardinality: self
                .field_cardinality
                .iter()
                .map(|(field, counts)| (field.clone(), counts.iter().map(|(k, v)| (k.clone(), *v)).collect()))
                .collect(),
            timestamp: Some(Utc::now()),
        }
    }
}

pub struct StatisticsCollector {
    config: StatisticsConfig,
    state: Mutex<StatisticsState>,
    events: Arc<dyn EventSink>,
}

impl StatisticsCollector {
    pub fn new(config: StatisticsConfig) -> Self {
        Self::with_events(config, default_sink())
    }

    pub fn with_events(config: StatisticsConfig, events: Arc<dyn EventSink>) -> Self {
        Self {
            config,
            state: Mutex::new(StatisticsState::default()),
            events,
        }
    }

    pub fn config(&self) -> &StatisticsConfig {
        &self.config
    }

    /// Records one executed query. Samples for a query type that would push
    /// the tracked types past `max_query_types` are dropped.
    pub fn record_query_execution(&self, query_type: &str, execution_time_ms: f64, result_size: usize, details: &QueryDetails) {
        let accepted = {
            let mut guard = self.state.lock();
            let state = &mut *guard;

            if !state.execution_times.contains_key(query_type) && state.execution_times.len() >= self.config.max_query_types {
                false
            } else {
                push_sample(state.execution_times.entry(query_type.to_string()).or_default(), execution_time_ms, self.config.max_samples);
                push_sample(state.result_sizes.entry(query_type.to_string()).or_default(), result_size as f64, self.config.max_samples);

                for (field, value) in &details.filters {
                    *state.field_cardinality.entry(field.clone()).or_default().entry(value_key(value)).or_insert(0) += 1;
                }
                state.unsaved += 1;
                true
            }
        };

        if !accepted {
            self.events.emit(&QueryEvent::StatisticsCapacityReached {
                query_type: query_type.to_string(),
            });
        }
    }

    pub fn record_index_usage(&self, index_name: &str, was_hit: bool) {
        let mut state = self.state.lock();
        let usage = state.index_usage.entry(index_name.to_string()).or_default();
        usage.accesses += 1;
        if was_hit {
            usage.hits += 1;
        }
    }

    pub fn get_estimated_execution_time(&self, query_type: &str) -> f64 {
        let state = self.state.lock();
        Self::estimate(state.execution_times.get(query_type)).unwrap_or(self.config.default_execution_time_ms)
    }

    pub fn get_estimated_result_size(&self, query_type: &str) -> f64 {
        let state = self.state.lock();
        Self::estimate(state.result_sizes.get(query_type)).unwrap_or(self.config.default_result_size)
    }

    fn estimate(samples: Option<&VecDeque<f64>>) -> Option<f64> {
        let samples: Vec<f64> = samples?.iter().copied().collect();
        get_percentile(&samples, ESTIMATE_PERCENTILE)
    }

    /// Hits over accesses, or 0 when the index was never accessed.
    pub fn get_index_hit_ratio(&self, index_name: &str) -> f64 {
        self.index_hit_ratio(index_name).unwrap_or(0.0)
    }

    pub fn index_hit_ratio(&self, index_name: &str) -> Option<f64> {
        self.state.lock().index_usage.get(index_name).and_then(IndexUsage::hit_ratio)
    }

    pub fn index_usage(&self, index_name: &str) -> IndexUsage {
        self.state.lock().index_usage.get(index_name).copied().unwrap_or_default()
    }

    /// Observed frequency of `value` among every value seen for `field`.
    pub fn get_value_selectivity(&self, field: &str, value: &Value) -> f64 {
        let state = self.state.lock();
        let Some(counts) = state.field_cardinality.get(field) else {
            return UNOBSERVED_SELECTIVITY;
        };

        let total: u64 = counts.values().sum();
        if total == 0 {
            return UNOBSERVED_SELECTIVITY;
        }
        counts.get(&value_key(value)).copied().unwrap_or(0) as f64 / total as f64
    }

    pub fn query_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.state.lock().execution_times.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn sample_count(&self, query_type: &str) -> usize {
        self.state.lock().execution_times.get(query_type).map_or(0, VecDeque::len)
    }

    /// Queries recorded since the last save.
    pub fn pending_records(&self) -> u64 {
        self.state.lock().unsaved
    }

    pub fn reset(&self) {
        *self.state.lock() = StatisticsState::default();
    }

    pub fn snapshot(&self) -> StatisticsSnapshot {
        self.state.lock().snapshot()
    }

    /// Merges a snapshot into the live state. Loaded samples are treated as
    /// older than the ones already in memory.
    pub fn load_snapshot(&self, snapshot: StatisticsSnapshot) {
        let max_samples = self.config.max_samples;
        let max_types = self.config.max_query_types;
        let mut guard = self.state.lock();
        let state = &mut *guard;

        for (query_type, samples) in snapshot.execution_times {
            if !state.execution_times.contains_key(&query_type) && state.execution_times.len() >= max_types {
                continue;
            }
            merge_samples(state.execution_times.entry(query_type.clone()).or_default(), samples, max_samples);
            if let Some(sizes) = snapshot.result_sizes.get(&query_type) {
                merge_samples(state.result_sizes.entry(query_type).or_default(), sizes.clone(), max_samples);
            }
        }

        for (index_name, usage) in snapshot.index_usage {
            let current = state.index_usage.entry(index_name).or_default();
            current.accesses += usage.accesses;
            current.hits += usage.hits.min(usage.accesses);
        }

        for (field, counts) in snapshot.field_cardinality {
            let current = state.field_cardinality.entry(field).or_default();
            for (value, count) in counts {
                *current.entry(value).or_insert(0) += count;
            }
        }
    }

    pub fn save_to(&self, path: &Path) -> StatisticsResult<()> {
        let snapshot = {
            let mut state = self.state.lock();
            state.unsaved = 0;
            state.snapshot()
        };
        snapshot.write_to(path)
    }

    pub fn load_from(&self, path: &Path) -> StatisticsResult<()> {
        let snapshot = StatisticsSnapshot::read_from(path)?;
        self.load_snapshot(snapshot);
        Ok(())
    }

    /// Saves to the configured path. Failures are reported to the event sink
    /// and otherwise ignored.
    pub fn persist(&self) -> bool {
        let Some(path) = self.config.persistence_path.as_deref() else {
            return false;
        };

        match self.save_to(path) {
            Ok(()) => {
                self.events.emit(&QueryEvent::StatisticsPersisted {
                    path: path.display().to_string(),
                });
                true
            }
            Err(error) => {
                self.events.emit(&QueryEvent::StatisticsPersistFailed {
                    path: path.display().to_string(),
                    error: error.to_string(),
                });
                false
            }
        }
    }

    /// Loads from the configured path. A missing file leaves the state
    /// empty; a malformed one is reported and ignored.
    pub fn load(&self) -> bool {
        let Some(path) = self.config.persistence_path.as_deref() else {
            return false;
        };

        match self.load_from(path) {
            Ok(()) => true,
            Err(StatisticsError::Io(error)) if error.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No saved query statistics");
                false
            }
            Err(error) => {
                self.events.emit(&QueryEvent::StatisticsLoadFailed {
                    path: path.display().to_string(),
                    error: error.to_string(),
                });
                false
            }
        }
    }

    /// Persists once `save_interval` queries have been recorded since the
    /// last save.
    pub fn maybe_persist(&self) -> bool {
        if self.pending_records() < self.config.save_interval {
            return false;
        }
        self.persist()
    }

    /// Spawns a task that saves pending statistics every `interval`.
    pub fn spawn_persistence_task(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let collector = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if collector.pending_records() == 0 {
                    continue;
                }
                let worker = Arc::clone(&collector);
                if let Err(error) = tokio::task::spawn_blocking(move || worker.persist()).await {
                    debug!(error = %error, "Statistics persistence task aborted");
                }
            }
        })
    }
}

fn merge_samples(current: &mut VecDeque<f64>, loaded: Vec<f64>, max_samples: usize) {
    let mut merged: VecDeque<f64> = loaded.into();
    merged.extend(current.drain(..));
    while merged.len() > max_samples {
        merged.pop_front();
    }
    *current = merged;
}
