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

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::observability::{EventSink, QueryEvent, default_sink};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub slow_query_threshold_ms: u64,
    /// Slow queries kept; the oldest record is dropped first.
    pub max_slow_queries: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            slow_query_threshold_ms: 1000,
            max_slow_queries: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveQueryInfo {
    pub query_id: String,
    pub description: String,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlowQueryRecord {
    pub query_id: String,
    pub description: String,
    pub duration_ms: f64,
    pub result_count: usize,
    pub completed_at: DateTime<Utc>,
}

/// Identifies one execution of a query. The same query may be running
/// several times at once, each under its own token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExecutionToken(u64);

#[derive(Debug)]
struct ActiveQuery {
    query_id: String,
    description: String,
    started_at: DateTime<Utc>,
    started: Instant,
}

#[derive(Debug, Default)]
struct MonitorState {
    active: HashMap<ExecutionToken, ActiveQuery>,
    slow: VecDeque<SlowQueryRecord>,
}

/// Tracks in-flight queries and keeps a bounded history of slow ones.
pub struct QueryMonitor {
    config: MonitorConfig,
    state: Mutex<MonitorState>,
    next_token: AtomicU64,
    events: Arc<dyn EventSink>,
}

impl QueryMonitor {
    pub fn new(config: MonitorConfig) -> Self {
        Self::with_events(config, default_sink())
    }

    pub fn with_events(config: MonitorConfig, events: Arc<dyn EventSink>) -> Self {
        Self {
            config,
            state: Mutex::new(MonitorState::default()),
            next_token: AtomicU64::new(0),
            events,
        }
    }

    pub fn start(&self, query_id: &str, description: &str) -> ExecutionToken {
        let token = ExecutionToken(self.next_token.fetch_add(1, Ordering::Relaxed));
        self.state.lock().active.insert(
            token,
            ActiveQuery {
                query_id: query_id.to_string(),
                description: description.to_string(),
                started_at: Utc::now(),
                started: Instant::now(),
            },
        );
        self.events.emit(&QueryEvent::QueryStarted {
            query_id: query_id.to_string(),
            description: description.to_string(),
        });
        token
    }

    /// Completes an execution and returns its duration, or `None` when the
    /// token is not being tracked.
    pub fn finish(&self, token: ExecutionToken, result_count: usize) -> Option<Duration> {
        let (query_id, duration, slow) = {
            let mut state = self.state.lock();
            let active = state.active.remove(&token)?;
            let duration = active.started.elapsed();
            let duration_ms = duration.as_secs_f64() * 1000.0;

            let slow = (duration_ms >= self.config.slow_query_threshold_ms as f64).then(|| SlowQueryRecord {
                query_id: active.query_id.clone(),
                description: active.description,
                duration_ms,
                result_count,
                completed_at: Utc::now(),
            });
            if let Some(record) = &slow {
                state.slow.push_back(record.clone());
                while state.slow.len() > self.config.max_slow_queries {
                    state.slow.pop_front();
                }
            }
            (active.query_id, duration, slow)
        };

        if let Some(record) = slow {
            self.events.emit(&QueryEvent::SlowQuery {
                query_id: record.query_id,
                duration_ms: record.duration_ms,
                description: record.description,
            });
        }
        self.events.emit(&QueryEvent::QueryCompleted {
            query_id,
            duration_ms: duration.as_secs_f64() * 1000.0,
            result_count,
        });
        Some(duration)
    }

    /// Stops tracking an execution without recording it. Unknown tokens are
    /// ignored.
    pub fn abandon(&self, token: ExecutionToken) -> bool {
        self.state.lock().active.remove(&token).is_some()
    }

    /// Whether any execution of `query_id` is still running.
    pub fn is_active(&self, query_id: &str) -> bool {
        self.state.lock().active.values().any(|query| query.query_id == query_id)
    }

    pub fn active_queries(&self) -> Vec<ActiveQueryInfo> {
        let state = self.state.lock();
        let mut active: Vec<ActiveQueryInfo> = state
            .active
            .values()
            .map(|query| ActiveQueryInfo {
                query_id: query.query_id.clone(),
                description: query.description.clone(),
                started_at: query.started_at,
                elapsed_ms: query.started.elapsed().as_secs_f64() * 1000.0,
            })
            .collect();
        active.sort_by_key(|info| info.started_at);
        active
    }

    /// Slow queries, oldest first.
    pub fn slow_queries(&self) -> Vec<SlowQueryRecord> {
        self.state.lock().slow.iter().cloned().collect()
    }
}
