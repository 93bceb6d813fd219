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
use serde_json::Value;
use std::collections::BTreeMap;
use tempora_common::{Node, Result};

use super::strategies::sort_nodes;

pub const META_EXECUTION_TIME_MS: &str = "execution_time_ms";
pub const META_RESULT_COUNT: &str = "result_count";
pub const META_PLAN_COST: &str = "plan_cost";
pub const META_PLAN_STEPS: &str = "plan_steps";
pub const META_OPTIMIZATIONS: &str = "optimizations";
pub const META_CACHE_HIT: &str = "cache_hit";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultPagination {
    pub total_items: usize,
    pub page_size: usize,
    /// One-based.
    pub current_page: usize,
}

impl ResultPagination {
    pub fn new(total_items: usize, page_size: usize, current_page: usize) -> Self {
        Self {
            total_items,
            page_size,
            current_page,
        }
    }

    /// Pagination for a window starting at `offset`.
    pub fn for_window(total_items: usize, page_size: usize, offset: usize) -> Self {
        let current_page = if page_size == 0 { 1 } else { offset / page_size + 1 };
        Self::new(total_items, page_size, current_page)
    }

    pub fn total_pages(&self) -> usize {
        if self.page_size == 0 { 0 } else { self.total_items.div_ceil(self.page_size) }
    }

    pub fn has_next(&self) -> bool {
        self.current_page < self.total_pages()
    }

    pub fn has_previous(&self) -> bool {
        self.current_page > 1
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub nodes: Vec<Node>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination: Option<ResultPagination>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl QueryResult {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self {
            nodes,
            pagination: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_pagination(mut self, pagination: ResultPagination) -> Self {
        self.pagination = Some(pagination);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Node> {
        self.nodes.iter()
    }

    pub fn metadata(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    pub fn is_cache_hit(&self) -> bool {
        self.metadata.get(META_CACHE_HIT).and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl IntoIterator for QueryResult {
    type Item = Node;
    type IntoIter = std::vec::IntoIter<Node>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.into_iter()
    }
}

/// Post-processing applied to a finished result.
pub struct ResultTransformer;

impl ResultTransformer {
    pub fn sort(mut result: QueryResult, field: &str, descending: bool) -> QueryResult {
        sort_nodes(&mut result.nodes, field, descending);
        result
    }

    pub fn filter(mut result: QueryResult, predicate: impl Fn(&Node) -> bool) -> QueryResult {
        result.nodes.retain(|node| predicate(node));
        Self::refresh_count(result)
    }

    pub fn map(mut result: QueryResult, transform: impl FnMut(Node) -> Node) -> QueryResult {
        result.nodes = result.nodes.into_iter().map(transform).collect();
        result
    }

    fn refresh_count(mut result: QueryResult) -> QueryResult {
        if result.metadata.contains_key(META_RESULT_COUNT) {
            result.metadata.insert(META_RESULT_COUNT.to_string(), Value::from(result.nodes.len()));
        }
        result
    }
}
