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

//! Collaborator interfaces consumed by the query layer.
//!
//! The physical node store and its temporal/spatial indexes live outside the
//! query layer. They are reached only through [`NodeStore`], [`IndexManager`]
//! and [`Index`]. The in-memory implementations below back tests and
//! embedded use.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::criteria::Criterion;
use crate::error::Result;
use crate::node::Node;

pub trait NodeStore: Send + Sync {
    fn get_all_nodes(&self) -> Result<Vec<Node>>;
}

pub trait Index: Send + Sync {
    /// Returns the indexed nodes satisfying `criteria`.
    fn query(&self, criteria: &Criterion) -> Result<Vec<Node>>;
}

pub trait IndexManager: Send + Sync {
    fn has_index(&self, name: &str) -> bool;
    fn get_index(&self, name: &str) -> Option<Arc<dyn Index>>;
}

#[derive(Debug, Default)]
pub struct InMemoryNodeStore {
    nodes: RwLock<Vec<Node>>,
}

impl InMemoryNodeStore {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self { nodes: RwLock::new(nodes) }
    }

    pub fn insert(&self, node: Node) {
        self.nodes.write().push(node);
    }

    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }
}

impl NodeStore for InMemoryNodeStore {
    fn get_all_nodes(&self) -> Result<Vec<Node>> {
        Ok(self.nodes.read().clone())
    }
}

/// Index that answers by scanning a shared node store.
///
/// Stands in for a real temporal or spatial index wherever only the lookup
/// contract matters.
pub struct ScanIndex {
    store: Arc<dyn NodeStore>,
}

impl ScanIndex {
    pub fn new(store: Arc<dyn NodeStore>) -> Self {
        Self { store }
    }
}

impl Index for ScanIndex {
    fn query(&self, criteria: &Criterion) -> Result<Vec<Node>> {
        Ok(self.store.get_all_nodes()?.into_iter().filter(|node| criteria.matches(node)).collect())
    }
}

#[derive(Default)]
pub struct InMemoryIndexManager {
    indexes: RwLock<HashMap<String, Arc<dyn Index>>>,
}

impl InMemoryIndexManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: impl Into<String>, index: Arc<dyn Index>) {
        self.indexes.write().insert(name.into(), index);
    }

    pub fn remove(&self, name: &str) -> Option<Arc<dyn Index>> {
        self.indexes.write().remove(name)
    }
}

impl IndexManager for InMemoryIndexManager {
    fn has_index(&self, name: &str) -> bool {
        self.indexes.read().contains_key(name)
    }

    fn get_index(&self, name: &str) -> Option<Arc<dyn Index>> {
        self.indexes.read().get(name).cloned()
    }
}
