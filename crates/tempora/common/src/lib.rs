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

//! # Tempora Common
//!
//! Shared vocabulary of the Tempora query layer: the opaque node record, the
//! criteria model, the error taxonomy, and the collaborator traits through
//! which the query engine reaches node storage and indexes.

pub mod criteria;
pub mod error;
pub mod logging;
pub mod node;
pub mod store;

pub use criteria::{CompositeCriteria, ContentCriteria, ContentOperator, Criterion, CriterionKind, LogicalOperator, Region, SpatialCriteria, TemporalCriteria};
pub use error::{QueryError, Result};
pub use logging::init_logging;
pub use node::{Node, NodeId, Point};
pub use store::{InMemoryIndexManager, InMemoryNodeStore, Index, IndexManager, NodeStore, ScanIndex};
