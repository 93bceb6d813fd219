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

//! Error taxonomy shared by every layer of the query pipeline.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueryError {
    /// A criterion violates one of its structural invariants.
    #[error("Invalid criteria: {0}")]
    InvalidCriteria(String),
    /// The query builder was used incorrectly.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
    /// A criterion tag, join type or plan operation is not recognised.
    #[error("Unsupported criterion kind: {0}")]
    UnsupportedKind(String),
    #[error("Index not found: {0}")]
    IndexNotFound(String),
    #[error("Missing collaborator: {0}")]
    MissingCollaborator(&'static str),
    #[error("Storage error: {0}")]
    Storage(String),
    /// Wraps any failure raised while planning or running a query.
    #[error("Query {query_id} failed: {source}")]
    Execution {
        query_id: String,
        #[source]
        source: Box<QueryError>,
    },
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl QueryError {
    pub fn invalid_criteria(message: impl Into<String>) -> Self {
        Self::InvalidCriteria(message.into())
    }

    pub fn invalid_query(message: impl Into<String>) -> Self {
        Self::InvalidQuery(message.into())
    }

    pub fn execution(query_id: impl Into<String>, source: QueryError) -> Self {
        Self::Execution {
            query_id: query_id.into(),
            source: Box::new(source),
        }
    }

    /// Returns the innermost error for wrapped execution failures.
    pub fn root_cause(&self) -> &QueryError {
        match self {
            Self::Execution { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, QueryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_error_wraps_cause() {
        let error = QueryError::execution("q-1", QueryError::IndexNotFound("spatial_index".to_string()));
        assert_eq!(error.to_string(), "Query q-1 failed: Index not found: spatial_index");
        assert!(matches!(error.root_cause(), QueryError::IndexNotFound(name) if name == "spatial_index"));
    }

    #[test]
    fn test_root_cause_of_plain_error_is_itself() {
        let error = QueryError::invalid_criteria("empty");
        assert!(matches!(error.root_cause(), QueryError::InvalidCriteria(_)));
    }
}
