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
use serde_json::{Value, json};
use tempora_common::{Criterion, QueryError, Result};
use uuid::Uuid;

/// A query as submitted to the engine.
///
/// On the wire: `{query_id, criteria: {query_type, ...}, limit?, offset?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    #[serde(rename = "query_id")]
    pub id: String,
    pub criteria: Criterion,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
}

impl Query {
    pub fn new(criteria: Criterion) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            criteria,
            limit: None,
            offset: None,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Canonical string form of everything but the id. Two queries with the
    /// same key share cached plans and results.
    pub fn cache_key(&self) -> Result<String> {
        let key = json!({
            "criteria": self.criteria.to_value()?,
            "limit": self.limit,
            "offset": self.offset,
        });
        Ok(key.to_string())
    }

    pub fn describe(&self) -> String {
        let mut description = format!("{} query", self.criteria.kind());
        if let Some(limit) = self.limit {
            description.push_str(&format!(" limit={limit}"));
        }
        if let Some(offset) = self.offset {
            description.push_str(&format!(" offset={offset}"));
        }
        description
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parses and checks a query document. Unknown criterion tags at any
    /// depth are reported as [`QueryError::UnsupportedKind`].
    pub fn from_json(json: &str) -> Result<Self> {
        let document: QueryDocument = serde_json::from_str(json)?;
        let query = Self {
            id: document.query_id,
            criteria: Criterion::from_value(document.criteria)?,
            limit: document.limit,
            offset: document.offset,
        };
        query.validate_pagination()?;
        Ok(query)
    }

    /// Checks the criteria and that `limit`, when present, is positive.
    pub fn validate(&self) -> Result<()> {
        self.criteria.validate()?;
        self.validate_pagination()
    }

    fn validate_pagination(&self) -> Result<()> {
        match self.limit {
            Some(0) => Err(QueryError::invalid_query("limit must be a positive integer")),
            _ => Ok(()),
        }
    }
}

#[derive(Deserialize)]
struct QueryDocument {
    query_id: String,
    criteria: Value,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    offset: Option<usize>,
}
