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

//! Fluent query construction.
//!
//! Typed builders set a single criterion from one terminal call, the last
//! call winning. The generic [`QueryBuilder`] combines criteria with
//! `and_`/`or_`/`not_`, and [`CompoundQueryBuilder`] ANDs together whatever
//! its typed sub-builders produced.
//!
//! ```ignore
//! let query = temporal_query().between(start, end).limit(10)?.build()?;
//! ```

use chrono::{DateTime, Utc};
use serde_json::Value;
use tempora_common::{CompositeCriteria, ContentCriteria, ContentOperator, Criterion, LogicalOperator, QueryError, Result, SpatialCriteria, TemporalCriteria};

use super::model::Query;

pub fn query() -> QueryBuilder {
    QueryBuilder::default()
}

pub fn temporal_query() -> TemporalQueryBuilder {
    TemporalQueryBuilder::default()
}

pub fn spatial_query() -> SpatialQueryBuilder {
    SpatialQueryBuilder::default()
}

pub fn content_query() -> ContentQueryBuilder {
    ContentQueryBuilder::default()
}

pub fn compound_query() -> CompoundQueryBuilder {
    CompoundQueryBuilder::default()
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Pagination {
    limit: Option<usize>,
    offset: Option<usize>,
}

impl Pagination {
    fn with_limit(self, limit: usize) -> Result<Self> {
        if limit == 0 {
            return Err(QueryError::invalid_query("limit must be greater than zero"));
        }
        Ok(Self { limit: Some(limit), ..self })
    }

    fn with_offset(self, offset: usize) -> Self {
        Self { offset: Some(offset), ..self }
    }

    fn finish(self, criterion: Option<Criterion>) -> Result<Query> {
        let criterion = criterion.ok_or_else(|| QueryError::invalid_query("no criteria specified"))?;
        criterion.validate()?;

        let mut query = Query::new(criterion);
        query.limit = self.limit;
        query.offset = self.offset;
        Ok(query)
    }
}

/// Folds `other` into `current` under `operator`. A current composite with
/// the same operator absorbs `other` instead of being nested.
fn combine(current: Option<Criterion>, operator: LogicalOperator, other: Criterion) -> Criterion {
    match current {
        None => other,
        Some(Criterion::Composite(composite)) if composite.operator == operator => {
            let mut children = composite.children;
            children.push(other);
            Criterion::Composite(CompositeCriteria::new(operator, children))
        }
        Some(existing) => Criterion::Composite(CompositeCriteria::new(operator, vec![existing, other])),
    }
}

macro_rules! pagination_methods {
    () => {
        /// Fails immediately when `limit` is zero.
        pub fn limit(mut self, limit: usize) -> Result<Self> {
            self.pagination = self.pagination.with_limit(limit)?;
            Ok(self)
        }

        pub fn offset(mut self, offset: usize) -> Self {
            self.pagination = self.pagination.with_offset(offset);
            self
        }

        pub fn criterion(&self) -> Option<&Criterion> {
            self.criterion.as_ref()
        }

        pub fn build(self) -> Result<Query> {
            self.pagination.finish(self.criterion)
        }
    };
}

#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    criterion: Option<Criterion>,
    pagination: Pagination,
}

impl QueryBuilder {
    pub fn where_(mut self, criterion: impl Into<Criterion>) -> Self {
        self.criterion = Some(criterion.into());
        self
    }

    pub fn and_(mut self, criterion: impl Into<Criterion>) -> Self {
        self.criterion = Some(combine(self.criterion.take(), LogicalOperator::And, criterion.into()));
        self
    }

    pub fn or_(mut self, criterion: impl Into<Criterion>) -> Self {
        self.criterion = Some(combine(self.criterion.take(), LogicalOperator::Or, criterion.into()));
        self
    }

    /// Negates everything set so far.
    pub fn not_(mut self) -> Result<Self> {
        let current = self.criterion.take().ok_or_else(|| QueryError::invalid_query("cannot negate an empty query"))?;
        self.criterion = Some(Criterion::negate(current));
        Ok(self)
    }

    pagination_methods!();
}

#[derive(Debug, Clone, Default)]
pub struct TemporalQueryBuilder {
    criterion: Option<Criterion>,
    pagination: Pagination,
}

impl TemporalQueryBuilder {
    pub fn before(mut self, end: DateTime<Utc>) -> Self {
        self.criterion = Some(TemporalCriteria::before(end).into());
        self
    }

    pub fn after(mut self, start: DateTime<Utc>) -> Self {
        self.criterion = Some(TemporalCriteria::after(start).into());
        self
    }

    pub fn between(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.criterion = Some(TemporalCriteria::between(start, end).into());
        self
    }

    pagination_methods!();
}

#[derive(Debug, Clone, Default)]
pub struct SpatialQueryBuilder {
    criterion: Option<Criterion>,
    pagination: Pagination,
}

impl SpatialQueryBuilder {
    pub fn within_rectangle(mut self, min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        self.criterion = Some(SpatialCriteria::rectangle(min_x, min_y, max_x, max_y).into());
        self
    }

    pub fn near(mut self, x: f64, y: f64, radius: f64) -> Self {
        self.criterion = Some(SpatialCriteria::circle(x, y, radius).into());
        self
    }

    pagination_methods!();
}

#[derive(Debug, Clone, Default)]
pub struct ContentQueryBuilder {
    criterion: Option<Criterion>,
    pagination: Pagination,
}

impl ContentQueryBuilder {
    fn compare(mut self, field: impl Into<String>, operator: ContentOperator, value: impl Into<Value>) -> Self {
        self.criterion = Some(ContentCriteria::new(field, operator, value).into());
        self
    }

    pub fn equals(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.compare(field, ContentOperator::Eq, value)
    }

    pub fn not_equals(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.compare(field, ContentOperator::Ne, value)
    }

    pub fn greater_than(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.compare(field, ContentOperator::Gt, value)
    }

    pub fn greater_or_equal(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.compare(field, ContentOperator::Ge, value)
    }

    pub fn less_than(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.compare(field, ContentOperator::Lt, value)
    }

    pub fn less_or_equal(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.compare(field, ContentOperator::Le, value)
    }

    /// SQL-style pattern: `%` matches any run, `_` a single character.
    pub fn like(self, field: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.compare(field, ContentOperator::Like, Value::String(pattern.into()))
    }

    pub fn in_list<V: Into<Value>>(self, field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        self.compare(field, ContentOperator::In, Value::Array(values))
    }

    pub fn contains(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.compare(field, ContentOperator::Contains, value)
    }

    pagination_methods!();
}

/// Collects criteria from independent sub-builders and ANDs them on build.
#[derive(Debug, Clone, Default)]
pub struct CompoundQueryBuilder {
    temporal: TemporalQueryBuilder,
    spatial: SpatialQueryBuilder,
    content: ContentQueryBuilder,
    generic: QueryBuilder,
    pagination: Pagination,
}

impl CompoundQueryBuilder {
    pub fn temporal(mut self, configure: impl FnOnce(TemporalQueryBuilder) -> TemporalQueryBuilder) -> Self {
        self.temporal = configure(self.temporal);
        self
    }

    pub fn spatial(mut self, configure: impl FnOnce(SpatialQueryBuilder) -> SpatialQueryBuilder) -> Self {
        self.spatial = configure(self.spatial);
        self
    }

    pub fn content(mut self, configure: impl FnOnce(ContentQueryBuilder) -> ContentQueryBuilder) -> Self {
        self.content = configure(self.content);
        self
    }

    pub fn generic(mut self, configure: impl FnOnce(QueryBuilder) -> Result<QueryBuilder>) -> Result<Self> {
        self.generic = configure(self.generic)?;
        Ok(self)
    }

    pub fn limit(mut self, limit: usize) -> Result<Self> {
        self.pagination = self.pagination.with_limit(limit)?;
        Ok(self)
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.pagination = self.pagination.with_offset(offset);
        self
    }

    pub fn build(self) -> Result<Query> {
        let mut parts: Vec<Criterion> = [self.temporal.criterion, self.spatial.criterion, self.content.criterion, self.generic.criterion].into_iter().flatten().collect();

        let criterion = match parts.len() {
            0 => None,
            1 => parts.pop(),
            _ => Some(Criterion::and(parts)),
        };
        self.pagination.finish(criterion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use tempora_common::CriterionKind;

    fn t(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_temporal_between_with_limit() {
        let query = temporal_query().between(t(1), t(2)).limit(10).unwrap().build().unwrap();

        assert_eq!(query.criteria.kind(), CriterionKind::Temporal);
        let Criterion::Temporal(temporal) = &query.criteria else {
            panic!("expected temporal criteria");
        };
        assert_eq!(temporal.start_time, Some(t(1)));
        assert_eq!(temporal.end_time, Some(t(2)));
        assert_eq!(query.limit, Some(10));
        assert_eq!(query.offset, None);
    }

    #[test]
    fn test_last_terminal_call_wins() {
        let query = spatial_query().within_rectangle(0.0, 0.0, 1.0, 1.0).near(5.0, 5.0, 2.0).build().unwrap();
        assert_eq!(query.criteria, Criterion::Spatial(SpatialCriteria::circle(5.0, 5.0, 2.0)));

        let query = content_query().equals("kind", "a").greater_than("level", 3).build().unwrap();
        assert_eq!(query.criteria, Criterion::Content(ContentCriteria::new("level", ContentOperator::Gt, 3)));
    }

    #[test]
    fn test_and_flattens_into_existing_composite() {
        let a = Criterion::from(ContentCriteria::new("a", ContentOperator::Eq, 1));
        let b = Criterion::from(ContentCriteria::new("b", ContentOperator::Eq, 2));
        let c = Criterion::from(ContentCriteria::new("c", ContentOperator::Eq, 3));

        let query = query().where_(a.clone()).and_(b.clone()).and_(c.clone()).build().unwrap();
        assert_eq!(query.criteria, Criterion::and(vec![a.clone(), b.clone(), c.clone()]));

        let mixed = super::query().where_(a.clone()).and_(b.clone()).or_(c.clone()).build().unwrap();
        assert_eq!(mixed.criteria, Criterion::or(vec![Criterion::and(vec![a, b]), c]));
    }

    #[test]
    fn test_and_on_empty_builder_sets_criterion() {
        let a = Criterion::from(ContentCriteria::new("a", ContentOperator::Eq, 1));
        let query = query().and_(a.clone()).build().unwrap();
        assert_eq!(query.criteria, a);
    }

    #[test]
    fn test_not_wraps_entire_criterion() {
        let a = Criterion::from(ContentCriteria::new("a", ContentOperator::Eq, 1));
        let b = Criterion::from(ContentCriteria::new("b", ContentOperator::Eq, 2));

        let query = query().where_(a.clone()).or_(b.clone()).not_().unwrap().build().unwrap();
        assert_eq!(query.criteria, Criterion::negate(Criterion::or(vec![a, b])));
    }

    #[test]
    fn test_builder_misuse_fails_fast() {
        assert!(matches!(super::query().not_(), Err(QueryError::InvalidQuery(_))));
        assert!(matches!(temporal_query().limit(0), Err(QueryError::InvalidQuery(_))));
        assert!(matches!(content_query().build(), Err(QueryError::InvalidQuery(_))));
        assert!(matches!(compound_query().build(), Err(QueryError::InvalidQuery(_))));
    }

    #[test]
    fn test_build_validates_criteria() {
        let result = temporal_query().between(t(2), t(1)).build();
        assert!(matches!(result, Err(QueryError::InvalidCriteria(_))));

        let result = spatial_query().near(0.0, 0.0, 0.0).build();
        assert!(matches!(result, Err(QueryError::InvalidCriteria(_))));
    }

    #[test]
    fn test_content_operators() {
        let query = content_query().in_list("zone", ["a", "b"]).offset(4).build().unwrap();
        assert_eq!(query.criteria, Criterion::Content(ContentCriteria::new("zone", ContentOperator::In, json!(["a", "b"]))));
        assert_eq!(query.offset, Some(4));

        let query = content_query().like("name", "sen%").build().unwrap();
        assert_eq!(query.criteria, Criterion::Content(ContentCriteria::new("name", ContentOperator::Like, "sen%")));
    }

    #[test]
    fn test_compound_single_part_is_not_wrapped() {
        let query = compound_query().temporal(|q| q.after(t(1))).build().unwrap();
        assert_eq!(query.criteria, Criterion::Temporal(TemporalCriteria::after(t(1))));
    }

    #[test]
    fn test_compound_ands_all_parts() {
        let query = compound_query()
            .temporal(|q| q.between(t(1), t(5)))
            .spatial(|q| q.within_rectangle(0.0, 0.0, 10.0, 10.0))
            .content(|q| q.equals("kind", "sensor"))
            .limit(20)
            .unwrap()
            .build()
            .unwrap();

        let Criterion::Composite(composite) = &query.criteria else {
            panic!("expected composite criteria");
        };
        assert_eq!(composite.operator, LogicalOperator::And);
        let kinds: Vec<_> = composite.children.iter().map(Criterion::kind).collect();
        assert_eq!(kinds, vec![CriterionKind::Temporal, CriterionKind::Spatial, CriterionKind::Content]);
        assert_eq!(query.limit, Some(20));
    }

    #[test]
    fn test_compound_generic_part() {
        let query = compound_query()
            .content(|q| q.equals("kind", "sensor"))
            .generic(|q| q.where_(ContentCriteria::new("level", ContentOperator::Ge, 2)).not_())
            .unwrap()
            .build()
            .unwrap();

        let Criterion::Composite(composite) = &query.criteria else {
            panic!("expected composite criteria");
        };
        assert_eq!(composite.children.len(), 2);
        assert_eq!(composite.children[1].kind(), CriterionKind::Composite);
    }

    #[test]
    fn test_reused_builder_is_not_aliased() {
        let a = Criterion::from(ContentCriteria::new("a", ContentOperator::Eq, 1));
        let b = Criterion::from(ContentCriteria::new("b", ContentOperator::Eq, 2));
        let c = Criterion::from(ContentCriteria::new("c", ContentOperator::Eq, 3));

        let base = query().where_(a.clone()).and_(b.clone());
        let first = base.clone().and_(c.clone()).build().unwrap();
        let second = base.build().unwrap();

        assert_eq!(first.criteria, Criterion::and(vec![a.clone(), b.clone(), c]));
        assert_eq!(second.criteria, Criterion::and(vec![a, b]));
    }
}
