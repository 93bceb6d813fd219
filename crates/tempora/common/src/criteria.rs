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

//! Criteria model
//!
//! A [`Criterion`] is an immutable description of a predicate over nodes: a
//! temporal range, a spatial region, a content comparison, or a boolean
//! composition of other criteria. The enum variant is the single source of
//! truth for the kind; the `query_type` tag of the wire format is derived
//! from it on serialization and dispatched on during deserialization.
//!
//! Criteria are validated explicitly with [`Criterion::validate`], which walks
//! composites recursively and stops at the first violated invariant.

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use crate::error::{QueryError, Result};
use crate::node::{Node, Point};

/// Discriminant of a [`Criterion`], used as the wire tag and as the
/// statistics query type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CriterionKind {
    Temporal,
    Spatial,
    Content,
    Composite,
}

impl CriterionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CriterionKind::Temporal => "TEMPORAL",
            CriterionKind::Spatial => "SPATIAL",
            CriterionKind::Content => "CONTENT",
            CriterionKind::Composite => "COMPOSITE",
        }
    }
}

impl fmt::Display for CriterionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemporalCriteria {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
}

impl TemporalCriteria {
    pub fn new(start_time: Option<DateTime<Utc>>, end_time: Option<DateTime<Utc>>) -> Self {
        Self { start_time, end_time }
    }

    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self::new(Some(start), Some(end))
    }

    pub fn before(end: DateTime<Utc>) -> Self {
        Self::new(None, Some(end))
    }

    pub fn after(start: DateTime<Utc>) -> Self {
        Self::new(Some(start), None)
    }

    pub fn validate(&self) -> Result<()> {
        match (self.start_time, self.end_time) {
            (None, None) => Err(QueryError::invalid_criteria("temporal criteria requires at least one of start_time or end_time")),
            (Some(start), Some(end)) if start > end => Err(QueryError::invalid_criteria(format!(
                "temporal start_time {} is after end_time {}",
                start.to_rfc3339(),
                end.to_rfc3339()
            ))),
            _ => Ok(()),
        }
    }

    /// Length of the range; `None` when either bound is open.
    pub fn duration(&self) -> Option<Duration> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }

    pub fn matches(&self, node: &Node) -> bool {
        let Some(timestamp) = node.timestamp else {
            return false;
        };
        self.start_time.is_none_or(|start| timestamp >= start) && self.end_time.is_none_or(|end| timestamp <= end)
    }
}

/// A fully specified spatial region.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Region {
    Box { min: Point, max: Point },
    Circle { center: Point, radius: f64 },
}

impl Region {
    pub fn area(&self) -> f64 {
        match self {
            Region::Box { min, max } => (max.x - min.x) * (max.y - min.y),
            Region::Circle { radius, .. } => std::f64::consts::PI * radius * radius,
        }
    }

    pub fn contains(&self, point: &Point) -> bool {
        match self {
            Region::Box { min, max } => point.x >= min.x && point.x <= max.x && point.y >= min.y && point.y <= max.y,
            Region::Circle { center, radius } => center.distance_to(point) <= *radius,
        }
    }
}

/// Spatial predicate as it appears on the wire.
///
/// Fields are optional so that partially specified documents can be
/// represented and rejected by [`SpatialCriteria::validate`]. Exactly one of
/// the bounding box (`min_x`, `min_y`, `max_x`, `max_y`) or the circle
/// (`center_x`, `center_y`, `radius`) must be fully present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpatialCriteria {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub center_x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub center_y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radius: Option<f64>,
}

impl SpatialCriteria {
    pub fn rectangle(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x: Some(min_x),
            min_y: Some(min_y),
            max_x: Some(max_x),
            max_y: Some(max_y),
            ..Self::default()
        }
    }

    pub fn circle(center_x: f64, center_y: f64, radius: f64) -> Self {
        Self {
            center_x: Some(center_x),
            center_y: Some(center_y),
            radius: Some(radius),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        let box_fields = [self.min_x, self.min_y, self.max_x, self.max_y];
        let circle_fields = [self.center_x, self.center_y, self.radius];
        let box_set = box_fields.iter().filter(|field| field.is_some()).count();
        let circle_set = circle_fields.iter().filter(|field| field.is_some()).count();

        if box_set != 0 && box_set != box_fields.len() {
            return Err(QueryError::invalid_criteria("partial bounding box: min_x, min_y, max_x and max_y are all required"));
        }
        if circle_set != 0 && circle_set != circle_fields.len() {
            return Err(QueryError::invalid_criteria("partial circle: center_x, center_y and radius are all required"));
        }

        match (box_set > 0, circle_set > 0) {
            (false, false) => Err(QueryError::invalid_criteria("spatial criteria requires a bounding box or a circle")),
            (true, true) => Err(QueryError::invalid_criteria("spatial criteria cannot specify both a bounding box and a circle")),
            (true, false) => {
                if box_fields.iter().flatten().any(|value| !value.is_finite()) {
                    return Err(QueryError::invalid_criteria("bounding box coordinates must be finite"));
                }
                match self.region() {
                    Some(Region::Box { min, max }) if min.x <= max.x && min.y <= max.y => Ok(()),
                    _ => Err(QueryError::invalid_criteria("bounding box requires min_x <= max_x and min_y <= max_y")),
                }
            }
            (false, true) => {
                if circle_fields.iter().flatten().any(|value| !value.is_finite()) {
                    return Err(QueryError::invalid_criteria("circle parameters must be finite"));
                }
                match self.radius {
                    Some(radius) if radius > 0.0 => Ok(()),
                    _ => Err(QueryError::invalid_criteria("circle radius must be greater than zero")),
                }
            }
        }
    }

    /// The typed region, or `None` while the criteria is not fully specified.
    pub fn region(&self) -> Option<Region> {
        if let (Some(min_x), Some(min_y), Some(max_x), Some(max_y)) = (self.min_x, self.min_y, self.max_x, self.max_y) {
            return Some(Region::Box {
                min: Point::new(min_x, min_y),
                max: Point::new(max_x, max_y),
            });
        }
        if let (Some(center_x), Some(center_y), Some(radius)) = (self.center_x, self.center_y, self.radius) {
            return Some(Region::Circle {
                center: Point::new(center_x, center_y),
                radius,
            });
        }
        None
    }

    pub fn is_circle(&self) -> bool {
        matches!(self.region(), Some(Region::Circle { .. }))
    }

    pub fn matches(&self, node: &Node) -> bool {
        match (self.region(), node.position) {
            (Some(region), Some(position)) => region.contains(&position),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContentOperator {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "LIKE")]
    Like,
    #[serde(rename = "IN")]
    In,
    #[serde(rename = "CONTAINS")]
    Contains,
}

impl ContentOperator {
    pub fn symbol(&self) -> &'static str {
        match self {
            ContentOperator::Eq => "=",
            ContentOperator::Gt => ">",
            ContentOperator::Lt => "<",
            ContentOperator::Ge => ">=",
            ContentOperator::Le => "<=",
            ContentOperator::Ne => "!=",
            ContentOperator::Like => "LIKE",
            ContentOperator::In => "IN",
            ContentOperator::Contains => "CONTAINS",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentCriteria {
    pub field: String,
    pub operator: ContentOperator,
    #[serde(default)]
    pub value: Value,
}

impl ContentCriteria {
    pub fn new(field: impl Into<String>, operator: ContentOperator, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.field.trim().is_empty() {
            return Err(QueryError::invalid_criteria("content criteria requires a field name"));
        }
        match self.operator {
            ContentOperator::In if !self.value.is_array() => Err(QueryError::invalid_criteria(format!("IN on field `{}` requires a list value", self.field))),
            ContentOperator::Like if !self.value.is_string() => Err(QueryError::invalid_criteria(format!("LIKE on field `{}` requires a string pattern", self.field))),
            _ => Ok(()),
        }
    }

    pub fn matches(&self, node: &Node) -> bool {
        let Some(actual) = node.field(&self.field) else {
            return false;
        };

        match self.operator {
            ContentOperator::Eq => values_equal(&actual, &self.value),
            ContentOperator::Ne => !values_equal(&actual, &self.value),
            ContentOperator::Gt => compare_values(&actual, &self.value) == Some(Ordering::Greater),
            ContentOperator::Lt => compare_values(&actual, &self.value) == Some(Ordering::Less),
            ContentOperator::Ge => matches!(compare_values(&actual, &self.value), Some(Ordering::Greater | Ordering::Equal)),
            ContentOperator::Le => matches!(compare_values(&actual, &self.value), Some(Ordering::Less | Ordering::Equal)),
            ContentOperator::Like => match (&actual, &self.value) {
                (Value::String(text), Value::String(pattern)) => like_matches(text, pattern),
                _ => false,
            },
            ContentOperator::In => match &self.value {
                Value::Array(candidates) => candidates.iter().any(|candidate| values_equal(&actual, candidate)),
                _ => false,
            },
            ContentOperator::Contains => match (&actual, &self.value) {
                (Value::String(text), Value::String(needle)) => text.contains(needle.as_str()),
                (Value::Array(items), needle) => items.iter().any(|item| values_equal(item, needle)),
                _ => false,
            },
        }
    }
}

/// Orders two JSON scalars of the same family; mixed families are unordered.
pub fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    compare_values(left, right) == Some(Ordering::Equal) || left == right
}

/// Compiled `LIKE` patterns, shared across criteria and filter passes.
static LIKE_PATTERNS: LazyLock<RwLock<HashMap<String, Regex>>> = LazyLock::new(|| RwLock::new(HashMap::new()));
const MAX_CACHED_LIKE_PATTERNS: usize = 256;

fn like_matches(text: &str, pattern: &str) -> bool {
    like_regex(pattern).is_some_and(|re| re.is_match(text))
}

fn like_regex(pattern: &str) -> Option<Regex> {
    if let Some(re) = LIKE_PATTERNS.read().get(pattern) {
        return Some(re.clone());
    }

    let re = Regex::new(&like_expression(pattern)).ok()?;
    let mut patterns = LIKE_PATTERNS.write();
    if patterns.len() >= MAX_CACHED_LIKE_PATTERNS {
        patterns.clear();
    }
    patterns.insert(pattern.to_string(), re.clone());
    Some(re)
}

/// Anchored expression for a SQL pattern: `%` is any run, `_` one character.
fn like_expression(pattern: &str) -> String {
    let mut expression = String::from("(?s)^");
    let mut literal = String::new();
    for ch in pattern.chars() {
        match ch {
            '%' | '_' => {
                expression.push_str(&regex::escape(&literal));
                literal.clear();
                expression.push_str(if ch == '%' { ".*" } else { "." });
            }
            _ => literal.push(ch),
        }
    }
    expression.push_str(&regex::escape(&literal));
    expression.push('$');
    expression
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogicalOperator {
    And,
    Or,
    Not,
}

impl LogicalOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogicalOperator::And => "AND",
            LogicalOperator::Or => "OR",
            LogicalOperator::Not => "NOT",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompositeCriteria {
    pub operator: LogicalOperator,
    #[serde(rename = "criteria")]
    pub children: Vec<Criterion>,
}

impl CompositeCriteria {
    pub fn new(operator: LogicalOperator, children: Vec<Criterion>) -> Self {
        Self { operator, children }
    }

    pub fn validate(&self) -> Result<()> {
        match self.operator {
            LogicalOperator::Not if self.children.len() != 1 => {
                return Err(QueryError::invalid_criteria(format!("NOT requires exactly one child, found {}", self.children.len())));
            }
            LogicalOperator::And | LogicalOperator::Or if self.children.is_empty() => {
                return Err(QueryError::invalid_criteria(format!("{} requires at least one child", self.operator.as_str())));
            }
            _ => {}
        }
        self.children.iter().try_for_each(Criterion::validate)
    }

    pub fn matches(&self, node: &Node) -> bool {
        match self.operator {
            LogicalOperator::And => self.children.iter().all(|child| child.matches(node)),
            LogicalOperator::Or => self.children.iter().any(|child| child.matches(node)),
            LogicalOperator::Not => !self.children.iter().any(|child| child.matches(node)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "query_type", rename_all = "UPPERCASE")]
pub enum Criterion {
    Temporal(TemporalCriteria),
    Spatial(SpatialCriteria),
    Content(ContentCriteria),
    Composite(CompositeCriteria),
}

impl Criterion {
    pub fn and(children: Vec<Criterion>) -> Self {
        Criterion::Composite(CompositeCriteria::new(LogicalOperator::And, children))
    }

    pub fn or(children: Vec<Criterion>) -> Self {
        Criterion::Composite(CompositeCriteria::new(LogicalOperator::Or, children))
    }

    pub fn negate(child: Criterion) -> Self {
        Criterion::Composite(CompositeCriteria::new(LogicalOperator::Not, vec![child]))
    }

    pub fn kind(&self) -> CriterionKind {
        match self {
            Criterion::Temporal(_) => CriterionKind::Temporal,
            Criterion::Spatial(_) => CriterionKind::Spatial,
            Criterion::Content(_) => CriterionKind::Content,
            Criterion::Composite(_) => CriterionKind::Composite,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            Criterion::Temporal(temporal) => temporal.validate(),
            Criterion::Spatial(spatial) => spatial.validate(),
            Criterion::Content(content) => content.validate(),
            Criterion::Composite(composite) => composite.validate(),
        }
    }

    pub fn matches(&self, node: &Node) -> bool {
        match self {
            Criterion::Temporal(temporal) => temporal.matches(node),
            Criterion::Spatial(spatial) => spatial.matches(node),
            Criterion::Content(content) => content.matches(node),
            Criterion::Composite(composite) => composite.matches(node),
        }
    }

    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    /// Rebuilds a criterion from its structured form, dispatching on the
    /// `query_type` tag at every level of nesting.
    pub fn from_value(value: Value) -> Result<Self> {
        let kind = value
            .get("query_type")
            .and_then(Value::as_str)
            .ok_or_else(|| QueryError::UnsupportedKind("missing query_type tag".to_string()))?
            .to_string();

        match kind.as_str() {
            "TEMPORAL" => Ok(Criterion::Temporal(serde_json::from_value(value)?)),
            "SPATIAL" => Ok(Criterion::Spatial(serde_json::from_value(value)?)),
            "CONTENT" => Ok(Criterion::Content(serde_json::from_value(value)?)),
            "COMPOSITE" => {
                let Value::Object(mut fields) = value else {
                    return Err(QueryError::invalid_criteria("composite criteria must be an object"));
                };
                let operator: LogicalOperator = serde_json::from_value(fields.remove("operator").unwrap_or(Value::Null))?;
                let children = match fields.remove("criteria") {
                    None | Some(Value::Null) => Vec::new(),
                    Some(Value::Array(items)) => items.into_iter().map(Criterion::from_value).collect::<Result<Vec<_>>>()?,
                    Some(_) => return Err(QueryError::invalid_criteria("composite criteria must be a list")),
                };
                Ok(Criterion::Composite(CompositeCriteria::new(operator, children)))
            }
            other => Err(QueryError::UnsupportedKind(other.to_string())),
        }
    }
}

impl<'de> Deserialize<'de> for Criterion {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Criterion::from_value(value).map_err(serde::de::Error::custom)
    }
}

impl From<TemporalCriteria> for Criterion {
    fn from(value: TemporalCriteria) -> Self {
        Criterion::Temporal(value)
    }
}

impl From<SpatialCriteria> for Criterion {
    fn from(value: SpatialCriteria) -> Self {
        Criterion::Spatial(value)
    }
}

impl From<ContentCriteria> for Criterion {
    fn from(value: ContentCriteria) -> Self {
        Criterion::Content(value)
    }
}
