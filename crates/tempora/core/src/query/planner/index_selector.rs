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

use tempora_common::{Criterion, IndexManager, LogicalOperator, Region, SpatialCriteria, TemporalCriteria};

use crate::query::optimizer::OptimizerConfig;

pub const MIN_SELECTIVITY: f64 = 0.01;
pub const HALF_OPEN_RANGE_SELECTIVITY: f64 = 0.5;

/// Leaves of a criterion reachable through nested `AND`s.
pub fn conjuncts(criterion: &Criterion) -> Vec<&Criterion> {
    match criterion {
        Criterion::Composite(composite) if composite.operator == LogicalOperator::And => composite.children.iter().flat_map(conjuncts).collect(),
        other => vec![other],
    }
}

/// Conjuncts split by the index that could serve them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CriteriaProfile {
    pub spatial: Option<SpatialCriteria>,
    pub temporal: Option<TemporalCriteria>,
    pub other: Vec<Criterion>,
}

impl CriteriaProfile {
    /// Only the first spatial and first temporal conjunct are index
    /// candidates. Further ones, and any `OR`/`NOT` composite, land in
    /// `other`.
    pub fn classify(criterion: &Criterion) -> Self {
        let mut profile = Self::default();
        for conjunct in conjuncts(criterion) {
            match conjunct {
                Criterion::Spatial(spatial) if profile.spatial.is_none() => profile.spatial = Some(spatial.clone()),
                Criterion::Temporal(temporal) if profile.temporal.is_none() => profile.temporal = Some(temporal.clone()),
                other => profile.other.push(other.clone()),
            }
        }
        profile
    }
}

fn clamp_selectivity(selectivity: f64) -> f64 {
    if selectivity.is_nan() { 1.0 } else { selectivity.clamp(MIN_SELECTIVITY, 1.0) }
}

fn matches_for(collection_size: usize, selectivity: f64) -> usize {
    ((collection_size as f64 * selectivity).round() as usize).min(collection_size)
}

/// Fraction of the assumed total area covered by the region.
pub fn spatial_selectivity(criteria: &SpatialCriteria, config: &OptimizerConfig) -> f64 {
    match criteria.region() {
        Some(region) => clamp_selectivity(region.area() / config.total_spatial_area),
        None => 1.0,
    }
}

/// Fraction of the assumed total time span covered by the range.
pub fn temporal_selectivity(criteria: &TemporalCriteria, config: &OptimizerConfig) -> f64 {
    match criteria.duration() {
        Some(duration) => clamp_selectivity(duration.num_milliseconds() as f64 / 1000.0 / config.total_temporal_span_secs),
        None => HALF_OPEN_RANGE_SELECTIVITY,
    }
}

/// `per_criterion_selectivity ^ count`, floored.
pub fn residual_selectivity(criteria_count: usize, config: &OptimizerConfig) -> f64 {
    config.per_criterion_selectivity.powi(criteria_count as i32).max(MIN_SELECTIVITY)
}

fn spatial_matches(criteria: &SpatialCriteria, collection_size: usize, limit_hint: Option<usize>, config: &OptimizerConfig) -> usize {
    match (criteria.region(), limit_hint) {
        (Some(Region::Circle { .. }), Some(limit)) => limit.min(collection_size),
        _ => matches_for(collection_size, spatial_selectivity(criteria, config)),
    }
}

fn spatial_fraction(criteria: &SpatialCriteria, collection_size: usize, limit_hint: Option<usize>, config: &OptimizerConfig) -> f64 {
    match (criteria.region(), limit_hint) {
        (Some(Region::Circle { .. }), Some(limit)) if collection_size > 0 => limit.min(collection_size) as f64 / collection_size as f64,
        _ => spatial_selectivity(criteria, config),
    }
}

fn combined_matches(spatial: &SpatialCriteria, temporal: &TemporalCriteria, collection_size: usize, limit_hint: Option<usize>, config: &OptimizerConfig) -> usize {
    let selectivity = spatial_fraction(spatial, collection_size, limit_hint, config) * temporal_selectivity(temporal, config) * config.correlation_factor;
    matches_for(collection_size, selectivity.min(1.0))
}

/// Estimated node count an index returns for `criteria`.
///
/// Understands a spatial leaf, a temporal leaf, and the spatial/temporal
/// pair sent to a combined index. Anything else is assumed to match the
/// whole collection.
pub fn estimate_index_matches(criteria: &Criterion, collection_size: usize, limit_hint: Option<usize>, config: &OptimizerConfig) -> usize {
    match criteria {
        Criterion::Spatial(spatial) => spatial_matches(spatial, collection_size, limit_hint, config),
        Criterion::Temporal(temporal) => matches_for(collection_size, temporal_selectivity(temporal, config)),
        Criterion::Composite(_) => {
            let profile = CriteriaProfile::classify(criteria);
            match (&profile.spatial, &profile.temporal) {
                (Some(spatial), Some(temporal)) if profile.other.is_empty() => combined_matches(spatial, temporal, collection_size, limit_hint, config),
                _ => collection_size,
            }
        }
        Criterion::Content(_) => collection_size,
    }
}

/// An index lookup and the criteria left for a residual filter.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexChoice {
    pub index: String,
    pub criteria: Criterion,
    pub limit_hint: Option<usize>,
    pub estimated_matches: usize,
    pub residual: Vec<Criterion>,
}

pub struct IndexSelector<'a> {
    config: &'a OptimizerConfig,
    index_manager: Option<&'a dyn IndexManager>,
}

impl<'a> IndexSelector<'a> {
    pub fn new(config: &'a OptimizerConfig, index_manager: Option<&'a dyn IndexManager>) -> Self {
        Self { config, index_manager }
    }

    fn has_index(&self, name: &str) -> bool {
        self.index_manager.is_some_and(|manager| manager.has_index(name))
    }

    /// Picks the index best suited to `criterion`, if any is available.
    ///
    /// A combined index wins whenever both dimensions are constrained. With
    /// two single-dimension indexes, the one expecting fewer matches is used
    /// and the other dimension joins the residual criteria.
    pub fn choose(&self, criterion: &Criterion, collection_size: usize, limit: Option<usize>) -> Option<IndexChoice> {
        let CriteriaProfile { spatial, temporal, mut other } = CriteriaProfile::classify(criterion);
        let config = self.config;

        if let (Some(spatial), Some(temporal)) = (&spatial, &temporal)
            && self.has_index(&config.spatiotemporal_index)
        {
            return Some(IndexChoice {
                index: config.spatiotemporal_index.clone(),
                criteria: Criterion::and(vec![spatial.clone().into(), temporal.clone().into()]),
                limit_hint: limit,
                estimated_matches: combined_matches(spatial, temporal, collection_size, limit, config),
                residual: other,
            });
        }

        let spatial_candidate = spatial
            .as_ref()
            .filter(|_| self.has_index(&config.spatial_index))
            .map(|criteria| (config.spatial_index.clone(), Criterion::from(criteria.clone()), spatial_matches(criteria, collection_size, limit, config)));
        let temporal_candidate = temporal
            .as_ref()
            .filter(|_| self.has_index(&config.temporal_index))
            .map(|criteria| (config.temporal_index.clone(), Criterion::from(criteria.clone()), matches_for(collection_size, temporal_selectivity(criteria, config))));

        let (index, criteria, estimated_matches) = match (spatial_candidate, temporal_candidate) {
            (Some(by_space), Some(by_time)) => {
                if by_time.2 < by_space.2 {
                    other.insert(0, by_space.1);
                    by_time
                } else {
                    other.insert(0, by_time.1);
                    by_space
                }
            }
            (Some(by_space), None) => {
                other.extend(temporal.map(Criterion::from));
                by_space
            }
            (None, Some(by_time)) => {
                other.extend(spatial.map(Criterion::from));
                by_time
            }
            (None, None) => return None,
        };

        Some(IndexChoice {
            index,
            criteria,
            limit_hint: limit,
            estimated_matches,
            residual: other,
        })
    }
}
