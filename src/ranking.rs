//! Weighted multi-attribute ranking.
//!
//! A ranking is a list of [`SortWeight`]s. Each entity's composite score is
//! the sum of its attribute values scaled by the normalized weights, and the
//! display order is a stable descending sort on that score. Rankings are
//! computed on demand and never persisted.

use serde::{Deserialize, Serialize};

use crate::models::RankedEntity;

/// One term of a composite score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SortWeight {
    pub attribute_index: usize,
    /// Relative importance in `[0, 1]`.
    pub weight: f64,
}

impl SortWeight {
    pub fn new(attribute_index: usize, weight: f64) -> Self {
        Self {
            attribute_index,
            weight: clamp_weight(weight),
        }
    }
}

fn clamp_weight(weight: f64) -> f64 {
    if weight.is_nan() {
        return 0.0;
    }
    weight.clamp(0.0, 1.0)
}

/// Collapse duplicate attribute indices, keeping the last weight given for
/// each, and clamp every weight into `[0, 1]`. First-seen index order is kept.
pub fn dedupe_weights(weights: &[SortWeight]) -> Vec<SortWeight> {
    let mut out: Vec<SortWeight> = Vec::with_capacity(weights.len());
    for w in weights {
        let clamped = SortWeight::new(w.attribute_index, w.weight);
        match out
            .iter_mut()
            .find(|existing| existing.attribute_index == w.attribute_index)
        {
            Some(existing) => existing.weight = clamped.weight,
            None => out.push(clamped),
        }
    }
    out
}

/// Composite score of `entity` under `weights`.
///
/// Weights are normalized by their total; a zero total leaves them as
/// literal multipliers. Indices past the entity's attribute list add 0.
pub fn composite_score(entity: &RankedEntity, weights: &[SortWeight]) -> f64 {
    let weights = dedupe_weights(weights);
    score_with(entity, &weights, normalizer(&weights))
}

fn normalizer(weights: &[SortWeight]) -> f64 {
    let total: f64 = weights.iter().map(|w| w.weight).sum();
    if total == 0.0 {
        1.0
    } else {
        total
    }
}

fn score_with(entity: &RankedEntity, weights: &[SortWeight], total: f64) -> f64 {
    weights
        .iter()
        .map(|w| entity.value(w.attribute_index).unwrap_or(0.0) * (w.weight / total))
        .sum()
}

/// Order `entities` by descending composite score.
///
/// The sort is stable: equal scores keep their input order. An empty weight
/// list returns the input sequence untouched.
pub fn weighted_sort<'a, I>(entities: I, weights: &[SortWeight]) -> Vec<&'a RankedEntity>
where
    I: IntoIterator<Item = &'a RankedEntity>,
{
    let entities: Vec<&'a RankedEntity> = entities.into_iter().collect();
    if weights.is_empty() {
        return entities;
    }

    let weights = dedupe_weights(weights);
    let total = normalizer(&weights);
    let mut scored: Vec<(f64, &'a RankedEntity)> = entities
        .into_iter()
        .map(|e| (score_with(e, &weights, total), e))
        .collect();
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
    scored.into_iter().map(|(_, e)| e).collect()
}

/// A ranked entity paired with its composite score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredEntity {
    #[serde(flatten)]
    pub entity: RankedEntity,
    pub score: f64,
}

/// [`weighted_sort`], returning owned entities with their scores attached.
pub fn rank<'a, I>(entities: I, weights: &[SortWeight]) -> Vec<ScoredEntity>
where
    I: IntoIterator<Item = &'a RankedEntity>,
{
    weighted_sort(entities, weights)
        .into_iter()
        .map(|e| ScoredEntity {
            entity: e.clone(),
            score: composite_score(e, weights),
        })
        .collect()
}
