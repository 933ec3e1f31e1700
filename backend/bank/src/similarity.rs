//! # Similarity
//!
//! Euclidean distance over raw signatures and the rankings built on it.
//!
//! Distances are `Option<f64>`: `None` means the two models are not
//! comparable (a signature is missing or the lengths differ). Callers must
//! not read it as zero.
//!
//! Rankings are computed fresh for every query against the current store
//! snapshot; nothing is cached between reference ids.
use std::collections::HashSet;

use serde::Serialize;

use crate::{models::ModelRecord, store::SignatureStore};

pub fn distance(a: Option<&[f64]>, b: Option<&[f64]>) -> Option<f64> {
    let (a, b) = (a?, b?);
    if a.len() != b.len() {
        return None;
    }

    let sum: f64 = a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum();
    Some(sum.sqrt())
}

#[derive(Clone, Debug, Serialize)]
pub struct RankedModel<'a> {
    #[serde(flatten)]
    pub model: &'a ModelRecord,
    pub distance: f64,
}

/// Ranks candidates by ascending distance to `reference_id`.
///
/// Candidates default to the whole store. A subset is still visited in store
/// order so that equal distances keep store order. The reference itself,
/// signature-less candidates and non-comparable candidates are excluded.
pub fn rank_by_similarity<'a>(
    store: &'a SignatureStore,
    reference_id: &str,
    candidate_ids: Option<&[String]>,
) -> Vec<RankedModel<'a>> {
    let Some(reference) = store.get(reference_id).filter(|r| r.has_signature()) else {
        return Vec::new();
    };

    let allowed: Option<HashSet<&str>> =
        candidate_ids.map(|ids| ids.iter().map(String::as_str).collect());

    let mut ranked: Vec<RankedModel<'a>> = store
        .iter()
        .filter(|candidate| candidate.id != reference.id)
        .filter(|candidate| {
            allowed
                .as_ref()
                .is_none_or(|allowed| allowed.contains(candidate.id.as_str()))
        })
        .filter_map(|candidate| {
            distance(reference.signature(), candidate.signature())
                .map(|distance| RankedModel {
                    model: candidate,
                    distance,
                })
        })
        .collect();

    ranked.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    ranked
}

pub fn find_nearest_neighbors<'a>(
    store: &'a SignatureStore,
    model_id: &str,
    k: usize,
) -> Vec<RankedModel<'a>> {
    let mut ranked = rank_by_similarity(store, model_id, None);
    ranked.truncate(k);
    ranked
}

/// Presentation transform from distance to a 0-100 similarity percentage.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SimilarityScale {
    pub max_distance: f64,
}

impl SimilarityScale {
    pub fn new(max_distance: f64) -> Self {
        Self { max_distance }
    }

    pub fn percent(&self, distance: f64) -> f64 {
        if self.max_distance <= 0.0 || !distance.is_finite() {
            return 0.0;
        }

        (1.0 - distance / self.max_distance).clamp(0.0, 1.0) * 100.0
    }
}

impl Default for SimilarityScale {
    fn default() -> Self {
        Self::new(20.0)
    }
}
