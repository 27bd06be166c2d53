//! Fusion strategies (spec §4.9): combine several `(id, score)` result sets
//! from different sub-plans (vector, full-text, rank…) into one ranked list.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Normalization {
    MinMax,
    ZScore,
    Percentile,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FusionStrategy {
    WeightedSum { weights: Vec<f64>, normalization: Normalization },
    /// Reciprocal rank fusion, score-agnostic.
    Rrf { k: f64 },
    Max,
    GeometricMean,
}

fn normalize(scores: &[(u64, f64)], normalization: Normalization) -> HashMap<u64, f64> {
    if scores.is_empty() {
        return HashMap::new();
    }
    match normalization {
        Normalization::MinMax => {
            let min = scores.iter().map(|(_, s)| *s).fold(f64::MAX, f64::min);
            let max = scores.iter().map(|(_, s)| *s).fold(f64::MIN, f64::max);
            let range = (max - min).max(1e-9);
            scores.iter().map(|(id, s)| (*id, (s - min) / range)).collect()
        }
        Normalization::ZScore => {
            let n = scores.len() as f64;
            let mean = scores.iter().map(|(_, s)| *s).sum::<f64>() / n;
            let variance = scores.iter().map(|(_, s)| (*s - mean).powi(2)).sum::<f64>() / n;
            let std_dev = variance.sqrt().max(1e-9);
            scores.iter().map(|(id, s)| (*id, (s - mean) / std_dev)).collect()
        }
        Normalization::Percentile => {
            let mut sorted: Vec<f64> = scores.iter().map(|(_, s)| *s).collect();
            sorted.sort_by(f64::total_cmp);
            let n = sorted.len().max(1) as f64;
            scores
                .iter()
                .map(|(id, s)| {
                    let rank = sorted.partition_point(|v| v < s) as f64;
                    (*id, rank / n)
                })
                .collect()
        }
    }
}

fn ranks_of(scores: &[(u64, f64)]) -> HashMap<u64, usize> {
    let mut ordered: Vec<(u64, f64)> = scores.to_vec();
    ordered.sort_by(|a, b| b.1.total_cmp(&a.1));
    ordered.into_iter().enumerate().map(|(rank, (id, _))| (id, rank + 1)).collect()
}

impl FusionStrategy {
    /// Combines one scored list per sub-plan into a single ranked
    /// `(id, score)` list, deduplicated by id and sorted descending.
    pub fn combine(&self, sources: &[Vec<(u64, f64)>]) -> Vec<(u64, f64)> {
        let mut combined: HashMap<u64, f64> = HashMap::new();

        match self {
            FusionStrategy::WeightedSum { weights, normalization } => {
                for (i, source) in sources.iter().enumerate() {
                    let weight = weights.get(i).copied().unwrap_or(1.0);
                    for (id, score) in normalize(source, *normalization) {
                        *combined.entry(id).or_insert(0.0) += weight * score;
                    }
                }
            }
            FusionStrategy::Rrf { k } => {
                for source in sources {
                    for (id, rank) in ranks_of(source) {
                        *combined.entry(id).or_insert(0.0) += 1.0 / (k + rank as f64);
                    }
                }
            }
            FusionStrategy::Max => {
                for source in sources {
                    for (id, score) in source {
                        let entry = combined.entry(*id).or_insert(f64::MIN);
                        if *score > *entry {
                            *entry = *score;
                        }
                    }
                }
            }
            FusionStrategy::GeometricMean => {
                let mut counts: HashMap<u64, usize> = HashMap::new();
                for source in sources {
                    for (id, score) in source {
                        let entry = combined.entry(*id).or_insert(1.0);
                        *entry *= score.max(1e-9);
                        *counts.entry(*id).or_insert(0) += 1;
                    }
                }
                for (id, product) in combined.iter_mut() {
                    let n = *counts.get(id).unwrap_or(&1) as f64;
                    *product = product.powf(1.0 / n);
                }
            }
        }

        let mut out: Vec<(u64, f64)> = combined.into_iter().collect();
        out.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        out
    }
}
