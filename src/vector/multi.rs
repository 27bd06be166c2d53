//! Multi-vector scoring (spec §4.6): a document may carry several vectors
//! (e.g. one per chunk), scored against a query's vector set by one of
//! three fusion strategies.

use super::distance::Metric;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultiVectorScoring {
    /// ColBERT-style late interaction: for each query vector, take its
    /// closest match in the document, then sum.
    MaxSim,
    Average,
    /// Symmetric best-match: average of query->doc and doc->query MaxSim.
    Chamfer,
}

impl MultiVectorScoring {
    pub fn score(&self, query_vectors: &[Vec<f32>], doc_vectors: &[Vec<f32>], metric: Metric) -> f32 {
        if query_vectors.is_empty() || doc_vectors.is_empty() {
            return f32::MAX;
        }
        match self {
            MultiVectorScoring::MaxSim => max_sim(query_vectors, doc_vectors, metric),
            MultiVectorScoring::Average => {
                let mut total = 0.0;
                let mut count = 0u32;
                for q in query_vectors {
                    for d in doc_vectors {
                        total += metric.distance(q, d);
                        count += 1;
                    }
                }
                total / count.max(1) as f32
            }
            MultiVectorScoring::Chamfer => {
                (max_sim(query_vectors, doc_vectors, metric) + max_sim(doc_vectors, query_vectors, metric)) / 2.0
            }
        }
    }
}

fn max_sim(from: &[Vec<f32>], to: &[Vec<f32>], metric: Metric) -> f32 {
    from.iter()
        .map(|f| to.iter().map(|t| metric.distance(f, t)).fold(f32::MAX, f32::min))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_sim_prefers_closer_document() {
        let query = vec![vec![0.0, 0.0]];
        let near = vec![vec![0.1, 0.0]];
        let far = vec![vec![5.0, 5.0]];
        let s_near = MultiVectorScoring::MaxSim.score(&query, &near, Metric::Euclidean);
        let s_far = MultiVectorScoring::MaxSim.score(&query, &far, Metric::Euclidean);
        assert!(s_near < s_far);
    }
}
