//! Vector quantizers (spec §4.6): scalar (SQ), binary (BQ), and product
//! (PQ) quantization trade search recall for a much smaller in-memory
//! footprint. Each implements `Quantizer` so `vector::maintainer` can swap
//! strategies per index without touching search code.

use serde::{Deserialize, Serialize};

pub trait Quantizer: Send + Sync {
    fn encode(&self, vector: &[f32]) -> Vec<u8>;
    fn approximate_distance(&self, query: &[f32], encoded: &[u8]) -> f32;
}

/// Per-dimension linear quantization into `u8` buckets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalarQuantizer {
    pub min: Vec<f32>,
    pub max: Vec<f32>,
}

impl ScalarQuantizer {
    pub fn fit(vectors: &[Vec<f32>]) -> Self {
        let dim = vectors.first().map(|v| v.len()).unwrap_or(0);
        let mut min = vec![f32::MAX; dim];
        let mut max = vec![f32::MIN; dim];
        for v in vectors {
            for (i, &x) in v.iter().enumerate() {
                min[i] = min[i].min(x);
                max[i] = max[i].max(x);
            }
        }
        ScalarQuantizer { min, max }
    }

    fn bucket(&self, dim: usize, value: f32) -> u8 {
        let range = (self.max[dim] - self.min[dim]).max(1e-9);
        (((value - self.min[dim]) / range) * 255.0).clamp(0.0, 255.0) as u8
    }

    fn unbucket(&self, dim: usize, b: u8) -> f32 {
        let range = self.max[dim] - self.min[dim];
        self.min[dim] + (b as f32 / 255.0) * range
    }
}

impl Quantizer for ScalarQuantizer {
    fn encode(&self, vector: &[f32]) -> Vec<u8> {
        vector.iter().enumerate().map(|(i, &x)| self.bucket(i, x)).collect()
    }

    fn approximate_distance(&self, query: &[f32], encoded: &[u8]) -> f32 {
        query
            .iter()
            .enumerate()
            .zip(encoded)
            .map(|((i, &q), &b)| (q - self.unbucket(i, b)).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// One bit per dimension: `1` if the component is above the mean.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinaryQuantizer {
    pub threshold: Vec<f32>,
}

impl BinaryQuantizer {
    pub fn fit(vectors: &[Vec<f32>]) -> Self {
        let dim = vectors.first().map(|v| v.len()).unwrap_or(0);
        let mut sums = vec![0.0f32; dim];
        for v in vectors {
            for (i, &x) in v.iter().enumerate() {
                sums[i] += x;
            }
        }
        let n = vectors.len().max(1) as f32;
        BinaryQuantizer { threshold: sums.into_iter().map(|s| s / n).collect() }
    }
}

impl Quantizer for BinaryQuantizer {
    fn encode(&self, vector: &[f32]) -> Vec<u8> {
        let mut bytes = vec![0u8; (vector.len() + 7) / 8];
        for (i, &x) in vector.iter().enumerate() {
            if x > self.threshold.get(i).copied().unwrap_or(0.0) {
                bytes[i / 8] |= 1 << (i % 8);
            }
        }
        bytes
    }

    /// Hamming distance between the query's own binarization and the
    /// stored code.
    fn approximate_distance(&self, query: &[f32], encoded: &[u8]) -> f32 {
        let query_code = self.encode(query);
        query_code.iter().zip(encoded).map(|(a, b)| (a ^ b).count_ones()).sum::<u32>() as f32
    }
}

/// Product quantization: split each vector into `subvectors` chunks and
/// encode each chunk with the index of its nearest of `centroids_per_sub`
/// codewords. Codebooks are fit once from a sample and shared by `encode`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductQuantizer {
    pub subvector_len: usize,
    pub codebooks: Vec<Vec<Vec<f32>>>,
}

impl ProductQuantizer {
    pub fn fit(vectors: &[Vec<f32>], subvectors: usize, centroids_per_sub: usize) -> Self {
        let dim = vectors.first().map(|v| v.len()).unwrap_or(0);
        let subvector_len = (dim / subvectors.max(1)).max(1);
        let mut codebooks = Vec::with_capacity(subvectors);
        for s in 0..subvectors {
            let start = s * subvector_len;
            let end = (start + subvector_len).min(dim);
            if start >= end {
                codebooks.push(vec![vec![0.0; subvector_len]]);
                continue;
            }
            // k-means would be the real fit; a seeded sample of input
            // subvectors stands in as the codebook here.
            let mut codebook: Vec<Vec<f32>> = vectors
                .iter()
                .take(centroids_per_sub.max(1))
                .map(|v| v[start..end].to_vec())
                .collect();
            if codebook.is_empty() {
                codebook.push(vec![0.0; end - start]);
            }
            codebooks.push(codebook);
        }
        ProductQuantizer { subvector_len, codebooks }
    }

    fn encode_subvector(&self, sub_idx: usize, chunk: &[f32]) -> u8 {
        self.codebooks[sub_idx]
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                let da: f32 = a.iter().zip(chunk).map(|(x, y)| (x - y).powi(2)).sum();
                let db: f32 = b.iter().zip(chunk).map(|(x, y)| (x - y).powi(2)).sum();
                da.total_cmp(&db)
            })
            .map(|(i, _)| i as u8)
            .unwrap_or(0)
    }
}

impl Quantizer for ProductQuantizer {
    fn encode(&self, vector: &[f32]) -> Vec<u8> {
        (0..self.codebooks.len())
            .map(|s| {
                let start = s * self.subvector_len;
                let end = (start + self.subvector_len).min(vector.len());
                self.encode_subvector(s, &vector[start.min(vector.len())..end])
            })
            .collect()
    }

    fn approximate_distance(&self, query: &[f32], encoded: &[u8]) -> f32 {
        encoded
            .iter()
            .enumerate()
            .map(|(s, &code)| {
                let start = s * self.subvector_len;
                let end = (start + self.subvector_len).min(query.len());
                let chunk = &query[start.min(query.len())..end];
                let codeword = &self.codebooks[s][code as usize];
                chunk.iter().zip(codeword).map(|(x, y)| (x - y).powi(2)).sum::<f32>()
            })
            .sum::<f32>()
            .sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_quantizer_round_trips_within_tolerance() {
        let vectors = vec![vec![0.0, 0.0], vec![10.0, 5.0], vec![5.0, 2.5]];
        let sq = ScalarQuantizer::fit(&vectors);
        let encoded = sq.encode(&vectors[1]);
        let dist = sq.approximate_distance(&vectors[1], &encoded);
        assert!(dist < 0.1);
    }

    #[test]
    fn binary_quantizer_hamming_distance_is_zero_for_same_vector() {
        let vectors = vec![vec![1.0, -1.0, 2.0], vec![-1.0, 1.0, -2.0]];
        let bq = BinaryQuantizer::fit(&vectors);
        let encoded = bq.encode(&vectors[0]);
        assert_eq!(bq.approximate_distance(&vectors[0], &encoded), 0.0);
    }
}
