//! Vector distance/similarity metrics (spec §4.6).

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Metric {
    Cosine,
    Euclidean,
    DotProduct,
}

impl Metric {
    /// Lower is closer for every metric variant returned here: cosine and
    /// dot-product similarities are negated so callers always minimize.
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Metric::Euclidean => a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum::<f32>().sqrt(),
            Metric::DotProduct => -dot(a, b),
            Metric::Cosine => {
                let d = dot(a, b);
                let na = norm(a);
                let nb = norm(b);
                if na == 0.0 || nb == 0.0 {
                    1.0
                } else {
                    1.0 - d / (na * nb)
                }
            }
        }
    }
}

pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

pub fn norm(a: &[f32]) -> f32 {
    dot(a, a).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_distance_is_zero_for_identical_vectors() {
        let v = vec![1.0, 2.0, 3.0];
        assert!(Metric::Cosine.distance(&v, &v).abs() < 1e-6);
    }

    #[test]
    fn euclidean_distance_matches_expected_value() {
        let a = vec![0.0, 0.0];
        let b = vec![3.0, 4.0];
        assert!((Metric::Euclidean.distance(&a, &b) - 5.0).abs() < 1e-6);
    }
}
