//! BM25 scoring, defaults kept identical to the teacher's
//! `scoring::scorer::BM25Scorer` (k1=1.2, b=0.75).

#[derive(Debug, Clone, Copy)]
pub struct BM25Params {
    pub k1: f64,
    pub b: f64,
}

impl Default for BM25Params {
    fn default() -> Self {
        BM25Params { k1: 1.2, b: 0.75 }
    }
}

pub struct BM25Scorer {
    params: BM25Params,
}

impl BM25Scorer {
    pub fn new(params: BM25Params) -> Self {
        BM25Scorer { params }
    }

    /// `idf = ln((N - df + 0.5) / (df + 0.5) + 1)`, the Robertson-Sparck
    /// Jones variant with the `+1` guard against negative idf for very
    /// common terms.
    pub fn idf(total_docs: u64, doc_freq: u64) -> f64 {
        let n = total_docs as f64;
        let df = doc_freq as f64;
        (((n - df + 0.5) / (df + 0.5)) + 1.0).ln()
    }

    pub fn score_term(
        &self,
        term_freq: u32,
        doc_len: u32,
        avg_doc_len: f64,
        idf: f64,
    ) -> f64 {
        let tf = term_freq as f64;
        let dl = doc_len as f64;
        let norm = 1.0 - self.params.b + self.params.b * (dl / avg_doc_len.max(1.0));
        idf * (tf * (self.params.k1 + 1.0)) / (tf + self.params.k1 * norm)
    }

    /// Upper bound on this term's contribution to any document's score,
    /// used as the block-max impact value for BlockMax-WAND pruning
    /// (spec §4.5). Term frequency saturates as `doc_len -> 0`.
    pub fn max_score_for_term(&self, max_term_freq: u32, idf: f64) -> f64 {
        self.score_term(max_term_freq, 1, 1.0, idf).max(idf * (self.params.k1 + 1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idf_is_higher_for_rarer_terms() {
        let rare = BM25Scorer::idf(10_000, 5);
        let common = BM25Scorer::idf(10_000, 5_000);
        assert!(rare > common);
    }

    #[test]
    fn score_increases_with_term_frequency() {
        let scorer = BM25Scorer::new(BM25Params::default());
        let idf = BM25Scorer::idf(1000, 50);
        let low = scorer.score_term(1, 100, 100.0, idf);
        let high = scorer.score_term(5, 100, 100.0, idf);
        assert!(high > low);
    }

    #[test]
    fn score_decreases_for_longer_documents() {
        let scorer = BM25Scorer::new(BM25Params::default());
        let idf = BM25Scorer::idf(1000, 50);
        let short_doc = scorer.score_term(3, 50, 100.0, idf);
        let long_doc = scorer.score_term(3, 400, 100.0, idf);
        assert!(short_doc > long_doc);
    }
}
