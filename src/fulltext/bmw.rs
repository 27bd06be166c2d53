//! BlockMax-WAND top-k retrieval (spec §4.5): per-term block-max upper
//! bounds prune whole blocks before a single exact score is computed,
//! compared against the running kth-best score with an epsilon slack so
//! near-ties are not dropped by floating point noise.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use super::bm25::BM25Scorer;
use super::posting::PostingEntry;

const EXHAUSTED: u64 = u64::MAX;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredDoc {
    pub doc_id: u64,
    pub score: f64,
}

impl Eq for ScoredDoc {}

impl Ord for ScoredDoc {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap on score: reverse the natural order.
        other.score.total_cmp(&self.score)
    }
}

impl PartialOrd for ScoredDoc {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

pub struct Block {
    pub max_score: f64,
    pub last_doc_id: u64,
    pub entries: Vec<PostingEntry>,
}

pub fn build_blocks(
    entries: &[PostingEntry],
    block_size: usize,
    idf: f64,
    scorer: &BM25Scorer,
) -> Vec<Block> {
    super::posting::chunk_into_blocks(entries, block_size)
        .into_iter()
        .map(|chunk| {
            let max_tf = chunk.iter().map(|e| e.term_freq).max().unwrap_or(0);
            Block {
                max_score: scorer.max_score_for_term(max_tf, idf),
                last_doc_id: chunk.last().map(|e| e.doc_id).unwrap_or(EXHAUSTED),
                entries: chunk.to_vec(),
            }
        })
        .collect()
}

pub struct TermCursor {
    pub idf: f64,
    blocks: Vec<Block>,
    block_idx: usize,
    entry_idx: usize,
}

impl TermCursor {
    pub fn new(idf: f64, blocks: Vec<Block>) -> Self {
        TermCursor { idf, blocks, block_idx: 0, entry_idx: 0 }
    }

    fn exhausted(&self) -> bool {
        self.block_idx >= self.blocks.len()
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn current_doc(&self) -> u64 {
        if self.exhausted() {
            return EXHAUSTED;
        }
        self.blocks[self.block_idx].entries[self.entry_idx].doc_id
    }

    pub fn current_entry(&self) -> Option<&PostingEntry> {
        if self.exhausted() {
            return None;
        }
        Some(&self.blocks[self.block_idx].entries[self.entry_idx])
    }

    pub fn block_max_score(&self) -> f64 {
        if self.exhausted() {
            0.0
        } else {
            self.blocks[self.block_idx].max_score
        }
    }

    /// Advances to the first doc id >= `target`, skipping whole blocks
    /// whose `last_doc_id < target` without inspecting their entries.
    pub fn advance_to(&mut self, target: u64) {
        while self.block_idx < self.blocks.len() {
            let block = &self.blocks[self.block_idx];
            if block.last_doc_id < target {
                self.block_idx += 1;
                self.entry_idx = 0;
                continue;
            }
            while self.entry_idx < block.entries.len() && block.entries[self.entry_idx].doc_id < target {
                self.entry_idx += 1;
            }
            if self.entry_idx >= block.entries.len() {
                self.block_idx += 1;
                self.entry_idx = 0;
                continue;
            }
            return;
        }
    }

    pub fn advance_past(&mut self, doc_id: u64) {
        self.advance_to(doc_id + 1);
    }
}

pub fn search_top_k(
    mut cursors: Vec<TermCursor>,
    k: usize,
    scorer: &BM25Scorer,
    avg_doc_len: f64,
    doc_len: impl Fn(u64) -> u32,
    epsilon: f64,
) -> Vec<ScoredDoc> {
    let mut heap: BinaryHeap<ScoredDoc> = BinaryHeap::with_capacity(k + 1);

    loop {
        cursors.sort_by_key(|c| c.current_doc());
        if cursors.is_empty() || cursors[0].current_doc() == EXHAUSTED {
            break;
        }

        let threshold = if heap.len() >= k {
            heap.peek().map(|d| d.score).unwrap_or(0.0)
        } else {
            0.0
        };
        let slack_threshold = threshold * (1.0 - epsilon);

        let mut acc = 0.0;
        let mut pivot_idx = None;
        for (i, c) in cursors.iter().enumerate() {
            if c.current_doc() == EXHAUSTED {
                break;
            }
            acc += c.block_max_score();
            if acc > slack_threshold {
                pivot_idx = Some(i);
                break;
            }
        }

        let pivot_idx = match pivot_idx {
            Some(i) => i,
            None => break,
        };
        let pivot_doc = cursors[pivot_idx].current_doc();
        if pivot_doc == EXHAUSTED {
            break;
        }

        if cursors[0].current_doc() == pivot_doc {
            let dl = doc_len(pivot_doc);
            let mut score = 0.0;
            for c in cursors.iter() {
                if c.current_doc() != pivot_doc {
                    continue;
                }
                if let Some(entry) = c.current_entry() {
                    score += scorer.score_term(entry.term_freq, dl, avg_doc_len, c.idf);
                }
            }
            if heap.len() < k {
                heap.push(ScoredDoc { doc_id: pivot_doc, score });
            } else if let Some(min) = heap.peek().copied() {
                if score > min.score {
                    heap.pop();
                    heap.push(ScoredDoc { doc_id: pivot_doc, score });
                }
            }
            for c in cursors.iter_mut() {
                if c.current_doc() == pivot_doc {
                    c.advance_past(pivot_doc);
                }
            }
        } else {
            cursors[0].advance_to(pivot_doc);
        }
    }

    let mut results: Vec<ScoredDoc> = heap.into_sorted_vec();
    results.reverse();
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fulltext::bm25::BM25Params;
    use crate::fulltext::posting::PostingEntry;

    fn cursor(idf: f64, docs: &[(u64, u32)]) -> TermCursor {
        let entries: Vec<PostingEntry> =
            docs.iter().map(|&(id, tf)| PostingEntry { doc_id: id, term_freq: tf, positions: vec![] }).collect();
        let scorer = BM25Scorer::new(BM25Params::default());
        let blocks = build_blocks(&entries, 4, idf, &scorer);
        TermCursor::new(idf, blocks)
    }

    #[test]
    fn finds_top_k_across_two_terms() {
        let scorer = BM25Scorer::new(BM25Params::default());
        let c1 = cursor(2.0, &[(1, 3), (2, 1), (5, 4)]);
        let c2 = cursor(1.5, &[(2, 2), (3, 5), (5, 1)]);
        let results = search_top_k(vec![c1, c2], 2, &scorer, 10.0, |_| 10, 1e-4);
        assert_eq!(results.len(), 2);
        assert!(results[0].score >= results[1].score);
    }

    #[test]
    fn single_term_returns_highest_scoring_docs_first() {
        let scorer = BM25Scorer::new(BM25Params::default());
        let c = cursor(1.0, &[(1, 1), (2, 10), (3, 2)]);
        let results = search_top_k(vec![c], 1, &scorer, 10.0, |_| 10, 1e-4);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].doc_id, 2);
    }
}
