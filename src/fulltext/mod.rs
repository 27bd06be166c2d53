//! Full-text index family (spec §4.5): analysis pipeline, packed posting
//! lists, BM25 scoring, and BlockMax-WAND top-k search, wired together by
//! `index::FullTextMaintainer`.

pub mod analyzer;
pub mod bm25;
pub mod bmw;
pub mod delta;
pub mod filter;
pub mod filters;
pub mod index;
pub mod posting;
pub mod token;
pub mod tokenizer;
pub mod vbyte;

pub use analyzer::{Analyzer, AnalyzerRegistry};
pub use bm25::{BM25Params, BM25Scorer};
pub use index::FullTextMaintainer;
