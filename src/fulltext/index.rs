//! Full-text `IndexMaintainer`: analyzes a source field, maintains packed
//! postings under `I/<name>/terms/<term>/<docId>`, per-doc length under
//! `I/<name>/docs/<docId>`, document frequency under `I/<name>/df/<term>`,
//! corpus totals under `I/<name>/stats`, and BlockMax-WAND block layout
//! under `I/<name>/blocks/<term>/{meta,<blockId>}` (spec §4.5).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::core::error::{Error, Result};
use crate::core::types::{FieldValue, Item};
use crate::index::maintainer::{IndexKv, IndexMaintainer, IndexState, ValidationReport};
use crate::kv::{KeySelector, KeyValue, Mutation, RangeOptions, Transaction};
use crate::tuple::{Element, Subspace, Tuple};

use super::analyzer::Analyzer;
use super::bm25::{BM25Params, BM25Scorer};
use super::bmw::{self, ScoredDoc, TermCursor};
use super::posting::{decode_entry, encode_entry, encode_list, decode_list, PostingEntry};

fn stats_key(subspace: &Subspace, name: &str) -> Vec<u8> {
    subspace.child("stats").key(&Tuple::new().push(Element::Text(name.to_string())))
}

fn df_key(subspace: &Subspace, term: &str) -> Vec<u8> {
    subspace.child("df").key(&Tuple::new().push(Element::Text(term.to_string())))
}

fn term_key(subspace: &Subspace, term: &str, doc_id: u64) -> Vec<u8> {
    subspace.child("terms").child(term).key(&Tuple::new().push(Element::UInt(doc_id)))
}

fn doc_len_key(subspace: &Subspace, doc_id: u64) -> Vec<u8> {
    subspace.child("docs").key(&Tuple::new().push(Element::UInt(doc_id)))
}

fn blocks_subspace(subspace: &Subspace, term: &str) -> Subspace {
    subspace.child("blocks").child(term)
}

fn blocks_meta_key(subspace: &Subspace, term: &str) -> Vec<u8> {
    blocks_subspace(subspace, term).key(&Tuple::new().push(Element::Text("meta".to_string())))
}

fn block_key(subspace: &Subspace, term: &str, block_id: u32) -> Vec<u8> {
    blocks_subspace(subspace, term).key(&Tuple::new().push(Element::UInt(block_id as u64)))
}

fn encode_block_meta(block_count: u32, idf: f64) -> Vec<u8> {
    let mut out = Vec::with_capacity(12);
    out.extend_from_slice(&block_count.to_le_bytes());
    out.extend_from_slice(&idf.to_le_bytes());
    out
}

fn decode_block_meta(data: &[u8]) -> Result<(u32, f64)> {
    if data.len() < 12 {
        return Err(Error::internal("truncated block meta"));
    }
    let block_count = u32::from_le_bytes(data[0..4].try_into().unwrap());
    let idf = f64::from_le_bytes(data[4..12].try_into().unwrap());
    Ok((block_count, idf))
}

fn encode_block_body(last_doc_id: u64, max_score: f64, entries: &[PostingEntry]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&last_doc_id.to_le_bytes());
    out.extend_from_slice(&max_score.to_le_bytes());
    out.extend(encode_list(entries));
    out
}

fn decode_block_body(data: &[u8]) -> Result<(u64, f64, Vec<PostingEntry>)> {
    if data.len() < 16 {
        return Err(Error::internal("truncated block body"));
    }
    let last_doc_id = u64::from_le_bytes(data[0..8].try_into().unwrap());
    let max_score = f64::from_le_bytes(data[8..16].try_into().unwrap());
    let entries = decode_list(&data[16..]);
    Ok((last_doc_id, max_score, entries))
}

fn read_counter(bytes: Option<Vec<u8>>) -> u64 {
    bytes
        .and_then(|v| v.as_slice().try_into().ok())
        .map(i64::from_le_bytes)
        .map(|n| n.max(0) as u64)
        .unwrap_or(0)
}

pub struct FullTextMaintainer {
    name: String,
    source_field: String,
    analyzer: Arc<Analyzer>,
    subspace: Subspace,
    block_size: usize,
    bm25: BM25Scorer,
    state: Mutex<IndexState>,
}

impl FullTextMaintainer {
    pub fn new(name: impl Into<String>, source_field: impl Into<String>, analyzer: Arc<Analyzer>) -> Self {
        Self::with_bm25_params(name, source_field, analyzer, 64, BM25Params::default())
    }

    pub fn with_bm25_params(
        name: impl Into<String>,
        source_field: impl Into<String>,
        analyzer: Arc<Analyzer>,
        block_size: usize,
        bm25_params: BM25Params,
    ) -> Self {
        let name = name.into();
        let subspace = Subspace::root("I").child(&name);
        FullTextMaintainer {
            name,
            source_field: source_field.into(),
            analyzer,
            subspace,
            block_size,
            bm25: BM25Scorer::new(bm25_params),
            state: Mutex::new(IndexState::Readable),
        }
    }

    /// Tokenizes the source field once and folds token positions into a
    /// per-term posting entry plus the document's total token count.
    fn term_postings(&self, item: &Item) -> Option<(Vec<(String, PostingEntry)>, u32)> {
        let text = match item.get_field(&self.source_field) {
            Some(FieldValue::Text(s)) => s,
            _ => return None,
        };
        let tokens = self.analyzer.analyze(text);
        let doc_len = tokens.len() as u32;
        let mut positions_by_term: HashMap<String, Vec<u32>> = HashMap::new();
        let mut order: Vec<String> = Vec::new();
        for token in tokens {
            if !positions_by_term.contains_key(&token.text) {
                order.push(token.text.clone());
            }
            positions_by_term.entry(token.text).or_default().push(token.position as u32);
        }
        let entries = order
            .into_iter()
            .map(|term| {
                let positions = positions_by_term.remove(&term).unwrap_or_default();
                let entry = PostingEntry::new(item.id.value(), positions);
                (term, entry)
            })
            .collect();
        Some((entries, doc_len))
    }

    async fn read_term_entries(&self, tx: &dyn Transaction, term: &str) -> Result<Vec<PostingEntry>> {
        let sub = self.subspace.child("terms").child(term);
        let prefix = sub.raw_prefix().to_vec();
        let rows: Vec<KeyValue> = tx
            .get_range(
                KeySelector::first_greater_or_equal(prefix.clone()),
                KeySelector::first_greater_or_equal(sub.range_end()),
                RangeOptions::default(),
            )
            .await?;
        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let suffix = &row.key[prefix.len()..];
            let tuple = Tuple::unpack(suffix).map_err(Error::internal)?;
            let doc_id = match tuple.0.first() {
                Some(Element::UInt(id)) => *id,
                _ => return Err(Error::internal("malformed term posting key")),
            };
            entries.push(decode_entry(doc_id, &row.value));
        }
        entries.sort_by_key(|e| e.doc_id);
        Ok(entries)
    }

    async fn corpus_stats(&self, tx: &dyn Transaction) -> Result<(u64, f64)> {
        let total_docs = read_counter(tx.get(&stats_key(&self.subspace, "total_docs")).await?);
        let total_len = read_counter(tx.get(&stats_key(&self.subspace, "total_len")).await?);
        let avg_doc_len = if total_docs == 0 { 0.0 } else { total_len as f64 / total_docs as f64 };
        Ok((total_docs, avg_doc_len))
    }

    /// Recomputes the full BlockMax-WAND block layout for `term` from its
    /// current posting list (the flat `terms/<term>/*` rows, including any
    /// writes already issued earlier in this same transaction) and persists
    /// it under `blocks/<term>/*`. Called after the term's flat posting
    /// entries have been written; reloading the whole list on every write
    /// is O(posting list size) rather than incremental, acceptable for the
    /// reference engine the same way the vector index accepts an O(index
    /// size) rewrite per update.
    async fn rebuild_blocks_for_term(&self, tx: &dyn Transaction, term: &str) -> Result<()> {
        let entries = self.read_term_entries(tx, term).await?;

        let blocks_sub = blocks_subspace(&self.subspace, term);
        tx.clear_range(blocks_sub.raw_prefix(), &blocks_sub.range_end())?;
        if entries.is_empty() {
            return Ok(());
        }

        // total_docs is read via a plain `get`, which (like `Add` mutations
        // generally) only reflects state as of the start of this
        // transaction; the idf used for this term's blocks may lag by the
        // handful of documents committed in the same batch.
        let (total_docs, _) = self.corpus_stats(tx).await?;
        let df = entries.len() as u64;
        let idf = BM25Scorer::idf(total_docs.max(df), df);
        let blocks = bmw::build_blocks(&entries, self.block_size, idf, &self.bm25);

        tx.set(&blocks_meta_key(&self.subspace, term), &encode_block_meta(blocks.len() as u32, idf))?;
        for (i, block) in blocks.iter().enumerate() {
            let body = encode_block_body(block.last_doc_id, block.max_score, &block.entries);
            tx.set(&block_key(&self.subspace, term, i as u32), &body)?;
        }
        Ok(())
    }

    async fn load_cursor(&self, tx: &dyn Transaction, term: &str) -> Result<Option<TermCursor>> {
        let Some(meta) = tx.get(&blocks_meta_key(&self.subspace, term)).await? else {
            return Ok(None);
        };
        let (block_count, idf) = decode_block_meta(&meta)?;
        let mut blocks = Vec::with_capacity(block_count as usize);
        for i in 0..block_count {
            let Some(body) = tx.get(&block_key(&self.subspace, term, i)).await? else {
                return Err(Error::internal(format!("missing block {i} for term {term}")));
            };
            let (last_doc_id, max_score, entries) = decode_block_body(&body)?;
            blocks.push(bmw::Block { max_score, last_doc_id, entries });
        }
        Ok(Some(TermCursor::new(idf, blocks)))
    }

    /// Top-`k` BM25 search over the persisted BlockMax-WAND block layout
    /// (spec §4.5). Terms with no postings contribute an exhausted cursor
    /// implicitly by being skipped.
    pub async fn search(&self, tx: &dyn Transaction, query_terms: &[String], k: usize) -> Result<Vec<ScoredDoc>> {
        const EPSILON: f64 = 1e-4;

        let (total_docs, avg_doc_len) = self.corpus_stats(tx).await?;
        if total_docs == 0 {
            return Ok(Vec::new());
        }

        let mut cursors = Vec::with_capacity(query_terms.len());
        for term in query_terms {
            if let Some(cursor) = self.load_cursor(tx, term).await? {
                cursors.push(cursor);
            }
        }
        if cursors.is_empty() {
            return Ok(Vec::new());
        }

        // `search_top_k` needs doc length synchronously while walking
        // cursors, so every doc id appearing in any candidate block is
        // fetched up front rather than mid-scan.
        let doc_lens = self.prefetch_doc_lens(tx, &cursors).await?;
        let results = bmw::search_top_k(
            cursors,
            k,
            &self.bm25,
            avg_doc_len,
            |doc_id| doc_lens.get(&doc_id).copied().unwrap_or(0),
            EPSILON,
        );
        Ok(results)
    }

    async fn prefetch_doc_lens(&self, tx: &dyn Transaction, cursors: &[TermCursor]) -> Result<HashMap<u64, u32>> {
        let mut doc_ids = std::collections::HashSet::new();
        for cursor in cursors {
            for block in cursor.blocks() {
                for entry in &block.entries {
                    doc_ids.insert(entry.doc_id);
                }
            }
        }
        let mut out = HashMap::with_capacity(doc_ids.len());
        for doc_id in doc_ids {
            if let Some(bytes) = tx.get(&doc_len_key(&self.subspace, doc_id)).await? {
                let len = u32::from_le_bytes(bytes.as_slice().try_into().unwrap_or([0; 4]));
                out.insert(doc_id, len);
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl IndexMaintainer for FullTextMaintainer {
    fn name(&self) -> &str {
        &self.name
    }

    fn index_keys(&self, item: &Item) -> Result<Vec<IndexKv>> {
        let Some((entries, doc_len)) = self.term_postings(item) else {
            return Ok(Vec::new());
        };
        let mut out = Vec::with_capacity(entries.len() + 1);
        for (term, entry) in &entries {
            out.push(IndexKv {
                key: term_key(&self.subspace, term, item.id.value()),
                value: encode_entry(entry),
            });
        }
        out.push(IndexKv {
            key: doc_len_key(&self.subspace, item.id.value()),
            value: doc_len.to_le_bytes().to_vec(),
        });
        Ok(out)
    }

    async fn update(&self, old: Option<&Item>, new: Option<&Item>, tx: &dyn Transaction) -> Result<()> {
        let old_postings = old.and_then(|o| self.term_postings(o));
        let new_postings = new.and_then(|n| self.term_postings(n));

        if let Some((entries, doc_len)) = &old_postings {
            let old = old.unwrap();
            for (term, _) in entries {
                tx.clear(&term_key(&self.subspace, term, old.id.value()))?;
                tx.atomic(&df_key(&self.subspace, term), Mutation::Add(-1))?;
            }
            tx.clear(&doc_len_key(&self.subspace, old.id.value()))?;
            tx.atomic(&stats_key(&self.subspace, "total_docs"), Mutation::Add(-1))?;
            tx.atomic(&stats_key(&self.subspace, "total_len"), Mutation::Add(-(*doc_len as i64)))?;
        }

        if let Some((entries, doc_len)) = &new_postings {
            let new = new.unwrap();
            for (term, entry) in entries {
                tx.set(&term_key(&self.subspace, term, new.id.value()), &encode_entry(entry))?;
                tx.atomic(&df_key(&self.subspace, term), Mutation::Add(1))?;
            }
            tx.set(&doc_len_key(&self.subspace, new.id.value()), &doc_len.to_le_bytes())?;
            tx.atomic(&stats_key(&self.subspace, "total_docs"), Mutation::Add(1))?;
            tx.atomic(&stats_key(&self.subspace, "total_len"), Mutation::Add(*doc_len as i64))?;
        }

        // Rebuild the BlockMax-WAND layout for every term this write
        // touched, whether removed, added, or re-weighted by a changed
        // term frequency. The flat `terms/<term>/*` writes above have
        // already been issued against `tx`, so the reload below sees them.
        let mut touched: std::collections::HashSet<&str> = std::collections::HashSet::new();
        if let Some((entries, _)) = &old_postings {
            touched.extend(entries.iter().map(|(term, _)| term.as_str()));
        }
        if let Some((entries, _)) = &new_postings {
            touched.extend(entries.iter().map(|(term, _)| term.as_str()));
        }
        for term in &touched {
            self.rebuild_blocks_for_term(tx, term).await?;
        }

        Ok(())
    }

    async fn validate_entries(&self, tx: &dyn Transaction) -> Result<ValidationReport> {
        let sub = self.subspace.child("terms");
        let rows = tx
            .get_range(
                KeySelector::first_greater_or_equal(sub.raw_prefix().to_vec()),
                KeySelector::first_greater_or_equal(sub.range_end()),
                RangeOptions::default(),
            )
            .await?;
        Ok(ValidationReport { entries_checked: rows.len() as u64, orphaned_entries: 0, missing_entries: 0 })
    }

    fn state(&self) -> IndexState {
        *self.state.lock()
    }

    fn set_state(&self, state: IndexState) {
        *self.state.lock() = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::DocId;
    use crate::fulltext::AnalyzerRegistry;
    use crate::kv::memory::MemoryDatabase;
    use crate::kv::Database;

    fn item(id: u64, text: &str) -> Item {
        Item::new(DocId::new(id), "article").with_field("body", FieldValue::Text(text.to_string()))
    }

    #[tokio::test]
    async fn indexing_an_item_writes_term_postings() {
        let maintainer =
            FullTextMaintainer::new("by_body", "body", Arc::new(AnalyzerRegistry::standard_english()));
        let db = MemoryDatabase::new();
        let tx = db.create_transaction().await.unwrap();
        maintainer.update(None, Some(&item(1, "the quick fox runs")), tx.as_ref()).await.unwrap();
        tx.commit().await.unwrap();

        let tx2 = db.create_transaction().await.unwrap();
        let report = maintainer.validate_entries(tx2.as_ref()).await.unwrap();
        assert!(report.entries_checked > 0);
    }

    #[tokio::test]
    async fn removing_an_item_clears_its_postings() {
        let maintainer =
            FullTextMaintainer::new("by_body", "body", Arc::new(AnalyzerRegistry::standard_english()));
        let db = MemoryDatabase::new();
        let doc = item(1, "the quick fox runs");

        let tx = db.create_transaction().await.unwrap();
        maintainer.update(None, Some(&doc), tx.as_ref()).await.unwrap();
        tx.commit().await.unwrap();

        let tx2 = db.create_transaction().await.unwrap();
        maintainer.update(Some(&doc), None, tx2.as_ref()).await.unwrap();
        tx2.commit().await.unwrap();

        let tx3 = db.create_transaction().await.unwrap();
        let report = maintainer.validate_entries(tx3.as_ref()).await.unwrap();
        assert_eq!(report.entries_checked, 0);
    }

    #[tokio::test]
    async fn search_ranks_the_document_mentioning_the_term_most() {
        let maintainer =
            FullTextMaintainer::new("by_body", "body", Arc::new(AnalyzerRegistry::standard_english()));
        let db = MemoryDatabase::new();

        let tx = db.create_transaction().await.unwrap();
        maintainer.update(None, Some(&item(1, "fox fox fox jumps")), tx.as_ref()).await.unwrap();
        tx.commit().await.unwrap();
        let tx = db.create_transaction().await.unwrap();
        maintainer.update(None, Some(&item(2, "a fox runs")), tx.as_ref()).await.unwrap();
        tx.commit().await.unwrap();
        let tx = db.create_transaction().await.unwrap();
        maintainer.update(None, Some(&item(3, "no relevant words here")), tx.as_ref()).await.unwrap();
        tx.commit().await.unwrap();

        let tx2 = db.create_transaction().await.unwrap();
        let results = maintainer.search(tx2.as_ref(), &["fox".to_string()], 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].doc_id, 1);
        assert_eq!(results[1].doc_id, 2);
    }

    #[tokio::test]
    async fn search_drops_a_term_after_its_only_document_is_removed() {
        let maintainer =
            FullTextMaintainer::new("by_body", "body", Arc::new(AnalyzerRegistry::standard_english()));
        let db = MemoryDatabase::new();
        let doc = item(1, "unique zephyr token");

        let tx = db.create_transaction().await.unwrap();
        maintainer.update(None, Some(&doc), tx.as_ref()).await.unwrap();
        tx.commit().await.unwrap();

        let tx2 = db.create_transaction().await.unwrap();
        maintainer.update(Some(&doc), None, tx2.as_ref()).await.unwrap();
        tx2.commit().await.unwrap();

        let tx3 = db.create_transaction().await.unwrap();
        let results = maintainer.search(tx3.as_ref(), &["zephyr".to_string()], 5).await.unwrap();
        assert!(results.is_empty());
    }
}
