//! Posting list codec for the `I/<name>/terms/<term>/<docId>` layout
//! (spec §4.5). Doc ids are stored delta-encoded across a term's posting
//! list; positions are delta-encoded within a single document's entry.
//! Grounded on the teacher's `search::postings` packing idiom, generalized
//! from raw doc-id lists to term-frequency + position payloads.

use super::delta::DeltaEncoder;
use super::vbyte::VByteEncoder;

#[derive(Debug, Clone, PartialEq)]
pub struct PostingEntry {
    pub doc_id: u64,
    pub term_freq: u32,
    pub positions: Vec<u32>,
}

impl PostingEntry {
    pub fn new(doc_id: u64, positions: Vec<u32>) -> Self {
        PostingEntry { doc_id, term_freq: positions.len() as u32, positions }
    }
}

/// Encodes a single document's entry: `termFreq | positionsLen | deltaPositions`.
pub fn encode_entry(entry: &PostingEntry) -> Vec<u8> {
    let mut out = VByteEncoder::encode(entry.term_freq as u64);
    out.extend(VByteEncoder::encode(entry.positions.len() as u64));
    let positions: Vec<u64> = entry.positions.iter().map(|&p| p as u64).collect();
    out.extend(DeltaEncoder::encode(&positions));
    out
}

pub fn decode_entry(doc_id: u64, data: &[u8]) -> PostingEntry {
    let mut cursor = 0usize;
    let (term_freq, n) = VByteEncoder::decode_one(&data[cursor..]);
    cursor += n;
    let (pos_len, n) = VByteEncoder::decode_one(&data[cursor..]);
    cursor += n;
    let positions = DeltaEncoder::decode(&data[cursor..]);
    debug_assert_eq!(positions.len() as u64, pos_len);
    PostingEntry {
        doc_id,
        term_freq: term_freq as u32,
        positions: positions.into_iter().map(|p| p as u32).collect(),
    }
}

/// Encodes a whole term's posting list as a doc-id-delta-prefixed stream of
/// entries, used when a posting list is small enough to keep unblocked.
pub fn encode_list(entries: &[PostingEntry]) -> Vec<u8> {
    let doc_ids: Vec<u64> = entries.iter().map(|e| e.doc_id).collect();
    let mut out = VByteEncoder::encode(entries.len() as u64);
    out.extend(DeltaEncoder::encode(&doc_ids));
    for entry in entries {
        let body = encode_entry(entry);
        out.extend(VByteEncoder::encode(body.len() as u64));
        out.extend(body);
    }
    out
}

pub fn decode_list(data: &[u8]) -> Vec<PostingEntry> {
    let mut cursor = 0usize;
    let (count, n) = VByteEncoder::decode_one(&data[cursor..]);
    cursor += n;
    let doc_id_bytes_start = cursor;
    // DeltaEncoder::decode needs the whole remaining vbyte stream it wrote;
    // we re-derive its length by decoding count values greedily.
    let (doc_ids, consumed) = decode_delta_prefix(&data[doc_id_bytes_start..], count as usize);
    cursor += consumed;
    let mut entries = Vec::with_capacity(count as usize);
    for doc_id in doc_ids {
        let (body_len, n) = VByteEncoder::decode_one(&data[cursor..]);
        cursor += n;
        let body = &data[cursor..cursor + body_len as usize];
        cursor += body_len as usize;
        entries.push(decode_entry(doc_id, body));
    }
    entries
}

fn decode_delta_prefix(data: &[u8], count: usize) -> (Vec<u64>, usize) {
    let mut cursor = 0usize;
    let mut deltas = Vec::with_capacity(count);
    for _ in 0..count {
        let (v, n) = VByteEncoder::decode_one(&data[cursor..]);
        deltas.push(v);
        cursor += n;
    }
    let mut ids = Vec::with_capacity(count);
    let mut prev = 0u64;
    for d in deltas {
        prev += d;
        ids.push(prev);
    }
    (ids, cursor)
}

/// Groups a sorted posting list into fixed-size blocks for BlockMax-WAND
/// (spec §4.5); the final block may be shorter.
pub fn chunk_into_blocks(entries: &[PostingEntry], block_size: usize) -> Vec<&[PostingEntry]> {
    if block_size == 0 {
        return vec![entries];
    }
    entries.chunks(block_size).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_round_trips_positions() {
        let entry = PostingEntry::new(42, vec![1, 5, 9, 40]);
        let bytes = encode_entry(&entry);
        let decoded = decode_entry(42, &bytes);
        assert_eq!(decoded, entry);
    }

    #[test]
    fn list_round_trips_multiple_docs() {
        let entries = vec![
            PostingEntry::new(3, vec![0, 2]),
            PostingEntry::new(10, vec![1]),
            PostingEntry::new(11, vec![0, 1, 2, 3]),
        ];
        let bytes = encode_list(&entries);
        let decoded = decode_list(&bytes);
        assert_eq!(decoded, entries);
    }

    #[test]
    fn chunking_splits_into_bounded_blocks() {
        let entries: Vec<PostingEntry> = (0..10).map(|i| PostingEntry::new(i, vec![0])).collect();
        let blocks = chunk_into_blocks(&entries, 4);
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[2].len(), 2);
    }
}
