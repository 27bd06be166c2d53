//! Delta + vbyte encoding for ascending doc-id sequences, kept from the
//! teacher's `compression::delta::DeltaEncoder` — used to pack posting
//! list doc ids (spec §4.5).

use super::vbyte::VByteEncoder;

pub struct DeltaEncoder;

impl DeltaEncoder {
    pub fn encode(sorted_ids: &[u64]) -> Vec<u8> {
        let mut deltas = Vec::with_capacity(sorted_ids.len());
        let mut prev = 0u64;
        for &id in sorted_ids {
            deltas.push(id - prev);
            prev = id;
        }
        VByteEncoder::encode_all(&deltas)
    }

    pub fn decode(data: &[u8]) -> Vec<u64> {
        let deltas = VByteEncoder::decode_all(data);
        let mut ids = Vec::with_capacity(deltas.len());
        let mut acc = 0u64;
        for d in deltas {
            acc += d;
            ids.push(acc);
        }
        ids
    }
}
