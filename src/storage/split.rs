//! Large-value splitting (spec §3): values whose framed size exceeds
//! `split_threshold_bytes` (~90 KB) are chunked as `baseKey|0x00 →
//! (totalSize, partCount)` followed by `baseKey|0x01..`. Grounded on the
//! teacher's `storage::segment_writer`'s length-prefixed chunked write
//! loop, retargeted from segment files onto KV chunks.

use crate::core::error::{Error, Result};
use crate::kv::Transaction;

const HEADER_PART: u8 = 0x00;

fn part_key(base_key: &[u8], part: u8) -> Vec<u8> {
    let mut key = base_key.to_vec();
    key.push(part);
    key
}

fn encode_header(total_size: i64, part_count: i32) -> Vec<u8> {
    let mut out = Vec::with_capacity(12);
    out.extend_from_slice(&total_size.to_be_bytes());
    out.extend_from_slice(&part_count.to_be_bytes());
    out
}

fn decode_header(data: &[u8]) -> Result<(i64, i32)> {
    if data.len() < 12 {
        return Err(Error::checksum_mismatch("large-value header too short"));
    }
    let mut size_bytes = [0u8; 8];
    size_bytes.copy_from_slice(&data[0..8]);
    let mut count_bytes = [0u8; 4];
    count_bytes.copy_from_slice(&data[8..12]);
    Ok((i64::from_be_bytes(size_bytes), i32::from_be_bytes(count_bytes)))
}

/// Write `value` under `base_key`, splitting into `chunk_size`-byte parts
/// if it exceeds `threshold`. `value` is assumed to already be the fully
/// transformed envelope bytes.
pub fn write(
    tx: &dyn Transaction,
    base_key: &[u8],
    value: &[u8],
    threshold: usize,
    chunk_size: usize,
) -> Result<()> {
    // Clear whatever representation (direct value or a previous, possibly
    // larger, set of split parts) currently lives at `base_key` before
    // writing the new one, or a shrinking split value leaks orphaned chunk
    // keys behind the new, shorter part count.
    let mut range_end = base_key.to_vec();
    range_end.push(0xFF);
    tx.clear_range(base_key, &range_end)?;

    if value.len() <= threshold {
        tx.set(base_key, value)?;
        return Ok(());
    }

    let chunks: Vec<&[u8]> = value.chunks(chunk_size).collect();
    let header = encode_header(value.len() as i64, chunks.len() as i32);
    tx.set(&part_key(base_key, HEADER_PART), &header)?;
    for (i, chunk) in chunks.iter().enumerate() {
        let part_no = (i + 1) as u8;
        tx.set(&part_key(base_key, part_no), chunk)?;
    }
    Ok(())
}

/// Read a value back, reassembling split parts if present. A missing part
/// is a hard error (spec §3).
pub async fn read(tx: &dyn Transaction, base_key: &[u8]) -> Result<Option<Vec<u8>>> {
    let header_key = part_key(base_key, HEADER_PART);
    if let Some(header_bytes) = tx.get(&header_key).await? {
        let (total_size, part_count) = decode_header(&header_bytes)?;
        let mut assembled = Vec::with_capacity(total_size.max(0) as usize);
        for i in 1..=part_count {
            let key = part_key(base_key, i as u8);
            let part = tx
                .get(&key)
                .await?
                .ok_or_else(|| Error::missing_split_part(base_key))?;
            assembled.extend_from_slice(&part);
        }
        if assembled.len() as i64 != total_size {
            return Err(Error::checksum_mismatch("reassembled size does not match header"));
        }
        return Ok(Some(assembled));
    }

    tx.get(base_key).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::memory::MemoryDatabase;
    use crate::kv::Database;

    #[tokio::test]
    async fn small_value_stored_directly() {
        let db = MemoryDatabase::new();
        let tx = db.create_transaction().await.unwrap();
        write(tx.as_ref(), b"base", b"small", 90 * 1024, 90 * 1024).unwrap();
        let read_back = read(tx.as_ref(), b"base").await.unwrap();
        assert_eq!(read_back, Some(b"small".to_vec()));
    }

    #[tokio::test]
    async fn large_value_splits_and_reassembles() {
        let db = MemoryDatabase::new();
        let tx = db.create_transaction().await.unwrap();
        let value = vec![42u8; 250_000];
        write(tx.as_ref(), b"base", &value, 90 * 1024, 90 * 1024).unwrap();
        let read_back = read(tx.as_ref(), b"base").await.unwrap().unwrap();
        assert_eq!(read_back, value);
    }

    #[tokio::test]
    async fn missing_part_is_hard_error() {
        let db = MemoryDatabase::new();
        let tx = db.create_transaction().await.unwrap();
        let value = vec![1u8; 250_000];
        write(tx.as_ref(), b"base", &value, 90 * 1024, 90 * 1024).unwrap();
        tx.clear(&part_key(b"base", 2)).unwrap();
        let result = read(tx.as_ref(), b"base").await;
        assert!(matches!(result, Err(Error::MissingSplitPart(_))));
    }
}
